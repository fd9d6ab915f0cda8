//! Evaluation of the expressions that remain after members have answered: filters over the
//! joined results, aggregates of a group, HAVING conditions and projected expressions.

use crate::aggregate::{numeric_value, AggregateRegistry};
use crate::error::FederationError;
use sparql_federation_model::vocab::xsd;
use sparql_federation_model::{
    AggregateFunction, CompareOp, Literal, Node, NodeId, QueryTree, Solution, Term,
};
use itertools::Itertools;
use std::cmp::Ordering;

/// Evaluates a value expression against one solution. [`None`] is an unbound or erroneous value.
pub fn evaluate(
    tree: &QueryTree,
    expr: NodeId,
    solution: &Solution,
) -> Result<Option<Term>, FederationError> {
    Ok(match tree.node(expr) {
        Node::Var(variable) => solution.get(variable).cloned(),
        Node::ValueConstant(term) => Some(term.clone()),
        Node::Bound(variable) => Some(boolean(solution.contains(variable))),
        Node::Compare { left, right, op } => {
            let left = evaluate(tree, *left, solution)?;
            let right = evaluate(tree, *right, solution)?;
            match (left, right) {
                (Some(left), Some(right)) => compare(*op, &left, &right).map(boolean),
                _ => None,
            }
        }
        Node::And { left, right } => {
            let left = effective_boolean(tree, *left, solution)?;
            let right = effective_boolean(tree, *right, solution)?;
            match (left, right) {
                (Some(false), _) | (_, Some(false)) => Some(boolean(false)),
                (Some(true), Some(true)) => Some(boolean(true)),
                _ => None,
            }
        }
        Node::Or { left, right } => {
            let left = effective_boolean(tree, *left, solution)?;
            let right = effective_boolean(tree, *right, solution)?;
            match (left, right) {
                (Some(true), _) | (_, Some(true)) => Some(boolean(true)),
                (Some(false), Some(false)) => Some(boolean(false)),
                _ => None,
            }
        }
        Node::Not { arg } => effective_boolean(tree, *arg, solution)?.map(|value| boolean(!value)),
        node => {
            return FederationError::not_implemented(format!(
                "Local evaluation of {} expressions",
                node.kind()
            ))
        }
    })
}

/// Evaluates an expression to its effective boolean value.
pub fn effective_boolean(
    tree: &QueryTree,
    expr: NodeId,
    solution: &Solution,
) -> Result<Option<bool>, FederationError> {
    Ok(evaluate(tree, expr, solution)?.and_then(|term| boolean_value(&term)))
}

fn boolean(value: bool) -> Term {
    Literal::from(value).into()
}

fn boolean_value(term: &Term) -> Option<bool> {
    let Term::Literal(literal) = term else {
        return None;
    };
    if literal.datatype() == xsd::BOOLEAN {
        return match literal.value() {
            "true" | "1" => Some(true),
            "false" | "0" => Some(false),
            _ => None,
        };
    }
    if let Some(number) = numeric_value(term) {
        return Some(number != 0.0 && !number.is_nan());
    }
    if literal.datatype() == xsd::STRING {
        return Some(!literal.value().is_empty());
    }
    None
}

fn compare(op: CompareOp, left: &Term, right: &Term) -> Option<bool> {
    let ordering = order(left, right);
    Some(match op {
        CompareOp::Eq => match ordering {
            Some(ordering) => ordering == Ordering::Equal,
            None => left == right,
        },
        CompareOp::Ne => match ordering {
            Some(ordering) => ordering != Ordering::Equal,
            None => left != right,
        },
        CompareOp::Lt => ordering? == Ordering::Less,
        CompareOp::Le => ordering? != Ordering::Greater,
        CompareOp::Gt => ordering? == Ordering::Greater,
        CompareOp::Ge => ordering? != Ordering::Less,
    })
}

/// Orders numbers by value and literals of the same datatype by their lexical form.
fn order(left: &Term, right: &Term) -> Option<Ordering> {
    if let (Some(left), Some(right)) = (numeric_value(left), numeric_value(right)) {
        return left.partial_cmp(&right);
    }
    match (left, right) {
        (Term::Literal(left), Term::Literal(right))
            if left.datatype() == right.datatype() && left.language() == right.language() =>
        {
            Some(left.value().cmp(right.value()))
        }
        _ => None,
    }
}

/// Orders terms for ORDER BY: unbound values first, then blank nodes, IRIs and literals.
pub fn order_terms(left: Option<&Term>, right: Option<&Term>) -> Ordering {
    fn rank(term: Option<&Term>) -> u8 {
        match term {
            None => 0,
            Some(Term::BlankNode(_)) => 1,
            Some(Term::NamedNode(_)) => 2,
            Some(_) => 3,
        }
    }
    match (left, right) {
        (Some(l @ Term::Literal(_)), Some(r @ Term::Literal(_))) => {
            order(l, r).unwrap_or_else(|| l.to_string().cmp(&r.to_string()))
        }
        (Some(l), Some(r)) if rank(left) == rank(right) => l.to_string().cmp(&r.to_string()),
        _ => rank(left).cmp(&rank(right)),
    }
}

/// Computes one aggregate over the solutions of a group.
pub fn aggregate(
    tree: &QueryTree,
    registry: &AggregateRegistry,
    operator: NodeId,
    group: &[Solution],
) -> Result<Option<Term>, FederationError> {
    let Node::Aggregate {
        function,
        arg,
        distinct,
    } = tree.node(operator)
    else {
        return FederationError::not_implemented(format!(
            "Group element of kind {}",
            tree.node(operator).kind()
        ));
    };

    let Some(arg) = arg else {
        let count = if *distinct {
            group.iter().unique().count()
        } else {
            group.len()
        };
        return Ok(Some(integer(count)));
    };

    let mut values = Vec::with_capacity(group.len());
    for solution in group {
        if let Some(value) = evaluate(tree, *arg, solution)? {
            values.push(value);
        }
    }
    if *distinct {
        let mut seen = Vec::with_capacity(values.len());
        values.retain(|value| {
            if seen.contains(value) {
                false
            } else {
                seen.push(value.clone());
                true
            }
        });
    }

    Ok(match function {
        AggregateFunction::Count => Some(integer(values.len())),
        AggregateFunction::Sum => sum(&values),
        AggregateFunction::Avg => {
            if values.is_empty() {
                Some(integer(0))
            } else {
                let numbers = values.iter().map(numeric_value).collect::<Option<Vec<_>>>();
                numbers.map(|numbers| {
                    Literal::new_typed_literal(mean(&numbers).to_string(), xsd::DECIMAL).into()
                })
            }
        }
        AggregateFunction::Min => extreme(values, Ordering::Less),
        AggregateFunction::Max => extreme(values, Ordering::Greater),
        AggregateFunction::Sample => values.into_iter().next(),
        AggregateFunction::GroupConcat { separator } => {
            let separator = separator.as_deref().unwrap_or(" ");
            let parts = values
                .iter()
                .map(|value| match value {
                    Term::Literal(literal) => literal.value().to_owned(),
                    Term::NamedNode(iri) => iri.as_str().to_owned(),
                    other => other.to_string(),
                })
                .collect::<Vec<_>>();
            Some(Literal::new_simple_literal(parts.join(separator)).into())
        }
        AggregateFunction::Service(iri) => {
            let Some(service) = registry.get(iri) else {
                return Err(FederationError::UnknownMember(iri.to_string()));
            };
            service.evaluate(&values)
        }
    })
}

#[allow(clippy::cast_precision_loss, reason = "Groups are far smaller than 2^52")]
fn mean(numbers: &[f64]) -> f64 {
    numbers.iter().sum::<f64>() / numbers.len() as f64
}

#[allow(clippy::cast_possible_wrap, reason = "Counts never exceed i64::MAX")]
fn integer(value: usize) -> Term {
    Literal::from(value as i64).into()
}

fn sum(values: &[Term]) -> Option<Term> {
    let all_integers = values.iter().all(|value| {
        matches!(value, Term::Literal(literal) if literal.datatype() == xsd::INTEGER)
    });
    if all_integers {
        let mut total = 0_i64;
        for value in values {
            let Term::Literal(literal) = value else {
                return None;
            };
            total = total.checked_add(literal.value().parse().ok()?)?;
        }
        return Some(Literal::from(total).into());
    }
    let numbers = values.iter().map(numeric_value).collect::<Option<Vec<_>>>()?;
    Some(Literal::from(numbers.iter().sum::<f64>()).into())
}

fn extreme(values: Vec<Term>, wanted: Ordering) -> Option<Term> {
    values.into_iter().reduce(|best, value| {
        if order_terms(Some(&value), Some(&best)) == wanted {
            value
        } else {
            best
        }
    })
}
