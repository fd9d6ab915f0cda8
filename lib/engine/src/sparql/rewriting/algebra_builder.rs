use crate::sparql::error::QueryRenderError;
use rustc_hash::FxHashMap;
use sparql_federation_model::{
    AggregateFunction, BuiltInFunction, CompareOp, GroupElem, MathOp, NamedNode, Node, NodeId,
    OrderElem, PatternTerm, ProjectionElem, QueryTree, Term, UnaryOp, UpdateKind, Variable,
};
use spargebra::algebra::{
    AggregateExpression, AggregateFunction as SparqlAggregateFunction, Expression, Function,
    GraphPattern, OrderExpression, PropertyPathExpression,
};
use spargebra::term::{GroundTerm, NamedNodePattern, TermPattern, TriplePattern};
use spargebra::{GraphUpdateOperation, Query, Update};

type BuildResult<T> = Result<T, QueryRenderError>;

/// Builds a [`QueryTree`] from a query parsed by [spargebra].
///
/// Basic graph patterns become left-deep joins of statement patterns, `GRAPH` scopes are pushed
/// into the context of the statement patterns and consecutive `BIND`s share one extension.
pub struct AlgebraBuilder {
    tree: QueryTree,
    /// The graph of the enclosing `GRAPH` clause.
    graph: Option<PatternTerm>,
    /// `GROUP_CONCAT` separators that stand for aggregate services.
    services: FxHashMap<String, NamedNode>,
}

impl AlgebraBuilder {
    pub fn new() -> Self {
        Self {
            tree: QueryTree::new(),
            graph: None,
            services: FxHashMap::default(),
        }
    }

    /// Turns `GROUP_CONCAT` calls with one of the given separators into service aggregates.
    /// See [`QueryText`](crate::sparql::rewriting::QueryText).
    #[must_use]
    pub fn with_aggregate_services(mut self, services: FxHashMap<String, NamedNode>) -> Self {
        self.services = services;
        self
    }

    /// Builds the tree of a query. Only SELECT and CONSTRUCT have an algebra representation.
    pub fn build_query(mut self, query: &Query) -> BuildResult<QueryTree> {
        let root = match query {
            Query::Select { pattern, .. } => self.graph_pattern(pattern)?,
            Query::Construct { pattern, .. } => {
                let arg = self.graph_pattern(pattern)?;
                self.tree.add(Node::MultiProjection { arg })
            }
            Query::Ask { .. } | Query::Describe { .. } => {
                return Err(QueryRenderError::only_select())
            }
        };
        self.tree.set_root(root);
        Ok(self.tree)
    }

    /// Builds the tree of an update. The tree only records the kind of the first operation as
    /// none of them can be rendered.
    pub fn build_update(mut self, update: &Update) -> BuildResult<QueryTree> {
        let Some(operation) = update.operations.first() else {
            return Err(QueryRenderError::only_select());
        };
        let kind = match operation {
            GraphUpdateOperation::InsertData { .. } => UpdateKind::InsertData,
            GraphUpdateOperation::DeleteData { .. } => UpdateKind::DeleteData,
            GraphUpdateOperation::DeleteInsert { .. } => UpdateKind::Modify,
            GraphUpdateOperation::Load { .. } => UpdateKind::Load,
            GraphUpdateOperation::Clear { .. } => UpdateKind::Clear,
            GraphUpdateOperation::Create { .. } => UpdateKind::Create,
            GraphUpdateOperation::Drop { .. } => UpdateKind::Drop,
        };
        let root = self.tree.add(Node::Update(kind));
        self.tree.set_root(root);
        Ok(self.tree)
    }

    fn graph_pattern(&mut self, pattern: &GraphPattern) -> BuildResult<NodeId> {
        match pattern {
            GraphPattern::Bgp { patterns } => Ok(self.bgp(patterns)),
            GraphPattern::Path {
                subject,
                path,
                object,
            } => self.path(subject, path, object),
            GraphPattern::Join { left, right } => {
                let left = self.graph_pattern(left)?;
                let right = self.graph_pattern(right)?;
                Ok(self.tree.add(Node::Join { left, right }))
            }
            GraphPattern::LeftJoin {
                left,
                right,
                expression,
            } => {
                let left = self.graph_pattern(left)?;
                let right = self.graph_pattern(right)?;
                let condition = expression
                    .as_ref()
                    .map(|e| self.expression(e))
                    .transpose()?;
                Ok(self.tree.add(Node::LeftJoin {
                    left,
                    right,
                    condition,
                }))
            }
            GraphPattern::Filter { expr, inner } => {
                let arg = self.graph_pattern(inner)?;
                let condition = self.expression(expr)?;
                Ok(self.tree.add(Node::Filter { arg, condition }))
            }
            GraphPattern::Union { left, right } => {
                let left = self.graph_pattern(left)?;
                let right = self.graph_pattern(right)?;
                Ok(self.tree.add(Node::Union { left, right }))
            }
            GraphPattern::Minus { left, right } => {
                let left = self.graph_pattern(left)?;
                let right = self.graph_pattern(right)?;
                Ok(self.tree.add(Node::Difference { left, right }))
            }
            GraphPattern::Graph { name, inner } => {
                let old_graph = self.graph.replace(named_node_pattern(name));
                let result = self.graph_pattern(inner);
                self.graph = old_graph;
                result
            }
            GraphPattern::Extend {
                inner,
                variable,
                expression,
            } => {
                let arg = self.graph_pattern(inner)?;
                let expr = self.expression(expression)?;
                let elem = self.tree.add(Node::ExtensionElem {
                    name: variable.clone(),
                    expr,
                });
                if matches!(self.tree.node(arg), Node::Extension { .. }) {
                    self.tree.add_extension_elem(arg, elem);
                    Ok(arg)
                } else {
                    Ok(self.tree.add(Node::Extension {
                        arg,
                        elems: vec![elem],
                    }))
                }
            }
            GraphPattern::Values {
                variables,
                bindings,
            } => {
                let rows = bindings
                    .iter()
                    .map(|row| row.iter().map(|t| t.as_ref().map(ground_term)).collect())
                    .collect();
                Ok(self.tree.add(Node::BindingSetAssignment {
                    variables: variables.clone(),
                    rows,
                }))
            }
            GraphPattern::OrderBy { inner, expression } => {
                let arg = self.graph_pattern(inner)?;
                let elems = expression
                    .iter()
                    .map(|e| self.order_expression(e))
                    .collect::<BuildResult<Vec<_>>>()?;
                Ok(self.tree.add(Node::Order { arg, elems }))
            }
            GraphPattern::Project { inner, variables } => {
                let arg = self.graph_pattern(inner)?;
                let elems = self.projection_elems(arg, variables);
                Ok(self.tree.add(Node::Projection { arg, elems }))
            }
            GraphPattern::Distinct { inner } => {
                let arg = self.graph_pattern(inner)?;
                Ok(self.tree.add(Node::Distinct { arg }))
            }
            GraphPattern::Reduced { inner } => {
                let arg = self.graph_pattern(inner)?;
                Ok(self.tree.add(Node::Reduced { arg }))
            }
            GraphPattern::Slice {
                inner,
                start,
                length,
            } => {
                let arg = self.graph_pattern(inner)?;
                Ok(self.tree.add(Node::Slice {
                    arg,
                    offset: *start,
                    limit: *length,
                }))
            }
            GraphPattern::Group {
                inner,
                variables,
                aggregates,
            } => {
                let arg = self.graph_pattern(inner)?;
                let group = self.tree.add(Node::Group {
                    arg,
                    variables: variables.clone(),
                    elems: Vec::new(),
                });
                for (variable, aggregate) in aggregates {
                    let operator = self.aggregate(aggregate)?;
                    self.tree.add_group_elem(
                        group,
                        GroupElem {
                            name: variable.clone(),
                            operator,
                            anonymous: false,
                        },
                    );
                }
                Ok(group)
            }
            GraphPattern::Service {
                name,
                inner,
                silent,
            } => {
                // The graph of an outer GRAPH clause does not apply to the remote dataset.
                let old_graph = self.graph.take();
                let arg = self.graph_pattern(inner);
                self.graph = old_graph;
                Ok(self.tree.add(Node::Service {
                    service: named_node_pattern(name),
                    arg: arg?,
                    silent: *silent,
                }))
            }
        }
    }

    fn bgp(&mut self, patterns: &[TriplePattern]) -> NodeId {
        let mut result: Option<NodeId> = None;
        for pattern in patterns {
            let node = self.tree.add(Node::StatementPattern {
                subject: term_pattern(&pattern.subject),
                predicate: named_node_pattern(&pattern.predicate),
                object: term_pattern(&pattern.object),
                context: self.graph.clone(),
            });
            result = Some(match result {
                None => node,
                Some(left) => self.tree.add(Node::Join { left, right: node }),
            });
        }
        result.unwrap_or_else(|| self.tree.add(Node::SingletonSet))
    }

    /// Only single-step paths have a statement pattern equivalent.
    fn path(
        &mut self,
        subject: &TermPattern,
        path: &PropertyPathExpression,
        object: &TermPattern,
    ) -> BuildResult<NodeId> {
        let (subject, predicate, object) = match path {
            PropertyPathExpression::NamedNode(predicate) => (subject, predicate, object),
            PropertyPathExpression::Reverse(inner) => match inner.as_ref() {
                PropertyPathExpression::NamedNode(predicate) => (object, predicate, subject),
                _ => return Err(QueryRenderError::unsupported_operator("property path")),
            },
            _ => return Err(QueryRenderError::unsupported_operator("property path")),
        };
        Ok(self.tree.add(Node::StatementPattern {
            subject: term_pattern(subject),
            predicate: PatternTerm::from(predicate.clone()),
            object: term_pattern(object),
            context: self.graph.clone(),
        }))
    }

    /// Links the projected variables to the `SELECT` expressions that compute them. These
    /// expressions are the extension directly below the projection (or below its ORDER BY).
    fn projection_elems(&self, arg: NodeId, variables: &[Variable]) -> Vec<ProjectionElem> {
        let mut current = arg;
        while let Node::Order { arg, .. } = self.tree.node(current) {
            current = *arg;
        }
        let select_expressions = match self.tree.node(current) {
            Node::Extension { elems, .. } => elems.clone(),
            _ => Vec::new(),
        };

        variables
            .iter()
            .map(|variable| {
                let mut elem = ProjectionElem::new(variable.clone());
                elem.source_expression = select_expressions.iter().copied().find(|e| {
                    matches!(
                        self.tree.node(*e),
                        Node::ExtensionElem { name, .. } if name == variable
                    )
                });
                elem
            })
            .collect()
    }

    fn order_expression(&mut self, expression: &OrderExpression) -> BuildResult<OrderElem> {
        Ok(match expression {
            OrderExpression::Asc(inner) => OrderElem {
                expr: self.expression(inner)?,
                ascending: true,
            },
            OrderExpression::Desc(inner) => OrderElem {
                expr: self.expression(inner)?,
                ascending: false,
            },
        })
    }

    fn aggregate(&mut self, aggregate: &AggregateExpression) -> BuildResult<NodeId> {
        let node = match aggregate {
            AggregateExpression::CountSolutions { distinct } => Node::Aggregate {
                function: AggregateFunction::Count,
                arg: None,
                distinct: *distinct,
            },
            AggregateExpression::FunctionCall {
                name,
                expr,
                distinct,
            } => {
                let function = match name {
                    SparqlAggregateFunction::Count => AggregateFunction::Count,
                    SparqlAggregateFunction::Sum => AggregateFunction::Sum,
                    SparqlAggregateFunction::Avg => AggregateFunction::Avg,
                    SparqlAggregateFunction::Min => AggregateFunction::Min,
                    SparqlAggregateFunction::Max => AggregateFunction::Max,
                    SparqlAggregateFunction::Sample => AggregateFunction::Sample,
                    SparqlAggregateFunction::GroupConcat { separator } => {
                        match separator.as_ref().and_then(|s| self.services.get(s)) {
                            Some(service) => AggregateFunction::Service(service.clone()),
                            None => AggregateFunction::GroupConcat {
                                separator: separator.clone(),
                            },
                        }
                    }
                    SparqlAggregateFunction::Custom(name) => {
                        AggregateFunction::Service(name.clone())
                    }
                };
                Node::Aggregate {
                    function,
                    arg: Some(self.expression(expr)?),
                    distinct: *distinct,
                }
            }
        };
        Ok(self.tree.add(node))
    }

    fn expression(&mut self, expression: &Expression) -> BuildResult<NodeId> {
        let node = match expression {
            Expression::NamedNode(nn) => Node::ValueConstant(nn.clone().into()),
            Expression::Literal(literal) => Node::ValueConstant(literal.clone().into()),
            Expression::Variable(variable) => Node::Var(variable.clone()),
            Expression::Or(lhs, rhs) => {
                let (left, right) = self.binary(lhs, rhs)?;
                Node::Or { left, right }
            }
            Expression::And(lhs, rhs) => {
                let (left, right) = self.binary(lhs, rhs)?;
                Node::And { left, right }
            }
            Expression::Equal(lhs, rhs) => self.compare(lhs, rhs, CompareOp::Eq)?,
            Expression::Greater(lhs, rhs) => self.compare(lhs, rhs, CompareOp::Gt)?,
            Expression::GreaterOrEqual(lhs, rhs) => self.compare(lhs, rhs, CompareOp::Ge)?,
            Expression::Less(lhs, rhs) => self.compare(lhs, rhs, CompareOp::Lt)?,
            Expression::LessOrEqual(lhs, rhs) => self.compare(lhs, rhs, CompareOp::Le)?,
            Expression::SameTerm(lhs, rhs) => {
                let (left, right) = self.binary(lhs, rhs)?;
                Node::BuiltIn {
                    function: BuiltInFunction::SameTerm,
                    args: vec![left, right],
                }
            }
            Expression::In(lhs, rhs) => {
                let arg = self.expression(lhs)?;
                let list = rhs
                    .iter()
                    .map(|e| self.expression(e))
                    .collect::<BuildResult<Vec<_>>>()?;
                Node::In { arg, list }
            }
            Expression::Add(lhs, rhs) => self.math(lhs, rhs, MathOp::Plus)?,
            Expression::Subtract(lhs, rhs) => self.math(lhs, rhs, MathOp::Minus)?,
            Expression::Multiply(lhs, rhs) => self.math(lhs, rhs, MathOp::Multiply)?,
            Expression::Divide(lhs, rhs) => self.math(lhs, rhs, MathOp::Divide)?,
            Expression::UnaryPlus(inner) => Node::Unary {
                arg: self.expression(inner)?,
                op: UnaryOp::Plus,
            },
            Expression::UnaryMinus(inner) => Node::Unary {
                arg: self.expression(inner)?,
                op: UnaryOp::Minus,
            },
            // `a != b` is parsed as the negation of an equality.
            Expression::Not(inner) => match inner.as_ref() {
                Expression::Equal(lhs, rhs) => self.compare(lhs, rhs, CompareOp::Ne)?,
                _ => Node::Not {
                    arg: self.expression(inner)?,
                },
            },
            Expression::Exists(pattern) => Node::Exists {
                arg: self.graph_pattern(pattern)?,
            },
            Expression::Bound(variable) => Node::Bound(variable.clone()),
            Expression::If(condition, then, otherwise) => Node::If {
                condition: self.expression(condition)?,
                then: self.expression(then)?,
                otherwise: self.expression(otherwise)?,
            },
            Expression::Coalesce(args) => Node::Coalesce {
                args: self.expressions(args)?,
            },
            Expression::FunctionCall(function, args) => {
                let args = self.expressions(args)?;
                match builtin_function(function) {
                    Ok(function) => Node::BuiltIn { function, args },
                    Err(iri) => Node::FunctionCall { iri, args },
                }
            }
        };
        Ok(self.tree.add(node))
    }

    fn expressions(&mut self, expressions: &[Expression]) -> BuildResult<Vec<NodeId>> {
        expressions.iter().map(|e| self.expression(e)).collect()
    }

    fn binary(&mut self, lhs: &Expression, rhs: &Expression) -> BuildResult<(NodeId, NodeId)> {
        Ok((self.expression(lhs)?, self.expression(rhs)?))
    }

    fn compare(&mut self, lhs: &Expression, rhs: &Expression, op: CompareOp) -> BuildResult<Node> {
        let (left, right) = self.binary(lhs, rhs)?;
        Ok(Node::Compare { left, right, op })
    }

    fn math(&mut self, lhs: &Expression, rhs: &Expression, op: MathOp) -> BuildResult<Node> {
        let (left, right) = self.binary(lhs, rhs)?;
        Ok(Node::MathExpr { left, right, op })
    }
}

impl Default for AlgebraBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn term_pattern(pattern: &TermPattern) -> PatternTerm {
    match pattern {
        TermPattern::NamedNode(nn) => PatternTerm::Constant(nn.clone().into()),
        TermPattern::Literal(literal) => PatternTerm::Constant(literal.clone().into()),
        // Blank nodes of a query behave like variables that cannot be projected.
        TermPattern::BlankNode(bnode) => {
            PatternTerm::Variable(Variable::new_unchecked(format!("_bn_{}", bnode.as_str())))
        }
        TermPattern::Variable(variable) => PatternTerm::Variable(variable.clone()),
    }
}

fn named_node_pattern(pattern: &NamedNodePattern) -> PatternTerm {
    match pattern {
        NamedNodePattern::NamedNode(nn) => PatternTerm::Constant(nn.clone().into()),
        NamedNodePattern::Variable(variable) => PatternTerm::Variable(variable.clone()),
    }
}

fn ground_term(term: &GroundTerm) -> Term {
    match term {
        GroundTerm::NamedNode(nn) => nn.clone().into(),
        GroundTerm::Literal(literal) => literal.clone().into(),
    }
}

/// Maps a spargebra function to a keyword function. Custom functions are returned as their IRI.
fn builtin_function(
    function: &Function,
) -> Result<BuiltInFunction, NamedNode> {
    Ok(match function {
        Function::Str => BuiltInFunction::Str,
        Function::Lang => BuiltInFunction::Lang,
        Function::LangMatches => BuiltInFunction::LangMatches,
        Function::Datatype => BuiltInFunction::Datatype,
        Function::Iri => BuiltInFunction::Iri,
        Function::BNode => BuiltInFunction::BNode,
        Function::Rand => BuiltInFunction::Rand,
        Function::Abs => BuiltInFunction::Abs,
        Function::Ceil => BuiltInFunction::Ceil,
        Function::Floor => BuiltInFunction::Floor,
        Function::Round => BuiltInFunction::Round,
        Function::Concat => BuiltInFunction::Concat,
        Function::SubStr => BuiltInFunction::SubStr,
        Function::StrLen => BuiltInFunction::StrLen,
        Function::Replace => BuiltInFunction::Replace,
        Function::UCase => BuiltInFunction::UCase,
        Function::LCase => BuiltInFunction::LCase,
        Function::EncodeForUri => BuiltInFunction::EncodeForUri,
        Function::Contains => BuiltInFunction::Contains,
        Function::StrStarts => BuiltInFunction::StrStarts,
        Function::StrEnds => BuiltInFunction::StrEnds,
        Function::StrBefore => BuiltInFunction::StrBefore,
        Function::StrAfter => BuiltInFunction::StrAfter,
        Function::Year => BuiltInFunction::Year,
        Function::Month => BuiltInFunction::Month,
        Function::Day => BuiltInFunction::Day,
        Function::Hours => BuiltInFunction::Hours,
        Function::Minutes => BuiltInFunction::Minutes,
        Function::Seconds => BuiltInFunction::Seconds,
        Function::Timezone => BuiltInFunction::Timezone,
        Function::Tz => BuiltInFunction::Tz,
        Function::Now => BuiltInFunction::Now,
        Function::Uuid => BuiltInFunction::Uuid,
        Function::StrUuid => BuiltInFunction::StrUuid,
        Function::Md5 => BuiltInFunction::Md5,
        Function::Sha1 => BuiltInFunction::Sha1,
        Function::Sha256 => BuiltInFunction::Sha256,
        Function::Sha384 => BuiltInFunction::Sha384,
        Function::Sha512 => BuiltInFunction::Sha512,
        Function::StrLang => BuiltInFunction::StrLang,
        Function::StrDt => BuiltInFunction::StrDt,
        Function::IsIri => BuiltInFunction::IsIri,
        Function::IsBlank => BuiltInFunction::IsBlank,
        Function::IsLiteral => BuiltInFunction::IsLiteral,
        Function::IsNumeric => BuiltInFunction::IsNumeric,
        Function::Regex => BuiltInFunction::Regex,
        Function::Custom(iri) => return Err(iri.clone()),
    })
}
