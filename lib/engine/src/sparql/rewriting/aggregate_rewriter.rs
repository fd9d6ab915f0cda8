use crate::sparql::error::QueryRenderError;
use rustc_hash::FxHashSet;
use sparql_federation_model::{
    AggregateFunction, GroupElem, NamedNode, NamedNodeRef, Node, NodeId, ProjectionElem,
    QueryTree, Variable,
};
use std::collections::HashSet;
use std::hash::BuildHasher;
use tracing::debug;

/// Tells the rewriter which function IRIs denote aggregates that are evaluated by an aggregate
/// service instead of the query engine.
pub trait AggregateLookup {
    fn is_aggregate(&self, iri: NamedNodeRef<'_>) -> bool;
}

impl<S: BuildHasher> AggregateLookup for HashSet<NamedNode, S> {
    fn is_aggregate(&self, iri: NamedNodeRef<'_>) -> bool {
        self.contains(&iri.into_owned())
    }
}

impl<T: AggregateLookup + ?Sized> AggregateLookup for &T {
    fn is_aggregate(&self, iri: NamedNodeRef<'_>) -> bool {
        (**self).is_aggregate(iri)
    }
}

/// An aggregate operator found in a projection column.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AggregateReference {
    /// The [`Node::Aggregate`] node.
    pub operator: NodeId,
    /// The alias of the projection column containing the operator.
    pub alias: Variable,
    /// The service IRI of a federation-aware aggregate.
    pub service: Option<NamedNode>,
}

/// Makes every aggregate in a projection column owned by a group.
///
/// Custom function calls recognized by the [`AggregateLookup`] become federation-aware
/// aggregates. An aggregate that is only a part of a column expression is bound to a fresh
/// anonymous variable which takes its place in the expression.
pub struct AggregateRewriter<L> {
    lookup: L,
    anonymous_count: usize,
}

impl<L: AggregateLookup> AggregateRewriter<L> {
    pub fn new(lookup: L) -> Self {
        Self {
            lookup,
            anonymous_count: 0,
        }
    }

    /// Rewrites every projection of `tree`, including the ones of sub-selects.
    pub fn rewrite(
        &mut self,
        tree: &mut QueryTree,
    ) -> Result<Vec<AggregateReference>, QueryRenderError> {
        let Some(root) = tree.root() else {
            return Ok(Vec::new());
        };

        let projections = tree
            .descendants(root)
            .into_iter()
            .filter(|id| matches!(tree.node(*id), Node::Projection { .. }))
            .collect::<Vec<_>>();

        let mut references = Vec::new();
        for projection in projections {
            references.extend(self.rewrite_projection(tree, projection)?);
        }
        Ok(references)
    }

    fn rewrite_projection(
        &mut self,
        tree: &mut QueryTree,
        projection: NodeId,
    ) -> Result<Vec<AggregateReference>, QueryRenderError> {
        let Node::Projection { arg, elems } = tree.node(projection) else {
            return QueryRenderError::internal("Expected a projection node.");
        };
        let arg = *arg;
        let mut elems = elems.clone();
        check_duplicate_aliases(&elems)?;

        let targets = elems.iter().map(|e| e.target.clone()).collect::<Vec<_>>();
        let mut references = Vec::new();
        for elem in &mut elems {
            let Some(extension_elem) = elem.source_expression else {
                continue;
            };
            let Node::ExtensionElem { name, expr } = tree.node(extension_elem) else {
                return QueryRenderError::internal(
                    "Projection source is not an extension element.",
                );
            };
            let alias = name.clone();
            let expr = *expr;

            let (operators, bound) = self.collect_aggregates(tree, expr, find_group(tree, arg));
            for (var, group, binding) in bound {
                // The parser binds every aggregate to a fresh variable. A column that consists of
                // one aggregate takes over its binding.
                let whole_column = var == expr && binding.name != alias;
                if whole_column
                    && !targets.contains(&binding.name)
                    && !tree.group_binding_names(group).contains(&alias)
                {
                    rename_group_elem(tree, projection, group, &binding.name, &alias);
                    debug!(alias = %alias, binding = %binding.name, "Aggregate binding renamed");
                }
                elem.aggregate_in_expression = true;
                references.push(AggregateReference {
                    operator: binding.operator,
                    alias: alias.clone(),
                    service: aggregate_service(tree, binding.operator),
                });
            }
            for (operator, service) in operators {
                let group = match find_group(tree, arg) {
                    Some(group) => group,
                    None => synthesize_group(tree, extension_elem)?,
                };

                let name = if operator == expr {
                    let var = tree.var(alias.clone());
                    tree.replace_child(extension_elem, operator, var);
                    tree.add_group_elem(
                        group,
                        GroupElem {
                            name: alias.clone(),
                            operator,
                            anonymous: false,
                        },
                    );
                    alias.clone()
                } else {
                    let anonymous = self.anonymous_variable();
                    let var = tree.var(anonymous.clone());
                    let Some(parent) = tree.parent(operator) else {
                        return QueryRenderError::internal("Nested aggregate without a parent.");
                    };
                    tree.replace_child(parent, operator, var);
                    tree.add_group_elem(
                        group,
                        GroupElem {
                            name: anonymous.clone(),
                            operator,
                            anonymous: true,
                        },
                    );
                    anonymous
                };
                debug!(alias = %alias, binding = %name, "Aggregate bound by group");

                elem.aggregate_in_expression = true;
                references.push(AggregateReference {
                    operator,
                    alias: alias.clone(),
                    service,
                });
            }
        }

        if let Some(group) = find_group(tree, arg) {
            validate_grouping(tree, group, &elems)?;
        }

        if let Node::Projection { elems: old, .. } = tree.node_mut(projection) {
            *old = elems;
        }
        Ok(references)
    }

    /// Finds the aggregates of a column expression. Custom function calls known to the lookup
    /// are turned into aggregates on the way. Variables bound by an aggregate of `group` are
    /// returned separately with their group element.
    #[allow(clippy::type_complexity, reason = "Both lists are consumed right away")]
    fn collect_aggregates(
        &self,
        tree: &mut QueryTree,
        expr: NodeId,
        group: Option<NodeId>,
    ) -> (Vec<(NodeId, Option<NamedNode>)>, Vec<(NodeId, NodeId, GroupElem)>) {
        let group_elems = match group.map(|g| tree.node(g)) {
            Some(Node::Group { elems, .. }) => elems.clone(),
            _ => Vec::new(),
        };
        let mut result = Vec::new();
        let mut bound = Vec::new();
        let mut stack = vec![expr];
        while let Some(current) = stack.pop() {
            match tree.node(current) {
                Node::Var(variable) => {
                    let elem = group_elems.iter().find(|e| &e.name == variable);
                    if let (Some(group), Some(elem)) = (group, elem) {
                        bound.push((current, group, elem.clone()));
                    }
                }
                Node::FunctionCall { iri, args } if self.lookup.is_aggregate(iri.as_ref()) => {
                    let iri = iri.clone();
                    let arg = args.first().copied();
                    *tree.node_mut(current) = Node::Aggregate {
                        function: AggregateFunction::Service(iri.clone()),
                        arg,
                        distinct: false,
                    };
                    result.push((current, Some(iri)));
                }
                Node::Aggregate { function, .. } => {
                    let service = match function {
                        AggregateFunction::Service(iri) => Some(iri.clone()),
                        _ => None,
                    };
                    result.push((current, service));
                }
                Node::Exists { .. } | Node::Projection { .. } => {}
                node => stack.extend(node.children().into_iter().rev()),
            }
        }
        (result, bound)
    }

    fn anonymous_variable(&mut self) -> Variable {
        self.anonymous_count += 1;
        Variable::new_unchecked(format!("_anon_{}", self.anonymous_count))
    }
}

/// Searches the group of a query level. Nested sub-selects are not entered.
fn find_group(tree: &QueryTree, from: NodeId) -> Option<NodeId> {
    let mut stack = vec![from];
    while let Some(current) = stack.pop() {
        match tree.node(current) {
            Node::Group { .. } => return Some(current),
            Node::Projection { .. } | Node::Exists { .. } => {}
            node => stack.extend(node.children().into_iter().rev()),
        }
    }
    None
}

fn aggregate_service(tree: &QueryTree, operator: NodeId) -> Option<NamedNode> {
    match tree.node(operator) {
        Node::Aggregate {
            function: AggregateFunction::Service(iri),
            ..
        } => Some(iri.clone()),
        _ => None,
    }
}

/// Renames the group element `old` and every reference to it below `projection`.
fn rename_group_elem(
    tree: &mut QueryTree,
    projection: NodeId,
    group: NodeId,
    old: &Variable,
    new: &Variable,
) {
    if let Node::Group { elems, .. } = tree.node_mut(group) {
        for elem in elems.iter_mut().filter(|e| &e.name == old) {
            elem.name = new.clone();
        }
    }
    for id in tree.descendants(projection) {
        if let Node::Var(variable) = tree.node_mut(id) {
            if variable == old {
                *variable = new.clone();
            }
        }
    }
}

/// Inserts an empty group between the extension holding `extension_elem` and its argument.
fn synthesize_group(
    tree: &mut QueryTree,
    extension_elem: NodeId,
) -> Result<NodeId, QueryRenderError> {
    let Some(extension) = tree.parent(extension_elem) else {
        return QueryRenderError::internal("Extension element without an extension.");
    };
    let Node::Extension { arg, .. } = tree.node(extension) else {
        return QueryRenderError::internal("Extension element outside of an extension.");
    };
    let arg = *arg;
    Ok(tree.insert_above(arg, |arg| Node::Group {
        arg,
        variables: Vec::new(),
        elems: Vec::new(),
    }))
}

fn check_duplicate_aliases(elems: &[ProjectionElem]) -> Result<(), QueryRenderError> {
    let mut seen = FxHashSet::default();
    for elem in elems {
        if !seen.insert(elem.target.as_str()) {
            return Err(QueryRenderError::DuplicateAlias(
                elem.target.as_str().to_owned(),
            ));
        }
    }
    Ok(())
}

/// Every non-aggregated column of a grouped query may only read grouped or aggregated variables.
fn validate_grouping(
    tree: &QueryTree,
    group: NodeId,
    elems: &[ProjectionElem],
) -> Result<(), QueryRenderError> {
    let names = tree.group_binding_names(group);
    for elem in elems {
        match elem.source_expression {
            Some(extension_elem) => {
                let Node::ExtensionElem { name, expr } = tree.node(extension_elem) else {
                    return QueryRenderError::internal(
                        "Projection source is not an extension element.",
                    );
                };
                if matches!(tree.node(*expr), Node::Var(v) if v == name) {
                    continue;
                }
                if let Some(missing) = tree
                    .expression_variables(*expr)
                    .into_iter()
                    .find(|v| !names.contains(v))
                {
                    return Err(QueryRenderError::GroupingViolation {
                        variable: missing.as_str().to_owned(),
                    });
                }
            }
            None => {
                if !names.contains(&elem.target) && !names.contains(&elem.source) {
                    return Err(QueryRenderError::GroupingViolation {
                        variable: elem.source.as_str().to_owned(),
                    });
                }
            }
        }
    }
    Ok(())
}
