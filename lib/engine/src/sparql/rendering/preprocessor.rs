use crate::sparql::error::QueryRenderError;
use sparql_federation_model::{Node, NodeId, QueryModifier, QueryProfile, QueryTree};
use std::collections::BTreeMap;

/// Splits a [`QueryTree`] into the clauses of the query text.
///
/// The tree is walked depth-first. Each SELECT level gets its own [`QueryProfile`]; profiles of
/// sub-selects are registered on the returned top-level profile under their projection node.
pub struct QueryPreprocessor<'tree> {
    tree: &'tree QueryTree,
    current: QueryProfile,
    stack: Vec<QueryProfile>,
    sub_queries: BTreeMap<NodeId, QueryProfile>,
    /// DISTINCT or REDUCED waiting for the next projection.
    modifier: Option<QueryModifier>,
    /// LIMIT and OFFSET waiting for the next projection.
    slice: Option<NodeId>,
}

impl<'tree> QueryPreprocessor<'tree> {
    pub fn new(tree: &'tree QueryTree) -> Self {
        Self {
            tree,
            current: QueryProfile::new(),
            stack: Vec::new(),
            sub_queries: BTreeMap::new(),
            modifier: None,
            slice: None,
        }
    }

    pub fn process(mut self) -> Result<QueryProfile, QueryRenderError> {
        let Some(root) = self.tree.root() else {
            return QueryRenderError::internal("Query tree has no root.");
        };
        self.visit(root)?;

        if !self.stack.is_empty() {
            return QueryRenderError::internal("Unbalanced sub-select stack.");
        }
        let mut profile = self.current;
        *profile.sub_queries_mut() = self.sub_queries;
        remove_inlined_bindings(self.tree, &mut profile);
        Ok(profile)
    }

    fn visit(&mut self, id: NodeId) -> Result<(), QueryRenderError> {
        let tree = self.tree;
        match tree.node(id) {
            Node::Projection { arg, .. } => self.visit_projection(id, *arg),
            Node::Distinct { arg } => {
                self.modifier = Some(QueryModifier::Distinct);
                self.visit(*arg)
            }
            Node::Reduced { arg } => {
                self.modifier = Some(QueryModifier::Reduced);
                self.visit(*arg)
            }
            Node::Slice { arg, .. } => {
                self.slice = Some(id);
                self.visit(*arg)
            }
            Node::Order { arg, .. } => {
                self.current.set_order_by_if_absent(id);
                self.visit(*arg)
            }
            Node::Group { arg, .. } => {
                // Everything seen so far sits above the group and is not part of WHERE.
                self.current.clear_where_clause();
                self.current.set_group_by_if_absent(id);
                if let Some(parent) = tree.parent(id) {
                    if matches!(tree.node(parent), Node::Filter { arg, .. } if *arg == id) {
                        self.current.set_having(parent);
                    }
                }
                self.visit(*arg)
            }
            Node::Filter { .. }
            | Node::Extension { .. }
            | Node::Join { .. }
            | Node::NaryJoin { .. }
            | Node::LeftJoin { .. }
            | Node::Union { .. }
            | Node::Difference { .. }
            | Node::Intersection { .. }
            | Node::StatementPattern { .. }
            | Node::Service { .. } => {
                self.current.set_where_clause_if_absent(id);
                self.visit_children(id)
            }
            Node::BindingSetAssignment { .. } => {
                self.current.set_bindings_if_absent(id);
                Ok(())
            }
            Node::Update(_) => Err(QueryRenderError::only_select()),
            _ => self.visit_children(id),
        }
    }

    fn visit_children(&mut self, id: NodeId) -> Result<(), QueryRenderError> {
        for child in self.tree.children(id) {
            self.visit(child)?;
        }
        Ok(())
    }

    fn visit_projection(&mut self, id: NodeId, arg: NodeId) -> Result<(), QueryRenderError> {
        let nested =
            self.current.where_clause().is_some() || self.current.projection().is_some();
        if !nested {
            self.current.set_projection(id);
            self.current.set_modifier(self.modifier.take());
            self.current.set_slice(self.slice.take());
            return self.visit(arg);
        }

        // A sub-select directly below a projection is the where clause of the outer query.
        self.current.set_where_clause_if_absent(id);

        let mut profile = QueryProfile::new();
        profile.set_projection(id);
        profile.set_modifier(self.modifier.take());
        profile.set_slice(self.slice.take());

        let outer = std::mem::replace(&mut self.current, profile);
        self.stack.push(outer);
        let result = self.visit(arg);
        let Some(outer) = self.stack.pop() else {
            return QueryRenderError::internal("Unbalanced sub-select stack.");
        };
        let finished = std::mem::replace(&mut self.current, outer);
        self.sub_queries.insert(id, finished);
        result
    }
}

/// A VALUES block inside a where clause is rendered there and must not be repeated after the
/// query.
fn remove_inlined_bindings(tree: &QueryTree, profile: &mut QueryProfile) {
    clear_if_inlined(tree, profile);
    for sub_query in profile.sub_queries_mut().values_mut() {
        clear_if_inlined(tree, sub_query);
    }
}

fn clear_if_inlined(tree: &QueryTree, profile: &mut QueryProfile) {
    if let (Some(bindings), Some(where_clause)) = (profile.bindings(), profile.where_clause()) {
        if bindings == where_clause || tree.is_ancestor(where_clause, bindings) {
            profile.clear_bindings();
        }
    }
}
