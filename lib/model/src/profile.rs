use crate::algebra::NodeId;
use std::collections::BTreeMap;

/// The solution modifier of a SELECT.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum QueryModifier {
    Distinct,
    Reduced,
}

/// Describes one query or sub-query of a [`QueryTree`](crate::QueryTree) in the shape needed for
/// turning it back into query text.
///
/// The profile only points into the tree. The fields are filled while walking the tree and are
/// read-only afterward. `having` can only be set once a group is known.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct QueryProfile {
    projection: Option<NodeId>,
    modifier: Option<QueryModifier>,
    where_clause: Option<NodeId>,
    group_by: Option<NodeId>,
    having: Option<NodeId>,
    order_by: Option<NodeId>,
    slice: Option<NodeId>,
    bindings: Option<NodeId>,
    sub_queries: BTreeMap<NodeId, QueryProfile>,
}

impl QueryProfile {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn projection(&self) -> Option<NodeId> {
        self.projection
    }

    pub fn modifier(&self) -> Option<QueryModifier> {
        self.modifier
    }

    pub fn where_clause(&self) -> Option<NodeId> {
        self.where_clause
    }

    pub fn group_by(&self) -> Option<NodeId> {
        self.group_by
    }

    pub fn having(&self) -> Option<NodeId> {
        self.having
    }

    pub fn order_by(&self) -> Option<NodeId> {
        self.order_by
    }

    pub fn slice(&self) -> Option<NodeId> {
        self.slice
    }

    pub fn bindings(&self) -> Option<NodeId> {
        self.bindings
    }

    /// The profiles of all sub-queries, keyed by their projection node.
    pub fn sub_queries(&self) -> &BTreeMap<NodeId, QueryProfile> {
        &self.sub_queries
    }

    pub fn sub_query(&self, projection: NodeId) -> Option<&QueryProfile> {
        self.sub_queries.get(&projection)
    }

    pub fn sub_queries_mut(&mut self) -> &mut BTreeMap<NodeId, QueryProfile> {
        &mut self.sub_queries
    }

    pub fn set_projection(&mut self, projection: NodeId) {
        self.projection = Some(projection);
    }

    pub fn set_modifier(&mut self, modifier: Option<QueryModifier>) {
        self.modifier = modifier;
    }

    /// Sets the root of the where clause unless there already is one.
    pub fn set_where_clause_if_absent(&mut self, node: NodeId) {
        if self.where_clause.is_none() {
            self.where_clause = Some(node);
        }
    }

    pub fn clear_where_clause(&mut self) {
        self.where_clause = None;
    }

    /// Sets the group unless there already is one.
    pub fn set_group_by_if_absent(&mut self, group: NodeId) {
        if self.group_by.is_none() {
            self.group_by = Some(group);
        }
    }

    /// Sets the HAVING filter. Returns `false` and leaves the profile untouched if no group is
    /// known yet.
    pub fn set_having(&mut self, filter: NodeId) -> bool {
        if self.group_by.is_none() {
            return false;
        }
        self.having = Some(filter);
        true
    }

    pub fn set_order_by_if_absent(&mut self, order: NodeId) {
        if self.order_by.is_none() {
            self.order_by = Some(order);
        }
    }

    pub fn set_slice(&mut self, slice: Option<NodeId>) {
        self.slice = slice;
    }

    /// Records a VALUES block unless there already is one.
    pub fn set_bindings_if_absent(&mut self, bindings: NodeId) {
        if self.bindings.is_none() {
            self.bindings = Some(bindings);
        }
    }

    pub fn clear_bindings(&mut self) {
        self.bindings = None;
    }
}
