//! Turning SPARQL text into a [`QueryTree`] and back.
//!
//! [`PreparedQuery`] runs the whole pipeline: parsing, building the algebra, binding aggregates
//! to groups and splitting the tree into [`QueryProfile`]s. Rendering the result yields query
//! text that can be sent to any SPARQL 1.1 endpoint.

mod error;
pub mod rendering;
pub mod rewriting;

pub use error::QueryRenderError;

use crate::sparql::rendering::{QueryPreprocessor, QuerySerializer};
use crate::sparql::rewriting::{
    AggregateLookup, AggregateReference, AggregateRewriter, AlgebraBuilder, QueryText,
};
use rustc_hash::FxHashSet;
use sparql_federation_model::{NamedNode, Node, QueryProfile, QueryTree};
use spargebra::{Query, Update};
use tracing::debug;

/// A query whose algebra has been rewritten and preprocessed.
#[derive(Clone, Debug)]
pub struct PreparedQuery {
    tree: QueryTree,
    profile: QueryProfile,
    aggregates: Vec<AggregateReference>,
}

impl PreparedQuery {
    /// Parses a query. Function calls recognized by `lookup` are treated as aggregates.
    pub fn parse(
        query: &str,
        base_iri: Option<&str>,
        lookup: impl AggregateLookup,
    ) -> Result<Self, QueryRenderError> {
        let text = QueryText::new(query, base_iri, &lookup);
        let parsed = match Query::parse(text.text(), base_iri) {
            Ok(parsed) => parsed,
            Err(error) if error.to_string().contains("variable that is unbound") => {
                return Err(Self::grouping_violation(&text, base_iri, &lookup)
                    .unwrap_or(QueryRenderError::Syntax(error)));
            }
            Err(error) => return Err(error.into()),
        };
        let tree = AlgebraBuilder::new()
            .with_aggregate_services(text.services().clone())
            .build_query(&parsed)?;
        Self::from_tree(tree, lookup)
    }

    /// The parser rejects ungrouped columns without naming them. Parsing again with every column
    /// grouped and removing those keys from the tree lets the rewriter report the column.
    fn grouping_violation(
        text: &QueryText,
        base_iri: Option<&str>,
        lookup: &impl AggregateLookup,
    ) -> Option<QueryRenderError> {
        let (relaxed, added) = text.with_relaxed_grouping()?;
        let parsed = Query::parse(&relaxed, base_iri).ok()?;
        let mut tree = AlgebraBuilder::new()
            .with_aggregate_services(text.services().clone())
            .build_query(&parsed)
            .ok()?;
        drop_last_group_keys(&mut tree, added)?;
        match Self::from_tree(tree, lookup) {
            Err(error @ QueryRenderError::GroupingViolation { .. }) => Some(error),
            _ => None,
        }
    }

    /// Parses an update. Updates are never rendered, so this only succeeds for trees that the
    /// preprocessor accepts.
    pub fn parse_update(update: &str, base_iri: Option<&str>) -> Result<Self, QueryRenderError> {
        let update = Update::parse(update, base_iri)?;
        let tree = AlgebraBuilder::new().build_update(&update)?;
        Self::from_tree(tree, FxHashSet::<NamedNode>::default())
    }

    pub fn from_tree(
        mut tree: QueryTree,
        lookup: impl AggregateLookup,
    ) -> Result<Self, QueryRenderError> {
        let aggregates = AggregateRewriter::new(lookup).rewrite(&mut tree)?;
        let profile = QueryPreprocessor::new(&tree).process()?;
        debug!(
            nodes = tree.len(),
            sub_queries = profile.sub_queries().len(),
            aggregates = aggregates.len(),
            "Prepared query"
        );
        Ok(Self {
            tree,
            profile,
            aggregates,
        })
    }

    pub fn tree(&self) -> &QueryTree {
        &self.tree
    }

    pub fn profile(&self) -> &QueryProfile {
        &self.profile
    }

    /// The aggregates found in projection columns.
    pub fn aggregates(&self) -> &[AggregateReference] {
        &self.aggregates
    }

    /// Whether some aggregate has to be computed by an aggregate service.
    pub fn has_service_aggregates(&self) -> bool {
        self.aggregates.iter().any(|a| a.service.is_some())
    }

    pub fn render(&self) -> Result<String, QueryRenderError> {
        QuerySerializer::new(&self.tree, &self.profile).serialize()
    }
}

/// Removes the last `count` keys of the group of the outermost query level.
fn drop_last_group_keys(tree: &mut QueryTree, count: usize) -> Option<()> {
    let mut current = tree.root()?;
    loop {
        current = match tree.node(current) {
            Node::Projection { arg, .. }
            | Node::Slice { arg, .. }
            | Node::Distinct { arg }
            | Node::Reduced { arg }
            | Node::Order { arg, .. }
            | Node::Filter { arg, .. }
            | Node::Extension { arg, .. } => *arg,
            Node::Join { left, .. } => *left,
            Node::Group { .. } => break,
            _ => return None,
        };
    }
    let Node::Group { variables, .. } = tree.node_mut(current) else {
        return None;
    };
    let keep = variables.len().checked_sub(count)?;
    variables.truncate(keep);
    Some(())
}

/// Parses and renders a query in one go.
pub fn render_query(
    query: &str,
    lookup: impl AggregateLookup,
) -> Result<String, QueryRenderError> {
    PreparedQuery::parse(query, None, lookup)?.render()
}
