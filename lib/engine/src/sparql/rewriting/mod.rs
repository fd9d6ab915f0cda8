mod aggregate_rewriter;
mod algebra_builder;
mod query_text;

pub use aggregate_rewriter::{AggregateLookup, AggregateReference, AggregateRewriter};
pub use algebra_builder::AlgebraBuilder;
pub use query_text::QueryText;
