use spargebra::SparqlSyntaxError;
use std::convert::Infallible;

/// An error while turning a query into an algebra tree or back into query text.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum QueryRenderError {
    /// An error in SPARQL parsing.
    #[error(transparent)]
    Syntax(#[from] SparqlSyntaxError),
    /// The query uses an operation or operator that cannot be rendered.
    #[error("{0}")]
    UnsupportedConstruct(String),
    /// A projected variable is neither grouped nor aggregated.
    #[error("variable '{variable}' in projection not present in GROUP BY.")]
    GroupingViolation { variable: String },
    /// The same alias is bound twice by one projection.
    #[error("duplicate use of alias '{0}' in projection.")]
    DuplicateAlias(String),
    #[error("An internal error that likely indicates towards a bug: {0}")]
    InternalError(String),
}

impl QueryRenderError {
    /// The error for write operations and other non-SELECT forms.
    pub fn only_select() -> Self {
        Self::UnsupportedConstruct("Only SELECT queries are supported".to_owned())
    }

    pub fn unsupported_operator(operator: &str) -> Self {
        Self::UnsupportedConstruct(format!("Unsupported operator: {operator}"))
    }

    pub fn internal<T>(cause: impl Into<String>) -> Result<T, Self> {
        Err(Self::InternalError(cause.into()))
    }
}

impl From<Infallible> for QueryRenderError {
    #[inline]
    fn from(error: Infallible) -> Self {
        match error {}
    }
}
