use sparesults::QueryResultsParseError;
use sparql_federation_engine::QueryRenderError;
use sparql_federation_rest::RestError;
use std::time::Duration;

/// An error of a federated query.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum FederationError {
    /// The query cannot be turned into the algebra or back into text.
    #[error(transparent)]
    Render(#[from] QueryRenderError),
    /// A SERVICE or graph IRI, or a configured mapping, refers to a member that does not exist.
    #[error("Unknown federation member: {0}")]
    UnknownMember(String),
    /// A REST member failed.
    #[error(transparent)]
    Rest(#[from] RestError),
    /// A SPARQL endpoint answered with a non-success status or could not be reached.
    #[error("{0}")]
    Endpoint(String),
    #[error(transparent)]
    ResultsParsing(#[from] QueryResultsParseError),
    /// The configuration is invalid. Holds every problem found.
    #[error("Invalid federation configuration: {}", .0.join(" "))]
    Configuration(Vec<String>),
    /// The evaluation did not finish within the maximum query time.
    #[error("Query evaluation exceeded the maximum query time of {0:?}")]
    Timeout(Duration),
    /// The query has a shape that distributed evaluation does not handle.
    #[error("Not implemented: {0}")]
    NotImplemented(String),
    /// The executor was shut down while the call was pending.
    #[error("The REST executor has been shut down")]
    ExecutorShutdown,
}

impl FederationError {
    pub fn not_implemented<T>(what: impl Into<String>) -> Result<T, Self> {
        Err(Self::NotImplemented(what.into()))
    }
}

impl From<reqwest::Error> for FederationError {
    fn from(error: reqwest::Error) -> Self {
        Self::Endpoint(error.to_string())
    }
}
