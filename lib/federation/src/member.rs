use crate::error::FederationError;
use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::Client;
use sparesults::{QueryResultsFormat, QueryResultsParser, ReaderQueryResultsParserOutput};
use sparql_federation_model::Solution;
use sparql_federation_rest::{RestMember, DEFAULT_USER_AGENT};
use std::fmt::Debug;
use std::sync::Arc;
use tracing::debug;

/// A member that understands SPARQL.
#[async_trait]
pub trait SparqlEndpoint: Debug + Send + Sync {
    /// Evaluates a SELECT query.
    async fn select(&self, query: &str) -> Result<Vec<Solution>, FederationError>;
}

/// A SPARQL endpoint reached through the SPARQL 1.1 protocol.
#[derive(Debug, Clone)]
pub struct HttpSparqlEndpoint {
    url: String,
    client: Client,
}

impl HttpSparqlEndpoint {
    pub fn new(url: impl Into<String>) -> Result<Self, FederationError> {
        let client = Client::builder().user_agent(DEFAULT_USER_AGENT).build()?;
        Ok(Self {
            url: url.into(),
            client,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl SparqlEndpoint for HttpSparqlEndpoint {
    async fn select(&self, query: &str) -> Result<Vec<Solution>, FederationError> {
        debug!(url = %self.url, "Sending query to SPARQL endpoint");
        let response = self
            .client
            .post(&self.url)
            .header(CONTENT_TYPE, "application/sparql-query")
            .header(ACCEPT, "application/sparql-results+json")
            .body(query.to_owned())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FederationError::Endpoint(format!(
                "Request failed with HTTP status code {}: {}",
                status.as_u16(),
                status.canonical_reason().unwrap_or_default()
            )));
        }
        let body = response.bytes().await?;
        parse_solutions(&body)
    }
}

/// Reads solutions from a SPARQL JSON results document.
pub fn parse_solutions(body: &[u8]) -> Result<Vec<Solution>, FederationError> {
    match QueryResultsParser::from_format(QueryResultsFormat::Json).for_reader(body)? {
        ReaderQueryResultsParserOutput::Solutions(solutions) => solutions
            .map(|solution| -> Result<Solution, FederationError> {
                Ok(solution?
                    .iter()
                    .map(|(variable, term)| (variable.clone(), term.clone()))
                    .collect())
            })
            .collect(),
        ReaderQueryResultsParserOutput::Boolean(_) => Err(FederationError::Endpoint(
            "Expected solutions but the endpoint returned a boolean".to_owned(),
        )),
    }
}

/// A member of a federation.
#[derive(Debug, Clone)]
pub enum FederationMember {
    Sparql(Arc<dyn SparqlEndpoint>),
    Rest(Arc<RestMember>),
}

impl FederationMember {
    pub fn is_rest(&self) -> bool {
        matches!(self, FederationMember::Rest(_))
    }
}

impl From<Arc<dyn SparqlEndpoint>> for FederationMember {
    fn from(value: Arc<dyn SparqlEndpoint>) -> Self {
        FederationMember::Sparql(value)
    }
}

impl From<RestMember> for FederationMember {
    fn from(value: RestMember) -> Self {
        FederationMember::Rest(Arc::new(value))
    }
}
