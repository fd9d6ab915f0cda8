//! Federated evaluation of SPARQL queries.
//!
//! A [`Federation`] combines SPARQL endpoints and REST services. SERVICE clauses of a query refer
//! to members through the IRIs configured in [`FederationConfig`]. Queries that only need the
//! default member are forwarded unchanged. Other queries are split by the
//! [`ServiceJoinStrategy`], which joins the answers of the members and computes the remaining
//! operators, including aggregates provided by an [`AggregateService`].
//!
//! ```
//! use sparql_federation::{
//!     Federation, FederationConfig, FederationError, HttpSparqlEndpoint, Ownership, SparqlEndpoint,
//! };
//! use std::sync::Arc;
//!
//! # tokio_test::block_on(async {
//! let config = FederationConfig::new("local").with_member("http://example.com/wiki", "wiki");
//! let local: Arc<dyn SparqlEndpoint> = Arc::new(HttpSparqlEndpoint::new("http://localhost:7878/query")?);
//! let wiki: Arc<dyn SparqlEndpoint> = Arc::new(HttpSparqlEndpoint::new("https://example.com/sparql")?);
//! let federation = Federation::new(
//!     config,
//!     [("local".to_owned(), local.into()), ("wiki".to_owned(), wiki.into())],
//! )?;
//!
//! let query = federation
//!     .prepare("SELECT * WHERE { ?s ?p ?o SERVICE <http://example.com/wiki> { ?o ?q ?v } }")?;
//! assert!(matches!(federation.ownership(&query)?, Ownership::Distributed { .. }));
//!
//! let result = federation
//!     .evaluate("SELECT * WHERE { SERVICE <http://example.com/other> { ?s ?p ?o } }")
//!     .await;
//! assert!(matches!(result, Err(FederationError::UnknownMember(_))));
//! # Result::<_, FederationError>::Ok(())
//! # }).unwrap();
//! ```

mod aggregate;
mod config;
mod error;
mod eval;
mod executor;
mod federation;
mod member;
mod strategy;

pub use aggregate::{numeric_value, AggregateRegistry, AggregateService, MedianAggregateService};
pub use config::FederationConfig;
pub use error::FederationError;
pub use executor::{receive, RestExecutor, SHUTDOWN_GRACE_PERIOD};
pub use federation::{Federation, Ownership};
pub use member::{parse_solutions, FederationMember, HttpSparqlEndpoint, SparqlEndpoint};
pub use strategy::ServiceJoinStrategy;
