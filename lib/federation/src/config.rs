use crate::error::FederationError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Configuration of a [`Federation`](crate::Federation).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FederationConfig {
    /// The member that evaluates everything outside of SERVICE clauses.
    pub default_member: String,
    /// Maps service IRIs that queries use to member ids.
    pub members: BTreeMap<String, String>,
    /// In seconds. Zero disables the limit.
    pub max_query_time: u64,
    pub join_worker_threads: usize,
    pub union_worker_threads: usize,
    pub bound_join_block_size: usize,
    /// Concurrent REST calls are bounded by three times this number.
    pub rest_prefetch_size: usize,
    pub use_bound_join: bool,
    /// Keeps SERVICE clauses in the order of the query text. Otherwise REST services are joined
    /// after SPARQL services.
    pub enable_query_hints: bool,
}

impl Default for FederationConfig {
    fn default() -> Self {
        Self {
            default_member: String::new(),
            members: BTreeMap::new(),
            max_query_time: 120,
            join_worker_threads: 8,
            union_worker_threads: 4,
            bound_join_block_size: 15,
            rest_prefetch_size: 5,
            use_bound_join: true,
            enable_query_hints: true,
        }
    }
}

impl FederationConfig {
    pub fn new(default_member: impl Into<String>) -> Self {
        Self {
            default_member: default_member.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_member(mut self, service_iri: impl Into<String>, member: impl Into<String>) -> Self {
        self.members.insert(service_iri.into(), member.into());
        self
    }

    /// Checks the configuration and reports all problems at once.
    pub fn validate(&self) -> Result<(), FederationError> {
        let mut errors = Vec::new();
        if self.members.is_empty() {
            errors.push("No federation members were configured.".to_owned());
        }
        if self.default_member.trim().is_empty() {
            errors.push("Default member was not defined.".to_owned());
        }
        if self.members.values().any(|member| member.trim().is_empty()) {
            errors.push("Delegate repository ID is not provided".to_owned());
        }
        if self.rest_prefetch_size == 0 {
            errors.push("The REST prefetch size must be at least 1.".to_owned());
        }
        if self.bound_join_block_size == 0 {
            errors.push("The bound join block size must be at least 1.".to_owned());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(FederationError::Configuration(errors))
        }
    }

    pub fn max_query_time(&self) -> Option<Duration> {
        (self.max_query_time > 0).then(|| Duration::from_secs(self.max_query_time))
    }

    /// The number of REST calls that may be in flight at the same time.
    pub fn rest_concurrency(&self) -> usize {
        3 * self.rest_prefetch_size.max(1)
    }

    /// Returns the member id for a service IRI.
    pub fn member_for(&self, service_iri: &str) -> Option<&str> {
        self.members.get(service_iri).map(String::as_str)
    }
}
