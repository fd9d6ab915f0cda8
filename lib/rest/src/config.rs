use crate::secrets::SecretResolver;
use crate::transport::HttpMethod;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The user agent sent when the configuration does not name one.
pub const DEFAULT_USER_AGENT: &str = concat!("sparql-federation/", env!("CARGO_PKG_VERSION"));

/// Configuration of a REST member.
///
/// Header values may contain `${key}` or `${key:fallback}` placeholders. They are resolved when
/// the member is created; the configuration itself keeps them unresolved.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RestMemberConfig {
    pub url: String,
    pub http_method: HttpMethod,
    pub headers: BTreeMap<String, String>,
    pub user_agent: String,
    pub requests_per_second: Option<u32>,
    /// The IRI of the service descriptor.
    pub service_iri: Option<String>,
}

impl Default for RestMemberConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            http_method: HttpMethod::Get,
            headers: BTreeMap::new(),
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            requests_per_second: None,
            service_iri: None,
        }
    }
}

impl RestMemberConfig {
    pub fn new(url: impl Into<String>, service_iri: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            service_iri: Some(service_iri.into()),
            ..Self::default()
        }
    }

    /// Returns all problems of this configuration.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if self.url.trim().is_empty() {
            errors.push("REST member URL is not provided".to_owned());
        }
        if self.user_agent.trim().is_empty() {
            errors.push("REST member user agent is not provided".to_owned());
        }
        if self.service_iri.as_deref().map_or(true, str::is_empty) {
            errors.push("REST member service IRI is not provided".to_owned());
        }
        if self.requests_per_second == Some(0) {
            errors.push("REST member rate limit must be positive".to_owned());
        }
        errors
    }

    pub fn resolved_headers(&self, secrets: &dyn SecretResolver) -> Vec<(String, String)> {
        self.headers
            .iter()
            .map(|(name, value)| (name.clone(), secrets.resolve_placeholders(value)))
            .collect()
    }
}
