use dashmap::DashMap;
use regex::{Captures, Regex};
use std::sync::LazyLock;

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([^}:]+)(?::([^}]*))?\}").unwrap());

/// Looks up secret values, e.g., API keys referenced from member configuration.
pub trait SecretResolver: Send + Sync {
    fn resolve(&self, key: &str) -> Option<String>;

    /// Replaces every `${key}` and `${key:fallback}` in `value`. Placeholders without a value and
    /// without a fallback are kept as they are.
    fn resolve_placeholders(&self, value: &str) -> String {
        PLACEHOLDER
            .replace_all(value, |captures: &Captures<'_>| {
                self.resolve(&captures[1])
                    .or_else(|| captures.get(2).map(|fallback| fallback.as_str().to_owned()))
                    .unwrap_or_else(|| captures[0].to_owned())
            })
            .into_owned()
    }
}

/// Resolves secrets from environment variables.
#[derive(Clone, Copy, Debug, Default)]
pub struct EnvSecretResolver;

impl SecretResolver for EnvSecretResolver {
    fn resolve(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

#[derive(Debug, Default)]
pub struct MemorySecretResolver {
    secrets: DashMap<String, String>,
}

impl MemorySecretResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, key: impl Into<String>, value: impl Into<String>) {
        self.secrets.insert(key.into(), value.into());
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for MemorySecretResolver {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self {
            secrets: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl SecretResolver for MemorySecretResolver {
    fn resolve(&self, key: &str) -> Option<String> {
        self.secrets.get(key).map(|value| value.value().clone())
    }
}
