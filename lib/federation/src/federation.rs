use crate::aggregate::AggregateRegistry;
use crate::config::FederationConfig;
use crate::error::FederationError;
use crate::executor::{RestExecutor, SHUTDOWN_GRACE_PERIOD};
use crate::member::FederationMember;
use crate::strategy::ServiceJoinStrategy;
use rustc_hash::FxHashMap;
use sparql_federation_engine::PreparedQuery;
use sparql_federation_model::{AggregateFunction, Node, PatternTerm, Solution, Term};
use std::collections::BTreeSet;
use std::sync::{Arc, OnceLock};
use tracing::{debug, instrument};

/// Who has to evaluate a query.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Ownership {
    /// The whole query can be sent to one member.
    Single(String),
    /// The query spans several members or needs aggregate services.
    Distributed {
        members: BTreeSet<String>,
        rest_members: BTreeSet<String>,
    },
}

/// A set of members that answers queries together.
///
/// Queries that only touch the default member, or SERVICE clauses mapped to it, are delegated as
/// a whole. Everything else goes through the [`ServiceJoinStrategy`].
#[derive(Debug)]
pub struct Federation {
    config: Arc<FederationConfig>,
    members: Arc<FxHashMap<String, FederationMember>>,
    registry: Arc<AggregateRegistry>,
    executor: OnceLock<Arc<RestExecutor>>,
}

impl Federation {
    pub fn new(
        config: FederationConfig,
        members: impl IntoIterator<Item = (String, FederationMember)>,
    ) -> Result<Self, FederationError> {
        config.validate()?;
        let members = members.into_iter().collect::<FxHashMap<_, _>>();
        if !members.contains_key(&config.default_member) {
            return Err(FederationError::UnknownMember(config.default_member));
        }
        Ok(Self {
            config: Arc::new(config),
            members: Arc::new(members),
            registry: Arc::new(AggregateRegistry::default()),
            executor: OnceLock::new(),
        })
    }

    /// Replaces the aggregate services.
    #[must_use]
    pub fn with_registry(mut self, registry: AggregateRegistry) -> Self {
        self.registry = Arc::new(registry);
        self
    }

    pub fn config(&self) -> &FederationConfig {
        &self.config
    }

    pub fn registry(&self) -> &AggregateRegistry {
        &self.registry
    }

    /// The executor for REST calls. Created on first use.
    pub fn executor(&self) -> &Arc<RestExecutor> {
        self.executor
            .get_or_init(|| Arc::new(RestExecutor::new(self.config.rest_concurrency())))
    }

    /// Parses a query. Function calls to registered aggregate services become aggregates.
    pub fn prepare(&self, query: &str) -> Result<PreparedQuery, FederationError> {
        Ok(PreparedQuery::parse(query, None, &*self.registry)?)
    }

    /// Updates are not supported. This only reports why.
    pub fn update(&self, update: &str) -> Result<(), FederationError> {
        PreparedQuery::parse_update(update, None)?;
        FederationError::not_implemented("Updates of a federation")
    }

    /// Finds the members a query refers to.
    pub fn ownership(&self, query: &PreparedQuery) -> Result<Ownership, FederationError> {
        let tree = query.tree();
        let default = self.config.default_member.as_str();
        let mut owners = BTreeSet::from([default.to_owned()]);
        let mut plural = query.has_service_aggregates();

        for id in tree.root().map(|root| tree.descendants(root)).unwrap_or_default() {
            match tree.node(id) {
                Node::Service { service, .. } => match service {
                    PatternTerm::Constant(Term::NamedNode(iri)) => {
                        let member = self
                            .config
                            .member_for(iri.as_str())
                            .ok_or_else(|| FederationError::UnknownMember(iri.to_string()))?;
                        plural |= member != default;
                        owners.insert(member.to_owned());
                    }
                    _ => plural = true,
                },
                Node::StatementPattern {
                    context: Some(PatternTerm::Constant(Term::NamedNode(iri))),
                    ..
                } => {
                    if let Some(member) = self.config.member_for(iri.as_str()) {
                        plural |= member != default;
                        owners.insert(member.to_owned());
                    }
                }
                Node::Aggregate {
                    function: AggregateFunction::Service(_),
                    ..
                } => plural = true,
                _ => {}
            }
        }

        let mut rest_members = BTreeSet::new();
        for owner in &owners {
            let member = self
                .members
                .get(owner)
                .ok_or_else(|| FederationError::UnknownMember(owner.clone()))?;
            if member.is_rest() {
                rest_members.insert(owner.clone());
            }
        }

        if plural || !rest_members.is_empty() {
            Ok(Ownership::Distributed {
                members: owners,
                rest_members,
            })
        } else {
            Ok(Ownership::Single(default.to_owned()))
        }
    }

    /// Parses and evaluates a SELECT query.
    pub async fn evaluate(&self, query: &str) -> Result<Vec<Solution>, FederationError> {
        let query = self.prepare(query)?;
        self.evaluate_prepared(&query).await
    }

    /// Evaluates a query within the maximum query time.
    #[instrument(skip_all)]
    pub async fn evaluate_prepared(
        &self,
        query: &PreparedQuery,
    ) -> Result<Vec<Solution>, FederationError> {
        match self.config.max_query_time() {
            Some(limit) => tokio::time::timeout(limit, self.dispatch(query))
                .await
                .map_err(|_| FederationError::Timeout(limit))?,
            None => self.dispatch(query).await,
        }
    }

    async fn dispatch(&self, query: &PreparedQuery) -> Result<Vec<Solution>, FederationError> {
        match self.ownership(query)? {
            Ownership::Single(owner) => {
                let Some(FederationMember::Sparql(endpoint)) = self.members.get(&owner) else {
                    return Err(FederationError::UnknownMember(owner));
                };
                debug!(member = %owner, "Delegating query to a single member");
                endpoint.select(&query.render()?).await
            }
            Ownership::Distributed {
                members,
                rest_members,
            } => {
                debug!(?members, ?rest_members, "Evaluating distributed query");
                ServiceJoinStrategy::new(
                    Arc::clone(&self.config),
                    Arc::clone(&self.members),
                    rest_members,
                    Arc::clone(&self.registry),
                    Arc::clone(self.executor()),
                )
                .evaluate(query)
                .await
            }
        }
    }

    /// Shuts the REST executor down if it was ever used.
    pub async fn shutdown(&self) {
        if let Some(executor) = self.executor.get() {
            executor.shutdown(SHUTDOWN_GRACE_PERIOD).await;
        }
    }
}
