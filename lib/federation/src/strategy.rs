//! Distributed evaluation of queries that span several members.
//!
//! Operands of the where clause that do not reference a SERVICE are sent together to the default
//! member. SERVICE operands are then joined one after another: SPARQL members receive the current
//! solutions in blocks as a trailing VALUES clause, REST members are called once per solution.
//! Grouping, HAVING, ORDER BY, projection and slicing are applied locally afterwards.

use crate::aggregate::AggregateRegistry;
use crate::config::FederationConfig;
use crate::error::FederationError;
use crate::eval::{aggregate, effective_boolean, evaluate, order_terms};
use crate::executor::{receive, RestExecutor};
use crate::member::{FederationMember, SparqlEndpoint};
use futures::future::{try_join_all, BoxFuture};
use futures::{FutureExt, StreamExt, TryStreamExt};
use itertools::Itertools;
use rustc_hash::FxHashMap;
use sparql_federation_engine::sparql::rendering::QuerySerializer;
use sparql_federation_engine::PreparedQuery;
use sparql_federation_model::{
    Node, NodeId, QueryModifier, QueryProfile, QueryTree, Solution, Term, Variable,
};
use sparql_federation_rest::{RestMember, ServicePattern};
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, warn};

type SolutionsResult = Result<Vec<Solution>, FederationError>;

/// Numbers the VALUES rows of a bound join. Answers are matched to their row through it.
const INDEX_VARIABLE: &str = "__index";

/// Evaluates queries with SERVICE clauses that point to different members.
#[derive(Debug)]
pub struct ServiceJoinStrategy {
    config: Arc<FederationConfig>,
    members: Arc<FxHashMap<String, FederationMember>>,
    rest_members: BTreeSet<String>,
    registry: Arc<AggregateRegistry>,
    executor: Arc<RestExecutor>,
}

impl ServiceJoinStrategy {
    pub fn new(
        config: Arc<FederationConfig>,
        members: Arc<FxHashMap<String, FederationMember>>,
        rest_members: BTreeSet<String>,
        registry: Arc<AggregateRegistry>,
        executor: Arc<RestExecutor>,
    ) -> Self {
        Self {
            config,
            members,
            rest_members,
            registry,
            executor,
        }
    }

    /// The referenced members that are REST services.
    pub fn rest_members(&self) -> &BTreeSet<String> {
        &self.rest_members
    }

    pub async fn evaluate(&self, query: &PreparedQuery) -> SolutionsResult {
        debug!(
            rest_members = ?self.rest_members,
            sub_queries = query.profile().sub_queries().len(),
            "Starting distributed evaluation"
        );
        self.level(query.tree(), query.profile(), query.profile())
            .await
    }

    /// Evaluates one SELECT level. `root` is the profile of the whole query, which knows every
    /// sub-select and is needed to render fragments.
    fn level<'a>(
        &'a self,
        tree: &'a QueryTree,
        root: &'a QueryProfile,
        profile: &'a QueryProfile,
    ) -> BoxFuture<'a, SolutionsResult> {
        async move { self.level_inner(tree, root, profile).await }.boxed()
    }

    async fn level_inner(
        &self,
        tree: &QueryTree,
        root: &QueryProfile,
        profile: &QueryProfile,
    ) -> SolutionsResult {
        let mut solutions = match profile.where_clause() {
            Some(where_clause) => self.pattern(tree, root, where_clause).await?,
            None => vec![Solution::new()],
        };

        if let Some(group) = profile.group_by() {
            solutions = self.group(tree, group, &solutions)?;
            if let Some(having) = profile.having() {
                let Node::Filter { condition, .. } = tree.node(having) else {
                    return FederationError::not_implemented("HAVING without a filter");
                };
                solutions = filter(tree, *condition, solutions)?;
            }
        }
        if let Some(bindings) = profile.bindings() {
            solutions = join(&solutions, &values(tree, bindings)?);
        }

        let projection = match profile.projection() {
            Some(projection) => match tree.node(projection) {
                Node::Projection { elems, .. } => Some(elems),
                _ => return FederationError::not_implemented("Projection of another kind"),
            },
            None => None,
        };
        if let Some(elems) = projection {
            let expressions = elems
                .iter()
                .filter_map(|elem| elem.source_expression)
                .collect::<Vec<_>>();
            extend(tree, &expressions, &mut solutions)?;
        }
        if let Some(order) = profile.order_by() {
            sort(tree, order, &mut solutions)?;
        }
        if let Some(elems) = projection {
            solutions = solutions
                .into_iter()
                .map(|solution| {
                    elems
                        .iter()
                        .filter_map(|elem| {
                            let term = solution.get(&elem.source)?;
                            Some((elem.target.clone(), term.clone()))
                        })
                        .collect()
                })
                .collect();
        }
        if matches!(
            profile.modifier(),
            Some(QueryModifier::Distinct | QueryModifier::Reduced)
        ) {
            solutions = solutions.into_iter().unique().collect();
        }
        if let Some(slice) = profile.slice() {
            if let Node::Slice { offset, limit, .. } = tree.node(slice) {
                solutions = solutions
                    .into_iter()
                    .skip(*offset)
                    .take(limit.unwrap_or(usize::MAX))
                    .collect();
            }
        }
        Ok(solutions)
    }

    fn pattern<'a>(
        &'a self,
        tree: &'a QueryTree,
        profile: &'a QueryProfile,
        node: NodeId,
    ) -> BoxFuture<'a, SolutionsResult> {
        async move {
            if !contains_service(tree, node) {
                return self.default_fragment(tree, profile, &[node]).await;
            }
            match tree.node(node) {
                Node::Join { .. } | Node::NaryJoin { .. } => self.join(tree, profile, node).await,
                Node::Service { .. } => {
                    self.service(tree, profile, node, vec![Solution::new()])
                        .await
                }
                Node::Union { left, right } => {
                    let branches: Vec<Vec<Solution>> = futures::stream::iter([
                        self.pattern(tree, profile, *left),
                        self.pattern(tree, profile, *right),
                    ])
                        .buffer_unordered(self.config.union_worker_threads.max(1))
                        .try_collect()
                        .await?;
                    Ok(branches.into_iter().flatten().collect())
                }
                Node::Filter { arg, condition } => {
                    let solutions = self.pattern(tree, profile, *arg).await?;
                    filter(tree, *condition, solutions)
                }
                Node::Extension { arg, elems } => {
                    let mut solutions = self.pattern(tree, profile, *arg).await?;
                    extend(tree, elems, &mut solutions)?;
                    Ok(solutions)
                }
                Node::LeftJoin {
                    left,
                    right,
                    condition,
                } => {
                    let (left, right) = futures::try_join!(
                        self.pattern(tree, profile, *left),
                        self.pattern(tree, profile, *right)
                    )?;
                    left_join(tree, *condition, left, &right)
                }
                Node::Difference { left, right } => {
                    let (left, right) = futures::try_join!(
                        self.pattern(tree, profile, *left),
                        self.pattern(tree, profile, *right)
                    )?;
                    Ok(minus(left, &right))
                }
                Node::Projection { .. } => {
                    let Some(sub_query) = profile.sub_query(node) else {
                        return FederationError::not_implemented("Sub-select without a profile");
                    };
                    debug!(%node, "Evaluating sub-select");
                    self.level(tree, profile, sub_query).await
                }
                node => FederationError::not_implemented(format!(
                    "{} around a SERVICE clause",
                    node.kind()
                )),
            }
        }
        .boxed()
    }

    async fn join(
        &self,
        tree: &QueryTree,
        profile: &QueryProfile,
        node: NodeId,
    ) -> SolutionsResult {
        let (local, mut remote): (Vec<_>, Vec<_>) = join_operands(tree, node)
            .into_iter()
            .partition(|operand| !contains_service(tree, *operand));
        // Without hints, REST services go last so that their inputs are bound by then.
        if !self.config.enable_query_hints {
            remote.sort_by_key(|operand| self.is_rest_service(tree, *operand));
        }

        let mut solutions = if local.is_empty() {
            vec![Solution::new()]
        } else {
            self.default_fragment(tree, profile, &local).await?
        };
        for operand in remote {
            if solutions.is_empty() {
                break;
            }
            solutions = match tree.node(operand) {
                Node::Service { .. } => self.service(tree, profile, operand, solutions).await?,
                _ => {
                    let right = self.pattern(tree, profile, operand).await?;
                    join(&solutions, &right)
                }
            };
        }
        Ok(solutions)
    }

    async fn service(
        &self,
        tree: &QueryTree,
        profile: &QueryProfile,
        node: NodeId,
        left: Vec<Solution>,
    ) -> SolutionsResult {
        let Node::Service {
            service,
            arg,
            silent,
        } = tree.node(node)
        else {
            return FederationError::not_implemented("Service of another kind");
        };
        let Some(Term::NamedNode(iri)) = service.constant() else {
            return FederationError::not_implemented("SERVICE with a variable reference");
        };
        let member_id = self
            .config
            .member_for(iri.as_str())
            .ok_or_else(|| FederationError::UnknownMember(iri.to_string()))?;
        let member = self
            .members
            .get(member_id)
            .ok_or_else(|| FederationError::UnknownMember(member_id.to_owned()))?;

        let result = match member {
            FederationMember::Sparql(endpoint) => {
                self.bound_join(tree, profile, endpoint, *arg, &left).await
            }
            FederationMember::Rest(rest) => self.rest_join(tree, rest, *arg, &left).await,
        };
        match result {
            Err(error) if *silent => {
                warn!(service = %iri, %error, "Ignoring failure of a SILENT service");
                Ok(left)
            }
            result => result,
        }
    }

    /// Sends the body of a SERVICE clause with blocks of the current solutions as VALUES.
    async fn bound_join(
        &self,
        tree: &QueryTree,
        profile: &QueryProfile,
        endpoint: &Arc<dyn SparqlEndpoint>,
        body: NodeId,
        left: &[Solution],
    ) -> SolutionsResult {
        let fragment = QuerySerializer::new(tree, profile).serialize_fragment(&[body])?;
        let shared = pattern_variables(tree, body)
            .into_iter()
            .filter(|variable| left.iter().any(|solution| solution.contains(variable)))
            .collect::<Vec<_>>();

        if !self.config.use_bound_join || shared.is_empty() {
            let right = endpoint.select(&fragment).await?;
            return Ok(join(left, &right));
        }

        let index = Variable::new_unchecked(INDEX_VARIABLE);
        let requests: Vec<BoxFuture<'_, SolutionsResult>> = left
            .chunks(self.config.bound_join_block_size.max(1))
            .map(|block| {
                let (rows, positions) = values_rows(&shared, block);
                let query = with_values(&fragment, &shared, &index, &rows);
                let index = &index;
                async move {
                    let right = endpoint.select(&query).await?;
                    merge_by_index(block, &positions, index, right)
                }
                .boxed()
            })
            .collect();
        let blocks: Vec<Vec<Solution>> =
            futures::stream::iter(requests)
                .buffer_unordered(self.config.join_worker_threads.max(1))
                .try_collect()
                .await?;
        Ok(blocks.into_iter().flatten().collect())
    }

    /// Calls a REST member once per solution. The calls run on the executor.
    async fn rest_join(
        &self,
        tree: &QueryTree,
        member: &Arc<RestMember>,
        body: NodeId,
        left: &[Solution],
    ) -> SolutionsResult {
        let patterns: Arc<[ServicePattern]> = service_patterns(tree, body)?.into();
        let receivers = left
            .iter()
            .map(|binding| {
                let member = Arc::clone(member);
                let patterns = Arc::clone(&patterns);
                let binding = binding.clone();
                self.executor
                    .submit(async move { member.evaluate(&patterns, &binding).await })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let results = try_join_all(
            receivers
                .into_iter()
                .map(|receiver| async move { Ok::<_, FederationError>(receive(receiver).await??) }),
        )
        .await?;
        Ok(results.into_iter().flatten().collect())
    }

    fn is_rest_service(&self, tree: &QueryTree, node: NodeId) -> bool {
        let Node::Service { service, .. } = tree.node(node) else {
            return false;
        };
        match service.constant() {
            Some(Term::NamedNode(iri)) => self
                .config
                .member_for(iri.as_str())
                .is_some_and(|member| self.rest_members.contains(member)),
            _ => false,
        }
    }

    async fn default_fragment(
        &self,
        tree: &QueryTree,
        profile: &QueryProfile,
        operands: &[NodeId],
    ) -> SolutionsResult {
        let member = self
            .members
            .get(&self.config.default_member)
            .ok_or_else(|| FederationError::UnknownMember(self.config.default_member.clone()))?;
        let FederationMember::Sparql(endpoint) = member else {
            return FederationError::not_implemented("Patterns outside of SERVICE on a REST member");
        };
        let query = QuerySerializer::new(tree, profile).serialize_fragment(operands)?;
        debug!(member = %self.config.default_member, "Evaluating fragment on the default member");
        endpoint.select(&query).await
    }

    fn group(
        &self,
        tree: &QueryTree,
        group: NodeId,
        solutions: &[Solution],
    ) -> SolutionsResult {
        let Node::Group {
            variables, elems, ..
        } = tree.node(group)
        else {
            return FederationError::not_implemented("Group of another kind");
        };

        let mut keys: Vec<Solution> = Vec::new();
        let mut members: FxHashMap<Solution, Vec<Solution>> = FxHashMap::default();
        for solution in solutions {
            let key = solution.project(variables);
            members
                .entry(key.clone())
                .or_insert_with(|| {
                    keys.push(key);
                    Vec::new()
                })
                .push(solution.clone());
        }
        // Aggregates without GROUP BY have one group even without solutions.
        if keys.is_empty() && variables.is_empty() {
            keys.push(Solution::new());
        }

        let mut result = Vec::with_capacity(keys.len());
        for key in keys {
            let group_members = members.get(&key).map_or(&[][..], Vec::as_slice);
            let mut row = key.clone();
            for elem in elems {
                if let Some(value) = aggregate(tree, &self.registry, elem.operator, group_members)?
                {
                    row.insert(elem.name.clone(), value);
                }
            }
            result.push(row);
        }
        Ok(result)
    }
}

fn contains_service(tree: &QueryTree, node: NodeId) -> bool {
    tree.descendants(node)
        .into_iter()
        .any(|id| matches!(tree.node(id), Node::Service { .. }))
}

fn join_operands(tree: &QueryTree, node: NodeId) -> Vec<NodeId> {
    match tree.node(node) {
        Node::Join { left, right } => {
            let mut operands = join_operands(tree, *left);
            operands.extend(join_operands(tree, *right));
            operands
        }
        Node::NaryJoin { args } => args
            .iter()
            .flat_map(|arg| join_operands(tree, *arg))
            .collect(),
        _ => vec![node],
    }
}

/// The variables that a pattern can bind.
fn pattern_variables(tree: &QueryTree, node: NodeId) -> Vec<Variable> {
    let mut variables = Vec::new();
    for id in tree.descendants(node) {
        match tree.node(id) {
            Node::StatementPattern {
                subject,
                predicate,
                object,
                context,
            } => variables.extend(
                [Some(subject), Some(predicate), Some(object), context.as_ref()]
                    .into_iter()
                    .flatten()
                    .filter_map(|term| term.variable().cloned()),
            ),
            Node::BindingSetAssignment {
                variables: bound, ..
            } => variables.extend(bound.iter().cloned()),
            Node::ExtensionElem { name, .. } => variables.push(name.clone()),
            _ => {}
        }
    }
    variables.into_iter().unique().collect()
}

fn service_patterns(
    tree: &QueryTree,
    node: NodeId,
) -> Result<Vec<ServicePattern>, FederationError> {
    let mut patterns = Vec::new();
    for id in tree.descendants(node) {
        match tree.node(id) {
            Node::StatementPattern {
                subject,
                predicate,
                object,
                context: None,
            } => patterns.push(ServicePattern {
                subject: subject.clone(),
                predicate: predicate.clone(),
                object: object.clone(),
            }),
            Node::Join { .. } | Node::NaryJoin { .. } | Node::SingletonSet => {}
            node => {
                return FederationError::not_implemented(format!(
                    "{} inside a REST SERVICE clause",
                    node.kind()
                ))
            }
        }
    }
    Ok(patterns)
}

/// Projects the solutions of a block onto the shared variables. Blank nodes cannot be sent back
/// and are left unbound. Returns the distinct rows and, for each solution, the position of its row.
fn values_rows(
    variables: &[Variable],
    block: &[Solution],
) -> (Vec<Vec<Option<Term>>>, Vec<usize>) {
    let mut rows = Vec::new();
    let mut seen = FxHashMap::default();
    let positions = block
        .iter()
        .map(|solution| {
            let row = variables
                .iter()
                .map(|variable| match solution.get(variable) {
                    None | Some(Term::BlankNode(_)) => None,
                    Some(term) => Some(term.clone()),
                })
                .collect::<Vec<_>>();
            let next = rows.len();
            let position = *seen.entry(row.clone()).or_insert(next);
            if position == next {
                rows.push(row);
            }
            position
        })
        .collect();
    (rows, positions)
}

/// Appends the rows as VALUES. Every row carries its position in `index`.
fn with_values(
    fragment: &str,
    variables: &[Variable],
    index: &Variable,
    rows: &[Vec<Option<Term>>],
) -> String {
    let header = variables.iter().chain([index]).join(" ");
    let rows = rows
        .iter()
        .enumerate()
        .map(|(position, row)| {
            let row = row
                .iter()
                .map(|term| term.as_ref().map_or_else(|| "UNDEF".to_owned(), Term::to_string))
                .chain([position.to_string()])
                .join(" ");
            format!("({row})")
        })
        .join(" ");
    format!("{fragment}VALUES ({header}) {{ {rows} }}\n")
}

/// Joins each solution of a block with the answers to its VALUES row. The answers still have to
/// be compatible, since blank nodes were sent as UNDEF.
fn merge_by_index(
    block: &[Solution],
    positions: &[usize],
    index: &Variable,
    right: Vec<Solution>,
) -> SolutionsResult {
    let mut answers: FxHashMap<usize, Vec<Solution>> = FxHashMap::default();
    for mut solution in right {
        let position = match solution.remove(index) {
            Some(Term::Literal(literal)) => literal.value().parse::<usize>().ok(),
            _ => None,
        };
        let Some(position) = position else {
            return Err(FederationError::Endpoint(format!(
                "Bound join answer without a valid ?{INDEX_VARIABLE} binding"
            )));
        };
        answers.entry(position).or_default().push(solution);
    }

    Ok(block
        .iter()
        .zip(positions)
        .flat_map(|(solution, position)| {
            answers
                .get(position)
                .into_iter()
                .flatten()
                .filter(|answer| solution.is_compatible(answer))
                .map(|answer| solution.merge(answer))
        })
        .collect())
}

fn join(left: &[Solution], right: &[Solution]) -> Vec<Solution> {
    left.iter()
        .flat_map(|l| {
            right
                .iter()
                .filter(|r| l.is_compatible(r))
                .map(move |r| l.merge(r))
        })
        .collect()
}

/// OPTIONAL: every solution of `left` is kept, extended by the compatible solutions of `right`
/// that satisfy the condition.
fn left_join(
    tree: &QueryTree,
    condition: Option<NodeId>,
    left: Vec<Solution>,
    right: &[Solution],
) -> SolutionsResult {
    let mut result = Vec::with_capacity(left.len());
    for solution in left {
        let before = result.len();
        for merged in right
            .iter()
            .filter(|r| solution.is_compatible(r))
            .map(|r| solution.merge(r))
        {
            let accepted = match condition {
                Some(condition) => effective_boolean(tree, condition, &merged)? == Some(true),
                None => true,
            };
            if accepted {
                result.push(merged);
            }
        }
        if result.len() == before {
            result.push(solution);
        }
    }
    Ok(result)
}

/// MINUS: drops the solutions of `left` that are compatible with a solution of `right` sharing a
/// variable with them.
fn minus(left: Vec<Solution>, right: &[Solution]) -> Vec<Solution> {
    left.into_iter()
        .filter(|solution| {
            !right.iter().any(|r| {
                r.variables().any(|variable| solution.contains(variable))
                    && solution.is_compatible(r)
            })
        })
        .collect()
}

fn filter(tree: &QueryTree, condition: NodeId, solutions: Vec<Solution>) -> SolutionsResult {
    let mut result = Vec::with_capacity(solutions.len());
    for solution in solutions {
        if effective_boolean(tree, condition, &solution)? == Some(true) {
            result.push(solution);
        }
    }
    Ok(result)
}

fn extend(
    tree: &QueryTree,
    elems: &[NodeId],
    solutions: &mut [Solution],
) -> Result<(), FederationError> {
    for solution in solutions {
        for elem in elems {
            let Node::ExtensionElem { name, expr } = tree.node(*elem) else {
                continue;
            };
            if let Some(value) = evaluate(tree, *expr, solution)? {
                solution.insert(name.clone(), value);
            }
        }
    }
    Ok(())
}

fn sort(
    tree: &QueryTree,
    order: NodeId,
    solutions: &mut Vec<Solution>,
) -> Result<(), FederationError> {
    let Node::Order { elems, .. } = tree.node(order) else {
        return Ok(());
    };
    let mut keyed = solutions
        .drain(..)
        .map(|solution| {
            let keys = elems
                .iter()
                .map(|elem| evaluate(tree, elem.expr, &solution))
                .collect::<Result<Vec<_>, _>>()?;
            Ok((keys, solution))
        })
        .collect::<Result<Vec<_>, FederationError>>()?;

    keyed.sort_by(|(left, _), (right, _)| {
        for ((elem, left), right) in elems.iter().zip(left).zip(right) {
            let ordering = order_terms(left.as_ref(), right.as_ref());
            let ordering = if elem.ascending {
                ordering
            } else {
                ordering.reverse()
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    });
    solutions.extend(keyed.into_iter().map(|(_, solution)| solution));
    Ok(())
}

fn values(tree: &QueryTree, node: NodeId) -> SolutionsResult {
    let Node::BindingSetAssignment { variables, rows } = tree.node(node) else {
        return FederationError::not_implemented("VALUES of another kind");
    };
    Ok(rows
        .iter()
        .map(|row| {
            variables
                .iter()
                .zip(row)
                .filter_map(|(variable, value)| Some((variable.clone(), value.clone()?)))
                .collect()
        })
        .collect())
}
