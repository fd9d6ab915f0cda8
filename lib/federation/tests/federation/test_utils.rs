use async_trait::async_trait;
use sparql_federation::{FederationError, FederationMember, SparqlEndpoint};
use sparql_federation_model::{Literal, NamedNode, NamedNodeRef, Solution, Term, Variable};
use sparql_federation_rest::{
    MemoryDescriptorStore, MemorySecretResolver, RestError, RestMember, RestMemberConfig,
    RestRequest, RestResponse, RestTransport,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const SEARCH: &str = "http://example.com/service/search";

const SEARCH_DESCRIPTOR: &str = r#"
    @prefix ephedra: <http://www.researchspace.org/resource/system/ephedra#> .
    @prefix spin: <http://spinrdf.org/spin#> .
    @prefix spl: <http://spinrdf.org/spl#> .
    @prefix sp: <http://spinrdf.org/sp#> .
    @prefix xsd: <http://www.w3.org/2001/XMLSchema#> .
    @prefix ex: <http://example.com/> .
    @prefix p: <http://example.com/param/> .

    <http://example.com/service/search>
        spin:constraint [ a spl:Argument ; spl:predicate p:_q ] ;
        spin:column [ a spin:Column ; spl:predicate p:_item ; ephedra:jsonPath "$.results" ] ,
                    [ a spin:Column ; spl:predicate p:_title ; ephedra:jsonPath "title" ] ;
        ephedra:hasSPARQLPattern (
            [ sp:subject p:_item ; sp:predicate ex:query ; sp:object p:_q ]
            [ sp:subject p:_item ; sp:predicate ex:title ; sp:object p:_title ]
        ) .
"#;

/// A SPARQL endpoint that answers every query with the same solutions and remembers the queries.
/// A trailing VALUES block is joined with the solutions, as a real endpoint would.
#[derive(Debug, Default)]
pub struct MockEndpoint {
    solutions: Vec<Solution>,
    delay: Option<Duration>,
    queries: Mutex<Vec<String>>,
}

impl MockEndpoint {
    pub fn new(solutions: Vec<Solution>) -> Arc<Self> {
        Arc::new(Self {
            solutions,
            ..Self::default()
        })
    }

    pub fn slow(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay: Some(delay),
            ..Self::default()
        })
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl SparqlEndpoint for MockEndpoint {
    async fn select(&self, query: &str) -> Result<Vec<Solution>, FederationError> {
        self.queries.lock().unwrap().push(query.to_owned());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Ok(join_values(&self.solutions, query))
    }
}

fn join_values(solutions: &[Solution], query: &str) -> Vec<Solution> {
    let Some((_, values)) = query.rsplit_once("VALUES (") else {
        return solutions.to_vec();
    };
    let (header, body) = values.split_once(')').unwrap();
    let variables = header
        .split_whitespace()
        .map(|v| Variable::new_unchecked(v.trim_start_matches('?')))
        .collect::<Vec<_>>();

    let mut result = Vec::new();
    for row in body.split('(').skip(1) {
        let row = row.split(')').next().unwrap();
        let row = variables
            .iter()
            .zip(row.split_whitespace())
            .filter_map(|(variable, value)| Some((variable.clone(), value_term(value)?)))
            .collect::<Solution>();
        for solution in solutions.iter().filter(|s| s.is_compatible(&row)) {
            result.push(solution.merge(&row));
        }
    }
    result
}

fn value_term(value: &str) -> Option<Term> {
    if let Some(value) = value.strip_prefix('<').and_then(|v| v.strip_suffix('>')) {
        return Some(iri(value));
    }
    if let Some(value) = value.strip_prefix('"').and_then(|v| v.strip_suffix('"')) {
        return Some(literal(value));
    }
    value.parse::<i64>().ok().map(|number| Literal::from(number).into())
}

pub fn sparql(endpoint: &Arc<MockEndpoint>) -> FederationMember {
    let endpoint: Arc<dyn SparqlEndpoint> = Arc::<MockEndpoint>::clone(endpoint);
    endpoint.into()
}

/// Answers every request with two titles and tracks how many requests are in flight.
#[derive(Debug, Default)]
pub struct CountingTransport {
    running: AtomicUsize,
    max_running: AtomicUsize,
    calls: AtomicUsize,
}

impl CountingTransport {
    pub fn max_running(&self) -> usize {
        self.max_running.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RestTransport for CountingTransport {
    async fn send(&self, _request: RestRequest) -> Result<RestResponse, RestError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_running.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(5)).await;
        self.running.fetch_sub(1, Ordering::SeqCst);

        Ok(RestResponse {
            status: 200,
            reason: "OK".to_owned(),
            body: br#"{ "results": [ { "title": "A" }, { "title": "B" } ] }"#.to_vec(),
        })
    }
}

pub fn search(transport: &Arc<CountingTransport>) -> FederationMember {
    let store = MemoryDescriptorStore::new();
    store
        .load_turtle(
            SEARCH_DESCRIPTOR.as_bytes(),
            NamedNodeRef::new_unchecked(SEARCH),
        )
        .unwrap();
    let transport: Arc<dyn RestTransport> = Arc::<CountingTransport>::clone(transport);
    RestMember::with_transport(
        RestMemberConfig::new("http://example.com/api/search", SEARCH),
        &store,
        &MemorySecretResolver::new(),
        transport,
    )
    .unwrap()
    .into()
}

pub fn iri(iri: &str) -> Term {
    NamedNode::new_unchecked(iri).into()
}

pub fn literal(value: &str) -> Term {
    Literal::new_simple_literal(value).into()
}

pub fn solution(bindings: &[(&str, Term)]) -> Solution {
    bindings
        .iter()
        .map(|(name, term)| (Variable::new_unchecked(*name), term.clone()))
        .collect()
}

/// Renders solutions in a stable order for comparisons.
pub fn sorted(solutions: &[Solution]) -> Vec<String> {
    let mut rows = solutions
        .iter()
        .map(|solution| {
            solution
                .iter()
                .map(|(variable, term)| format!("{variable}={term}"))
                .collect::<Vec<_>>()
                .join(" ")
        })
        .collect::<Vec<_>>();
    rows.sort();
    rows
}
