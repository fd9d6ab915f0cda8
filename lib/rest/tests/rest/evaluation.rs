use async_trait::async_trait;
use sparql_federation_model::{
    Literal, NamedNode, NamedNodeRef, PatternTerm, Solution, Term, Variable,
};
use sparql_federation_rest::{
    MemoryDescriptorStore, MemorySecretResolver, RestError, RestMember, RestMemberConfig,
    RestParameters, RestRequest, RestResponse, RestTransport, ServicePattern,
};
use std::sync::Arc;

const SERVICE: &str = "http://example.com/service/geo";

/// Parameters named by blank nodes, a required input and a typed output.
const DESCRIPTOR: &str = r#"
    @prefix ephedra: <http://www.researchspace.org/resource/system/ephedra#> .
    @prefix spin: <http://spinrdf.org/spin#> .
    @prefix spl: <http://spinrdf.org/spl#> .
    @prefix sp: <http://spinrdf.org/sp#> .
    @prefix xsd: <http://www.w3.org/2001/XMLSchema#> .
    @prefix geo: <http://example.com/geo#> .

    <http://example.com/service/geo>
        spin:constraint [ a spl:Argument ; spl:predicate _:name ] ,
                        [ a spl:Argument ; spl:predicate _:limit ; spl:defaultValue "5" ] ;
        spin:column [ a spin:Column ; spl:predicate _:place ; ephedra:jsonPath "$" ] ,
                    [ a spin:Column ; spl:predicate _:lat ; spl:valueType xsd:double ;
                      ephedra:jsonPath "location.lat" ] ;
        ephedra:hasSPARQLPattern (
            [ sp:subject _:place ; sp:predicate geo:name ; sp:object _:name ]
            [ sp:subject _:place ; sp:predicate geo:limit ; sp:object _:limit ]
            [ sp:subject _:place ; sp:predicate geo:lat ; sp:object _:lat ]
        ) .
"#;

#[derive(Debug)]
struct FixedTransport(&'static str);

#[async_trait]
impl RestTransport for FixedTransport {
    async fn send(&self, _request: RestRequest) -> Result<RestResponse, RestError> {
        Ok(RestResponse {
            status: 200,
            reason: "OK".to_owned(),
            body: self.0.as_bytes().to_vec(),
        })
    }
}

fn store() -> MemoryDescriptorStore {
    let store = MemoryDescriptorStore::new();
    store
        .load_turtle(DESCRIPTOR.as_bytes(), NamedNodeRef::new_unchecked(SERVICE))
        .unwrap();
    store
}

fn pattern(predicate: &str, object: PatternTerm) -> ServicePattern {
    ServicePattern {
        subject: PatternTerm::Variable(Variable::new_unchecked("place")),
        predicate: NamedNode::new_unchecked(format!("http://example.com/geo#{predicate}")).into(),
        object,
    }
}

fn variable(name: &str) -> PatternTerm {
    PatternTerm::Variable(Variable::new_unchecked(name))
}

#[test]
fn blank_node_parameters_are_named_by_id() {
    let descriptor = store()
        .load_turtle(DESCRIPTOR.as_bytes(), NamedNodeRef::new_unchecked(SERVICE))
        .unwrap();

    let mut names = descriptor
        .inputs()
        .iter()
        .map(|p| p.name.as_str())
        .collect::<Vec<_>>();
    names.sort_unstable();
    assert_eq!(names, ["limit", "name"]);
}

#[test]
fn required_input_without_value_is_missing() {
    let descriptor = store()
        .load_turtle(DESCRIPTOR.as_bytes(), NamedNodeRef::new_unchecked(SERVICE))
        .unwrap();

    let parameters = RestParameters::extract(
        &descriptor,
        &[pattern("lat", variable("lat"))],
        &Solution::new(),
    );

    assert_eq!(parameters.missing_inputs(), ["name"]);
    assert_eq!(parameters.inputs().get("limit").map(String::as_str), Some("5"));
}

#[tokio::test]
async fn typed_values_are_joined_with_binding() {
    let member = RestMember::with_transport(
        RestMemberConfig::new("http://example.com/geo", SERVICE),
        &store(),
        &MemorySecretResolver::new(),
        Arc::new(FixedTransport(r#"[ { "location": { "lat": 52.5 } } ]"#)),
    )
    .unwrap();
    let binding: Solution = [(
        Variable::new_unchecked("city"),
        Term::from(Literal::new_simple_literal("Berlin")),
    )]
    .into_iter()
    .collect();
    let patterns = [
        pattern("name", variable("city")),
        pattern("lat", variable("lat")),
    ];

    let solutions = member.evaluate(&patterns, &binding).await.unwrap();

    assert_eq!(solutions.len(), 1);
    assert_eq!(
        solutions[0].get_by_name("lat").unwrap().to_string(),
        "\"52.5\"^^<http://www.w3.org/2001/XMLSchema#double>"
    );
    assert!(solutions[0].get_by_name("city").is_some());
}

#[tokio::test]
async fn missing_required_input_skips_call() {
    let member = RestMember::with_transport(
        RestMemberConfig::new("http://example.com/geo", SERVICE),
        &store(),
        &MemorySecretResolver::new(),
        Arc::new(FixedTransport("not json")),
    )
    .unwrap();

    let solutions = member
        .evaluate(&[pattern("lat", variable("lat"))], &Solution::new())
        .await
        .unwrap();

    assert!(solutions.is_empty());
}

#[tokio::test]
async fn wildcard_root_path_selects_every_item() {
    let descriptor = DESCRIPTOR.replace(
        r#"ephedra:jsonPath "$" ]"#,
        r#"ephedra:jsonPath "$.results[*]" ]"#,
    );
    let store = MemoryDescriptorStore::new();
    store
        .load_turtle(descriptor.as_bytes(), NamedNodeRef::new_unchecked(SERVICE))
        .unwrap();
    let member = RestMember::with_transport(
        RestMemberConfig::new("http://example.com/geo", SERVICE),
        &store,
        &MemorySecretResolver::new(),
        Arc::new(FixedTransport(
            r#"{ "total": 2, "results": [
                { "location": { "lat": 52.5 } },
                { "location": { "lat": 48.1 } }
            ] }"#,
        )),
    )
    .unwrap();
    let binding: Solution = [(
        Variable::new_unchecked("city"),
        Term::from(Literal::new_simple_literal("Berlin")),
    )]
    .into_iter()
    .collect();
    let patterns = [
        pattern("name", variable("city")),
        pattern("lat", variable("lat")),
    ];

    let solutions = member.evaluate(&patterns, &binding).await.unwrap();

    let mut latitudes = solutions
        .iter()
        .map(|s| s.get_by_name("lat").unwrap().to_string())
        .collect::<Vec<_>>();
    latitudes.sort();
    assert_eq!(
        latitudes,
        [
            "\"48.1\"^^<http://www.w3.org/2001/XMLSchema#double>",
            "\"52.5\"^^<http://www.w3.org/2001/XMLSchema#double>",
        ]
    );
}
