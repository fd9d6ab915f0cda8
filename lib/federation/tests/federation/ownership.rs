use crate::test_utils::{search, sparql, CountingTransport, MockEndpoint, SEARCH};
use sparql_federation::{
    Federation, FederationConfig, FederationError, FederationMember, Ownership,
};
use std::collections::BTreeSet;
use std::sync::Arc;

fn federation() -> Federation {
    let config = FederationConfig::new("local")
        .with_member("http://example.com/sparql/local", "local")
        .with_member("http://example.com/sparql/wiki", "wiki")
        .with_member(SEARCH, "search");
    Federation::new(
        config,
        [
            ("local".to_owned(), sparql(&MockEndpoint::new(Vec::new()))),
            ("wiki".to_owned(), sparql(&MockEndpoint::new(Vec::new()))),
            (
                "search".to_owned(),
                search(&Arc::new(CountingTransport::default())),
            ),
        ],
    )
    .unwrap()
}

fn ownership(query: &str) -> Result<Ownership, FederationError> {
    let federation = federation();
    let prepared = federation.prepare(query)?;
    federation.ownership(&prepared)
}

#[test]
fn test_query_without_service_has_single_owner() {
    assert_eq!(
        ownership("SELECT * WHERE { ?s ?p ?o }").unwrap(),
        Ownership::Single("local".to_owned())
    );
}

#[test]
fn test_service_of_default_member_keeps_single_owner() {
    assert_eq!(
        ownership("SELECT * WHERE { SERVICE <http://example.com/sparql/local> { ?s ?p ?o } }")
            .unwrap(),
        Ownership::Single("local".to_owned())
    );
}

#[test]
fn test_service_of_other_member_is_distributed() {
    let ownership = ownership(
        "SELECT * WHERE { ?s ?p ?o SERVICE <http://example.com/sparql/wiki> { ?o ?q ?v } }",
    )
    .unwrap();

    assert_eq!(
        ownership,
        Ownership::Distributed {
            members: BTreeSet::from(["local".to_owned(), "wiki".to_owned()]),
            rest_members: BTreeSet::new(),
        }
    );
}

#[test]
fn test_rest_members_are_reported() {
    let ownership = ownership(
        "SELECT * WHERE { ?s <http://example.com/isbn> ?q \
         SERVICE <http://example.com/service/search> { \
            ?item <http://example.com/query> ?q . ?item <http://example.com/title> ?title } }",
    )
    .unwrap();

    let Ownership::Distributed { rest_members, .. } = ownership else {
        panic!("expected a distributed query")
    };
    assert_eq!(rest_members, BTreeSet::from(["search".to_owned()]));
}

#[test]
fn test_service_aggregate_is_distributed() {
    let ownership = ownership(
        "PREFIX ephedra: <http://www.researchspace.org/resource/system/ephedra#> \
         SELECT ?s (ephedra:median(?v) AS ?m) WHERE { ?s <http://example.com/value> ?v } GROUP BY ?s",
    )
    .unwrap();

    assert!(matches!(ownership, Ownership::Distributed { .. }));
}

#[test]
fn test_unmapped_service_is_unknown_member() {
    let error = ownership("SELECT * WHERE { SERVICE <http://example.com/unknown> { ?s ?p ?o } }")
        .unwrap_err();

    assert_eq!(
        error.to_string(),
        "Unknown federation member: http://example.com/unknown"
    );
}

#[test]
fn test_missing_default_member_is_rejected() {
    let config = FederationConfig::new("local").with_member("http://example.com/sparql", "other");
    let error = Federation::new(
        config,
        [("other".to_owned(), sparql(&MockEndpoint::new(Vec::new())))],
    )
    .unwrap_err();

    assert!(matches!(error, FederationError::UnknownMember(member) if member == "local"));
}

#[test]
fn test_invalid_configuration_is_rejected() {
    let error =
        Federation::new(FederationConfig::default(), Vec::<(String, FederationMember)>::new())
            .unwrap_err();

    insta::assert_snapshot!(error.to_string(), @"Invalid federation configuration: No federation members were configured. Default member was not defined.");
}
