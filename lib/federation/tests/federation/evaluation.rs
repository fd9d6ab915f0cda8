use crate::test_utils::{
    iri, literal, search, solution, sorted, sparql, CountingTransport, MockEndpoint, SEARCH,
};
use sparql_federation::{Federation, FederationConfig, FederationError};
use std::sync::Arc;
use std::time::Duration;

const ISBN_QUERY: &str = "SELECT ?q ?title WHERE { \
    ?book <http://example.com/isbn> ?q \
    SERVICE <http://example.com/service/search> { \
        ?item <http://example.com/query> ?q . ?item <http://example.com/title> ?title } }";

fn books(count: usize) -> Arc<MockEndpoint> {
    MockEndpoint::new(
        (0..count)
            .map(|i| {
                solution(&[
                    ("book", iri(&format!("http://example.com/book/{i}"))),
                    ("q", literal(&i.to_string())),
                ])
            })
            .collect(),
    )
}

#[tokio::test]
async fn test_single_owner_query_is_forwarded_unchanged() -> anyhow::Result<()> {
    let local = MockEndpoint::new(vec![solution(&[("s", iri("http://example.com/a"))])]);
    let config = FederationConfig::new("local").with_member("http://example.com/sparql", "local");
    let federation = Federation::new(config, [("local".to_owned(), sparql(&local))])?;

    let solutions = federation
        .evaluate("SELECT ?s WHERE { SERVICE <http://example.com/sparql> { ?s ?p ?o } }")
        .await?;

    assert_eq!(solutions.len(), 1);
    let queries = local.queries();
    assert_eq!(queries.len(), 1);
    insta::assert_snapshot!(format!("{:?}", queries[0]), @r#""SELECT ?s \nWHERE { \nSERVICE <http://example.com/sparql> { \n\t?s ?p ?o . \n} \n }\n ""#);
    Ok(())
}

#[tokio::test]
async fn test_rest_service_is_called_per_solution() -> anyhow::Result<()> {
    let local = books(3);
    let transport = Arc::new(CountingTransport::default());
    let config = FederationConfig::new("local").with_member(SEARCH, "search");
    let federation = Federation::new(
        config,
        [
            ("local".to_owned(), sparql(&local)),
            ("search".to_owned(), search(&transport)),
        ],
    )?;

    let solutions = federation.evaluate(ISBN_QUERY).await?;

    assert_eq!(transport.calls(), 3);
    assert_eq!(
        sorted(&solutions),
        [
            "?q=\"0\" ?title=\"A\"",
            "?q=\"0\" ?title=\"B\"",
            "?q=\"1\" ?title=\"A\"",
            "?q=\"1\" ?title=\"B\"",
            "?q=\"2\" ?title=\"A\"",
            "?q=\"2\" ?title=\"B\"",
        ]
    );
    Ok(())
}

#[tokio::test]
async fn test_rest_calls_are_bounded_by_prefetch_size() -> anyhow::Result<()> {
    let local = books(20);
    let transport = Arc::new(CountingTransport::default());
    let config = FederationConfig {
        rest_prefetch_size: 2,
        ..FederationConfig::new("local").with_member(SEARCH, "search")
    };
    let federation = Federation::new(
        config,
        [
            ("local".to_owned(), sparql(&local)),
            ("search".to_owned(), search(&transport)),
        ],
    )?;

    let solutions = federation.evaluate(ISBN_QUERY).await?;

    assert_eq!(solutions.len(), 40);
    assert_eq!(federation.executor().capacity(), 6);
    assert!(transport.max_running() <= 6, "at most 3N calls in flight");
    assert!(transport.max_running() > 1, "calls run concurrently");

    federation.shutdown().await;
    assert!(federation.executor().is_shut_down());
    Ok(())
}

#[tokio::test]
async fn test_bound_join_sends_values_block() -> anyhow::Result<()> {
    let local = MockEndpoint::new(vec![
        solution(&[("s", iri("http://example.com/a"))]),
        solution(&[("s", iri("http://example.com/b"))]),
    ]);
    let values = MockEndpoint::new(
        [("a", "1"), ("a", "3"), ("a", "8"), ("b", "2"), ("c", "5")]
            .into_iter()
            .map(|(s, v)| {
                solution(&[
                    ("s", iri(&format!("http://example.com/{s}"))),
                    ("v", literal(v)),
                ])
            })
            .collect(),
    );
    let config = FederationConfig::new("local").with_member("http://example.com/values", "values");
    let federation = Federation::new(
        config,
        [
            ("local".to_owned(), sparql(&local)),
            ("values".to_owned(), sparql(&values)),
        ],
    )?;

    let solutions = federation
        .evaluate(
            "SELECT ?s (COUNT(?v) AS ?n) WHERE { \
                ?s a <http://example.com/C> \
                SERVICE <http://example.com/values> { ?s <http://example.com/value> ?v } \
             } GROUP BY ?s ORDER BY DESC(?n)",
        )
        .await?;

    assert_eq!(
        solutions
            .iter()
            .map(|s| (
                s.get_by_name("s").unwrap().to_string(),
                s.get_by_name("n").unwrap().to_string()
            ))
            .collect::<Vec<_>>(),
        [
            (
                "<http://example.com/a>".to_owned(),
                "\"3\"^^<http://www.w3.org/2001/XMLSchema#integer>".to_owned()
            ),
            (
                "<http://example.com/b>".to_owned(),
                "\"1\"^^<http://www.w3.org/2001/XMLSchema#integer>".to_owned()
            ),
        ]
    );
    let queries = values.queries();
    assert!(queries.iter().all(|q| q.contains(
        "VALUES (?s ?__index) { (<http://example.com/a> 0) (<http://example.com/b> 1) }"
    )));
    Ok(())
}

#[tokio::test]
async fn test_median_over_distributed_values() -> anyhow::Result<()> {
    let local = MockEndpoint::new(vec![
        solution(&[("s", iri("http://example.com/a"))]),
        solution(&[("s", iri("http://example.com/b"))]),
    ]);
    let values = MockEndpoint::new(
        [("a", 1), ("a", 3), ("a", 8), ("b", 2)]
            .into_iter()
            .map(|(s, v)| {
                solution(&[
                    ("s", iri(&format!("http://example.com/{s}"))),
                    ("v", sparql_federation_model::Literal::from(v).into()),
                ])
            })
            .collect(),
    );
    let config = FederationConfig::new("local").with_member("http://example.com/values", "values");
    let federation = Federation::new(
        config,
        [
            ("local".to_owned(), sparql(&local)),
            ("values".to_owned(), sparql(&values)),
        ],
    )?;

    let solutions = federation
        .evaluate(
            "PREFIX ephedra: <http://www.researchspace.org/resource/system/ephedra#> \
             SELECT ?s (ephedra:median(?v) AS ?m) WHERE { \
                ?s a <http://example.com/C> \
                SERVICE <http://example.com/values> { ?s <http://example.com/value> ?v } \
             } GROUP BY ?s",
        )
        .await?;

    assert_eq!(
        sorted(&solutions),
        [
            "?m=\"3\"^^<http://www.w3.org/2001/XMLSchema#double> ?s=<http://example.com/a>",
            "?m=\"2\"^^<http://www.w3.org/2001/XMLSchema#double> ?s=<http://example.com/b>",
        ]
    );
    Ok(())
}

/// The default member answers `?s a <C>` with a, b and c. The values member has a:1, a:3, b:2.
fn distributed_values() -> anyhow::Result<(Federation, Arc<MockEndpoint>)> {
    let local = MockEndpoint::new(
        ["a", "b", "c"]
            .into_iter()
            .map(|s| solution(&[("s", iri(&format!("http://example.com/{s}")))]))
            .collect(),
    );
    let values = MockEndpoint::new(
        [("a", "1"), ("a", "3"), ("b", "2")]
            .into_iter()
            .map(|(s, v)| {
                solution(&[
                    ("s", iri(&format!("http://example.com/{s}"))),
                    ("v", literal(v)),
                ])
            })
            .collect(),
    );
    let config = FederationConfig::new("local").with_member("http://example.com/values", "values");
    let federation = Federation::new(
        config,
        [
            ("local".to_owned(), sparql(&local)),
            ("values".to_owned(), sparql(&values)),
        ],
    )?;
    Ok((federation, values))
}

#[tokio::test]
async fn test_bound_join_keeps_multiplicity() -> anyhow::Result<()> {
    let local = MockEndpoint::new(vec![
        solution(&[("s", iri("http://example.com/a1")), ("k", literal("1"))]),
        solution(&[("s", iri("http://example.com/a2")), ("k", literal("1"))]),
        solution(&[("s", iri("http://example.com/a3"))]),
    ]);
    let values = MockEndpoint::new(vec![
        solution(&[("k", literal("1")), ("v", literal("x"))]),
        solution(&[("k", literal("2")), ("v", literal("y"))]),
    ]);
    let config = FederationConfig::new("local").with_member("http://example.com/values", "values");
    let federation = Federation::new(
        config,
        [
            ("local".to_owned(), sparql(&local)),
            ("values".to_owned(), sparql(&values)),
        ],
    )?;

    let solutions = federation
        .evaluate(
            "SELECT ?s ?v WHERE { \
                ?s <http://example.com/key> ?k \
                SERVICE <http://example.com/values> { ?k <http://example.com/value> ?v } }",
        )
        .await?;

    assert_eq!(
        sorted(&solutions),
        [
            "?s=<http://example.com/a1> ?v=\"x\"",
            "?s=<http://example.com/a2> ?v=\"x\"",
            "?s=<http://example.com/a3> ?v=\"x\"",
            "?s=<http://example.com/a3> ?v=\"y\"",
        ]
    );
    let queries = values.queries();
    assert_eq!(queries.len(), 1);
    assert!(queries[0].contains("VALUES (?k ?__index) { (\"1\" 0) (UNDEF 1) }"));
    Ok(())
}

#[tokio::test]
async fn test_optional_service_keeps_unmatched_solutions() -> anyhow::Result<()> {
    let (federation, _) = distributed_values()?;

    let solutions = federation
        .evaluate(
            "SELECT ?s ?v WHERE { \
                ?s a <http://example.com/C> \
                OPTIONAL { SERVICE <http://example.com/values> { ?s <http://example.com/value> ?v } } }",
        )
        .await?;

    assert_eq!(
        sorted(&solutions),
        [
            "?s=<http://example.com/a> ?v=\"1\"",
            "?s=<http://example.com/a> ?v=\"3\"",
            "?s=<http://example.com/b> ?v=\"2\"",
            "?s=<http://example.com/c>",
        ]
    );
    Ok(())
}

#[tokio::test]
async fn test_minus_service_removes_matches() -> anyhow::Result<()> {
    let (federation, _) = distributed_values()?;

    let solutions = federation
        .evaluate(
            "SELECT ?s WHERE { \
                ?s a <http://example.com/C> \
                MINUS { SERVICE <http://example.com/values> { ?s <http://example.com/value> ?v } } }",
        )
        .await?;

    assert_eq!(sorted(&solutions), ["?s=<http://example.com/c>"]);
    Ok(())
}

#[tokio::test]
async fn test_sub_select_over_service() -> anyhow::Result<()> {
    let (federation, _) = distributed_values()?;

    let solutions = federation
        .evaluate(
            "SELECT ?s ?n WHERE { \
                ?s a <http://example.com/C> \
                { SELECT ?s (COUNT(?v) AS ?n) WHERE { \
                    SERVICE <http://example.com/values> { ?s <http://example.com/value> ?v } \
                  } GROUP BY ?s } }",
        )
        .await?;

    assert_eq!(
        sorted(&solutions),
        [
            "?n=\"2\"^^<http://www.w3.org/2001/XMLSchema#integer> ?s=<http://example.com/a>",
            "?n=\"1\"^^<http://www.w3.org/2001/XMLSchema#integer> ?s=<http://example.com/b>",
        ]
    );
    Ok(())
}

#[tokio::test]
async fn test_unmapped_service_fails() -> anyhow::Result<()> {
    let config = FederationConfig::new("local").with_member("http://example.com/sparql", "local");
    let federation = Federation::new(
        config,
        [("local".to_owned(), sparql(&MockEndpoint::new(Vec::new())))],
    )?;

    let error = federation
        .evaluate("SELECT * WHERE { SERVICE <http://example.com/unknown> { ?s ?p ?o } }")
        .await
        .unwrap_err();

    assert!(matches!(error, FederationError::UnknownMember(_)));
    Ok(())
}

#[tokio::test]
async fn test_slow_member_hits_query_timeout() -> anyhow::Result<()> {
    let config = FederationConfig {
        max_query_time: 1,
        ..FederationConfig::new("local").with_member("http://example.com/sparql", "local")
    };
    let federation = Federation::new(
        config,
        [(
            "local".to_owned(),
            sparql(&MockEndpoint::slow(Duration::from_secs(30))),
        )],
    )?;

    let error = federation
        .evaluate("SELECT * WHERE { ?s ?p ?o }")
        .await
        .unwrap_err();

    assert!(matches!(error, FederationError::Timeout(limit) if limit == Duration::from_secs(1)));
    Ok(())
}

#[test]
fn test_updates_are_refused() {
    let config = FederationConfig::new("local").with_member("http://example.com/sparql", "local");
    let federation = Federation::new(
        config,
        [("local".to_owned(), sparql(&MockEndpoint::new(Vec::new())))],
    )
    .unwrap();

    assert!(federation
        .update("INSERT DATA { <http://example.com/s> <http://example.com/p> \"o\" }")
        .is_err());
}
