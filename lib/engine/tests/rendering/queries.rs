use crate::test_utils::{median, render, var};
use sparql_federation_engine::{PreparedQuery, QueryRenderError};
use sparql_federation_model::{NamedNode, Node, ProjectionElem, QueryTree};
use spargebra::Query;
use std::collections::HashSet;

#[test]
fn test_render_simple_select() -> Result<(), QueryRenderError> {
    let rendered = render(
        "SELECT ?name WHERE { ?s <http://xmlns.com/foaf/0.1/name> ?name } LIMIT 10",
    )?;

    assert_eq!(
        rendered,
        "SELECT ?name \nWHERE { \n\t?s <http://xmlns.com/foaf/0.1/name> ?name . \n }\n LIMIT 10 \n"
    );
    insta::assert_snapshot!(format!("{rendered:?}"), @r#""SELECT ?name \nWHERE { \n\t?s <http://xmlns.com/foaf/0.1/name> ?name . \n }\n LIMIT 10 \n""#);
    Ok(())
}

#[test]
fn test_render_optional_and_filter() -> Result<(), QueryRenderError> {
    let rendered = render(
        "SELECT ?s ?l WHERE { \
            ?s ?p ?o \
            OPTIONAL { ?s <http://www.w3.org/2000/01/rdf-schema#label> ?l } \
            FILTER(?o != <http://example.com/x>) \
        }",
    )?;

    insta::assert_snapshot!(format!("{rendered:?}"), @r#""SELECT ?s ?l \nWHERE { \n\t?s ?p ?o . \n OPTIONAL { \t?s <http://www.w3.org/2000/01/rdf-schema#label> ?l . \n}  FILTER (?o != <http://example.com/x>)  }\n ""#);
    Ok(())
}

#[test]
fn test_render_union() -> Result<(), QueryRenderError> {
    let rendered = render(
        "SELECT ?s ?o WHERE { { ?s <http://example.com/a> ?o } UNION { ?s <http://example.com/b> ?o } }",
    )?;

    insta::assert_snapshot!(format!("{rendered:?}"), @r#""SELECT ?s ?o \nWHERE { \n{\n\t?s <http://example.com/a> ?o . \n}\n UNION\n{\n\t?s <http://example.com/b> ?o . \n}\n }\n ""#);
    Ok(())
}

#[test]
fn test_render_service() -> Result<(), QueryRenderError> {
    let rendered =
        render("SELECT ?s WHERE { SERVICE <http://example.com/sparql> { ?s ?p ?o } }")?;

    insta::assert_snapshot!(format!("{rendered:?}"), @r#""SELECT ?s \nWHERE { \nSERVICE <http://example.com/sparql> { \n\t?s ?p ?o . \n} \n }\n ""#);
    Ok(())
}

#[test]
fn test_render_select_expression_is_not_repeated_as_bind() -> Result<(), QueryRenderError> {
    let rendered = render("SELECT ?s ?len WHERE { ?s ?p ?o BIND(STRLEN(?o) AS ?len) }")?;

    insta::assert_snapshot!(format!("{rendered:?}"), @r#""SELECT ?s (STRLEN(?o) AS ?len) \nWHERE { \n\t?s ?p ?o . \n }\n ""#);
    Ok(())
}

#[test]
fn test_render_bind() -> Result<(), QueryRenderError> {
    let rendered =
        render("SELECT ?s WHERE { ?s ?p ?o BIND(STR(?o) AS ?str) FILTER(?str = \"x\") }")?;

    insta::assert_snapshot!(format!("{rendered:?}"), @r#""SELECT ?s \nWHERE { \n\t?s ?p ?o . \n\tBIND (STR(?o) AS ?str) . \n FILTER (?str = \"x\")  }\n ""#);
    Ok(())
}

#[test]
fn test_render_modifiers() -> Result<(), QueryRenderError> {
    let rendered =
        render("SELECT DISTINCT ?s WHERE { ?s ?p ?o } ORDER BY ?s LIMIT 5 OFFSET 10")?;

    insta::assert_snapshot!(format!("{rendered:?}"), @r#""SELECT DISTINCT ?s \nWHERE { \n\t?s ?p ?o . \n }\n ORDER BY ?s \nLIMIT 5 OFFSET 10 \n""#);
    Ok(())
}

#[test]
fn test_render_sub_select() -> Result<(), QueryRenderError> {
    let rendered =
        render("SELECT ?s WHERE { ?s ?p ?o { SELECT ?s WHERE { ?s ?q ?v } LIMIT 3 } }")?;

    insta::assert_snapshot!(format!("{rendered:?}"), @r#""SELECT ?s \nWHERE { \n\t?s ?p ?o . \n{ SELECT ?s \nWHERE { \n\t?s ?q ?v . \n }\n LIMIT 3 \n }  }\n ""#);
    Ok(())
}

#[test]
fn test_values_are_rendered_once() -> Result<(), QueryRenderError> {
    let inline = render(
        "SELECT ?s WHERE { VALUES ?s { <http://example.com/a> UNDEF } ?s ?p ?o }",
    )?;
    assert_eq!(inline.matches("VALUES").count(), 1);
    assert!(inline.contains("(<http://example.com/a> ) (UNDEF ) "));

    let trailing = render(
        "SELECT ?s (COUNT(?o) AS ?c) WHERE { ?s ?p ?o } GROUP BY ?s \
         VALUES ?s { <http://example.com/a> }",
    )?;
    assert_eq!(trailing.matches("VALUES").count(), 1);
    assert!(trailing.ends_with("VALUES (?s ) { (<http://example.com/a> )  } \n"));
    Ok(())
}

#[test]
fn test_rendering_is_idempotent_and_parseable() -> Result<(), QueryRenderError> {
    let queries = [
        "SELECT ?name WHERE { ?s <http://xmlns.com/foaf/0.1/name> ?name } LIMIT 10",
        "SELECT ?s ?l WHERE { ?s ?p ?o OPTIONAL { ?s <http://example.com/l> ?l } }",
        "SELECT ?s (COUNT(?o) AS ?c) WHERE { ?s ?p ?o } GROUP BY ?s HAVING (COUNT(?o) > 1)",
        "SELECT (COUNT(*) AS ?c) WHERE { ?s ?p ?o }",
        "SELECT ?s (SUM(?v) + 1 AS ?total) WHERE { ?s <http://example.com/v> ?v } GROUP BY ?s",
        "SELECT ?s (GROUP_CONCAT(DISTINCT ?o; separator=\", \") AS ?all) WHERE { ?s ?p ?o } GROUP BY ?s",
        "SELECT REDUCED ?s WHERE { ?s ?p ?o MINUS { ?s <http://example.com/hidden> true } }",
        "SELECT ?s WHERE { GRAPH <http://example.com/g> { ?s ?p ?o } }",
        "SELECT ?s WHERE { ?s ?p ?o FILTER NOT EXISTS { ?s <http://example.com/p> ?x } }",
        "SELECT ?s WHERE { ?s ?p ?o FILTER(?o IN (1, 2) && !BOUND(?p)) }",
        "SELECT ?s WHERE { ?s ?p ?o { SELECT ?s WHERE { ?s ?q ?v } LIMIT 3 } } ORDER BY DESC(?s)",
        "SELECT ?s WHERE { ?s ?p ?o FILTER(IF(?o > 1, true, COALESCE(?p, false))) }",
        "SELECT ?s WHERE { ?s ?p \"chat\"@fr }",
    ];

    for query in queries {
        let first = render(query)?;
        assert!(
            Query::parse(&first, None).is_ok(),
            "rendered query does not parse: {first}"
        );
        let second = render(&first)?;
        assert_eq!(first, second, "rendering is not idempotent for {query}");
    }
    Ok(())
}

#[test]
fn test_construct_is_rejected() -> Result<(), QueryRenderError> {
    let prepared = PreparedQuery::parse(
        "CONSTRUCT { ?s ?p ?o } WHERE { ?s ?p ?o }",
        None,
        HashSet::<NamedNode>::new(),
    )?;

    let error = prepared.render().unwrap_err();
    assert_eq!(error.to_string(), "Only SELECT queries are supported");
    Ok(())
}

#[test]
fn test_update_is_rejected() {
    let error =
        PreparedQuery::parse_update("CLEAR GRAPH <http://example.com/g>", None).unwrap_err();
    assert_eq!(error.to_string(), "Only SELECT queries are supported");
}

#[test]
fn test_intersection_is_rejected() -> Result<(), QueryRenderError> {
    let mut tree = QueryTree::new();
    let left = tree.statement_pattern(
        var("s"),
        median(),
        var("o"),
    );
    let right = tree.add(Node::SingletonSet);
    let intersection = tree.add(Node::Intersection { left, right });
    let projection = tree.add(Node::Projection {
        arg: intersection,
        elems: vec![ProjectionElem::new(var("s"))],
    });
    tree.set_root(projection);

    let error = PreparedQuery::from_tree(tree, HashSet::<NamedNode>::new())?
        .render()
        .unwrap_err();
    assert_eq!(error.to_string(), "Unsupported operator: Intersection");
    Ok(())
}
