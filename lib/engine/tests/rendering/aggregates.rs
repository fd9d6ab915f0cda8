use crate::test_utils::{aggregate_lookup, count_nodes, median_query, render, var, MEDIAN};
use sparql_federation_engine::{PreparedQuery, QueryRenderError};
use sparql_federation_model::{AggregateFunction, Node};

#[test]
fn test_custom_aggregate_single_group_by() -> Result<(), QueryRenderError> {
    let prepared = PreparedQuery::from_tree(median_query(&["s"], &["s"]), aggregate_lookup())?;

    assert!(prepared.has_service_aggregates());
    assert_eq!(
        count_nodes(prepared.tree(), |n| matches!(n, Node::Group { .. })),
        1
    );
    let group = prepared.profile().group_by().unwrap();
    let Node::Group { elems, .. } = prepared.tree().node(group) else {
        panic!("expected a group")
    };
    assert_eq!(elems.len(), 1);
    assert_eq!(elems[0].name, var("y"));
    assert!(matches!(
        prepared.tree().node(elems[0].operator),
        Node::Aggregate {
            function: AggregateFunction::Service(_),
            ..
        }
    ));

    let rendered = prepared.render()?;
    assert_eq!(rendered.matches("GROUP BY").count(), 1);
    insta::assert_snapshot!(format!("{rendered:?}"), @r#""SELECT ?s (<http://www.researchspace.org/resource/system/ephedra#median>(?x) AS ?y) \nWHERE { \n\t?s <http://example.com/value> ?x . \n }\n GROUP BY ?s \n""#);
    Ok(())
}

#[test]
fn test_custom_aggregate_without_group_synthesizes_one() -> Result<(), QueryRenderError> {
    let mut tree = median_query(&[], &[]);
    // Drop the prepared group to let the rewriter create its own.
    let root = tree.root().unwrap();
    let group = tree
        .descendants(root)
        .into_iter()
        .find(|id| matches!(tree.node(*id), Node::Group { .. }))
        .unwrap();
    let Node::Group { arg, .. } = tree.node(group) else {
        unreachable!()
    };
    let pattern = *arg;
    let extension = tree.parent(group).unwrap();
    tree.replace_child(extension, group, pattern);

    let prepared = PreparedQuery::from_tree(tree, aggregate_lookup())?;

    assert_eq!(
        count_nodes(prepared.tree(), |n| matches!(n, Node::Group { .. })),
        1
    );
    let rendered = prepared.render()?;
    // A group without keys renders no clause: a bare `GROUP BY` is not valid SPARQL.
    assert!(!rendered.contains("GROUP BY"));
    assert!(rendered.starts_with(
        "SELECT (<http://www.researchspace.org/resource/system/ephedra#median>(?x) AS ?y) "
    ));
    Ok(())
}

#[test]
fn test_grouping_violation() {
    let error = PreparedQuery::from_tree(median_query(&["x"], &["s"]), aggregate_lookup())
        .unwrap_err();

    assert_eq!(
        error.to_string(),
        "variable 'x' in projection not present in GROUP BY."
    );
}

#[test]
fn test_builtin_aggregate_in_expression() -> Result<(), QueryRenderError> {
    let rendered = render(
        "SELECT ?s (SUM(?v) + 1 AS ?total) WHERE { ?s <http://example.com/v> ?v } GROUP BY ?s",
    )?;

    insta::assert_snapshot!(format!("{rendered:?}"), @r#""SELECT ?s ((SUM(?v) + \"1\"^^<http://www.w3.org/2001/XMLSchema#integer>) AS ?total) \nWHERE { \n\t?s <http://example.com/v> ?v . \n }\n GROUP BY ?s \n""#);
    Ok(())
}

#[test]
fn test_having_is_rendered_with_group() -> Result<(), QueryRenderError> {
    let prepared = PreparedQuery::parse(
        "SELECT ?s (COUNT(?o) AS ?c) WHERE { ?s ?p ?o } GROUP BY ?s HAVING (COUNT(?o) > 1)",
        None,
        aggregate_lookup(),
    )?;

    assert!(prepared.profile().having().is_some());
    assert!(prepared.profile().group_by().is_some());
    let rendered = prepared.render()?;
    assert!(rendered.contains("GROUP BY ?s HAVING (COUNT(?o) > "));
    assert!(!rendered.contains("FILTER"));
    Ok(())
}

#[test]
fn test_custom_aggregate_text_with_group_by() -> Result<(), QueryRenderError> {
    let query = format!(
        "SELECT ?s (<{MEDIAN}>(?x) AS ?y) WHERE {{ ?s <http://example.com/v> ?x }} GROUP BY ?s"
    );
    let prepared = PreparedQuery::parse(&query, None, aggregate_lookup())?;

    assert!(prepared.has_service_aggregates());
    assert_eq!(prepared.aggregates()[0].alias, var("y"));
    assert_eq!(
        count_nodes(prepared.tree(), |n| matches!(n, Node::Group { .. })),
        1
    );
    let rendered = prepared.render()?;
    assert_eq!(rendered.matches("GROUP BY").count(), 1);
    assert!(rendered.starts_with(&format!("SELECT ?s (<{MEDIAN}>(?x) AS ?y) ")));
    assert!(rendered.contains("GROUP BY ?s"));
    Ok(())
}

#[test]
fn test_custom_aggregate_text_inside_expression() -> Result<(), QueryRenderError> {
    let query = format!(
        "SELECT ?s (<{MEDIAN}>(?x) * 2 AS ?y) WHERE {{ ?s <http://example.com/v> ?x }} GROUP BY ?s"
    );
    let prepared = PreparedQuery::parse(&query, None, aggregate_lookup())?;

    assert!(prepared.has_service_aggregates());
    let rendered = prepared.render()?;
    assert!(rendered.contains(&format!("<{MEDIAN}>(?x) * ")));
    assert!(rendered.contains("AS ?y)"));
    assert_eq!(rendered.matches("GROUP BY").count(), 1);
    Ok(())
}

#[test]
fn test_custom_aggregate_text_with_prefixed_name() -> Result<(), QueryRenderError> {
    let prepared = PreparedQuery::parse(
        "PREFIX ephedra: <http://www.researchspace.org/resource/system/ephedra#>
         SELECT ?s (ephedra:median(?x) AS ?y) (COUNT(?x) AS ?n)
         WHERE { ?s <http://example.com/v> ?x } GROUP BY ?s",
        None,
        aggregate_lookup(),
    )?;

    let services = prepared
        .aggregates()
        .iter()
        .filter_map(|a| a.service.clone())
        .collect::<Vec<_>>();
    assert_eq!(services, vec![crate::test_utils::median()]);
    assert_eq!(prepared.aggregates().len(), 2);
    let rendered = prepared.render()?;
    assert!(rendered.contains(&format!("(<{MEDIAN}>(?x) AS ?y)")));
    assert!(rendered.contains("(COUNT(?x) AS ?n)"));
    Ok(())
}

#[test]
fn test_grouping_violation_from_text() {
    let error = PreparedQuery::parse(
        "SELECT ?s ?b WHERE { ?s ?p ?b } GROUP BY ?s",
        None,
        aggregate_lookup(),
    )
    .unwrap_err();

    assert!(matches!(
        &error,
        QueryRenderError::GroupingViolation { variable } if variable == "b"
    ));
    assert_eq!(
        error.to_string(),
        "variable 'b' in projection not present in GROUP BY."
    );
}

#[test]
fn test_grouping_violation_from_text_without_group_by() {
    let error = PreparedQuery::parse(
        "SELECT ?s (COUNT(?o) AS ?n) WHERE { ?s ?p ?o }",
        None,
        aggregate_lookup(),
    )
    .unwrap_err();

    assert!(matches!(
        error,
        QueryRenderError::GroupingViolation { variable } if variable == "s"
    ));
}
