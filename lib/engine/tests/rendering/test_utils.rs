use sparql_federation_engine::{PreparedQuery, QueryRenderError};
use sparql_federation_model::{NamedNode, Node, NodeId, ProjectionElem, QueryTree, Variable};
use std::collections::HashSet;

pub const MEDIAN: &str = "http://www.researchspace.org/resource/system/ephedra#median";

pub fn median() -> NamedNode {
    NamedNode::new_unchecked(MEDIAN)
}

pub fn aggregate_lookup() -> HashSet<NamedNode> {
    HashSet::from([median()])
}

pub fn var(name: &str) -> Variable {
    Variable::new_unchecked(name)
}

pub fn render(query: &str) -> Result<String, QueryRenderError> {
    PreparedQuery::parse(query, None, aggregate_lookup())?.render()
}

/// Builds `SELECT <columns> (<median>(?x) AS ?y) WHERE { ?s <value> ?x } GROUP BY <keys>`.
pub fn median_query(columns: &[&str], keys: &[&str]) -> QueryTree {
    let mut tree = QueryTree::new();
    let pattern = tree.statement_pattern(
        var("s"),
        NamedNode::new_unchecked("http://example.com/value"),
        var("x"),
    );
    let group = tree.add(Node::Group {
        arg: pattern,
        variables: keys.iter().map(|k| var(k)).collect(),
        elems: Vec::new(),
    });
    let x = tree.var(var("x"));
    let call = tree.add(Node::FunctionCall {
        iri: median(),
        args: vec![x],
    });
    let elem = tree.add(Node::ExtensionElem {
        name: var("y"),
        expr: call,
    });
    let extension = tree.add(Node::Extension {
        arg: group,
        elems: vec![elem],
    });

    let mut elems = columns
        .iter()
        .map(|c| ProjectionElem::new(var(c)))
        .collect::<Vec<_>>();
    let mut y = ProjectionElem::new(var("y"));
    y.source_expression = Some(elem);
    elems.push(y);

    let projection = tree.add(Node::Projection {
        arg: extension,
        elems,
    });
    tree.set_root(projection);
    tree
}

pub fn count_nodes(tree: &QueryTree, predicate: impl Fn(&Node) -> bool) -> usize {
    tree.root()
        .map(|root| {
            tree.descendants(root)
                .into_iter()
                .filter(|id: &NodeId| predicate(tree.node(*id)))
                .count()
        })
        .unwrap_or_default()
}
