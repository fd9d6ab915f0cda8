//! The declarative contract of a REST service.
//!
//! A [`ServiceDescriptor`] lists the input and output parameters of a service together with the
//! triple patterns through which they appear in a query. Descriptors are loaded from RDF and are
//! immutable afterwards.

use crate::error::RestError;
use dashmap::DashMap;
use oxttl::TurtleParser;
use sparql_federation_model::vocab::{ephedra, rdf, rdfs, sp, spin, spl, xsd};
use sparql_federation_model::{
    Graph, NamedNode, NamedNodeRef, PatternTerm, SubjectRef, Term, TermRef, Variable,
};
use std::sync::Arc;
use tracing::debug;

/// A triple pattern of a service signature.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServicePattern {
    pub subject: PatternTerm,
    pub predicate: PatternTerm,
    pub object: PatternTerm,
}

impl ServicePattern {
    pub fn predicate_iri(&self) -> Option<&NamedNode> {
        match self.predicate.constant() {
            Some(Term::NamedNode(iri)) => Some(iri),
            _ => None,
        }
    }
}

/// One input or output parameter of a service.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServiceParameter {
    pub name: String,
    pub value_type: NamedNode,
    pub default_value: Option<String>,
    pub optional: bool,
    /// Where the value is found in a response.
    pub json_path: Option<String>,
    /// Where the value goes in a request body.
    pub input_json_path: Option<String>,
    /// Patterns that have this parameter as their subject.
    pub subject_patterns: Vec<ServicePattern>,
    /// Patterns that have this parameter as their object.
    pub object_patterns: Vec<ServicePattern>,
}

impl ServiceParameter {
    fn new(name: String) -> Self {
        Self {
            name,
            value_type: xsd::STRING.into_owned(),
            default_value: None,
            optional: false,
            json_path: None,
            input_json_path: None,
            subject_patterns: Vec::new(),
            object_patterns: Vec::new(),
        }
    }

    /// The property through which a query refers to this parameter.
    pub fn property(&self) -> Option<&NamedNode> {
        self.object_patterns
            .iter()
            .chain(&self.subject_patterns)
            .find_map(ServicePattern::predicate_iri)
    }

    pub fn is_subject(&self) -> bool {
        !self.subject_patterns.is_empty() && self.object_patterns.is_empty()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServiceDescriptor {
    service_iri: NamedNode,
    label: Option<String>,
    inputs: Vec<ServiceParameter>,
    outputs: Vec<ServiceParameter>,
    patterns: Vec<ServicePattern>,
}

impl ServiceDescriptor {
    /// Reads the descriptor of `service_iri` from `graph`.
    pub fn from_graph(graph: &Graph, service_iri: NamedNodeRef<'_>) -> Result<Self, RestError> {
        if graph.triples_for_subject(service_iri).next().is_none() {
            return RestError::configuration(format!(
                "No service descriptor found for {service_iri}"
            ));
        }

        let label = graph
            .object_for_subject_predicate(service_iri, rdfs::LABEL)
            .and_then(|label| match label {
                TermRef::Literal(literal) => Some(literal.value().to_owned()),
                _ => None,
            });

        let mut inputs = typed_objects(graph, service_iri, spin::CONSTRAINT, spl::ARGUMENT)
            .map(|node| read_parameter(graph, node))
            .collect::<Result<Vec<_>, _>>()?;
        let mut outputs = typed_objects(graph, service_iri, spin::COLUMN, spin::COLUMN_CLASS)
            .map(|node| read_parameter(graph, node))
            .collect::<Result<Vec<_>, _>>()?;

        let Some(list) =
            graph.object_for_subject_predicate(service_iri, ephedra::HAS_SPARQL_PATTERN)
        else {
            return RestError::configuration(format!(
                "Service {service_iri} does not define a SPARQL pattern"
            ));
        };
        let patterns = read_patterns(graph, list)?;

        for parameter in inputs.iter_mut().chain(outputs.iter_mut()) {
            for pattern in &patterns {
                if refers_to(&pattern.subject, &parameter.name) {
                    parameter.subject_patterns.push(pattern.clone());
                }
                if refers_to(&pattern.object, &parameter.name) {
                    parameter.object_patterns.push(pattern.clone());
                }
            }
        }

        debug!(
            service = %service_iri,
            inputs = inputs.len(),
            outputs = outputs.len(),
            "Loaded service descriptor"
        );
        Ok(Self {
            service_iri: service_iri.into_owned(),
            label,
            inputs,
            outputs,
            patterns,
        })
    }

    /// Parses a Turtle document and reads the descriptor of `service_iri` from it.
    pub fn from_turtle(data: &[u8], service_iri: NamedNodeRef<'_>) -> Result<Self, RestError> {
        let mut graph = Graph::new();
        for triple in TurtleParser::new().for_reader(data) {
            graph.insert(&triple?);
        }
        Self::from_graph(&graph, service_iri)
    }

    pub fn service_iri(&self) -> &NamedNode {
        &self.service_iri
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub fn inputs(&self) -> &[ServiceParameter] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[ServiceParameter] {
        &self.outputs
    }

    pub fn patterns(&self) -> &[ServicePattern] {
        &self.patterns
    }

    /// The unique output that only appears as the subject of patterns.
    pub fn subject_parameter(&self) -> Option<&ServiceParameter> {
        let mut candidates = self.outputs.iter().filter(|p| p.is_subject());
        let subject = candidates.next()?;
        candidates.next().is_none().then_some(subject)
    }

    /// The output parameter that a query reaches through `property`.
    pub fn output_for_property(&self, property: &NamedNode) -> Option<&ServiceParameter> {
        self.outputs
            .iter()
            .find(|p| p.property() == Some(property))
    }
}

/// Looks up service descriptors by service IRI.
pub trait ServiceDescriptorStore: Send + Sync {
    fn descriptor(&self, service_iri: &NamedNode) -> Option<Arc<ServiceDescriptor>>;
}

/// A [`ServiceDescriptorStore`] that keeps all descriptors in memory.
#[derive(Debug, Default)]
pub struct MemoryDescriptorStore {
    descriptors: DashMap<NamedNode, Arc<ServiceDescriptor>>,
}

impl MemoryDescriptorStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, descriptor: ServiceDescriptor) -> Arc<ServiceDescriptor> {
        let descriptor = Arc::new(descriptor);
        self.descriptors
            .insert(descriptor.service_iri().clone(), Arc::clone(&descriptor));
        descriptor
    }

    /// Loads the descriptor of `service_iri` from a Turtle document and stores it.
    pub fn load_turtle(
        &self,
        data: &[u8],
        service_iri: NamedNodeRef<'_>,
    ) -> Result<Arc<ServiceDescriptor>, RestError> {
        Ok(self.insert(ServiceDescriptor::from_turtle(data, service_iri)?))
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

impl ServiceDescriptorStore for MemoryDescriptorStore {
    fn descriptor(&self, service_iri: &NamedNode) -> Option<Arc<ServiceDescriptor>> {
        self.descriptors
            .get(service_iri)
            .map(|entry| Arc::clone(entry.value()))
    }
}

fn as_subject(term: TermRef<'_>) -> Option<SubjectRef<'_>> {
    match term {
        TermRef::NamedNode(node) => Some(node.into()),
        TermRef::BlankNode(node) => Some(node.into()),
        _ => None,
    }
}

fn typed_objects<'a>(
    graph: &'a Graph,
    service_iri: NamedNodeRef<'a>,
    predicate: NamedNodeRef<'a>,
    class: NamedNodeRef<'a>,
) -> impl Iterator<Item = SubjectRef<'a>> + 'a {
    graph
        .objects_for_subject_predicate(service_iri, predicate)
        .filter_map(as_subject)
        .filter(move |node| {
            graph
                .objects_for_subject_predicate(*node, rdf::TYPE)
                .any(|t| t == TermRef::from(class))
        })
}

fn read_parameter(graph: &Graph, node: SubjectRef<'_>) -> Result<ServiceParameter, RestError> {
    let Some(predicate) = graph.object_for_subject_predicate(node, spl::PREDICATE) else {
        return RestError::configuration(format!("Parameter {node} has no spl:predicate"));
    };
    let mut parameter = ServiceParameter::new(parameter_name(predicate)?);

    for (property, value) in graph
        .triples_for_subject(node)
        .map(|t| (t.predicate, t.object))
    {
        let literal = match value {
            TermRef::Literal(literal) => Some(literal.value()),
            _ => None,
        };
        if property == spl::VALUE_TYPE {
            if let TermRef::NamedNode(datatype) = value {
                parameter.value_type = datatype.into_owned();
            }
        } else if property == spl::DEFAULT_VALUE {
            parameter.default_value = Some(match value {
                TermRef::Literal(literal) => literal.value().to_owned(),
                TermRef::NamedNode(iri) => iri.as_str().to_owned(),
                other => other.to_string(),
            });
        } else if property == spl::OPTIONAL {
            parameter.optional = literal == Some("true");
        } else if property == ephedra::JSON_PATH {
            parameter.json_path = literal.map(ToOwned::to_owned);
        } else if property == ephedra::INPUT_JSON_PATH {
            parameter.input_json_path = literal.map(ToOwned::to_owned);
        }
    }
    Ok(parameter)
}

/// Blank nodes name a parameter by their id, IRIs by their local name after a leading `_`.
fn parameter_name(node: TermRef<'_>) -> Result<String, RestError> {
    match node {
        TermRef::BlankNode(node) => Ok(node.as_str().to_owned()),
        TermRef::NamedNode(iri) => match local_name(iri.as_str()).strip_prefix('_') {
            Some(name) => Ok(name.to_owned()),
            None => RestError::configuration(format!(
                "Parameter IRI {iri} must have a local name starting with '_'"
            )),
        },
        other => RestError::configuration(format!("Invalid parameter identifier {other}")),
    }
}

fn local_name(iri: &str) -> &str {
    iri.rfind(['#', '/', ':'])
        .map_or(iri, |position| &iri[position + 1..])
}

fn read_patterns(graph: &Graph, list: TermRef<'_>) -> Result<Vec<ServicePattern>, RestError> {
    let mut patterns = Vec::new();
    let mut current = list;
    while current != TermRef::from(rdf::NIL) {
        let Some(cell) = as_subject(current) else {
            return RestError::configuration(format!("Invalid RDF list node {current}"));
        };
        if let Some(item) = graph
            .object_for_subject_predicate(cell, rdf::FIRST)
            .and_then(as_subject)
        {
            patterns.push(read_pattern(graph, item)?);
        }
        let Some(rest) = graph.object_for_subject_predicate(cell, rdf::REST) else {
            return RestError::configuration(format!("RDF list node {cell} has no rdf:rest"));
        };
        current = rest;
    }
    Ok(patterns)
}

fn read_pattern(graph: &Graph, item: SubjectRef<'_>) -> Result<ServicePattern, RestError> {
    let position = |predicate: NamedNodeRef<'_>| match graph
        .object_for_subject_predicate(item, predicate)
    {
        Some(term) => Ok(pattern_term(term)),
        None => RestError::configuration(format!("Pattern {item} has no {predicate}")),
    };
    Ok(ServicePattern {
        subject: position(sp::SUBJECT)?,
        predicate: position(sp::PREDICATE)?,
        object: position(sp::OBJECT)?,
    })
}

fn pattern_term(term: TermRef<'_>) -> PatternTerm {
    match term {
        TermRef::BlankNode(node) => PatternTerm::Variable(Variable::new_unchecked(node.as_str())),
        TermRef::NamedNode(iri) => match local_name(iri.as_str()).strip_prefix('_') {
            Some(name) if !name.is_empty() => {
                PatternTerm::Variable(Variable::new_unchecked(name))
            }
            _ => PatternTerm::Constant(term.into_owned()),
        },
        _ => PatternTerm::Constant(term.into_owned()),
    }
}

fn refers_to(term: &PatternTerm, name: &str) -> bool {
    term.variable().is_some_and(|v| v.as_str() == name)
}
