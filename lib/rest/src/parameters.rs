use crate::descriptor::{ServiceDescriptor, ServicePattern};
use sparql_federation_model::{NamedNode, PatternTerm, Solution, Term, Variable};
use std::collections::BTreeMap;

/// The values a single REST call is made with, and where its results go.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RestParameters {
    subject_variable: Option<Variable>,
    inputs: BTreeMap<String, String>,
    outputs: BTreeMap<NamedNode, Variable>,
    missing_inputs: Vec<String>,
}

impl RestParameters {
    /// Reads input values and output variables from the patterns of a SERVICE clause. Variables
    /// bound in `binding` are treated as constants.
    pub fn extract(
        descriptor: &ServiceDescriptor,
        patterns: &[ServicePattern],
        binding: &Solution,
    ) -> Self {
        let patterns = patterns
            .iter()
            .map(|pattern| bind_pattern(pattern, binding))
            .collect::<Vec<_>>();
        let mut result = Self::default();

        for parameter in descriptor.inputs() {
            let Some(property) = parameter.property() else {
                continue;
            };
            let subject = subject_variable(&patterns, property);
            let value = constant_object(&patterns, subject, property)
                .map(term_value)
                .or_else(|| parameter.default_value.clone());
            match value {
                Some(value) => {
                    result.inputs.insert(parameter.name.clone(), value);
                }
                None if !parameter.optional => result.missing_inputs.push(parameter.name.clone()),
                None => {}
            }
            if result.subject_variable.is_none() {
                result.subject_variable = subject.cloned();
            }
        }

        for parameter in descriptor.outputs() {
            let Some(property) = parameter.object_patterns.iter().find_map(|p| p.predicate_iri())
            else {
                continue;
            };
            let subject = subject_variable(&patterns, property);
            if let Some(variable) = object_variable(&patterns, subject, property) {
                result.outputs.insert(property.clone(), variable.clone());
            }
            if result.subject_variable.is_none() {
                result.subject_variable = subject.cloned();
            }
        }
        result
    }

    pub fn subject_variable(&self) -> Option<&Variable> {
        self.subject_variable.as_ref()
    }

    /// Input values keyed by parameter name.
    pub fn inputs(&self) -> &BTreeMap<String, String> {
        &self.inputs
    }

    /// Output variables keyed by the property of their parameter.
    pub fn outputs(&self) -> &BTreeMap<NamedNode, Variable> {
        &self.outputs
    }

    /// Required inputs for which neither the query nor the descriptor has a value.
    pub fn missing_inputs(&self) -> &[String] {
        &self.missing_inputs
    }

    pub fn is_complete(&self) -> bool {
        self.missing_inputs.is_empty()
    }
}

fn bind_pattern(pattern: &ServicePattern, binding: &Solution) -> ServicePattern {
    let lookup = |variable: &Variable| binding.get(variable).cloned();
    ServicePattern {
        subject: pattern.subject.bind(lookup),
        predicate: pattern.predicate.bind(lookup),
        object: pattern.object.bind(lookup),
    }
}

fn has_property(pattern: &ServicePattern, property: &NamedNode) -> bool {
    pattern.predicate_iri() == Some(property)
}

fn matches_subject(pattern: &ServicePattern, subject: Option<&Variable>) -> bool {
    subject.map_or(true, |subject| pattern.subject.variable() == Some(subject))
}

fn subject_variable<'a>(
    patterns: &'a [ServicePattern],
    property: &NamedNode,
) -> Option<&'a Variable> {
    patterns
        .iter()
        .filter(|pattern| has_property(pattern, property))
        .find_map(|pattern| pattern.subject.variable())
}

fn constant_object<'a>(
    patterns: &'a [ServicePattern],
    subject: Option<&Variable>,
    property: &NamedNode,
) -> Option<&'a Term> {
    patterns
        .iter()
        .filter(|pattern| has_property(pattern, property) && matches_subject(pattern, subject))
        .find_map(|pattern| pattern.object.constant())
}

fn object_variable<'a>(
    patterns: &'a [ServicePattern],
    subject: Option<&Variable>,
    property: &NamedNode,
) -> Option<&'a Variable> {
    patterns
        .iter()
        .filter(|pattern| has_property(pattern, property) && matches_subject(pattern, subject))
        .find_map(|pattern| match &pattern.object {
            PatternTerm::Variable(variable) => Some(variable),
            PatternTerm::Constant(_) => None,
        })
}

/// The string value of a term, as sent to a service.
fn term_value(term: &Term) -> String {
    match term {
        Term::NamedNode(node) => node.as_str().to_owned(),
        Term::BlankNode(node) => node.as_str().to_owned(),
        Term::Literal(literal) => literal.value().to_owned(),
        #[allow(unreachable_patterns, reason = "Quoted triples exist with the rdf-star feature")]
        other => other.to_string(),
    }
}
