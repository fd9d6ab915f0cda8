use dashmap::DashMap;
use sparql_federation_engine::sparql::rewriting::AggregateLookup;
use sparql_federation_model::vocab::{ephedra, xsd};
use sparql_federation_model::{Literal, NamedNode, NamedNodeRef, Term};
use std::fmt::Debug;
use std::sync::Arc;

/// An aggregate function that is not part of SPARQL.
///
/// The federation computes these over the values of a group after all members have answered.
pub trait AggregateService: Debug + Send + Sync {
    /// Returns [`None`] if the aggregate is undefined for `values`.
    fn evaluate(&self, values: &[Term]) -> Option<Term>;
}

/// The median of all numeric values. Other values are ignored.
#[derive(Clone, Copy, Debug, Default)]
pub struct MedianAggregateService;

impl AggregateService for MedianAggregateService {
    fn evaluate(&self, values: &[Term]) -> Option<Term> {
        let mut numbers = values.iter().filter_map(numeric_value).collect::<Vec<_>>();
        if numbers.is_empty() {
            return None;
        }
        numbers.sort_by(f64::total_cmp);
        let middle = numbers.len() / 2;
        let median = if numbers.len() % 2 == 0 {
            (numbers[middle - 1] + numbers[middle]) / 2.0
        } else {
            numbers[middle]
        };
        Some(Literal::from(median).into())
    }
}

/// Reads the numeric value of a literal with a numeric datatype.
pub fn numeric_value(term: &Term) -> Option<f64> {
    let Term::Literal(literal) = term else {
        return None;
    };
    let datatype = literal.datatype();
    let numeric = [
        xsd::INTEGER,
        xsd::DECIMAL,
        xsd::DOUBLE,
        xsd::FLOAT,
        xsd::INT,
        xsd::LONG,
        xsd::SHORT,
        xsd::BYTE,
        xsd::NON_NEGATIVE_INTEGER,
        xsd::POSITIVE_INTEGER,
        xsd::NON_POSITIVE_INTEGER,
        xsd::NEGATIVE_INTEGER,
        xsd::UNSIGNED_INT,
        xsd::UNSIGNED_LONG,
        xsd::UNSIGNED_SHORT,
        xsd::UNSIGNED_BYTE,
    ];
    if !numeric.contains(&datatype) {
        return None;
    }
    match literal.value() {
        "INF" => Some(f64::INFINITY),
        "-INF" => Some(f64::NEG_INFINITY),
        value => value.parse().ok(),
    }
}

/// Aggregate services keyed by their IRI.
#[derive(Debug)]
pub struct AggregateRegistry {
    services: DashMap<NamedNode, Arc<dyn AggregateService>>,
}

impl AggregateRegistry {
    /// A registry without any service.
    pub fn empty() -> Self {
        Self {
            services: DashMap::new(),
        }
    }

    pub fn register(&self, iri: NamedNode, service: Arc<dyn AggregateService>) {
        self.services.insert(iri, service);
    }

    pub fn get(&self, iri: &NamedNode) -> Option<Arc<dyn AggregateService>> {
        self.services.get(iri).map(|entry| Arc::clone(entry.value()))
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

impl Default for AggregateRegistry {
    /// A registry with the median service.
    fn default() -> Self {
        let registry = Self::empty();
        registry.register(ephedra::MEDIAN.into_owned(), Arc::new(MedianAggregateService));
        registry
    }
}

impl AggregateLookup for AggregateRegistry {
    fn is_aggregate(&self, iri: NamedNodeRef<'_>) -> bool {
        self.services.contains_key(&iri.into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numbers(values: &[i64]) -> Vec<Term> {
        values.iter().map(|v| Literal::from(*v).into()).collect()
    }

    #[test]
    fn median_of_odd_and_even_counts() {
        let median = MedianAggregateService;

        assert_eq!(
            median.evaluate(&numbers(&[5, 1, 3])),
            Some(Literal::from(3.0).into())
        );
        assert_eq!(
            median.evaluate(&numbers(&[4, 1, 3, 2])),
            Some(Literal::from(2.5).into())
        );
        assert_eq!(median.evaluate(&[]), None);
    }

    #[test]
    fn median_ignores_non_numeric_values() {
        let mut values = numbers(&[7]);
        values.push(Literal::new_simple_literal("x").into());
        values.push(NamedNode::new_unchecked("http://example.com/a").into());

        assert_eq!(
            MedianAggregateService.evaluate(&values),
            Some(Literal::from(7.0).into())
        );
    }

    #[test]
    fn registry_knows_median() {
        let registry = AggregateRegistry::default();

        assert!(registry.is_aggregate(ephedra::MEDIAN));
        assert!(!registry.is_aggregate(NamedNodeRef::new_unchecked("http://example.com/f")));
        assert!(registry.get(&ephedra::MEDIAN.into_owned()).is_some());
    }
}
