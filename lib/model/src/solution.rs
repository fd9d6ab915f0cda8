use oxrdf::{Term, Variable};
use std::collections::btree_map;
use std::collections::BTreeMap;

/// A set of variable bindings, i.e., one row of a query result.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Solution {
    bindings: BTreeMap<Variable, Term>,
}

impl Solution {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, variable: &Variable) -> Option<&Term> {
        self.bindings.get(variable)
    }

    /// Looks up a binding by the name of the variable (without `?`).
    pub fn get_by_name(&self, name: &str) -> Option<&Term> {
        self.bindings
            .iter()
            .find(|(variable, _)| variable.as_str() == name)
            .map(|(_, term)| term)
    }

    pub fn insert(&mut self, variable: Variable, term: Term) -> Option<Term> {
        self.bindings.insert(variable, term)
    }

    pub fn remove(&mut self, variable: &Variable) -> Option<Term> {
        self.bindings.remove(variable)
    }

    pub fn contains(&self, variable: &Variable) -> bool {
        self.bindings.contains_key(variable)
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    pub fn iter(&self) -> btree_map::Iter<'_, Variable, Term> {
        self.bindings.iter()
    }

    pub fn variables(&self) -> impl Iterator<Item = &Variable> {
        self.bindings.keys()
    }

    /// Two solutions are compatible if they agree on all shared variables.
    pub fn is_compatible(&self, other: &Solution) -> bool {
        self.bindings
            .iter()
            .all(|(variable, term)| other.get(variable).map_or(true, |o| o == term))
    }

    /// Returns the union of both solutions. Bindings of `self` win on conflicts.
    #[must_use]
    pub fn merge(&self, other: &Solution) -> Solution {
        let mut result = other.clone();
        for (variable, term) in &self.bindings {
            result.insert(variable.clone(), term.clone());
        }
        result
    }

    /// Keeps only the given variables.
    #[must_use]
    pub fn project(&self, variables: &[Variable]) -> Solution {
        self.bindings
            .iter()
            .filter(|(variable, _)| variables.contains(variable))
            .map(|(variable, term)| (variable.clone(), term.clone()))
            .collect()
    }
}

impl FromIterator<(Variable, Term)> for Solution {
    fn from_iter<T: IntoIterator<Item = (Variable, Term)>>(iter: T) -> Self {
        Self {
            bindings: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a Solution {
    type Item = (&'a Variable, &'a Term);
    type IntoIter = btree_map::Iter<'a, Variable, Term>;

    fn into_iter(self) -> Self::IntoIter {
        self.bindings.iter()
    }
}
