use crate::{Deriv, MultipleDeriv};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::collections::btree_set;
use std::collections::BTreeSet;
use std::fmt;
use std::fmt::Display;

/// An ordered set of multiple derivatives.
///
/// Besides the usual set operations, derivative sets support the set product
/// $S \otimes T = \{ s t : s \in S, t \in T \}$ and the set division
/// $S / T = \{ s / t : s \in S, t \in T, t \subseteq s \}$, where $s t$ is the multiset union and
/// $s / t$ the multiset difference of the atoms.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DerivSet(BTreeSet<MultipleDeriv>);

impl DerivSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn singleton(md: MultipleDeriv) -> Self {
        Self(BTreeSet::from([md]))
    }

    /// The set containing only the empty multiple derivative.
    pub fn unit() -> Self {
        Self::singleton(MultipleDeriv::new())
    }

    pub fn insert(&mut self, md: MultipleDeriv) -> bool {
        self.0.insert(md)
    }

    pub fn contains(&self, md: &MultipleDeriv) -> bool {
        self.0.contains(md)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> btree_set::Iter<MultipleDeriv> {
        self.0.iter()
    }

    pub fn as_set(&self) -> &BTreeSet<MultipleDeriv> {
        &self.0
    }

    /// Adds all elements of `other` to `self`, returning `true` if `self` grew.
    pub fn merge(&mut self, other: &DerivSet) -> bool {
        let len_before = self.0.len();
        self.0.extend(other.iter().cloned());
        self.0.len() > len_before
    }

    pub fn union(&self, other: &DerivSet) -> DerivSet {
        self.0.union(&other.0).cloned().collect()
    }

    pub fn intersection(&self, other: &DerivSet) -> DerivSet {
        self.0.intersection(&other.0).cloned().collect()
    }

    pub fn difference(&self, other: &DerivSet) -> DerivSet {
        self.0.difference(&other.0).cloned().collect()
    }

    pub fn is_disjoint(&self, other: &DerivSet) -> bool {
        self.0.is_disjoint(&other.0)
    }

    pub fn is_subset(&self, other: &DerivSet) -> bool {
        self.0.is_subset(&other.0)
    }

    /// The set product $S \otimes T$.
    pub fn product(&self, other: &DerivSet) -> DerivSet {
        self.iter()
            .cartesian_product(other.iter())
            .map(|(s, t)| s.product(t))
            .collect()
    }

    /// The set division $S / T$.
    pub fn divide(&self, other: &DerivSet) -> DerivSet {
        self.iter()
            .cartesian_product(other.iter())
            .filter_map(|(s, t)| s.factor_out(t))
            .collect()
    }

    /// Divides by the set of single-atom multiple derivatives formed by `derivs`.
    pub fn divide_by_derivs<'a>(&self, derivs: impl IntoIterator<Item = &'a Deriv>) -> DerivSet {
        let derivs: Vec<_> = derivs.into_iter().collect();
        self.iter()
            .cartesian_product(derivs)
            .filter_map(|(s, d)| s.factor_out_deriv(d))
            .collect()
    }

    pub fn filter(&self, mut predicate: impl FnMut(&MultipleDeriv) -> bool) -> DerivSet {
        self.iter().filter(|md| predicate(md)).cloned().collect()
    }
}

impl FromIterator<MultipleDeriv> for DerivSet {
    fn from_iter<I: IntoIterator<Item = MultipleDeriv>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl Extend<MultipleDeriv> for DerivSet {
    fn extend<I: IntoIterator<Item = MultipleDeriv>>(&mut self, iter: I) {
        self.0.extend(iter)
    }
}

impl IntoIterator for DerivSet {
    type Item = MultipleDeriv;
    type IntoIter = btree_set::IntoIter<MultipleDeriv>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a DerivSet {
    type Item = &'a MultipleDeriv;
    type IntoIter = btree_set::Iter<'a, MultipleDeriv>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl Display for DerivSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{}}}", self.iter().format(", "))
    }
}
