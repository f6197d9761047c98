use crate::{Deriv, FunctionId, MultiIndex};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;
use std::fmt::Display;

/// An unordered multiset of [`Deriv`] atoms, representing a mixed partial derivative.
///
/// The atoms are kept sorted, so that two multiple derivatives compare equal exactly when they
/// contain the same atoms with the same multiplicities. The empty multiple derivative stands for
/// the zeroth-order "derivative", i.e. the value of an expression itself.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "Vec<Deriv>")]
pub struct MultipleDeriv(Vec<Deriv>);

impl From<Vec<Deriv>> for MultipleDeriv {
    fn from(mut derivs: Vec<Deriv>) -> Self {
        derivs.sort_unstable();
        Self(derivs)
    }
}

impl FromIterator<Deriv> for MultipleDeriv {
    fn from_iter<I: IntoIterator<Item = Deriv>>(iter: I) -> Self {
        Self::from(iter.into_iter().collect::<Vec<_>>())
    }
}

impl From<Deriv> for MultipleDeriv {
    fn from(deriv: Deriv) -> Self {
        Self(vec![deriv])
    }
}

impl MultipleDeriv {
    /// The empty multiple derivative.
    pub fn new() -> Self {
        Self::default()
    }

    /// The number of atoms, counted with multiplicity.
    pub fn order(&self) -> usize {
        self.0.len()
    }

    /// The number of coordinate atoms.
    pub fn spatial_order(&self) -> usize {
        self.0.iter().filter(|d| d.is_coordinate()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Deriv> {
        self.0.iter()
    }

    pub fn derivs(&self) -> &[Deriv] {
        &self.0
    }

    pub fn contains(&self, deriv: &Deriv) -> bool {
        self.0.binary_search(deriv).is_ok()
    }

    /// The multiset union of `self` and `other`.
    pub fn product(&self, other: &MultipleDeriv) -> MultipleDeriv {
        let mut derivs = Vec::with_capacity(self.order() + other.order());
        derivs.extend_from_slice(&self.0);
        derivs.extend_from_slice(&other.0);
        MultipleDeriv::from(derivs)
    }

    /// Removes a single copy of `deriv`.
    ///
    /// Returns `None` if `deriv` is not an atom of `self`.
    pub fn factor_out_deriv(&self, deriv: &Deriv) -> Option<MultipleDeriv> {
        let position = self.0.binary_search(deriv).ok()?;
        let mut derivs = self.0.clone();
        derivs.remove(position);
        Some(Self(derivs))
    }

    /// The multiset difference `self \ other`, provided `other` is contained in `self`.
    pub fn factor_out(&self, other: &MultipleDeriv) -> Option<MultipleDeriv> {
        other
            .iter()
            .try_fold(self.clone(), |remainder, deriv| remainder.factor_out_deriv(deriv))
    }

    /// Replaces a single copy of `old` by `new`.
    pub fn replace(&self, old: &Deriv, new: Deriv) -> Option<MultipleDeriv> {
        let mut remainder = self.factor_out_deriv(old)?;
        let position = remainder.0.binary_search(&new).unwrap_or_else(|p| p);
        remainder.0.insert(position, new);
        Some(remainder)
    }

    /// The function IDs of the functional atoms, as a sorted multiset.
    pub fn func_ids(&self) -> Vec<FunctionId> {
        // Atoms are sorted by function ID within the functional category
        self.0.iter().filter_map(|d| d.func_id().ok()).collect()
    }

    /// The sum of the coordinate atoms, interpreted as a spatial multi-index.
    pub fn spatial_multi_index(&self) -> MultiIndex {
        self.0
            .iter()
            .filter_map(Deriv::coordinate_direction)
            .fold(MultiIndex::zero(), |mi, direction| mi + MultiIndex::unit(direction))
    }

    /// Determines whether this multiple derivative is demanded by a consumer.
    ///
    /// A multiple derivative without coordinate atoms is required if the multiset of its function
    /// IDs is one of `func_combinations`. A multiple derivative with coordinate atoms is required
    /// if the multi-index formed by its coordinate atoms is one of `multi_indices`.
    pub fn is_in_required_set(
        &self,
        func_combinations: &BTreeSet<Vec<FunctionId>>,
        multi_indices: &BTreeSet<MultiIndex>,
    ) -> bool {
        if self.spatial_order() == 0 {
            func_combinations.contains(&self.func_ids())
        } else {
            multi_indices.contains(&self.spatial_multi_index())
        }
    }
}

impl PartialOrd for MultipleDeriv {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for MultipleDeriv {
    /// Lower orders come first; multiple derivatives of equal order compare lexicographically.
    fn cmp(&self, other: &Self) -> Ordering {
        self.order()
            .cmp(&other.order())
            .then_with(|| self.0.cmp(&other.0))
    }
}

impl<'a> IntoIterator for &'a MultipleDeriv {
    type Item = &'a Deriv;
    type IntoIter = std::slice::Iter<'a, Deriv>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl Display for MultipleDeriv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, deriv) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", deriv)?;
        }
        write!(f, "}}")
    }
}
