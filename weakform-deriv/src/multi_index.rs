use serde::{Deserialize, Serialize};
use std::fmt;
use std::fmt::Display;
use std::ops::{Add, Neg, Sub};

/// The maximum number of spatial directions a multi-index can address.
pub const MAX_SPATIAL_DIM: usize = 3;

/// A spatial multi-index $\alpha = (\alpha_0, \alpha_1, \alpha_2)$, representing the partial
/// derivative $\partial^{|\alpha|} / \partial x_0^{\alpha_0} \partial x_1^{\alpha_1} \partial x_2^{\alpha_2}$.
///
/// Entries are signed so that indices can be shifted in both directions. An index with a negative
/// entry does not describe a derivative and is reported as invalid by [`MultiIndex::is_valid`].
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MultiIndex([i32; MAX_SPATIAL_DIM]);

impl MultiIndex {
    pub fn new(x: i32, y: i32, z: i32) -> Self {
        Self([x, y, z])
    }

    /// The zero multi-index, i.e. no spatial derivative at all.
    pub fn zero() -> Self {
        Self::default()
    }

    /// The first-order multi-index in the given direction.
    ///
    /// # Panics
    ///
    /// Panics if `direction` is not smaller than [`MAX_SPATIAL_DIM`].
    pub fn unit(direction: usize) -> Self {
        assert!(
            direction < MAX_SPATIAL_DIM,
            "Direction {} exceeds the maximum spatial dimension {}.",
            direction,
            MAX_SPATIAL_DIM
        );
        let mut entries = [0; MAX_SPATIAL_DIM];
        entries[direction] = 1;
        Self(entries)
    }

    pub fn entries(&self) -> &[i32; MAX_SPATIAL_DIM] {
        &self.0
    }

    /// The total order $|\alpha|$ of the multi-index.
    pub fn order(&self) -> i32 {
        self.0.iter().sum()
    }

    /// Returns `true` if no entry is negative.
    pub fn is_valid(&self) -> bool {
        self.0.iter().all(|&entry| entry >= 0)
    }

    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|&entry| entry == 0)
    }

    /// The direction of an order-one multi-index, or `None` if the index is not a unit index.
    pub fn first_order_direction(&self) -> Option<usize> {
        if !self.is_valid() || self.order() != 1 {
            return None;
        }
        self.0.iter().position(|&entry| entry == 1)
    }
}

impl Add for MultiIndex {
    type Output = MultiIndex;

    fn add(self, rhs: Self) -> Self::Output {
        let mut entries = self.0;
        for (entry, other) in entries.iter_mut().zip(rhs.0) {
            *entry += other;
        }
        Self(entries)
    }
}

impl Neg for MultiIndex {
    type Output = MultiIndex;

    fn neg(self) -> Self::Output {
        Self(self.0.map(|entry| -entry))
    }
}

impl Sub for MultiIndex {
    type Output = MultiIndex;

    fn sub(self, rhs: Self) -> Self::Output {
        self + (-rhs)
    }
}

impl Display for MultiIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [x, y, z] = self.0;
        write!(f, "({},{},{})", x, y, z)
    }
}
