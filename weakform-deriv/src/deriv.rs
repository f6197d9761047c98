use crate::MultiIndex;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt;
use std::fmt::Display;

/// Stable identifier of a symbolic function (unknown, variational or discrete).
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FunctionId(pub u32);

impl Display for FunctionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The spatial operator applied to a function before taking a functional derivative.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SpatialOp {
    /// The function itself.
    Identity,
    /// A partial derivative $D^\alpha$ with a non-zero multi-index $\alpha$.
    Partial(MultiIndex),
    /// The divergence of a vector-valued function.
    Divergence,
    /// A normal derivative of the given order on a boundary.
    Normal(u32),
}

impl SpatialOp {
    /// Constructs the operator for the given multi-index, collapsing the zero index to
    /// [`SpatialOp::Identity`].
    pub fn from_multi_index(mi: MultiIndex) -> Self {
        if mi.is_zero() {
            SpatialOp::Identity
        } else {
            SpatialOp::Partial(mi)
        }
    }

    /// The multi-index of the operator, if the operator is described by a multi-index.
    pub fn multi_index(&self) -> Option<MultiIndex> {
        match self {
            SpatialOp::Identity => Some(MultiIndex::zero()),
            SpatialOp::Partial(mi) => Some(*mi),
            SpatialOp::Divergence | SpatialOp::Normal(_) => None,
        }
    }

    pub fn is_identity(&self) -> bool {
        matches!(self, SpatialOp::Identity)
    }
}

/// A single differentiation "atom".
///
/// Ordering puts all coordinate derivatives before functional derivatives, and is otherwise
/// lexicographic in the direction, function ID and spatial operator.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Deriv {
    /// Derivative with respect to the coordinate in the given direction.
    Coordinate(usize),
    /// Derivative with respect to (a spatial operator applied to) a symbolic function.
    Functional { func: FunctionId, op: SpatialOp },
}

/// Error produced when a functional accessor is invoked on a coordinate derivative, or a
/// multi-index is requested from an operator that has none.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DerivError {
    NotFunctional(Deriv),
    NoMultiIndex(Deriv),
}

impl Display for DerivError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DerivError::NotFunctional(deriv) => {
                write!(f, "Derivative {} is not a functional derivative.", deriv)
            }
            DerivError::NoMultiIndex(deriv) => {
                write!(f, "Derivative {} has no spatial multi-index.", deriv)
            }
        }
    }
}

impl Error for DerivError {}

impl Deriv {
    pub fn coordinate(direction: usize) -> Self {
        Deriv::Coordinate(direction)
    }

    /// Functional derivative with respect to the function itself.
    pub fn functional(func: FunctionId) -> Self {
        Deriv::Functional {
            func,
            op: SpatialOp::Identity,
        }
    }

    pub fn functional_with_op(func: FunctionId, op: SpatialOp) -> Self {
        Deriv::Functional { func, op }
    }

    pub fn is_coordinate(&self) -> bool {
        matches!(self, Deriv::Coordinate(_))
    }

    pub fn is_functional(&self) -> bool {
        matches!(self, Deriv::Functional { .. })
    }

    pub fn coordinate_direction(&self) -> Option<usize> {
        match self {
            Deriv::Coordinate(direction) => Some(*direction),
            Deriv::Functional { .. } => None,
        }
    }

    pub fn func_id(&self) -> Result<FunctionId, DerivError> {
        match self {
            Deriv::Functional { func, .. } => Ok(*func),
            Deriv::Coordinate(_) => Err(DerivError::NotFunctional(*self)),
        }
    }

    pub fn spatial_op(&self) -> Result<SpatialOp, DerivError> {
        match self {
            Deriv::Functional { op, .. } => Ok(*op),
            Deriv::Coordinate(_) => Err(DerivError::NotFunctional(*self)),
        }
    }

    /// The multi-index of the spatial operator of a functional derivative.
    pub fn multi_index(&self) -> Result<MultiIndex, DerivError> {
        self.spatial_op()?
            .multi_index()
            .ok_or(DerivError::NoMultiIndex(*self))
    }

    /// The same function, differentiated with the given multi-index instead.
    pub fn with_multi_index(&self, mi: MultiIndex) -> Result<Deriv, DerivError> {
        let func = self.func_id()?;
        Ok(Deriv::Functional {
            func,
            op: SpatialOp::from_multi_index(mi),
        })
    }
}

impl Display for Deriv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Deriv::Coordinate(direction) => write!(f, "x{}", direction),
            Deriv::Functional { func, op } => match op {
                SpatialOp::Identity => write!(f, "f{}", func),
                SpatialOp::Partial(mi) => write!(f, "D{}f{}", mi, func),
                SpatialOp::Divergence => write!(f, "div(f{})", func),
                SpatialOp::Normal(order) => write!(f, "Dn{}(f{})", order, func),
            },
        }
    }
}
