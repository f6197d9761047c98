//! Errors produced by the sparsity analysis.
use std::error::Error;
use std::fmt;
use std::fmt::Display;
use weakform_deriv::DerivError;

/// Fatal conditions encountered while determining derivative sets.
///
/// Expressions, contexts and derivatives are stored in their textual form so that the error is
/// self-contained and can outlive the session that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SparsityError {
    /// The required set of an expression was queried before it was determined for the context.
    RequiredSetNotReady { expr: String, context: String },
    /// The required set of an expression grew after its constant or variable subset had already
    /// been computed for the same context.
    RequiredSetGrewAfterClassification { expr: String, context: String, order: usize },
    /// A second-order derivative at the top level of an equation could not be decomposed into one
    /// variational and one unknown function.
    MalformedSecondOrderDeriv { expr: String, deriv: String },
    /// A spatial derivative was applied to a functional derivative whose spatial operator is not
    /// described by a multi-index.
    UnsupportedSpatialOp { expr: String, deriv: String },
    /// A derivative atom was used in a way that its kind does not permit.
    InvalidDeriv { expr: String, source: DerivError },
}

impl Display for SparsityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        match self {
            SparsityError::RequiredSetNotReady { expr, context } => {
                write!(
                    f,
                    "Required set of expression {} requested before it was determined in context {}.",
                    expr, context
                )
            }
            SparsityError::RequiredSetGrewAfterClassification { expr, context, order } => {
                write!(
                    f,
                    "Required set of order {} of expression {} grew after it was classified in context {}.",
                    order, expr, context
                )
            }
            SparsityError::MalformedSecondOrderDeriv { expr, deriv } => {
                write!(
                    f,
                    "Second-order derivative {} of expression {} is not a (variation, unknown) pair.",
                    deriv, expr
                )
            }
            SparsityError::UnsupportedSpatialOp { expr, deriv } => {
                write!(
                    f,
                    "Cannot differentiate {} spatially in expression {}: the operator has no multi-index.",
                    deriv, expr
                )
            }
            SparsityError::InvalidDeriv { expr, source } => {
                write!(f, "Invalid derivative in expression {}. Error: {}", expr, source)
            }
        }
    }
}

impl Error for SparsityError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            SparsityError::InvalidDeriv { source, .. } => Some(source),
            _ => None,
        }
    }
}
