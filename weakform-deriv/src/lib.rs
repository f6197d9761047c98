//! Value types describing (multiple) derivatives of weak-form integrands.
mod deriv;
mod deriv_set;
mod multi_index;
mod multiple_deriv;

pub use deriv::*;
pub use deriv_set::*;
pub use multi_index::*;
pub use multiple_deriv::*;

#[cfg(feature = "proptest-support")]
pub mod proptest;
