//! Symbolic sparsity analysis of finite element weak forms.
//!
//! Given the integrands of a weak form as expression graphs in an [`expr::ExprArena`], a
//! [`sparsity::SparsitySession`] determines which functional and spatial derivatives of every
//! subexpression are nonzero, which of them are actually required, and which of the required
//! ones are constant over an integration region. [`equation::EquationSet::analyze`] aggregates
//! this into the (variation, unknown) coupling of each region and a block sparsity pattern.
pub mod context;
pub mod equation;
pub mod error;
pub mod expr;
pub mod settings;
pub mod sparsity;

pub mod deriv {
    pub use weakform_deriv::*;
}

pub extern crate nalgebra_sparse;

#[cfg(feature = "proptest-support")]
pub mod proptest;
