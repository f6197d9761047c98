//! Strategies for generating random integrands.
use crate::expr::{ExprArena, NodeId};
use ::proptest::prelude::*;
use weakform_deriv::FunctionId;

/// A blueprint of an expression, built into an arena with [`ExprRecipe::build`].
#[derive(Debug, Clone, PartialEq)]
pub enum ExprRecipe {
    Constant(f64),
    Coordinate(usize),
    /// The unknown evaluated at the discrete function.
    LinearizedUnknown,
    /// The unknown evaluated at zero.
    Unknown,
    Test,
    Discrete,
    Diff(usize, Box<ExprRecipe>),
    Sum(Vec<ExprRecipe>),
    Neg(Box<ExprRecipe>),
    Product(Box<ExprRecipe>, Box<ExprRecipe>),
    Exp(Box<ExprRecipe>),
}

/// The functions that leaves of an [`ExprRecipe`] refer to.
#[derive(Debug, Copy, Clone)]
pub struct RecipeFunctions {
    pub linearized_unknown: NodeId,
    pub unknown: NodeId,
    pub test: NodeId,
    pub discrete: NodeId,
}

impl RecipeFunctions {
    pub const LINEARIZED_UNKNOWN: FunctionId = FunctionId(0);
    pub const UNKNOWN: FunctionId = FunctionId(1);
    pub const TEST: FunctionId = FunctionId(2);
    pub const DISCRETE: FunctionId = FunctionId(3);

    /// Registers the functions in a fresh two-dimensional arena.
    pub fn new_arena() -> (ExprArena, Self) {
        let mut arena = ExprArena::new(2);
        let discrete = arena.discrete_function("u0", Self::DISCRETE);
        let linearized_unknown = arena.unknown_function_at("u", Self::LINEARIZED_UNKNOWN, discrete);
        let unknown = arena.unknown_function("w", Self::UNKNOWN);
        let test = arena.test_function("v", Self::TEST);
        let functions = Self {
            linearized_unknown,
            unknown,
            test,
            discrete,
        };
        (arena, functions)
    }
}

impl ExprRecipe {
    pub fn build(&self, arena: &mut ExprArena, functions: &RecipeFunctions) -> NodeId {
        match self {
            ExprRecipe::Constant(c) => arena.constant(*c),
            ExprRecipe::Coordinate(direction) => arena.coordinate(*direction),
            ExprRecipe::LinearizedUnknown => functions.linearized_unknown,
            ExprRecipe::Unknown => functions.unknown,
            ExprRecipe::Test => functions.test,
            ExprRecipe::Discrete => functions.discrete,
            ExprRecipe::Diff(direction, arg) => {
                let arg = arg.build(arena, functions);
                arena.diff(*direction, arg)
            }
            ExprRecipe::Sum(terms) => {
                let terms: Vec<_> = terms
                    .iter()
                    .map(|term| term.build(arena, functions))
                    .collect();
                arena.sum(&terms)
            }
            ExprRecipe::Neg(arg) => {
                let arg = arg.build(arena, functions);
                arena.neg(arg)
            }
            ExprRecipe::Product(a, b) => {
                let a = a.build(arena, functions);
                let b = b.build(arena, functions);
                arena.mul(a, b)
            }
            ExprRecipe::Exp(arg) => {
                let arg = arg.build(arena, functions);
                arena.exp(arg)
            }
        }
    }
}

fn leaf() -> impl Strategy<Value = ExprRecipe> {
    prop_oneof![
        prop_oneof![Just(0.0), Just(2.0)].prop_map(ExprRecipe::Constant),
        (0..2usize).prop_map(ExprRecipe::Coordinate),
        Just(ExprRecipe::LinearizedUnknown),
        Just(ExprRecipe::Unknown),
        Just(ExprRecipe::Test),
        Just(ExprRecipe::Discrete),
    ]
}

/// Random expressions in the functions of [`RecipeFunctions`].
pub fn expr_recipe() -> impl Strategy<Value = ExprRecipe> {
    leaf().prop_recursive(4, 24, 3, |inner| {
        prop_oneof![
            ((0..2usize), inner.clone()).prop_map(|(direction, arg)| ExprRecipe::Diff(direction, Box::new(arg))),
            prop::collection::vec(inner.clone(), 1..=3).prop_map(ExprRecipe::Sum),
            inner
                .clone()
                .prop_map(|arg| ExprRecipe::Neg(Box::new(arg))),
            (inner.clone(), inner.clone()).prop_map(|(a, b)| ExprRecipe::Product(Box::new(a), Box::new(b))),
            inner.prop_map(|arg| ExprRecipe::Exp(Box::new(arg))),
        ]
    })
}
