use crate::{Deriv, DerivSet, FunctionId, MultiIndex, MultipleDeriv, SpatialOp};
use proptest::collection::{btree_set, vec};
use proptest::prelude::*;

/// Keep function IDs and spatial orders small, so that generated derivatives actually collide
/// and set operations have something to do.
pub fn function_id() -> impl Strategy<Value = FunctionId> {
    (0..4u32).prop_map(FunctionId)
}

pub fn multi_index() -> impl Strategy<Value = MultiIndex> {
    [0..2i32, 0..2i32, 0..2i32].prop_map(|[x, y, z]| MultiIndex::new(x, y, z))
}

pub fn spatial_op() -> impl Strategy<Value = SpatialOp> {
    prop_oneof![
        4 => Just(SpatialOp::Identity),
        4 => multi_index().prop_map(SpatialOp::from_multi_index),
        1 => Just(SpatialOp::Divergence),
        1 => (1..3u32).prop_map(SpatialOp::Normal),
    ]
}

pub fn deriv() -> impl Strategy<Value = Deriv> {
    prop_oneof![
        1 => (0..3usize).prop_map(Deriv::Coordinate),
        3 => (function_id(), spatial_op()).prop_map(|(func, op)| Deriv::Functional { func, op }),
    ]
}

pub fn multiple_deriv(max_order: usize) -> impl Strategy<Value = MultipleDeriv> {
    vec(deriv(), 0..=max_order).prop_map(MultipleDeriv::from)
}

pub fn deriv_set(max_order: usize, max_len: usize) -> impl Strategy<Value = DerivSet> {
    btree_set(multiple_deriv(max_order), 0..=max_len).prop_map(|set| set.into_iter().collect())
}

impl Arbitrary for MultipleDeriv {
    type Parameters = ();
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(_args: Self::Parameters) -> Self::Strategy {
        multiple_deriv(3).boxed()
    }
}
