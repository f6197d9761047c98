use proptest::prelude::*;
use std::collections::BTreeSet;
use std::rc::Rc;
use weakform::context::{ComputationType, EvalContext, QuadratureRule, Region, RegionQuadCombo};
use weakform::deriv::{Deriv, DerivSet, FunctionId, MultipleDeriv};
use weakform::error::SparsityError;
use weakform::expr::{ExprArena, NodeId};
use weakform::proptest::{expr_recipe, RecipeFunctions};
use weakform::settings::Verbosity;
use weakform::sparsity::{DerivState, Evaluator, SparsitySession, MAX_ORDER};

const U: FunctionId = FunctionId(5);
const V: FunctionId = FunctionId(7);

fn interior_context(computation: ComputationType) -> EvalContext {
    let combo = RegionQuadCombo::new(Region::new("interior", 2), QuadratureRule::gauss(2));
    EvalContext::new(combo, computation, Verbosity::Silent)
}

fn md(derivs: &[Deriv]) -> MultipleDeriv {
    MultipleDeriv::from(derivs.to_vec())
}

fn set(mds: &[MultipleDeriv]) -> DerivSet {
    mds.iter().cloned().collect()
}

fn u() -> Deriv {
    Deriv::functional(U)
}

fn v() -> Deriv {
    Deriv::functional(V)
}

/// Determines the required sets of `root` as an equation with the given functions would.
fn determine_top_level(
    session: &mut SparsitySession,
    root: NodeId,
    ctx: &EvalContext,
    variations: &[FunctionId],
    unknowns: &[FunctionId],
) {
    let combinations = ctx
        .computation()
        .required_func_combinations(variations, unknowns);
    let mut r_input = vec![DerivSet::new(); MAX_ORDER + 1];
    for &order in ctx.top_level_orders() {
        r_input[order] = session
            .find_w(root, order, ctx)
            .unwrap()
            .filter(|md| md.is_in_required_set(&combinations, &BTreeSet::new()));
    }
    session.determine_r(root, ctx, &r_input).unwrap();
}

#[test]
fn leaf_nonzero_sets() {
    let mut arena = ExprArena::new(2);
    let two = arena.constant(2.0);
    let zero = arena.zero();
    let x = arena.coordinate(1);
    let u0 = arena.discrete_function("u0", FunctionId(0));
    let u_lin = arena.unknown_function_at("u", U, u0);
    let w = arena.unknown_function("w", FunctionId(6));

    let ctx = interior_context(ComputationType::MatrixAndVector);
    let mut session = SparsitySession::new(&arena);
    let unit = DerivSet::unit();
    let empty = DerivSet::new();

    assert_eq!(*session.find_w(two, 0, &ctx).unwrap(), unit);
    assert_eq!(*session.find_w(two, 1, &ctx).unwrap(), empty);
    assert_eq!(*session.find_w(zero, 0, &ctx).unwrap(), empty);

    assert_eq!(*session.find_w(x, 0, &ctx).unwrap(), unit);
    assert_eq!(*session.find_w(x, 1, &ctx).unwrap(), set(&[md(&[Deriv::coordinate(1)])]));
    assert_eq!(*session.find_w(x, 2, &ctx).unwrap(), empty);

    assert_eq!(*session.find_w(u_lin, 0, &ctx).unwrap(), unit);
    assert_eq!(*session.find_w(u_lin, 1, &ctx).unwrap(), set(&[md(&[u()])]));
    assert_eq!(*session.find_w(w, 0, &ctx).unwrap(), empty);
    assert_eq!(
        *session.find_w(w, 1, &ctx).unwrap(),
        set(&[md(&[Deriv::functional(FunctionId(6))])])
    );

    let (x0, x1) = (Deriv::coordinate(0), Deriv::coordinate(1));
    assert_eq!(*session.find_w(u0, 0, &ctx).unwrap(), unit);
    assert_eq!(*session.find_w(u0, 1, &ctx).unwrap(), set(&[md(&[x0]), md(&[x1])]));
    assert_eq!(
        *session.find_w(u0, 2, &ctx).unwrap(),
        set(&[md(&[x0, x0]), md(&[x0, x1]), md(&[x1, x1])])
    );
}

#[test]
fn sum_and_product_nonzero_sets() {
    let mut arena = ExprArena::new(2);
    let u = arena.unknown_function("u", U);
    let v = arena.test_function("v", V);
    let x = arena.coordinate(0);
    let uv = arena.mul(u, v);
    let xu = arena.mul(x, u);
    let x_plus_u = arena.add(x, u);

    let ctx = interior_context(ComputationType::MatrixAndVector);
    let mut session = SparsitySession::new(&arena);
    let x0 = Deriv::coordinate(0);

    assert!(session.find_w(uv, 0, &ctx).unwrap().is_empty());
    assert!(session.find_w(uv, 1, &ctx).unwrap().is_empty());
    assert_eq!(*session.find_w(uv, 2, &ctx).unwrap(), set(&[md(&[self::u(), self::v()])]));

    assert!(session.find_w(xu, 0, &ctx).unwrap().is_empty());
    assert_eq!(*session.find_w(xu, 1, &ctx).unwrap(), set(&[md(&[self::u()])]));
    assert_eq!(*session.find_w(xu, 2, &ctx).unwrap(), set(&[md(&[x0, self::u()])]));

    assert_eq!(*session.find_w(x_plus_u, 0, &ctx).unwrap(), DerivSet::unit());
    assert_eq!(
        *session.find_w(x_plus_u, 1, &ctx).unwrap(),
        set(&[md(&[x0]), md(&[self::u()])])
    );
}

#[test]
fn nonlinear_nonzero_sets_follow_the_chain_rule() {
    let mut arena = ExprArena::new(2);
    let u = arena.unknown_function("u", U);
    let exp_u = arena.exp(u);

    let ctx = interior_context(ComputationType::MatrixAndVector);
    let mut session = SparsitySession::new(&arena);

    assert_eq!(*session.find_w(exp_u, 0, &ctx).unwrap(), DerivSet::unit());
    assert_eq!(*session.find_w(exp_u, 1, &ctx).unwrap(), set(&[md(&[self::u()])]));
    assert_eq!(*session.find_w(exp_u, 2, &ctx).unwrap(), set(&[md(&[self::u(), self::u()])]));
    assert_eq!(
        *session.find_w(exp_u, 3, &ctx).unwrap(),
        set(&[md(&[self::u(), self::u(), self::u()])])
    );
    assert!(session
        .find_w(exp_u, MAX_ORDER + 1, &ctx)
        .unwrap()
        .is_empty());
}

#[test]
fn queries_before_determine_r_fail() {
    let mut arena = ExprArena::new(2);
    let u = arena.unknown_function("u", U);
    let v = arena.test_function("v", V);
    let uv = arena.mul(u, v);

    let ctx = interior_context(ComputationType::MatrixAndVector);
    let mut session = SparsitySession::new(&arena);

    assert!(matches!(
        session.find_r(uv, 2, &ctx),
        Err(SparsityError::RequiredSetNotReady { .. })
    ));
    assert!(matches!(
        session.find_v(uv, 2, &ctx),
        Err(SparsityError::RequiredSetNotReady { .. })
    ));
    assert!(matches!(
        session.find_c(uv, 2, &ctx),
        Err(SparsityError::RequiredSetNotReady { .. })
    ));

    // Another context does not see the required sets of the first one
    determine_top_level(&mut session, uv, &ctx, &[V], &[U]);
    let other_ctx = interior_context(ComputationType::MatrixAndVector);
    assert!(session.find_r(uv, 2, &ctx).is_ok());
    assert!(session.find_r(uv, 2, &other_ctx).is_err());
}

#[test]
fn memoized_queries_return_the_same_set() {
    let mut arena = ExprArena::new(2);
    let u = arena.unknown_function("u", U);
    let v = arena.test_function("v", V);
    let x = arena.coordinate(0);
    let xu = arena.mul(x, u);
    let root = arena.mul(xu, v);

    let ctx = interior_context(ComputationType::MatrixAndVector);
    let mut session = SparsitySession::new(&arena);
    determine_top_level(&mut session, root, &ctx, &[V], &[U]);

    for node in [u, x, xu, root] {
        for order in 0..=MAX_ORDER {
            let w1 = session.find_w(node, order, &ctx).unwrap();
            let w2 = session.find_w(node, order, &ctx).unwrap();
            assert!(Rc::ptr_eq(&w1, &w2));
            let c1 = session.find_c(node, order, &ctx).unwrap();
            let c2 = session.find_c(node, order, &ctx).unwrap();
            assert!(Rc::ptr_eq(&c1, &c2));
            let v1 = session.find_v(node, order, &ctx).unwrap();
            let v2 = session.find_v(node, order, &ctx).unwrap();
            assert!(Rc::ptr_eq(&v1, &v2));
        }
    }

    let num_sets = session.num_memoized_sets();
    session.find_w_all(root, &ctx).unwrap();
    session.find_c_all(root, &ctx).unwrap();
    assert_eq!(session.num_memoized_sets(), num_sets);
}

#[test]
fn required_set_only_grows() {
    let mut arena = ExprArena::new(2);
    let u = arena.unknown_function("u", U);
    let v = arena.test_function("v", V);
    let x = arena.coordinate(0);
    let ux = arena.add(u, x);
    let root = arena.mul(ux, v);

    let ctx = interior_context(ComputationType::MatrixAndVector);
    let mut session = SparsitySession::new(&arena);

    let uv = md(&[self::u(), self::v()]);
    let xv = md(&[Deriv::coordinate(0), self::v()]);
    let uu = md(&[self::u(), self::u()]);

    let first = vec![DerivSet::new(), DerivSet::new(), set(&[uv.clone(), uu])];
    session.determine_r(root, &ctx, &first).unwrap();
    assert_eq!(*session.find_r(root, 2, &ctx).unwrap(), set(&[uv.clone()]));
    assert_eq!(*session.find_r(u, 1, &ctx).unwrap(), set(&[md(&[self::u()])]));

    let second = vec![DerivSet::new(), DerivSet::new(), set(&[xv.clone()])];
    session.determine_r(root, &ctx, &second).unwrap();
    assert_eq!(*session.find_r(root, 2, &ctx).unwrap(), set(&[xv, uv]));
    assert_eq!(
        *session.find_r(ux, 1, &ctx).unwrap(),
        set(&[md(&[Deriv::coordinate(0)]), md(&[self::u()])])
    );
}

#[test]
fn growing_required_set_after_classification_fails() {
    let mut arena = ExprArena::new(2);
    let u = arena.unknown_function("u", U);
    let v = arena.test_function("v", V);
    let x = arena.coordinate(0);
    let ux = arena.add(u, x);
    let root = arena.mul(ux, v);

    let ctx = interior_context(ComputationType::MatrixAndVector);
    let mut session = SparsitySession::new(&arena);

    let uv = md(&[self::u(), self::v()]);
    let xv = md(&[Deriv::coordinate(0), self::v()]);
    session
        .determine_r(root, &ctx, &[DerivSet::new(), DerivSet::new(), set(&[uv.clone()])])
        .unwrap();
    session.find_c(root, 2, &ctx).unwrap();

    // Adding what is already there is fine
    session
        .determine_r(root, &ctx, &[DerivSet::new(), DerivSet::new(), set(&[uv.clone()])])
        .unwrap();

    let result = session.determine_r(root, &ctx, &[DerivSet::new(), DerivSet::new(), set(&[xv.clone()])]);
    assert!(matches!(
        result,
        Err(SparsityError::RequiredSetGrewAfterClassification { order: 2, .. })
    ));

    // The failed call leaves the required sets as they were
    assert_eq!(*session.find_r(root, 2, &ctx).unwrap(), set(&[uv.clone()]));
    assert_eq!(*session.find_r(ux, 1, &ctx).unwrap(), set(&[md(&[self::u()])]));

    // A classified descendant fails the same way, before the root is updated
    let mut session = SparsitySession::new(&arena);
    session
        .determine_r(root, &ctx, &[DerivSet::new(), DerivSet::new(), set(&[uv.clone()])])
        .unwrap();
    session.find_v(ux, 1, &ctx).unwrap();
    let result = session.determine_r(root, &ctx, &[DerivSet::new(), DerivSet::new(), set(&[xv])]);
    assert!(matches!(
        result,
        Err(SparsityError::RequiredSetGrewAfterClassification { order: 1, .. })
    ));
    assert_eq!(*session.find_r(root, 2, &ctx).unwrap(), set(&[uv]));
    assert_eq!(*session.find_r(ux, 1, &ctx).unwrap(), set(&[md(&[self::u()])]));
}

#[test]
fn shared_subexpressions_are_determined_once_per_demand() {
    let mut arena = ExprArena::new(2);
    let u0 = arena.discrete_function("u0", FunctionId(0));
    let u = arena.unknown_function_at("u", U, u0);

    // Both the sum and the product reference the same child twice, so a naive traversal visits
    // `u` 2^40 times
    let mut t = u;
    for level in 0..40 {
        t = if level % 2 == 0 { arena.add(t, t) } else { arena.mul(t, t) };
    }

    let ctx = interior_context(ComputationType::MatrixAndVector);
    let mut session = SparsitySession::new(&arena);
    let w1 = session.find_w(t, 1, &ctx).unwrap();
    let w2 = session.find_w(t, 2, &ctx).unwrap();
    assert_eq!(*w1, set(&[md(&[self::u()])]));
    session
        .determine_r(t, &ctx, &[DerivSet::new(), (*w1).clone(), (*w2).clone()])
        .unwrap();

    assert_eq!(*session.find_r(t, 2, &ctx).unwrap(), set(&[md(&[self::u(), self::u()])]));
    assert_eq!(*session.find_r(u, 0, &ctx).unwrap(), DerivSet::unit());
    assert_eq!(*session.find_r(u, 1, &ctx).unwrap(), set(&[md(&[self::u()])]));

    // Repeating the demand is a no-op
    let memoized = session.num_memoized_sets();
    session
        .determine_r(t, &ctx, &[DerivSet::new(), (*w1).clone(), (*w2).clone()])
        .unwrap();
    assert_eq!(session.num_memoized_sets(), memoized);
}

#[test]
fn linear_product_is_constant() {
    let mut arena = ExprArena::new(2);
    let u = arena.unknown_function("u", U);
    let v = arena.test_function("v", V);
    let x = arena.coordinate(0);
    let uv = arena.mul(u, v);
    let xuv = arena.mul(x, uv);

    let ctx = interior_context(ComputationType::MatrixAndVector);
    let mut session = SparsitySession::new(&arena);
    determine_top_level(&mut session, uv, &ctx, &[V], &[U]);
    determine_top_level(&mut session, xuv, &ctx, &[V], &[U]);

    let pair = md(&[self::u(), self::v()]);
    assert_eq!(*session.find_r(uv, 2, &ctx).unwrap(), set(&[pair.clone()]));
    assert_eq!(*session.find_c(uv, 2, &ctx).unwrap(), set(&[pair.clone()]));
    assert!(session.find_v(uv, 2, &ctx).unwrap().is_empty());
    assert_eq!(*session.find_r(u, 1, &ctx).unwrap(), set(&[md(&[self::u()])]));
    assert_eq!(*session.find_r(v, 1, &ctx).unwrap(), set(&[md(&[self::v()])]));

    // Multiplying by a coordinate makes the coefficient vary in space
    let superset = session.sparsity_superset(xuv, &ctx).unwrap();
    assert_eq!(superset.len(), 1);
    assert_eq!(superset.state(&pair), Some(DerivState::Variable));
}

#[test]
fn nonlinear_variability_depends_on_eval_point() {
    let mut arena = ExprArena::new(2);
    let u0 = arena.discrete_function("u0", FunctionId(0));
    let u_lin = arena.unknown_function_at("u", U, u0);
    let w = arena.unknown_function("w", FunctionId(6));
    let v = arena.test_function("v", V);
    let exp_u = arena.exp(u_lin);
    let exp_w = arena.exp(w);
    let linearized = arena.mul(exp_u, v);
    let at_zero = arena.mul(exp_w, v);

    let ctx = interior_context(ComputationType::MatrixAndVector);
    let mut session = SparsitySession::new(&arena);
    determine_top_level(&mut session, linearized, &ctx, &[V], &[U]);
    determine_top_level(&mut session, at_zero, &ctx, &[V], &[FunctionId(6)]);

    let linearized_superset = session.sparsity_superset(linearized, &ctx).unwrap();
    assert_eq!(linearized_superset.state(&md(&[self::v()])), Some(DerivState::Variable));
    assert_eq!(
        linearized_superset.state(&md(&[self::u(), self::v()])),
        Some(DerivState::Variable)
    );
    assert_eq!(linearized_superset.len(), 2);

    let w_deriv = Deriv::functional(FunctionId(6));
    let at_zero_superset = session.sparsity_superset(at_zero, &ctx).unwrap();
    assert_eq!(at_zero_superset.state(&md(&[self::v()])), Some(DerivState::Constant));
    assert_eq!(
        at_zero_superset.state(&md(&[w_deriv, self::v()])),
        Some(DerivState::Constant)
    );

    // The chain rule requires the value of the argument, too
    assert_eq!(*session.find_r(u_lin, 0, &ctx).unwrap(), DerivSet::unit());
    assert_eq!(*session.find_r(u_lin, 1, &ctx).unwrap(), set(&[md(&[self::u()])]));
}

#[test]
fn evaluators_are_null_without_required_derivatives() {
    let mut arena = ExprArena::new(2);
    let u = arena.unknown_function("u", U);
    let v = arena.test_function("v", V);
    let uv = arena.mul(u, v);

    let mut session = SparsitySession::new(&arena);

    let vector_ctx = interior_context(ComputationType::VectorOnly);
    determine_top_level(&mut session, uv, &vector_ctx, &[V], &[U]);
    let evaluator = session.setup_eval(uv, &vector_ctx).unwrap();
    assert_eq!(*evaluator, Evaluator::Null);

    let matrix_ctx = interior_context(ComputationType::MatrixAndVector);
    determine_top_level(&mut session, uv, &matrix_ctx, &[V], &[U]);
    let evaluator = session.setup_eval(uv, &matrix_ctx).unwrap();
    match &*evaluator {
        Evaluator::Active {
            node,
            superset,
            children,
        } => {
            assert_eq!(*node, uv);
            assert_eq!(superset.len(), 1);
            assert_eq!(children.len(), 2);
            assert!(children.iter().all(|child| !child.is_null()));
        }
        Evaluator::Null => panic!("Expected an active evaluator"),
    }

    // Evaluators are cached
    let again = session.setup_eval(uv, &matrix_ctx).unwrap();
    assert!(Rc::ptr_eq(&evaluator, &again));
}

#[test]
fn error_display() {
    let error = SparsityError::MalformedSecondOrderDeriv {
        expr: "u*u".to_string(),
        deriv: "{f5, f5}".to_string(),
    };
    insta::assert_snapshot!(
        error.to_string(),
        @"Second-order derivative {f5, f5} of expression u*u is not a (variation, unknown) pair."
    );
}

fn computation_type() -> impl Strategy<Value = ComputationType> {
    prop_oneof![
        Just(ComputationType::MatrixAndVector),
        Just(ComputationType::VectorOnly),
        Just(ComputationType::FunctionalOnly),
        Just(ComputationType::FunctionalAndGradient),
    ]
}

proptest! {
    #[test]
    fn required_derivatives_are_partitioned_into_constant_and_variable(
        recipe in expr_recipe(),
        computation in computation_type()
    ) {
        let (mut arena, functions) = RecipeFunctions::new_arena();
        let integrand = recipe.build(&mut arena, &functions);
        let root = arena.mul(integrand, functions.test);

        let ctx = interior_context(computation);
        let mut session = SparsitySession::new(&arena);
        determine_top_level(
            &mut session,
            root,
            &ctx,
            &[RecipeFunctions::TEST],
            &[RecipeFunctions::LINEARIZED_UNKNOWN, RecipeFunctions::UNKNOWN],
        );

        let mut descendants = BTreeSet::new();
        let mut stack = vec![root];
        while let Some(node) = stack.pop() {
            if descendants.insert(node) {
                stack.extend_from_slice(arena.children(node));
            }
        }

        for node in descendants {
            for order in 0..=MAX_ORDER {
                let w = session.find_w(node, order, &ctx).unwrap();
                let r = session.find_r(node, order, &ctx).unwrap();
                let c = session.find_c(node, order, &ctx).unwrap();
                let v = session.find_v(node, order, &ctx).unwrap();
                prop_assert!(r.is_subset(&w));
                prop_assert!(c.is_disjoint(&v));
                prop_assert_eq!(&c.union(&v), &*r);
            }
        }
        prop_assert!(session.setup_eval(root, &ctx).is_ok());
    }
}
