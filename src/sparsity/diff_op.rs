//! Derivative-set rules for first-order spatial derivative nodes $D_{x_i} g$.
//!
//! Differentiating $g$ in space shifts the multi-index of every functional atom by $e_i$ (the
//! operator Tx below). In addition, the chain rule produces one extra atom per derivative: either
//! the coordinate atom $x_i$ itself (Xx), or a functional atom $\partial g / \partial u$ whose
//! spatial derivative $D_{x_i} u_0$ is nonzero because $u$ is evaluated at a discrete function
//! $u_0$ (Zx).
use super::{SparsitySession, DIFF_OP_MAX_ORDER};
use crate::context::EvalContext;
use crate::error::SparsityError;
use crate::expr::{EvalPoint, ExprArena, NodeId};
use crate::settings::Verbosity;
use itertools::Itertools;
use log::trace;
use weakform_deriv::{Deriv, DerivSet, MultiIndex, MultipleDeriv};

/// Shifts the multi-index of functional atoms by `mi`.
///
/// Every multiple derivative produces one result per distinct functional atom whose shifted
/// multi-index remains valid, with a single copy of that atom replaced by its shifted version.
/// Atoms with spatial operators that have no multi-index are left alone.
pub fn shift_multi_indices(set: &DerivSet, mi: MultiIndex) -> DerivSet {
    let mut shifted = DerivSet::new();
    for md in set {
        for deriv in md.iter().dedup() {
            let alpha = match deriv.multi_index() {
                Ok(alpha) => alpha,
                Err(_) => continue,
            };
            let new_alpha = alpha + mi;
            if !new_alpha.is_valid() {
                continue;
            }
            let new_deriv = match deriv.with_multi_index(new_alpha) {
                Ok(new_deriv) => new_deriv,
                Err(_) => continue,
            };
            if let Some(replaced) = md.replace(deriv, new_deriv) {
                shifted.insert(replaced);
            }
        }
    }
    shifted
}

/// The first-order functional derivatives in `first_order` with respect to functions whose
/// spatial derivative along `mi` does not vanish at their evaluation point.
///
/// Functions evaluated at zero are dropped, since the spatial derivative of the zero function
/// vanishes. So are atoms with spatial operators that have no multi-index.
pub fn zero_eval_shift(arena: &ExprArena, first_order: &DerivSet, mi: MultiIndex) -> DerivSet {
    first_order.filter(|md| match md.derivs() {
        [deriv @ Deriv::Functional { func, .. }] => {
            let shifted_is_valid = deriv
                .multi_index()
                .map(|alpha| (alpha + mi).is_valid())
                .unwrap_or(false);
            shifted_is_valid && matches!(arena.eval_point(*func), Some(EvalPoint::Discrete(_)))
        }
        _ => false,
    })
}

/// The set containing the single coordinate atom in the direction of the derivative.
pub fn spatial_coordinate_set(direction: usize) -> DerivSet {
    DerivSet::singleton(MultipleDeriv::from(Deriv::coordinate(direction)))
}

impl<'a> SparsitySession<'a> {
    /// $W_n = (W_{n+1}(g) / (Z_x \cup X_x)) \cup T_x(W_n(g))$, for $n$ not exceeding
    /// [`DIFF_OP_MAX_ORDER`].
    pub(super) fn diff_compute_w(
        &mut self,
        direction: usize,
        arg: NodeId,
        order: usize,
        ctx: &EvalContext,
    ) -> Result<DerivSet, SparsityError> {
        if order > DIFF_OP_MAX_ORDER {
            return Ok(DerivSet::new());
        }
        let mi = MultiIndex::unit(direction);
        let chain_atoms = self.chain_atoms(direction, arg, ctx)?;
        let w_arg = self.find_w(arg, order, ctx)?;
        let w_arg_plus = self.find_w(arg, order + 1, ctx)?;
        Ok(w_arg_plus
            .divide(&chain_atoms)
            .union(&shift_multi_indices(&w_arg, mi)))
    }

    /// $V_n = (W_{n+1}(g) / Z_x) \cup (V_{n+1}(g) / X_x) \cup T_x(V_n(g))$.
    pub(super) fn diff_compute_v(
        &mut self,
        direction: usize,
        arg: NodeId,
        order: usize,
        ctx: &EvalContext,
    ) -> Result<DerivSet, SparsityError> {
        if order > DIFF_OP_MAX_ORDER {
            return Ok(DerivSet::new());
        }
        let mi = MultiIndex::unit(direction);
        let w_arg_first = self.find_w(arg, 1, ctx)?;
        let zx = zero_eval_shift(self.arena, &w_arg_first, mi);
        let w_arg_plus = self.find_w(arg, order + 1, ctx)?;
        let v_arg = self.find_v(arg, order, ctx)?;
        let v_arg_plus = self.find_v(arg, order + 1, ctx)?;

        let mut variable = w_arg_plus.divide(&zx);
        variable.merge(&v_arg_plus.divide(&spatial_coordinate_set(direction)));
        variable.merge(&shift_multi_indices(&v_arg, mi));
        Ok(variable)
    }

    /// Propagates the demand on $D_{x_i} g$ to $g$, and records the spatial derivatives of
    /// discrete functions that are needed to evaluate it.
    pub(super) fn diff_determine_r(
        &mut self,
        node: NodeId,
        direction: usize,
        arg: NodeId,
        ctx: &EvalContext,
        r_input: &[DerivSet],
    ) -> Result<(), SparsityError> {
        let mi = MultiIndex::unit(direction);
        let chain_atoms = self.chain_atoms(direction, arg, ctx)?;

        let mut r_arg = vec![DerivSet::new(); r_input.len() + 1];
        r_arg[0].insert(MultipleDeriv::new());
        if r_arg.len() > 1 {
            r_arg[1].merge(&spatial_coordinate_set(direction));
        }
        for (order, required) in r_input.iter().enumerate().take(DIFF_OP_MAX_ORDER + 1) {
            let w_arg = self.find_w(arg, order, ctx)?;
            let w_arg_plus = self.find_w(arg, order + 1, ctx)?;
            r_arg[order + 1].merge(&chain_atoms.product(required).intersection(&w_arg_plus));
            r_arg[order].merge(&shift_multi_indices(required, -mi).intersection(&w_arg));
        }
        self.determine_r(arg, ctx, &r_arg)?;

        let r_arg_first = self.find_r(arg, 1, ctx)?;
        for md in r_arg_first.iter() {
            if let [deriv @ Deriv::Functional { func, .. }] = md.derivs() {
                let discrete = match self.arena.discrete_eval_point(*func) {
                    Some(discrete) => discrete,
                    None => continue,
                };
                let alpha = deriv
                    .multi_index()
                    .map_err(|_| SparsityError::UnsupportedSpatialOp {
                        expr: self.arena.display(node).to_string(),
                        deriv: deriv.to_string(),
                    })?;
                if ctx.logs(Verbosity::High) {
                    trace!("Requesting D{} of discrete function {} in {}", alpha + mi, discrete, ctx);
                }
                self.request_multi_index(discrete, alpha + mi);
            }
        }
        Ok(())
    }

    /// $Z_x \cup X_x$, the atoms contributed by the chain rule.
    fn chain_atoms(&mut self, direction: usize, arg: NodeId, ctx: &EvalContext) -> Result<DerivSet, SparsityError> {
        let w_arg_first = self.find_w(arg, 1, ctx)?;
        let zx = zero_eval_shift(self.arena, &w_arg_first, MultiIndex::unit(direction));
        Ok(zx.union(&spatial_coordinate_set(direction)))
    }
}
