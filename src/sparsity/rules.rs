//! Per-node-kind rules for the derivative sets.
use super::{SparsitySession, MAX_ORDER};
use crate::context::EvalContext;
use crate::error::SparsityError;
use crate::expr::{EvalPoint, ExprKind, NodeId};
use itertools::Itertools;
use std::rc::Rc;
use weakform_deriv::{Deriv, DerivSet, MultipleDeriv};

impl<'a> SparsitySession<'a> {
    pub(super) fn compute_w(
        &mut self,
        node: NodeId,
        order: usize,
        ctx: &EvalContext,
    ) -> Result<DerivSet, SparsityError> {
        let arena = self.arena;
        match arena.kind(node) {
            ExprKind::Constant(c) => Ok(if order == 0 && *c != 0.0 {
                DerivSet::unit()
            } else {
                DerivSet::new()
            }),
            ExprKind::Coordinate(direction) => Ok(match order {
                0 => DerivSet::unit(),
                1 => DerivSet::singleton(Deriv::coordinate(*direction).into()),
                _ => DerivSet::new(),
            }),
            ExprKind::SymbolicFunction { id, eval_point, .. } => Ok(match order {
                0 if matches!(eval_point, EvalPoint::Discrete(_)) => DerivSet::unit(),
                1 => DerivSet::singleton(Deriv::functional(*id).into()),
                _ => DerivSet::new(),
            }),
            ExprKind::DiscreteFunction { .. } => Ok(coordinate_multisets(arena.spatial_dim(), order)),
            ExprKind::Diff { direction, arg } => self.diff_compute_w(*direction, *arg, order, ctx),
            ExprKind::Sum(terms) => {
                let mut nonzero = DerivSet::new();
                for &term in terms {
                    nonzero.merge(&*self.find_w(term, order, ctx)?);
                }
                Ok(nonzero)
            }
            ExprKind::Neg(arg) => Ok((*self.find_w(*arg, order, ctx)?).clone()),
            ExprKind::Product([a, b]) => {
                let mut nonzero = DerivSet::new();
                for k in 0..=order {
                    let w_a = self.find_w(*a, k, ctx)?;
                    let w_b = self.find_w(*b, order - k, ctx)?;
                    nonzero.merge(&w_a.product(&w_b));
                }
                Ok(nonzero)
            }
            ExprKind::Nonlinear { arg, .. } => self.chain_products(*arg, order, ctx),
        }
    }

    /// All products of nonzero derivatives of `arg` of order at least one with total order
    /// `order`, i.e. the derivatives produced by the chain rule for `f(arg)`.
    fn chain_products(&mut self, arg: NodeId, order: usize, ctx: &EvalContext) -> Result<DerivSet, SparsityError> {
        if order == 0 {
            return Ok(DerivSet::unit());
        }
        let mut products = DerivSet::new();
        for first_order in 1..=order {
            let first = self.find_w(arg, first_order, ctx)?;
            if first.is_empty() {
                continue;
            }
            let rest = self.chain_products(arg, order - first_order, ctx)?;
            products.merge(&first.product(&rest));
        }
        Ok(products)
    }

    /// The variable derivatives of `node`, before restriction to the required set.
    pub(super) fn compute_v(
        &mut self,
        node: NodeId,
        order: usize,
        ctx: &EvalContext,
    ) -> Result<DerivSet, SparsityError> {
        let arena = self.arena;
        match arena.kind(node) {
            ExprKind::Constant(_) => Ok(DerivSet::new()),
            ExprKind::Coordinate(_) => Ok(if order == 0 {
                DerivSet::unit()
            } else {
                DerivSet::new()
            }),
            ExprKind::SymbolicFunction { eval_point, .. } => {
                Ok(if order == 0 && matches!(eval_point, EvalPoint::Discrete(_)) {
                    DerivSet::unit()
                } else {
                    DerivSet::new()
                })
            }
            ExprKind::DiscreteFunction { .. } => Ok((*self.find_w(node, order, ctx)?).clone()),
            ExprKind::Diff { direction, arg } => self.diff_compute_v(*direction, *arg, order, ctx),
            ExprKind::Sum(terms) => {
                let mut variable = DerivSet::new();
                for &term in terms {
                    variable.merge(&*self.find_v(term, order, ctx)?);
                }
                Ok(variable)
            }
            ExprKind::Neg(arg) => Ok((*self.find_v(*arg, order, ctx)?).clone()),
            ExprKind::Product([a, b]) => {
                let mut variable = DerivSet::new();
                for k in 0..=order {
                    let v_a = self.find_v(*a, k, ctx)?;
                    let w_a = self.find_w(*a, k, ctx)?;
                    let v_b = self.find_v(*b, order - k, ctx)?;
                    let w_b = self.find_w(*b, order - k, ctx)?;
                    variable.merge(&v_a.product(&w_b));
                    variable.merge(&w_a.product(&v_b));
                }
                Ok(variable)
            }
            ExprKind::Nonlinear { arg, .. } => {
                let value_is_variable = self
                    .find_v(*arg, 0, ctx)?
                    .contains(&MultipleDeriv::new());
                if order == 0 {
                    return Ok(if value_is_variable {
                        DerivSet::unit()
                    } else {
                        DerivSet::new()
                    });
                }

                let required = self.find_r(node, order, ctx)?;
                if value_is_variable {
                    return Ok((*required).clone());
                }
                let nonzero = self.find_w_all(*arg, ctx)?;
                let variable_factors = self.find_v_all(*arg, ctx)?;
                Ok(required.filter(|md| {
                    decompositions(md, &nonzero)
                        .iter()
                        .flatten()
                        .any(|factor| variable_factors[factor.order()].contains(factor))
                }))
            }
        }
    }

    /// Propagates the required set addition of `node` to its children.
    ///
    /// `addition` is `r_input` restricted to the nonzero derivatives of `node`.
    pub(super) fn determine_children_r(
        &mut self,
        node: NodeId,
        ctx: &EvalContext,
        r_input: &[DerivSet],
        addition: &[DerivSet],
    ) -> Result<(), SparsityError> {
        let arena = self.arena;
        match arena.kind(node) {
            ExprKind::Constant(_)
            | ExprKind::Coordinate(_)
            | ExprKind::SymbolicFunction { .. }
            | ExprKind::DiscreteFunction { .. } => Ok(()),
            ExprKind::Diff { direction, arg } => self.diff_determine_r(node, *direction, *arg, ctx, r_input),
            ExprKind::Sum(terms) => {
                for &term in terms {
                    self.determine_r(term, ctx, addition)?;
                }
                Ok(())
            }
            ExprKind::Neg(arg) => self.determine_r(*arg, ctx, addition),
            ExprKind::Product([a, b]) => {
                let mut r_a = vec![DerivSet::new(); addition.len()];
                let mut r_b = vec![DerivSet::new(); addition.len()];
                for (order, required) in addition.iter().enumerate() {
                    if required.is_empty() {
                        continue;
                    }
                    for k in 0..=order {
                        let w_a = self.find_w(*a, k, ctx)?;
                        let w_b = self.find_w(*b, order - k, ctx)?;
                        r_a[k].merge(&required.divide(&w_b).intersection(&w_a));
                        r_b[order - k].merge(&required.divide(&w_a).intersection(&w_b));
                    }
                }
                self.determine_r(*a, ctx, &r_a)?;
                self.determine_r(*b, ctx, &r_b)
            }
            ExprKind::Nonlinear { arg, .. } => {
                let mut r_arg = vec![DerivSet::new(); addition.len().max(1)];
                if addition.iter().any(|set| !set.is_empty()) {
                    r_arg[0].insert(MultipleDeriv::new());
                    let nonzero = self.find_w_all(*arg, ctx)?;
                    for md in addition.iter().flatten() {
                        for factor in decompositions(md, &nonzero).into_iter().flatten() {
                            r_arg[factor.order()].insert(factor);
                        }
                    }
                }
                self.determine_r(*arg, ctx, &r_arg)
            }
        }
    }
}

/// All multisets of `order` coordinate atoms over the given number of directions.
fn coordinate_multisets(spatial_dim: usize, order: usize) -> DerivSet {
    if order == 0 {
        return DerivSet::unit();
    }
    (0..spatial_dim)
        .combinations_with_replacement(order)
        .map(|directions| directions.into_iter().map(Deriv::coordinate).collect())
        .collect()
}

/// All ways of writing `md` as a product of nonzero derivatives of order at least one, where
/// `nonzero[n]` holds the nonzero derivatives of order `n`.
///
/// Every factor contains the smallest atom not covered by the factors before it.
fn decompositions(md: &MultipleDeriv, nonzero: &[Rc<DerivSet>]) -> Vec<Vec<MultipleDeriv>> {
    let first = match md.derivs().first() {
        Some(first) => first,
        None => return vec![Vec::new()],
    };

    let mut result = Vec::new();
    let max_factor_order = md.order().min(MAX_ORDER);
    for candidates in nonzero.iter().take(max_factor_order + 1).skip(1) {
        for factor in candidates.iter().filter(|factor| factor.contains(first)) {
            if let Some(rest) = md.factor_out(factor) {
                for mut tail in decompositions(&rest, nonzero) {
                    tail.insert(0, factor.clone());
                    result.push(tail);
                }
            }
        }
    }
    result
}
