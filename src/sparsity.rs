//! Determination of nonzero, required, constant and variable derivative sets.
//!
//! For every expression node, order and [`EvalContext`] a [`SparsitySession`] knows four sets of
//! multiple derivatives:
//!
//! - W, the derivatives that are not identically zero. W depends only on the expression.
//! - R, the derivatives some consumer actually needs. R is determined top-down by
//!   [`SparsitySession::determine_r`], starting from the roots of the integrands.
//! - V, the required derivatives that vary over the integration domain.
//! - C, the required derivatives that are constant over the integration domain.
//!
//! C and V partition R, and R is a subset of W. All sets are memoized, so repeated queries return
//! the very same shared set.
use crate::context::{ContextId, EvalContext};
use crate::error::SparsityError;
use crate::expr::{ExprArena, NodeId};
use crate::settings::Verbosity;
use log::{debug, trace};
use rustc_hash::FxHashMap;
use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;
use weakform_deriv::{DerivSet, FunctionId, MultiIndex};

mod diff_op;
mod memo;
mod rules;
mod superset;

pub use diff_op::{shift_multi_indices, spatial_coordinate_set, zero_eval_shift};
pub use memo::SubsetKind;
pub use superset::*;

use memo::{MemoKey, MemoTable};

/// The highest derivative order tracked by the analysis.
pub const MAX_ORDER: usize = 3;

/// The highest derivative order supported across a spatial derivative node.
pub const DIFF_OP_MAX_ORDER: usize = 2;

pub struct SparsitySession<'a> {
    arena: &'a ExprArena,
    memo: MemoTable,
    evaluators: FxHashMap<(NodeId, ContextId), Rc<Evaluator>>,
    multi_index_requests: BTreeMap<FunctionId, BTreeSet<MultiIndex>>,
}

impl<'a> SparsitySession<'a> {
    pub fn new(arena: &'a ExprArena) -> Self {
        Self {
            arena,
            memo: MemoTable::default(),
            evaluators: FxHashMap::default(),
            multi_index_requests: BTreeMap::new(),
        }
    }

    pub fn arena(&self) -> &'a ExprArena {
        self.arena
    }

    /// The number of memoized derivative sets.
    pub fn num_memoized_sets(&self) -> usize {
        self.memo.len()
    }

    /// The multi-indices at which spatial derivatives of the given discrete function are needed.
    pub fn required_multi_indices(&self, discrete: FunctionId) -> Option<&BTreeSet<MultiIndex>> {
        self.multi_index_requests.get(&discrete)
    }

    pub fn multi_index_requests(&self) -> &BTreeMap<FunctionId, BTreeSet<MultiIndex>> {
        &self.multi_index_requests
    }

    pub(crate) fn request_multi_index(&mut self, discrete: FunctionId, mi: MultiIndex) {
        self.multi_index_requests
            .entry(discrete)
            .or_default()
            .insert(mi);
    }

    fn find_memoized(
        &mut self,
        kind: SubsetKind,
        node: NodeId,
        order: usize,
        ctx: &EvalContext,
        compute: impl FnOnce(&mut Self) -> Result<DerivSet, SparsityError>,
    ) -> Result<Rc<DerivSet>, SparsityError> {
        let key = MemoKey {
            node,
            kind,
            order,
            context: ctx.id(),
        };
        if let Some(set) = self.memo.get(&key) {
            return Ok(set);
        }

        let set = if order > MAX_ORDER {
            DerivSet::new()
        } else {
            compute(self)?
        };
        if ctx.logs(Verbosity::High) {
            trace!(
                "{:?}[{}] of {} in {}: {}",
                kind,
                order,
                self.arena.display(node),
                ctx,
                set
            );
        }
        Ok(self.memo.insert(key, set))
    }

    /// The nonzero derivatives of the given order.
    pub fn find_w(&mut self, node: NodeId, order: usize, ctx: &EvalContext) -> Result<Rc<DerivSet>, SparsityError> {
        self.find_memoized(SubsetKind::W, node, order, ctx, |session| {
            session.compute_w(node, order, ctx)
        })
    }

    /// The required derivatives that vary over the integration domain.
    ///
    /// Requires the required set of `node` to have been determined for the context.
    pub fn find_v(&mut self, node: NodeId, order: usize, ctx: &EvalContext) -> Result<Rc<DerivSet>, SparsityError> {
        self.find_memoized(SubsetKind::V, node, order, ctx, |session| {
            let required = session.find_r(node, order, ctx)?;
            let variable = session.compute_v(node, order, ctx)?;
            Ok(variable.intersection(&required))
        })
    }

    /// The required derivatives that are constant over the integration domain.
    ///
    /// Requires the required set of `node` to have been determined for the context.
    pub fn find_c(&mut self, node: NodeId, order: usize, ctx: &EvalContext) -> Result<Rc<DerivSet>, SparsityError> {
        self.find_memoized(SubsetKind::C, node, order, ctx, |session| {
            let required = session.find_r(node, order, ctx)?;
            let variable = session.find_v(node, order, ctx)?;
            Ok(required.difference(&variable))
        })
    }

    /// The required derivatives of the given order.
    ///
    /// Returns an error if [`determine_r`](Self::determine_r) has not yet been invoked for `node`
    /// in the context.
    pub fn find_r(&mut self, node: NodeId, order: usize, ctx: &EvalContext) -> Result<Rc<DerivSet>, SparsityError> {
        if !self.memo.is_ready(node, ctx.id()) {
            return Err(SparsityError::RequiredSetNotReady {
                expr: self.arena.display(node).to_string(),
                context: ctx.to_string(),
            });
        }
        Ok(self.memo.required(node, order, ctx.id()))
    }

    pub fn find_w_all(&mut self, node: NodeId, ctx: &EvalContext) -> Result<Vec<Rc<DerivSet>>, SparsityError> {
        (0..=MAX_ORDER)
            .map(|order| self.find_w(node, order, ctx))
            .collect()
    }

    pub fn find_r_all(&mut self, node: NodeId, ctx: &EvalContext) -> Result<Vec<Rc<DerivSet>>, SparsityError> {
        (0..=MAX_ORDER)
            .map(|order| self.find_r(node, order, ctx))
            .collect()
    }

    pub fn find_c_all(&mut self, node: NodeId, ctx: &EvalContext) -> Result<Vec<Rc<DerivSet>>, SparsityError> {
        (0..=MAX_ORDER)
            .map(|order| self.find_c(node, order, ctx))
            .collect()
    }

    pub fn find_v_all(&mut self, node: NodeId, ctx: &EvalContext) -> Result<Vec<Rc<DerivSet>>, SparsityError> {
        (0..=MAX_ORDER)
            .map(|order| self.find_v(node, order, ctx))
            .collect()
    }

    /// Adds the derivatives in `r_input` to the required set of `node` and propagates the demand
    /// to its descendants.
    ///
    /// `r_input[n]` holds the order-`n` derivatives a parent (or the consumer, for a root) needs.
    /// Only those that are also nonzero are added. Repeated calls merge, so the required set only
    /// ever grows. Input that was already propagated from `node` is not propagated again, so a
    /// subexpression shared by many parents is visited once per new demand.
    ///
    /// Growing a required set after its constant or variable subset was queried is an error. The
    /// required set of `node` is then left unchanged, but descendants visited before the failing
    /// one may already hold the enlarged sets, and the session should be discarded.
    pub fn determine_r(&mut self, node: NodeId, ctx: &EvalContext, r_input: &[DerivSet]) -> Result<(), SparsityError> {
        let fresh = match self.memo.unpropagated(node, ctx.id(), r_input) {
            Some(fresh) => fresh,
            None => return Ok(()),
        };
        if ctx.logs(Verbosity::Medium) {
            debug!(
                "Determining required set of {} in {} from input [{}]",
                self.arena.display(node),
                ctx,
                itertools::join(&fresh, ", ")
            );
        }

        let mut addition = Vec::with_capacity(fresh.len());
        for (order, input) in fresh.iter().enumerate() {
            let nonzero = self.find_w(node, order, ctx)?;
            let set = input.intersection(&nonzero);
            if self.memo.is_classified(node, order, ctx.id()) && self.memo.grows_required(node, order, ctx.id(), &set) {
                return Err(SparsityError::RequiredSetGrewAfterClassification {
                    expr: self.arena.display(node).to_string(),
                    context: ctx.to_string(),
                    order,
                });
            }
            addition.push(set);
        }

        self.determine_children_r(node, ctx, &fresh, &addition)?;

        for (order, set) in addition.iter().enumerate() {
            self.memo.merge_required(node, order, ctx.id(), set);
        }
        self.memo.record_propagated(node, ctx.id(), &fresh);
        self.memo.mark_ready(node, ctx.id());
        Ok(())
    }

    /// All required derivatives of `node`, tagged as constant or variable.
    pub fn sparsity_superset(&mut self, node: NodeId, ctx: &EvalContext) -> Result<SparsitySuperset, SparsityError> {
        let mut superset = SparsitySuperset::new();
        for order in 0..=MAX_ORDER {
            for md in self.find_c(node, order, ctx)?.iter() {
                superset.insert(md.clone(), DerivState::Constant);
            }
            for md in self.find_v(node, order, ctx)?.iter() {
                superset.insert(md.clone(), DerivState::Variable);
            }
        }
        Ok(superset)
    }

    /// Selects evaluators for `node` and all of its descendants.
    ///
    /// Expressions without required derivatives get [`Evaluator::Null`]. Evaluators are cached per
    /// node and context, so shared subexpressions share their evaluator.
    pub fn setup_eval(&mut self, node: NodeId, ctx: &EvalContext) -> Result<Rc<Evaluator>, SparsityError> {
        if let Some(evaluator) = self.evaluators.get(&(node, ctx.id())) {
            return Ok(Rc::clone(evaluator));
        }

        let arena = self.arena;
        let children = arena
            .children(node)
            .iter()
            .map(|&child| self.setup_eval(child, ctx))
            .collect::<Result<Vec<_>, _>>()?;
        let superset = self.sparsity_superset(node, ctx)?;
        let evaluator = if superset.is_empty() {
            Evaluator::Null
        } else {
            Evaluator::Active {
                node,
                superset,
                children,
            }
        };

        let evaluator = Rc::new(evaluator);
        self.evaluators
            .insert((node, ctx.id()), Rc::clone(&evaluator));
        Ok(evaluator)
    }
}
