use crate::context::ContextId;
use crate::expr::NodeId;
use rustc_hash::{FxHashMap, FxHashSet};
use std::rc::Rc;
use weakform_deriv::DerivSet;

/// The four derivative sets kept per expression.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum SubsetKind {
    /// Nonzero derivatives.
    W,
    /// Required derivatives.
    R,
    /// Required derivatives that are constant over the integration domain.
    C,
    /// Required derivatives that vary over the integration domain.
    V,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub(crate) struct MemoKey {
    pub node: NodeId,
    pub kind: SubsetKind,
    pub order: usize,
    pub context: ContextId,
}

/// Memoized derivative sets of a session.
///
/// W, C and V are computed at most once per key. R is accumulated through repeated merges and
/// becomes queryable once the node has been marked ready for a context. The input already passed
/// on from a node to its children is kept per context, so that shared subexpressions only
/// propagate what is new to them.
#[derive(Debug, Default)]
pub(crate) struct MemoTable {
    sets: FxHashMap<MemoKey, Rc<DerivSet>>,
    required_ready: FxHashSet<(NodeId, ContextId)>,
    propagated: FxHashMap<(NodeId, ContextId), Vec<DerivSet>>,
}

impl MemoTable {
    pub fn get(&self, key: &MemoKey) -> Option<Rc<DerivSet>> {
        self.sets.get(key).cloned()
    }

    pub fn insert(&mut self, key: MemoKey, set: DerivSet) -> Rc<DerivSet> {
        let set = Rc::new(set);
        self.sets.insert(key, Rc::clone(&set));
        set
    }

    pub fn required(&self, node: NodeId, order: usize, context: ContextId) -> Rc<DerivSet> {
        let key = MemoKey {
            node,
            kind: SubsetKind::R,
            order,
            context,
        };
        self.sets.get(&key).cloned().unwrap_or_default()
    }

    /// Whether merging `addition` would enlarge the required set.
    pub fn grows_required(&self, node: NodeId, order: usize, context: ContextId, addition: &DerivSet) -> bool {
        !addition.is_subset(&self.required(node, order, context))
    }

    pub fn merge_required(&mut self, node: NodeId, order: usize, context: ContextId, addition: &DerivSet) {
        if addition.is_empty() {
            return;
        }
        let key = MemoKey {
            node,
            kind: SubsetKind::R,
            order,
            context,
        };
        let required = self.sets.entry(key).or_default();
        if !addition.is_subset(required) {
            Rc::make_mut(required).merge(addition);
        }
    }

    /// The part of `input` that has not yet been passed on from `node` in the context.
    ///
    /// Returns `None` if all of it has.
    pub fn unpropagated(&self, node: NodeId, context: ContextId, input: &[DerivSet]) -> Option<Vec<DerivSet>> {
        let seen = match self.propagated.get(&(node, context)) {
            Some(seen) => seen,
            None => return Some(input.to_vec()),
        };
        let fresh: Vec<DerivSet> = input
            .iter()
            .enumerate()
            .map(|(order, set)| match seen.get(order) {
                Some(seen) => set.difference(seen),
                None => set.clone(),
            })
            .collect();
        let is_new = input.len() > seen.len() || fresh.iter().any(|set| !set.is_empty());
        is_new.then_some(fresh)
    }

    pub fn record_propagated(&mut self, node: NodeId, context: ContextId, input: &[DerivSet]) {
        let seen = self.propagated.entry((node, context)).or_default();
        if seen.len() < input.len() {
            seen.resize_with(input.len(), DerivSet::new);
        }
        for (seen, set) in seen.iter_mut().zip(input) {
            seen.merge(set);
        }
    }

    pub fn mark_ready(&mut self, node: NodeId, context: ContextId) {
        self.required_ready.insert((node, context));
    }

    pub fn is_ready(&self, node: NodeId, context: ContextId) -> bool {
        self.required_ready.contains(&(node, context))
    }

    /// Whether the constant or variable subset of the given order has been computed.
    pub fn is_classified(&self, node: NodeId, order: usize, context: ContextId) -> bool {
        [SubsetKind::C, SubsetKind::V].into_iter().any(|kind| {
            self.sets.contains_key(&MemoKey {
                node,
                kind,
                order,
                context,
            })
        })
    }

    pub fn len(&self) -> usize {
        self.sets.len()
    }
}
