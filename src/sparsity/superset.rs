use crate::expr::NodeId;
use std::collections::btree_map;
use std::collections::BTreeMap;
use std::fmt;
use std::fmt::Display;
use std::rc::Rc;
use weakform_deriv::{DerivSet, MultipleDeriv};

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DerivState {
    /// The derivative takes the same value everywhere in the integration domain.
    Constant,
    /// The derivative varies over the integration domain.
    Variable,
}

impl Display for DerivState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DerivState::Constant => write!(f, "constant"),
            DerivState::Variable => write!(f, "variable"),
        }
    }
}

/// All required derivatives of an expression in one context, tagged with their state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SparsitySuperset {
    entries: BTreeMap<MultipleDeriv, DerivState>,
}

impl SparsitySuperset {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, md: MultipleDeriv, state: DerivState) {
        self.entries.insert(md, state);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn state(&self, md: &MultipleDeriv) -> Option<DerivState> {
        self.entries.get(md).copied()
    }

    pub fn iter(&self) -> btree_map::Iter<MultipleDeriv, DerivState> {
        self.entries.iter()
    }

    pub fn derivs_of_order(&self, order: usize) -> impl Iterator<Item = &MultipleDeriv> {
        self.entries.keys().filter(move |md| md.order() == order)
    }

    pub fn derivs_with_state(&self, state: DerivState) -> DerivSet {
        self.entries
            .iter()
            .filter(|(_, s)| **s == state)
            .map(|(md, _)| md.clone())
            .collect()
    }
}

impl Display for SparsitySuperset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (md, state) in &self.entries {
            writeln!(f, "{}: {}", md, state)?;
        }
        Ok(())
    }
}

/// The evaluator chosen for an expression in a context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Evaluator {
    /// The expression contributes no required derivative and need not be evaluated.
    Null,
    Active {
        node: NodeId,
        superset: SparsitySuperset,
        children: Vec<Rc<Evaluator>>,
    },
}

impl Evaluator {
    pub fn is_null(&self) -> bool {
        matches!(self, Evaluator::Null)
    }

    pub fn superset(&self) -> Option<&SparsitySuperset> {
        match self {
            Evaluator::Null => None,
            Evaluator::Active { superset, .. } => Some(superset),
        }
    }
}
