//! Evaluation contexts under which derivative sets are determined.
use crate::settings::Verbosity;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::fmt::Display;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU32, Ordering};
use weakform_deriv::FunctionId;

/// A named integration domain, such as the interior of a mesh or one of its boundaries.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Region {
    name: String,
    cell_dim: usize,
}

impl Region {
    pub fn new(name: impl Into<String>, cell_dim: usize) -> Self {
        Self {
            name: name.into(),
            cell_dim,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The dimension of the cells the region consists of.
    pub fn cell_dim(&self) -> usize {
        self.cell_dim
    }
}

impl Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum QuadratureFamily {
    Gauss,
    GaussLobatto,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct QuadratureRule {
    pub family: QuadratureFamily,
    /// The polynomial order integrated exactly.
    pub order: usize,
}

impl QuadratureRule {
    pub fn gauss(order: usize) -> Self {
        Self {
            family: QuadratureFamily::Gauss,
            order,
        }
    }
}

impl Display for QuadratureRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}({})", self.family, self.order)
    }
}

/// A region paired with the quadrature rule used to integrate over it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RegionQuadCombo {
    pub region: Region,
    pub quadrature: QuadratureRule,
}

impl RegionQuadCombo {
    pub fn new(region: Region, quadrature: QuadratureRule) -> Self {
        Self { region, quadrature }
    }
}

impl Display for RegionQuadCombo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.region, self.quadrature)
    }
}

/// The kind of quantity a consumer wants to compute from an integrand.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ComputationType {
    /// Matrix (second derivatives in a variation and an unknown) and vector (first derivatives in
    /// a variation).
    MatrixAndVector,
    VectorOnly,
    /// The value of a functional.
    FunctionalOnly,
    /// The value of a functional and its gradient with respect to the "variations".
    FunctionalAndGradient,
}

impl ComputationType {
    /// The derivative orders needed at the top of an integrand.
    pub fn top_level_orders(&self) -> &'static [usize] {
        match self {
            ComputationType::MatrixAndVector => &[1, 2],
            ComputationType::VectorOnly => &[1],
            ComputationType::FunctionalOnly => &[0],
            ComputationType::FunctionalAndGradient => &[0, 1],
        }
    }

    /// The sorted function-ID multisets of the top-level derivatives that are needed.
    pub fn required_func_combinations(
        &self,
        variations: &[FunctionId],
        unknowns: &[FunctionId],
    ) -> BTreeSet<Vec<FunctionId>> {
        let mut combinations = BTreeSet::new();
        for &order in self.top_level_orders() {
            match order {
                0 => {
                    combinations.insert(Vec::new());
                }
                1 => combinations.extend(variations.iter().map(|&v| vec![v])),
                _ => {
                    for &v in variations {
                        for &u in unknowns {
                            let mut pair = vec![v, u];
                            pair.sort_unstable();
                            combinations.insert(pair);
                        }
                    }
                }
            }
        }
        combinations
    }
}

static NEXT_CONTEXT_ID: AtomicU32 = AtomicU32::new(0);

/// Globally unique identifier of an [`EvalContext`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ContextId(u32);

impl ContextId {
    fn next() -> Self {
        Self(NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Identity of one analysis pass.
///
/// Two contexts are equal exactly when they were created by the same call to
/// [`EvalContext::new`], so derivative sets determined for different passes never mix, even if
/// the passes concern the same region and computation.
#[derive(Debug, Clone)]
pub struct EvalContext {
    id: ContextId,
    combo: RegionQuadCombo,
    computation: ComputationType,
    verbosity: Verbosity,
}

impl EvalContext {
    pub fn new(combo: RegionQuadCombo, computation: ComputationType, verbosity: Verbosity) -> Self {
        Self {
            id: ContextId::next(),
            combo,
            computation,
            verbosity,
        }
    }

    pub fn id(&self) -> ContextId {
        self.id
    }

    pub fn combo(&self) -> &RegionQuadCombo {
        &self.combo
    }

    pub fn computation(&self) -> ComputationType {
        self.computation
    }

    pub fn top_level_orders(&self) -> &'static [usize] {
        self.computation.top_level_orders()
    }

    pub fn verbosity(&self) -> Verbosity {
        self.verbosity
    }

    /// Whether messages of the given verbosity should be emitted for this context.
    pub fn logs(&self, verbosity: Verbosity) -> bool {
        verbosity != Verbosity::Silent && self.verbosity >= verbosity
    }
}

impl PartialEq for EvalContext {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for EvalContext {}

impl Hash for EvalContext {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state)
    }
}

impl Display for EvalContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "EvalContext[id={}, {}, {:?}]",
            self.id.0, self.combo, self.computation
        )
    }
}
