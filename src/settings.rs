use crate::context::ComputationType;
use serde::{Deserialize, Serialize};

/// How much the analysis reports through the `log` facade.
///
/// Every [`EvalContext`](crate::context::EvalContext) carries its own verbosity, so that the
/// analysis of a single region can be traced without drowning in output from the others.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Verbosity {
    #[default]
    Silent,
    /// Top-level progress per context.
    Low,
    /// Every required-set determination.
    Medium,
    /// Every computed derivative set.
    High,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisSettings {
    pub verbosity: Verbosity,
    /// The computations for which derivative sets are determined.
    pub computations: Vec<ComputationType>,
    /// Whether boundary condition terms are analysed.
    pub include_bc: bool,
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            verbosity: Verbosity::Silent,
            computations: vec![ComputationType::MatrixAndVector],
            include_bc: true,
        }
    }
}
