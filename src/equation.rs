//! Equation sets and the aggregation of their sparsity information.
use crate::context::{ComputationType, EvalContext, QuadratureRule, Region, RegionQuadCombo};
use crate::error::SparsityError;
use crate::expr::{ExprArena, FunctionRole, NodeId};
use crate::settings::{AnalysisSettings, Verbosity};
use crate::sparsity::{SparsitySession, SparsitySuperset};
use eyre::{eyre, WrapErr};
use log::info;
use nalgebra_sparse::pattern::SparsityPattern;
use std::collections::{BTreeMap, BTreeSet};
use weakform_deriv::{Deriv, DerivSet, FunctionId, MultipleDeriv};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Integral {
    pub combo: RegionQuadCombo,
    pub integrand: NodeId,
}

/// A sum of integrals over region-quadrature combinations.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WeakForm {
    integrals: Vec<Integral>,
}

impl WeakForm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn integrate(mut self, region: Region, quadrature: QuadratureRule, integrand: NodeId) -> Self {
        self.push(region, quadrature, integrand);
        self
    }

    pub fn push(&mut self, region: Region, quadrature: QuadratureRule, integrand: NodeId) {
        self.integrals.push(Integral {
            combo: RegionQuadCombo::new(region, quadrature),
            integrand,
        });
    }

    pub fn integrals(&self) -> &[Integral] {
        &self.integrals
    }

    pub fn is_empty(&self) -> bool {
        self.integrals.is_empty()
    }

    /// The distinct integrands of each region-quadrature combination, in order of appearance.
    pub fn integrands_by_combo(&self) -> BTreeMap<RegionQuadCombo, Vec<NodeId>> {
        let mut combos: BTreeMap<_, Vec<_>> = BTreeMap::new();
        for integral in &self.integrals {
            let integrands = combos.entry(integral.combo.clone()).or_default();
            if !integrands.contains(&integral.integrand) {
                integrands.push(integral.integrand);
            }
        }
        combos
    }
}

/// A weak form together with boundary condition terms and the functions it is posed in.
#[derive(Debug, Clone)]
pub struct EquationSet {
    weak_form: WeakForm,
    bc: WeakForm,
    variations: Vec<FunctionId>,
    unknowns: Vec<FunctionId>,
}

impl EquationSet {
    /// Creates an equation set, checking that the variations and unknowns are registered in the
    /// arena with the matching roles.
    pub fn new(
        arena: &ExprArena,
        weak_form: WeakForm,
        bc: WeakForm,
        variations: Vec<FunctionId>,
        unknowns: Vec<FunctionId>,
    ) -> eyre::Result<Self> {
        let check_roles = |ids: &[FunctionId], role: FunctionRole| -> eyre::Result<()> {
            let mut seen = BTreeSet::new();
            for &id in ids {
                if !seen.insert(id) {
                    return Err(eyre!("Function {} is listed more than once.", id));
                }
                match arena.function_role(id) {
                    Some(r) if r == role => {}
                    Some(r) => return Err(eyre!("Function {} has role {:?}, expected {:?}.", id, r, role)),
                    None => return Err(eyre!("Function {} is not a symbolic function of the arena.", id)),
                }
            }
            Ok(())
        };
        check_roles(&variations, FunctionRole::Variational)?;
        check_roles(&unknowns, FunctionRole::Unknown)?;

        Ok(Self {
            weak_form,
            bc,
            variations,
            unknowns,
        })
    }

    pub fn weak_form(&self) -> &WeakForm {
        &self.weak_form
    }

    pub fn bc(&self) -> &WeakForm {
        &self.bc
    }

    pub fn variations(&self) -> &[FunctionId] {
        &self.variations
    }

    pub fn unknowns(&self) -> &[FunctionId] {
        &self.unknowns
    }

    /// Determines the derivative sets of every integrand for every requested computation and
    /// collects which (variation, unknown) pairs couple on which region.
    pub fn analyze(
        &self,
        session: &mut SparsitySession,
        settings: &AnalysisSettings,
    ) -> eyre::Result<EquationSparsity> {
        let mut sparsity = EquationSparsity::default();
        let forms = [(false, &self.weak_form), (true, &self.bc)];
        for (is_bc, form) in forms {
            if is_bc && !settings.include_bc {
                continue;
            }
            for (combo, roots) in form.integrands_by_combo() {
                for &computation in &settings.computations {
                    let ctx = EvalContext::new(combo.clone(), computation, settings.verbosity);
                    if ctx.logs(Verbosity::Low) {
                        info!(
                            "Analyzing {} integrand(s) in {} (boundary conditions: {})",
                            roots.len(),
                            ctx,
                            is_bc
                        );
                    }
                    self.analyze_combo(session, &ctx, &roots, is_bc, &mut sparsity)
                        .wrap_err_with(|| format!("Sparsity analysis failed for {}", ctx))?;
                }
            }
        }
        Ok(sparsity)
    }

    fn analyze_combo(
        &self,
        session: &mut SparsitySession,
        ctx: &EvalContext,
        roots: &[NodeId],
        is_bc: bool,
        sparsity: &mut EquationSparsity,
    ) -> eyre::Result<()> {
        let func_combinations = ctx
            .computation()
            .required_func_combinations(&self.variations, &self.unknowns);

        // All roots must be determined before any set is classified, since integrands of the
        // same combo share the context and possibly subexpressions.
        for &root in roots {
            let r_input = top_level_input(session, root, ctx, &func_combinations)?;
            session.determine_r(root, ctx, &r_input)?;
        }

        for &root in roots {
            let superset = session.sparsity_superset(root, ctx)?;
            let region = &ctx.combo().region;
            for (md, _) in superset.iter() {
                match md.order() {
                    1 if ctx.computation() != ComputationType::FunctionalOnly => {
                        for id in md.func_ids() {
                            if self.variations.contains(&id) {
                                sparsity.add_variation(region, id);
                            }
                        }
                    }
                    2 if ctx.computation() == ComputationType::MatrixAndVector => {
                        let (var, unk) = self.split_second_order(session, root, md)?;
                        sparsity.add_pair(region, var, unk, is_bc);
                    }
                    _ => {}
                }
            }
            sparsity.roots.push(RootSparsity {
                combo: ctx.combo().clone(),
                computation: ctx.computation(),
                is_bc,
                root,
                superset,
            });
        }
        Ok(())
    }

    /// Splits a top-level second-order derivative into its variation and unknown.
    ///
    /// The top-level input only demands (variation, unknown) combinations at second order, so an
    /// error here means the superset disagrees with the input it was determined from.
    fn split_second_order(
        &self,
        session: &SparsitySession,
        root: NodeId,
        md: &MultipleDeriv,
    ) -> Result<(FunctionId, FunctionId), SparsityError> {
        let expr = || session.arena().display(root).to_string();
        let malformed = || SparsityError::MalformedSecondOrderDeriv {
            expr: expr(),
            deriv: md.to_string(),
        };
        let func_ids = md
            .iter()
            .map(Deriv::func_id)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|source| SparsityError::InvalidDeriv { expr: expr(), source })?;
        match func_ids[..] {
            [a, b] if self.variations.contains(&a) && self.unknowns.contains(&b) => Ok((a, b)),
            [a, b] if self.variations.contains(&b) && self.unknowns.contains(&a) => Ok((b, a)),
            _ => Err(malformed()),
        }
    }
}

/// The top-level required set of a root: its nonzero derivatives of the orders the computation
/// needs, restricted to the demanded function combinations.
fn top_level_input(
    session: &mut SparsitySession,
    root: NodeId,
    ctx: &EvalContext,
    func_combinations: &BTreeSet<Vec<FunctionId>>,
) -> Result<Vec<DerivSet>, SparsityError> {
    let orders = ctx.top_level_orders();
    let len = orders.iter().max().map_or(0, |max| max + 1);
    let mut r_input = vec![DerivSet::new(); len];
    let no_spatial_derivs = BTreeSet::new();
    for &order in orders {
        r_input[order] = session
            .find_w(root, order, ctx)?
            .filter(|md| md.is_in_required_set(func_combinations, &no_spatial_derivs));
    }
    Ok(r_input)
}

/// The derivative information of one integrand in one context.
#[derive(Debug, Clone)]
pub struct RootSparsity {
    pub combo: RegionQuadCombo,
    pub computation: ComputationType,
    pub is_bc: bool,
    pub root: NodeId,
    pub superset: SparsitySuperset,
}

/// Which functions appear, and which (variation, unknown) pairs couple, on each region.
#[derive(Debug, Clone, Default)]
pub struct EquationSparsity {
    var_unk_pairs: BTreeMap<Region, BTreeSet<(FunctionId, FunctionId)>>,
    bc_var_unk_pairs: BTreeMap<Region, BTreeSet<(FunctionId, FunctionId)>>,
    vars_on_region: BTreeMap<Region, BTreeSet<FunctionId>>,
    unks_on_region: BTreeMap<Region, BTreeSet<FunctionId>>,
    roots: Vec<RootSparsity>,
}

impl EquationSparsity {
    fn add_variation(&mut self, region: &Region, var: FunctionId) {
        self.vars_on_region
            .entry(region.clone())
            .or_default()
            .insert(var);
    }

    fn add_pair(&mut self, region: &Region, var: FunctionId, unk: FunctionId, is_bc: bool) {
        let pairs = if is_bc {
            &mut self.bc_var_unk_pairs
        } else {
            &mut self.var_unk_pairs
        };
        pairs.entry(region.clone()).or_default().insert((var, unk));
        self.add_variation(region, var);
        self.unks_on_region
            .entry(region.clone())
            .or_default()
            .insert(unk);
    }

    /// The (variation, unknown) pairs with a nonzero second derivative in the interior terms.
    pub fn var_unk_pairs(&self, region: &Region) -> Option<&BTreeSet<(FunctionId, FunctionId)>> {
        self.var_unk_pairs.get(region)
    }

    /// The (variation, unknown) pairs with a nonzero second derivative in the boundary condition
    /// terms.
    pub fn bc_var_unk_pairs(&self, region: &Region) -> Option<&BTreeSet<(FunctionId, FunctionId)>> {
        self.bc_var_unk_pairs.get(region)
    }

    pub fn vars_on_region(&self, region: &Region) -> Option<&BTreeSet<FunctionId>> {
        self.vars_on_region.get(region)
    }

    pub fn unks_on_region(&self, region: &Region) -> Option<&BTreeSet<FunctionId>> {
        self.unks_on_region.get(region)
    }

    pub fn regions(&self) -> BTreeSet<&Region> {
        self.vars_on_region
            .keys()
            .chain(self.unks_on_region.keys())
            .collect()
    }

    pub fn roots(&self) -> &[RootSparsity] {
        &self.roots
    }

    /// The block sparsity pattern of the system matrix, with one row per variation and one column
    /// per unknown, in the order they are listed in the equation set.
    pub fn block_pattern(&self, equation: &EquationSet) -> eyre::Result<SparsityPattern> {
        let row_of = |id: FunctionId| equation.variations().iter().position(|&v| v == id);
        let col_of = |id: FunctionId| equation.unknowns().iter().position(|&u| u == id);

        let mut entries = BTreeSet::new();
        for (var, unk) in self
            .var_unk_pairs
            .values()
            .chain(self.bc_var_unk_pairs.values())
            .flatten()
        {
            let i = row_of(*var).ok_or_else(|| eyre!("Function {} is not a variation of the equation.", var))?;
            let j = col_of(*unk).ok_or_else(|| eyre!("Function {} is not an unknown of the equation.", unk))?;
            entries.insert((i, j));
        }

        let num_rows = equation.variations().len();
        let num_cols = equation.unknowns().len();
        let mut offsets = Vec::with_capacity(num_rows + 1);
        let mut column_indices = Vec::with_capacity(entries.len());

        offsets.push(0);
        for (i, j) in entries {
            // Consecutive empty rows all start at the current column index
            while i + 1 > offsets.len() {
                offsets.push(column_indices.len());
            }
            column_indices.push(j);
        }
        while offsets.len() < num_rows + 1 {
            offsets.push(column_indices.len());
        }

        SparsityPattern::try_from_offsets_and_indices(num_rows, num_cols, offsets, column_indices)
            .map_err(|err| eyre!("Failed to construct block sparsity pattern: {:?}", err))
    }
}
