//! Branch dependents.
//!
//! For every conditional branch with a reconvergence point, the dependents
//! are its control region's substantive instructions together with the
//! data-dependence closure seeded by the branch, its predicate producer and
//! that region.

use imbl::OrdSet;
use miette::Result;
#[allow(unused_imports)]
use nolog::*;

use super::{
    control::ControlRegion,
    data::DataClosure,
    error::AnalysisError,
    isa::Isa,
    numbering::InstNumbering,
    reconvergence::{self, BranchSite},
    DataDependence, PostDominance,
};
use crate::{
    common::cfg::ControlFlowGraph,
    mir::{BlockId, Function, InstId},
};

/// Dependents of one branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchDependents {
    /// Number of the branch.
    pub branch: u32,
    /// The branch instruction.
    pub inst: InstId,
    /// Block owning the branch.
    pub block: BlockId,
    /// Reconvergence point.
    pub point: BlockId,
    /// Substantive instructions of the control region.
    pub control: OrdSet<u32>,
    /// Data-dependent instructions.
    pub data: OrdSet<u32>,
    /// Union of `control` and `data`.
    pub dependents: OrdSet<u32>,
}

/// A branch without reconvergence point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SkippedBranch {
    /// Number of the branch.
    pub branch: u32,
    /// The branch instruction.
    pub inst: InstId,
    /// Block owning the branch.
    pub block: BlockId,
}

/// Whole-function totals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Summary {
    /// Substantive instructions.
    pub instructions: usize,
    /// Analysed branches.
    pub branches: usize,
    /// Branches without reconvergence point.
    pub skipped: usize,
    /// Instructions depending on at least one branch.
    pub dependent: usize,
    /// Instructions depending on no branch.
    pub independent: usize,
}

/// Dependency analysis result of a function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionDependencies {
    /// Identifier of the function.
    pub function_id: u32,
    /// Name of the function.
    pub name: String,
    /// Analysed branches in layout order.
    pub branches: Vec<BranchDependents>,
    /// Skipped branches in layout order.
    pub skipped: Vec<SkippedBranch>,
    /// Totals.
    pub summary: Summary,
}

impl FunctionDependencies {
    /// Result for a function with no branches to analyse.
    pub fn empty(func: &Function, numbering: &InstNumbering) -> Self {
        Self {
            function_id: numbering.function_id(),
            name: func.name.clone(),
            branches: Vec::new(),
            skipped: Vec::new(),
            summary: Summary {
                instructions: numbering.len(),
                independent: numbering.len(),
                ..Summary::default()
            },
        }
    }

    /// Analyse the dependents of every conditional branch of a function.
    pub fn analyze(
        func: &Function,
        isa: &dyn Isa,
        cfg: &ControlFlowGraph<BlockId>,
        pdom: &impl PostDominance,
        numbering: &InstNumbering,
        deps: &(impl DataDependence + ?Sized),
    ) -> Result<Self> {
        let mut result = Self::empty(func, numbering);
        let number = |inst: InstId| {
            numbering
                .number(inst)
                .ok_or_else(|| AnalysisError::Unnumbered {
                    function: func.name.clone(),
                    inst: inst.to_string(),
                })
        };

        for site in reconvergence::resolve(func, isa, pdom) {
            let BranchSite { inst, block, point } = site;
            let branch = number(inst)?;
            let Some(point) = point else {
                result.skipped.push(SkippedBranch {
                    branch,
                    inst,
                    block,
                });
                continue;
            };

            let region = ControlRegion::analyze(cfg, func, block, point);
            let mut control_insts = Vec::new();
            let mut control = OrdSet::new();
            for &id in &region.insts {
                let substantive = func.inst(id).is_some_and(|i| isa.is_substantive(i));
                if substantive {
                    control.insert(number(id)?);
                    control_insts.push(id);
                }
            }

            // The nearest substantive instruction before the branch is taken
            // as its predicate producer.
            let producer = func.prev_inst(inst, |i| isa.is_substantive(i));
            let seeds = std::iter::once(inst).chain(producer).chain(control_insts);
            let data = DataClosure::new(func, isa, deps, numbering).analyze(seeds);

            let dependents = control.clone().union(data.clone());
            trace!("DEP " => "branch #{}: {} control, {} data, {} total", branch, control.len(), data.len(), dependents.len());
            result.branches.push(BranchDependents {
                branch,
                inst,
                block,
                point,
                control,
                data,
                dependents,
            });
        }

        let dependent = result
            .branches
            .iter()
            .fold(OrdSet::new(), |acc, b| acc.union(b.dependents.clone()))
            .len();
        result.summary = Summary {
            instructions: numbering.len(),
            branches: result.branches.len(),
            skipped: result.skipped.len(),
            dependent,
            independent: numbering.len() - dependent,
        };
        Ok(result)
    }
}
