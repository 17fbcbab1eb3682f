//! Program analysis.

use std::collections::HashMap;
use std::rc::Rc;

use miette::Result;

use crate::analysis::data::DefUse;
use crate::analysis::dependency::FunctionDependencies;
use crate::analysis::error::AnalysisError;
use crate::analysis::isa::Isa;
use crate::analysis::numbering::{function_id, InstNumbering};
use crate::common::cfg::{ControlFlowGraph, PostDominators};
use crate::mir::{BlockId, Function, InstId, Module};

pub mod control;
pub mod data;
pub mod dependency;
pub mod error;
pub mod isa;
pub mod numbering;
pub mod reconvergence;

/// Immediate post-dominators of basic blocks.
pub trait PostDominance {
    /// Immediate post-dominator of a block, `None` if undefined.
    fn immediate_post_dominator(&self, bb: BlockId) -> Option<BlockId>;
}

impl PostDominance for PostDominators<BlockId> {
    fn immediate_post_dominator(&self, bb: BlockId) -> Option<BlockId> {
        self.immediate(bb)
    }
}

/// Forward data-dependency edges.
pub trait DataDependence {
    /// Instructions directly consuming the value produced by `inst`.
    fn consumers(&self, inst: InstId) -> &[InstId];
}

/// Module analyser.
///
/// Functions are addressed by their ordinal in the module.
pub struct Analyzer<'a> {
    module: &'a Module,
    isa: &'a dyn Isa,
    cfg_cache: HashMap<usize, Rc<ControlFlowGraph<BlockId>>>,
    post_dominators_cache: HashMap<usize, Rc<PostDominators<BlockId>>>,
    numbering_cache: HashMap<usize, Rc<InstNumbering>>,
    def_use_cache: HashMap<usize, Rc<DefUse>>,
}

impl<'a> Analyzer<'a> {
    /// Create a new module analyser.
    pub fn new(module: &'a Module, isa: &'a dyn Isa) -> Self {
        Self {
            module,
            isa,
            cfg_cache: HashMap::new(),
            post_dominators_cache: HashMap::new(),
            numbering_cache: HashMap::new(),
            def_use_cache: HashMap::new(),
        }
    }

    /// Get the module being analysed.
    pub fn module(&self) -> &Module {
        self.module
    }

    /// Get the function with the given ordinal.
    pub fn function(&self, ordinal: usize) -> Result<&'a Function> {
        let module = self.module;
        Ok(module
            .functions
            .get(ordinal)
            .ok_or(AnalysisError::UnknownFunction { ordinal })?)
    }

    /// Analyse the control flow graph of a function.
    ///
    /// Fails for a function without basic blocks, i.e. a declaration.
    pub fn analyze_cfg(&mut self, ordinal: usize) -> Result<Rc<ControlFlowGraph<BlockId>>> {
        if let Some(cfg) = self.cfg_cache.get(&ordinal) {
            return Ok(cfg.clone());
        }
        let func = self.function(ordinal)?;
        if func.entry().is_none() {
            return Err(AnalysisError::Declaration {
                function: func.name.clone(),
            }
            .into());
        }
        let cfg = ControlFlowGraph::analyze(func.iter().map(|(bb, _)| (bb, func.control_flow(bb))));
        let cfg = Rc::new(cfg);
        self.cfg_cache.insert(ordinal, cfg.clone());
        Ok(cfg)
    }

    /// Analyse the post-dominator tree of a function.
    pub fn analyze_post_dominators(
        &mut self,
        ordinal: usize,
    ) -> Result<Rc<PostDominators<BlockId>>> {
        let cfg = self.analyze_cfg(ordinal)?;
        Ok(self
            .post_dominators_cache
            .entry(ordinal)
            .or_insert_with(|| Rc::new(PostDominators::analyze(cfg.as_ref())))
            .clone())
    }

    /// Number the substantive instructions of a function.
    pub fn analyze_numbering(&mut self, ordinal: usize) -> Result<Rc<InstNumbering>> {
        let func = self.function(ordinal)?;
        let isa = self.isa;
        Ok(self
            .numbering_cache
            .entry(ordinal)
            .or_insert_with(|| Rc::new(InstNumbering::analyze(func, function_id(ordinal), isa)))
            .clone())
    }

    /// Analyse the def-use edges of a function.
    pub fn analyze_def_use(&mut self, ordinal: usize) -> Result<Rc<DefUse>> {
        let func = self.function(ordinal)?;
        Ok(self
            .def_use_cache
            .entry(ordinal)
            .or_insert_with(|| Rc::new(DefUse::analyze(func)))
            .clone())
    }

    /// Analyse the dependents of every branch of a function.
    ///
    /// Note: this analysis does not have a cache.
    pub fn analyze_dependencies(&mut self, ordinal: usize) -> Result<FunctionDependencies> {
        let func = self.function(ordinal)?;
        let numbering = self.analyze_numbering(ordinal)?;
        if func.is_empty() {
            return Ok(FunctionDependencies::empty(func, &numbering));
        }
        let cfg = self.analyze_cfg(ordinal)?;
        let pdom = self.analyze_post_dominators(ordinal)?;
        let def_use = self.analyze_def_use(ordinal)?;
        FunctionDependencies::analyze(
            func,
            self.isa,
            cfg.as_ref(),
            pdom.as_ref(),
            numbering.as_ref(),
            def_use.as_ref(),
        )
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::analysis::isa::X86;

    #[test]
    fn caches_are_shared() {
        let module = crate::parse("func @f {\nentry:\n    br %c, a, a\na:\n    ret\n}\n").unwrap();
        let mut analyzer = Analyzer::new(&module, &X86);
        let first = analyzer.analyze_cfg(0).unwrap();
        let second = analyzer.analyze_cfg(0).unwrap();
        assert!(Rc::ptr_eq(&first, &second));
        assert_eq!(analyzer.module().functions.len(), 1);
    }

    #[test]
    fn unknown_and_declared_functions() {
        let module = crate::parse("func @decl { }").unwrap();
        let mut analyzer = Analyzer::new(&module, &X86);
        let err = analyzer.analyze_cfg(1).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<AnalysisError>(),
            Some(AnalysisError::UnknownFunction { ordinal: 1 })
        ));
        let err = analyzer.analyze_cfg(0).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<AnalysisError>(),
            Some(AnalysisError::Declaration { .. })
        ));
        assert!(analyzer.analyze_dependencies(0).unwrap().branches.is_empty());
    }
}
