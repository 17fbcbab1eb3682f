//! Data dependence.
//!
//! # Rules
//! Starting from a seed set, the closure follows def-use edges breadth
//! first. Every consumer that is a numbered instruction is dependent. When
//! the target fuses compares with branches, a conditional branch that
//! directly follows a dependent instruction is dependent too:
//!
//! ```text
//! I in Seeds |- Frontier(I)
//! Frontier(I), I -> J in DefUse, J numbered |- Dep(J), Frontier(J)
//! Dep(J), next(J) = K, K branch, K unprocessed |- Dep(K), Frontier(K)
//! ```

use std::collections::{HashMap, HashSet, VecDeque};

use imbl::OrdSet;
#[allow(unused_imports)]
use nolog::*;

use super::{isa::Isa, numbering::InstNumbering, DataDependence};
use crate::mir::{Function, InstId};

/// Def-use edges derived from value names.
///
/// Every instruction using `%v` consumes every definition of `%v` in the
/// function. Consumers are listed in layout order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DefUse {
    consumers: HashMap<InstId, Vec<InstId>>,
}

impl DefUse {
    /// Collect the def-use edges of a function.
    pub fn analyze(func: &Function) -> Self {
        let mut defs: HashMap<&str, Vec<InstId>> = HashMap::new();
        for (id, inst) in func.insts() {
            if let Some(def) = &inst.def {
                defs.entry(def.as_str()).or_default().push(id);
            }
        }

        let mut consumers: HashMap<InstId, Vec<InstId>> = HashMap::new();
        for (id, inst) in func.insts() {
            for used in inst.uses() {
                for &def in defs.get(used).into_iter().flatten() {
                    let list = consumers.entry(def).or_default();
                    // An instruction reading a value twice is one consumer.
                    if list.last() != Some(&id) {
                        trace!(->[0] "DU  " => "{} -> {} via {}", def, id, used);
                        list.push(id);
                    }
                }
            }
        }
        Self { consumers }
    }
}

impl DataDependence for DefUse {
    fn consumers(&self, inst: InstId) -> &[InstId] {
        self.consumers.get(&inst).map_or(&[], Vec::as_slice)
    }
}

/// Transitive data-dependence closure of a seed set.
pub struct DataClosure<'a, D: ?Sized> {
    func: &'a Function,
    isa: &'a dyn Isa,
    deps: &'a D,
    numbering: &'a InstNumbering,
    frontier: VecDeque<InstId>,
    processed: HashSet<InstId>,
    found: OrdSet<u32>,
}

impl<'a, D: DataDependence + ?Sized> DataClosure<'a, D> {
    /// Create a closure over a function.
    pub fn new(
        func: &'a Function,
        isa: &'a dyn Isa,
        deps: &'a D,
        numbering: &'a InstNumbering,
    ) -> Self {
        Self {
            func,
            isa,
            deps,
            numbering,
            frontier: VecDeque::new(),
            processed: HashSet::new(),
            found: OrdSet::new(),
        }
    }

    /// Compute the numbers of every instruction depending on the seeds.
    ///
    /// Seeds themselves are not part of the result unless some other
    /// instruction in the closure feeds them.
    pub fn analyze(mut self, seeds: impl IntoIterator<Item = InstId>) -> OrdSet<u32> {
        self.frontier.extend(seeds);
        while let Some(inst) = self.frontier.pop_front() {
            if !self.processed.insert(inst) {
                continue;
            }
            for &consumer in self.deps.consumers(inst) {
                // Edges leaving the numbered universe are ignored.
                let Some(number) = self.numbering.number(consumer) else {
                    continue;
                };
                trace!(->[0] "DATA" => "{} feeds {} (#{})", inst, consumer, number);
                self.found.insert(number);
                self.frontier.push_back(consumer);
                if self.isa.fuses_compare_and_branch() {
                    self.propagate_to_branch(consumer);
                }
            }
        }
        self.found
    }

    /// Make the branch right after `inst` dependent, if there is one.
    fn propagate_to_branch(&mut self, inst: InstId) {
        let isa = self.isa;
        let Some(next) = self.func.next_inst(inst, |i| isa.is_substantive(i)) else {
            return;
        };
        let is_branch = self
            .func
            .inst(next)
            .is_some_and(|i| isa.is_conditional_branch(i));
        if !is_branch || self.processed.contains(&next) {
            return;
        }
        if let Some(number) = self.numbering.number(next) {
            trace!(->[0] "DATA" => "{} is fused with branch {} (#{})", inst, next, number);
            self.found.insert(number);
            self.frontier.push_back(next);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::analysis::isa::{Generic, X86};

    const FUSED: &str = r#"
        func @f {
        entry:
            load %p -> %x
            cmp %x, 0
            kill %x
            br then, done
        then:
            ret %x
        done:
            ret
        }
    "#;

    #[test]
    fn def_use_edges() {
        let module = crate::parse(
            r#"
            func @f {
            entry:
                mov 1 -> %a
                add %a, %a -> %b
                mov 2 -> %a
                ret %b
            }
            "#,
        )
        .unwrap();
        let func = &module.functions[0];
        let ids = func.insts().map(|(id, _)| id).collect::<Vec<_>>();
        let du = DefUse::analyze(func);
        assert_eq!(du.consumers(ids[0]), &[ids[1]]);
        assert_eq!(du.consumers(ids[1]), &[ids[3]]);
        // Redefinitions are conservatively linked to every use.
        assert_eq!(du.consumers(ids[2]), &[ids[1]]);
        assert!(du.consumers(ids[3]).is_empty());
    }

    #[test]
    fn fused_compare_reaches_branch() {
        let module = crate::parse(FUSED).unwrap();
        let func = &module.functions[0];
        let du = DefUse::analyze(func);
        let load = func.insts().next().unwrap().0;

        let numbering = InstNumbering::analyze(func, 10000, &X86);
        let found = DataClosure::new(func, &X86, &du, &numbering).analyze([load]);
        // cmp (1), br (2) and `ret %x` (3); the load itself is a seed.
        assert_eq!(found.into_iter().collect::<Vec<_>>(), vec![1, 2, 3]);

        let numbering = InstNumbering::analyze(func, 10000, &Generic);
        let found = DataClosure::new(func, &Generic, &du, &numbering).analyze([load]);
        // `kill` is numbered here (2) and consumes %x. Without fusion the
        // branch (3) is never reached.
        assert_eq!(found.into_iter().collect::<Vec<_>>(), vec![1, 2, 4]);
    }

    #[test]
    fn cycles_terminate() {
        let module = crate::parse(
            r#"
            func @f {
            entry:
                jmp head
            head:
                add %i, 1 -> %i
                mul %i, %j -> %j
                jmp head
            }
            "#,
        )
        .unwrap();
        let func = &module.functions[0];
        let du = DefUse::analyze(func);
        let numbering = InstNumbering::analyze(func, 10000, &X86);
        let add = numbering.inst(1).unwrap();
        let found = DataClosure::new(func, &X86, &du, &numbering).analyze([add]);
        assert_eq!(found.into_iter().collect::<Vec<_>>(), vec![1, 2]);
    }
}
