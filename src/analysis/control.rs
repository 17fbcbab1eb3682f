//! Control-dependent region of a branch.
//!
//! The region is every block reachable from the branch block's successors
//! without passing through the reconvergence point. Blocks are visited
//! breadth first and at most once, so loops inside the region terminate.

use std::collections::{HashSet, VecDeque};

#[allow(unused_imports)]
use nolog::*;

use crate::{
    common::cfg::ControlFlowGraph,
    mir::{BlockId, Function, InstId},
};

/// Blocks and instructions controlled by one branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlRegion {
    /// Blocks in visiting order.
    pub blocks: Vec<BlockId>,
    /// Instructions of `blocks`, meta instructions included.
    pub insts: Vec<InstId>,
}

impl ControlRegion {
    /// Collect the region of the branch ending `block`, bounded by `point`.
    pub fn analyze(
        cfg: &ControlFlowGraph<BlockId>,
        func: &Function,
        block: BlockId,
        point: BlockId,
    ) -> Self {
        let mut visited = HashSet::new();
        let mut blocks = Vec::new();
        let mut work_list = VecDeque::new();

        for succ in cfg.succs(block) {
            if succ != point && visited.insert(succ) {
                blocks.push(succ);
                work_list.push_back(succ);
            }
        }

        while let Some(bb) = work_list.pop_front() {
            for succ in cfg.succs(bb) {
                if succ == point || !visited.insert(succ) {
                    continue;
                }
                trace!(->[0] "CTRL" => "bb{} -> bb{}", bb, succ);
                blocks.push(succ);
                work_list.push_back(succ);
            }
        }

        let insts = blocks
            .iter()
            .filter_map(|&bb| func.get(bb))
            .flat_map(|bb| bb.insts().map(|(id, _)| id))
            .collect();
        Self { blocks, insts }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn region(input: &str, from: usize, to: usize) -> (Vec<String>, usize) {
        let module = crate::parse(input).unwrap();
        let func = &module.functions[0];
        let cfg = ControlFlowGraph::analyze(func.iter().map(|(bb, _)| (bb, func.control_flow(bb))));
        let blocks = func.iter().map(|(bb, _)| bb).collect::<Vec<_>>();
        let region = ControlRegion::analyze(&cfg, func, blocks[from], blocks[to]);
        let labels = region
            .blocks
            .iter()
            .map(|&bb| func.get(bb).unwrap().label.clone())
            .collect();
        (labels, region.insts.len())
    }

    #[test]
    fn diamond() {
        let (labels, insts) = region(
            r#"
            func @f {
            entry:
                br %c, then, else
            then:
                mov 1 -> %x
                jmp join
            else:
                dbg.value %c
                mov 2 -> %x
            join:
                ret %x
            }
            "#,
            0,
            3,
        );
        assert_eq!(labels, vec!["then", "else"]);
        assert_eq!(insts, 4);
    }

    #[test]
    fn loop_terminates_before_exit() {
        let (labels, insts) = region(
            r#"
            func @f {
            entry:
                jmp head
            head:
                icmp.lt %i, 10 -> %c
                br %c, body, exit
            body:
                add %i, 1 -> %i
                jmp head
            exit:
                ret
            }
            "#,
            1,
            3,
        );
        assert_eq!(labels, vec!["body", "head"]);
        assert_eq!(insts, 4);
    }
}
