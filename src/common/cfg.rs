//! Control flow graph and post-dominator tree.

use std::{collections::HashMap, hash::Hash};

#[allow(unused_imports)]
use nolog::*;
use petgraph::{
    algo::{dominators, tarjan_scc},
    graph::{DiGraph, NodeIndex},
    visit::EdgeRef,
    Direction,
};

/// Control flow graph.
#[derive(Debug)]
pub struct ControlFlowGraph<BB> {
    graph: DiGraph<BB, Edge>,
    bb_map: HashMap<BB, NodeIndex>,
}

/// Edge type in the control flow graph.
///
/// The order of the variants is the order in which successors are reported.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Edge {
    /// If-true edge.
    True,
    /// If-false edge.
    False,
    /// Unconditional edge.
    Unconditional,
}

/// How control leaves a basic block.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ControlFlowInst<BB> {
    /// Two-way branch, to the true target and the false target.
    Branch(BB, BB),
    /// Unconditional transfer, explicit or by falling through.
    Jump(BB),
    /// Leaves the function.
    Return,
}

impl<BB: Eq + Copy + Hash> ControlFlowGraph<BB> {
    /// Analyze the control flow graph of a function.
    ///
    /// # Panics
    /// Panics if a branch target is not one of the given blocks.
    pub fn analyze(bbs: impl IntoIterator<Item = (BB, ControlFlowInst<BB>)>) -> Self {
        let bbs = bbs.into_iter().collect::<Vec<_>>();
        let nodes = bbs.len();
        let mut graph = DiGraph::with_capacity(nodes, nodes * 2);
        let mut bb_map = HashMap::new();

        // Add the nodes.
        for (bb, _) in bbs.iter() {
            let node = graph.add_node(*bb);
            bb_map.insert(*bb, node);
        }

        // Add the edges.
        for (bb, inst) in bbs {
            let node = bb_map[&bb];
            match inst {
                ControlFlowInst::Branch(true_bb, false_bb) => {
                    let true_node = bb_map[&true_bb];
                    let false_node = bb_map[&false_bb];
                    graph.add_edge(node, true_node, Edge::True);
                    graph.add_edge(node, false_node, Edge::False);
                    trace!(->[0] "CFG " => "add edge {} -T> {}", node.index(), true_node.index());
                    trace!(->[0] "CFG " => "add edge {} -F> {}", node.index(), false_node.index());
                }
                ControlFlowInst::Jump(target) => {
                    let jump_node = bb_map[&target];
                    graph.add_edge(node, jump_node, Edge::Unconditional);
                    trace!(->[0] "CFG " => "add edge {} --> {}", node.index(), jump_node.index());
                }
                ControlFlowInst::Return => {
                    trace!(->[0] "CFG " => "exit {}", node.index());
                }
            }
        }

        Self { graph, bb_map }
    }

    /// Get the successors of a basic block.
    ///
    /// Successors follow the terminator: the true target, then the false
    /// target. A block reached by both edges of a branch is reported once.
    pub fn succs(&self, bb: BB) -> impl Iterator<Item = BB> + '_ {
        let mut edges = match self.bb_map.get(&bb) {
            Some(&node) => self
                .graph
                .edges_directed(node, Direction::Outgoing)
                .map(|edge| (*edge.weight(), edge.target()))
                .collect::<Vec<_>>(),
            None => Vec::new(),
        };
        edges.sort_by_key(|&(edge, _)| edge);
        edges.dedup_by_key(|&mut (_, target)| target);
        edges.into_iter().map(move |(_, node)| self.graph[node])
    }
}

/// Post-dominator tree of control flow graph.
///
/// Post-dominance is dominance on the reversed graph, rooted at a virtual
/// exit. Every region control can never leave, i.e. every strongly connected
/// component without outgoing edges, flows into the virtual exit through its
/// first block. Sinks are such regions, and so are infinite loops. Blocks
/// whose immediate post-dominator would be the virtual exit have no
/// immediate post-dominator.
#[derive(Debug)]
pub struct PostDominators<BB> {
    ipdoms: HashMap<BB, BB>,
}

impl<BB: Eq + Copy + Hash> PostDominators<BB> {
    /// Analyze the post-dominator tree of a control flow graph.
    pub fn analyze(cfg: &ControlFlowGraph<BB>) -> Self {
        let graph = &cfg.graph;

        // Reverse every edge. Node indices are kept so that the two graphs
        // can be related; `None` marks the virtual exit.
        let mut reversed: DiGraph<Option<BB>, ()> =
            DiGraph::with_capacity(graph.node_count() + 1, graph.edge_count() + 1);
        for node in graph.node_indices() {
            reversed.add_node(Some(graph[node]));
        }
        let exit = reversed.add_node(None);
        for edge in graph.edge_references() {
            reversed.add_edge(edge.target(), edge.source(), ());
        }
        for root in exit_roots(graph) {
            trace!(->[0] "PDOM" => "exit root: {}", root.index());
            reversed.add_edge(exit, root, ());
        }

        let pdom = dominators::simple_fast(&reversed, exit);
        let mut ipdoms = HashMap::new();
        for node in graph.node_indices() {
            match pdom.immediate_dominator(node).and_then(|idom| reversed[idom]) {
                Some(ipdom) => {
                    trace!(->[0] "PDOM" => "Post-domination: {} -> {}", cfg.bb_map[&ipdom].index(), node.index());
                    ipdoms.insert(graph[node], ipdom);
                }
                None => {
                    trace!(->[0] "PDOM" => "No immediate post-dominator: {}", node.index());
                }
            }
        }

        Self { ipdoms }
    }

    /// Immediate post-dominator of a basic block, if it has one.
    pub fn immediate(&self, bb: BB) -> Option<BB> {
        self.ipdoms.get(&bb).copied()
    }
}

/// First block of every strongly connected component that has no edge
/// leaving it.
fn exit_roots<N, E>(graph: &DiGraph<N, E>) -> Vec<NodeIndex> {
    let sccs = tarjan_scc(graph);
    let mut component = vec![0; graph.node_count()];
    for (i, scc) in sccs.iter().enumerate() {
        for node in scc {
            component[node.index()] = i;
        }
    }
    sccs.iter()
        .enumerate()
        .filter(|(i, scc)| {
            scc.iter()
                .flat_map(|&node| graph.neighbors_directed(node, Direction::Outgoing))
                .all(|succ| component[succ.index()] == *i)
        })
        .filter_map(|(_, scc)| scc.iter().min().copied())
        .collect()
}

#[cfg(test)]
mod test {
    use super::*;

    use ControlFlowInst::*;

    fn cfg(edges: Vec<(u32, ControlFlowInst<u32>)>) -> ControlFlowGraph<u32> {
        ControlFlowGraph::analyze(edges)
    }

    #[test]
    fn diamond_reconverges_at_join() {
        let cfg = cfg(vec![
            (0, Branch(1, 2)),
            (1, Jump(3)),
            (2, Jump(3)),
            (3, Return),
        ]);
        let pdom = PostDominators::analyze(&cfg);
        assert_eq!(pdom.immediate(0), Some(3));
        assert_eq!(pdom.immediate(1), Some(3));
        assert_eq!(pdom.immediate(2), Some(3));
        assert_eq!(pdom.immediate(3), None);
    }

    #[test]
    fn disjoint_exits_have_no_post_dominator() {
        let cfg = cfg(vec![(0, Branch(1, 2)), (1, Return), (2, Return)]);
        let pdom = PostDominators::analyze(&cfg);
        assert_eq!(pdom.immediate(0), None);
        assert_eq!(pdom.immediate(1), None);
    }

    #[test]
    fn loop_exit_post_dominates_header() {
        // 0 -> 1; 1 -> {2, 3}; 2 -> 1; 3 exits
        let cfg = cfg(vec![
            (0, Jump(1)),
            (1, Branch(2, 3)),
            (2, Jump(1)),
            (3, Return),
        ]);
        let pdom = PostDominators::analyze(&cfg);
        assert_eq!(pdom.immediate(0), Some(1));
        assert_eq!(pdom.immediate(1), Some(3));
        assert_eq!(pdom.immediate(2), Some(1));
    }

    #[test]
    fn infinite_loop_has_no_post_dominator() {
        let cfg = cfg(vec![(0, Branch(1, 2)), (1, Jump(1)), (2, Return)]);
        let pdom = PostDominators::analyze(&cfg);
        assert_eq!(pdom.immediate(1), None);
        // The loop is an exit of its own, so the arms never meet.
        assert_eq!(pdom.immediate(0), None);
    }

    #[test]
    fn infinite_loop_is_rooted_at_its_first_block() {
        // 0 -> {1, 3}; 1 -> 2; 2 -> 1; 3 exits
        let cfg = cfg(vec![
            (0, Branch(1, 3)),
            (1, Jump(2)),
            (2, Jump(1)),
            (3, Return),
        ]);
        let pdom = PostDominators::analyze(&cfg);
        assert_eq!(pdom.immediate(0), None);
        assert_eq!(pdom.immediate(1), None);
        assert_eq!(pdom.immediate(2), Some(1));
    }

    #[test]
    fn successors_follow_the_terminator() {
        let cfg = cfg(vec![(0, Branch(2, 1)), (1, Return), (2, Jump(1))]);
        assert_eq!(cfg.succs(0).collect::<Vec<_>>(), vec![2, 1]);
        assert_eq!(cfg.succs(2).collect::<Vec<_>>(), vec![1]);
        assert!(cfg.succs(1).next().is_none());
    }

    #[test]
    fn successors_are_deduplicated() {
        let cfg = cfg(vec![(0, Branch(1, 1)), (1, Return)]);
        assert_eq!(cfg.succs(0).collect::<Vec<_>>(), vec![1]);
    }
}
