//! Reconvergence points of conditional branches.

#[allow(unused_imports)]
use nolog::*;

use super::{isa::Isa, PostDominance};
use crate::mir::{BlockId, Function, InstId};

/// A conditional branch and the block where its paths rejoin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BranchSite {
    /// The branch instruction.
    pub inst: InstId,
    /// Block owning the branch.
    pub block: BlockId,
    /// Immediate post-dominator of `block`, if there is one.
    pub point: Option<BlockId>,
}

/// Find every conditional branch of a function, in layout order, together
/// with its reconvergence point.
pub fn resolve(func: &Function, isa: &dyn Isa, pdom: &impl PostDominance) -> Vec<BranchSite> {
    func.iter()
        .flat_map(|(block, bb)| bb.insts().map(move |(inst, data)| (block, inst, data)))
        .filter(|(_, _, data)| isa.is_conditional_branch(data))
        .map(|(block, inst, _)| {
            let point = pdom.immediate_post_dominator(block);
            trace!(->[0] "RECV" => "{} in bb{} reconverges at {:?}", inst, block, point);
            BranchSite { inst, block, point }
        })
        .collect()
}
