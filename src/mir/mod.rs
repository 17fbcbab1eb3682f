//! Machine-level IR.
//!
//! This module contains the function, block and instruction types the
//! analyses run on. Frontends ([`lower`] for listings, [`koopa`] for Koopa
//! IR) produce a [`Module`]; nothing in the analysis mutates it afterwards.

use std::{collections::HashMap, fmt::Display};

use key_node_list::{impl_node, KeyNodeList};

pub use crate::ast::Operand;
use crate::{common::cfg::ControlFlowInst, utils};

pub mod error;
pub mod koopa;
pub mod lower;

utils::declare_u32_id!(
    /// Identifier of an instruction, unique within its function.
    InstId
);

impl Display for InstId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "i{}", self.index())
    }
}

utils::declare_u32_id!(
    /// Identifier of a basic block, unique within its function.
    BlockId
);

impl Display for BlockId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.index())
    }
}

/// Kind of an instruction, as far as control flow is concerned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstKind {
    /// Ordinary instruction.
    Op,
    /// Two-way conditional branch.
    ///
    /// The condition is optional: a flag-consuming branch reads the result
    /// of the preceding compare implicitly.
    Branch {
        /// Explicit condition operand.
        cond: Option<Operand>,
        /// Target if the condition holds.
        then_bb: BlockId,
        /// Target otherwise.
        else_bb: BlockId,
    },
    /// Unconditional jump.
    Jump(BlockId),
    /// Return from the function.
    Return(Option<Operand>),
}

/// Machine instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inst {
    /// Mnemonic.
    pub opcode: String,
    /// Operands of an ordinary instruction.
    pub operands: Vec<Operand>,
    /// Value defined by the instruction.
    pub def: Option<String>,
    /// Control flow kind.
    pub kind: InstKind,
}

impl Inst {
    /// Create an ordinary instruction.
    pub fn op(opcode: impl Into<String>, operands: Vec<Operand>, def: Option<String>) -> Self {
        Self {
            opcode: opcode.into(),
            operands,
            def,
            kind: InstKind::Op,
        }
    }

    /// Create a conditional branch.
    pub fn branch(cond: Option<Operand>, then_bb: BlockId, else_bb: BlockId) -> Self {
        Self {
            opcode: "br".to_string(),
            operands: vec![],
            def: None,
            kind: InstKind::Branch {
                cond,
                then_bb,
                else_bb,
            },
        }
    }

    /// Create an unconditional jump.
    pub fn jump(target: BlockId) -> Self {
        Self {
            opcode: "jmp".to_string(),
            operands: vec![],
            def: None,
            kind: InstKind::Jump(target),
        }
    }

    /// Create a return.
    pub fn ret(value: Option<Operand>) -> Self {
        Self {
            opcode: "ret".to_string(),
            operands: vec![],
            def: None,
            kind: InstKind::Return(value),
        }
    }

    /// Whether the instruction ends a basic block.
    pub fn is_terminator(&self) -> bool {
        !matches!(self.kind, InstKind::Op)
    }

    /// Names of the values read by the instruction.
    pub fn uses(&self) -> impl Iterator<Item = &str> + '_ {
        let extra = match &self.kind {
            InstKind::Branch { cond, .. } => cond.as_ref(),
            InstKind::Return(value) => value.as_ref(),
            _ => None,
        };
        self.operands
            .iter()
            .chain(extra)
            .filter_map(Operand::as_value)
    }
}

impl Display for Inst {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.kind {
            InstKind::Op => {
                write!(f, "{}", self.opcode)?;
                for (i, operand) in self.operands.iter().enumerate() {
                    let sep = if i == 0 { " " } else { ", " };
                    write!(f, "{}{}", sep, operand)?;
                }
                if let Some(def) = &self.def {
                    write!(f, " -> {}", def)?;
                }
                Ok(())
            }
            InstKind::Branch {
                cond,
                then_bb,
                else_bb,
            } => {
                write!(f, "{} ", self.opcode)?;
                if let Some(cond) = cond {
                    write!(f, "{}, ", cond)?;
                }
                write!(f, "bb{}, bb{}", then_bb, else_bb)
            }
            InstKind::Jump(target) => write!(f, "{} bb{}", self.opcode, target),
            InstKind::Return(Some(value)) => write!(f, "{} {}", self.opcode, value),
            InstKind::Return(None) => write!(f, "{}", self.opcode),
        }
    }
}

/// Node in the instruction list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstNode {
    /// Instruction.
    pub inst: Inst,
    prev: Option<InstId>,
    next: Option<InstId>,
}

impl_node!(InstNode { Key = InstId, prev = prev, next = next });

impl InstNode {
    /// Create a new instruction node.
    pub fn new(inst: Inst) -> Self {
        Self {
            inst,
            prev: None,
            next: None,
        }
    }
}

type InstList = KeyNodeList<InstId, InstNode, HashMap<InstId, InstNode>>;

/// Basic block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    /// Label of the basic block.
    pub label: String,
    /// Instructions in the basic block.
    instructions: InstList,
}

impl Block {
    /// Create a new basic block.
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            instructions: InstList::new(),
        }
    }

    /// Get the instruction with the given id.
    pub fn get(&self, id: InstId) -> Option<&Inst> {
        self.instructions.node(&id).map(|node| &node.inst)
    }

    /// The number of instructions in the basic block.
    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    /// Check if the basic block is empty.
    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// The last instruction id in the basic block.
    pub fn back(&self) -> Option<InstId> {
        self.instructions.back_key().copied()
    }

    /// Get an iterator over the instructions in the basic block.
    pub fn insts(&self) -> impl Iterator<Item = (InstId, &Inst)> + '_ {
        self.instructions.iter().map(|(&id, node)| (id, &node.inst))
    }

    /// The terminator of the block, if its last instruction is one.
    pub fn terminator(&self) -> Option<&Inst> {
        self.back()
            .and_then(|id| self.get(id))
            .filter(|inst| inst.is_terminator())
    }

    /// First instruction after `id` satisfying `pred`.
    pub fn next_matching(&self, id: InstId, pred: impl Fn(&Inst) -> bool) -> Option<InstId> {
        let mut cursor = self.instructions.cursor(id);
        if cursor.is_null() {
            return None;
        }
        loop {
            cursor.move_next();
            let key = *cursor.key()?;
            if pred(&cursor.node()?.inst) {
                return Some(key);
            }
        }
    }

    /// Last instruction before `id` satisfying `pred`.
    pub fn prev_matching(&self, id: InstId, pred: impl Fn(&Inst) -> bool) -> Option<InstId> {
        let mut cursor = self.instructions.cursor(id);
        if cursor.is_null() {
            return None;
        }
        loop {
            cursor.move_prev();
            let key = *cursor.key()?;
            if pred(&cursor.node()?.inst) {
                return Some(key);
            }
        }
    }

    fn push(&mut self, id: InstId, inst: Inst) -> Option<InstId> {
        self.instructions.push_back(id, InstNode::new(inst)).ok()?;
        Some(id)
    }
}

/// Node in the basic block list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockNode {
    /// Basic block.
    pub block: Block,
    prev: Option<BlockId>,
    next: Option<BlockId>,
}

impl_node!(BlockNode { Key = BlockId, prev = prev, next = next });

impl BlockNode {
    /// Create a new block node.
    pub fn new(block: Block) -> Self {
        Self {
            block,
            prev: None,
            next: None,
        }
    }
}

type BlockList = KeyNodeList<BlockId, BlockNode, HashMap<BlockId, BlockNode>>;

/// Machine function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Function {
    /// Name of the function.
    pub name: String,
    /// Basic blocks in layout order.
    blocks: BlockList,
    /// Owning block of every instruction.
    parents: HashMap<InstId, BlockId>,
    block_ids: utils::IdAllocator,
    inst_ids: utils::IdAllocator,
}

impl Function {
    /// Create a new function.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            blocks: BlockList::new(),
            parents: HashMap::new(),
            block_ids: utils::IdAllocator::new(),
            inst_ids: utils::IdAllocator::new(),
        }
    }

    /// Append a new, empty basic block to the layout.
    pub fn new_block(&mut self, label: impl Into<String>) -> BlockId {
        let id = BlockId::new(self.block_ids.next_index());
        // Freshly allocated ids never collide.
        let _ = self.blocks.push_back(id, BlockNode::new(Block::new(label)));
        id
    }

    /// Append an instruction to a basic block.
    ///
    /// Returns `None` if the block does not exist.
    pub fn push_inst(&mut self, bb: BlockId, inst: Inst) -> Option<InstId> {
        let id = InstId::new(self.inst_ids.next_index());
        let mut cursor = self.blocks.cursor_mut(bb);
        let node = cursor.node_mut()?;
        node.block.push(id, inst)?;
        self.parents.insert(id, bb);
        Some(id)
    }

    /// Get the basic block with the given id.
    pub fn get(&self, id: BlockId) -> Option<&Block> {
        self.blocks.node(&id).map(|node| &node.block)
    }

    /// Get the instruction with the given id.
    pub fn inst(&self, id: InstId) -> Option<&Inst> {
        self.get(self.parent(id)?)?.get(id)
    }

    /// Owning basic block of an instruction.
    pub fn parent(&self, id: InstId) -> Option<BlockId> {
        self.parents.get(&id).copied()
    }

    /// Number of basic blocks in the function.
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Check if the function has no basic blocks, i.e. a declaration.
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Iterator over the basic blocks in layout order.
    pub fn iter(&self) -> impl Iterator<Item = (BlockId, &Block)> + '_ {
        self.blocks.iter().map(|(&id, node)| (id, &node.block))
    }

    /// Iterator over all instructions in layout order.
    pub fn insts(&self) -> impl Iterator<Item = (InstId, &Inst)> + '_ {
        self.iter().flat_map(|(_, block)| block.insts())
    }

    /// The first basic block id in the function.
    pub fn entry(&self) -> Option<BlockId> {
        self.blocks.front_key().copied()
    }

    /// The basic block following `id` in layout order.
    pub fn layout_next(&self, id: BlockId) -> Option<BlockId> {
        let mut cursor = self.blocks.cursor(id);
        if cursor.is_null() {
            return None;
        }
        cursor.move_next();
        cursor.key().copied()
    }

    /// Control flow summary of a basic block.
    ///
    /// A block not ending in a terminator falls through to its layout
    /// successor; the last block of the layout falling off the end exits.
    pub fn control_flow(&self, id: BlockId) -> ControlFlowInst<BlockId> {
        let terminator = self.get(id).and_then(Block::terminator);
        match terminator.map(|inst| &inst.kind) {
            Some(InstKind::Branch {
                then_bb, else_bb, ..
            }) => ControlFlowInst::Branch(*then_bb, *else_bb),
            Some(InstKind::Jump(target)) => ControlFlowInst::Jump(*target),
            Some(InstKind::Return(_)) => ControlFlowInst::Return,
            Some(InstKind::Op) | None => match self.layout_next(id) {
                Some(next) => ControlFlowInst::Jump(next),
                None => ControlFlowInst::Return,
            },
        }
    }

    /// Next instruction in the same block satisfying `pred`.
    pub fn next_inst(&self, id: InstId, pred: impl Fn(&Inst) -> bool) -> Option<InstId> {
        self.get(self.parent(id)?)?.next_matching(id, pred)
    }

    /// Previous instruction in the same block satisfying `pred`.
    pub fn prev_inst(&self, id: InstId, pred: impl Fn(&Inst) -> bool) -> Option<InstId> {
        self.get(self.parent(id)?)?.prev_matching(id, pred)
    }
}

impl Display for Function {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "func {} {{", self.name)?;
        for (id, block) in self.iter() {
            writeln!(f, "bb{}: // {}", id, block.label)?;
            for (_, inst) in block.insts() {
                writeln!(f, "    {}", inst)?;
            }
        }
        writeln!(f, "}}")
    }
}

/// A set of functions analysed together.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Module {
    /// Functions, in the order their identifiers are assigned.
    pub functions: Vec<Function>,
}

impl Module {
    /// Create an empty module.
    pub fn new() -> Self {
        Self {
            functions: Vec::new(),
        }
    }

    /// Add a function to the module.
    pub fn push(&mut self, function: Function) {
        self.functions.push(function);
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn sample() -> (Function, [InstId; 4]) {
        let mut func = Function::new("@sample");
        let bb0 = func.new_block("entry");
        let bb1 = func.new_block("exit");
        let cmp = func
            .push_inst(
                bb0,
                Inst::op("cmp", vec![Operand::Value("%a".into()), Operand::Int(0)], None),
            )
            .unwrap();
        let dbg = func
            .push_inst(bb0, Inst::op("dbg.value", vec![Operand::Value("%a".into())], None))
            .unwrap();
        let br = func.push_inst(bb0, Inst::branch(None, bb1, bb1)).unwrap();
        let ret = func.push_inst(bb1, Inst::ret(None)).unwrap();
        (func, [cmp, dbg, br, ret])
    }

    #[test]
    fn navigation_skips_unmatched() {
        let (func, [cmp, dbg, br, _]) = sample();
        let real = |inst: &Inst| !inst.opcode.starts_with("dbg.");
        assert_eq!(func.prev_inst(br, real), Some(cmp));
        assert_eq!(func.prev_inst(br, |_| true), Some(dbg));
        assert_eq!(func.next_inst(cmp, real), Some(br));
        assert_eq!(func.prev_inst(cmp, real), None);
        assert_eq!(func.next_inst(br, real), None);
    }

    #[test]
    fn fallthrough_and_exit() {
        let mut func = Function::new("@fall");
        let bb0 = func.new_block("a");
        let bb1 = func.new_block("b");
        func.push_inst(bb0, Inst::op("nop", vec![], None)).unwrap();
        func.push_inst(bb1, Inst::op("nop", vec![], None)).unwrap();
        assert!(matches!(func.control_flow(bb0), ControlFlowInst::Jump(bb) if bb == bb1));
        assert!(matches!(func.control_flow(bb1), ControlFlowInst::Return));
    }

    #[test]
    fn uses_include_branch_condition() {
        let bb = BlockId::new(0);
        let inst = Inst::branch(Some(Operand::Value("%c".into())), bb, bb);
        assert_eq!(inst.uses().collect::<Vec<_>>(), vec!["%c"]);
        let inst = Inst::op(
            "add",
            vec![
                Operand::Value("%a".into()),
                Operand::Int(1),
                Operand::Symbol("@g".into()),
            ],
            Some("%b".into()),
        );
        assert_eq!(inst.uses().collect::<Vec<_>>(), vec!["%a"]);
    }

    #[test]
    fn parents_are_tracked() {
        let (func, [cmp, _, _, ret]) = sample();
        assert_eq!(func.parent(cmp), func.entry());
        assert_ne!(func.parent(ret), func.entry());
        assert_eq!(func.inst(ret).map(|inst| inst.opcode.as_str()), Some("ret"));
    }
}
