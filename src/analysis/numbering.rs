//! Instruction numbering.
//!
//! Substantive instructions are numbered from zero in layout order. Meta
//! instructions are skipped and never receive a number. Together with the
//! function identifier, the number forms the location record that lets a
//! trace sample be mapped back to an instruction.

use std::collections::HashMap;

#[allow(unused_imports)]
use nolog::*;

use super::isa::Isa;
use crate::mir::{Function, InstId};

/// Offset added to a function's ordinal to form its identifier.
pub const FUNCTION_ID_BASE: u32 = 10000;

/// Identifier of the function at the given position of a module.
pub fn function_id(ordinal: usize) -> u32 {
    FUNCTION_ID_BASE + ordinal as u32
}

/// Location record of a substantive instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DebugLoc {
    /// Number of the instruction within its function.
    pub index: u32,
    /// Identifier of the function.
    pub function: u32,
}

/// Numbering of the substantive instructions of a function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstNumbering {
    function_id: u32,
    numbers: HashMap<InstId, u32>,
    order: Vec<InstId>,
}

impl InstNumbering {
    /// Number the instructions of a function.
    pub fn analyze(func: &Function, function_id: u32, isa: &dyn Isa) -> Self {
        let mut numbers = HashMap::new();
        let mut order = Vec::new();
        for (id, inst) in func.insts() {
            if !isa.is_substantive(inst) {
                trace!(->[0] "NUM " => "skip meta `{}`", inst);
                continue;
            }
            let number = order.len() as u32;
            trace!(->[0] "NUM " => "{} `{}` -> {}", id, inst, number);
            numbers.insert(id, number);
            order.push(id);
        }
        Self {
            function_id,
            numbers,
            order,
        }
    }

    /// Identifier of the numbered function.
    pub fn function_id(&self) -> u32 {
        self.function_id
    }

    /// Number of an instruction, `None` for meta instructions.
    pub fn number(&self, id: InstId) -> Option<u32> {
        self.numbers.get(&id).copied()
    }

    /// Instruction with the given number.
    pub fn inst(&self, number: u32) -> Option<InstId> {
        self.order.get(number as usize).copied()
    }

    /// Location record of an instruction, `None` for meta instructions.
    pub fn location(&self, id: InstId) -> Option<DebugLoc> {
        self.number(id).map(|index| DebugLoc {
            index,
            function: self.function_id,
        })
    }

    /// Number of substantive instructions.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Whether the function has no substantive instructions.
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Numbered instructions in layout order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, InstId)> + '_ {
        self.order
            .iter()
            .enumerate()
            .map(|(number, &id)| (number as u32, id))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::analysis::isa::X86;

    #[test]
    fn meta_instructions_are_skipped() {
        let module = crate::parse(
            r#"
            func @f {
            entry:
                cfi.def_cfa 16
                mov 1 -> %a
                dbg.value %a
                br %a, exit, exit
            exit:
                kill %a
                ret
            }
            "#,
        )
        .unwrap();
        let func = &module.functions[0];
        let numbering = InstNumbering::analyze(func, function_id(3), &X86);
        assert_eq!(numbering.len(), 3);
        assert_eq!(numbering.function_id(), 10003);

        let opcodes = numbering
            .iter()
            .map(|(_, id)| func.inst(id).unwrap().opcode.as_str())
            .collect::<Vec<_>>();
        assert_eq!(opcodes, vec!["mov", "br", "ret"]);

        let ret = numbering.inst(2).unwrap();
        assert_eq!(func.inst(ret).unwrap().opcode, "ret");
        assert_eq!(
            numbering.location(ret),
            Some(DebugLoc {
                index: 2,
                function: 10003
            })
        );
        let (meta, _) = func.insts().next().unwrap();
        assert_eq!(numbering.number(meta), None);
        assert_eq!(numbering.location(meta), None);
    }

    #[test]
    fn empty_function() {
        let func = Function::new("@decl");
        let numbering = InstNumbering::analyze(&func, function_id(0), &X86);
        assert!(numbering.is_empty());
        assert_eq!(numbering.inst(0), None);
    }
}
