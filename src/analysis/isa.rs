//! Instruction set classification.
//!
//! The analysis never looks at opcodes directly. Whether an instruction is
//! real code or a debug/meta annotation, and whether a compare is fused
//! with the branch following it, is a property of the target.

use std::{fmt::Display, str::FromStr};

use crate::mir::{Inst, InstKind};

/// Instruction classification for one target.
pub trait Isa {
    /// Short name of the target.
    fn name(&self) -> &'static str;

    /// Whether the opcode is a meta instruction with no runtime semantics.
    fn is_meta(&self, opcode: &str) -> bool;

    /// Whether a flag-setting compare and the conditional branch after it
    /// form one unit, even without a data edge between them.
    fn fuses_compare_and_branch(&self) -> bool;

    /// Whether the instruction has real execution semantics.
    fn is_substantive(&self, inst: &Inst) -> bool {
        inst.is_terminator() || !self.is_meta(&inst.opcode)
    }

    /// Whether the instruction is a two-way conditional branch.
    fn is_conditional_branch(&self, inst: &Inst) -> bool {
        matches!(inst.kind, InstKind::Branch { .. })
    }
}

/// x86-like target.
///
/// Debug values, CFI directives, `kill` and `implicit_def` pseudo
/// instructions are meta. `cmp`/`test` set flags consumed by the following
/// `jcc`, so compare and branch are fused.
#[derive(Debug, Clone, Copy, Default)]
pub struct X86;

impl Isa for X86 {
    fn name(&self) -> &'static str {
        "x86"
    }

    fn is_meta(&self, opcode: &str) -> bool {
        opcode.starts_with("dbg.")
            || opcode.starts_with("cfi.")
            || opcode == "kill"
            || opcode == "implicit_def"
    }

    fn fuses_compare_and_branch(&self) -> bool {
        true
    }
}

/// Target with explicit branch conditions and only debug meta instructions.
#[derive(Debug, Clone, Copy, Default)]
pub struct Generic;

impl Isa for Generic {
    fn name(&self) -> &'static str {
        "generic"
    }

    fn is_meta(&self, opcode: &str) -> bool {
        opcode.starts_with("dbg.")
    }

    fn fuses_compare_and_branch(&self) -> bool {
        false
    }
}

/// Selectable target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IsaKind {
    /// [`X86`].
    #[default]
    X86,
    /// [`Generic`].
    Generic,
}

impl IsaKind {
    /// The classification of the target.
    pub fn isa(self) -> &'static dyn Isa {
        match self {
            IsaKind::X86 => &X86,
            IsaKind::Generic => &Generic,
        }
    }
}

impl FromStr for IsaKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "x86" => Ok(IsaKind::X86),
            "generic" => Ok(IsaKind::Generic),
            _ => Err(format!("unknown instruction set `{}`", s)),
        }
    }
}

impl Display for IsaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.isa().name())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::mir::{BlockId, Inst};

    #[test]
    fn meta_opcodes() {
        let isa = IsaKind::X86.isa();
        assert!(!isa.is_substantive(&Inst::op("dbg.value", vec![], None)));
        assert!(!isa.is_substantive(&Inst::op("cfi.def_cfa", vec![], None)));
        assert!(!isa.is_substantive(&Inst::op("kill", vec![], None)));
        assert!(isa.is_substantive(&Inst::op("cmp", vec![], None)));

        let isa = IsaKind::Generic.isa();
        assert!(isa.is_substantive(&Inst::op("kill", vec![], None)));
        assert!(!isa.is_substantive(&Inst::op("dbg.declare", vec![], None)));
    }

    #[test]
    fn branches() {
        let bb = BlockId::new(0);
        let isa = X86;
        assert!(isa.is_conditional_branch(&Inst::branch(None, bb, bb)));
        assert!(!isa.is_conditional_branch(&Inst::jump(bb)));
        assert!(isa.is_substantive(&Inst::ret(None)));
    }

    #[test]
    fn parse_kind() {
        assert_eq!("x86".parse::<IsaKind>(), Ok(IsaKind::X86));
        assert_eq!("generic".parse::<IsaKind>(), Ok(IsaKind::Generic));
        assert!("arm".parse::<IsaKind>().is_err());
        assert_eq!(IsaKind::default().to_string(), "x86");
    }
}
