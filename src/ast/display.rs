use std::fmt::{Display, Write};

use indenter::indented;

use super::*;

impl Display for Listing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, func) in self.functions.iter().enumerate() {
            if i != 0 {
                writeln!(f)?;
            }
            write!(f, "{}", func)?;
        }
        Ok(())
    }
}

impl Display for FuncDef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "func {} {{", self.name)?;
        for block in &self.blocks {
            write!(f, "{}", block)?;
        }
        writeln!(f, "}}")
    }
}

impl Display for BlockDef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "{}:", self.label)?;
        for inst in &self.insts {
            let mut f = indented(f).with_str("    ");
            writeln!(f, "{}", inst)?;
        }
        Ok(())
    }
}

impl Display for InstDef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InstDef::Op {
                opcode,
                operands,
                def,
            } => {
                write!(f, "{}", opcode)?;
                for (i, operand) in operands.iter().enumerate() {
                    let sep = if i == 0 { " " } else { ", " };
                    write!(f, "{}{}", sep, operand)?;
                }
                if let Some(def) = def {
                    write!(f, " -> {}", def)?;
                }
                Ok(())
            }
            InstDef::Branch {
                cond,
                then_bb,
                else_bb,
            } => {
                write!(f, "br ")?;
                if let Some(cond) = cond {
                    write!(f, "{}, ", cond)?;
                }
                write!(f, "{}, {}", then_bb, else_bb)
            }
            InstDef::Jump { target } => write!(f, "jmp {}", target),
            InstDef::Return { value } => match value {
                Some(value) => write!(f, "ret {}", value),
                None => write!(f, "ret"),
            },
        }
    }
}

impl Display for Operand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Operand::Value(name) => write!(f, "{}", name),
            Operand::Int(i) => write!(f, "{}", i),
            Operand::Symbol(name) => write!(f, "{}", name),
        }
    }
}
