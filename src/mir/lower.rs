//! Build machine IR from a parsed listing.
//!
//! Labels are resolved in two passes: all blocks of a function are created
//! first so that branches may refer to blocks laid out after them.

use std::collections::{HashMap, HashSet};

use miette::Result;
#[allow(unused_imports)]
use nolog::*;

use super::{error::LowerError, BlockId, Function, Inst, Module};
use crate::ast::{self, Span, Spanned};

impl ast::Listing {
    /// Build machine IR from the listing.
    pub fn build_mir(self) -> Result<Module> {
        let mut module = Module::new();
        let mut names = HashSet::new();
        for func in self.functions {
            let name = &func.node.name;
            if !names.insert(name.node.clone()) {
                return Err(LowerError::DuplicateFunction {
                    name: name.node.clone(),
                    span: name.span().into(),
                }
                .into());
            }
            module.push(func.node.build_mir()?);
        }
        Ok(module)
    }
}

impl ast::FuncDef {
    /// Build machine IR for a single function.
    pub fn build_mir(self) -> Result<Function> {
        let mut func = Function::new(self.name.node);

        let mut labels = HashMap::new();
        for block in &self.blocks {
            let label = &block.node.label;
            if labels.contains_key(&label.node) {
                return Err(LowerError::DuplicateLabel {
                    label: label.node.clone(),
                    span: label.span().into(),
                }
                .into());
            }
            let bb = func.new_block(label.node.clone());
            trace!(->[0] "MIR " => "block `{}` -> bb{}", label.node, bb);
            labels.insert(label.node.clone(), bb);
        }

        let resolve = |label: &Span<String>| -> Result<BlockId, LowerError> {
            labels
                .get(&label.node)
                .copied()
                .ok_or_else(|| LowerError::UnknownLabel {
                    label: label.node.clone(),
                    span: label.span().into(),
                })
        };

        for block in self.blocks {
            let bb = resolve(&block.node.label)?;
            let mut terminated = false;
            for inst in block.node.insts {
                if terminated {
                    return Err(LowerError::InstAfterTerminator {
                        span: inst.span().into(),
                    }
                    .into());
                }
                let inst = match inst.node {
                    ast::InstDef::Op {
                        opcode,
                        operands,
                        def,
                    } => Inst::op(opcode.node, operands, def),
                    ast::InstDef::Branch {
                        cond,
                        then_bb,
                        else_bb,
                    } => Inst::branch(cond, resolve(&then_bb)?, resolve(&else_bb)?),
                    ast::InstDef::Jump { target } => Inst::jump(resolve(&target)?),
                    ast::InstDef::Return { value } => Inst::ret(value),
                };
                terminated = inst.is_terminator();
                func.push_inst(bb, inst);
            }
        }

        Ok(func)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::common::cfg::ControlFlowInst;

    fn lower_err(input: &str) -> LowerError {
        let err = crate::parse(input).unwrap_err();
        match err.downcast::<LowerError>() {
            Ok(err) => err,
            Err(err) => panic!("unexpected error: {:?}", err),
        }
    }

    #[test]
    fn forward_references_resolve() {
        let module = crate::parse(
            r#"
            func @main {
            entry:
                icmp.lt %a, 10 -> %c
                br %c, then, done
            then:
                add %a, 1 -> %b
            done:
                ret
            }
            "#,
        )
        .unwrap();
        let func = &module.functions[0];
        assert_eq!(func.name, "@main");
        let blocks = func.iter().map(|(bb, _)| bb).collect::<Vec<_>>();
        assert_eq!(blocks.len(), 3);
        assert_eq!(
            func.control_flow(blocks[0]),
            ControlFlowInst::Branch(blocks[1], blocks[2])
        );
        // `then` falls through into `done`.
        assert_eq!(func.control_flow(blocks[1]), ControlFlowInst::Jump(blocks[2]));
        assert_eq!(func.control_flow(blocks[2]), ControlFlowInst::Return);
    }

    #[test]
    fn unknown_label() {
        let err = lower_err("func @f {\nentry:\n    jmp nowhere\n}\n");
        assert!(matches!(err, LowerError::UnknownLabel { label, .. } if label == "nowhere"));
    }

    #[test]
    fn duplicate_label() {
        let err = lower_err("func @f {\na:\n    ret\na:\n    ret\n}\n");
        assert!(matches!(err, LowerError::DuplicateLabel { label, .. } if label == "a"));
    }

    #[test]
    fn duplicate_function() {
        let err = lower_err("func @f {\na:\n    ret\n}\nfunc @f {\nb:\n    ret\n}\n");
        assert!(matches!(err, LowerError::DuplicateFunction { name, .. } if name == "@f"));
    }

    #[test]
    fn instruction_after_terminator() {
        let err = lower_err("func @f {\na:\n    ret\n    nop\n}\n");
        assert!(matches!(err, LowerError::InstAfterTerminator { .. }));
    }

    #[test]
    fn empty_function_is_a_declaration() {
        let module = crate::parse("func @decl { }").unwrap();
        assert!(module.functions[0].is_empty());
    }
}
