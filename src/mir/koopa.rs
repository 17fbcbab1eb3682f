//! Build machine IR from Koopa IR.
//!
//! Every Koopa instruction becomes one machine instruction. Binary operators
//! keep their operator name as the opcode, so `%0 = lt %a, 10` lowers to
//! `lt %a, 10 -> %0`. Values without a name get a synthesized `%.vN` name so
//! that def-use chains survive lowering.

use std::collections::HashMap;

use koopa::ir::{entities::ValueData, FunctionData, Program, Value, ValueKind};
use miette::Result;
#[allow(unused_imports)]
use nolog::*;

use super::{error::LowerError, BlockId, Function, Inst, Module, Operand};

/// Parse Koopa IR text and lower it to machine IR.
pub fn parse(input: &str) -> Result<Module> {
    let driver: koopa::front::Driver<_> = input.into();
    let program = driver
        .generate_program()
        .map_err(|_| LowerError::KoopaParse)?;
    Ok(build_mir(&program))
}

/// Lower a Koopa program to machine IR.
///
/// Function declarations are kept as empty functions so that function
/// identifiers follow the program's function layout.
pub fn build_mir(program: &Program) -> Module {
    let globals = program.borrow_values();
    let mut module = Module::new();
    for &func in program.func_layout() {
        let data = program.func(func);
        let lowering = Lowering {
            program,
            globals: &globals,
            func: data,
            names: synthesize_names(data),
        };
        module.push(lowering.build());
    }
    module
}

/// Names of every value that is defined inside the function.
fn synthesize_names(func: &FunctionData) -> HashMap<Value, String> {
    let dfg = func.dfg();
    let mut names = HashMap::new();
    let mut fresh = 0;
    let mut name_of = |data: &ValueData| match data.name() {
        Some(name) => name.clone(),
        None => {
            fresh += 1;
            format!("%.v{}", fresh - 1)
        }
    };
    for &param in func.params() {
        let name = name_of(dfg.value(param));
        names.insert(param, name);
    }
    for (_, node) in func.layout().bbs() {
        for &inst in node.insts().keys() {
            let data = dfg.value(inst);
            if !data.ty().is_unit() {
                let name = name_of(data);
                names.insert(inst, name);
            }
        }
    }
    names
}

struct Lowering<'a> {
    program: &'a Program,
    globals: &'a HashMap<Value, ValueData>,
    func: &'a FunctionData,
    names: HashMap<Value, String>,
}

impl Lowering<'_> {
    fn build(&self) -> Function {
        let mut func = Function::new(self.func.name());
        let dfg = self.func.dfg();

        let mut blocks = HashMap::new();
        for (i, (&bb, _)) in self.func.layout().bbs().iter().enumerate() {
            let label = match dfg.bb(bb).name() {
                Some(name) => name.trim_start_matches('%').to_string(),
                None => format!("bb{}", i),
            };
            blocks.insert(bb, func.new_block(label));
        }

        for (bb, node) in self.func.layout().bbs() {
            let id = blocks[bb];
            for &inst in node.insts().keys() {
                let inst = self.lower_inst(inst, &blocks);
                trace!(->[0] "KOOPA" => "{}: {}", func.name, inst);
                func.push_inst(id, inst);
            }
        }
        func
    }

    fn lower_inst(&self, inst: Value, blocks: &HashMap<koopa::ir::BasicBlock, BlockId>) -> Inst {
        let data = self.func.dfg().value(inst);
        let def = self.names.get(&inst).cloned();
        let op = |opcode: &str, operands: Vec<Operand>| Inst::op(opcode, operands, def.clone());
        match data.kind() {
            ValueKind::Branch(br) => Inst::branch(
                Some(self.operand(br.cond())),
                blocks[&br.true_bb()],
                blocks[&br.false_bb()],
            ),
            ValueKind::Jump(jump) => Inst::jump(blocks[&jump.target()]),
            ValueKind::Return(ret) => Inst::ret(ret.value().map(|value| self.operand(value))),
            ValueKind::Binary(bin) => {
                let opcode = format!("{:?}", bin.op()).to_lowercase();
                op(&opcode, vec![self.operand(bin.lhs()), self.operand(bin.rhs())])
            }
            ValueKind::Alloc(_) => op("alloc", vec![]),
            ValueKind::Load(load) => op("load", vec![self.operand(load.src())]),
            ValueKind::Store(store) => op(
                "store",
                vec![self.operand(store.value()), self.operand(store.dest())],
            ),
            ValueKind::GetPtr(gp) => op(
                "getptr",
                vec![self.operand(gp.src()), self.operand(gp.index())],
            ),
            ValueKind::GetElemPtr(gep) => op(
                "getelemptr",
                vec![self.operand(gep.src()), self.operand(gep.index())],
            ),
            ValueKind::Call(call) => {
                let callee = self.program.func(call.callee()).name().to_string();
                let mut operands = vec![Operand::Symbol(callee)];
                operands.extend(call.args().iter().map(|&arg| self.operand(arg)));
                op("call", operands)
            }
            _ => op("op", vec![]),
        }
    }

    fn operand(&self, value: Value) -> Operand {
        if let Some(name) = self.names.get(&value) {
            return Operand::Value(name.clone());
        }
        let data = match self.func.dfg().values().get(&value) {
            Some(data) => data,
            None => {
                let name = self.globals.get(&value).and_then(|data| data.name().clone());
                return Operand::Symbol(name.unwrap_or_else(|| "@.global".to_string()));
            }
        };
        match data.kind() {
            ValueKind::Integer(i) => Operand::Int(i.value() as i64),
            ValueKind::ZeroInit(_) | ValueKind::Undef(_) => Operand::Int(0),
            _ => Operand::Value(data.name().clone().unwrap_or_else(|| "%.undef".to_string())),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::common::cfg::ControlFlowInst;

    const DIAMOND: &str = r#"
decl @getint(): i32

fun @main(): i32 {
%entry:
  %x = call @getint()
  %c = lt %x, 10
  br %c, %then, %end
%then:
  %y = add %x, 1
  jump %end
%end:
  ret %x
}
"#;

    #[test]
    fn lowers_diamond() {
        let module = parse(DIAMOND).unwrap();
        assert_eq!(module.functions.len(), 2);

        let decl = &module.functions[0];
        assert_eq!(decl.name, "@getint");
        assert!(decl.is_empty());

        let main = &module.functions[1];
        assert_eq!(main.name, "@main");
        let blocks = main.iter().collect::<Vec<_>>();
        let labels = blocks.iter().map(|(_, b)| b.label.as_str()).collect::<Vec<_>>();
        assert_eq!(labels, vec!["entry", "then", "end"]);

        let entry = blocks[0].1.insts().map(|(_, i)| i).collect::<Vec<_>>();
        assert_eq!(entry[0].opcode, "call");
        assert_eq!(entry[0].operands[0], Operand::Symbol("@getint".into()));
        assert_eq!(entry[1].opcode, "lt");
        assert_eq!(entry[1].def.as_deref(), Some("%c"));
        assert_eq!(
            entry[1].operands,
            vec![Operand::Value("%x".into()), Operand::Int(10)]
        );
        assert_eq!(
            main.control_flow(blocks[0].0),
            ControlFlowInst::Branch(blocks[1].0, blocks[2].0)
        );
        assert_eq!(entry[2].uses().collect::<Vec<_>>(), vec!["%c"]);
    }

    #[test]
    fn unnamed_values_get_fresh_names() {
        let module = parse(
            r#"
fun @f(): i32 {
%entry:
  %0 = add 1, 2
  %1 = mul %0, 3
  ret %1
}
"#,
        )
        .unwrap();
        let func = &module.functions[0];
        let insts = func.insts().map(|(_, i)| i).collect::<Vec<_>>();
        let def = insts[0].def.clone().unwrap();
        assert_eq!(insts[1].uses().collect::<Vec<_>>(), vec![def.as_str()]);
    }

    #[test]
    fn rejects_malformed_input() {
        let err = parse("fun @f(): i32 {").unwrap_err();
        assert!(err.downcast_ref::<LowerError>().is_some());
    }
}
