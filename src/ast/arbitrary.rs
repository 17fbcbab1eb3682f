//! Arbitrary listing generator.
//!
//! Generated listings are well-formed: labels are unique, every branch
//! target exists and terminators only end blocks. Control flow is random, so
//! loops, unreachable blocks and several exits all show up.

use proptest::prelude::*;

use super::*;

/// Opcodes of ordinary instructions, meta instructions included.
const OPCODES: &[&str] = &[
    "add",
    "mov",
    "cmp",
    "icmp.lt",
    "load",
    "store",
    "dbg.value",
    "cfi.def_cfa",
    "kill",
    "implicit_def",
];

/// Generate an arbitrary listing.
pub fn arb_listing() -> impl Strategy<Value = Listing> {
    (1usize..4)
        .prop_flat_map(|n| {
            (0..n)
                .map(|i| arb_func_def(format!("@f{}", i)))
                .collect::<Vec<_>>()
        })
        .prop_map(|functions| Listing {
            functions: functions.into_iter().map(|f| f.into_span(0, 0)).collect(),
        })
}

/// Generate an arbitrary function definition.
pub fn arb_func_def(name: String) -> impl Strategy<Value = FuncDef> {
    (1usize..8)
        .prop_flat_map(|n| prop::collection::vec(arb_block(n), n))
        .prop_map(move |blocks| FuncDef {
            name: name.clone().into_span(0, 0),
            blocks: blocks
                .into_iter()
                .enumerate()
                .map(|(i, insts)| {
                    BlockDef {
                        label: label(i),
                        insts,
                    }
                    .into_span(0, 0)
                })
                .collect(),
        })
}

/// Generate the instructions of a block in a function of `blocks` blocks.
pub fn arb_block(blocks: usize) -> impl Strategy<Value = Vec<Span<InstDef>>> {
    (prop::collection::vec(arb_op(), 0..5), arb_terminator(blocks)).prop_map(|(ops, term)| {
        ops.into_iter()
            .chain(term)
            .map(|inst| inst.into_span(0, 0))
            .collect()
    })
}

/// Generate an arbitrary ordinary instruction.
pub fn arb_op() -> impl Strategy<Value = InstDef> {
    (
        prop::sample::select(OPCODES),
        prop::collection::vec(arb_operand(), 0..3),
        prop::option::of(arb_value()),
    )
        .prop_map(|(opcode, operands, def)| InstDef::Op {
            opcode: opcode.to_string().into_span(0, 0),
            operands,
            def,
        })
}

/// Generate an arbitrary terminator, `None` to fall through.
pub fn arb_terminator(blocks: usize) -> impl Strategy<Value = Option<InstDef>> {
    let target = move || (0..blocks).prop_map(label);
    let cond = prop::option::of(arb_value().prop_map(Operand::Value));
    prop_oneof![
        3 => (cond, target(), target()).prop_map(|(cond, then_bb, else_bb)| {
            Some(InstDef::Branch { cond, then_bb, else_bb })
        }),
        2 => target().prop_map(|target| Some(InstDef::Jump { target })),
        1 => prop::option::of(arb_operand()).prop_map(|value| Some(InstDef::Return { value })),
        1 => Just(None),
    ]
}

/// Generate an arbitrary operand.
pub fn arb_operand() -> impl Strategy<Value = Operand> {
    prop_oneof![
        3 => arb_value().prop_map(Operand::Value),
        1 => (-100i64..100).prop_map(Operand::Int),
        1 => Just(Operand::Symbol("@g".to_string())),
    ]
}

/// Generate a value name from a small pool, so that def-use chains form.
pub fn arb_value() -> impl Strategy<Value = String> {
    (0u8..6).prop_map(|i| format!("%v{}", i))
}

fn label(i: usize) -> Span<String> {
    format!("b{}", i).into_span(0, 0)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::analysis::{control::ControlRegion, isa::IsaKind, Analyzer};

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn printed_listing_reparses(listing in arb_listing()) {
            let text = listing.to_string();
            let module = crate::parse(&text);
            prop_assert!(module.is_ok(), "failed to parse:\n{}", text);
        }

        #[test]
        fn analysis_is_deterministic(listing in arb_listing(), generic in any::<bool>()) {
            let module = crate::parse(&listing.to_string()).unwrap();
            let isa = if generic { IsaKind::Generic } else { IsaKind::X86 };
            let options = crate::Options { isa, ..crate::Options::default() };
            let first = crate::analyze_module(&module, &options).unwrap();
            let second = crate::analyze_module(&module, &options).unwrap();
            prop_assert_eq!(first, second);
        }

        #[test]
        fn dependents_are_closed_and_substantive(listing in arb_listing()) {
            let module = crate::parse(&listing.to_string()).unwrap();
            let isa = IsaKind::X86.isa();
            let mut analyzer = Analyzer::new(&module, isa);
            for (ordinal, func) in module.functions.iter().enumerate() {
                let deps = analyzer.analyze_dependencies(ordinal).unwrap();
                let numbering = analyzer.analyze_numbering(ordinal).unwrap();
                let cfg = analyzer.analyze_cfg(ordinal).unwrap();
                for branch in &deps.branches {
                    let region = ControlRegion::analyze(&cfg, func, branch.block, branch.point);
                    prop_assert!(!region.blocks.contains(&branch.point));
                    for id in region.insts {
                        let inst = func.inst(id).unwrap();
                        match numbering.number(id) {
                            Some(n) => {
                                prop_assert!(branch.dependents.contains(&n));
                            }
                            None => {
                                prop_assert!(!isa.is_substantive(inst));
                            }
                        }
                    }
                    for &n in &branch.dependents {
                        let id = numbering.inst(n).unwrap();
                        prop_assert!(isa.is_substantive(func.inst(id).unwrap()));
                    }
                }
            }
        }
    }
}
