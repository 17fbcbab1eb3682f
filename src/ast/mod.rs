//! Abstract Syntax Tree of the machine listing format.
#![allow(missing_docs)]

use std::ops::Range;

#[cfg(any(test, feature = "arbitrary"))]
pub mod arbitrary;
pub(crate) mod display;

/// Listing
///
/// ```text
/// Listing ::= {FuncDef}
/// ```
#[derive(Debug, Clone)]
pub struct Listing {
    pub functions: Vec<Span<FuncDef>>,
}

impl NonSpanned for Listing {}

/// Function Definition
///
/// ```text
/// FuncDef ::= "func" SYMBOL "{" {BlockDef} "}"
/// ```
#[derive(Debug, Clone)]
pub struct FuncDef {
    pub name: Span<String>,
    pub blocks: Vec<Span<BlockDef>>,
}

impl NonSpanned for FuncDef {}

/// Basic Block Definition
///
/// ```text
/// BlockDef ::= LABEL {InstDef}
/// ```
#[derive(Debug, Clone)]
pub struct BlockDef {
    pub label: Span<String>,
    pub insts: Vec<Span<InstDef>>,
}

impl NonSpanned for BlockDef {}

/// Instruction Definition
///
/// ```text
/// InstDef ::= "br" [Operand ","] IDENT "," IDENT
///           | "jmp" IDENT
///           | "ret" [Operand]
///           | IDENT [Operand {"," Operand}] ["->" VALUE]
/// ```
#[derive(Debug, Clone)]
pub enum InstDef {
    Op {
        opcode: Span<String>,
        operands: Vec<Operand>,
        def: Option<String>,
    },
    Branch {
        cond: Option<Operand>,
        then_bb: Span<String>,
        else_bb: Span<String>,
    },
    Jump {
        target: Span<String>,
    },
    Return {
        value: Option<Operand>,
    },
}

impl NonSpanned for InstDef {}

/// Operand
///
/// ```text
/// Operand ::= VALUE | INT | SYMBOL
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Operand {
    /// A value defined by some instruction, e.g. `%x`.
    Value(String),
    /// An integer immediate.
    Int(i64),
    /// A global symbol, e.g. `@counter`.
    Symbol(String),
}

impl Operand {
    /// Name of the value, if the operand is one.
    pub fn as_value(&self) -> Option<&str> {
        match self {
            Operand::Value(name) => Some(name),
            _ => None,
        }
    }
}

impl NonSpanned for String {}

/// Syntax unit with span information.
pub trait Spanned {
    /// Start position of the syntax unit.
    fn start_pos(&self) -> usize;

    /// End position of the syntax unit.
    fn end_pos(&self) -> usize;

    /// Range of the syntax unit.
    fn span(&self) -> Range<usize> {
        self.start_pos()..self.end_pos()
    }
}

/// AST nodes that do not themselves contain span information
/// and thus should be enclosed within the [`Span<T>`] struct.
pub trait NonSpanned {
    /// Convert the syntax unit into a spanned syntax unit.
    fn into_span(self, start: usize, end: usize) -> Span<Self>
    where
        Self: Sized,
    {
        Span {
            start,
            end,
            node: self,
        }
    }
}

/// Attach span information to a syntax unit.
#[derive(Debug, Clone)]
pub struct Span<T> {
    /// Start position of the syntax unit.
    pub start: usize,
    /// End position of the syntax unit.
    pub end: usize,
    /// Inner syntax unit.
    pub node: T,
}

impl<T> Spanned for Span<T> {
    fn start_pos(&self) -> usize {
        self.start
    }

    fn end_pos(&self) -> usize {
        self.end
    }
}

impl<T> std::fmt::Display for Span<T>
where
    T: std::fmt::Display,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", &self.node)
    }
}
