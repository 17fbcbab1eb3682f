//! Error type for building machine IR.

use miette::{Diagnostic, SourceSpan};
use thiserror::Error;

/// Error type for building machine IR.
#[derive(Error, Debug, Diagnostic)]
pub enum LowerError {
    /// function defined twice
    #[error("function `{name}` is defined more than once")]
    #[diagnostic(code(reconv::duplicate_function))]
    DuplicateFunction {
        /// Name of the function.
        name: String,
        /// Span of the second definition.
        #[label("redefined here")]
        span: SourceSpan,
    },

    /// label defined twice
    #[error("label `{label}` is defined more than once")]
    #[diagnostic(code(reconv::duplicate_label))]
    DuplicateLabel {
        /// The label.
        label: String,
        /// Span of the second definition.
        #[label("redefined here")]
        span: SourceSpan,
    },

    /// branch to a missing block
    #[error("unknown label `{label}`")]
    #[diagnostic(code(reconv::unknown_label))]
    UnknownLabel {
        /// The label.
        label: String,
        /// Span of the reference.
        #[label("no block with this label")]
        span: SourceSpan,
    },

    /// instruction after a terminator
    #[error("instruction after the end of a basic block")]
    #[diagnostic(
        code(reconv::inst_after_terminator),
        help("start a new block with a label before this instruction")
    )]
    InstAfterTerminator {
        /// Span of the offending instruction.
        #[label("unreachable instruction")]
        span: SourceSpan,
    },

    /// Koopa IR could not be parsed
    #[error("failed to parse Koopa IR")]
    #[diagnostic(code(reconv::koopa_parse))]
    KoopaParse,
}
