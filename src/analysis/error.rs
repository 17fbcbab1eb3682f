//! Error type for analysis.

use miette::Diagnostic;
use thiserror::Error;

/// Error type for analysis.
#[derive(Error, Debug, Diagnostic)]
pub enum AnalysisError {
    /// No function with the given ordinal.
    #[error("no function with ordinal {ordinal}")]
    #[diagnostic(code(reconv::unknown_function))]
    UnknownFunction {
        /// Position of the function in the module.
        ordinal: usize,
    },

    /// The function is a declaration.
    #[error("function `{function}` has no basic blocks")]
    #[diagnostic(code(reconv::declaration))]
    Declaration {
        /// Name of the function.
        function: String,
    },

    /// A substantive instruction was never numbered.
    #[error("instruction {inst} in `{function}` has no number")]
    #[diagnostic(
        code(reconv::unnumbered),
        help("the numbering and the analysed function are out of sync")
    )]
    Unnumbered {
        /// Name of the function.
        function: String,
        /// The instruction.
        inst: String,
    },
}
