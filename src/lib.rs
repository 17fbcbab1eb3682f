//! Branch reconvergence and dependency detection.
//!
//! For every conditional branch of a function, the analysis finds the block
//! where its paths rejoin (the immediate post-dominator of the branch block)
//! and every instruction whose execution or value depends on the branch.
#![deny(missing_docs)]

use lalrpop_util::lalrpop_mod;

#[macro_use]
#[doc(hidden)]
pub mod logger_setup {
    #[macro_export]
    #[cfg(feature = "trace")]
    macro_rules! color {
        ( [trace] ) => {
            "\x1B[34m"
        };
        ( [debug] ) => {
            "\x1B[36m"
        };
        ( [info]  ) => {
            "\x1B[32m"
        };
        ( [warn]  ) => {
            "\x1B[33m"
        };
        ( [error] ) => {
            "\x1B[31m"
        };
        ( [crit]  ) => {
            "\x1B[35m"
        };
        ( [sep]   ) => {
            "\x1B[1m\x1B[2m"
        }; // +bold +dim
        ( [msg]   ) => {
            ""
        }; // default term font color
        ( [from]  ) => {
            "\x1B[90m\x1B[3m"
        }; // `[src/main.rs 101:5]` in `location_style_classic`
        ( [sep2]  ) => {
            "\x1B[90m\x1B[2m"
        }; // sep2 in default style
        ( [sep3]  ) => {
            "\x1B[90m\x1B[2m"
        }; // sep3 in default style
        ( [line]  ) => {
            "\x1B[38;5;67m\x1B[1m\x1B[2m"
        }; // line number in default style
        ( [key]   ) => {
            "\x1B[3m\x1B[1m"
        }; // +italic +bold
        ( [value] ) => {
            ""
        }; // default term font color
        ( [rm]    ) => {
            "\x1B[0m"
        }; // remove previous colors
    }
}

pub mod analysis;
pub mod ast;
pub mod common;
pub mod mir;
pub mod report;
pub mod trace;
pub mod utils;

lalrpop_mod!(grammar);

use miette::{Diagnostic, Result, SourceSpan};
use thiserror::Error;

use crate::analysis::{dependency::FunctionDependencies, isa::IsaKind, Analyzer};
use crate::mir::Module;

/// Parse error
#[derive(Debug, Error, Diagnostic)]
pub enum ParseError {
    /// Invalid token
    #[error("invalid token")]
    #[diagnostic(code(reconv::invalid_token))]
    InvalidToken {
        /// Span of the invalid token
        #[label("invalid token")]
        span: SourceSpan,
    },

    /// Unexpected end of file
    #[error("unexpected end of file")]
    #[diagnostic(code(reconv::unexpected_eof))]
    UnexpectedEof {
        /// Expected tokens
        #[help]
        expected: String,
        /// Span of the unexpected end of file
        #[label("unexpected end of file")]
        span: SourceSpan,
    },

    /// Unexpected token
    #[error("unexpected token")]
    #[diagnostic(code(reconv::unexpected_token))]
    UnexpectedToken {
        /// Expected tokens
        #[help]
        expected: String,
        /// Span of the unexpected token
        #[label("unexpected token")]
        span: SourceSpan,
    },

    /// Extra token
    #[error("extra token")]
    #[diagnostic(code(reconv::extra_token))]
    ExtraToken {
        /// Span of the extra token
        #[label("extra token")]
        span: SourceSpan,
    },

    /// Rejected literal
    #[error("{message}")]
    #[diagnostic(code(reconv::invalid_literal))]
    User {
        /// What is wrong with the literal
        message: String,
    },
}

/// Analysis options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Options {
    /// Emit the diagnostic stream. Has no effect on the report.
    pub verbose: bool,
    /// Instruction set used to classify instructions.
    pub isa: IsaKind,
}

/// Parse a listing into machine IR.
pub fn parse(input: &str) -> Result<Module> {
    let ast = grammar::ListingParser::new().parse(input).map_err(|e| {
        use lalrpop_util::ParseError as LalrpopError;

        match e {
            LalrpopError::InvalidToken { location } => ParseError::InvalidToken {
                span: SourceSpan::new(location.into(), 1.into()),
            },
            LalrpopError::UnrecognizedEof { location, expected } => ParseError::UnexpectedEof {
                expected: format!("expect one of: {}", expected.join(", ")),
                span: SourceSpan::new(location.into(), 1.into()),
            },
            LalrpopError::UnrecognizedToken { token, expected } => ParseError::UnexpectedToken {
                expected: if !expected.is_empty() {
                    format!("expect one of: {}", expected.join(", "))
                } else {
                    "expect nothing".to_string()
                },
                span: (token.0..token.2).into(),
            },
            LalrpopError::ExtraToken { token } => ParseError::ExtraToken {
                span: (token.0..token.2).into(),
            },
            LalrpopError::User { error } => ParseError::User {
                message: error.to_string(),
            },
        }
    })?;
    ast.build_mir()
}

/// Parse Koopa IR into machine IR.
pub fn parse_koopa(input: &str) -> Result<Module> {
    mir::koopa::parse(input)
}

/// Analyse the dependents of every branch of every function in a module.
pub fn analyze_module(module: &Module, options: &Options) -> Result<Vec<FunctionDependencies>> {
    let mut analyzer = Analyzer::new(module, options.isa.isa());
    (0..module.functions.len())
        .map(|ordinal| analyzer.analyze_dependencies(ordinal))
        .collect()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parse_errors() {
        let err = parse("func @f {\nentry:\n    br ,\n}\n").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ParseError>(),
            Some(ParseError::UnexpectedToken { .. })
        ));
        let err = parse("func @f {\nentry:\n").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ParseError>(),
            Some(ParseError::UnexpectedEof { .. })
        ));
        let err = parse("func @f {\nentry:\n    mov 99999999999999999999\n}\n").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ParseError>(),
            Some(ParseError::User { .. })
        ));
        let err = parse("func @f { $ }").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ParseError>(),
            Some(ParseError::InvalidToken { .. })
        ));
    }

    #[test]
    fn comments_are_skipped() {
        let module = parse("// header\nfunc @f {\nentry: // first\n    ret\n}\n").unwrap();
        assert_eq!(module.functions[0].insts().count(), 1);
    }

    #[test]
    fn koopa_and_listing_agree() {
        let listing = parse(
            "func @main {\nentry:\n    lt 1, 2 -> %c\n    br %c, a, b\na:\n    jmp b\nb:\n    ret 0\n}\n",
        )
        .unwrap();
        let koopa = parse_koopa(
            "fun @main(): i32 {\n%entry:\n  %c = lt 1, 2\n  br %c, %a, %b\n%a:\n  jump %b\n%b:\n  ret 0\n}\n",
        )
        .unwrap();
        let options = Options::default();
        assert_eq!(
            analyze_module(&listing, &options).unwrap()[0].branches,
            analyze_module(&koopa, &options).unwrap()[0].branches
        );
    }
}
