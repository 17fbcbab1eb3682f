//! Dependency reports.
//!
//! A report is a sequence of branch records:
//!
//! ```text
//! * <branch> <function id>
//! <dependent> <function id>
//! ...
//! ---
//! ```
//!
//! Reports are appended to, so one file accumulates the records of every
//! function analysed in a run, and of every run.

use std::{
    ffi::OsStr,
    fmt::{Display, Write as _},
    fs::OpenOptions,
    io::{self, Write},
};

use miette::{Diagnostic, SourceSpan};
use thiserror::Error;

use crate::{
    analysis::{dependency::FunctionDependencies, isa::Isa, numbering::InstNumbering},
    mir::{Function, Module},
};

/// Record of one analysed branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchRecord {
    /// Number of the branch.
    pub branch: u32,
    /// Identifier of the function owning the branch.
    pub function: u32,
    /// Numbers of the dependents, in report order.
    pub dependents: Vec<u32>,
}

impl BranchRecord {
    /// Records of every analysed branch of a function, in layout order.
    pub fn from_function(deps: &FunctionDependencies) -> Vec<Self> {
        deps.branches
            .iter()
            .map(|b| Self {
                branch: b.branch,
                function: deps.function_id,
                dependents: b.dependents.iter().copied().collect(),
            })
            .collect()
    }
}

impl Display for BranchRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "* {} {}", self.branch, self.function)?;
        for dep in &self.dependents {
            writeln!(f, "{} {}", dep, self.function)?;
        }
        writeln!(f, "---")
    }
}

/// Writer of report records.
pub struct ReportWriter<W> {
    writer: W,
}

impl<W: Write> ReportWriter<W> {
    /// Create a report writer.
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Write the records of one function.
    ///
    /// The records are rendered first and written with a single call, so
    /// the records of a function never interleave with other output.
    pub fn write_function(&mut self, deps: &FunctionDependencies) -> io::Result<()> {
        let mut buf = String::new();
        for record in BranchRecord::from_function(deps) {
            // Writing to a `String` cannot fail.
            let _ = write!(buf, "{}", record);
        }
        if buf.is_empty() {
            return Ok(());
        }
        self.writer.write_all(buf.as_bytes())?;
        self.writer.flush()
    }

    /// Unwrap the underlying writer.
    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl ReportWriter<Box<dyn Write>> {
    /// Open a report for appending, creating the file if needed. `-` is the
    /// standard output.
    pub fn append(path: &OsStr) -> io::Result<Self> {
        let writer: Box<dyn Write> = if path == "-" {
            Box::new(io::stdout())
        } else {
            Box::new(OpenOptions::new().create(true).append(true).open(path)?)
        };
        Ok(Self::new(writer))
    }
}

/// Error reading a report back.
#[derive(Error, Debug, Diagnostic)]
pub enum ReportError {
    /// A line that is neither a header, a dependent nor a terminator.
    #[error("malformed report line {line}")]
    #[diagnostic(
        code(reconv::report::malformed),
        help("expected `* <branch> <function>`, `<instruction> <function>` or `---`")
    )]
    Malformed {
        /// Line number, starting at 1.
        line: usize,
        /// Span of the line.
        #[label("here")]
        span: SourceSpan,
    },

    /// A header inside an open record.
    #[error("record opened before the previous one was closed")]
    #[diagnostic(code(reconv::report::unterminated))]
    Unterminated {
        /// Line number, starting at 1.
        line: usize,
        /// Span of the line.
        #[label("missing `---` before this line")]
        span: SourceSpan,
    },

    /// A dependent or terminator outside a record.
    #[error("line {line} is outside any record")]
    #[diagnostic(code(reconv::report::orphan))]
    Orphan {
        /// Line number, starting at 1.
        line: usize,
        /// Span of the line.
        #[label("no `*` header before this line")]
        span: SourceSpan,
    },

    /// A dependent of another function than its branch.
    #[error("dependent belongs to function {found}, branch to {expected}")]
    #[diagnostic(code(reconv::report::function_mismatch))]
    FunctionMismatch {
        /// Function of the branch.
        expected: u32,
        /// Function of the dependent.
        found: u32,
        /// Span of the line.
        #[label("wrong function")]
        span: SourceSpan,
    },

    /// The report ends inside a record.
    #[error("report ends inside a record")]
    #[diagnostic(code(reconv::report::unexpected_eof))]
    UnexpectedEof {
        /// Span of the end of input.
        #[label("missing `---`")]
        span: SourceSpan,
    },
}

/// Read a report.
///
/// Blank lines are ignored.
pub fn parse_report(input: &str) -> Result<Vec<BranchRecord>, ReportError> {
    let mut records = Vec::new();
    let mut current: Option<BranchRecord> = None;
    let mut offset = 0;

    for (i, raw) in input.split_inclusive('\n').enumerate() {
        let line = i + 1;
        let text = raw.trim_end();
        let span: SourceSpan = (offset..offset + text.len()).into();
        offset += raw.len();
        if text.is_empty() {
            continue;
        }

        if text == "---" {
            let record = current.take().ok_or(ReportError::Orphan { line, span })?;
            records.push(record);
            continue;
        }

        let (header, body) = match text.strip_prefix('*') {
            Some(body) => (true, body),
            None => (false, text),
        };
        let (number, function) =
            parse_pair(body).ok_or(ReportError::Malformed { line, span })?;

        if header {
            if current.is_some() {
                return Err(ReportError::Unterminated { line, span });
            }
            current = Some(BranchRecord {
                branch: number,
                function,
                dependents: Vec::new(),
            });
        } else {
            let record = current.as_mut().ok_or(ReportError::Orphan { line, span })?;
            if record.function != function {
                return Err(ReportError::FunctionMismatch {
                    expected: record.function,
                    found: function,
                    span,
                });
            }
            record.dependents.push(number);
        }
    }

    if current.is_some() {
        return Err(ReportError::UnexpectedEof {
            span: (input.len()..input.len()).into(),
        });
    }
    Ok(records)
}

fn parse_pair(s: &str) -> Option<(u32, u32)> {
    let mut fields = s.split_whitespace();
    let first = fields.next()?.parse().ok()?;
    let second = fields.next()?.parse().ok()?;
    match fields.next() {
        Some(_) => None,
        None => Some((first, second)),
    }
}

/// Writer of the human-readable diagnostic stream.
pub struct Diagnostics<W> {
    writer: W,
}

impl<W: Write> Diagnostics<W> {
    /// Create a diagnostic writer.
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Dump the numbering, reconvergence points and dependents of a function.
    pub fn write_function(
        &mut self,
        func: &Function,
        numbering: &InstNumbering,
        deps: &FunctionDependencies,
    ) -> io::Result<()> {
        let w = &mut self.writer;
        writeln!(w, "function {} (id {})", func.name, deps.function_id)?;
        for (bb, block) in func.iter() {
            writeln!(w, "  bb{} {}:", bb, block.label)?;
            for (id, inst) in block.insts() {
                match numbering.number(id) {
                    Some(number) => writeln!(w, "    {:>4}  {}", number, inst)?,
                    None => writeln!(w, "    {:>4}  {}", "-", inst)?,
                }
            }
        }
        for branch in &deps.branches {
            writeln!(
                w,
                "  branch {} in bb{} reconverges at bb{}",
                branch.branch, branch.block, branch.point
            )?;
            writeln!(w, "    control: {}", join(&branch.control))?;
            writeln!(w, "    data: {}", join(&branch.data))?;
            writeln!(w, "    dependents: {}", join(&branch.dependents))?;
        }
        for branch in &deps.skipped {
            writeln!(
                w,
                "  branch {} in bb{} has no reconvergence point, skipped",
                branch.branch, branch.block
            )?;
        }
        let s = &deps.summary;
        writeln!(
            w,
            "  summary: {} instructions, {} branches ({} skipped), {} dependent, {} independent",
            s.instructions, s.branches, s.skipped, s.dependent, s.independent
        )
    }
}

fn join<'a>(numbers: impl IntoIterator<Item = &'a u32>) -> String {
    numbers
        .into_iter()
        .map(|n| n.to_string())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Location record of one substantive instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocationEntry {
    /// Name of the function.
    pub function: String,
    /// Label of the owning block.
    pub block: String,
    /// Number of the instruction.
    pub index: u32,
    /// Identifier of the function.
    pub function_id: u32,
}

/// Location records of every substantive instruction of a module.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocationTable {
    /// Entries in layout order.
    pub entries: Vec<LocationEntry>,
}

impl LocationTable {
    /// Collect the location records of a module.
    pub fn from_module(module: &Module, isa: &dyn Isa) -> Self {
        use crate::analysis::numbering::function_id;

        let mut entries = Vec::new();
        for (ordinal, func) in module.functions.iter().enumerate() {
            let numbering = InstNumbering::analyze(func, function_id(ordinal), isa);
            for (_, id) in numbering.iter() {
                let Some(loc) = numbering.location(id) else {
                    continue;
                };
                let block = func
                    .parent(id)
                    .and_then(|bb| func.get(bb))
                    .map(|bb| bb.label.clone())
                    .unwrap_or_default();
                entries.push(LocationEntry {
                    function: func.name.clone(),
                    block,
                    index: loc.index,
                    function_id: loc.function,
                });
            }
        }
        Self { entries }
    }
}

impl Display for LocationTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for e in &self.entries {
            writeln!(f, "{} {} {} {}", e.function, e.block, e.index, e.function_id)?;
        }
        Ok(())
    }
}
