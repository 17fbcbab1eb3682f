//! Mapping reports to program counters.
//!
//! Location records end up in the line table of the compiled binary as
//! `(line, column) = (instruction number, function id)`. A decoded line
//! table dump has one row per address:
//!
//! ```text
//! 0x0000000000401126     3  10000  1  0  0  is_stmt
//! ```
//!
//! Rows whose column is below [`FUNCTION_ID_BASE`] come from ordinary debug
//! info and are ignored.

use std::{collections::HashMap, fmt::Display};

use miette::{Diagnostic, SourceSpan};
#[allow(unused_imports)]
use nolog::*;
use thiserror::Error;

use crate::{analysis::numbering::FUNCTION_ID_BASE, report::BranchRecord};

/// Error reading a line table dump.
#[derive(Error, Debug, Diagnostic)]
pub enum TraceError {
    /// An address row that cannot be decoded.
    #[error("malformed address row on line {line}")]
    #[diagnostic(
        code(reconv::trace::malformed),
        help("expected `0x<address> <line> <column> ...`")
    )]
    Malformed {
        /// Line number, starting at 1.
        line: usize,
        /// Span of the row.
        #[label("here")]
        span: SourceSpan,
    },
}

/// Program counters of numbered instructions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddressMap {
    pcs: HashMap<(u32, u32), u64>,
}

impl AddressMap {
    /// Read a decoded line table dump.
    ///
    /// When several addresses carry the same location, the last one wins.
    pub fn parse(input: &str) -> Result<Self, TraceError> {
        let mut pcs = HashMap::new();
        let mut offset = 0;
        for (i, raw) in input.split_inclusive('\n').enumerate() {
            let text = raw.trim_end();
            let span: SourceSpan = (offset..offset + text.len()).into();
            offset += raw.len();
            let Some(row) = text.strip_prefix("0x") else {
                continue;
            };
            let (pc, line, column) = parse_row(row).ok_or(TraceError::Malformed {
                line: i + 1,
                span,
            })?;
            if column >= FUNCTION_ID_BASE {
                trace!(->[0] "PC  " => "({}, {}) at {:x}", line, column, pc);
                pcs.insert((line, column), pc);
            }
        }
        Ok(Self { pcs })
    }

    /// Program counter of an instruction.
    pub fn get(&self, index: u32, function: u32) -> Option<u64> {
        self.pcs.get(&(index, function)).copied()
    }

    /// Number of known locations.
    pub fn len(&self) -> usize {
        self.pcs.len()
    }

    /// Whether no location is known.
    pub fn is_empty(&self) -> bool {
        self.pcs.is_empty()
    }
}

fn parse_row(row: &str) -> Option<(u64, u32, u32)> {
    let mut fields = row.split_whitespace();
    let pc = u64::from_str_radix(fields.next()?, 16).ok()?;
    let line = fields.next()?.parse().ok()?;
    let column = fields.next()?.parse().ok()?;
    Some((pc, line, column))
}

/// A branch record in program counters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedBranch {
    /// Program counter of the branch.
    pub pc: u64,
    /// Program counters of the dependents that have one.
    pub dependents: Vec<u64>,
}

impl Display for ResolvedBranch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "* {:x}", self.pc)?;
        for pc in &self.dependents {
            writeln!(f, "{:x}", pc)?;
        }
        writeln!(f, "---")
    }
}

/// Resolve report records to program counters.
///
/// Branches without an address are dropped with all their dependents;
/// dependents without an address are dropped alone.
pub fn resolve(records: &[BranchRecord], map: &AddressMap) -> Vec<ResolvedBranch> {
    records
        .iter()
        .filter_map(|record| {
            let pc = map.get(record.branch, record.function)?;
            let dependents = record
                .dependents
                .iter()
                .filter_map(|&dep| map.get(dep, record.function))
                .collect();
            Some(ResolvedBranch { pc, dependents })
        })
        .collect()
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::report::parse_report;

    const DUMP: &str = "\
Address            Line   Column File   ISA Discriminator Flags
------------------ ------ ------ ------ --- ------------- -------------
0x0000000000401120      1      0      1   0             0  is_stmt
0x0000000000401126      1  10000      1   0             0  is_stmt
0x000000000040112a      2  10000      1   0             0
0x0000000000401130      4  10000      1   0             0
0x0000000000401134      4  10000      1   0             0
0x0000000000401140      0  10001      1   0             0
";

    #[test]
    fn keeps_only_numbered_rows() {
        let map = AddressMap::parse(DUMP).unwrap();
        assert_eq!(map.len(), 4);
        assert_eq!(map.get(1, 10000), Some(0x401126));
        assert_eq!(map.get(4, 10000), Some(0x401134));
        assert_eq!(map.get(1, 0), None);
    }

    #[test]
    fn resolves_records() {
        let map = AddressMap::parse(DUMP).unwrap();
        let records =
            parse_report("* 1 10000\n2 10000\n3 10000\n4 10000\n---\n* 3 10000\n4 10000\n---\n* 0 10001\n---\n")
                .unwrap();
        let resolved = resolve(&records, &map);
        let text = resolved.iter().map(|r| r.to_string()).collect::<String>();
        assert_eq!(text, "* 401126\n40112a\n401134\n---\n* 401140\n---\n");
    }

    #[test]
    fn malformed_row() {
        let err = AddressMap::parse("0x12 oops\n").unwrap_err();
        assert!(matches!(err, TraceError::Malformed { line: 1, .. }));
    }
}
