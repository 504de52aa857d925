//! Parser for Go's `-coverprofile` statement coverage format.
//!
//! Format:
//!   mode: set|count|atomic
//!   <file>:<startLine>.<startCol>,<endLine>.<endCol> <numStatements> <count>
//!
//! Each line describes a basic block (a range of source lines) with the
//! number of statements it contains and how many times it was executed.
//! Blocks are kept as ranges; totals count statements, not lines.

use anyhow::{bail, Result};

use super::Parser;
use crate::model::{Block, BlockId, Coverage, CoverageKind, FileCoverage};

pub struct GocoverParser;

impl Parser for GocoverParser {
    fn name(&self) -> &'static str {
        "gocover"
    }

    fn default_filenames(&self) -> &'static [&'static str] {
        &["coverage.out", "coverage.txt"]
    }

    fn parse(&self, content: &[u8]) -> Result<Coverage> {
        let text = std::str::from_utf8(content)?;
        let mut lines = text.lines().filter(|l| !l.trim().is_empty());

        // The mode header is the format's defining marker. Without it this
        // is not a Go coverage profile, whatever else it looks like.
        let Some(first) = lines.next() else {
            bail!("empty input");
        };
        let mode = first
            .strip_prefix("mode: ")
            .map(str::trim)
            .filter(|m| matches!(*m, "set" | "count" | "atomic"));
        if mode.is_none() {
            bail!("missing \"mode:\" header");
        }

        let mut cov = Coverage::new(CoverageKind::Statement, self.name());
        for line in lines {
            let Some((file, block)) = parse_block_line(line.trim()) else {
                bail!("malformed block line: {line:?}");
            };
            match cov.files.iter_mut().find(|f| f.file == file) {
                Some(fc) => fc.push_block(block),
                None => {
                    let mut fc = FileCoverage::new(file);
                    fc.push_block(block);
                    cov.files.push(fc);
                }
            }
        }
        cov.recompute();
        Ok(cov)
    }
}

/// Parse one block line, returning the file path and the block.
///
/// Splits `<file>:<startLine>.<startCol>,<endLine>.<endCol> <numStmt> <count>`
/// from the right so file paths containing colons or spaces survive.
fn parse_block_line(line: &str) -> Option<(&str, Block)> {
    let mut parts = line.rsplitn(3, ' ');
    let hits: u64 = parts.next()?.parse().ok()?;
    let units: u64 = parts.next()?.parse().ok()?;
    let rest = parts.next()?;

    let colon = rest.rfind(':')?;
    let file = &rest[..colon];
    if file.is_empty() {
        return None;
    }
    let (start, end) = rest[colon + 1..].split_once(',')?;
    let start_line: u32 = start.split_once('.')?.0.parse().ok()?;
    let end_line: u32 = end.split_once('.')?.0.parse().ok()?;

    Some((
        file,
        Block {
            id: BlockId::range(start_line, end_line),
            units,
            hits,
        },
    ))
}
