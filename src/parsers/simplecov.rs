//! Parser for SimpleCov's `.resultset.json` format.
//!
//! The file is a JSON object keyed by test-suite name; each suite holds a
//! `coverage` object keyed by source file path. Per-file line data is
//! either a plain array (classic) or an object with a `lines` array
//! (SimpleCov >= 0.18, which added branch data):
//!
//!   { "RSpec": { "coverage": { "/app/lib/a.rb": [1, null, 0] }, ... } }
//!   { "RSpec": { "coverage": { "/app/lib/a.rb": { "lines": [1, null, 0] } } } }
//!
//! `null` marks a non-instrumentable line and is skipped.

use anyhow::{bail, Result};
use serde_json::Value;

use super::Parser;
use crate::model::{Block, BlockId, Coverage, CoverageKind, FileCoverage};

pub struct SimplecovParser;

impl Parser for SimplecovParser {
    fn name(&self) -> &'static str {
        "simplecov"
    }

    fn default_filenames(&self) -> &'static [&'static str] {
        &[".resultset.json"]
    }

    fn parse(&self, content: &[u8]) -> Result<Coverage> {
        let root: Value = serde_json::from_slice(content)?;
        let Some(suites) = root.as_object() else {
            bail!("not a JSON object");
        };
        if suites.is_empty() {
            bail!("no result sets found");
        }

        let mut cov = Coverage::new(CoverageKind::Loc, self.name());
        for (suite_name, suite) in suites {
            // Every suite must carry a coverage group; this is the
            // format's defining marker.
            let Some(files) = suite.get("coverage").and_then(Value::as_object) else {
                bail!("result set {suite_name:?} has no \"coverage\" object");
            };
            for (path, entry) in files {
                if cov.files.iter().any(|f| f.file == *path) {
                    // Same file measured by more than one suite; the first
                    // suite wins, matching the insertion-order contract.
                    continue;
                }
                let lines = match entry {
                    Value::Array(lines) => lines,
                    Value::Object(o) => match o.get("lines").and_then(Value::as_array) {
                        Some(lines) => lines,
                        None => bail!("file entry for {path:?} has no line data"),
                    },
                    _ => bail!("file entry for {path:?} has no line data"),
                };
                let mut fc = FileCoverage::new(path.clone());
                for (i, hits) in lines.iter().enumerate() {
                    // Entries other than numbers (null, "ignored") are
                    // non-instrumentable lines.
                    if let Some(hits) = hits.as_u64() {
                        fc.push_block(Block {
                            id: BlockId::line(i as u32 + 1),
                            units: 1,
                            hits,
                        });
                    }
                }
                cov.push_file(fc);
            }
        }
        Ok(cov)
    }
}
