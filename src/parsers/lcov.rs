//! Parser for the LCOV `.info` line coverage format.
//!
//! Records are grouped per source file:
//!   SF:<path to source file>
//!   DA:<line number>,<execution count>[,<checksum>]
//!   end_of_record
//!
//! Summary records (LF/LH etc.) are ignored; totals are derived from the
//! DA records themselves. Any line with an unknown record tag rejects the
//! whole input — that is what keeps other text dialects out.

use std::collections::BTreeMap;

use anyhow::{bail, Result};

use super::Parser;
use crate::model::{Block, BlockId, Coverage, CoverageKind, FileCoverage};

pub struct LcovParser;

impl Parser for LcovParser {
    fn name(&self) -> &'static str {
        "lcov"
    }

    fn default_filenames(&self) -> &'static [&'static str] {
        &["lcov.info", "coverage.lcov"]
    }

    fn parse(&self, content: &[u8]) -> Result<Coverage> {
        let text = std::str::from_utf8(content)?;

        // Hit counts per file, in first-seen order. Concatenated streams
        // (lcov runs appended together) repeat SF: paths; those fold into
        // one entry with execution counts summed, the way lcov's own
        // aggregation does.
        let mut files: Vec<(String, BTreeMap<u32, u64>)> = Vec::new();
        let mut current: Option<usize> = None;

        for raw in text.lines() {
            let line = raw.trim();
            if line.is_empty() {
                continue;
            }
            if line == "end_of_record" {
                current = None;
                continue;
            }
            let Some((tag, value)) = line.split_once(':') else {
                bail!("malformed record: {line:?}");
            };
            match tag {
                "SF" => {
                    let idx = match files.iter().position(|(f, _)| f == value) {
                        Some(idx) => idx,
                        None => {
                            files.push((value.to_string(), BTreeMap::new()));
                            files.len() - 1
                        }
                    };
                    current = Some(idx);
                }
                "DA" => {
                    let Some(idx) = current else {
                        bail!("DA record before SF record");
                    };
                    let mut parts = value.splitn(3, ',');
                    let (Some(line_str), Some(count_str)) = (parts.next(), parts.next()) else {
                        bail!("malformed DA record: {line:?}");
                    };
                    let line_number: u32 = line_str
                        .parse()
                        .map_err(|_| anyhow::anyhow!("malformed DA record: {line:?}"))?;
                    // Some instrumenters use negative counts for
                    // non-instrumentable lines; skip those entirely.
                    match count_str.parse::<i64>() {
                        Ok(count) if count >= 0 => {
                            *files[idx].1.entry(line_number).or_insert(0) += count as u64;
                        }
                        Ok(_) => {}
                        Err(_) => bail!("malformed DA record: {line:?}"),
                    }
                }
                // Function, branch and summary records carry nothing we
                // track, but they are valid LCOV.
                "TN" | "FN" | "FNDA" | "FNF" | "FNH" | "BRDA" | "BRF" | "BRH" | "LF" | "LH" => {}
                _ => bail!("unknown record tag: {tag:?}"),
            }
        }

        if files.is_empty() {
            bail!("no SF records found");
        }
        let mut cov = Coverage::new(CoverageKind::Loc, self.name());
        for (file, line_hits) in files {
            let mut fc = FileCoverage::new(file);
            for (line, hits) in line_hits {
                fc.push_block(Block {
                    id: BlockId::line(line),
                    units: 1,
                    hits,
                });
            }
            cov.push_file(fc);
        }
        Ok(cov)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_lcov() {
        let input = include_bytes!("../../tests/fixtures/lcov.info");
        let cov = LcovParser.parse(input).unwrap();

        assert_eq!(cov.kind, CoverageKind::Loc);
        assert_eq!(cov.format, "lcov");
        assert_eq!(cov.files.len(), 2);

        let lib = &cov.files[0];
        assert_eq!(lib.file, "/src/lib.rs");
        assert_eq!(lib.total, 5);
        assert_eq!(lib.covered, 4);
        assert_eq!(lib.blocks[0].id, BlockId::line(1));
        assert_eq!(lib.blocks[0].hits, 5);

        let util = &cov.files[1];
        assert_eq!(util.file, "/src/util.rs");
        assert_eq!(util.total, 2);
        assert_eq!(util.covered, 1);

        assert!(cov.covered <= cov.total);
        for f in &cov.files {
            assert!(f.covered <= f.total);
        }
    }

    #[test]
    fn test_parse_lcov_no_final_end_of_record() {
        let input = b"SF:/src/lib.rs\nDA:1,5\nDA:2,0\n";
        let cov = LcovParser.parse(input).unwrap();
        assert_eq!(cov.files.len(), 1);
        assert_eq!(cov.files[0].total, 2);
        assert_eq!(cov.files[0].covered, 1);
    }

    #[test]
    fn test_parse_lcov_negative_counts_skipped() {
        let input = b"SF:/src/lib.rs\nDA:1,5\nDA:2,-1\nDA:3,0\nend_of_record\n";
        let cov = LcovParser.parse(input).unwrap();
        let file = &cov.files[0];
        assert_eq!(file.total, 2);
        assert_eq!(file.covered, 1);
    }

    #[test]
    fn test_repeated_sf_records_fold_into_one_file() {
        // Two appended lcov runs covering the same file: one entry,
        // execution counts summed.
        let input = b"SF:/src/lib.rs\nDA:1,1\nDA:2,0\nend_of_record\n\
            SF:/src/lib.rs\nDA:1,0\nDA:2,2\nDA:3,1\nend_of_record\n";
        let cov = LcovParser.parse(input).unwrap();
        assert_eq!(cov.files.len(), 1);
        let f = &cov.files[0];
        assert_eq!(f.total, 3);
        assert_eq!(f.covered, 3);
        let hits: Vec<u64> = f.blocks.iter().map(|b| b.hits).collect();
        assert_eq!(hits, vec![1, 2, 1]);
    }

    #[test]
    fn test_rejects_empty_input() {
        assert!(LcovParser.parse(b"").is_err());
        assert!(LcovParser.parse(b"TN:only-a-test-name\n").is_err());
    }

    #[test]
    fn test_rejects_other_dialects() {
        assert!(LcovParser
            .parse(b"mode: count\nexample.com/pkg/f.go:1.1,5.10 2 3\n")
            .is_err());
        assert!(LcovParser
            .parse(b"<?xml version=\"1.0\"?>\n<coverage></coverage>")
            .is_err());
        assert!(LcovParser.parse(b"{\"RSpec\":{\"coverage\":{}}}").is_err());
    }
}
