//! Uniform in-memory representation of coverage data, independent of any
//! specific report format. Parsers produce a `Coverage` which the report
//! aggregator merges, compares and serializes into snapshots.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{CovgateError, Result};

/// Compute a coverage rate, returning 0.0 when the total is zero.
#[must_use]
pub fn rate(covered: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        covered as f64 / total as f64
    }
}

/// Whether covered units are source lines or statements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CoverageKind {
    Loc,
    Statement,
}

/// Identity of the smallest unit a dialect reports hit counts for:
/// a single line, or a statement range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BlockId {
    Range { start_line: u32, end_line: u32 },
    Line { line: u32 },
}

impl BlockId {
    #[must_use]
    pub fn line(line: u32) -> Self {
        BlockId::Line { line }
    }

    #[must_use]
    pub fn range(start_line: u32, end_line: u32) -> Self {
        BlockId::Range {
            start_line,
            end_line,
        }
    }
}

/// One reported block: its identity, how many lines/statements it stands
/// for, and how many times it was executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    #[serde(flatten)]
    pub id: BlockId,
    pub units: u64,
    pub hits: u64,
}

/// Coverage data for a single source file.
///
/// Invariant: `total` is the sum of block units and `covered` the sum of
/// units of blocks with a non-zero hit count. [`FileCoverage::recompute`]
/// restores the invariant after block mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileCoverage {
    pub file: String,
    pub total: u64,
    pub covered: u64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub blocks: Vec<Block>,
}

impl FileCoverage {
    pub fn new(file: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            total: 0,
            covered: 0,
            blocks: Vec::new(),
        }
    }

    /// Append a block and keep the totals consistent.
    pub fn push_block(&mut self, block: Block) {
        self.total += block.units;
        if block.hits > 0 {
            self.covered += block.units;
        }
        self.blocks.push(block);
    }

    /// Recompute `total`/`covered` from the block list.
    pub fn recompute(&mut self) {
        self.total = self.blocks.iter().map(|b| b.units).sum();
        self.covered = self
            .blocks
            .iter()
            .filter(|b| b.hits > 0)
            .map(|b| b.units)
            .sum();
    }

    /// Fold blocks sharing an identity into one (units and hits summed).
    /// The result is keyed and ordered by identity.
    fn folded_blocks(&self) -> BTreeMap<BlockId, (u64, u64)> {
        let mut map: BTreeMap<BlockId, (u64, u64)> = BTreeMap::new();
        for b in &self.blocks {
            let entry = map.entry(b.id).or_insert((0, 0));
            entry.0 += b.units;
            entry.1 += b.hits;
        }
        map
    }
}

/// The normalized result of parsing one or more coverage reports of the
/// same dialect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Coverage {
    #[serde(rename = "type")]
    pub kind: CoverageKind,
    pub format: String,
    pub total: u64,
    pub covered: u64,
    pub files: Vec<FileCoverage>,
}

impl Coverage {
    pub fn new(kind: CoverageKind, format: impl Into<String>) -> Self {
        Self {
            kind,
            format: format.into(),
            total: 0,
            covered: 0,
            files: Vec::new(),
        }
    }

    /// Append a file entry and keep the aggregate totals consistent.
    /// Files keep their insertion order.
    pub fn push_file(&mut self, file: FileCoverage) {
        self.total += file.total;
        self.covered += file.covered;
        self.files.push(file);
    }

    /// Recompute the aggregate totals from the file list.
    pub fn recompute(&mut self) {
        self.total = self.files.iter().map(|f| f.total).sum();
        self.covered = self.files.iter().map(|f| f.covered).sum();
    }

    /// Aggregate coverage as a percentage (0.0 when nothing was measured).
    #[must_use]
    pub fn percent(&self) -> f64 {
        rate(self.covered, self.total) * 100.0
    }

    /// Exact lookup by file name.
    #[must_use]
    pub fn find_by_file(&self, file: &str) -> Option<&FileCoverage> {
        self.files.iter().find(|f| f.file == file)
    }

    /// Fuzzy lookup tolerating differing repository-root prefixes between
    /// two measurement environments: exact match first, then the candidate
    /// sharing the longest common trailing run of path segments (both sides
    /// may carry a prefix the other lacks). A miss is a lookup miss, not an
    /// error.
    #[must_use]
    pub fn fuzzy_find_by_file(&self, file: &str) -> Option<&FileCoverage> {
        if let Some(fc) = self.find_by_file(file) {
            return Some(fc);
        }
        let mut best: Option<&FileCoverage> = None;
        let mut best_segments = 0usize;
        for fc in &self.files {
            let segments = common_suffix_segments(&fc.file, file);
            if segments > best_segments {
                best_segments = segments;
                best = Some(fc);
            }
        }
        best
    }

    /// Merge another coverage of the same kind into this one.
    ///
    /// Files present in only one side are copied unchanged. For a file
    /// present in both, the two sides must agree on the block-identity set;
    /// hit counts are then summed per block and totals recomputed. A
    /// differing identity set fails with
    /// [`CovgateError::StructuralMismatch`] — never silently dropped or
    /// double-counted.
    pub fn merge(&mut self, other: &Coverage) -> Result<()> {
        if self.kind != other.kind {
            return Err(CovgateError::StructuralMismatch {
                file: format!("coverage kind mismatch: {:?} vs {:?}", self.kind, other.kind),
            });
        }
        for of in &other.files {
            let existing = self.files.iter_mut().find(|f| f.file == of.file);
            match existing {
                None => self.files.push(of.clone()),
                Some(sf) => {
                    let a = sf.folded_blocks();
                    let b = of.folded_blocks();
                    if a.keys().ne(b.keys()) {
                        return Err(CovgateError::StructuralMismatch {
                            file: of.file.clone(),
                        });
                    }
                    sf.blocks = a
                        .into_iter()
                        .map(|(id, (units, hits))| {
                            let (_, other_hits) = b[&id];
                            Block {
                                id,
                                units,
                                hits: hits + other_hits,
                            }
                        })
                        .collect();
                    sf.recompute();
                }
            }
        }
        self.recompute();
        Ok(())
    }

    /// Compare against another (possibly absent) coverage. An absent B is
    /// treated as zero for every metric, so a brand-new measurement shows
    /// up as a full delta rather than an error.
    #[must_use]
    pub fn compare(&self, other: Option<&Coverage>) -> DiffCoverage {
        let a = self.percent();
        let b = other.map_or(0.0, Coverage::percent);

        let mut files: Vec<DiffFileCoverage> = Vec::new();
        for f in &self.files {
            let fa = rate(f.covered, f.total) * 100.0;
            let fb = other
                .and_then(|o| o.fuzzy_find_by_file(&f.file))
                .map_or(0.0, |o| rate(o.covered, o.total) * 100.0);
            files.push(DiffFileCoverage {
                file: f.file.clone(),
                a: fa,
                b: fb,
                diff: fa - fb,
            });
        }
        if let Some(o) = other {
            for f in &o.files {
                if self.fuzzy_find_by_file(&f.file).is_none() {
                    let fb = rate(f.covered, f.total) * 100.0;
                    files.push(DiffFileCoverage {
                        file: f.file.clone(),
                        a: 0.0,
                        b: fb,
                        diff: -fb,
                    });
                }
            }
        }

        DiffCoverage {
            a,
            b,
            diff: a - b,
            files,
        }
    }
}

/// A/B/diff of aggregate coverage percentage, with per-file detail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiffCoverage {
    pub a: f64,
    pub b: f64,
    pub diff: f64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<DiffFileCoverage>,
}

/// A/B/diff of one file's coverage percentage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiffFileCoverage {
    pub file: String,
    pub a: f64,
    pub b: f64,
    pub diff: f64,
}

/// Number of path segments `a` and `b` share counting from the end.
/// Segments compare whole, so `src/futil.rs` and `util.rs` share none.
fn common_suffix_segments(a: &str, b: &str) -> usize {
    a.rsplit('/')
        .zip(b.rsplit('/'))
        .take_while(|(sa, sb)| sa == sb && !sa.is_empty())
        .count()
}
