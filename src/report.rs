//! The report aggregator: one measurement run over one commit.
//!
//! A report bundles up to three independent metrics — coverage,
//! code-to-test ratio and test execution time. Absence of a metric means
//! "not measured", which is distinct from a measured zero; `Option` fields
//! plus `skip_serializing_if` carry that distinction through the snapshot
//! JSON. Each `measure_*` call fails or succeeds on its own, so a broken
//! coverage report never aborts a ratio measurement.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CovgateError, Result};
use crate::model::{Coverage, DiffCoverage};
use crate::parsers;
use crate::ratio::{self, DiffRatio, Ratio};
use crate::steptime::{merge_execution_times, ExecutionStep};

/// Where a report comes from. Callers supply this explicitly; the engine
/// never probes the environment or a VCS for it.
#[derive(Debug, Clone)]
pub struct ReportContext {
    pub repository: String,
    pub ref_: String,
    pub commit: String,
    pub timestamp: DateTime<Utc>,
}

/// A measurement run, serializable as a snapshot for later comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub repository: String,
    #[serde(rename = "ref")]
    pub ref_: String,
    pub commit: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coverage: Option<Coverage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_to_test_ratio: Option<Ratio>,
    /// Union of test step windows, in nanoseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_execution_time: Option<f64>,
    pub timestamp: DateTime<Utc>,
    /// Concrete report files the coverage was read from. Diagnostic only,
    /// never part of the snapshot.
    #[serde(skip)]
    pub report_paths: Vec<PathBuf>,
}

impl Report {
    #[must_use]
    pub fn new(ctx: ReportContext) -> Self {
        Self {
            repository: ctx.repository,
            ref_: ctx.ref_,
            commit: ctx.commit,
            coverage: None,
            code_to_test_ratio: None,
            test_execution_time: None,
            timestamp: ctx.timestamp,
            report_paths: Vec::new(),
        }
    }

    /// Run the format cascade over each path and merge the results.
    ///
    /// A path that fails to parse does not abort the others; the first
    /// failure is returned only when no path yielded coverage. As a
    /// convenience for "compare against my own last run", a single
    /// unrecognized path is retried as a persisted snapshot via
    /// [`Report::load`].
    pub fn measure_coverage<P: AsRef<Path>>(&mut self, paths: &[P]) -> Result<()> {
        let mut first_err: Option<CovgateError> = None;
        for path in paths {
            match parsers::measure(path.as_ref()) {
                Ok((cov, report_path)) => {
                    match &mut self.coverage {
                        None => self.coverage = Some(cov),
                        Some(existing) => existing.merge(&cov)?,
                    }
                    self.report_paths.push(report_path);
                }
                Err(e) => {
                    if first_err.is_none() {
                        first_err = Some(e);
                    }
                }
            }
        }
        match first_err {
            None => Ok(()),
            Some(e) => {
                if self.coverage.is_some() {
                    return Ok(());
                }
                if paths.len() == 1 && self.load(paths[0].as_ref()).is_ok() {
                    return Ok(());
                }
                Err(e)
            }
        }
    }

    /// Measure the code-to-test ratio of the tree under `root`.
    pub fn measure_code_to_test_ratio<S: AsRef<str>, T: AsRef<str>>(
        &mut self,
        root: &Path,
        code_patterns: &[S],
        test_patterns: &[T],
    ) -> Result<()> {
        self.code_to_test_ratio = Some(ratio::measure(root, code_patterns, test_patterns)?);
        Ok(())
    }

    /// Aggregate CI step windows into the total test execution time.
    pub fn measure_test_execution_time<S: ExecutionStep>(&mut self, steps: &[S]) -> Result<()> {
        if steps.is_empty() {
            return Err(CovgateError::NoStepsDetected);
        }
        let merged = merge_execution_times(steps);
        self.test_execution_time = Some(duration_nano(merged));
        Ok(())
    }

    /// Replace this report with a previously persisted snapshot.
    pub fn load(&mut self, path: &Path) -> Result<()> {
        let content = std::fs::read(path)?;
        let loaded: Report =
            serde_json::from_slice(&content).map_err(|e| CovgateError::Snapshot {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
        *self = loaded;
        self.report_paths = vec![path.to_path_buf()];
        Ok(())
    }

    /// Serialize as snapshot JSON.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| CovgateError::Snapshot {
            path: PathBuf::new(),
            reason: e.to_string(),
        })
    }

    /// Aggregate coverage percentage; 0.0 when unmeasured or empty.
    #[must_use]
    pub fn coverage_percent(&self) -> f64 {
        self.coverage.as_ref().map_or(0.0, Coverage::percent)
    }

    /// Test-to-code quotient; 0.0 when unmeasured or no code lines.
    #[must_use]
    pub fn code_to_test_ratio_ratio(&self) -> f64 {
        self.code_to_test_ratio.as_ref().map_or(0.0, Ratio::ratio)
    }

    /// Test execution time in nanoseconds; 0.0 when unmeasured.
    #[must_use]
    pub fn test_execution_time_nano(&self) -> f64 {
        self.test_execution_time.unwrap_or(0.0)
    }

    #[must_use]
    pub fn is_measured_coverage(&self) -> bool {
        self.coverage.is_some()
    }

    #[must_use]
    pub fn is_measured_code_to_test_ratio(&self) -> bool {
        self.code_to_test_ratio.is_some()
    }

    #[must_use]
    pub fn is_measured_test_execution_time(&self) -> bool {
        self.test_execution_time.is_some()
    }

    /// How many of the three metrics were measured.
    #[must_use]
    pub fn count_measured(&self) -> usize {
        [
            self.is_measured_coverage(),
            self.is_measured_code_to_test_ratio(),
            self.is_measured_test_execution_time(),
        ]
        .iter()
        .filter(|&&m| m)
        .count()
    }

    /// A report must identify its commit and carry at least one metric.
    pub fn validate(&self) -> Result<()> {
        if self.repository.is_empty() {
            return Err(CovgateError::InvalidReport {
                reason: "repository is empty".to_string(),
            });
        }
        if self.ref_.is_empty() {
            return Err(CovgateError::InvalidReport {
                reason: "ref is empty".to_string(),
            });
        }
        if self.commit.is_empty() {
            return Err(CovgateError::InvalidReport {
                reason: "commit is empty".to_string(),
            });
        }
        if self.count_measured() == 0 {
            return Err(CovgateError::InvalidReport {
                reason: "no metric was measured".to_string(),
            });
        }
        Ok(())
    }

    /// Diff this report against an older (possibly absent) one. A diff
    /// entry exists only for metrics measured on `self`; an absent or
    /// unmeasured counterpart counts as zero.
    #[must_use]
    pub fn compare(&self, other: Option<&Report>) -> DiffReport {
        let coverage = self
            .coverage
            .as_ref()
            .map(|c| c.compare(other.and_then(|o| o.coverage.as_ref())));
        let code_to_test_ratio = self
            .code_to_test_ratio
            .as_ref()
            .map(|r| r.compare(other.and_then(|o| o.code_to_test_ratio.as_ref())));
        let test_execution_time = self.test_execution_time.map(|a| {
            let b = other.map_or(0.0, Report::test_execution_time_nano);
            // For durations the interesting movement is growth, so the
            // delta is oriented old minus new.
            DiffTestExecutionTime { a, b, diff: b - a }
        });
        DiffReport {
            coverage,
            code_to_test_ratio,
            test_execution_time,
        }
    }
}

/// Per-metric deltas between two reports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiffReport {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coverage: Option<DiffCoverage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_to_test_ratio: Option<DiffRatio>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_execution_time: Option<DiffTestExecutionTime>,
}

/// A/B/diff of execution time in nanoseconds, `diff = b - a`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiffTestExecutionTime {
    pub a: f64,
    pub b: f64,
    pub diff: f64,
}

fn duration_nano(d: chrono::Duration) -> f64 {
    match d.num_nanoseconds() {
        Some(n) => n as f64,
        // Only reachable past ~292 years of test time.
        None => d.num_milliseconds() as f64 * 1e6,
    }
}
