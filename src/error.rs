use std::path::PathBuf;

use thiserror::Error;

/// Everything that can go wrong while measuring, merging or gating.
///
/// The kinds are a closed set with structured context so that callers branch
/// on the variant instead of string-matching messages. In particular
/// [`CovgateError::ThresholdNotMet`] is distinct from
/// [`CovgateError::ConditionParse`]: the former means "the metric failed the
/// gate", the latter means "the gate itself is broken".
#[derive(Error, Debug)]
pub enum CovgateError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// No parser in the cascade recognized the input. Carries each parser's
    /// individual rejection reason for diagnostics.
    #[error("coverage report not found: {}{}", .path.display(), format_attempts(.attempts))]
    FormatNotRecognized {
        path: PathBuf,
        attempts: Vec<(&'static str, String)>,
    },

    /// Two coverages disagree on block identity (or kind) for a shared file.
    #[error("coverage report structure mismatch: {file}")]
    StructuralMismatch { file: String },

    /// An invalid glob pattern in a ratio pattern list.
    #[error("invalid glob pattern: {pattern}: {reason}")]
    GlobSyntax { pattern: String, reason: String },

    /// A non-empty ratio pattern list matched no files at all.
    #[error("no files matched: {patterns:?}")]
    NoFilesMatched { patterns: Vec<String> },

    /// A threshold expression could not be parsed.
    #[error("invalid condition ({condition}): unexpected token {token:?}")]
    ConditionParse { condition: String, token: String },

    /// A well-formed threshold expression evaluated false.
    #[error("condition is not met ({condition})")]
    ThresholdNotMet { condition: String },

    /// Execution-time aggregation was given zero step intervals.
    #[error("could not detect test steps")]
    NoStepsDetected,

    /// A persisted report snapshot could not be read back.
    #[error("invalid report snapshot: {}: {reason}", .path.display())]
    Snapshot { path: PathBuf, reason: String },

    /// A report is missing context or carries no measurement at all.
    #[error("invalid report: {reason}")]
    InvalidReport { reason: String },
}

fn format_attempts(attempts: &[(&'static str, String)]) -> String {
    let mut out = String::new();
    for (name, reason) in attempts {
        out.push_str(&format!("\n  {name}: {reason}"));
    }
    out
}

pub type Result<T> = std::result::Result<T, CovgateError>;

impl CovgateError {
    /// Whether this error is a failed gate rather than a broken one.
    #[must_use]
    pub fn is_threshold_not_met(&self) -> bool {
        matches!(self, CovgateError::ThresholdNotMet { .. })
    }
}
