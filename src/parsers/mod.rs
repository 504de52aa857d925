//! Format parsers and the fixed-priority cascade that tries them.
//!
//! Every parser positively validates its own grammar — it must reject input
//! lacking its format's defining markers, not merely fail to find expected
//! values — so that cross-format false positives never occur. The cascade
//! tries parsers in a fixed order and the first success wins.

pub mod clover;
pub mod cobertura;
pub mod gocover;
pub mod jacoco;
pub mod lcov;
pub mod simplecov;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str;

use anyhow::{bail, Context};

use crate::error::CovgateError;
use crate::model::Coverage;

/// Every format parser implements this trait.
pub trait Parser {
    /// Short dialect name used in diagnostics and as the coverage format
    /// label.
    fn name(&self) -> &'static str;

    /// Canonical filename(s) searched for when the input path is a
    /// directory.
    fn default_filenames(&self) -> &'static [&'static str];

    /// Validate and parse raw report bytes into the uniform model.
    fn parse(&self, content: &[u8]) -> anyhow::Result<Coverage>;

    /// Resolve `path` (file or directory), read it and parse it.
    /// Returns the coverage plus the concrete report file used.
    fn parse_report(&self, path: &Path) -> anyhow::Result<(Coverage, PathBuf)> {
        let report_path = resolve_report_path(path, self.default_filenames())?;
        let content = std::fs::read(&report_path)
            .with_context(|| format!("failed to read {}", report_path.display()))?;
        let cov = self.parse(&content)?;
        Ok((cov, report_path))
    }
}

/// The cascade, in priority order. The ordering is a correctness
/// invariant: the first parser that accepts the input wins.
pub fn all() -> &'static [&'static dyn Parser] {
    &[
        &gocover::GocoverParser,
        &lcov::LcovParser,
        &simplecov::SimplecovParser,
        &clover::CloverParser,
        &cobertura::CoberturaParser,
        &jacoco::JacocoParser,
    ]
}

/// Try each parser in priority order against `path`; the first success
/// wins. If every parser rejects the input, fail with
/// [`CovgateError::FormatNotRecognized`] aggregating each parser's
/// rejection reason.
pub fn measure(path: &Path) -> crate::error::Result<(Coverage, PathBuf)> {
    let mut attempts: Vec<(&'static str, String)> = Vec::new();
    for parser in all() {
        match parser.parse_report(path) {
            Ok(ok) => return Ok(ok),
            Err(e) => attempts.push((parser.name(), format!("{e:#}"))),
        }
    }
    Err(CovgateError::FormatNotRecognized {
        path: path.to_path_buf(),
        attempts,
    })
}

/// If `path` is a directory, look for one of `filenames` inside it;
/// otherwise use `path` itself.
fn resolve_report_path(path: &Path, filenames: &[&str]) -> anyhow::Result<PathBuf> {
    let meta = std::fs::metadata(path)
        .with_context(|| format!("no such file or directory: {}", path.display()))?;
    if !meta.is_dir() {
        return Ok(path.to_path_buf());
    }
    for name in filenames {
        let candidate = path.join(name);
        if candidate.is_file() {
            return Ok(candidate);
        }
    }
    bail!(
        "none of {filenames:?} found under directory {}",
        path.display()
    );
}

/// Extract attributes from an XML element into a HashMap.
/// Shared by the XML dialect parsers.
pub(crate) fn attr_map(e: &quick_xml::events::BytesStart) -> HashMap<String, String> {
    e.attributes()
        .filter_map(|a| {
            let attr = a.ok()?;
            let key = str::from_utf8(attr.key.local_name().into_inner())
                .ok()?
                .to_string();
            let value = attr.unescape_value().ok()?.to_string();
            Some((key, value))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cascade_order_is_fixed() {
        let names: Vec<&str> = all().iter().map(|p| p.name()).collect();
        assert_eq!(
            names,
            vec!["gocover", "lcov", "simplecov", "clover", "cobertura", "jacoco"]
        );
    }

    #[test]
    fn test_measure_unknown_input_aggregates_reasons() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("random.dat");
        std::fs::write(&path, b"hello world\n").unwrap();

        let err = measure(&path).unwrap_err();
        match err {
            CovgateError::FormatNotRecognized { attempts, .. } => {
                assert_eq!(attempts.len(), all().len());
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_resolve_report_path_prefers_first_filename() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), b"x").unwrap();
        std::fs::write(dir.path().join("b.txt"), b"x").unwrap();
        let got = resolve_report_path(dir.path(), &["a.txt", "b.txt"]).unwrap();
        assert_eq!(got, dir.path().join("a.txt"));
    }

    #[test]
    fn test_resolve_report_path_missing() {
        let dir = tempfile::tempdir().unwrap();
        assert!(resolve_report_path(dir.path(), &["a.txt"]).is_err());
        assert!(resolve_report_path(&dir.path().join("nope"), &["a.txt"]).is_err());
    }
}
