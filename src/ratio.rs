//! Code-to-test ratio measurement.
//!
//! Walks a file tree and classifies every file as "code" and/or "test" via
//! ordered glob pattern lists, counting physical lines. The two
//! classifications are evaluated independently, so a file may be code,
//! test, both, or neither.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use globset::GlobBuilder;
use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

use crate::error::{CovgateError, Result};

/// One classified file with its physical line count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileLines {
    pub path: String,
    pub lines: u64,
}

/// Code and test line totals, plus the classified file lists they were
/// derived from. The lists are disposable: [`Ratio::delete_files`] clears
/// them without invalidating the totals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ratio {
    pub code: u64,
    pub test: u64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub code_files: Vec<FileLines>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub test_files: Vec<FileLines>,
}

impl Ratio {
    /// Test-to-code quotient; 0.0 when no code lines were counted.
    #[must_use]
    pub fn ratio(&self) -> f64 {
        if self.code == 0 {
            0.0
        } else {
            self.test as f64 / self.code as f64
        }
    }

    /// Drop the per-file lists to bound memory on large trees. The scalar
    /// totals stay valid.
    pub fn delete_files(&mut self) {
        self.code_files = Vec::new();
        self.test_files = Vec::new();
    }

    /// Compare against another (possibly absent) ratio. Absent B counts
    /// as zero.
    #[must_use]
    pub fn compare(&self, other: Option<&Ratio>) -> DiffRatio {
        let a = self.ratio();
        let b = other.map_or(0.0, Ratio::ratio);
        DiffRatio { a, b, diff: a - b }
    }
}

/// A/B/diff of the test-to-code quotient.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiffRatio {
    pub a: f64,
    pub b: f64,
    pub diff: f64,
}

/// An ordered glob pattern list with `!`-prefixed negation.
struct PatternSet {
    entries: Vec<(globset::GlobMatcher, bool)>,
    sources: Vec<String>,
}

impl PatternSet {
    fn build<S: AsRef<str>>(patterns: &[S]) -> Result<Self> {
        let mut entries = Vec::with_capacity(patterns.len());
        let mut sources = Vec::with_capacity(patterns.len());
        for p in patterns {
            let p = p.as_ref();
            let (glob, negated) = match p.strip_prefix('!') {
                Some(rest) => (rest, true),
                None => (p, false),
            };
            let matcher = GlobBuilder::new(glob)
                .literal_separator(true)
                .build()
                .map_err(|e| CovgateError::GlobSyntax {
                    pattern: p.to_string(),
                    reason: e.to_string(),
                })?
                .compile_matcher();
            entries.push((matcher, negated));
            sources.push(p.to_string());
        }
        Ok(Self { entries, sources })
    }

    /// Apply the patterns in order; the outcome of the last matching
    /// pattern wins (a negated match excludes just as a positive match
    /// includes). A path matched by no pattern is excluded.
    fn matches(&self, rel: &Path) -> bool {
        let mut included = false;
        for (matcher, negated) in &self.entries {
            if matcher.is_match(rel) {
                included = !negated;
            }
        }
        included
    }
}

/// Walk `root` and measure the code-to-test ratio using the given pattern
/// lists.
///
/// Fails with [`CovgateError::GlobSyntax`] on an invalid pattern and with
/// [`CovgateError::NoFilesMatched`] when a non-empty pattern list matches
/// nothing under `root`.
pub fn measure<S: AsRef<str>, T: AsRef<str>>(
    root: &Path,
    code_patterns: &[S],
    test_patterns: &[T],
) -> Result<Ratio> {
    measure_with_cancel(root, code_patterns, test_patterns, &AtomicBool::new(false))
}

/// Like [`measure`], but checks `cancel` between directory entries so a
/// caller can abandon a long walk.
pub fn measure_with_cancel<S: AsRef<str>, T: AsRef<str>>(
    root: &Path,
    code_patterns: &[S],
    test_patterns: &[T],
    cancel: &AtomicBool,
) -> Result<Ratio> {
    let code_set = PatternSet::build(code_patterns)?;
    let test_set = PatternSet::build(test_patterns)?;

    let mut ratio = Ratio {
        code: 0,
        test: 0,
        code_files: Vec::new(),
        test_files: Vec::new(),
    };

    let walker = WalkDir::new(root)
        .into_iter()
        .filter_entry(|e| !is_vcs_metadata(e.file_name().to_str()));
    for entry in walker {
        if cancel.load(Ordering::Relaxed) {
            return Err(CovgateError::Io(std::io::Error::new(
                std::io::ErrorKind::Interrupted,
                "ratio measurement cancelled",
            )));
        }
        let entry = entry.map_err(|e| match e.into_io_error() {
            Some(io) => CovgateError::Io(io),
            None => CovgateError::Io(std::io::Error::other("walk error")),
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = entry.path().strip_prefix(root).unwrap_or(entry.path());
        let in_code = code_set.matches(rel);
        let in_test = test_set.matches(rel);
        if !in_code && !in_test {
            continue;
        }
        let lines = count_lines(entry.path())?;
        let rel_str = rel.to_string_lossy().into_owned();
        if in_code {
            ratio.code += lines;
            ratio.code_files.push(FileLines {
                path: rel_str.clone(),
                lines,
            });
        }
        if in_test {
            ratio.test += lines;
            ratio.test_files.push(FileLines {
                path: rel_str,
                lines,
            });
        }
    }

    if !code_set.sources.is_empty() && ratio.code_files.is_empty() {
        return Err(CovgateError::NoFilesMatched {
            patterns: code_set.sources,
        });
    }
    if !test_set.sources.is_empty() && ratio.test_files.is_empty() {
        return Err(CovgateError::NoFilesMatched {
            patterns: test_set.sources,
        });
    }

    Ok(ratio)
}

fn is_vcs_metadata(name: Option<&str>) -> bool {
    matches!(name, Some(".git" | ".hg" | ".svn"))
}

/// Physical line count of a file, counting a trailing unterminated line.
fn count_lines(path: &Path) -> Result<u64> {
    let content = std::fs::read(path)?;
    let mut lines = content.iter().filter(|&&b| b == b'\n').count() as u64;
    if !content.is_empty() && !content.ends_with(b"\n") {
        lines += 1;
    }
    Ok(lines)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn sample_tree() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("pkg")).unwrap();
        fs::create_dir_all(dir.path().join(".git")).unwrap();
        fs::write(dir.path().join("pkg/file.go"), "package pkg\n\nfunc F() {}\n").unwrap();
        fs::write(
            dir.path().join("pkg/file_test.go"),
            "package pkg\n\nfunc TestF(t *testing.T) {}\n\n// end\n",
        )
        .unwrap();
        fs::write(dir.path().join(".git/config"), "[core]\n").unwrap();
        fs::write(dir.path().join("README.md"), "hello\n").unwrap();
        dir
    }

    #[test]
    fn test_measure_counts_lines() {
        let dir = sample_tree();
        let got = measure(
            dir.path(),
            &["**/*.go", "!**/*_test.go"],
            &["**/*_test.go"],
        )
        .unwrap();
        assert_eq!(got.code, 3);
        assert_eq!(got.test, 5);
        assert_eq!(got.code_files.len(), 1);
        assert_eq!(got.test_files.len(), 1);
        assert!((got.ratio() - 5.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_last_match_wins_include_then_exclude() {
        let dir = sample_tree();
        // The trailing negation overrides the include for every Go file.
        let err = measure(dir.path(), &["**/*.go", "!**/*.go"], &[] as &[&str]).unwrap_err();
        assert!(matches!(err, CovgateError::NoFilesMatched { .. }));
    }

    #[test]
    fn test_last_match_wins_exclude_then_include() {
        let dir = sample_tree();
        let got = measure(dir.path(), &["!**/*.go", "**/*.go"], &[] as &[&str]).unwrap();
        assert!(got.code_files.iter().any(|f| f.path == "pkg/file.go"));
        assert!(got.code_files.iter().any(|f| f.path == "pkg/file_test.go"));
    }

    #[test]
    fn test_classifications_are_independent() {
        let dir = sample_tree();
        let got = measure(dir.path(), &["**/*.go"], &["**/*.go"]).unwrap();
        // Every Go file lands in both lists.
        assert_eq!(got.code, got.test);
        assert_eq!(got.code_files.len(), 2);
        assert_eq!(got.test_files.len(), 2);
    }

    #[test]
    fn test_unmatched_by_default() {
        let dir = sample_tree();
        let got = measure(dir.path(), &["**/*.go", "!**/*_test.go"], &["**/*_test.go"]).unwrap();
        assert!(!got.code_files.iter().any(|f| f.path == "README.md"));
    }

    #[test]
    fn test_vcs_metadata_skipped() {
        let dir = sample_tree();
        let got = measure(dir.path(), &["**/*"], &[] as &[&str]).unwrap();
        assert!(!got.code_files.iter().any(|f| f.path.starts_with(".git")));
    }

    #[test]
    fn test_empty_pattern_lists_are_fine() {
        let dir = sample_tree();
        let got = measure(dir.path(), &[] as &[&str], &[] as &[&str]).unwrap();
        assert_eq!(got.code, 0);
        assert_eq!(got.test, 0);
    }

    #[test]
    fn test_no_files_matched_is_an_error() {
        let dir = sample_tree();
        let err = measure(dir.path(), &["**/*.ts"], &[] as &[&str]).unwrap_err();
        match err {
            CovgateError::NoFilesMatched { patterns } => {
                assert_eq!(patterns, vec!["**/*.ts".to_string()]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_invalid_glob_is_an_error() {
        let dir = sample_tree();
        let err = measure(dir.path(), &["a{b"], &[] as &[&str]).unwrap_err();
        assert!(matches!(err, CovgateError::GlobSyntax { .. }));
    }

    #[test]
    fn test_delete_files_keeps_totals() {
        let dir = sample_tree();
        let mut got = measure(dir.path(), &["**/*.go"], &[] as &[&str]).unwrap();
        let code = got.code;
        assert!(!got.code_files.is_empty());
        got.delete_files();
        assert!(got.code_files.is_empty());
        assert_eq!(got.code, code);
    }

    #[test]
    fn test_compare() {
        let a = Ratio {
            code: 100,
            test: 250,
            code_files: Vec::new(),
            test_files: Vec::new(),
        };
        let same = a.compare(Some(&a.clone()));
        assert_eq!(same.a, 2.5);
        assert_eq!(same.b, 2.5);
        assert_eq!(same.diff, 0.0);

        let absent = a.compare(None);
        assert_eq!(absent.a, 2.5);
        assert_eq!(absent.b, 0.0);
        assert_eq!(absent.diff, 2.5);

        let b = Ratio {
            code: 100,
            test: 300,
            code_files: Vec::new(),
            test_files: Vec::new(),
        };
        let grew = a.compare(Some(&b));
        assert_eq!(grew.a, 2.5);
        assert_eq!(grew.b, 3.0);
        assert_eq!(grew.diff, -0.5);
    }

    #[test]
    fn test_ratio_zero_code_is_zero() {
        let r = Ratio {
            code: 0,
            test: 10,
            code_files: Vec::new(),
            test_files: Vec::new(),
        };
        assert_eq!(r.ratio(), 0.0);
    }
}
