//! Command handler functions for the covgate CLI.
//!
//! Each `cmd_*` function returns its output as a `String`, making them easy
//! to test without capturing stdout.

use std::fmt::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::check::{self, MetricKind};
use crate::report::{Report, ReportContext};

pub fn cmd_measure(
    ctx: ReportContext,
    coverage_paths: &[PathBuf],
    ratio_root: Option<&Path>,
    code_patterns: &[String],
    test_patterns: &[String],
) -> Result<String> {
    let mut report = Report::new(ctx);
    if !coverage_paths.is_empty() {
        report.measure_coverage(coverage_paths)?;
    }
    if let Some(root) = ratio_root {
        report.measure_code_to_test_ratio(root, code_patterns, test_patterns)?;
    }
    report.validate()?;
    Ok(format!("{}\n", report.to_json()?))
}

pub fn cmd_diff(a_path: &Path, b_path: &Path) -> Result<String> {
    let a = load_report(a_path)?;
    let b = load_report(b_path)?;
    let d = a.compare(Some(&b));

    let mut out = String::new();
    writeln!(out, "{:<22} {:>12} {:>12} {:>12}", "", "A", "B", "+/-").unwrap();
    writeln!(out, "{}", "-".repeat(62)).unwrap();
    if let Some(c) = &d.coverage {
        writeln!(
            out,
            "{:<22} {:>11.1}% {:>11.1}% {:>11.1}%",
            "Coverage", c.a, c.b, c.diff
        )
        .unwrap();
    }
    if let Some(r) = &d.code_to_test_ratio {
        writeln!(
            out,
            "{:<22} {:>12} {:>12} {:>+12.1}",
            "Code to Test Ratio",
            format!("1:{:.1}", r.a),
            format!("1:{:.1}", r.b),
            r.diff
        )
        .unwrap();
    }
    if let Some(t) = &d.test_execution_time {
        writeln!(
            out,
            "{:<22} {:>12} {:>12} {:>12}",
            "Test Execution Time",
            format_nano(t.a),
            format_nano(t.b),
            format_nano(t.diff)
        )
        .unwrap();
    }
    Ok(out)
}

pub fn cmd_check(
    report_path: &Path,
    prev_path: Option<&Path>,
    coverage_cond: Option<&str>,
    ratio_cond: Option<&str>,
    time_cond: Option<&str>,
) -> Result<String> {
    let report = load_report(report_path)?;
    let prev = match prev_path {
        Some(p) => Some(load_report(p)?),
        None => None,
    };

    let mut out = String::new();
    if let Some(cond) = coverage_cond {
        let current = report.coverage_percent();
        let prev_value = prev.as_ref().map_or(0.0, Report::coverage_percent);
        check::acceptable(MetricKind::Percentage, cond, current, prev_value)?;
        writeln!(out, "coverage: {current:.1}% ({cond}) OK").unwrap();
    }
    if let Some(cond) = ratio_cond {
        let current = report.code_to_test_ratio_ratio();
        let prev_value = prev.as_ref().map_or(0.0, Report::code_to_test_ratio_ratio);
        check::acceptable(MetricKind::Ratio, cond, current, prev_value)?;
        writeln!(out, "code-to-test-ratio: 1:{current:.1} ({cond}) OK").unwrap();
    }
    if let Some(cond) = time_cond {
        let current = report.test_execution_time_nano();
        let prev_value = prev.as_ref().map_or(0.0, Report::test_execution_time_nano);
        check::acceptable(MetricKind::Duration, cond, current, prev_value)?;
        writeln!(
            out,
            "test-execution-time: {} ({cond}) OK",
            format_nano(current)
        )
        .unwrap();
    }
    Ok(out)
}

fn load_report(path: &Path) -> Result<Report> {
    let mut report = Report::new(ReportContext {
        repository: String::new(),
        ref_: String::new(),
        commit: String::new(),
        timestamp: chrono::Utc::now(),
    });
    report
        .load(path)
        .with_context(|| format!("failed to load report {}", path.display()))?;
    Ok(report)
}

/// Render a nanosecond count as a compact duration like "1m30s".
fn format_nano(nano: f64) -> String {
    let sign = if nano < 0.0 { "-" } else { "" };
    let secs = nano.abs() / 1e9;
    if secs >= 3600.0 {
        format!(
            "{sign}{}h{}m{:.0}s",
            (secs / 3600.0) as u64,
            ((secs % 3600.0) / 60.0) as u64,
            secs % 60.0
        )
    } else if secs >= 60.0 {
        format!("{sign}{}m{:.0}s", (secs / 60.0) as u64, secs % 60.0)
    } else {
        format!("{sign}{secs:.1}s")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn ctx() -> ReportContext {
        ReportContext {
            repository: "owner/repo".to_string(),
            ref_: "refs/heads/main".to_string(),
            commit: "abc123".to_string(),
            timestamp: Utc.timestamp_opt(1_621_234_567, 0).unwrap(),
        }
    }

    #[test]
    fn test_cmd_measure_emits_snapshot_json() {
        let dir = tempfile::tempdir().unwrap();
        let cov = dir.path().join("coverage.out");
        std::fs::write(&cov, "mode: set\npkg/f.go:3.1,5.2 2 1\n").unwrap();

        let out = cmd_measure(ctx(), &[cov], None, &[], &[]).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(parsed["repository"], "owner/repo");
        assert_eq!(parsed["coverage"]["type"], "statement");
        assert!(parsed.get("code_to_test_ratio").is_none());
    }

    #[test]
    fn test_cmd_measure_nothing_measured_fails() {
        assert!(cmd_measure(ctx(), &[], None, &[], &[]).is_err());
    }

    #[test]
    fn test_cmd_check_threshold() {
        let dir = tempfile::tempdir().unwrap();
        let cov = dir.path().join("coverage.out");
        std::fs::write(&cov, "mode: set\npkg/f.go:3.1,5.2 2 1\npkg/f.go:7.1,9.2 2 0\n")
            .unwrap();
        let snapshot = dir.path().join("report.json");
        let json = cmd_measure(ctx(), &[cov], None, &[], &[]).unwrap();
        std::fs::write(&snapshot, json).unwrap();

        let out = cmd_check(&snapshot, None, Some("50%"), None, None).unwrap();
        assert!(out.contains("OK"));

        let err = cmd_check(&snapshot, None, Some("60%"), None, None).unwrap_err();
        let err = err.downcast::<crate::error::CovgateError>().unwrap();
        assert!(err.is_threshold_not_met());
    }

    #[test]
    fn test_format_nano() {
        assert_eq!(format_nano(1.5e9), "1.5s");
        assert_eq!(format_nano(90.0 * 1e9), "1m30s");
        assert_eq!(format_nano(-10.0 * 1e9), "-10.0s");
        assert_eq!(format_nano(3661.0 * 1e9), "1h1m1s");
    }
}
