//! Threshold condition expressions.
//!
//! A condition gates one measured metric. The shorthand form is a bare
//! literal ("50%", "1:1.1", "1min30sec") compared against the current
//! value with the metric kind's default operator. The extended form is a
//! conjunction of comparison clauses over the identifiers `current`,
//! `prev` and `diff` (= current - prev):
//!
//!   current >= 50% && diff >= 0
//!
//! The shorthand is sugar for a single `current <op> literal` clause.
//! A malformed expression is a [`CovgateError::ConditionParse`]; a
//! well-formed expression that evaluates false is a
//! [`CovgateError::ThresholdNotMet`] — callers can tell "bad config"
//! apart from "metric below threshold".

use std::sync::LazyLock;

use regex::Regex;

use crate::error::{CovgateError, Result};

/// What a condition's bare literals mean, and which comparison applies
/// when none is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    /// Values are percentages; a trailing `%` is ignored numerically.
    /// Default operator `>=` (more coverage is better).
    Percentage,
    /// Values are quotients; `a:b` collapses to `b/a`.
    /// Default operator `>=`.
    Ratio,
    /// Values are durations in nanoseconds, written as unit tokens
    /// (`1min 30sec`). Default operator `<=` (less time is better).
    Duration,
}

impl MetricKind {
    fn default_op(self) -> Op {
        match self {
            MetricKind::Percentage | MetricKind::Ratio => Op::Ge,
            MetricKind::Duration => Op::Le,
        }
    }

    fn parse_literal(self, token: &str) -> Option<f64> {
        let token = token.trim();
        match self {
            MetricKind::Percentage => token.trim_end_matches('%').trim().parse().ok(),
            MetricKind::Ratio => match token.split_once(':') {
                Some((num, den)) => {
                    let num: f64 = num.trim().parse().ok()?;
                    let den: f64 = den.trim().parse().ok()?;
                    if num == 0.0 {
                        None
                    } else {
                        Some(den / num)
                    }
                }
                None => token.parse().ok(),
            },
            MetricKind::Duration => parse_duration_ns(token),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Ge,
    Gt,
    Le,
    Lt,
}

impl Op {
    fn eval(self, lhs: f64, rhs: f64) -> bool {
        match self {
            Op::Ge => lhs >= rhs,
            Op::Gt => lhs > rhs,
            Op::Le => lhs <= rhs,
            Op::Lt => lhs < rhs,
        }
    }
}

/// Evaluate `condition` against the current and previous metric values.
///
/// Returns `Ok(())` when every clause holds, `ThresholdNotMet` when the
/// expression is well formed but false, and `ConditionParse` naming the
/// offending token otherwise. An empty condition always passes.
pub fn acceptable(kind: MetricKind, condition: &str, current: f64, prev: f64) -> Result<()> {
    if condition.trim().is_empty() {
        return Ok(());
    }

    // Parse everything before evaluating anything, so a malformed later
    // clause is reported as a parse error even when an earlier clause
    // already failed.
    let mut clauses: Vec<(f64, Op, f64)> = Vec::new();
    for clause in condition.split("&&") {
        clauses.push(parse_clause(kind, condition, clause, current, prev)?);
    }

    if clauses.iter().all(|&(lhs, op, rhs)| op.eval(lhs, rhs)) {
        Ok(())
    } else {
        Err(CovgateError::ThresholdNotMet {
            condition: condition.to_string(),
        })
    }
}

fn parse_clause(
    kind: MetricKind,
    condition: &str,
    clause: &str,
    current: f64,
    prev: f64,
) -> Result<(f64, Op, f64)> {
    let clause = clause.trim();
    if clause.is_empty() {
        return Err(parse_error(condition, clause));
    }

    let (lhs, op, rhs) = match clause.find(['<', '>']) {
        Some(pos) => {
            let (op, op_len) = match &clause[pos..] {
                s if s.starts_with(">=") => (Op::Ge, 2),
                s if s.starts_with("<=") => (Op::Le, 2),
                s if s.starts_with('>') => (Op::Gt, 1),
                _ => (Op::Lt, 1),
            };
            let lhs = clause[..pos].trim();
            let rhs = clause[pos + op_len..].trim();
            // A bare ">= 50%" implies the current value on the left.
            let lhs = if lhs.is_empty() { "current" } else { lhs };
            (lhs, op, rhs)
        }
        None => ("current", kind.default_op(), clause),
    };

    let lhs = term_value(kind, condition, lhs, current, prev)?;
    let rhs = term_value(kind, condition, rhs, current, prev)?;
    Ok((lhs, op, rhs))
}

fn term_value(
    kind: MetricKind,
    condition: &str,
    token: &str,
    current: f64,
    prev: f64,
) -> Result<f64> {
    match token {
        "current" => Ok(current),
        "prev" => Ok(prev),
        "diff" => Ok(current - prev),
        _ => kind
            .parse_literal(token)
            .ok_or_else(|| parse_error(condition, token)),
    }
}

fn parse_error(condition: &str, token: &str) -> CovgateError {
    CovgateError::ConditionParse {
        condition: condition.to_string(),
        token: token.to_string(),
    }
}

static DURATION_TOKEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([0-9]+(?:\.[0-9]+)?)\s*([a-zµ]+)").unwrap());

/// Parse a duration literal composed of one or more `<value><unit>`
/// tokens, optionally whitespace-separated ("1min1sec", "1 min 1 sec").
/// Returns the total in nanoseconds, or `None` when any token is unknown
/// or anything but whitespace is left over.
fn parse_duration_ns(s: &str) -> Option<f64> {
    let mut total = 0.0;
    let mut any = false;
    for cap in DURATION_TOKEN_RE.captures_iter(s) {
        let value: f64 = cap[1].parse().ok()?;
        let unit_ns: f64 = match &cap[2] {
            "ns" | "nsec" | "nanosecond" | "nanoseconds" => 1.0,
            "us" | "µs" | "usec" | "microsecond" | "microseconds" => 1e3,
            "ms" | "msec" | "millisecond" | "milliseconds" => 1e6,
            "s" | "sec" | "second" | "seconds" => 1e9,
            "m" | "min" | "minute" | "minutes" => 60.0 * 1e9,
            "h" | "hr" | "hour" | "hours" => 3600.0 * 1e9,
            "d" | "day" | "days" => 86400.0 * 1e9,
            _ => return None,
        };
        total += value * unit_ns;
        any = true;
    }
    if !any {
        return None;
    }
    let rest = DURATION_TOKEN_RE.replace_all(s, "");
    if !rest.trim().is_empty() {
        return None;
    }
    Some(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINUTE: f64 = 60.0 * 1e9;
    const SECOND: f64 = 1e9;

    fn ok(kind: MetricKind, cond: &str, current: f64, prev: f64) -> bool {
        match acceptable(kind, cond, current, prev) {
            Ok(()) => true,
            Err(CovgateError::ThresholdNotMet { .. }) => false,
            Err(e) => panic!("unexpected parse failure for {cond:?}: {e}"),
        }
    }

    #[test]
    fn test_percentage_shorthand() {
        let k = MetricKind::Percentage;
        assert!(!ok(k, "60%", 50.0, 0.0));
        assert!(ok(k, "50%", 50.0, 0.0));
        assert!(ok(k, "49.9%", 50.0, 0.0));
        assert!(ok(k, "49.9", 50.0, 0.0));
        assert!(!ok(k, ">= 60%", 50.0, 0.0));
        assert!(ok(k, ">= 50%", 50.0, 0.0));
        assert!(ok(k, ">=49.9%", 50.0, 0.0));
        assert!(ok(k, ">=49.9", 50.0, 0.0));
    }

    #[test]
    fn test_percentage_extended() {
        let k = MetricKind::Percentage;
        assert!(!ok(k, "current >= 60%", 50.0, 0.0));
        assert!(ok(k, "current > prev", 50.0, 49.0));
        assert!(ok(k, "diff >= 0", 50.0, 49.0));
        assert!(ok(k, "current >= 50% && diff >= 0%", 50.0, 49.0));
        assert!(!ok(k, "current >= 50% && diff >= 2%", 50.0, 49.0));
    }

    #[test]
    fn test_ratio_shorthand() {
        let k = MetricKind::Ratio;
        assert!(ok(k, "1:1", 1.0, 0.0));
        assert!(!ok(k, "1:1.1", 1.0, 0.0));
        assert!(ok(k, "1", 1.0, 0.0));
        assert!(!ok(k, "1.1", 1.0, 0.0));
        assert!(ok(k, ">= 1:1", 1.0, 0.0));
        assert!(!ok(k, ">=1:1.1", 1.0, 0.0));
    }

    #[test]
    fn test_ratio_extended() {
        let k = MetricKind::Ratio;
        assert!(ok(k, "current >= 1.1", 1.2, 1.1));
        assert!(ok(k, "current > prev", 1.2, 1.1));
        assert!(ok(k, "diff >= 0", 1.2, 1.1));
        assert!(ok(k, "current >= 1.1 && diff >= 0", 1.2, 1.1));
    }

    #[test]
    fn test_duration_shorthand() {
        let k = MetricKind::Duration;
        assert!(ok(k, "1min", MINUTE, 0.0));
        assert!(!ok(k, "59s", MINUTE, 0.0));
        assert!(ok(k, "61sec", MINUTE, 0.0));
        assert!(ok(k, "<= 1min", MINUTE, 0.0));
        assert!(!ok(k, "<=59s", MINUTE, 0.0));
        assert!(ok(k, "1 min", MINUTE, 0.0));
        assert!(!ok(k, "59 s", MINUTE, 0.0));
        assert!(ok(k, "1min1sec", MINUTE, 0.0));
        assert!(ok(k, "<=1min1sec", MINUTE, 0.0));
        assert!(ok(k, "<= 1 min 1 sec", MINUTE, 0.0));
        assert!(ok(k, "current <= 1 min 1 sec", MINUTE, 0.0));
    }

    #[test]
    fn test_duration_extended() {
        let k = MetricKind::Duration;
        assert!(ok(k, "current <= 1min", MINUTE, 59.0 * SECOND));
        assert!(ok(k, "current > prev", MINUTE, 59.0 * SECOND));
        assert!(ok(k, "diff <= 1sec", MINUTE, 59.0 * SECOND));
        assert!(ok(k, "current <= 1min && diff <= 1sec", MINUTE, 59.0 * SECOND));
    }

    #[test]
    fn test_duration_literal_forms_are_equivalent() {
        let want = MINUTE + SECOND;
        for form in ["1min1sec", "1 min 1 sec", "61s", "61 sec", "61000ms"] {
            assert_eq!(parse_duration_ns(form), Some(want), "{form}");
        }
    }

    #[test]
    fn test_empty_condition_passes() {
        assert!(acceptable(MetricKind::Percentage, "", 0.0, 0.0).is_ok());
        assert!(acceptable(MetricKind::Percentage, "  ", 0.0, 0.0).is_ok());
    }

    #[test]
    fn test_parse_errors_name_the_token() {
        let err = acceptable(MetricKind::Percentage, "fifty%", 50.0, 0.0).unwrap_err();
        match err {
            CovgateError::ConditionParse { token, .. } => assert_eq!(token, "fifty%"),
            other => panic!("unexpected error: {other}"),
        }

        assert!(matches!(
            acceptable(MetricKind::Duration, "1 parsec", 0.0, 0.0),
            Err(CovgateError::ConditionParse { .. })
        ));
        assert!(matches!(
            acceptable(MetricKind::Ratio, "0:1", 1.0, 0.0),
            Err(CovgateError::ConditionParse { .. })
        ));
        assert!(matches!(
            acceptable(MetricKind::Percentage, "50% && ", 50.0, 0.0),
            Err(CovgateError::ConditionParse { .. })
        ));
    }

    #[test]
    fn test_parse_error_wins_over_failed_clause() {
        // The first clause already fails, but the malformed second clause
        // must still surface as a parse error.
        let err = acceptable(MetricKind::Percentage, "60% && bogus", 50.0, 0.0).unwrap_err();
        assert!(matches!(err, CovgateError::ConditionParse { .. }));
    }

    #[test]
    fn test_threshold_not_met_carries_condition_text() {
        let err = acceptable(MetricKind::Percentage, "60%", 50.0, 0.0).unwrap_err();
        match err {
            CovgateError::ThresholdNotMet { condition } => assert_eq!(condition, "60%"),
            other => panic!("unexpected error: {other}"),
        }
    }
}
