//! Test execution time aggregation.
//!
//! CI steps run in parallel jobs, so their execution windows may overlap
//! arbitrarily. The union of the windows — not their sum — is the true
//! elapsed test time.

use chrono::{DateTime, Duration, Utc};

/// The minimal CI-step surface the engine consumes: when a step started
/// and when it completed. The engine never fetches steps itself; callers
/// obtain them from their CI system.
pub trait ExecutionStep {
    fn started_at(&self) -> DateTime<Utc>;
    fn completed_at(&self) -> DateTime<Utc>;
}

/// A plain step record, for callers without their own step type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Step {
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

impl ExecutionStep for Step {
    fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    fn completed_at(&self) -> DateTime<Utc> {
        self.completed_at
    }
}

/// Merge possibly-overlapping step windows into their union duration.
///
/// Each window becomes two signed events (+1 at start, -1 at end); a sweep
/// over the sorted events accumulates `end - start` for every maximal run
/// where the counter is positive. Overlapping parallel steps are therefore
/// never double-counted. Zero steps yield a zero duration — whether that
/// is an error is the caller's call.
pub fn merge_execution_times<S: ExecutionStep>(steps: &[S]) -> Duration {
    let mut events: Vec<(DateTime<Utc>, i32)> = Vec::with_capacity(steps.len() * 2);
    for s in steps {
        events.push((s.started_at(), 1));
        events.push((s.completed_at(), -1));
    }
    events.sort_by_key(|(t, _)| *t);

    let mut total = Duration::zero();
    let mut window_start: Option<DateTime<Utc>> = None;
    let mut counter = 0;
    for (t, delta) in events {
        if counter == 0 {
            window_start = Some(t);
        }
        counter += delta;
        if counter == 0 {
            if let Some(start) = window_start.take() {
                total += t - start;
            }
        }
    }
    total
}
