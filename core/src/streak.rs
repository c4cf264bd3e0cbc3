use std::collections::HashSet;

use chrono::{Duration, NaiveDate};
use serde::Serialize;

use crate::models::HabitEntry;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StreakSummary {
    pub current: i64,
    pub best: i64,
}

/// Derive current and best consecutive-completion streaks from a habit's
/// entries, measured against `today`.
///
/// Input order does not matter and duplicate dates are collapsed. The
/// computation is pure: recomputing over the same entries always yields the
/// same result, and persisting it is the caller's job.
///
/// Day distance is taken on calendar dates, not elapsed time, so streaks are
/// unaffected by DST transitions.
#[must_use]
pub fn compute_streaks(entries: &[HabitEntry], today: NaiveDate) -> StreakSummary {
    let unique: HashSet<NaiveDate> = entries
        .iter()
        .filter(|e| e.completed)
        .map(|e| e.date)
        .collect();
    let mut dates: Vec<NaiveDate> = unique.into_iter().collect();
    dates.sort_unstable_by(|a, b| b.cmp(a));

    // Current: walk backward from today; the run ends at the first day whose
    // completed entry is missing. A run that does not include today is 0.
    let mut current: i64 = 0;
    for date in &dates {
        let expected = today - Duration::days(current);
        if *date == expected {
            current += 1;
        } else {
            break;
        }
    }

    // Best: newest-to-oldest scan; a run extends while each date is exactly
    // one day before the previous, and any gap restarts it at 1.
    let mut best: i64 = 0;
    let mut run: i64 = 0;
    let mut prev: Option<NaiveDate> = None;
    for date in &dates {
        run = match prev {
            Some(p) if (p - *date).num_days() == 1 => run + 1,
            _ => 1,
        };
        best = best.max(run);
        prev = Some(*date);
    }

    StreakSummary {
        current,
        // The in-progress run may itself be the longest.
        best: best.max(current),
    }
}
