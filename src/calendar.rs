//! Business-day calendar
//!
//! Dwell time is measured in business days ("dias úteis"): Monday to Friday,
//! no holiday calendar.

use chrono::{Datelike, Duration, NaiveDate};
use serde::{Deserialize, Serialize};

/// Whether `date` falls on Monday..=Friday
pub fn is_business_day(date: NaiveDate) -> bool {
    date.weekday().num_days_from_monday() < 5
}

/// Business days in `[start, end]`, both endpoints included.
///
/// Returns 0 when `end` is before `start`.
pub fn business_days_between(start: NaiveDate, end: NaiveDate) -> u32 {
    if end < start {
        return 0;
    }

    let total = (end - start).num_days() + 1;
    let full_weeks = total / 7;
    let remainder = total % 7;
    let first = i64::from(start.weekday().num_days_from_monday());

    let tail = (0..remainder).filter(|i| (first + i) % 7 < 5).count() as i64;
    (full_weeks * 5 + tail) as u32
}

/// Increment credited to a status that did not change between batches.
///
/// Counts the weekdays in the one-day window ending at `reference_date`,
/// excluding the previous date: 1 on a weekday, 0 on a weekend.
pub fn business_days_since_previous(reference_date: NaiveDate) -> u32 {
    let previous = reference_date - Duration::days(1);
    business_days_between(previous, reference_date)
        .saturating_sub(u32::from(is_business_day(previous)))
}

/// How a continuation (same status in consecutive batches) is credited
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContinuationPolicy {
    /// One business day per batch, whatever the gap since the last batch
    #[default]
    FlatIncrement,
    /// Every business day elapsed since the entity was last observed
    ElapsedBusinessDays,
}

impl ContinuationPolicy {
    /// Days added to the current status when it is observed again
    pub fn continuation_increment(&self, last_seen: NaiveDate, reference_date: NaiveDate) -> u32 {
        match self {
            ContinuationPolicy::FlatIncrement => business_days_since_previous(reference_date),
            ContinuationPolicy::ElapsedBusinessDays => last_seen
                .succ_opt()
                .map_or(0, |from| business_days_between(from, reference_date)),
        }
    }

    /// Days credited to the outgoing status when a transition is observed.
    ///
    /// Under the elapsed policy the outgoing interval ends the day before the
    /// new status was first seen, so the days after `last_seen` up to that end
    /// still belong to it.
    pub fn transition_credit(&self, last_seen: NaiveDate, reference_date: NaiveDate) -> u32 {
        match self {
            ContinuationPolicy::FlatIncrement => 0,
            ContinuationPolicy::ElapsedBusinessDays => {
                match (last_seen.succ_opt(), reference_date.pred_opt()) {
                    (Some(from), Some(to)) => business_days_between(from, to),
                    _ => 0,
                }
            }
        }
    }
}

impl std::str::FromStr for ContinuationPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "flat_increment" | "flat" => Ok(ContinuationPolicy::FlatIncrement),
            "elapsed_business_days" | "elapsed" => Ok(ContinuationPolicy::ElapsedBusinessDays),
            other => Err(format!(
                "unknown continuation policy '{}', expected flat_increment or elapsed_business_days",
                other
            )),
        }
    }
}

impl std::fmt::Display for ContinuationPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContinuationPolicy::FlatIncrement => f.write_str("flat_increment"),
            ContinuationPolicy::ElapsedBusinessDays => f.write_str("elapsed_business_days"),
        }
    }
}
