//! Pure occurrence arithmetic for recurring templates.
//!
//! Everything here is synchronous and side-effect free: given an anchor and
//! a rule, compute the next occurrence. Callers own persistence and the
//! decision of how far to iterate.

use chrono::{DateTime, Days, Months, Utc, Weekday};
use uuid::Uuid;

use crate::clock::start_of_day;
use crate::models::{RecurrenceMode, RecurrencePattern};

/// Recurrence columns of a template, detached from the row so the
/// calculator can stay storage-agnostic. `pattern` is kept as the raw
/// stored string; values this version doesn't recognize simply produce no
/// occurrences.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecurrenceRule {
    pub pattern: Option<String>,
    pub days: Option<Vec<String>>,
    pub end_date: Option<DateTime<Utc>>,
}

/// Row shape the recurrence engine needs, implemented by both tasks and
/// events so the materializer and lifecycle sweep can stay generic.
pub trait Recurring {
    fn id(&self) -> Uuid;
    fn owner(&self) -> &str;
    fn is_recurring(&self) -> bool;
    fn parent_id(&self) -> Option<Uuid>;
    /// The date a series is counted from: due date for tasks, start time
    /// for events. Templates without one never produce occurrences.
    fn anchor(&self) -> Option<DateTime<Utc>>;
    fn recurrence_mode(&self) -> Option<RecurrenceMode>;
    fn recurrence_count(&self) -> Option<i64>;
    fn recurrence_rule(&self) -> RecurrenceRule;
}

/// Canonical identity of an occurrence within a series, used to dedupe
/// instances against already-materialized rows. Second precision; UTC.
pub fn anchor_key(occurrence: DateTime<Utc>) -> String {
    occurrence.format("%Y-%m-%dT%H:%M:%S").to_string()
}

/// Computes the first occurrence strictly after `after`, or `None` when the
/// series is exhausted or the rule is unusable.
///
/// Patterns:
/// - `daily`: one day later, preserving the time of day.
/// - `weekly` without a usable day list: seven days later.
/// - `weekly` with named days: the next listed weekday after `after`,
///   at midnight UTC (wrapping to the following week when `after` already
///   sits on or past the last listed day).
/// - `monthly` / `yearly`: calendar addition, clamping to the shorter
///   month when the day of month doesn't exist (Jan 31 -> Feb 28).
///
/// A configured `end_date` is inclusive: a candidate falling exactly on it
/// still occurs, anything later ends the series.
pub fn next_occurrence(after: DateTime<Utc>, rule: &RecurrenceRule) -> Option<DateTime<Utc>> {
    let pattern: RecurrencePattern = rule.pattern.as_deref()?.parse().ok()?;

    let candidate = match pattern {
        RecurrencePattern::Daily => after.checked_add_days(Days::new(1))?,
        RecurrencePattern::Weekly => match parsed_day_indices(rule.days.as_deref()) {
            Some(days) => next_listed_weekday(after, &days)?,
            None => after.checked_add_days(Days::new(7))?,
        },
        RecurrencePattern::Monthly => after.checked_add_months(Months::new(1))?,
        RecurrencePattern::Yearly => after.checked_add_months(Months::new(12))?,
    };

    match rule.end_date {
        Some(end) if candidate > end => None,
        _ => Some(candidate),
    }
}

/// Day names to sorted, deduplicated indices (0 = Sunday .. 6 = Saturday).
/// Names chrono can't parse are skipped; `None` when nothing usable is
/// left, which sends weekly back to the plain seven-day step.
fn parsed_day_indices(days: Option<&[String]>) -> Option<Vec<u32>> {
    let mut indices: Vec<u32> = days?
        .iter()
        .filter_map(|name| name.trim().parse::<Weekday>().ok())
        .map(|day| day.num_days_from_sunday())
        .collect();
    indices.sort_unstable();
    indices.dedup();
    if indices.is_empty() {
        None
    } else {
        Some(indices)
    }
}

/// Midnight of the next weekday in `days` strictly after `after`'s day.
/// `days` must be sorted, deduplicated and non-empty.
fn next_listed_weekday(after: DateTime<Utc>, days: &[u32]) -> Option<DateTime<Utc>> {
    let current = after.weekday().num_days_from_sunday();
    let offset = match days.iter().find(|&&day| day > current) {
        Some(&day) => u64::from(day - current),
        None => u64::from(7 - current + days[0]),
    };
    start_of_day(after).checked_add_days(Days::new(offset))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, TimeZone, Timelike};
    use proptest::prelude::*;
    use rstest::rstest;

    fn rule(pattern: &str) -> RecurrenceRule {
        RecurrenceRule {
            pattern: Some(pattern.to_string()),
            ..Default::default()
        }
    }

    fn weekly_on(days: &[&str]) -> RecurrenceRule {
        RecurrenceRule {
            pattern: Some("weekly".to_string()),
            days: Some(days.iter().map(|d| d.to_string()).collect()),
            ..Default::default()
        }
    }

    #[test]
    fn daily_advances_one_day_preserving_time() {
        let after = Utc.with_ymd_and_hms(2025, 3, 10, 9, 30, 15).unwrap();
        let next = next_occurrence(after, &rule("daily")).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2025, 3, 11, 9, 30, 15).unwrap());
    }

    #[test]
    fn plain_weekly_advances_seven_days() {
        let after = Utc.with_ymd_and_hms(2025, 3, 10, 9, 30, 0).unwrap();
        let next = next_occurrence(after, &rule("weekly")).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2025, 3, 17, 9, 30, 0).unwrap());
    }

    #[rstest]
    // Wednesday afternoon; Friday is still ahead in the same week.
    #[case((2025, 3, 12, 15, 30), &["Monday", "Friday"], (2025, 3, 14))]
    // Saturday; every listed day has passed, wrap to Monday next week.
    #[case((2025, 3, 15, 10, 0), &["Monday"], (2025, 3, 17))]
    // Same weekday as the anchor is not "after" it; full week wrap.
    #[case((2025, 3, 10, 10, 0), &["Monday"], (2025, 3, 17))]
    // Unordered input with duplicates behaves like the sorted set.
    #[case((2025, 3, 12, 15, 30), &["friday", "Monday", "FRIDAY"], (2025, 3, 14))]
    // Sunday is index zero, reachable only by wrapping.
    #[case((2025, 3, 12, 15, 30), &["Sunday"], (2025, 3, 16))]
    fn weekly_with_days_lands_on_next_listed_midnight(
        #[case] after: (i32, u32, u32, u32, u32),
        #[case] days: &[&str],
        #[case] expected: (i32, u32, u32),
    ) {
        let (y, m, d, hh, mm) = after;
        let next =
            next_occurrence(Utc.with_ymd_and_hms(y, m, d, hh, mm, 0).unwrap(), &weekly_on(days))
                .unwrap();
        let (ey, em, ed) = expected;
        assert_eq!(next, Utc.with_ymd_and_hms(ey, em, ed, 0, 0, 0).unwrap());
    }

    #[test]
    fn weekly_with_unparseable_days_falls_back_to_seven_days() {
        let after = Utc.with_ymd_and_hms(2025, 3, 12, 15, 30, 0).unwrap();
        let next = next_occurrence(after, &weekly_on(&["Moonday", ""])).unwrap();
        assert_eq!(next, after + chrono::Duration::days(7));
    }

    #[test]
    fn weekly_with_empty_day_list_falls_back_to_seven_days() {
        let after = Utc.with_ymd_and_hms(2025, 3, 12, 15, 30, 0).unwrap();
        let next = next_occurrence(after, &weekly_on(&[])).unwrap();
        assert_eq!(next, after + chrono::Duration::days(7));
    }

    #[test]
    fn monthly_clamps_to_shorter_months() {
        let after = Utc.with_ymd_and_hms(2025, 1, 31, 8, 0, 0).unwrap();
        let next = next_occurrence(after, &rule("monthly")).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2025, 2, 28, 8, 0, 0).unwrap());
    }

    #[test]
    fn yearly_clamps_leap_day() {
        let after = Utc.with_ymd_and_hms(2024, 2, 29, 12, 0, 0).unwrap();
        let next = next_occurrence(after, &rule("yearly")).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2025, 2, 28, 12, 0, 0).unwrap());
    }

    #[test]
    fn end_date_is_inclusive() {
        let after = Utc.with_ymd_and_hms(2025, 3, 10, 9, 0, 0).unwrap();
        let mut bounded = rule("daily");
        bounded.end_date = Some(Utc.with_ymd_and_hms(2025, 3, 11, 9, 0, 0).unwrap());
        assert_eq!(
            next_occurrence(after, &bounded),
            Some(Utc.with_ymd_and_hms(2025, 3, 11, 9, 0, 0).unwrap())
        );

        bounded.end_date = Some(Utc.with_ymd_and_hms(2025, 3, 11, 8, 59, 59).unwrap());
        assert_eq!(next_occurrence(after, &bounded), None);
    }

    #[test]
    fn unknown_or_missing_pattern_produces_nothing() {
        let after = Utc.with_ymd_and_hms(2025, 3, 10, 9, 0, 0).unwrap();
        assert_eq!(next_occurrence(after, &rule("hourly")), None);
        assert_eq!(next_occurrence(after, &RecurrenceRule::default()), None);
    }

    #[test]
    fn anchor_key_has_second_precision() {
        let at = Utc.with_ymd_and_hms(2025, 3, 10, 9, 30, 15).unwrap();
        assert_eq!(anchor_key(at), "2025-03-10T09:30:15");
    }

    proptest! {
        #[test]
        fn every_pattern_moves_strictly_forward(
            days in 0i64..1825,
            secs in 0i64..86_400,
            pattern in prop_oneof![
                Just("daily"), Just("weekly"), Just("monthly"), Just("yearly")
            ],
        ) {
            let after = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap()
                + chrono::Duration::days(days)
                + chrono::Duration::seconds(secs);
            let next = next_occurrence(after, &rule(pattern)).unwrap();
            prop_assert!(next > after);
            // Same inputs, same answer.
            prop_assert_eq!(next_occurrence(after, &rule(pattern)), Some(next));
        }

        #[test]
        fn listed_weekdays_land_on_a_listed_midnight(
            days in 0i64..1825,
            secs in 0i64..86_400,
            picks in proptest::collection::vec(0usize..7, 1..4),
        ) {
            const NAMES: [&str; 7] = [
                "Sunday", "Monday", "Tuesday", "Wednesday",
                "Thursday", "Friday", "Saturday",
            ];
            let listed: Vec<&str> = picks.iter().map(|&i| NAMES[i]).collect();
            let after = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap()
                + chrono::Duration::days(days)
                + chrono::Duration::seconds(secs);

            let next = next_occurrence(after, &weekly_on(&listed)).unwrap();

            prop_assert!(next > after);
            prop_assert!(next <= after + chrono::Duration::days(8));
            prop_assert_eq!(next.time().num_seconds_from_midnight(), 0);
            let landed = next.weekday().num_days_from_sunday();
            prop_assert!(picks.iter().any(|&i| i as u32 == landed));
        }
    }
}
