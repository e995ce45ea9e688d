use chrono::{Datelike, Days, Duration, Months, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::models::EventTemplate;
use crate::rule::{Frequency, RecurrenceBound, Rule};

/// A single materialized occurrence before any exception is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Occurrence {
    pub date: NaiveDate,
    pub starts_at: NaiveDateTime,
    pub ends_at: NaiveDateTime,
}

impl Occurrence {
    /// Composes the occurrence on `date` from the anchor's time-of-day and
    /// duration. An end past the representable range saturates.
    pub fn on(date: NaiveDate, anchor_start: NaiveDateTime, anchor_end: NaiveDateTime) -> Self {
        let starts_at = date.and_time(anchor_start.time());
        Occurrence {
            date,
            starts_at,
            ends_at: starts_at
                .checked_add_signed(anchor_end - anchor_start)
                .unwrap_or(NaiveDateTime::MAX),
        }
    }
}

/// Stop conditions that do not come from the rule text itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaterializationLimits {
    /// Last date (inclusive) that may be generated.
    pub horizon: NaiveDate,
    /// COUNT applied to rules that carry neither COUNT nor UNTIL.
    pub default_count: u32,
    /// Hard cap regardless of the rule.
    pub max_occurrences: usize,
}

/// Expands `rule` from the anchor into an ordered, finite list of occurrences.
///
/// # Arguments
/// * `rule` - Parsed recurrence rule
/// * `anchor_start` - First possible occurrence; its time-of-day is reused
/// * `anchor_end` - Together with `anchor_start` gives each occurrence's duration
/// * `limits` - Horizon, default count and hard cap
///
/// # Behavior
/// - DAILY/WEEKLY step by `interval` days/weeks from the anchor date
/// - WEEKLY with BYDAY walks every interval-th Monday-based week, emitting the
///   listed weekdays in order and skipping days before the anchor
/// - MONTHLY/YEARLY keep the anchor's day (and month); days that do not exist
///   in a period are skipped, never clamped, and do not count toward COUNT
/// - Stops at COUNT, after UNTIL, after the horizon, or at the hard cap
pub fn materialize(
    rule: &Rule,
    anchor_start: NaiveDateTime,
    anchor_end: NaiveDateTime,
    limits: &MaterializationLimits,
) -> Vec<Occurrence> {
    let anchor = anchor_start.date();
    let count = match rule.bound {
        Some(RecurrenceBound::Count(n)) => n as usize,
        Some(RecurrenceBound::Until(_)) => limits.max_occurrences,
        None => limits.default_count as usize,
    }
    .min(limits.max_occurrences);
    let last = match rule.until() {
        Some(until) => until.min(limits.horizon),
        None => limits.horizon,
    };

    let mut dates = Vec::new();
    if count == 0 || anchor > last {
        return Vec::new();
    }

    let interval = rule.interval.max(1);
    match rule.frequency {
        Frequency::Daily => step_days(anchor, u64::from(interval), last, count, &mut dates),
        Frequency::Weekly if rule.by_day.is_empty() => {
            step_days(anchor, 7 * u64::from(interval), last, count, &mut dates)
        }
        Frequency::Weekly => weekly_by_day(rule, anchor, interval, last, count, &mut dates),
        Frequency::Monthly => step_months(anchor, interval, last, count, &mut dates),
        Frequency::Yearly => step_months(anchor, interval.saturating_mul(12), last, count, &mut dates),
    }

    debug!(
        rule = %rule,
        anchor = %anchor,
        horizon = %limits.horizon,
        generated = dates.len(),
        "materialized occurrence dates"
    );

    dates
        .into_iter()
        .map(|date| Occurrence::on(date, anchor_start, anchor_end))
        .collect()
}

fn step_days(anchor: NaiveDate, step: u64, last: NaiveDate, count: usize, out: &mut Vec<NaiveDate>) {
    let mut current = Some(anchor);
    while let Some(date) = current {
        if date > last || out.len() >= count {
            break;
        }
        out.push(date);
        current = date.checked_add_days(Days::new(step));
    }
}

fn weekly_by_day(
    rule: &Rule,
    anchor: NaiveDate,
    interval: u32,
    last: NaiveDate,
    count: usize,
    out: &mut Vec<NaiveDate>,
) {
    let offset = u64::from(anchor.weekday().num_days_from_monday());
    let Some(mut week_start) = anchor.checked_sub_days(Days::new(offset)) else {
        return;
    };

    loop {
        for day in &rule.by_day {
            let Some(date) = week_start.checked_add_days(Days::new(u64::from(day.num_days_from_monday())))
            else {
                return;
            };
            if date < anchor {
                continue;
            }
            if date > last || out.len() >= count {
                return;
            }
            out.push(date);
        }
        match week_start.checked_add_days(Days::new(7 * u64::from(interval))) {
            Some(next) if next <= last => week_start = next,
            _ => return,
        }
    }
}

fn step_months(anchor: NaiveDate, step: u32, last: NaiveDate, count: usize, out: &mut Vec<NaiveDate>) {
    let day = anchor.day();
    let Some(first_of_anchor_month) = anchor.with_day(1) else {
        return;
    };

    for k in 0u32.. {
        let Some(months) = k.checked_mul(step) else {
            return;
        };
        let Some(period_start) = first_of_anchor_month.checked_add_months(Months::new(months)) else {
            return;
        };
        if period_start > last || out.len() >= count {
            return;
        }
        // Missing days (the 31st, Feb 29) are skipped rather than clamped.
        if let Some(date) = period_start.with_day(day) {
            if date > last {
                return;
            }
            out.push(date);
        }
    }
}

// ============================================================================
// Materialization configuration
// ============================================================================

/// What happens to exceptions at or after the pivot when a
/// this-and-future update splits a template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExceptionCarryPolicy {
    /// Exceptions move to the new template together with their instances.
    #[default]
    MoveWithInstances,
    /// Exceptions are deleted and the moved instances follow the new template.
    Discard,
}

/// Configuration for materialization behavior
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaterializationConfig {
    /// COUNT used when a rule has neither COUNT nor UNTIL
    pub default_count: u32,
    /// Days after a template's anchor date that materialization may reach
    pub horizon_days: u32,
    /// Hard cap on occurrences per template
    pub max_occurrences: u32,
    /// Exception handling for this-and-future splits
    pub exception_carry: ExceptionCarryPolicy,
}

impl Default for MaterializationConfig {
    fn default() -> Self {
        Self {
            default_count: 10,
            horizon_days: 730,
            max_occurrences: 1000,
            exception_carry: ExceptionCarryPolicy::MoveWithInstances,
        }
    }
}

/// Applies a [`MaterializationConfig`] to templates.
#[derive(Debug, Clone, Default)]
pub struct MaterializationManager {
    config: MaterializationConfig,
}

impl MaterializationManager {
    /// Creates a new MaterializationManager with the given configuration.
    pub fn new(config: MaterializationConfig) -> Self {
        Self { config }
    }

    /// Creates a MaterializationManager with default configuration.
    pub fn with_defaults() -> Self {
        Self::new(MaterializationConfig::default())
    }

    pub fn config(&self) -> &MaterializationConfig {
        &self.config
    }

    /// Limits for a series anchored on `anchor`. The horizon is measured from
    /// the anchor, so regeneration gives the same answer whenever it runs.
    pub fn limits_for(&self, anchor: NaiveDate) -> MaterializationLimits {
        let horizon = anchor
            .checked_add_signed(Duration::days(i64::from(self.config.horizon_days)))
            .unwrap_or(NaiveDate::MAX);
        MaterializationLimits {
            horizon,
            default_count: self.config.default_count,
            max_occurrences: self.config.max_occurrences as usize,
        }
    }

    /// Materializes a template's full occurrence set.
    pub fn materialize(&self, template: &EventTemplate) -> Vec<Occurrence> {
        self.materialize_rule(&template.rule, template.anchor_start, template.anchor_end)
    }

    pub fn materialize_rule(
        &self,
        rule: &Rule,
        anchor_start: NaiveDateTime,
        anchor_end: NaiveDateTime,
    ) -> Vec<Occurrence> {
        let limits = self.limits_for(anchor_start.date());
        materialize(rule, anchor_start, anchor_end, &limits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveTime, Weekday};
    use proptest::prelude::*;
    use rstest::rstest;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn at(d: NaiveDate, h: u32, min: u32) -> NaiveDateTime {
        d.and_time(NaiveTime::from_hms_opt(h, min, 0).unwrap())
    }

    fn limits() -> MaterializationLimits {
        MaterializationManager::with_defaults().limits_for(date(2023, 1, 1))
    }

    fn dates(rule: &str, anchor: NaiveDate) -> Vec<NaiveDate> {
        let rule = Rule::parse(rule).unwrap();
        let manager = MaterializationManager::new(MaterializationConfig {
            horizon_days: 36_500,
            ..Default::default()
        });
        manager
            .materialize_rule(&rule, at(anchor, 9, 0), at(anchor, 10, 0))
            .into_iter()
            .map(|o| o.date)
            .collect()
    }

    mod daily_and_weekly {
        use super::*;

        #[test]
        fn test_daily_count_produces_consecutive_days() {
            let result = dates("FREQ=DAILY;COUNT=10", date(2023, 1, 1));
            let expected: Vec<_> = (1..=10).map(|d| date(2023, 1, d)).collect();
            assert_eq!(result, expected);
        }

        #[test]
        fn test_daily_interval_with_until_is_inclusive() {
            let result = dates("FREQ=DAILY;INTERVAL=3;UNTIL=2023-01-10", date(2023, 1, 1));
            assert_eq!(result, vec![date(2023, 1, 1), date(2023, 1, 4), date(2023, 1, 7), date(2023, 1, 10)]);
        }

        #[test]
        fn test_weekly_by_day_starting_monday() {
            // 2024-01-01 is a Monday
            let result = dates("FREQ=WEEKLY;BYDAY=MO,WE;COUNT=4", date(2024, 1, 1));
            assert_eq!(result, vec![date(2024, 1, 1), date(2024, 1, 3), date(2024, 1, 8), date(2024, 1, 10)]);
            assert!(result.iter().all(|d| matches!(d.weekday(), Weekday::Mon | Weekday::Wed)));
        }

        #[test]
        fn test_weekly_by_day_skips_days_before_anchor() {
            // Anchor on Wednesday 2024-01-03: Monday of that week is not emitted.
            let result = dates("FREQ=WEEKLY;BYDAY=MO,WE,FR;COUNT=4", date(2024, 1, 3));
            assert_eq!(result, vec![date(2024, 1, 3), date(2024, 1, 5), date(2024, 1, 8), date(2024, 1, 10)]);
        }

        #[test]
        fn test_weekly_by_day_honours_interval_windows() {
            let result = dates("FREQ=WEEKLY;INTERVAL=2;BYDAY=TU,TH;COUNT=4", date(2024, 1, 1));
            assert_eq!(result, vec![date(2024, 1, 2), date(2024, 1, 4), date(2024, 1, 16), date(2024, 1, 18)]);
        }

        #[test]
        fn test_by_day_is_ignored_for_daily() {
            let result = dates("FREQ=DAILY;COUNT=3;BYDAY=MO", date(2024, 1, 3));
            assert_eq!(result, vec![date(2024, 1, 3), date(2024, 1, 4), date(2024, 1, 5)]);
        }
    }

    mod monthly_and_yearly {
        use super::*;

        #[test]
        fn test_monthly_on_the_15th() {
            let result = dates("FREQ=MONTHLY;COUNT=6", date(2023, 10, 15));
            let expected = vec![
                date(2023, 10, 15),
                date(2023, 11, 15),
                date(2023, 12, 15),
                date(2024, 1, 15),
                date(2024, 2, 15),
                date(2024, 3, 15),
            ];
            assert_eq!(result, expected);
        }

        #[test]
        fn test_monthly_on_the_31st_skips_short_months() {
            let result = dates("FREQ=MONTHLY;COUNT=5", date(2024, 1, 31));
            assert_eq!(
                result,
                vec![date(2024, 1, 31), date(2024, 3, 31), date(2024, 5, 31), date(2024, 7, 31), date(2024, 8, 31)]
            );
        }

        #[test]
        fn test_yearly_leap_day_skips_common_years() {
            let result = dates("FREQ=YEARLY;COUNT=2", date(2024, 2, 29));
            assert_eq!(result, vec![date(2024, 2, 29), date(2028, 2, 29)]);
        }

        #[test]
        fn test_yearly_interval() {
            let result = dates("FREQ=YEARLY;INTERVAL=2;COUNT=3", date(2020, 6, 1));
            assert_eq!(result, vec![date(2020, 6, 1), date(2022, 6, 1), date(2024, 6, 1)]);
        }
    }

    mod bounds {
        use super::*;

        #[test]
        fn test_default_count_applies_without_bound() {
            assert_eq!(dates("FREQ=DAILY", date(2023, 1, 1)).len(), 10);
        }

        #[test]
        fn test_horizon_stops_unbounded_until() {
            let rule = Rule::parse("FREQ=DAILY;UNTIL=2099-12-31").unwrap();
            let limits = MaterializationLimits { horizon: date(2023, 1, 5), ..limits() };
            let result = materialize(&rule, at(date(2023, 1, 1), 9, 0), at(date(2023, 1, 1), 9, 0), &limits);
            assert_eq!(result.len(), 5);
            assert_eq!(result.last().unwrap().date, date(2023, 1, 5));
        }

        #[test]
        fn test_hard_cap_limits_count() {
            let rule = Rule::parse("FREQ=DAILY;COUNT=500").unwrap();
            let limits = MaterializationLimits { max_occurrences: 20, ..limits() };
            let result = materialize(&rule, at(date(2023, 1, 1), 9, 0), at(date(2023, 1, 1), 9, 0), &limits);
            assert_eq!(result.len(), 20);
        }

        #[rstest]
        #[case("FREQ=DAILY;UNTIL=2022-12-31")]
        #[case("FREQ=WEEKLY;UNTIL=2022-12-31;BYDAY=MO")]
        #[case("FREQ=MONTHLY;UNTIL=2022-12-31")]
        fn test_until_before_anchor_is_empty(#[case] text: &str) {
            assert!(dates(text, date(2023, 1, 1)).is_empty());
        }
    }

    mod timing {
        use super::*;

        #[test]
        fn test_occurrences_keep_anchor_time_and_duration() {
            let rule = Rule::parse("FREQ=DAILY;COUNT=2").unwrap();
            let anchor = date(2023, 3, 1);
            let result = materialize(&rule, at(anchor, 22, 0), at(anchor, 23, 30), &limits());
            assert_eq!(result[1].starts_at, at(date(2023, 3, 2), 22, 0));
            assert_eq!(result[1].ends_at, at(date(2023, 3, 2), 23, 30));
        }

        #[test]
        fn test_duration_may_cross_midnight() {
            let occurrence = Occurrence::on(date(2023, 3, 5), at(date(2023, 3, 1), 23, 0), at(date(2023, 3, 2), 1, 0));
            assert_eq!(occurrence.ends_at, at(date(2023, 3, 6), 1, 0));
        }

        #[test]
        fn test_end_saturates_on_the_last_representable_day() {
            let occurrence = Occurrence::on(NaiveDate::MAX, at(date(2023, 3, 1), 23, 0), at(date(2023, 3, 2), 1, 0));
            assert_eq!(occurrence.starts_at, at(NaiveDate::MAX, 23, 0));
            assert_eq!(occurrence.ends_at, NaiveDateTime::MAX);
        }

        #[test]
        fn test_materialization_is_repeatable() {
            let rule = Rule::parse("FREQ=WEEKLY;BYDAY=TU,SA;COUNT=9").unwrap();
            let anchor = date(2023, 5, 2);
            let first = materialize(&rule, at(anchor, 8, 0), at(anchor, 9, 0), &limits());
            let second = materialize(&rule, at(anchor, 8, 0), at(anchor, 9, 0), &limits());
            assert_eq!(first, second);
        }
    }

    mod manager {
        use super::*;

        #[test]
        fn test_limits_are_anchor_relative() {
            let manager = MaterializationManager::new(MaterializationConfig { horizon_days: 30, ..Default::default() });
            assert_eq!(manager.limits_for(date(2023, 1, 1)).horizon, date(2023, 1, 31));
        }

        #[test]
        fn test_config_deserializes_with_defaults() {
            let config: MaterializationConfig =
                serde_json::from_str(r#"{"default_count": 5, "exception_carry": "discard"}"#).unwrap();
            assert_eq!(config.default_count, 5);
            assert_eq!(config.horizon_days, 730);
            assert_eq!(config.exception_carry, ExceptionCarryPolicy::Discard);
        }
    }

    proptest! {
        #[test]
        fn prop_weekly_count_spacing(
            count in 1u32..60,
            interval in 1u32..5,
            offset in 0i64..3650,
        ) {
            let anchor = date(2015, 1, 1) + Duration::days(offset);
            let rule = Rule::parse(&format!("FREQ=WEEKLY;INTERVAL={};COUNT={}", interval, count)).unwrap();
            let limits = MaterializationLimits {
                horizon: NaiveDate::MAX,
                default_count: 10,
                max_occurrences: 10_000,
            };
            let result = materialize(&rule, at(anchor, 12, 0), at(anchor, 13, 0), &limits);

            prop_assert_eq!(result.len(), count as usize);
            prop_assert_eq!(result[0].date, anchor);
            for pair in result.windows(2) {
                prop_assert_eq!((pair[1].date - pair[0].date).num_days(), 7 * i64::from(interval));
            }
        }

        #[test]
        fn prop_monthly_dates_keep_day_of_month(day in 1u32..=31, count in 1u32..24) {
            let anchor = date(2024, 1, day);
            let rule = Rule::parse(&format!("FREQ=MONTHLY;COUNT={}", count)).unwrap();
            let limits = MaterializationLimits {
                horizon: NaiveDate::MAX,
                default_count: 10,
                max_occurrences: 10_000,
            };
            let result = materialize(&rule, at(anchor, 12, 0), at(anchor, 12, 0), &limits);

            prop_assert_eq!(result.len(), count as usize);
            prop_assert!(result.iter().all(|o| o.date.day() == day));
            prop_assert!(result.windows(2).all(|w| w[0].date < w[1].date));
        }
    }
}
