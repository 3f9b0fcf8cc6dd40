use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime};

use super::interval::{IntervalSpec, IntervalUnit};

/// Formats the bucket label for one timestamp at the given granularity.
///
/// Month `YYYY-MM`, week `YYYY-MM-<n>W`, day `YYYY-MM-DD`, hour
/// `YYYY-MM-DD HH:00`, minute `YYYY-MM-DD HH:mm`. Stores that label raw
/// aggregates use this too, so both sides of the fill join agree byte-for-byte.
pub fn format_label(at: NaiveDateTime, unit: IntervalUnit) -> String {
    match unit {
        IntervalUnit::Month => at.format("%Y-%m").to_string(),
        IntervalUnit::Week => format!("{}-{}W", at.format("%Y-%m"), week_of_month(at.date())),
        IntervalUnit::Day => at.format("%Y-%m-%d").to_string(),
        IntervalUnit::Hour => at.format("%Y-%m-%d %H:00").to_string(),
        IntervalUnit::Minute => at.format("%Y-%m-%d %H:%M").to_string(),
    }
}

/// In-month week ordinal with Sunday-based weeks: 1 + whole weeks between the
/// Sunday on or before the 1st of the month and the Sunday on or before the
/// date. Not ISO week numbering, and labels are unique within a month.
fn week_of_month(date: NaiveDate) -> i64 {
    let first_of_month = date
        .with_day(1)
        .expect("day 1 exists in every month");

    (week_start(date) - week_start(first_of_month)).num_days() / 7 + 1
}

/// The Sunday on or before the given date.
fn week_start(date: NaiveDate) -> NaiveDate {
    date - Duration::days(date.weekday().num_days_from_sunday() as i64)
}

/// Enumerates the canonical, ordered, de-duplicated bucket labels covering
/// `[start 00:00, end 23:59]` inclusive.
///
/// The cursor is labeled before advancing. Minute and hour intervals step by
/// the multiplier of their own unit; day, week and month intervals all step by
/// `multiplier` days, with the coarser label formats collapsing the repeats.
pub fn bucket_labels(start: NaiveDate, end: NaiveDate, spec: &IntervalSpec) -> Vec<String> {
    let mut cursor = start
        .and_hms_opt(0, 0, 0)
        .expect("midnight exists on every date");
    let terminal = end
        .and_hms_opt(23, 59, 0)
        .expect("23:59 exists on every date");

    let step = match spec.unit {
        IntervalUnit::Minute => Duration::minutes(spec.multiplier as i64),
        IntervalUnit::Hour => Duration::hours(spec.multiplier as i64),
        IntervalUnit::Day | IntervalUnit::Week | IntervalUnit::Month => {
            Duration::days(spec.multiplier as i64)
        }
    };

    let mut labels: Vec<String> = Vec::new();

    while cursor <= terminal {
        let label = format_label(cursor, spec.unit);

        // steps are chronological, so repeats of a coarse label are adjacent
        if labels.last() != Some(&label) {
            labels.push(label);
        }

        cursor = cursor + step;
    }

    labels
}
