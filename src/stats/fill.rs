use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::buckets::bucket_labels;
use super::interval::IntervalSpec;

/// One bucket of a statistics series. The payload is flattened so the wire
/// shape is `{date, ...payload}`: `{date, cnt}` for counts, `{date, units}`
/// for telemetry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesPoint<T> {
    pub date: String,
    #[serde(flatten)]
    pub value: T,
}

/// Count payload for user statistics series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountValue {
    pub cnt: i64,
}

/// Joins sparse points against the canonical bucket set, emitting
/// `null_value` for every bucket with no exact label match. Output order is
/// canonical label order regardless of how `raw` was ordered.
pub fn fill<T: Clone>(
    raw: &[SeriesPoint<T>],
    start: NaiveDate,
    end: NaiveDate,
    spec: &IntervalSpec,
    null_value: T,
) -> Vec<SeriesPoint<T>> {
    bucket_labels(start, end, spec)
        .into_iter()
        .map(|date| {
            let value = raw
                .iter()
                .find(|point| point.date == date)
                .map(|point| point.value.clone())
                .unwrap_or_else(|| null_value.clone());

            SeriesPoint { date, value }
        })
        .collect()
}

/// Gap fill for a running-total count series.
///
/// After the plain fill (gaps become 0), a first-bucket 0 is replaced by
/// `seed`, the true total just before the range, and a forward pass carries
/// the last seen value into every remaining 0. A genuine zero count is
/// indistinguishable from a gap here and is carried over the same way; that
/// ambiguity is inherited and intentionally not resolved.
pub fn fill_cumulative(
    raw: &[SeriesPoint<CountValue>],
    start: NaiveDate,
    end: NaiveDate,
    spec: &IntervalSpec,
    seed: i64,
) -> Vec<SeriesPoint<CountValue>> {
    let mut filled = fill(raw, start, end, spec, CountValue { cnt: 0 });

    if let Some(first) = filled.first_mut() {
        if first.value.cnt == 0 {
            first.value.cnt = seed;
        }
    }

    let mut carried = filled.first().map(|point| point.value.cnt).unwrap_or(0);

    for point in filled.iter_mut().skip(1) {
        if point.value.cnt == 0 {
            point.value.cnt = carried;
        } else {
            carried = point.value.cnt;
        }
    }

    filled
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn spec(input: &str) -> IntervalSpec {
        IntervalSpec::parse(input).unwrap()
    }

    fn count_point(label: &str, cnt: i64) -> SeriesPoint<CountValue> {
        SeriesPoint {
            date: label.to_string(),
            value: CountValue { cnt },
        }
    }

    #[test]
    fn test_fill_pads_every_missing_hour() {
        let raw = vec![count_point("2019-04-10 02:00", 5)];
        let filled = fill(
            &raw,
            date(2019, 4, 10),
            date(2019, 4, 10),
            &spec("1h"),
            CountValue { cnt: -1 },
        );

        assert_eq!(filled.len(), 24);
        assert_eq!(filled[2], count_point("2019-04-10 02:00", 5));
        for (index, point) in filled.iter().enumerate() {
            if index != 2 {
                assert_eq!(point.value.cnt, -1, "bucket {} should be null", point.date);
            }
        }
    }

    #[test]
    fn test_fill_orders_by_canonical_labels_not_input_order() {
        let raw = vec![
            count_point("2019-04-12", 3),
            count_point("2019-04-10", 1),
        ];
        let filled = fill(
            &raw,
            date(2019, 4, 10),
            date(2019, 4, 12),
            &spec("1d"),
            CountValue { cnt: 0 },
        );

        assert_eq!(
            filled,
            vec![
                count_point("2019-04-10", 1),
                count_point("2019-04-11", 0),
                count_point("2019-04-12", 3)
            ]
        );
    }

    #[test]
    fn test_cumulative_carries_last_value_over_zeros() {
        // seed loses to a populated first bucket; zero means "no new data"
        let raw = vec![
            count_point("2019-04-10", 12),
            count_point("2019-04-12", 0),
        ];
        let filled = fill_cumulative(
            &raw,
            date(2019, 4, 10),
            date(2019, 4, 12),
            &spec("1d"),
            10,
        );

        assert_eq!(
            filled,
            vec![
                count_point("2019-04-10", 12),
                count_point("2019-04-11", 12),
                count_point("2019-04-12", 12)
            ]
        );
    }

    #[test]
    fn test_cumulative_seeds_a_gap_first_bucket() {
        let raw = vec![count_point("2019-04-11", 15)];
        let filled = fill_cumulative(
            &raw,
            date(2019, 4, 10),
            date(2019, 4, 12),
            &spec("1d"),
            10,
        );

        assert_eq!(
            filled,
            vec![
                count_point("2019-04-10", 10),
                count_point("2019-04-11", 15),
                count_point("2019-04-12", 15)
            ]
        );
    }

    #[test]
    fn test_cumulative_with_no_data_holds_the_seed() {
        let filled = fill_cumulative(&[], date(2019, 4, 10), date(2019, 4, 12), &spec("1d"), 7);

        assert_eq!(
            filled,
            vec![
                count_point("2019-04-10", 7),
                count_point("2019-04-11", 7),
                count_point("2019-04-12", 7)
            ]
        );
    }
}
