mod handlers;

pub use handlers::statistics_handler;

use std::collections::{BTreeMap, HashMap};

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Timelike, Utc};
use serde::Serialize;
use tokio::sync::RwLock;

use crate::stats::{IntervalSpec, IntervalUnit, SeriesPoint};

/// Aggregation applied per unit within one bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    Avg,
    Sum,
    Min,
    Max,
}

impl DataType {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "avg" => Some(Self::Avg),
            "sum" => Some(Self::Sum),
            "min" => Some(Self::Min),
            "max" => Some(Self::Max),
            _ => None,
        }
    }
}

/// One telemetry statistics request after validation.
#[derive(Debug, Clone)]
pub struct AggregateQuery {
    pub device_id: String,
    pub unit_numbers: Vec<String>,
    pub data_type: DataType,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub interval: IntervalSpec,
    /// Whole-hour shift applied before bucketing, so buckets align with the
    /// caller's local day.
    pub time_offset_hours: i32,
}

/// Per-unit aggregated values for one bucket; a unit with no samples is null.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnitsValue {
    pub units: BTreeMap<String, Option<f64>>,
}

impl UnitsValue {
    /// The all-null payload used for gap buckets.
    pub fn null_for(unit_numbers: &[String]) -> Self {
        Self {
            units: unit_numbers
                .iter()
                .map(|number| (number.clone(), None))
                .collect(),
        }
    }
}

/// Storage seam for raw-telemetry aggregation. The document store does this
/// server-side in production; [`MemoryTelemetryStore`] mirrors its grouping
/// for the dev binary and tests.
#[async_trait]
pub trait TelemetryStore: Send + Sync {
    /// Sparse, chronologically ordered aggregates; gap-filling is the
    /// caller's job.
    async fn aggregate(
        &self,
        service_id: &str,
        query: &AggregateQuery,
    ) -> Result<Vec<SeriesPoint<UnitsValue>>>;
}

/// One ingested measurement: a device's unit-number → value map at an instant.
#[derive(Debug, Clone)]
pub struct TelemetrySample {
    pub device_id: String,
    pub at: DateTime<Utc>,
    pub units: BTreeMap<String, f64>,
}

/// In-memory telemetry store, one sample log per service.
#[derive(Default)]
pub struct MemoryTelemetryStore {
    samples: RwLock<HashMap<String, Vec<TelemetrySample>>>,
}

impl MemoryTelemetryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn record(&self, service_id: &str, sample: TelemetrySample) {
        let mut samples = self.samples.write().await;
        samples
            .entry(service_id.to_string())
            .or_default()
            .push(sample);
    }
}

/// Grouping label for one raw sample. Granularity mirrors the upstream
/// aggregation pipeline: day-level for day/week/month intervals, `HH:00` for
/// hours, and minutes floored to the multiplier for minute intervals.
fn group_label(at: NaiveDateTime, spec: &IntervalSpec) -> String {
    match spec.unit {
        IntervalUnit::Minute => {
            let floored = at.minute() - at.minute() % spec.multiplier;
            format!("{} {:02}:{:02}", at.format("%Y-%m-%d"), at.hour(), floored)
        }
        IntervalUnit::Hour => at.format("%Y-%m-%d %H:00").to_string(),
        IntervalUnit::Day | IntervalUnit::Week | IntervalUnit::Month => {
            at.format("%Y-%m-%d").to_string()
        }
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn aggregate_values(data_type: DataType, values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }

    let raw = match data_type {
        DataType::Avg => values.iter().sum::<f64>() / values.len() as f64,
        DataType::Sum => values.iter().sum(),
        DataType::Min => values.iter().copied().fold(f64::INFINITY, f64::min),
        DataType::Max => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
    };

    Some(round2(raw))
}

#[async_trait]
impl TelemetryStore for MemoryTelemetryStore {
    async fn aggregate(
        &self,
        service_id: &str,
        query: &AggregateQuery,
    ) -> Result<Vec<SeriesPoint<UnitsValue>>> {
        let samples = self.samples.read().await;
        let Some(service_samples) = samples.get(service_id) else {
            return Ok(Vec::new());
        };

        let range_start = query
            .start
            .and_hms_opt(0, 0, 0)
            .expect("midnight exists on every date");
        let range_end = query
            .end
            .and_hms_opt(23, 59, 59)
            .expect("23:59:59 exists on every date");
        let offset = Duration::hours(query.time_offset_hours as i64);

        // label -> per-sample unit maps
        let mut groups: BTreeMap<String, Vec<&BTreeMap<String, f64>>> = BTreeMap::new();

        for sample in service_samples {
            if sample.device_id != query.device_id {
                continue;
            }

            let at = sample.at.naive_utc();
            if at < range_start || at > range_end {
                continue;
            }

            let label = group_label(at + offset, &query.interval);
            groups.entry(label).or_default().push(&sample.units);
        }

        // BTreeMap iteration gives chronological labels for these formats
        let points = groups
            .into_iter()
            .map(|(date, unit_maps)| {
                let units = query
                    .unit_numbers
                    .iter()
                    .map(|number| {
                        let values: Vec<f64> = unit_maps
                            .iter()
                            .filter_map(|units| units.get(number))
                            .copied()
                            .collect();

                        (number.clone(), aggregate_values(query.data_type, &values))
                    })
                    .collect();

                SeriesPoint {
                    date,
                    value: UnitsValue { units },
                }
            })
            .collect();

        Ok(points)
    }
}
