mod handlers;

pub use handlers::user_statistics_handler;

use std::collections::{BTreeMap, HashMap};

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use tokio::sync::RwLock;

use crate::stats::{CountValue, IntervalSpec, IntervalUnit, SeriesPoint, fill, fill_cumulative, format_label};

/// What a user-count statistics query asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserStatKind {
    /// Running total, carry-forward over empty buckets.
    Total,
    /// New registrations per bucket.
    New,
    /// Withdrawals per bucket.
    Withdrawal,
}

impl UserStatKind {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "total" => Some(Self::Total),
            "new" => Some(Self::New),
            "withdrawal" => Some(Self::Withdrawal),
            _ => None,
        }
    }
}

/// Which membership event a bucket counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserEventKind {
    Joined,
    Withdrawn,
}

/// Tenant directory seam: service existence plus the membership-event counts
/// the statistics endpoints consume.
#[async_trait]
pub trait ServiceDirectory: Send + Sync {
    async fn service_exists(&self, service_id: &str) -> Result<bool>;

    /// Sparse per-bucket event counts, labeled with
    /// [`crate::stats::format_label`] so they join against the canonical
    /// bucket set.
    async fn count_user_events(
        &self,
        service_id: &str,
        kind: UserEventKind,
        start: NaiveDate,
        end: NaiveDate,
        spec: &IntervalSpec,
    ) -> Result<Vec<SeriesPoint<CountValue>>>;

    /// Members on the books strictly before `cutoff`, used as the carry-forward seed.
    async fn total_user_count_before(&self, service_id: &str, cutoff: NaiveDate) -> Result<i64>;
}

#[derive(Debug, Clone)]
pub struct UserStatsQuery {
    pub service_id: String,
    pub kind: UserStatKind,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub interval: IntervalSpec,
}

/// For weekly buckets the seed cut-off advances to the Sunday of the week
/// after the range start, matching the first weekly bucket boundary.
fn seed_cutoff(start: NaiveDate, spec: &IntervalSpec) -> NaiveDate {
    if spec.unit == IntervalUnit::Week {
        let next_week = start + Duration::days(7);
        next_week - Duration::days(next_week.weekday().num_days_from_sunday() as i64)
    } else {
        start
    }
}

/// Assembles one user-count series; `None` when the service does not exist.
pub async fn user_statistics(
    directory: &dyn ServiceDirectory,
    query: &UserStatsQuery,
) -> Result<Option<Vec<SeriesPoint<CountValue>>>> {
    if !directory.service_exists(&query.service_id).await? {
        return Ok(None);
    }

    let series = match query.kind {
        UserStatKind::New => {
            let counts = directory
                .count_user_events(
                    &query.service_id,
                    UserEventKind::Joined,
                    query.start,
                    query.end,
                    &query.interval,
                )
                .await?;

            fill(&counts, query.start, query.end, &query.interval, CountValue { cnt: 0 })
        }
        UserStatKind::Withdrawal => {
            let counts = directory
                .count_user_events(
                    &query.service_id,
                    UserEventKind::Withdrawn,
                    query.start,
                    query.end,
                    &query.interval,
                )
                .await?;

            fill(&counts, query.start, query.end, &query.interval, CountValue { cnt: 0 })
        }
        UserStatKind::Total => {
            let counts = directory
                .count_user_events(
                    &query.service_id,
                    UserEventKind::Joined,
                    query.start,
                    query.end,
                    &query.interval,
                )
                .await?;

            let seed = directory
                .total_user_count_before(&query.service_id, seed_cutoff(query.start, &query.interval))
                .await?;

            fill_cumulative(&counts, query.start, query.end, &query.interval, seed)
        }
    };

    Ok(Some(series))
}

#[derive(Default)]
struct ServiceMembers {
    joined: Vec<DateTime<Utc>>,
    withdrawn: Vec<DateTime<Utc>>,
}

/// In-memory tenant directory for the dev binary and tests.
#[derive(Default)]
pub struct MemoryServiceDirectory {
    services: RwLock<HashMap<String, ServiceMembers>>,
}

impl MemoryServiceDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_service(&self, service_id: &str) {
        let mut services = self.services.write().await;
        services.entry(service_id.to_string()).or_default();
    }

    pub async fn record_join(&self, service_id: &str, at: DateTime<Utc>) {
        let mut services = self.services.write().await;
        services
            .entry(service_id.to_string())
            .or_default()
            .joined
            .push(at);
    }

    pub async fn record_withdrawal(&self, service_id: &str, at: DateTime<Utc>) {
        let mut services = self.services.write().await;
        services
            .entry(service_id.to_string())
            .or_default()
            .withdrawn
            .push(at);
    }
}

#[async_trait]
impl ServiceDirectory for MemoryServiceDirectory {
    async fn service_exists(&self, service_id: &str) -> Result<bool> {
        let services = self.services.read().await;
        Ok(services.contains_key(service_id))
    }

    async fn count_user_events(
        &self,
        service_id: &str,
        kind: UserEventKind,
        start: NaiveDate,
        end: NaiveDate,
        spec: &IntervalSpec,
    ) -> Result<Vec<SeriesPoint<CountValue>>> {
        let services = self.services.read().await;
        let Some(members) = services.get(service_id) else {
            return Ok(Vec::new());
        };

        let events = match kind {
            UserEventKind::Joined => &members.joined,
            UserEventKind::Withdrawn => &members.withdrawn,
        };

        let range_start = start
            .and_hms_opt(0, 0, 0)
            .expect("midnight exists on every date");
        let range_end = end
            .and_hms_opt(23, 59, 59)
            .expect("23:59:59 exists on every date");

        let mut counts: BTreeMap<String, i64> = BTreeMap::new();

        for event in events {
            let at = event.naive_utc();
            if at < range_start || at > range_end {
                continue;
            }

            *counts.entry(format_label(at, spec.unit)).or_default() += 1;
        }

        Ok(counts
            .into_iter()
            .map(|(date, cnt)| SeriesPoint {
                date,
                value: CountValue { cnt },
            })
            .collect())
    }

    async fn total_user_count_before(&self, service_id: &str, cutoff: NaiveDate) -> Result<i64> {
        let services = self.services.read().await;
        let Some(members) = services.get(service_id) else {
            return Ok(0);
        };

        let cutoff = cutoff
            .and_hms_opt(0, 0, 0)
            .expect("midnight exists on every date");

        let joined = members
            .joined
            .iter()
            .filter(|at| at.naive_utc() < cutoff)
            .count() as i64;
        let withdrawn = members
            .withdrawn
            .iter()
            .filter(|at| at.naive_utc() < cutoff)
            .count() as i64;

        Ok(joined - withdrawn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        date(y, m, d).and_hms_opt(h, 0, 0).unwrap().and_utc()
    }

    fn daily_query(service_id: &str, kind: UserStatKind) -> UserStatsQuery {
        UserStatsQuery {
            service_id: service_id.to_string(),
            kind,
            start: date(2019, 4, 10),
            end: date(2019, 4, 12),
            interval: IntervalSpec::parse("1d").unwrap(),
        }
    }

    async fn seeded_directory() -> MemoryServiceDirectory {
        let directory = MemoryServiceDirectory::new();
        directory.add_service("SVC1").await;
        // two before the range, then one join on the 10th and two on the 12th
        directory.record_join("SVC1", at(2019, 4, 1, 9)).await;
        directory.record_join("SVC1", at(2019, 4, 5, 9)).await;
        directory.record_join("SVC1", at(2019, 4, 10, 9)).await;
        directory.record_join("SVC1", at(2019, 4, 12, 9)).await;
        directory.record_join("SVC1", at(2019, 4, 12, 18)).await;
        directory.record_withdrawal("SVC1", at(2019, 4, 11, 9)).await;
        directory
    }

    #[tokio::test]
    async fn test_unknown_service_yields_none() {
        let directory = MemoryServiceDirectory::new();

        let result = user_statistics(&directory, &daily_query("SVC1", UserStatKind::New))
            .await
            .unwrap();

        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_new_user_series_counts_per_bucket() {
        let directory = seeded_directory().await;

        let series = user_statistics(&directory, &daily_query("SVC1", UserStatKind::New))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(series.len(), 3);
        assert_eq!(series[0].value.cnt, 1);
        assert_eq!(series[1].value.cnt, 0);
        assert_eq!(series[2].value.cnt, 2);
    }

    #[tokio::test]
    async fn test_withdrawal_series() {
        let directory = seeded_directory().await;

        let series = user_statistics(&directory, &daily_query("SVC1", UserStatKind::Withdrawal))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(series[0].value.cnt, 0);
        assert_eq!(series[1].value.cnt, 1);
        assert_eq!(series[2].value.cnt, 0);
    }

    #[tokio::test]
    async fn test_total_series_carries_forward_from_the_seed() {
        let directory = seeded_directory().await;

        let series = user_statistics(&directory, &daily_query("SVC1", UserStatKind::Total))
            .await
            .unwrap()
            .unwrap();

        // seed is 2 joins - 0 withdrawals before the 10th; the 10th has one
        // new join, the gap day carries, the 12th has two
        assert_eq!(series[0].value.cnt, 1);
        assert_eq!(series[1].value.cnt, 1);
        assert_eq!(series[2].value.cnt, 2);
    }

    #[tokio::test]
    async fn test_total_series_seeds_an_empty_leading_bucket() {
        let directory = MemoryServiceDirectory::new();
        directory.add_service("SVC1").await;
        directory.record_join("SVC1", at(2019, 4, 1, 9)).await;
        directory.record_join("SVC1", at(2019, 4, 5, 9)).await;

        let series = user_statistics(&directory, &daily_query("SVC1", UserStatKind::Total))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(series[0].value.cnt, 2);
        assert_eq!(series[1].value.cnt, 2);
        assert_eq!(series[2].value.cnt, 2);
    }

    #[test]
    fn test_seed_cutoff_moves_to_next_sunday_for_weekly_buckets() {
        let weekly = IntervalSpec::parse("1w").unwrap();
        let daily = IntervalSpec::parse("1d").unwrap();

        // 2019-04-10 is a Wednesday; one week on is Wed the 17th, whose
        // Sunday is the 14th
        assert_eq!(seed_cutoff(date(2019, 4, 10), &weekly), date(2019, 4, 14));
        assert_eq!(seed_cutoff(date(2019, 4, 10), &daily), date(2019, 4, 10));
    }
}
