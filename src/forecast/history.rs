use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::domain::Timestamp;

/// Which running average a historical datum belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum HistoryMetric {
    Consumption,
    Production,
}

#[derive(Debug, Clone, Copy, Default)]
struct Bucket {
    sample_count: u64,
    running_mean: f64,
}

impl Bucket {
    fn add_sample(&mut self, value: f64) {
        self.sample_count += 1;
        // Welford's online mean update.
        self.running_mean += (value - self.running_mean) / self.sample_count as f64;
    }
}

/// Day-of-week/hour-of-day running averages of consumption and production,
/// used as a last-resort forecast fallback. This is deliberately the simplest
/// possible model (no windowing, no decay) -- the Non-goal excludes anything
/// beyond this.
#[derive(Debug, Clone, Default)]
pub struct HistoryAverages {
    buckets: HashMap<(HistoryMetric, u8, u8), Bucket>,
}

impl HistoryAverages {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, metric: HistoryMetric, timestamp: Timestamp, value: f64) {
        let key = (metric, timestamp.weekday_index(), timestamp.hour() as u8);
        self.buckets.entry(key).or_default().add_sample(value);
    }

    /// `None` until at least one sample has landed in the bucket for this
    /// metric/day-of-week/hour-of-day combination.
    pub fn average_for(&self, metric: HistoryMetric, timestamp: Timestamp) -> Option<f64> {
        let key = (metric, timestamp.weekday_index(), timestamp.hour() as u8);
        self.buckets.get(&key).map(|b| b.running_mean)
    }

    pub fn sample_count(&self, metric: HistoryMetric, timestamp: Timestamp) -> u64 {
        let key = (metric, timestamp.weekday_index(), timestamp.hour() as u8);
        self.buckets.get(&key).map(|b| b.sample_count).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, TimeZone};

    fn ts(y: i32, m: u32, d: u32, h: u32) -> Timestamp {
        Timestamp(
            FixedOffset::east_opt(0)
                .unwrap()
                .with_ymd_and_hms(y, m, d, h, 0, 0)
                .unwrap(),
        )
    }

    #[test]
    fn empty_average_is_none() {
        let hist = HistoryAverages::new();
        assert_eq!(hist.average_for(HistoryMetric::Consumption, ts(2026, 1, 5, 10)), None);
    }

    #[test]
    fn averages_same_bucket_across_weeks() {
        let mut hist = HistoryAverages::new();
        // Two Mondays at 10:00.
        hist.record(HistoryMetric::Consumption, ts(2026, 1, 5, 10), 1000.0);
        hist.record(HistoryMetric::Consumption, ts(2026, 1, 12, 10), 2000.0);
        assert_eq!(
            hist.average_for(HistoryMetric::Consumption, ts(2026, 1, 19, 10)),
            Some(1500.0)
        );
        assert_eq!(hist.sample_count(HistoryMetric::Consumption, ts(2026, 1, 19, 10)), 2);
    }

    #[test]
    fn distinct_hours_are_distinct_buckets() {
        let mut hist = HistoryAverages::new();
        hist.record(HistoryMetric::Production, ts(2026, 1, 5, 10), 500.0);
        assert_eq!(hist.average_for(HistoryMetric::Production, ts(2026, 1, 5, 11)), None);
    }
}
