//! Deterministic Simulation Testing for the bucketed counter
//!
//! VOPR-style harness that enables:
//! - Deterministic random tracking over a window of dates
//! - Cross-checking every query path against an in-memory model
//! - Seed-based reproducibility for debugging

use super::counter::{Analytics, BucketCounter};
use super::range::DateRange;
use super::types::{Granularity, MetricKey};
use crate::store::InMemoryStore;
use chrono::{Days, NaiveDate};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::collections::BTreeMap;

/// Configuration for counter DST
#[derive(Debug, Clone)]
pub struct CounterDSTConfig {
    /// Random seed for reproducibility
    pub seed: u64,
    /// Number of distinct subjects
    pub num_subjects: usize,
    /// Number of distinct metrics
    pub num_metrics: usize,
    /// First day events may be dated
    pub window_start: NaiveDate,
    /// Number of days in the event window
    pub window_days: u32,
    /// Largest single increment
    pub max_amount: i64,
    /// Probability an operation is an undated `track_count`
    pub count_only_prob: f64,
    /// Probability an operation is a query check instead of a write
    pub query_prob: f64,
}

impl Default for CounterDSTConfig {
    fn default() -> Self {
        CounterDSTConfig {
            seed: 0,
            num_subjects: 3,
            num_metrics: 3,
            window_start: NaiveDate::from_ymd_opt(2011, 10, 1).unwrap_or_default(),
            window_days: 240,
            max_amount: 5,
            count_only_prob: 0.1,
            query_prob: 0.2,
        }
    }
}

impl CounterDSTConfig {
    pub fn new(seed: u64) -> Self {
        CounterDSTConfig {
            seed,
            ..Default::default()
        }
    }

    /// Events packed into a few weeks around New Year (more bucket sharing)
    pub fn year_boundary(seed: u64) -> Self {
        CounterDSTConfig {
            seed,
            window_start: NaiveDate::from_ymd_opt(2011, 12, 15).unwrap_or_default(),
            window_days: 35,
            ..Default::default()
        }
    }

    /// Many subjects and metrics spread over three years
    pub fn wide(seed: u64) -> Self {
        CounterDSTConfig {
            seed,
            num_subjects: 8,
            num_metrics: 6,
            window_start: NaiveDate::from_ymd_opt(2010, 6, 1).unwrap_or_default(),
            window_days: 1100,
            ..Default::default()
        }
    }
}

/// Operation type for logging
#[derive(Debug, Clone)]
pub enum CounterOp {
    Track {
        key: MetricKey,
        date: NaiveDate,
        amount: i64,
    },
    TrackCount {
        key: MetricKey,
        amount: i64,
    },
    Series {
        key: MetricKey,
        granularity: Granularity,
        from: NaiveDate,
        limit: u32,
    },
    RangeCount {
        key: MetricKey,
        range: DateRange,
    },
}

/// Result of a counter DST run
#[derive(Debug, Clone)]
pub struct CounterDSTResult {
    pub seed: u64,
    pub total_operations: u64,
    pub tracks: u64,
    pub count_only_tracks: u64,
    pub series_checks: u64,
    pub range_checks: u64,
    pub invariant_violations: Vec<String>,
    pub last_op: Option<CounterOp>,
}

impl CounterDSTResult {
    pub fn new(seed: u64) -> Self {
        CounterDSTResult {
            seed,
            total_operations: 0,
            tracks: 0,
            count_only_tracks: 0,
            series_checks: 0,
            range_checks: 0,
            invariant_violations: Vec::new(),
            last_op: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.invariant_violations.is_empty()
    }

    pub fn summary(&self) -> String {
        format!(
            "Seed {}: {} ops (tracks:{}, counts:{}, series:{}, ranges:{}), {} violations",
            self.seed,
            self.total_operations,
            self.tracks,
            self.count_only_tracks,
            self.series_checks,
            self.range_checks,
            self.invariant_violations.len()
        )
    }
}

/// DST harness for [`BucketCounter`]
pub struct CounterDSTHarness {
    config: CounterDSTConfig,
    rng: ChaCha8Rng,
    counter: BucketCounter<InMemoryStore>,
    result: CounterDSTResult,
    /// Expected dated increments per key and day
    dated: BTreeMap<(MetricKey, NaiveDate), i64>,
    /// Expected undated totals per key
    totals: BTreeMap<MetricKey, i64>,
}

impl CounterDSTHarness {
    pub fn new(config: CounterDSTConfig) -> Self {
        CounterDSTHarness {
            rng: ChaCha8Rng::seed_from_u64(config.seed),
            result: CounterDSTResult::new(config.seed),
            config,
            counter: BucketCounter::new(InMemoryStore::new()),
            dated: BTreeMap::new(),
            totals: BTreeMap::new(),
        }
    }

    pub fn with_seed(seed: u64) -> Self {
        Self::new(CounterDSTConfig::new(seed))
    }

    fn random_key(&mut self) -> MetricKey {
        let subject = self.rng.gen_range(0..self.config.num_subjects.max(1));
        let metric = self.rng.gen_range(0..self.config.num_metrics.max(1));
        MetricKey::new(format!("{}", 1000 + subject), format!("metric:{}", metric))
    }

    fn random_date(&mut self) -> NaiveDate {
        let offset = self.rng.gen_range(0..self.config.window_days.max(1));
        self.config
            .window_start
            .checked_add_days(Days::new(u64::from(offset)))
            .unwrap_or(self.config.window_start)
    }

    fn violation(&mut self, msg: String) {
        self.result.invariant_violations.push(msg);
    }

    /// Expected dated total for `key` over `[from, to]`.
    fn expected_between(&self, key: &MetricKey, from: NaiveDate, to: NaiveDate) -> i64 {
        self.dated
            .range((key.clone(), from)..=(key.clone(), to))
            .map(|(_, amount)| amount)
            .sum()
    }

    fn track(&mut self) {
        let key = self.random_key();
        let date = self.random_date();
        let amount = self.rng.gen_range(1..=self.config.max_amount.max(1));
        self.result.last_op = Some(CounterOp::Track {
            key: key.clone(),
            date,
            amount,
        });

        match self.counter.track_metric(
            key.subject.clone().into(),
            key.metric.clone().into(),
            date,
            amount,
        ) {
            Ok(outcome) if outcome.succeeded() => {
                *self.dated.entry((key.clone(), date)).or_insert(0) += amount;
                let total = self.totals.entry(key.clone()).or_insert(0);
                *total += amount;
                let expected = *total;
                let reported = outcome.results()[0].total;
                if reported != Some(expected) {
                    self.violation(format!(
                        "track {} reported total {:?}, expected {}",
                        key, reported, expected
                    ));
                }
                self.result.tracks += 1;
            }
            Ok(outcome) => self.violation(format!("track {} had failed legs: {:?}", key, outcome)),
            Err(e) => self.violation(format!("track {} failed: {}", key, e)),
        }
    }

    fn track_count(&mut self) {
        let key = self.random_key();
        let amount = self.rng.gen_range(1..=self.config.max_amount.max(1));
        self.result.last_op = Some(CounterOp::TrackCount {
            key: key.clone(),
            amount,
        });

        match self.counter.track_count(&key.subject, &key.metric, amount) {
            Ok(total) => {
                let expected = self.totals.entry(key.clone()).or_insert(0);
                *expected += amount;
                if total != *expected {
                    let expected = *expected;
                    self.violation(format!(
                        "track_count {} returned {}, expected {}",
                        key, total, expected
                    ));
                }
                self.result.count_only_tracks += 1;
            }
            Err(e) => self.violation(format!("track_count {} failed: {}", key, e)),
        }
    }

    fn check_series(&mut self) {
        let key = self.random_key();
        let granularity = match self.rng.gen_range(0..3) {
            0 => Granularity::Day,
            1 => Granularity::Week,
            _ => Granularity::Month,
        };
        let from = self.random_date();
        let limit = self.rng.gen_range(0..40);
        self.result.last_op = Some(CounterOp::Series {
            key: key.clone(),
            granularity,
            from,
            limit,
        });

        let series = match self
            .counter
            .get_metric(&key.subject, &key.metric, granularity, from, limit)
        {
            Ok(series) => series,
            Err(e) => {
                self.violation(format!("series {} failed: {}", key, e));
                return;
            }
        };

        if series.len() != limit as usize {
            self.violation(format!(
                "series {} {} from {} has {} periods, expected {}",
                key,
                granularity,
                from,
                series.len(),
                limit
            ));
        }

        for (period, count) in series.points().to_vec() {
            let expected = self.expected_between(&key, period.anchor, period.end());
            if count != expected {
                self.violation(format!(
                    "series {} {} period {} = {}, expected {}",
                    key,
                    granularity,
                    period.label(),
                    count,
                    expected
                ));
            }
        }
        self.result.series_checks += 1;
    }

    fn check_range(&mut self) {
        let key = self.random_key();
        let range = DateRange::new(self.random_date(), self.random_date());
        self.result.last_op = Some(CounterOp::RangeCount {
            key: key.clone(),
            range,
        });

        match self
            .counter
            .get_count(&key.subject, &key.metric, Some(range.start), Some(range.end))
        {
            Ok(count) => {
                let expected = self.expected_between(&key, range.start, range.end);
                if count != expected {
                    self.violation(format!(
                        "range {} {}..{} = {}, expected {}",
                        key, range.start, range.end, count, expected
                    ));
                }
                self.result.range_checks += 1;
            }
            Err(e) => self.violation(format!("range {} failed: {}", key, e)),
        }
    }

    /// Every month's bucket equals the sum of its days.
    fn check_cross_granularity(&mut self) {
        let keys: Vec<MetricKey> = self.totals.keys().cloned().collect();
        for key in keys {
            let months = match self.counter.get_metric_by_month(
                &key.subject,
                &key.metric,
                self.config.window_start,
                self.config.window_days / 28 + 2,
            ) {
                Ok(series) => series,
                Err(e) => {
                    self.violation(format!("month series {} failed: {}", key, e));
                    continue;
                }
            };

            for (period, count) in months.points().to_vec() {
                let day_count = (period.end() - period.anchor).num_days() as u32 + 1;
                match self
                    .counter
                    .get_metric_by_day(&key.subject, &key.metric, period.anchor, day_count)
                {
                    Ok(daily) if daily.total() == count => {}
                    Ok(daily) => self.violation(format!(
                        "{} month {} = {}, days sum to {}",
                        key,
                        period.label(),
                        count,
                        daily.total()
                    )),
                    Err(e) => self.violation(format!("day series {} failed: {}", key, e)),
                }
            }
        }
    }

    /// Undated totals match the model, missing keys read as zero.
    fn check_totals(&mut self) {
        let mut keys: Vec<MetricKey> = self.totals.keys().cloned().collect();
        keys.push(MetricKey::new("never", "tracked"));

        match self.counter.get_counts(&keys) {
            Ok(counts) => {
                for (key, count) in keys.iter().zip(counts) {
                    let expected = self.totals.get(key).copied().unwrap_or(0);
                    if count != expected {
                        self.violation(format!("total {} = {}, expected {}", key, count, expected));
                    }
                }
            }
            Err(e) => self.violation(format!("get_counts failed: {}", e)),
        }
    }

    pub fn run(&mut self, num_ops: usize) {
        for _ in 0..num_ops {
            let roll: f64 = self.rng.gen();
            if roll < self.config.query_prob {
                if self.rng.gen_bool(0.5) {
                    self.check_series();
                } else {
                    self.check_range();
                }
            } else if roll < self.config.query_prob + self.config.count_only_prob {
                self.track_count();
            } else {
                self.track();
            }
            self.result.total_operations += 1;
        }

        self.check_cross_granularity();
        self.check_totals();
    }

    pub fn result(&self) -> &CounterDSTResult {
        &self.result
    }
}

/// Run DST over `count` consecutive seeds starting at `start_seed`
pub fn run_counter_batch<F>(
    start_seed: u64,
    count: usize,
    ops_per_run: usize,
    config_fn: F,
) -> Vec<CounterDSTResult>
where
    F: Fn(u64) -> CounterDSTConfig,
{
    (0..count as u64)
        .map(|i| {
            let mut harness = CounterDSTHarness::new(config_fn(start_seed + i));
            harness.run(ops_per_run);
            harness.result().clone()
        })
        .collect()
}

/// Summarize a batch of DST results
pub fn summarize_counter_batch(results: &[CounterDSTResult]) -> String {
    let passed = results.iter().filter(|r| r.is_success()).count();
    let total_ops: u64 = results.iter().map(|r| r.total_operations).sum();
    let mut summary = format!(
        "Counter DST: {}/{} seeds passed, {} total operations",
        passed,
        results.len(),
        total_ops
    );

    for failed in results.iter().filter(|r| !r.is_success()).take(5) {
        summary.push_str(&format!("\n  {}", failed.summary()));
        if let Some(first) = failed.invariant_violations.first() {
            summary.push_str(&format!("\n    first violation: {}", first));
        }
        if let Some(op) = &failed.last_op {
            summary.push_str(&format!("\n    last op: {:?}", op));
        }
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_seed() {
        let mut harness = CounterDSTHarness::with_seed(42);
        harness.run(200);
        let result = harness.result();
        assert!(result.is_success(), "{:?}", result.invariant_violations);
        assert!(result.tracks > 0);
    }

    #[test]
    fn test_same_seed_same_run() {
        let a = run_counter_batch(7, 1, 100, CounterDSTConfig::new);
        let b = run_counter_batch(7, 1, 100, CounterDSTConfig::new);
        assert_eq!(a[0].tracks, b[0].tracks);
        assert_eq!(a[0].series_checks, b[0].series_checks);
        assert_eq!(a[0].range_checks, b[0].range_checks);
    }
}
