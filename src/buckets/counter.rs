//! Public counter API
//!
//! [`Analytics`] is the capability set callers program against.
//! [`BucketCounter`] implements it over any [`Store`]; [`NoopAnalytics`]
//! accepts everything and reports zeros.
//!
//! Every call opens at most one batch, so it costs one store round-trip no
//! matter how many subjects, metrics or buckets it touches.

use super::key_encoder::BucketKeyEncoder;
use super::planner::QueryPlan;
use super::query::{PendingCount, PendingSeries, PendingTrack, TrackResult};
use super::range::{DateRange, PendingRangeCount};
use super::types::{Granularity, MetricKey, OneOrMany, TimeSeries};
use crate::error::{AnalyticsError, Result};
use crate::store::{Batch, BatchResults, Store};
use chrono::NaiveDate;
use tracing::debug;

/// Result of [`Analytics::track_metric`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackOutcome {
    /// One subject and one metric were given
    Single(TrackResult),
    /// A list was given for subjects or metrics; one entry per combination,
    /// subjects outermost
    Multi(Vec<TrackResult>),
}

impl TrackOutcome {
    /// True only if every leg of every combination was applied.
    pub fn succeeded(&self) -> bool {
        self.results().iter().all(TrackResult::succeeded)
    }

    pub fn results(&self) -> &[TrackResult] {
        match self {
            TrackOutcome::Single(result) => std::slice::from_ref(result),
            TrackOutcome::Multi(results) => results,
        }
    }
}

/// Time-bucketed counter operations.
pub trait Analytics: Send + Sync {
    /// Increment only the undated total; returns the new total.
    fn track_count(&self, subject: &str, metric: &str, amount: i64) -> Result<i64>;

    /// Increment the daily, weekly and monthly buckets and the total for
    /// every subject × metric combination, in one batch.
    ///
    /// An empty subject or metric list is an invalid argument.
    fn track_metric(
        &self,
        subjects: OneOrMany<String>,
        metrics: OneOrMany<String>,
        date: NaiveDate,
        amount: i64,
    ) -> Result<TrackOutcome>;

    /// `limit` periods of `granularity` starting at the period containing `from`.
    fn get_metric(
        &self,
        subject: &str,
        metric: &str,
        granularity: Granularity,
        from: NaiveDate,
        limit: u32,
    ) -> Result<TimeSeries>;

    fn get_metric_by_day(
        &self,
        subject: &str,
        metric: &str,
        from: NaiveDate,
        limit: u32,
    ) -> Result<TimeSeries> {
        self.get_metric(subject, metric, Granularity::Day, from, limit)
    }

    /// Weeks start on the Monday on or before `from`.
    fn get_metric_by_week(
        &self,
        subject: &str,
        metric: &str,
        from: NaiveDate,
        limit: u32,
    ) -> Result<TimeSeries> {
        self.get_metric(subject, metric, Granularity::Week, from, limit)
    }

    /// Months start on the 1st of `from`'s month.
    fn get_metric_by_month(
        &self,
        subject: &str,
        metric: &str,
        from: NaiveDate,
        limit: u32,
    ) -> Result<TimeSeries> {
        self.get_metric(subject, metric, Granularity::Month, from, limit)
    }

    /// One series per key, in input order, all read in a single batch.
    ///
    /// `group_by` is `day`, `week` or `month`; anything else fails before
    /// the store is touched.
    fn get_metrics(
        &self,
        keys: &[MetricKey],
        from: NaiveDate,
        limit: u32,
        group_by: &str,
    ) -> Result<Vec<TimeSeries>>;

    /// Events between `start` and `end` inclusive when both are given,
    /// otherwise the undated total. Never-tracked metrics count zero.
    fn get_count(
        &self,
        subject: &str,
        metric: &str,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<i64>;

    /// Undated totals for every key, in input order; unset keys are zero.
    fn get_counts(&self, keys: &[MetricKey]) -> Result<Vec<i64>>;
}

/// [`Analytics`] over a bucketed key-value store.
#[derive(Debug, Clone)]
pub struct BucketCounter<S> {
    store: S,
}

impl<S: Store> BucketCounter<S> {
    pub fn new(store: S) -> Self {
        BucketCounter { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    fn run(&self, batch: Batch) -> Result<BatchResults> {
        Ok(batch.execute(&self.store)?)
    }

    /// Queue a tracking call into an externally owned batch.
    pub fn track_metric_into(
        &self,
        batch: &mut Batch,
        keys: &[MetricKey],
        date: NaiveDate,
        amount: i64,
    ) -> Vec<PendingTrack> {
        keys.iter()
            .map(|key| PendingTrack::enqueue(batch, key, date, amount))
            .collect()
    }

    /// Queue a series read into an externally owned batch.
    pub fn get_metric_into(
        &self,
        batch: &mut Batch,
        key: &MetricKey,
        granularity: Granularity,
        from: NaiveDate,
        limit: u32,
    ) -> PendingSeries {
        PendingSeries::enqueue(batch, key, granularity, from, limit)
    }

    /// Queue a range count into an externally owned batch.
    pub fn count_in_range_into(
        &self,
        batch: &mut Batch,
        key: &MetricKey,
        range: &DateRange,
    ) -> PendingRangeCount {
        PendingRangeCount::enqueue(batch, key, range)
    }

    /// Events dated within `range`, in one batch.
    pub fn count_in_range(&self, key: &MetricKey, range: &DateRange) -> Result<i64> {
        let mut batch = Batch::new();
        let pending = self.count_in_range_into(&mut batch, key, range);
        let results = self.run(batch)?;
        Ok(pending.resolve(&results)?)
    }
}

/// Every subject × metric pair, subjects outermost.
///
/// An empty subject or metric list is rejected rather than tracked as nothing.
fn combinations(subjects: Vec<String>, metrics: &[String]) -> Result<Vec<MetricKey>> {
    if subjects.is_empty() || metrics.is_empty() {
        return Err(AnalyticsError::invalid_argument(
            "track_metric needs at least one subject and one metric",
        ));
    }
    Ok(subjects
        .iter()
        .flat_map(|subject| metrics.iter().map(move |metric| MetricKey::new(subject, metric)))
        .collect())
}

impl<S: Store> Analytics for BucketCounter<S> {
    fn track_count(&self, subject: &str, metric: &str, amount: i64) -> Result<i64> {
        let mut batch = Batch::new();
        let total = batch.incr(BucketKeyEncoder::count_key(subject, metric), amount);
        Ok(self.run(batch)?.resolve(total)?)
    }

    fn track_metric(
        &self,
        subjects: OneOrMany<String>,
        metrics: OneOrMany<String>,
        date: NaiveDate,
        amount: i64,
    ) -> Result<TrackOutcome> {
        let multi = subjects.is_many() || metrics.is_many();
        let keys = combinations(subjects.into_vec(), &metrics.into_vec())?;

        let mut batch = Batch::new();
        let pending = self.track_metric_into(&mut batch, &keys, date, amount);
        debug!(combinations = keys.len(), %date, amount, "tracking metric");
        let results = self.run(batch)?;

        let mut tracked: Vec<TrackResult> = pending.into_iter().map(|p| p.resolve(&results)).collect();
        if !multi && tracked.len() == 1 {
            if let Some(single) = tracked.pop() {
                return Ok(TrackOutcome::Single(single));
            }
        }
        Ok(TrackOutcome::Multi(tracked))
    }

    fn get_metric(
        &self,
        subject: &str,
        metric: &str,
        granularity: Granularity,
        from: NaiveDate,
        limit: u32,
    ) -> Result<TimeSeries> {
        let mut batch = Batch::new();
        let key = MetricKey::new(subject, metric);
        let pending = self.get_metric_into(&mut batch, &key, granularity, from, limit);
        let results = self.run(batch)?;
        Ok(pending.resolve(&results)?)
    }

    fn get_metrics(
        &self,
        keys: &[MetricKey],
        from: NaiveDate,
        limit: u32,
        group_by: &str,
    ) -> Result<Vec<TimeSeries>> {
        let granularity: Granularity = group_by.parse()?;

        let mut batch = Batch::new();
        let pending: Vec<PendingSeries> = keys
            .iter()
            .map(|key| self.get_metric_into(&mut batch, key, granularity, from, limit))
            .collect();
        let results = self.run(batch)?;

        pending
            .into_iter()
            .map(|p| p.resolve(&results).map_err(AnalyticsError::from))
            .collect()
    }

    fn get_count(
        &self,
        subject: &str,
        metric: &str,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<i64> {
        let key = MetricKey::new(subject, metric);
        match (start, end) {
            (Some(start), Some(end)) => self.count_in_range(&key, &DateRange::new(start, end)),
            _ => {
                let mut batch = Batch::new();
                let pending = PendingCount::enqueue(&mut batch, &key);
                let results = self.run(batch)?;
                pending.resolve(&results)
            }
        }
    }

    fn get_counts(&self, keys: &[MetricKey]) -> Result<Vec<i64>> {
        let mut batch = Batch::new();
        let pending: Vec<PendingCount> = keys
            .iter()
            .map(|key| PendingCount::enqueue(&mut batch, key))
            .collect();
        let results = self.run(batch)?;

        pending.into_iter().map(|p| p.resolve(&results)).collect()
    }
}

/// Accepts every call and reports zeros. Touches no store.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopAnalytics;

impl NoopAnalytics {
    fn zeros(granularity: Granularity, from: NaiveDate, limit: u32) -> TimeSeries {
        let plan = QueryPlan::new(granularity, from, limit);
        TimeSeries::new(plan.periods.into_iter().map(|p| (p, 0)).collect())
    }
}

impl Analytics for NoopAnalytics {
    fn track_count(&self, _subject: &str, _metric: &str, _amount: i64) -> Result<i64> {
        Ok(0)
    }

    fn track_metric(
        &self,
        subjects: OneOrMany<String>,
        metrics: OneOrMany<String>,
        _date: NaiveDate,
        _amount: i64,
    ) -> Result<TrackOutcome> {
        let multi = subjects.is_many() || metrics.is_many();
        let results: Vec<TrackResult> = combinations(subjects.into_vec(), &metrics.into_vec())?
            .into_iter()
            .map(|key| TrackResult {
                key,
                daily: Some(0),
                weekly: Some(0),
                monthly: Some(0),
                total: Some(0),
            })
            .collect();

        match (multi, results.as_slice()) {
            (false, [single]) => Ok(TrackOutcome::Single(single.clone())),
            _ => Ok(TrackOutcome::Multi(results)),
        }
    }

    fn get_metric(
        &self,
        _subject: &str,
        _metric: &str,
        granularity: Granularity,
        from: NaiveDate,
        limit: u32,
    ) -> Result<TimeSeries> {
        Ok(Self::zeros(granularity, from, limit))
    }

    fn get_metrics(
        &self,
        keys: &[MetricKey],
        from: NaiveDate,
        limit: u32,
        group_by: &str,
    ) -> Result<Vec<TimeSeries>> {
        let granularity: Granularity = group_by.parse()?;
        Ok(keys
            .iter()
            .map(|_| Self::zeros(granularity, from, limit))
            .collect())
    }

    fn get_count(
        &self,
        _subject: &str,
        _metric: &str,
        _start: Option<NaiveDate>,
        _end: Option<NaiveDate>,
    ) -> Result<i64> {
        Ok(0)
    }

    fn get_counts(&self, keys: &[MetricKey]) -> Result<Vec<i64>> {
        Ok(vec![0; keys.len()])
    }
}
