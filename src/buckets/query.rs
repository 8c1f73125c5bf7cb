//! Batch query execution
//!
//! Enqueues the store operations for bucket reads, tracking writes and total
//! lookups into a caller-supplied [`Batch`], and resolves them once the batch
//! has executed. Nothing here touches the store directly: the caller decides
//! how many of these fold into one round-trip.

use super::key_encoder::BucketKeyEncoder;
use super::merge::merge;
use super::planner::QueryPlan;
use super::types::{Granularity, MetricKey, TimeSeries};
use crate::error::{AnalyticsError, StoreError};
use crate::store::{Batch, BatchResults, Pending};
use chrono::NaiveDate;
use tracing::warn;

/// A series read queued into a batch.
#[derive(Debug)]
pub struct PendingSeries {
    plan: QueryPlan,
    fetches: Vec<Pending<Vec<Option<i64>>>>,
}

impl PendingSeries {
    /// Queue one `HMGET` per coarse bucket of the plan.
    pub fn enqueue(
        batch: &mut Batch,
        key: &MetricKey,
        granularity: Granularity,
        from: NaiveDate,
        limit: u32,
    ) -> Self {
        let plan = QueryPlan::new(granularity, from, limit);
        let fetches = plan
            .fetches(key)
            .into_iter()
            .map(|(storage_key, fields)| batch.hash_multi_get(storage_key, fields))
            .collect();
        PendingSeries { plan, fetches }
    }

    pub fn plan(&self) -> &QueryPlan {
        &self.plan
    }

    pub fn resolve(self, results: &BatchResults) -> Result<TimeSeries, StoreError> {
        let per_bucket = self
            .fetches
            .into_iter()
            .map(|pending| results.resolve(pending))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(merge(&self.plan, &per_bucket))
    }
}

/// Outcome of one subject × metric tracking call.
///
/// A leg is `None` when the store rejected that operation; legs are not
/// atomic with respect to each other.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackResult {
    pub key: MetricKey,
    pub daily: Option<i64>,
    pub weekly: Option<i64>,
    pub monthly: Option<i64>,
    pub total: Option<i64>,
}

impl TrackResult {
    pub fn succeeded(&self) -> bool {
        self.daily.is_some() && self.weekly.is_some() && self.monthly.is_some() && self.total.is_some()
    }
}

/// The four increments of one tracked event, queued into a batch.
#[derive(Debug)]
pub struct PendingTrack {
    key: MetricKey,
    daily: Pending<i64>,
    weekly: Pending<i64>,
    monthly: Pending<i64>,
    total: Pending<i64>,
}

impl PendingTrack {
    pub fn enqueue(batch: &mut Batch, key: &MetricKey, date: NaiveDate, amount: i64) -> Self {
        let daily = BucketKeyEncoder::address(key, Granularity::Day, date);
        let weekly = BucketKeyEncoder::address(key, Granularity::Week, date);
        let monthly = BucketKeyEncoder::address(key, Granularity::Month, date);

        PendingTrack {
            key: key.clone(),
            daily: batch.hash_incr(daily.storage_key, daily.field, amount),
            weekly: batch.hash_incr(weekly.storage_key, weekly.field, amount),
            monthly: batch.hash_incr(monthly.storage_key, monthly.field, amount),
            total: batch.incr(BucketKeyEncoder::count_key(&key.subject, &key.metric), amount),
        }
    }

    pub fn resolve(self, results: &BatchResults) -> TrackResult {
        let leg = |name: &str, pending: Pending<i64>| match results.resolve(pending) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(key = %self.key, leg = name, error = %e, "tracking leg failed");
                None
            }
        };

        TrackResult {
            daily: leg("daily", self.daily),
            weekly: leg("weekly", self.weekly),
            monthly: leg("monthly", self.monthly),
            total: leg("total", self.total),
            key: self.key.clone(),
        }
    }
}

/// An undated total lookup queued into a batch.
#[derive(Debug)]
pub struct PendingCount {
    count_key: String,
    pending: Pending<Option<String>>,
}

impl PendingCount {
    pub fn enqueue(batch: &mut Batch, key: &MetricKey) -> Self {
        let count_key = BucketKeyEncoder::count_key(&key.subject, &key.metric);
        let pending = batch.get(count_key.clone());
        PendingCount { count_key, pending }
    }

    /// Missing totals are zero; a non-integer value is an error.
    pub fn resolve(self, results: &BatchResults) -> Result<i64, AnalyticsError> {
        match results.resolve(self.pending)? {
            None => Ok(0),
            Some(raw) => raw.trim().parse().map_err(|_| AnalyticsError::InvalidValue {
                key: self.count_key,
                value: raw,
            }),
        }
    }
}
