//! Result merging
//!
//! Lays sparse per-bucket `HMGET` results back onto a dense period list, and
//! sums series by their canonical period label.

use super::planner::QueryPlan;
use super::types::{Period, TimeSeries};
use std::collections::BTreeMap;

/// Fold one query's per-bucket field values into a zero-filled series.
///
/// `per_bucket[i]` holds the values for `plan.buckets[i]`, positionally
/// matching its slots. Missing fields count as zero; a period served by two
/// buckets (a week spanning New Year) gets the sum of both.
pub fn merge(plan: &QueryPlan, per_bucket: &[Vec<Option<i64>>]) -> TimeSeries {
    debug_assert_eq!(
        plan.buckets.len(),
        per_bucket.len(),
        "Precondition: one result list per bucket"
    );

    let mut counts = vec![0i64; plan.periods.len()];
    for (bucket, values) in plan.buckets.iter().zip(per_bucket) {
        for (&slot, value) in bucket.slots.iter().zip(values) {
            counts[slot] += value.unwrap_or(0);
        }
    }

    TimeSeries::new(plan.periods.iter().copied().zip(counts).collect())
}

/// Union of several series keyed by period label, summing shared periods.
///
/// Absent periods count as zero. The output is ordered by label, which for
/// `YYYY-MM-DD` labels is calendar order.
pub fn sum_series<'a, I>(series: I) -> TimeSeries
where
    I: IntoIterator<Item = &'a TimeSeries>,
{
    let mut merged: BTreeMap<String, (Period, i64)> = BTreeMap::new();
    for s in series {
        for (period, count) in s.points() {
            merged
                .entry(period.label())
                .and_modify(|(_, total)| *total += count)
                .or_insert((*period, *count));
        }
    }

    TimeSeries::new(merged.into_values().collect())
}
