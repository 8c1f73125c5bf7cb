//! Date-range planning
//!
//! Turns `(granularity, from, limit)` into the period list a query returns and
//! the minimal ordered set of coarse storage buckets that hold those periods.
//! Each bucket records which period slots it serves, so one `HMGET` per
//! bucket asks only for fields that can live there.

use super::key_encoder::BucketKeyEncoder;
use super::types::{Granularity, MetricKey, Period};
use chrono::NaiveDate;

/// One coarse storage key to read, with the period slots it serves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketPlan {
    /// Start of the month (daily data) or year (weekly/monthly data)
    pub anchor: NaiveDate,
    /// Indices into [`QueryPlan::periods`], increasing
    pub slots: Vec<usize>,
}

/// Everything needed to read `limit` periods of one granularity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryPlan {
    pub granularity: Granularity,
    pub periods: Vec<Period>,
    pub buckets: Vec<BucketPlan>,
}

impl QueryPlan {
    /// Build the plan for `limit` periods starting at the period containing `from`.
    pub fn new(granularity: Granularity, from: NaiveDate, limit: u32) -> Self {
        let periods = periods(granularity, from, limit);
        let buckets = buckets(&periods);
        QueryPlan {
            granularity,
            periods,
            buckets,
        }
    }

    /// Storage keys to read for `subject`, in bucket order.
    pub fn storage_keys(&self, subject: &str) -> Vec<String> {
        self.buckets
            .iter()
            .map(|b| BucketKeyEncoder::storage_key(self.granularity, subject, b.anchor))
            .collect()
    }

    /// `(storage key, fields)` pairs to fetch for `key`, one per bucket.
    pub fn fetches(&self, key: &MetricKey) -> Vec<(String, Vec<String>)> {
        self.buckets
            .iter()
            .map(|bucket| {
                let storage_key =
                    BucketKeyEncoder::storage_key(self.granularity, &key.subject, bucket.anchor);
                let fields = bucket
                    .slots
                    .iter()
                    .map(|&slot| BucketKeyEncoder::field(&key.metric, &self.periods[slot]))
                    .collect();
                (storage_key, fields)
            })
            .collect()
    }
}

/// `limit` consecutive periods starting at the period containing `from`.
///
/// Weeks start on the Monday on or before `from`; months on the 1st.
pub fn periods(granularity: Granularity, from: NaiveDate, limit: u32) -> Vec<Period> {
    let start = granularity.period_start(from);
    (0..limit)
        .map_while(|i| granularity.step(start, i))
        .map(|anchor| Period {
            granularity,
            anchor,
        })
        .collect()
}

/// Storage anchors a period's data can be written under.
///
/// Writes are keyed by the event's own date, so a week spanning New Year is
/// split across two yearly hashes.
fn touched_anchors(period: &Period) -> [NaiveDate; 2] {
    let g = period.granularity;
    [
        g.storage_anchor(period.anchor),
        g.storage_anchor(period.end()),
    ]
}

/// Walk the periods forward, opening a new bucket only when a coarsening
/// boundary is crossed.
pub fn buckets(periods: &[Period]) -> Vec<BucketPlan> {
    let mut buckets: Vec<BucketPlan> = Vec::new();

    for (slot, period) in periods.iter().enumerate() {
        let [first, last] = touched_anchors(period);
        for anchor in [first, last] {
            match buckets.last_mut() {
                Some(bucket) if bucket.anchor == anchor => {
                    if bucket.slots.last() != Some(&slot) {
                        bucket.slots.push(slot);
                    }
                }
                _ => buckets.push(BucketPlan {
                    anchor,
                    slots: vec![slot],
                }),
            }
        }
    }

    debug_assert!(
        buckets.windows(2).all(|w| w[0].anchor < w[1].anchor),
        "Invariant violated: bucket anchors must be distinct and increasing"
    );
    buckets
}

/// Distinct coarse anchors touched by `limit` periods from `from`.
pub fn coarse_anchors(granularity: Granularity, from: NaiveDate, limit: u32) -> Vec<NaiveDate> {
    buckets(&periods(granularity, from, limit))
        .into_iter()
        .map(|b| b.anchor)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_daily_periods() {
        let p = periods(Granularity::Day, date(2012, 2, 27), 4);
        let anchors: Vec<_> = p.iter().map(|p| p.anchor).collect();
        assert_eq!(
            anchors,
            vec![date(2012, 2, 27), date(2012, 2, 28), date(2012, 2, 29), date(2012, 3, 1)]
        );
    }

    #[test]
    fn test_weekly_periods_snap_to_monday() {
        let p = periods(Granularity::Week, date(2012, 4, 7), 3);
        let anchors: Vec<_> = p.iter().map(|p| p.anchor).collect();
        assert_eq!(anchors, vec![date(2012, 4, 2), date(2012, 4, 9), date(2012, 4, 16)]);
    }

    #[test]
    fn test_monthly_periods_snap_to_first() {
        let p = periods(Granularity::Month, date(2011, 12, 15), 3);
        let anchors: Vec<_> = p.iter().map(|p| p.anchor).collect();
        assert_eq!(anchors, vec![date(2011, 12, 1), date(2012, 1, 1), date(2012, 2, 1)]);
    }

    #[test]
    fn test_zero_limit_plans_nothing() {
        let plan = QueryPlan::new(Granularity::Day, date(2012, 1, 1), 0);
        assert!(plan.periods.is_empty());
        assert!(plan.buckets.is_empty());
    }

    #[test]
    fn test_daily_within_one_month_uses_one_key() {
        let anchors = coarse_anchors(Granularity::Day, date(2012, 1, 1), 31);
        assert_eq!(anchors, vec![date(2012, 1, 1)]);
    }

    #[test]
    fn test_daily_crossing_two_boundaries() {
        // Jan 20 + 65 days ends Mar 24: three monthly hashes
        let anchors = coarse_anchors(Granularity::Day, date(2012, 1, 20), 65);
        assert_eq!(anchors, vec![date(2012, 1, 1), date(2012, 2, 1), date(2012, 3, 1)]);
    }

    #[test]
    fn test_daily_slots_partition_periods() {
        let plan = QueryPlan::new(Granularity::Day, date(2012, 1, 30), 4);
        assert_eq!(plan.buckets.len(), 2);
        assert_eq!(plan.buckets[0].slots, vec![0, 1]);
        assert_eq!(plan.buckets[1].slots, vec![2, 3]);
    }

    #[test]
    fn test_monthly_across_year_boundary() {
        let plan = QueryPlan::new(Granularity::Month, date(2011, 12, 1), 6);
        assert_eq!(plan.buckets.len(), 2);
        assert_eq!(plan.buckets[0].anchor, date(2011, 1, 1));
        assert_eq!(plan.buckets[0].slots, vec![0]);
        assert_eq!(plan.buckets[1].anchor, date(2012, 1, 1));
        assert_eq!(plan.buckets[1].slots, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_straddling_week_served_by_both_years() {
        // Week of 2011-12-26 runs through 2012-01-01
        let plan = QueryPlan::new(Granularity::Week, date(2011, 12, 26), 1);
        assert_eq!(plan.buckets.len(), 2);
        assert_eq!(plan.buckets[0].slots, vec![0]);
        assert_eq!(plan.buckets[1].slots, vec![0]);
    }

    #[test]
    fn test_fetches_use_encoded_keys_and_fields() {
        let plan = QueryPlan::new(Granularity::Day, date(2012, 1, 31), 2);
        let fetches = plan.fetches(&MetricKey::new("1234", "badge:25"));

        assert_eq!(
            fetches,
            vec![
                ("user:1234:analy:12-01".to_string(), vec!["badge:25:12-01-31".to_string()]),
                ("user:1234:analy:12-02".to_string(), vec!["badge:25:12-02-01".to_string()]),
            ]
        );
        assert_eq!(
            plan.storage_keys("1234"),
            vec!["user:1234:analy:12-01", "user:1234:analy:12-02"]
        );
    }
}
