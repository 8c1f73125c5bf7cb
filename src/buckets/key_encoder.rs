//! Key encoding for bucketed counters
//!
//! Encodes subjects, metrics and dates into Redis keys and hash fields.
//!
//! Key formats (years are two-digit):
//! - `user:<subject>:analy:<yy>-<mm>`: daily buckets, one hash per month
//! - `user:<subject>:analy:<yy>`: weekly and monthly buckets, one hash per year
//! - `analy:<subject>:count:<metric>`: undated running total
//!
//! Field formats:
//! - daily `<metric>:<yy>-<mm>-<dd>`
//! - weekly `<metric>:<yy>-<mm>-<dd>` of the Monday starting the week
//! - monthly `<metric>:<yy>-<mm>`
//!
//! Weekly and monthly fields live in the same per-year hash; only the field
//! format tells them apart.

use super::types::{closest_monday, BucketAddress, Granularity, MetricKey, Period};
use chrono::NaiveDate;

/// Encodes bucket and total keys for Redis storage
pub struct BucketKeyEncoder;

impl BucketKeyEncoder {
    /// Hash holding a subject's daily fields for the month of `date`
    ///
    /// Format: `user:<subject>:analy:<yy>-<mm>`
    pub fn daily_key(subject: &str, date: NaiveDate) -> String {
        format!("user:{}:analy:{}", subject, date.format("%y-%m"))
    }

    /// Hash holding a subject's weekly and monthly fields for the year of `date`
    ///
    /// Format: `user:<subject>:analy:<yy>`
    pub fn weekly_key(subject: &str, date: NaiveDate) -> String {
        format!("user:{}:analy:{}", subject, date.format("%y"))
    }

    /// Same hash as [`weekly_key`](Self::weekly_key).
    pub fn monthly_key(subject: &str, date: NaiveDate) -> String {
        Self::weekly_key(subject, date)
    }

    /// Format: `<metric>:<yy>-<mm>-<dd>`
    pub fn daily_field(metric: &str, date: NaiveDate) -> String {
        format!("{}:{}", metric, date.format("%y-%m-%d"))
    }

    /// Format: `<metric>:<yy>-<mm>-<dd>` of `monday`
    pub fn weekly_field(metric: &str, monday: NaiveDate) -> String {
        debug_assert_eq!(
            closest_monday(monday),
            monday,
            "Precondition: weekly fields are keyed by a Monday"
        );
        format!("{}:{}", metric, monday.format("%y-%m-%d"))
    }

    /// Format: `<metric>:<yy>-<mm>`
    pub fn monthly_field(metric: &str, date: NaiveDate) -> String {
        format!("{}:{}", metric, date.format("%y-%m"))
    }

    /// Undated running total
    ///
    /// Format: `analy:<subject>:count:<metric>`
    pub fn count_key(subject: &str, metric: &str) -> String {
        format!("analy:{}:count:{}", subject, metric)
    }

    /// Storage key for `granularity` data dated `date`.
    pub fn storage_key(granularity: Granularity, subject: &str, date: NaiveDate) -> String {
        match granularity {
            Granularity::Day => Self::daily_key(subject, date),
            Granularity::Week => Self::weekly_key(subject, date),
            Granularity::Month => Self::monthly_key(subject, date),
        }
    }

    /// Field name of `period` for `metric`.
    pub fn field(metric: &str, period: &Period) -> String {
        match period.granularity {
            Granularity::Day => Self::daily_field(metric, period.anchor),
            Granularity::Week => Self::weekly_field(metric, period.anchor),
            Granularity::Month => Self::monthly_field(metric, period.anchor),
        }
    }

    /// Bucket written when an event dated `date` is tracked at `granularity`.
    ///
    /// The key follows the event's own date while the field follows the
    /// period start, so a week that starts in December collects its January
    /// days under the new year's key.
    pub fn address(key: &MetricKey, granularity: Granularity, date: NaiveDate) -> BucketAddress {
        let period = Period::containing(granularity, date);
        BucketAddress {
            storage_key: Self::storage_key(granularity, &key.subject, date),
            field: Self::field(&key.metric, &period),
        }
    }

    /// Decode a total key back to `(subject, metric)`
    ///
    /// Subjects containing `:count:` are ambiguous; the first occurrence wins.
    pub fn decode_count_key(key: &str) -> Option<MetricKey> {
        let rest = key.strip_prefix("analy:")?;
        let (subject, metric) = rest.split_once(":count:")?;
        if subject.is_empty() || metric.is_empty() {
            return None;
        }
        Some(MetricKey::new(subject, metric))
    }

    /// Check if a key is a bucket hash
    pub fn is_bucket_key(key: &str) -> bool {
        key.starts_with("user:") && key.contains(":analy:")
    }

    /// Check if a key is an undated total
    pub fn is_count_key(key: &str) -> bool {
        key.starts_with("analy:") && key.contains(":count:")
    }

    /// Pattern matching every bucket hash of a subject
    ///
    /// Returns: `user:<subject>:analy:*`
    pub fn subject_pattern(subject: &str) -> String {
        format!("user:{}:analy:*", subject)
    }
}
