//! Range-count optimization
//!
//! Answers "how many events between `start` and `end`" by reading whole
//! months from the monthly buckets where the range covers them, and only the
//! ragged edges from the daily buckets. All legs go into one batch.

use super::merge::sum_series;
use super::query::PendingSeries;
use super::types::{first_of_month, Granularity, MetricKey, TimeSeries};
use crate::error::StoreError;
use crate::store::{Batch, BatchResults};
use chrono::{Months, NaiveDate, NaiveDateTime};

/// Month boundaries needed before whole-month reads pay off.
pub const MONTH_BOUNDARY_THRESHOLD: usize = 3;

/// Inclusive date range, normalized so `start <= end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    /// Bounds may be given in either order.
    pub fn new(a: NaiveDate, b: NaiveDate) -> Self {
        if a <= b {
            DateRange { start: a, end: b }
        } else {
            DateRange { start: b, end: a }
        }
    }

    /// Range over the calendar days of two timestamps.
    pub fn from_datetimes(a: NaiveDateTime, b: NaiveDateTime) -> Self {
        Self::new(a.date(), b.date())
    }

    /// Number of days in the range, both ends included.
    pub fn days(&self) -> u32 {
        days_between(self.start, self.end) + 1
    }

    /// First-of-month dates on or after `start` and on or before `end`.
    pub fn month_boundaries(&self) -> Vec<NaiveDate> {
        let mut boundary = if self.start == first_of_month(self.start) {
            Some(self.start)
        } else {
            first_of_month(self.start).checked_add_months(Months::new(1))
        };

        let mut boundaries = Vec::new();
        while let Some(b) = boundary.filter(|b| *b <= self.end) {
            boundaries.push(b);
            boundary = b.checked_add_months(Months::new(1));
        }
        boundaries
    }
}

fn days_between(from: NaiveDate, to: NaiveDate) -> u32 {
    debug_assert!(from <= to, "Precondition: from must not be after to");
    u32::try_from((to - from).num_days()).unwrap_or(u32::MAX)
}

/// One read of the decomposition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeLeg {
    pub granularity: Granularity,
    pub from: NaiveDate,
    pub limit: u32,
}

/// Split `range` into the reads that cover it exactly once.
///
/// With at least [`MONTH_BOUNDARY_THRESHOLD`] month boundaries the range is
/// served as lead days + whole months + trailing days; otherwise as days.
/// Legs with a zero limit are dropped.
pub fn decompose(range: &DateRange) -> Vec<RangeLeg> {
    let boundaries = range.month_boundaries();

    let legs = match (boundaries.first(), boundaries.last()) {
        (Some(&first), Some(&last)) if boundaries.len() >= MONTH_BOUNDARY_THRESHOLD => vec![
            RangeLeg {
                granularity: Granularity::Day,
                from: range.start,
                limit: days_between(range.start, first),
            },
            RangeLeg {
                granularity: Granularity::Month,
                from: first,
                limit: (boundaries.len() - 1) as u32,
            },
            RangeLeg {
                granularity: Granularity::Day,
                from: last,
                limit: days_between(last, range.end) + 1,
            },
        ],
        _ => vec![RangeLeg {
            granularity: Granularity::Day,
            from: range.start,
            limit: range.days(),
        }],
    };

    legs.into_iter().filter(|leg| leg.limit > 0).collect()
}

/// A range count queued into a batch.
#[derive(Debug)]
pub struct PendingRangeCount {
    legs: Vec<PendingSeries>,
}

impl PendingRangeCount {
    pub fn enqueue(batch: &mut Batch, key: &MetricKey, range: &DateRange) -> Self {
        let legs = decompose(range)
            .into_iter()
            .map(|leg| PendingSeries::enqueue(batch, key, leg.granularity, leg.from, leg.limit))
            .collect();
        PendingRangeCount { legs }
    }

    pub fn resolve(self, results: &BatchResults) -> Result<i64, StoreError> {
        Ok(self.resolve_series(results)?.total())
    }

    /// The legs' series joined by label: lead days, whole months, trailing days.
    pub fn resolve_series(self, results: &BatchResults) -> Result<TimeSeries, StoreError> {
        let legs = self
            .legs
            .into_iter()
            .map(|leg| leg.resolve(results))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(sum_series(&legs))
    }
}
