//! Time-bucketed counters
//!
//! Every tracked event increments a daily, weekly and monthly bucket plus an
//! undated total. Buckets are hash fields grouped into coarse hashes (one per
//! subject per month for days, one per subject per year for weeks and months)
//! so that a query for N periods touches a handful of keys instead of N.
//!
//! ## Storage layout
//!
//! ```text
//! user:{subject}:analy:{yy-mm}   {metric}:{yy-mm-dd}   daily bucket
//! user:{subject}:analy:{yy}      {metric}:{yy-mm-dd}   weekly bucket (Monday)
//! user:{subject}:analy:{yy}      {metric}:{yy-mm}      monthly bucket
//! analy:{subject}:count:{metric}                       undated total
//! ```

mod counter;
pub mod counter_dst;
mod key_encoder;
mod merge;
mod planner;
mod query;
mod range;
mod types;

pub use counter::{Analytics, BucketCounter, NoopAnalytics, TrackOutcome};
pub use counter_dst::{
    run_counter_batch, summarize_counter_batch, CounterDSTConfig, CounterDSTHarness,
    CounterDSTResult, CounterOp,
};
pub use key_encoder::BucketKeyEncoder;
pub use merge::{merge, sum_series};
pub use planner::{buckets, coarse_anchors, periods, BucketPlan, QueryPlan};
pub use query::{PendingCount, PendingSeries, PendingTrack, TrackResult};
pub use range::{decompose, DateRange, PendingRangeCount, RangeLeg, MONTH_BOUNDARY_THRESHOLD};
pub use types::{
    closest_monday, first_of_month, first_of_year, BucketAddress, Granularity, MetricKey,
    OneOrMany, Period, TimeSeries, LABEL_FORMAT,
};
