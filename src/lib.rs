//! Time-bucketed event counters over a sharded key-value store.
//!
//! Each tracked event bumps a daily, weekly and monthly bucket plus an undated
//! total. Reads come back as zero-filled series, and every public call costs a
//! single store round-trip however many keys it touches.
//!
//! ```no_run
//! use chrono::NaiveDate;
//! use redis_analytics::{Analytics, BucketCounter, InMemoryStore};
//!
//! let counter = BucketCounter::new(InMemoryStore::new());
//! let day = NaiveDate::from_ymd_opt(2012, 1, 1).unwrap();
//! counter.track_metric("1234".into(), "badge:25".into(), day, 1).unwrap();
//! let series = counter.get_metric_by_day("1234", "badge:25", day, 7).unwrap();
//! assert_eq!(series.total(), 1);
//! ```

pub mod buckets;
pub mod config;
pub mod error;
pub mod observability;
pub mod store;

pub use buckets::{
    Analytics, BucketCounter, DateRange, Granularity, MetricKey, NoopAnalytics, OneOrMany,
    Period, TimeSeries, TrackOutcome, TrackResult,
};
pub use config::{create_backend, AnalyticsConfig, BackendKind};
pub use error::{AnalyticsError, ConfigError, Result, StoreError};
pub use observability::{init_logging, LogConfig};
pub use store::{Batch, InMemoryStore, RedisStore, RedisTarget, Store};
