//! Live Redis Integration Tests
//!
//! Run against a real server with:
//!
//! ```text
//! REDIS_URL=redis://127.0.0.1:6379/15 cargo test --test redis_integration_test -- --ignored
//! ```
//!
//! Every test uses a subject unique to the process so reruns do not collide.

use chrono::NaiveDate;
use redis_analytics::{Analytics, BucketCounter, MetricKey, RedisStore, RedisTarget, Store};

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn target() -> RedisTarget {
    let url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379/15".to_string());
    let rest = url.trim_start_matches("redis://");
    let (addr, db) = rest.split_once('/').unwrap_or((rest, "0"));
    let (host, port) = addr.split_once(':').unwrap_or((addr, "6379"));
    RedisTarget {
        host: host.to_string(),
        port: port.parse().unwrap(),
        db: db.parse().unwrap(),
        password: None,
    }
}

fn subject(name: &str) -> String {
    format!("it-{}-{}", name, std::process::id())
}

#[test]
#[ignore]
fn test_live_track_and_read() {
    let counter = BucketCounter::new(RedisStore::new(vec![target()]).unwrap());
    let s = subject("track");

    counter.track_metric(s.as_str().into(), "badge:25".into(), date(2012, 1, 1), 1).unwrap();
    counter.track_metric(s.as_str().into(), "badge:25".into(), date(2012, 1, 1), 3).unwrap();

    let daily = counter.get_metric_by_day(&s, "badge:25", date(2011, 12, 31), 3).unwrap();
    assert_eq!(daily.counts(), vec![0, 4, 0]);

    let weekly = counter.get_metric_by_week(&s, "badge:25", date(2012, 1, 1), 1).unwrap();
    assert_eq!(weekly.counts(), vec![4]);

    assert_eq!(counter.get_count(&s, "badge:25", None, None).unwrap(), 4);
    assert_eq!(
        counter.get_counts(&[MetricKey::new(&s, "badge:25"), MetricKey::new(&s, "nope")]).unwrap(),
        vec![4, 0]
    );
}

#[test]
#[ignore]
fn test_live_sharded_batch_keeps_order() {
    // Two shards on the same server, different databases
    let a = target();
    let b = RedisTarget { db: a.db ^ 1, ..a.clone() };
    let store = RedisStore::new(vec![a, b]).unwrap();
    let counter = BucketCounter::new(store);

    let subjects: Vec<String> = (0..8).map(|i| subject(&format!("shard{}", i))).collect();
    counter
        .track_metric(subjects.clone().into(), "m".into(), date(2011, 10, 15), 2)
        .unwrap();

    let keys: Vec<MetricKey> = subjects.iter().map(|s| MetricKey::new(s, "m")).collect();
    assert_eq!(counter.get_counts(&keys).unwrap(), vec![2; 8]);

    let range = counter
        .get_count(&subjects[3], "m", Some(date(2011, 9, 1)), Some(date(2011, 11, 1)))
        .unwrap();
    assert_eq!(range, 2);
}

#[test]
#[ignore]
fn test_live_wrongtype_is_per_op() {
    let store = RedisStore::new(vec![target()]).unwrap();
    let s = subject("wrongtype");
    let count_key = format!("analy:{}:count:m", s);

    store.hash_incr(&count_key, "f", 1).unwrap();
    assert!(store.incr(&count_key, 1).is_err());
}
