//! Counter Deterministic Simulation Tests
//!
//! DST tests for BucketCounter with multiple seeds.

use redis_analytics::buckets::{
    run_counter_batch, summarize_counter_batch, CounterDSTConfig, CounterDSTHarness,
};

// =============================================================================
// Standard Configuration Tests - 100 Seeds
// =============================================================================

#[test]
fn test_counter_dst_100_seeds_standard() {
    let results = run_counter_batch(0, 100, 200, CounterDSTConfig::new);
    let summary = summarize_counter_batch(&results);
    println!("{}", summary);

    let passed = results.iter().filter(|r| r.is_success()).count();
    assert_eq!(passed, 100, "All 100 seeds should pass with standard config");
}

#[test]
fn test_counter_dst_100_seeds_year_boundary() {
    let results = run_counter_batch(1000, 100, 200, CounterDSTConfig::year_boundary);
    let summary = summarize_counter_batch(&results);
    println!("{}", summary);

    let passed = results.iter().filter(|r| r.is_success()).count();
    assert_eq!(passed, 100, "All 100 seeds should pass around New Year");
}

#[test]
fn test_counter_dst_50_seeds_wide() {
    let results = run_counter_batch(2000, 50, 300, CounterDSTConfig::wide);
    let summary = summarize_counter_batch(&results);
    println!("{}", summary);

    let passed = results.iter().filter(|r| r.is_success()).count();
    assert_eq!(passed, 50, "All 50 seeds should pass with a wide keyspace");
}

// =============================================================================
// Stress Tests
// =============================================================================

#[test]
fn test_counter_dst_stress_2000_ops() {
    let mut harness = CounterDSTHarness::with_seed(42);
    harness.run(2000);
    let result = harness.result();
    println!("Stress 2000 ops: {}", result.summary());
    assert!(result.is_success(), "2000 ops should maintain invariants");
}

#[test]
fn test_counter_dst_query_heavy() {
    let config = CounterDSTConfig {
        query_prob: 0.6,
        ..CounterDSTConfig::year_boundary(777)
    };
    let mut harness = CounterDSTHarness::new(config);
    harness.run(1000);
    let result = harness.result();
    println!(
        "Query heavy: {} (series:{}, ranges:{})",
        result.summary(),
        result.series_checks,
        result.range_checks
    );
    assert!(result.is_success(), "Query-heavy run should maintain invariants");
    assert!(result.series_checks > 0 && result.range_checks > 0);
}
