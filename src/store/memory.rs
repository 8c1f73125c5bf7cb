//! In-memory store for unit tests and deterministic simulation
//!
//! Implements the Redis semantics the counter layer relies on (INCRBY,
//! HINCRBY, HMGET, GET), including WRONGTYPE and non-integer error replies.
//! A whole batch executes under one write lock.

use super::{Reply, Store, StoreOp};
use crate::error::StoreError;
use ahash::AHashMap;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

const WRONGTYPE: &str = "WRONGTYPE Operation against a key holding the wrong kind of value";
const NOT_INTEGER: &str = "ERR value is not an integer or out of range";
const HASH_NOT_INTEGER: &str = "ERR hash value is not an integer";
const OVERFLOW: &str = "ERR increment or decrement would overflow";

#[derive(Debug, Clone)]
enum Entry {
    Scalar(String),
    Hash(AHashMap<String, String>),
}

#[derive(Debug, Default)]
struct Inner {
    data: RwLock<AHashMap<String, Entry>>,
    batches_executed: AtomicU64,
    ops_executed: AtomicU64,
    /// Number of upcoming batches that fail with a connection error
    failing_batches: AtomicU64,
}

/// In-memory keyspace shared between clones.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    inner: Arc<Inner>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of batches that reached the store (round-trips).
    pub fn batches_executed(&self) -> u64 {
        self.inner.batches_executed.load(Ordering::Relaxed)
    }

    /// Number of individual operations executed across all batches.
    pub fn ops_executed(&self) -> u64 {
        self.inner.ops_executed.load(Ordering::Relaxed)
    }

    /// Make the next `count` batches fail before applying any operation.
    pub fn fail_next_batches(&self, count: u64) {
        self.inner.failing_batches.store(count, Ordering::SeqCst);
    }

    /// Overwrite a scalar key (for testing corrupt or legacy values).
    pub fn set(&self, key: &str, value: &str) {
        self.inner
            .data
            .write()
            .insert(key.to_string(), Entry::Scalar(value.to_string()));
    }

    /// All keys currently stored, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.inner.data.read().keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Field names of a hash key, sorted. Empty for missing or scalar keys.
    pub fn hash_fields(&self, key: &str) -> Vec<String> {
        match self.inner.data.read().get(key) {
            Some(Entry::Hash(h)) => {
                let mut fields: Vec<String> = h.keys().cloned().collect();
                fields.sort();
                fields
            }
            _ => Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.data.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.data.read().is_empty()
    }

    pub fn clear(&self) {
        self.inner.data.write().clear();
    }

    fn take_injected_failure(&self) -> bool {
        self.inner
            .failing_batches
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

fn parse_int(value: &str) -> Option<i64> {
    value.parse::<i64>().ok()
}

fn apply(data: &mut AHashMap<String, Entry>, op: &StoreOp) -> Reply {
    match op {
        StoreOp::Incr { key, amount } => {
            let entry = data
                .entry(key.clone())
                .or_insert_with(|| Entry::Scalar("0".to_string()));
            match entry {
                Entry::Scalar(s) => {
                    let Some(current) = parse_int(s) else {
                        return Reply::Error(NOT_INTEGER.to_string());
                    };
                    match current.checked_add(*amount) {
                        Some(next) => {
                            *s = next.to_string();
                            Reply::Integer(next)
                        }
                        None => Reply::Error(OVERFLOW.to_string()),
                    }
                }
                Entry::Hash(_) => Reply::Error(WRONGTYPE.to_string()),
            }
        }

        StoreOp::HashIncr { key, field, amount } => {
            let entry = data
                .entry(key.clone())
                .or_insert_with(|| Entry::Hash(AHashMap::new()));
            match entry {
                Entry::Hash(h) => {
                    let slot = h.entry(field.clone()).or_insert_with(|| "0".to_string());
                    let Some(current) = parse_int(slot) else {
                        return Reply::Error(HASH_NOT_INTEGER.to_string());
                    };
                    match current.checked_add(*amount) {
                        Some(next) => {
                            *slot = next.to_string();
                            Reply::Integer(next)
                        }
                        None => Reply::Error(OVERFLOW.to_string()),
                    }
                }
                Entry::Scalar(_) => Reply::Error(WRONGTYPE.to_string()),
            }
        }

        StoreOp::HashMultiGet { key, fields } => match data.get(key) {
            None => Reply::Integers(vec![None; fields.len()]),
            Some(Entry::Hash(h)) => {
                let mut values = Vec::with_capacity(fields.len());
                for field in fields {
                    match h.get(field) {
                        None => values.push(None),
                        Some(raw) => match parse_int(raw) {
                            Some(n) => values.push(Some(n)),
                            None => return Reply::Error(HASH_NOT_INTEGER.to_string()),
                        },
                    }
                }
                Reply::Integers(values)
            }
            Some(Entry::Scalar(_)) => Reply::Error(WRONGTYPE.to_string()),
        },

        StoreOp::Get { key } => match data.get(key) {
            None => Reply::Bulk(None),
            Some(Entry::Scalar(s)) => Reply::Bulk(Some(s.clone())),
            Some(Entry::Hash(_)) => Reply::Error(WRONGTYPE.to_string()),
        },
    }
}

impl Store for InMemoryStore {
    fn execute(&self, ops: &[StoreOp]) -> Result<Vec<Reply>, StoreError> {
        if self.take_injected_failure() {
            return Err(StoreError::Connection(
                "injected failure: store unavailable".to_string(),
            ));
        }

        self.inner.batches_executed.fetch_add(1, Ordering::Relaxed);
        self.inner
            .ops_executed
            .fetch_add(ops.len() as u64, Ordering::Relaxed);

        let mut data = self.inner.data.write();
        let replies: Vec<Reply> = ops.iter().map(|op| apply(&mut data, op)).collect();

        debug_assert_eq!(
            replies.len(),
            ops.len(),
            "Postcondition: one reply per operation"
        );
        Ok(replies)
    }
}
