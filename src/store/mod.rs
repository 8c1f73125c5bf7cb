//! Key-Value Store Abstraction
//!
//! The counter layer talks to its backing store only through the [`Store`]
//! trait: four primitive operations and a way to execute a list of them in a
//! single round-trip.
//!
//! Implementations:
//! - `InMemoryStore`: For unit tests and deterministic simulation
//! - `RedisStore`: For production, one pipeline per shard per batch

mod batch;
mod memory;
mod redis_store;

pub use batch::{Batch, BatchResults, FromReply, Pending};
pub use memory::InMemoryStore;
pub use redis_store::{RedisStore, RedisTarget};

use crate::error::StoreError;

/// A single deferred store operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOp {
    /// `INCRBY key amount`
    Incr { key: String, amount: i64 },
    /// `HINCRBY key field amount`
    HashIncr {
        key: String,
        field: String,
        amount: i64,
    },
    /// `HMGET key field [field ...]`
    HashMultiGet { key: String, fields: Vec<String> },
    /// `GET key`
    Get { key: String },
}

impl StoreOp {
    /// The key this operation touches, used for shard routing.
    pub fn key(&self) -> &str {
        match self {
            StoreOp::Incr { key, .. }
            | StoreOp::HashIncr { key, .. }
            | StoreOp::HashMultiGet { key, .. }
            | StoreOp::Get { key } => key,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            StoreOp::Incr { .. } => "INCRBY",
            StoreOp::HashIncr { .. } => "HINCRBY",
            StoreOp::HashMultiGet { .. } => "HMGET",
            StoreOp::Get { .. } => "GET",
        }
    }
}

/// Reply to one [`StoreOp`], positionally matched to the batch it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Integer(i64),
    Integers(Vec<Option<i64>>),
    Bulk(Option<String>),
    /// Per-operation error reply; siblings in the same batch are unaffected
    Error(String),
}

/// Capability set the counter layer needs from a key-value store.
///
/// `execute` must return exactly one reply per operation, in the order the
/// operations were given. A transport failure fails the whole batch.
pub trait Store: Send + Sync {
    /// Execute every operation in one round-trip.
    fn execute(&self, ops: &[StoreOp]) -> Result<Vec<Reply>, StoreError>;

    fn incr(&self, key: &str, amount: i64) -> Result<i64, StoreError> {
        let mut batch = Batch::new();
        let pending = batch.incr(key, amount);
        batch.execute(self)?.resolve(pending)
    }

    fn hash_incr(&self, key: &str, field: &str, amount: i64) -> Result<i64, StoreError> {
        let mut batch = Batch::new();
        let pending = batch.hash_incr(key, field, amount);
        batch.execute(self)?.resolve(pending)
    }

    fn hash_multi_get(&self, key: &str, fields: &[String]) -> Result<Vec<Option<i64>>, StoreError> {
        let mut batch = Batch::new();
        let pending = batch.hash_multi_get(key, fields.to_vec());
        batch.execute(self)?.resolve(pending)
    }

    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut batch = Batch::new();
        let pending = batch.get(key);
        batch.execute(self)?.resolve(pending)
    }
}

impl<S: Store + ?Sized> Store for std::sync::Arc<S> {
    fn execute(&self, ops: &[StoreOp]) -> Result<Vec<Reply>, StoreError> {
        (**self).execute(ops)
    }
}
