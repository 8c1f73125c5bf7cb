//! Batched store execution
//!
//! A [`Batch`] records operations without touching the store. Every enqueue
//! hands back a typed [`Pending`] handle; handles resolve against the
//! [`BatchResults`] produced by a single [`Batch::execute`] call.

use super::{Reply, Store, StoreOp};
use crate::error::StoreError;
use std::marker::PhantomData;
use tracing::debug;

/// Handle to the result of one queued operation.
#[derive(Debug)]
pub struct Pending<T> {
    index: usize,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Pending<T> {
    fn new(index: usize) -> Self {
        Pending {
            index,
            _marker: PhantomData,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }
}

impl<T> Clone for Pending<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Pending<T> {}

/// Ordered list of store intents executed together in one round-trip.
#[derive(Debug, Default, Clone)]
pub struct Batch {
    ops: Vec<StoreOp>,
}

impl Batch {
    pub fn new() -> Self {
        Batch { ops: Vec::new() }
    }

    fn push<T>(&mut self, op: StoreOp) -> Pending<T> {
        self.ops.push(op);
        Pending::new(self.ops.len() - 1)
    }

    pub fn incr(&mut self, key: impl Into<String>, amount: i64) -> Pending<i64> {
        self.push(StoreOp::Incr {
            key: key.into(),
            amount,
        })
    }

    pub fn hash_incr(
        &mut self,
        key: impl Into<String>,
        field: impl Into<String>,
        amount: i64,
    ) -> Pending<i64> {
        self.push(StoreOp::HashIncr {
            key: key.into(),
            field: field.into(),
            amount,
        })
    }

    pub fn hash_multi_get(
        &mut self,
        key: impl Into<String>,
        fields: Vec<String>,
    ) -> Pending<Vec<Option<i64>>> {
        self.push(StoreOp::HashMultiGet {
            key: key.into(),
            fields,
        })
    }

    pub fn get(&mut self, key: impl Into<String>) -> Pending<Option<String>> {
        self.push(StoreOp::Get { key: key.into() })
    }

    pub fn ops(&self) -> &[StoreOp] {
        &self.ops
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Run every queued operation in one round-trip.
    ///
    /// An empty batch never reaches the store.
    pub fn execute<S: Store + ?Sized>(self, store: &S) -> Result<BatchResults, StoreError> {
        if self.ops.is_empty() {
            return Ok(BatchResults {
                ops: self.ops,
                replies: Vec::new(),
            });
        }

        debug!(ops = self.ops.len(), "executing store batch");
        let replies = store.execute(&self.ops)?;
        if replies.len() != self.ops.len() {
            return Err(StoreError::Connection(format!(
                "batch of {} operations returned {} replies",
                self.ops.len(),
                replies.len()
            )));
        }

        Ok(BatchResults {
            ops: self.ops,
            replies,
        })
    }
}

/// Replies of an executed batch, in enqueue order.
#[derive(Debug)]
pub struct BatchResults {
    ops: Vec<StoreOp>,
    replies: Vec<Reply>,
}

impl BatchResults {
    /// Resolve a handle issued by the batch these results came from.
    pub fn resolve<T: FromReply>(&self, pending: Pending<T>) -> Result<T, StoreError> {
        let (op, reply) = self
            .ops
            .get(pending.index)
            .zip(self.replies.get(pending.index))
            .ok_or_else(|| {
                StoreError::Connection(format!("no reply for operation #{}", pending.index))
            })?;
        T::from_reply(op.name(), reply)
    }

    pub fn replies(&self) -> &[Reply] {
        &self.replies
    }

    pub fn len(&self) -> usize {
        self.replies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.replies.is_empty()
    }
}

/// Conversion from a raw [`Reply`] into the typed result of an operation.
pub trait FromReply: Sized {
    fn from_reply(op: &'static str, reply: &Reply) -> Result<Self, StoreError>;
}

fn unexpected(op: &'static str, reply: &Reply) -> StoreError {
    match reply {
        Reply::Error(msg) => StoreError::Command(msg.clone()),
        other => StoreError::UnexpectedReply {
            op,
            reply: format!("{:?}", other),
        },
    }
}

impl FromReply for i64 {
    fn from_reply(op: &'static str, reply: &Reply) -> Result<Self, StoreError> {
        match reply {
            Reply::Integer(n) => Ok(*n),
            other => Err(unexpected(op, other)),
        }
    }
}

impl FromReply for Vec<Option<i64>> {
    fn from_reply(op: &'static str, reply: &Reply) -> Result<Self, StoreError> {
        match reply {
            Reply::Integers(values) => Ok(values.clone()),
            other => Err(unexpected(op, other)),
        }
    }
}

impl FromReply for Option<String> {
    fn from_reply(op: &'static str, reply: &Reply) -> Result<Self, StoreError> {
        match reply {
            Reply::Bulk(value) => Ok(value.clone()),
            // INCRBY'd keys read back through GET as their integer value
            Reply::Integer(n) => Ok(Some(n.to_string())),
            other => Err(unexpected(op, other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;

    #[test]
    fn test_handles_follow_enqueue_order() {
        let mut batch = Batch::new();
        let a = batch.incr("a", 1);
        let b = batch.hash_incr("h", "f", 5);
        let c = batch.get("missing");

        assert_eq!(a.index(), 0);
        assert_eq!(b.index(), 1);
        assert_eq!(c.index(), 2);
        assert_eq!(batch.len(), 3);
    }

    #[test]
    fn test_execute_resolves_typed_results() {
        let store = InMemoryStore::new();
        let mut batch = Batch::new();
        let total = batch.incr("count", 3);
        let field = batch.hash_incr("hash", "f1", 2);
        let fields = batch.hash_multi_get("hash", vec!["f1".to_string(), "f2".to_string()]);
        let missing = batch.get("nope");

        let results = batch.execute(&store).unwrap();

        assert_eq!(results.resolve(total).unwrap(), 3);
        assert_eq!(results.resolve(field).unwrap(), 2);
        // HMGET is queued after HINCRBY in the same batch, so it sees the write
        assert_eq!(results.resolve(fields).unwrap(), vec![Some(2), None]);
        assert_eq!(results.resolve(missing).unwrap(), None);
    }

    #[test]
    fn test_empty_batch_skips_store() {
        let store = InMemoryStore::new();
        let results = Batch::new().execute(&store).unwrap();

        assert!(results.is_empty());
        assert_eq!(store.batches_executed(), 0);
    }

    #[test]
    fn test_error_reply_surfaces_as_command_error() {
        let err = i64::from_reply("INCRBY", &Reply::Error("ERR boom".to_string())).unwrap_err();
        assert!(matches!(err, StoreError::Command(msg) if msg == "ERR boom"));
    }

    #[test]
    fn test_wrong_shape_is_unexpected_reply() {
        let err = i64::from_reply("INCRBY", &Reply::Bulk(None)).unwrap_err();
        assert!(matches!(err, StoreError::UnexpectedReply { op: "INCRBY", .. }));
    }
}
