//! Sharded Redis store
//!
//! Keys are routed to one of the configured hosts by a stable FNV hash of the
//! key. A batch is split into one pipeline per touched shard; replies are
//! stitched back together in the order the operations were queued.

use super::{Reply, Store, StoreOp};
use crate::error::{AnalyticsError, StoreError};
use fnv::FnvHasher;
use parking_lot::Mutex;
use std::hash::Hasher;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Connection parameters for one Redis host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedisTarget {
    pub host: String,
    pub port: u16,
    pub db: i64,
    pub password: Option<String>,
}

impl Default for RedisTarget {
    fn default() -> Self {
        RedisTarget {
            host: "localhost".to_string(),
            port: 6379,
            db: 0,
            password: None,
        }
    }
}

impl RedisTarget {
    pub fn url(&self) -> String {
        match &self.password {
            Some(password) => format!(
                "redis://:{}@{}:{}/{}",
                password, self.host, self.port, self.db
            ),
            None => format!("redis://{}:{}/{}", self.host, self.port, self.db),
        }
    }
}

struct Shard {
    target: RedisTarget,
    client: redis::Client,
    conn: Mutex<Option<redis::Connection>>,
}

impl Shard {
    fn run(
        &self,
        ops: &[&StoreOp],
        connect_timeout: Option<Duration>,
    ) -> Result<Vec<redis::Value>, StoreError> {
        let mut guard = self.conn.lock();
        if guard.is_none() {
            let conn = match connect_timeout {
                Some(timeout) => self.client.get_connection_with_timeout(timeout),
                None => self.client.get_connection(),
            }
            .map_err(|e| {
                StoreError::Connection(format!(
                    "{}:{}/{}: {}",
                    self.target.host, self.target.port, self.target.db, e
                ))
            })?;
            *guard = Some(conn);
        }

        let mut pipe = redis::pipe();
        // Error replies come back as values so one bad op does not fail its siblings
        pipe.ignore_errors();
        for op in ops {
            match op {
                StoreOp::Incr { key, amount } => {
                    pipe.cmd("INCRBY").arg(key).arg(*amount);
                }
                StoreOp::HashIncr { key, field, amount } => {
                    pipe.cmd("HINCRBY").arg(key).arg(field).arg(*amount);
                }
                StoreOp::HashMultiGet { key, fields } => {
                    pipe.cmd("HMGET").arg(key).arg(fields.as_slice());
                }
                StoreOp::Get { key } => {
                    pipe.cmd("GET").arg(key);
                }
            }
        }

        let Some(conn) = guard.as_mut() else {
            return Err(StoreError::Connection("connection unavailable".to_string()));
        };
        match pipe.query::<Vec<redis::Value>>(conn) {
            Ok(values) => Ok(values),
            Err(e) => {
                // Drop the connection; the next batch reconnects
                warn!(
                    host = %self.target.host,
                    port = self.target.port,
                    error = %e,
                    "redis pipeline failed, resetting connection"
                );
                *guard = None;
                Err(StoreError::Redis(e))
            }
        }
    }
}

/// Redis-backed [`Store`] over one or more hosts.
pub struct RedisStore {
    shards: Vec<Shard>,
    connect_timeout: Option<Duration>,
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore")
            .field(
                "shards",
                &self.shards.iter().map(|s| &s.target).collect::<Vec<_>>(),
            )
            .field("connect_timeout", &self.connect_timeout)
            .finish()
    }
}

impl RedisStore {
    /// Create a store over `targets`. Connections are opened lazily.
    pub fn new(targets: Vec<RedisTarget>) -> Result<Self, AnalyticsError> {
        if targets.is_empty() {
            return Err(AnalyticsError::invalid_argument("no redis hosts specified"));
        }

        let mut shards = Vec::with_capacity(targets.len());
        for target in targets {
            let client = redis::Client::open(target.url().as_str()).map_err(|e| {
                AnalyticsError::invalid_argument(format!(
                    "invalid redis host {}:{}: {}",
                    target.host, target.port, e
                ))
            })?;
            shards.push(Shard {
                target,
                client,
                conn: Mutex::new(None),
            });
        }

        info!(shards = shards.len(), "redis store configured");
        Ok(RedisStore {
            shards,
            connect_timeout: None,
        })
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    pub fn targets(&self) -> Vec<&RedisTarget> {
        self.shards.iter().map(|s| &s.target).collect()
    }

    /// Shard index that owns `key`.
    pub fn shard_for(&self, key: &str) -> usize {
        shard_index(key, self.shards.len())
    }
}

fn shard_index(key: &str, shard_count: usize) -> usize {
    debug_assert!(shard_count > 0, "Precondition: at least one shard");
    let mut hasher = FnvHasher::default();
    hasher.write(key.as_bytes());
    (hasher.finish() % shard_count as u64) as usize
}

fn parse_count(bytes: &[u8]) -> Option<i64> {
    std::str::from_utf8(bytes).ok()?.parse().ok()
}

fn to_reply(op: &StoreOp, value: redis::Value) -> Reply {
    match (op, value) {
        (_, redis::Value::ServerError(err)) => Reply::Error(format!("{:?}", err)),
        (StoreOp::Incr { .. } | StoreOp::HashIncr { .. }, redis::Value::Int(n)) => {
            Reply::Integer(n)
        }
        (StoreOp::HashMultiGet { .. }, redis::Value::Array(items)) => {
            let mut values = Vec::with_capacity(items.len());
            for item in items {
                match item {
                    redis::Value::Nil => values.push(None),
                    redis::Value::Int(n) => values.push(Some(n)),
                    redis::Value::BulkString(bytes) => match parse_count(&bytes) {
                        Some(n) => values.push(Some(n)),
                        None => {
                            return Reply::Error("ERR hash value is not an integer".to_string())
                        }
                    },
                    other => return Reply::Error(format!("unexpected HMGET item: {:?}", other)),
                }
            }
            Reply::Integers(values)
        }
        (StoreOp::Get { .. }, redis::Value::Nil) => Reply::Bulk(None),
        (StoreOp::Get { .. }, redis::Value::BulkString(bytes)) => {
            Reply::Bulk(Some(String::from_utf8_lossy(&bytes).into_owned()))
        }
        (StoreOp::Get { .. }, redis::Value::SimpleString(s)) => Reply::Bulk(Some(s)),
        (StoreOp::Get { .. }, redis::Value::Int(n)) => Reply::Bulk(Some(n.to_string())),
        (op, other) => Reply::Error(format!("unexpected {} reply: {:?}", op.name(), other)),
    }
}

impl Store for RedisStore {
    /// Shard pipelines are sent one after another, so a batch touching `k`
    /// shards costs `k` sequential round-trips.
    fn execute(&self, ops: &[StoreOp]) -> Result<Vec<Reply>, StoreError> {
        let mut replies: Vec<Option<Reply>> = vec![None; ops.len()];
        let mut per_shard: Vec<Vec<usize>> = vec![Vec::new(); self.shards.len()];

        for (index, op) in ops.iter().enumerate() {
            match op {
                // HMGET with no fields is a syntax error in Redis
                StoreOp::HashMultiGet { fields, .. } if fields.is_empty() => {
                    replies[index] = Some(Reply::Integers(Vec::new()));
                }
                _ => per_shard[self.shard_for(op.key())].push(index),
            }
        }

        for (shard, indices) in self.shards.iter().zip(&per_shard) {
            if indices.is_empty() {
                continue;
            }
            let shard_ops: Vec<&StoreOp> = indices.iter().map(|&i| &ops[i]).collect();
            debug!(
                host = %shard.target.host,
                ops = shard_ops.len(),
                "sending pipeline"
            );
            let values = shard.run(&shard_ops, self.connect_timeout)?;
            if values.len() != indices.len() {
                return Err(StoreError::Connection(format!(
                    "pipeline of {} commands returned {} replies",
                    indices.len(),
                    values.len()
                )));
            }
            for (&index, value) in indices.iter().zip(values) {
                replies[index] = Some(to_reply(&ops[index], value));
            }
        }

        replies
            .into_iter()
            .enumerate()
            .map(|(index, reply)| {
                reply.ok_or_else(|| {
                    StoreError::Connection(format!("no reply for operation #{}", index))
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target(host: &str) -> RedisTarget {
        RedisTarget {
            host: host.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_no_hosts_is_invalid_argument() {
        let err = RedisStore::new(Vec::new()).unwrap_err();
        assert!(matches!(err, AnalyticsError::InvalidArgument(_)));
    }

    #[test]
    fn test_target_url() {
        let mut t = target("redis.example.org");
        t.db = 2;
        assert_eq!(t.url(), "redis://redis.example.org:6379/2");

        t.password = Some("secret".to_string());
        assert_eq!(t.url(), "redis://:secret@redis.example.org:6379/2");
    }

    #[test]
    fn test_routing_is_stable_and_in_range() {
        let store = RedisStore::new(vec![target("a"), target("b"), target("c")]).unwrap();
        for i in 0..100 {
            let key = format!("user:{}:analy:12", i);
            let shard = store.shard_for(&key);
            assert!(shard < 3);
            assert_eq!(shard, store.shard_for(&key));
        }
    }

    #[test]
    fn test_routing_spreads_keys() {
        let mut seen = [false; 4];
        for i in 0..200 {
            seen[shard_index(&format!("analy:{}:count:m", i), 4)] = true;
        }
        assert!(seen.iter().all(|s| *s), "every shard should own some keys");
    }

    #[test]
    fn test_single_host_owns_everything() {
        let store = RedisStore::new(vec![target("a")]).unwrap();
        assert_eq!(store.shard_for("anything"), 0);
        assert_eq!(store.shard_count(), 1);
    }

    #[test]
    fn test_reply_conversion() {
        let incr = StoreOp::Incr {
            key: "k".to_string(),
            amount: 1,
        };
        assert_eq!(to_reply(&incr, redis::Value::Int(4)), Reply::Integer(4));

        let hmget = StoreOp::HashMultiGet {
            key: "h".to_string(),
            fields: vec!["a".to_string(), "b".to_string()],
        };
        let reply = to_reply(
            &hmget,
            redis::Value::Array(vec![
                redis::Value::BulkString(b"12".to_vec()),
                redis::Value::Nil,
            ]),
        );
        assert_eq!(reply, Reply::Integers(vec![Some(12), None]));

        let get = StoreOp::Get {
            key: "k".to_string(),
        };
        assert_eq!(to_reply(&get, redis::Value::Nil), Reply::Bulk(None));
        assert_eq!(
            to_reply(&get, redis::Value::BulkString(b"7".to_vec())),
            Reply::Bulk(Some("7".to_string()))
        );
    }
}
