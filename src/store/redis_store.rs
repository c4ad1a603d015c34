//! Redis adapter for [`KvStore`].

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{Client, RedisError, RedisResult, Script};
use tracing::{info, warn};

use super::{KvStore, StoreError};

const COMPARE_AND_DELETE: &str = r"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    return redis.call('DEL', KEYS[1])
end
return 0
";

/// Store backed by a single Redis server.
///
/// The connection manager reconnects on its own; each call is bounded by
/// `op_timeout` and surfaces [`StoreError::Timeout`] when it elapses.
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
    op_timeout: Duration,
    compare_and_delete: Arc<Script>,
}

impl RedisStore {
    pub async fn connect(url: &str, op_timeout: Duration) -> Result<Self, StoreError> {
        let client = Client::open(url)?;
        let conn = tokio::time::timeout(op_timeout, ConnectionManager::new(client))
            .await
            .map_err(|_| StoreError::Timeout)??;

        info!(
            target = "stampede::store",
            timeout_ms = op_timeout.as_millis() as u64,
            "connected to redis"
        );

        Ok(Self {
            conn,
            op_timeout,
            compare_and_delete: Arc::new(Script::new(COMPARE_AND_DELETE)),
        })
    }

    async fn run<T, F>(&self, op: &'static str, fut: F) -> Result<T, StoreError>
    where
        F: Future<Output = RedisResult<T>>,
    {
        match tokio::time::timeout(self.op_timeout, fut).await {
            Ok(result) => result.map_err(StoreError::from),
            Err(_) => {
                warn!(
                    target = "stampede::store",
                    op,
                    timeout_ms = self.op_timeout.as_millis() as u64,
                    "redis operation timed out"
                );
                Err(StoreError::Timeout)
            }
        }
    }
}

fn ttl_millis(ttl: Duration) -> u64 {
    // PX 0 is rejected by redis
    (ttl.as_millis() as u64).max(1)
}

#[async_trait]
impl KvStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.conn.clone();
        self.run("get", async move {
            let value: Option<String> = redis::cmd("GET").arg(key).query_async(&mut conn).await?;
            Ok::<_, RedisError>(value)
        })
        .await
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        self.run("set", async move {
            let mut cmd = redis::cmd("SET");
            cmd.arg(key).arg(value);
            if let Some(ttl) = ttl {
                cmd.arg("PX").arg(ttl_millis(ttl));
            }
            let _: () = cmd.query_async(&mut conn).await?;
            Ok::<_, RedisError>(())
        })
        .await
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        self.run("set_if_absent", async move {
            let reply: Option<String> = redis::cmd("SET")
                .arg(key)
                .arg(value)
                .arg("NX")
                .arg("PX")
                .arg(ttl_millis(ttl))
                .query_async(&mut conn)
                .await?;
            Ok::<_, RedisError>(reply.is_some())
        })
        .await
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        self.run("delete", async move {
            let removed: i64 = redis::cmd("DEL").arg(key).query_async(&mut conn).await?;
            Ok::<_, RedisError>(removed > 0)
        })
        .await
    }

    async fn compare_and_delete(&self, key: &str, expected: &str) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        let script = Arc::clone(&self.compare_and_delete);
        self.run("compare_and_delete", async move {
            let removed: i64 = script
                .key(key)
                .arg(expected)
                .invoke_async(&mut conn)
                .await?;
            Ok::<_, RedisError>(removed > 0)
        })
        .await
    }

    async fn increment(&self, key: &str) -> Result<i64, StoreError> {
        let mut conn = self.conn.clone();
        self.run("increment", async move {
            let value: i64 = redis::cmd("INCR").arg(key).query_async(&mut conn).await?;
            Ok::<_, RedisError>(value)
        })
        .await
    }
}
