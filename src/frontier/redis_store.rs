use super::{SharedStore, StoreError};
use crate::model::CrawlRequest;
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;

/// Marks the key seen and queues the payload, only if the key is new.
///
/// The score packs (priority, sequence) so ZPOPMIN yields the lowest
/// priority first and FIFO order within one priority.
const SCRIPT_PUSH_IF_NEW: &str = r#"
    if redis.call('SADD', KEYS[1], ARGV[1]) == 0 then
        return 0
    end
    local seq = redis.call('INCR', KEYS[3])
    local score = tonumber(ARGV[2]) * 4294967296 + seq
    redis.call('ZADD', KEYS[2], score, ARGV[3])
    return 1
"#;

/// `SharedStore` backed by Redis
///
/// Keys, under the configured prefix:
/// - `{prefix}:seen` set of normalized URLs (SADD is the atomic dedup)
/// - `{prefix}:queue` sorted set of JSON-encoded requests (ZPOPMIN is the atomic pop)
/// - `{prefix}:seq` insertion counter
#[derive(Clone)]
pub struct RedisStore {
    connection: MultiplexedConnection,
    seen_key: String,
    queue_key: String,
    seq_key: String,
}

impl RedisStore {
    /// Connects to Redis and returns a store using `key_prefix` for its keys
    pub async fn connect(redis_url: &str, key_prefix: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(redis_url)?;
        let connection = client.get_multiplexed_async_connection().await?;

        tracing::info!(redis_url, key_prefix, "Connected to shared frontier store");

        Ok(Self {
            connection,
            seen_key: format!("{}:seen", key_prefix),
            queue_key: format!("{}:queue", key_prefix),
            seq_key: format!("{}:seq", key_prefix),
        })
    }

    fn score(&self, priority: u32, seq: u64) -> f64 {
        f64::from(priority) * 4_294_967_296.0 + seq as f64
    }
}

#[async_trait]
impl SharedStore for RedisStore {
    async fn try_insert(&self, key: &str) -> Result<bool, StoreError> {
        let mut con = self.connection.clone();
        let added: i64 = con.sadd(&self.seen_key, key).await?;
        Ok(added == 1)
    }

    async fn enqueue(&self, request: &CrawlRequest) -> Result<(), StoreError> {
        let payload = serde_json::to_string(request)?;
        let mut con = self.connection.clone();
        let seq: u64 = con.incr(&self.seq_key, 1).await?;
        con.zadd::<_, _, _, ()>(&self.queue_key, payload, self.score(request.priority, seq))
            .await?;
        Ok(())
    }

    async fn pop_highest_priority(&self) -> Result<Option<CrawlRequest>, StoreError> {
        let mut con = self.connection.clone();
        let popped: Vec<(String, f64)> = con.zpopmin(&self.queue_key, 1).await?;

        match popped.into_iter().next() {
            Some((payload, _score)) => Ok(Some(serde_json::from_str(&payload)?)),
            None => Ok(None),
        }
    }

    async fn pending(&self) -> Result<usize, StoreError> {
        let mut con = self.connection.clone();
        let count: usize = con.zcard(&self.queue_key).await?;
        Ok(count)
    }

    async fn push_if_new(&self, request: &CrawlRequest) -> Result<bool, StoreError> {
        let payload = serde_json::to_string(request)?;
        let mut con = self.connection.clone();

        let inserted: i64 = redis::Script::new(SCRIPT_PUSH_IF_NEW)
            .key(&self.seen_key)
            .key(&self.queue_key)
            .key(&self.seq_key)
            .arg(request.key())
            .arg(request.priority)
            .arg(payload)
            .invoke_async(&mut con)
            .await?;

        Ok(inserted == 1)
    }
}
