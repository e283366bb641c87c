//! Redis integration for the graph stores
//!
//! Provides:
//! - A shared, auto-reconnecting connection handle
//! - Namespaced key builders for friend sets, score sets and dedup sets
//! - Cursor-based key scanning

use crate::config::RedisConfig;
use crate::errors::{AppError, Result};
use crate::graph::MemberId;
use redis::aio::ConnectionManager;
use redis::Client;
use tracing::{debug, warn};

/// Redis client handle shared by the graph stores.
///
/// Constructed once at process start and cloned into each store; the
/// underlying connection is multiplexed, so clones never serialize callers.
#[derive(Clone)]
pub struct RedisStore {
    connection: ConnectionManager,
    keys: KeySpace,
}

impl RedisStore {
    /// Connect to Redis
    pub async fn connect(config: &RedisConfig) -> Result<Self> {
        let client = Client::open(config.url.as_str())
            .map_err(|e| AppError::store("redis", format!("Failed to create Redis client: {}", e)))?;

        let connection = client
            .get_connection_manager()
            .await
            .map_err(|e| AppError::store("redis", format!("Failed to connect to Redis: {}", e)))?;

        debug!(prefix = %config.key_prefix, "Redis connection established");

        Ok(Self {
            connection,
            keys: KeySpace::new(&config.key_prefix),
        })
    }

    /// A connection handle for one operation
    pub fn conn(&self) -> ConnectionManager {
        self.connection.clone()
    }

    /// Key builders for this store's namespace
    pub fn keys(&self) -> &KeySpace {
        &self.keys
    }

    /// Collect every key matching `pattern` using SCAN
    pub async fn scan_keys(&self, pattern: &str, page_size: usize) -> Result<Vec<String>> {
        let mut conn = self.conn();
        let mut cursor: u64 = 0;
        let mut keys = Vec::new();

        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(page_size)
                .query_async(&mut conn)
                .await?;

            keys.extend(batch);
            if next == 0 {
                break;
            }
            cursor = next;
        }

        debug!(pattern, count = keys.len(), "Scanned keys");
        Ok(keys)
    }

    /// Ping Redis to check connectivity
    pub async fn ping(&self) -> Result<()> {
        let mut conn = self.conn();
        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .map_err(|e| AppError::store("redis", format!("Redis ping failed: {}", e)))?;
        Ok(())
    }
}

/// Key layout for the graph stores
#[derive(Debug, Clone)]
pub struct KeySpace {
    prefix: String,
}

impl KeySpace {
    pub fn new(prefix: &str) -> Self {
        Self {
            prefix: prefix.trim_end_matches(':').to_string(),
        }
    }

    /// Set of direct friends
    pub fn friends(&self, member: MemberId) -> String {
        format!("{}:friends:{}", self.prefix, member)
    }

    /// Prefix shared by every friend set key
    pub fn friends_prefix(&self) -> String {
        format!("{}:friends:", self.prefix)
    }

    /// Sorted set of interaction scores
    pub fn interactions(&self, member: MemberId) -> String {
        format!("{}:interactions:{}", self.prefix, member)
    }

    /// Pattern matching every interaction score set
    pub fn interactions_pattern(&self) -> String {
        format!("{}:interactions:*", self.prefix)
    }

    /// Set of recorded dedup hashes for an unordered member pair
    pub fn interaction_dedup(&self, a: MemberId, b: MemberId) -> String {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        format!("{}:interaction_dedup:{}:{}", self.prefix, lo, hi)
    }
}

/// Decode stored member ids, skipping entries that are not valid ids.
pub fn parse_members(raw: Vec<String>, key: &str) -> Vec<MemberId> {
    raw.into_iter()
        .filter_map(|value| match value.parse::<MemberId>() {
            Ok(id) => Some(id),
            Err(_) => {
                warn!(key, value = %value, "Skipping malformed member id");
                None
            }
        })
        .collect()
}

/// Live Redis for `#[ignore]`d store tests: `REDIS_URL` (or localhost)
/// under a fresh key prefix
#[cfg(test)]
pub(crate) mod scratch {
    use super::*;
    use redis::AsyncCommands;

    pub async fn store() -> RedisStore {
        let url = std::env::var("REDIS_URL").unwrap_or_else(|_| RedisConfig::default().url);
        let nanos = chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default();
        let config = RedisConfig {
            url,
            key_prefix: format!("friendlink-test:{}", nanos),
        };
        RedisStore::connect(&config).await.unwrap()
    }

    pub async fn clear(store: &RedisStore) {
        let keys = store.scan_keys(&format!("{}:*", store.keys.prefix), 100).await.unwrap();
        if !keys.is_empty() {
            let _: i64 = store.conn().del(keys).await.unwrap();
        }
    }
}
