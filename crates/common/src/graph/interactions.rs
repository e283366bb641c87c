//! Interaction scores: one Redis sorted set per member
//!
//! Increments are idempotent per (pair, dedup key): the SHA-256 of the key is
//! recorded in a per-pair set and the score only moves when that insert is new.
//! Decay multiplies every score by a fixed rate and prunes what falls below
//! the floor, one collection at a time.

use super::{InteractionScoreStore, MemberId};
use crate::config::{GraphConfig, InteractionConfig};
use crate::errors::{AppError, Result};
use crate::kv::{parse_members, RedisStore};
use async_trait::async_trait;
use futures::{stream, StreamExt, TryStreamExt};
use redis::{AsyncCommands, Script};
use sha2::{Digest, Sha256};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// KEYS: dedup set, a's scores, b's scores
/// ARGV: dedup hash, increment, b, a, dedup ttl
const INCREMENT_SCRIPT: &str = r#"
if redis.call('SADD', KEYS[1], ARGV[1]) == 0 then
    return 0
end
local ttl = tonumber(ARGV[5])
if ttl > 0 then
    redis.call('EXPIRE', KEYS[1], ttl)
end
redis.call('ZINCRBY', KEYS[2], ARGV[2], ARGV[3])
redis.call('ZINCRBY', KEYS[3], ARGV[2], ARGV[4])
return 1
"#;

/// KEYS: one member's scores
/// ARGV: decay rate, minimum score
const DECAY_SCRIPT: &str = r#"
local entries = redis.call('ZRANGE', KEYS[1], 0, -1, 'WITHSCORES')
local rate = tonumber(ARGV[1])
local floor = tonumber(ARGV[2])
for i = 1, #entries, 2 do
    local decayed = tonumber(entries[i + 1]) * rate
    if decayed < floor then
        redis.call('ZREM', KEYS[1], entries[i])
    else
        redis.call('ZADD', KEYS[1], 'XX', decayed, entries[i])
    end
end
return #entries / 2
"#;

const SCAN_PAGE: usize = 500;

/// Stable identity of a dedup key
pub fn dedup_digest(dedup_key: &str) -> String {
    hex::encode(Sha256::digest(dedup_key.as_bytes()))
}

/// Inclusive ZREVRANGE stop index for the first `limit` entries
fn top_range_end(limit: usize) -> isize {
    isize::try_from(limit).unwrap_or(isize::MAX) - 1
}

fn reject_self_interaction(a: MemberId, b: MemberId) -> Result<()> {
    if a == b {
        return Err(AppError::Validation {
            message: format!("member {} cannot interact with themselves", a),
            field: None,
        });
    }
    Ok(())
}

/// Redis-backed interaction scores
pub struct RedisInteractionStore {
    store: RedisStore,
    config: InteractionConfig,
    chunk_size: usize,
    concurrency: usize,
    increment_script: Script,
    decay_script: Script,
}

impl RedisInteractionStore {
    pub fn new(store: RedisStore, config: InteractionConfig, graph: &GraphConfig) -> Self {
        Self {
            store,
            config,
            chunk_size: graph.chunk_size.max(1),
            concurrency: graph.pipeline_concurrency.max(1),
            increment_script: Script::new(INCREMENT_SCRIPT),
            decay_script: Script::new(DECAY_SCRIPT),
        }
    }

    async fn decay_collection(&self, key: String) -> Result<usize> {
        let mut conn = self.store.conn();
        let entries: i64 = self
            .decay_script
            .key(&key)
            .arg(self.config.decay_rate)
            .arg(self.config.min_score)
            .invoke_async(&mut conn)
            .await?;
        Ok(entries.max(0) as usize)
    }
}

#[async_trait]
impl InteractionScoreStore for RedisInteractionStore {
    async fn add_interaction_score(&self, a: MemberId, b: MemberId, dedup_key: &str) -> Result<bool> {
        reject_self_interaction(a, b)?;
        let keys = self.store.keys();
        let mut conn = self.store.conn();

        let applied: i64 = self
            .increment_script
            .key(keys.interaction_dedup(a, b))
            .key(keys.interactions(a))
            .key(keys.interactions(b))
            .arg(dedup_digest(dedup_key))
            .arg(self.config.increment)
            .arg(b.0)
            .arg(a.0)
            .arg(self.config.dedup_ttl_secs)
            .invoke_async(&mut conn)
            .await?;

        debug!(a = %a, b = %b, applied = applied == 1, "Interaction recorded");
        Ok(applied == 1)
    }

    async fn get_scores_batch(&self, member: MemberId, targets: &[MemberId]) -> Result<Vec<Option<f64>>> {
        if targets.is_empty() {
            return Ok(Vec::new());
        }
        let key = self.store.keys().interactions(member);
        let target_chunks: Vec<Vec<MemberId>> = targets
            .chunks(self.chunk_size)
            .map(<[_]>::to_vec)
            .collect();

        let chunks: Vec<Vec<Option<f64>>> = stream::iter(target_chunks)
            .map(|chunk| {
                let mut conn = self.store.conn();
                let key = key.clone();
                async move {
                    let mut pipe = redis::pipe();
                    for target in &chunk {
                        pipe.zscore(&key, target.0);
                    }
                    pipe.query_async::<Vec<Option<f64>>>(&mut conn).await
                }
            })
            .buffered(self.concurrency)
            .try_collect()
            .await?;

        Ok(chunks.into_iter().flatten().collect())
    }

    async fn get_top_scores(&self, member: MemberId, limit: usize) -> Result<Vec<(MemberId, f64)>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let key = self.store.keys().interactions(member);
        let mut conn = self.store.conn();

        let raw: Vec<(String, f64)> = conn
            .zrevrange_withscores(&key, 0, top_range_end(limit))
            .await?;

        Ok(raw
            .into_iter()
            .filter_map(|(value, score)| match value.parse::<MemberId>() {
                Ok(id) => Some((id, score)),
                Err(_) => {
                    warn!(key = %key, value = %value, "Skipping malformed score member");
                    None
                }
            })
            .collect())
    }

    async fn apply_decay(&self) -> Result<usize> {
        let keys = self
            .store
            .scan_keys(&self.store.keys().interactions_pattern(), SCAN_PAGE)
            .await?;
        let total = keys.len();

        let outcomes: Vec<(String, Result<usize>)> = stream::iter(keys)
            .map(|key| async move {
                let outcome = self.decay_collection(key.clone()).await;
                (key, outcome)
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let mut processed = 0;
        for (key, outcome) in outcomes {
            match outcome {
                Ok(_) => processed += 1,
                Err(e) => warn!(key = %key, error = %e, "Decay failed for collection"),
            }
        }

        if processed < total {
            warn!(processed, total, "Decay cycle finished with failed collections");
        }
        Ok(processed)
    }

    async fn delete_on_withdraw(&self, member: MemberId) -> Result<()> {
        let keys = self.store.keys();
        let own_key = keys.interactions(member);
        let mut conn = self.store.conn();

        let raw: Vec<String> = conn.zrange(&own_key, 0, -1).await?;
        let counterparts = parse_members(raw, &own_key);

        for chunk in counterparts.chunks(self.chunk_size) {
            let mut pipe = redis::pipe();
            pipe.atomic();
            for &other in chunk {
                pipe.zrem(keys.interactions(other), member.0).ignore();
                pipe.del(keys.interaction_dedup(member, other)).ignore();
            }
            pipe.query_async::<()>(&mut conn).await?;
        }
        let _: i64 = conn.del(&own_key).await?;

        info!(member = %member, counterparts = counterparts.len(), "Interaction scores cleared for withdrawn member");
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
struct ScoreEntry {
    score: f64,
    touched: u64,
}

#[derive(Default)]
struct ScoreBook {
    collections: HashMap<MemberId, HashMap<MemberId, ScoreEntry>>,
    recorded: HashSet<(MemberId, MemberId, String)>,
    clock: u64,
}

impl ScoreBook {
    fn bump(&mut self, from: MemberId, to: MemberId, increment: f64) {
        self.clock += 1;
        let touched = self.clock;
        let entry = self
            .collections
            .entry(from)
            .or_default()
            .entry(to)
            .or_insert(ScoreEntry { score: 0.0, touched });
        entry.score += increment;
        entry.touched = touched;
    }
}

/// In-memory interaction scores
pub struct MemoryInteractionStore {
    book: RwLock<ScoreBook>,
    config: InteractionConfig,
}

impl MemoryInteractionStore {
    pub fn new(config: InteractionConfig) -> Self {
        Self {
            book: RwLock::new(ScoreBook::default()),
            config,
        }
    }
}

#[async_trait]
impl InteractionScoreStore for MemoryInteractionStore {
    async fn add_interaction_score(&self, a: MemberId, b: MemberId, dedup_key: &str) -> Result<bool> {
        reject_self_interaction(a, b)?;
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        let mut book = self.book.write().await;

        if !book.recorded.insert((lo, hi, dedup_digest(dedup_key))) {
            return Ok(false);
        }
        book.bump(a, b, self.config.increment);
        book.bump(b, a, self.config.increment);
        Ok(true)
    }

    async fn get_scores_batch(&self, member: MemberId, targets: &[MemberId]) -> Result<Vec<Option<f64>>> {
        let book = self.book.read().await;
        let collection = book.collections.get(&member);
        Ok(targets
            .iter()
            .map(|target| collection.and_then(|c| c.get(target)).map(|e| e.score))
            .collect())
    }

    async fn get_top_scores(&self, member: MemberId, limit: usize) -> Result<Vec<(MemberId, f64)>> {
        let book = self.book.read().await;
        let Some(collection) = book.collections.get(&member) else {
            return Ok(Vec::new());
        };

        let mut entries: Vec<(MemberId, ScoreEntry)> =
            collection.iter().map(|(&id, &entry)| (id, entry)).collect();
        entries.sort_by(|(_, x), (_, y)| {
            y.score
                .partial_cmp(&x.score)
                .unwrap_or(Ordering::Equal)
                .then(y.touched.cmp(&x.touched))
        });

        Ok(entries
            .into_iter()
            .take(limit)
            .map(|(id, entry)| (id, entry.score))
            .collect())
    }

    async fn apply_decay(&self) -> Result<usize> {
        let mut book = self.book.write().await;
        let rate = self.config.decay_rate;
        let floor = self.config.min_score;

        let processed = book.collections.len();
        for collection in book.collections.values_mut() {
            collection.retain(|_, entry| {
                entry.score *= rate;
                entry.score >= floor
            });
        }
        book.collections.retain(|_, collection| !collection.is_empty());

        Ok(processed)
    }

    async fn delete_on_withdraw(&self, member: MemberId) -> Result<()> {
        let mut book = self.book.write().await;
        if let Some(collection) = book.collections.remove(&member) {
            for other in collection.keys() {
                if let Some(theirs) = book.collections.get_mut(other) {
                    theirs.remove(&member);
                }
            }
        }
        book.recorded.retain(|(lo, hi, _)| *lo != member && *hi != member);
        Ok(())
    }
}
