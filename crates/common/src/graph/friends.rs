//! Friendship graph: one Redis set of friend ids per member

use super::{FriendshipGraphStore, MemberId};
use crate::config::GraphConfig;
use crate::errors::{AppError, Result};
use crate::kv::{parse_members, RedisStore};
use async_trait::async_trait;
use futures::{stream, StreamExt, TryStreamExt};
use rand::seq::IteratorRandom;
use redis::{AsyncCommands, Script};
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;
use tracing::{debug, info};

/// KEYS: the withdrawn member's friend set
/// ARGV: friend set key prefix, withdrawn member id
const WITHDRAW_SCRIPT: &str = r#"
local friends = redis.call('SMEMBERS', KEYS[1])
for _, friend in ipairs(friends) do
    redis.call('SREM', ARGV[1] .. friend, ARGV[2])
end
redis.call('DEL', KEYS[1])
return #friends
"#;

fn reject_self_edge(a: MemberId, b: MemberId) -> Result<()> {
    if a == b {
        return Err(AppError::Validation {
            message: format!("member {} cannot befriend themselves", a),
            field: None,
        });
    }
    Ok(())
}

/// Redis-backed friend sets
pub struct RedisFriendStore {
    store: RedisStore,
    chunk_size: usize,
    concurrency: usize,
    withdraw_script: Script,
}

impl RedisFriendStore {
    pub fn new(store: RedisStore, config: &GraphConfig) -> Self {
        Self {
            store,
            chunk_size: config.chunk_size.max(1),
            concurrency: config.pipeline_concurrency.max(1),
            withdraw_script: Script::new(WITHDRAW_SCRIPT),
        }
    }
}

#[async_trait]
impl FriendshipGraphStore for RedisFriendStore {
    async fn add_friend(&self, a: MemberId, b: MemberId) -> Result<()> {
        reject_self_edge(a, b)?;
        let keys = self.store.keys();
        let mut conn = self.store.conn();

        redis::pipe()
            .atomic()
            .sadd(keys.friends(a), b.0)
            .ignore()
            .sadd(keys.friends(b), a.0)
            .ignore()
            .query_async::<()>(&mut conn)
            .await?;

        debug!(a = %a, b = %b, "Friendship recorded");
        Ok(())
    }

    async fn remove_friend(&self, a: MemberId, b: MemberId) -> Result<()> {
        let keys = self.store.keys();
        let mut conn = self.store.conn();

        redis::pipe()
            .atomic()
            .srem(keys.friends(a), b.0)
            .ignore()
            .srem(keys.friends(b), a.0)
            .ignore()
            .query_async::<()>(&mut conn)
            .await?;

        debug!(a = %a, b = %b, "Friendship removed");
        Ok(())
    }

    async fn sample_friends(&self, member: MemberId, max_count: usize) -> Result<Vec<MemberId>> {
        if max_count == 0 {
            return Ok(Vec::new());
        }
        let key = self.store.keys().friends(member);
        let mut conn = self.store.conn();

        // Positive count: distinct members, at most the set size
        let raw: Vec<String> = conn.srandmember_multiple(&key, max_count).await?;
        Ok(parse_members(raw, &key))
    }

    async fn batch_sample_friends(
        &self,
        members: &[MemberId],
        max_count: usize,
    ) -> Result<Vec<Vec<MemberId>>> {
        if max_count == 0 || members.is_empty() {
            return Ok(vec![Vec::new(); members.len()]);
        }
        let keys = self.store.keys();
        let key_chunks: Vec<Vec<String>> = members
            .chunks(self.chunk_size)
            .map(|chunk| chunk.iter().map(|&m| keys.friends(m)).collect())
            .collect();
        let round_trips = key_chunks.len();

        // `buffered` keeps chunk order, so output order matches input order
        let chunk_results: Vec<(Vec<String>, Vec<Vec<String>>)> = stream::iter(key_chunks)
            .map(|chunk_keys| {
                let mut conn = self.store.conn();
                async move {
                    let mut pipe = redis::pipe();
                    for key in &chunk_keys {
                        pipe.cmd("SRANDMEMBER").arg(key).arg(max_count);
                    }
                    let raw: Vec<Vec<String>> = pipe.query_async(&mut conn).await?;
                    Ok::<_, redis::RedisError>((chunk_keys, raw))
                }
            })
            .buffered(self.concurrency)
            .try_collect()
            .await?;

        let mut samples = Vec::with_capacity(members.len());
        for (chunk_keys, raw) in chunk_results {
            for (key, values) in chunk_keys.iter().zip(raw) {
                samples.push(parse_members(values, key));
            }
        }

        debug!(members = members.len(), round_trips, "Batch friend sample");
        Ok(samples)
    }

    async fn friends_among(&self, member: MemberId, candidates: &[MemberId]) -> Result<HashSet<MemberId>> {
        if candidates.is_empty() {
            return Ok(HashSet::new());
        }
        let key = self.store.keys().friends(member);
        let chunks: Vec<Vec<MemberId>> = candidates
            .chunks(self.chunk_size)
            .map(<[_]>::to_vec)
            .collect();

        let flags: Vec<Vec<bool>> = stream::iter(chunks)
            .map(|chunk| {
                let mut conn = self.store.conn();
                let key = key.clone();
                async move {
                    let mut pipe = redis::pipe();
                    for candidate in &chunk {
                        pipe.sismember(&key, candidate.0);
                    }
                    pipe.query_async::<Vec<bool>>(&mut conn).await
                }
            })
            .buffered(self.concurrency)
            .try_collect()
            .await?;

        Ok(candidates
            .iter()
            .zip(flags.into_iter().flatten())
            .filter_map(|(&candidate, is_friend)| is_friend.then_some(candidate))
            .collect())
    }

    /// One script run, so a concurrent `add_friend` lands either before the
    /// sweep (and is swept) or after it (and stays symmetric)
    async fn delete_on_withdraw(&self, member: MemberId) -> Result<()> {
        let keys = self.store.keys();
        let mut conn = self.store.conn();

        let stripped: i64 = self
            .withdraw_script
            .key(keys.friends(member))
            .arg(keys.friends_prefix())
            .arg(member.0)
            .invoke_async(&mut conn)
            .await?;

        info!(member = %member, stripped, "Friend sets cleared for withdrawn member");
        Ok(())
    }
}

/// In-memory friend sets
#[derive(Default)]
pub struct MemoryFriendStore {
    sets: RwLock<HashMap<MemberId, HashSet<MemberId>>>,
}

impl MemoryFriendStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every friend of `member`, ascending
    pub async fn friends_of(&self, member: MemberId) -> Vec<MemberId> {
        let sets = self.sets.read().await;
        let mut friends: Vec<MemberId> = sets
            .get(&member)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default();
        friends.sort();
        friends
    }
}

/// Small sets come back whole and sorted so traversal order is stable;
/// larger ones are sampled.
fn sample_set(set: Option<&HashSet<MemberId>>, max_count: usize) -> Vec<MemberId> {
    let Some(set) = set else {
        return Vec::new();
    };
    let mut picked: Vec<MemberId> = if set.len() <= max_count {
        set.iter().copied().collect()
    } else {
        set.iter()
            .copied()
            .choose_multiple(&mut rand::thread_rng(), max_count)
    };
    picked.sort();
    picked
}

#[async_trait]
impl FriendshipGraphStore for MemoryFriendStore {
    async fn add_friend(&self, a: MemberId, b: MemberId) -> Result<()> {
        reject_self_edge(a, b)?;
        let mut sets = self.sets.write().await;
        sets.entry(a).or_default().insert(b);
        sets.entry(b).or_default().insert(a);
        Ok(())
    }

    async fn remove_friend(&self, a: MemberId, b: MemberId) -> Result<()> {
        let mut sets = self.sets.write().await;
        if let Some(set) = sets.get_mut(&a) {
            set.remove(&b);
        }
        if let Some(set) = sets.get_mut(&b) {
            set.remove(&a);
        }
        Ok(())
    }

    async fn sample_friends(&self, member: MemberId, max_count: usize) -> Result<Vec<MemberId>> {
        let sets = self.sets.read().await;
        Ok(sample_set(sets.get(&member), max_count))
    }

    async fn batch_sample_friends(
        &self,
        members: &[MemberId],
        max_count: usize,
    ) -> Result<Vec<Vec<MemberId>>> {
        let sets = self.sets.read().await;
        Ok(members
            .iter()
            .map(|member| sample_set(sets.get(member), max_count))
            .collect())
    }

    async fn friends_among(&self, member: MemberId, candidates: &[MemberId]) -> Result<HashSet<MemberId>> {
        let sets = self.sets.read().await;
        let Some(set) = sets.get(&member) else {
            return Ok(HashSet::new());
        };
        Ok(candidates.iter().copied().filter(|c| set.contains(c)).collect())
    }

    async fn delete_on_withdraw(&self, member: MemberId) -> Result<()> {
        let mut sets = self.sets.write().await;
        if let Some(friends) = sets.remove(&member) {
            for friend in friends {
                if let Some(set) = sets.get_mut(&friend) {
                    set.remove(&member);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::scratch;

    fn m(id: i64) -> MemberId {
        MemberId(id)
    }

    #[tokio::test]
    async fn test_add_friend_is_symmetric() {
        let store = MemoryFriendStore::new();
        store.add_friend(m(1), m(2)).await.unwrap();

        assert_eq!(store.friends_of(m(1)).await, vec![m(2)]);
        assert_eq!(store.friends_of(m(2)).await, vec![m(1)]);
    }

    #[tokio::test]
    async fn test_add_friend_twice_is_absorbed() {
        let store = MemoryFriendStore::new();
        store.add_friend(m(1), m(2)).await.unwrap();
        store.add_friend(m(2), m(1)).await.unwrap();

        assert_eq!(store.friends_of(m(1)).await.len(), 1);
        assert_eq!(store.friends_of(m(2)).await.len(), 1);
    }

    #[tokio::test]
    async fn test_self_friendship_rejected() {
        let store = MemoryFriendStore::new();
        let err = store.add_friend(m(3), m(3)).await.unwrap_err();
        assert!(matches!(err, AppError::Validation { .. }));
    }

    #[tokio::test]
    async fn test_remove_friend_clears_both_sides() {
        let store = MemoryFriendStore::new();
        store.add_friend(m(1), m(2)).await.unwrap();
        store.add_friend(m(1), m(3)).await.unwrap();
        store.remove_friend(m(2), m(1)).await.unwrap();

        assert_eq!(store.friends_of(m(1)).await, vec![m(3)]);
        assert!(store.friends_of(m(2)).await.is_empty());
    }

    #[tokio::test]
    async fn test_sample_is_bounded_and_distinct() {
        let store = MemoryFriendStore::new();
        for id in 2..=40 {
            store.add_friend(m(1), m(id)).await.unwrap();
        }

        let sample = store.sample_friends(m(1), 10).await.unwrap();
        assert_eq!(sample.len(), 10);
        let distinct: HashSet<_> = sample.iter().collect();
        assert_eq!(distinct.len(), 10);
        assert!(sample.iter().all(|id| id.0 >= 2 && id.0 <= 40));
    }

    #[tokio::test]
    async fn test_batch_sample_preserves_input_order() {
        let store = MemoryFriendStore::new();
        store.add_friend(m(1), m(10)).await.unwrap();
        store.add_friend(m(2), m(20)).await.unwrap();

        let batch = store
            .batch_sample_friends(&[m(2), m(99), m(1)], 5)
            .await
            .unwrap();

        assert_eq!(batch, vec![vec![m(20)], vec![], vec![m(10)]]);
    }

    #[tokio::test]
    async fn test_friends_among_filters_non_friends() {
        let store = MemoryFriendStore::new();
        store.add_friend(m(1), m(2)).await.unwrap();
        store.add_friend(m(1), m(4)).await.unwrap();

        let found = store.friends_among(m(1), &[m(2), m(3), m(4)]).await.unwrap();
        assert_eq!(found, HashSet::from([m(2), m(4)]));
        assert!(store.friends_among(m(9), &[m(1)]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_withdraw_strips_every_reference() {
        let store = MemoryFriendStore::new();
        store.add_friend(m(1), m(2)).await.unwrap();
        store.add_friend(m(1), m(3)).await.unwrap();
        store.add_friend(m(2), m(3)).await.unwrap();

        store.delete_on_withdraw(m(1)).await.unwrap();

        assert!(store.friends_of(m(1)).await.is_empty());
        assert_eq!(store.friends_of(m(2)).await, vec![m(3)]);
        assert_eq!(store.friends_of(m(3)).await, vec![m(2)]);
    }

    fn redis_store(redis: &RedisStore) -> RedisFriendStore {
        RedisFriendStore::new(
            redis.clone(),
            &GraphConfig {
                chunk_size: 2,
                ..GraphConfig::default()
            },
        )
    }

    #[tokio::test]
    #[ignore = "needs a Redis server (REDIS_URL)"]
    async fn test_redis_batched_lookups_span_chunks() {
        let redis = scratch::store().await;
        let store = redis_store(&redis);
        for friend in [2, 4, 5] {
            store.add_friend(m(1), m(friend)).await.unwrap();
        }

        let found = store
            .friends_among(m(1), &[m(2), m(3), m(4), m(5), m(6)])
            .await
            .unwrap();
        assert_eq!(found, HashSet::from([m(2), m(4), m(5)]));

        let samples = store.batch_sample_friends(&[m(1), m(2), m(3)], 10).await.unwrap();
        assert_eq!(samples[0].len(), 3);
        assert_eq!(samples[1], vec![m(1)]);
        assert!(samples[2].is_empty());

        scratch::clear(&redis).await;
    }

    #[tokio::test]
    #[ignore = "needs a Redis server (REDIS_URL)"]
    async fn test_redis_withdraw_strips_every_reference() {
        let redis = scratch::store().await;
        let store = redis_store(&redis);
        for (a, b) in [(1, 2), (1, 3), (2, 3)] {
            store.add_friend(m(a), m(b)).await.unwrap();
        }

        store.delete_on_withdraw(m(1)).await.unwrap();

        assert!(store.sample_friends(m(1), 10).await.unwrap().is_empty());
        assert_eq!(store.sample_friends(m(2), 10).await.unwrap(), vec![m(3)]);
        assert_eq!(store.sample_friends(m(3), 10).await.unwrap(), vec![m(2)]);

        // A friendship recorded after the sweep stays two-sided
        store.add_friend(m(1), m(2)).await.unwrap();
        let found = store.friends_among(m(2), &[m(1), m(3)]).await.unwrap();
        assert_eq!(found, HashSet::from([m(1), m(3)]));
        assert_eq!(store.sample_friends(m(1), 10).await.unwrap(), vec![m(2)]);

        scratch::clear(&redis).await;
    }
}
