//! Social graph stores
//!
//! Two per-member collections live in Redis:
//! - `friends:{id}`: the set of direct friends, stored symmetrically
//! - `interactions:{id}`: interaction scores towards other members
//!
//! Both are exposed through traits so the recommendation engine and the
//! event consumer receive an injected handle instead of a global client.
//! In-memory implementations back the tests.

mod decay;
mod events;
mod friends;
mod interactions;

pub use decay::{DecayReport, DecayScheduler};
pub use events::{EventOutcome, GraphEvent, GraphEventHandler, InteractionKind};
pub use friends::{MemoryFriendStore, RedisFriendStore};
pub use interactions::{dedup_digest, MemoryInteractionStore, RedisInteractionStore};

use crate::errors::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::num::ParseIntError;
use std::str::FromStr;

/// Member identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MemberId(pub i64);

impl fmt::Display for MemberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for MemberId {
    type Err = ParseIntError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        s.parse().map(MemberId)
    }
}

impl From<i64> for MemberId {
    fn from(id: i64) -> Self {
        MemberId(id)
    }
}

/// Per-member friend sets
#[async_trait]
pub trait FriendshipGraphStore: Send + Sync {
    /// Record a friendship in both directions. Re-adding is a no-op.
    async fn add_friend(&self, a: MemberId, b: MemberId) -> Result<()>;

    /// Remove a friendship in both directions.
    async fn remove_friend(&self, a: MemberId, b: MemberId) -> Result<()>;

    /// Up to `max_count` distinct friends of `member`, in no particular order.
    ///
    /// This is a sample: when the set is larger than `max_count` the caller
    /// sees an arbitrary subset.
    async fn sample_friends(&self, member: MemberId, max_count: usize) -> Result<Vec<MemberId>>;

    /// `sample_friends` for many members at once, batched per round-trip.
    /// The result has one entry per input member, in input order.
    async fn batch_sample_friends(
        &self,
        members: &[MemberId],
        max_count: usize,
    ) -> Result<Vec<Vec<MemberId>>>;

    /// The subset of `candidates` that are friends of `member`. Used to
    /// exclude friends left out of a truncated sample.
    async fn friends_among(&self, member: MemberId, candidates: &[MemberId]) -> Result<HashSet<MemberId>>;

    /// Remove `member`'s set and every reference to `member` from the sets
    /// of its friends. Withdrawal path only.
    async fn delete_on_withdraw(&self, member: MemberId) -> Result<()>;
}

/// Per-member interaction scores
#[async_trait]
pub trait InteractionScoreStore: Send + Sync {
    /// Add one increment to both `a -> b` and `b -> a` unless `dedup_key`
    /// was already recorded for this pair. Returns whether a mutation happened.
    async fn add_interaction_score(&self, a: MemberId, b: MemberId, dedup_key: &str) -> Result<bool>;

    /// Scores of `targets` from `member`'s point of view, in input order.
    async fn get_scores_batch(&self, member: MemberId, targets: &[MemberId]) -> Result<Vec<Option<f64>>>;

    /// The `limit` highest scores of `member`, descending.
    async fn get_top_scores(&self, member: MemberId, limit: usize) -> Result<Vec<(MemberId, f64)>>;

    /// Decay every collection once. Returns the number of collections processed.
    async fn apply_decay(&self) -> Result<usize>;

    /// Drop `member`'s collection and `member`'s entry in every counterpart's collection.
    async fn delete_on_withdraw(&self, member: MemberId) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_member_id_round_trips_through_text() {
        let id: MemberId = "42".parse().unwrap();
        assert_eq!(id, MemberId(42));
        assert_eq!(id.to_string(), "42");
        assert!("4x".parse::<MemberId>().is_err());
    }

    #[test]
    fn test_member_id_serializes_as_plain_number() {
        let json = serde_json::to_string(&MemberId(5)).unwrap();
        assert_eq!(json, "5");
    }
}
