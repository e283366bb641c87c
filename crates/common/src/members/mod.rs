//! Member collaborators owned by the relational side of the platform
//!
//! - `BlacklistGate`: which candidates has a requester blocked
//! - `RecentMemberSource`: newest members, used as recommendation filler,
//!   and the existence check for requesters

mod postgres;

pub use postgres::{PgBlacklistGate, PgMemberSource};

use crate::errors::Result;
use crate::graph::MemberId;
use async_trait::async_trait;
use std::collections::{HashSet, VecDeque};
use tokio::sync::RwLock;

/// Block list lookup
#[async_trait]
pub trait BlacklistGate: Send + Sync {
    /// The subset of `candidates` that `requester` has blocked
    async fn blocked_among(&self, requester: MemberId, candidates: &[MemberId]) -> Result<HashSet<MemberId>>;
}

/// Member directory
#[async_trait]
pub trait RecentMemberSource: Send + Sync {
    /// Up to `count` most recently joined members not in `exclude`, newest first
    async fn fetch_recent(&self, exclude: &HashSet<MemberId>, count: usize) -> Result<Vec<MemberId>>;

    /// Whether `member` is an active member
    async fn member_exists(&self, member: MemberId) -> Result<bool>;
}

/// In-memory block list
#[derive(Default)]
pub struct MemoryBlacklist {
    blocks: RwLock<HashSet<(MemberId, MemberId)>>,
}

impl MemoryBlacklist {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn block(&self, requester: MemberId, blocked: MemberId) {
        self.blocks.write().await.insert((requester, blocked));
    }
}

#[async_trait]
impl BlacklistGate for MemoryBlacklist {
    async fn blocked_among(&self, requester: MemberId, candidates: &[MemberId]) -> Result<HashSet<MemberId>> {
        let blocks = self.blocks.read().await;
        Ok(candidates
            .iter()
            .copied()
            .filter(|candidate| blocks.contains(&(requester, *candidate)))
            .collect())
    }
}

/// In-memory member directory, newest member first
#[derive(Default)]
pub struct MemoryMemberSource {
    members: RwLock<VecDeque<MemberId>>,
}

impl MemoryMemberSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register members in join order (last one is the newest)
    pub async fn join(&self, members: impl IntoIterator<Item = MemberId>) {
        let mut directory = self.members.write().await;
        for member in members {
            directory.push_front(member);
        }
    }
}

#[async_trait]
impl RecentMemberSource for MemoryMemberSource {
    async fn fetch_recent(&self, exclude: &HashSet<MemberId>, count: usize) -> Result<Vec<MemberId>> {
        let directory = self.members.read().await;
        Ok(directory
            .iter()
            .copied()
            .filter(|member| !exclude.contains(member))
            .take(count)
            .collect())
    }

    async fn member_exists(&self, member: MemberId) -> Result<bool> {
        Ok(self.members.read().await.contains(&member))
    }
}
