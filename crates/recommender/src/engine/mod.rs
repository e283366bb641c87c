//! Friend recommendation engine
//!
//! A query walks the friendship graph outward from the requester:
//! 1. Sample degree-1 friends (never recommended)
//! 2. Expand to degree 2, and to degree 3 while the pool is thin
//! 3. Score candidates by interaction from the requester's side
//! 4. Drop blocked members, rank, paginate
//! 5. Top up a short page with recently joined members (depth 0)
//!
//! Graph and score store failures narrow the result instead of failing the
//! query. A block list failure fails the query.

mod expansion;
mod ranking;

pub use expansion::{FIRST_CANDIDATE_DEPTH, MAX_DEPTH};

use friendlink_common::config::RecommendationConfig;
use friendlink_common::errors::{AppError, Result};
use friendlink_common::graph::{FriendshipGraphStore, InteractionScoreStore, MemberId};
use friendlink_common::members::{BlacklistGate, RecentMemberSource};
use friendlink_common::metrics;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Depth tag of recently joined filler entries
pub const FALLBACK_DEPTH: u8 = 0;

/// One recommended member
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Candidate {
    pub member_id: MemberId,
    /// 2 or 3 for graph candidates, 0 for filler
    pub depth: u8,
    /// Degree-1 friend through which a depth-2 candidate was reached
    #[serde(skip_serializing_if = "Option::is_none")]
    pub acquaintance_id: Option<MemberId>,
    pub interaction_score: f64,
}

impl Candidate {
    fn from_graph(member_id: MemberId, depth: u8, acquaintance_id: Option<MemberId>) -> Self {
        Self {
            member_id,
            depth,
            acquaintance_id,
            interaction_score: 0.0,
        }
    }

    fn fallback(member_id: MemberId) -> Self {
        Self::from_graph(member_id, FALLBACK_DEPTH, None)
    }

    pub fn is_fallback(&self) -> bool {
        self.depth == FALLBACK_DEPTH
    }
}

/// One page of recommendations.
///
/// `total_count` is the ranked graph pool after block filtering; filler
/// entries are not counted. `has_next` is true when a later page holds
/// ranked or filler entries.
#[derive(Debug, Clone, Serialize)]
pub struct RecommendationPage {
    pub items: Vec<Candidate>,
    pub page: usize,
    pub page_size: usize,
    pub total_count: usize,
    pub has_next: bool,
}

/// Per-stage size limits
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub default_page_size: usize,
    pub max_page_size: usize,
    pub friend_sample_size: usize,
    pub neighbor_sample_size: usize,
    pub min_pool_size: usize,
    pub max_degree3_sources: usize,
    pub max_candidates: usize,
    pub max_fallback: usize,
}

impl From<&RecommendationConfig> for EngineSettings {
    fn from(config: &RecommendationConfig) -> Self {
        Self {
            default_page_size: config.default_page_size,
            max_page_size: config.max_page_size,
            friend_sample_size: config.friend_sample_size,
            neighbor_sample_size: config.neighbor_sample_size,
            min_pool_size: config.min_pool_size,
            max_degree3_sources: config.max_degree3_sources,
            max_candidates: config.max_candidates,
            max_fallback: config.max_fallback,
        }
    }
}

/// Stateless per query; every collaborator is shared and injected
pub struct RecommendationEngine {
    friends: Arc<dyn FriendshipGraphStore>,
    interactions: Arc<dyn InteractionScoreStore>,
    blacklist: Arc<dyn BlacklistGate>,
    members: Arc<dyn RecentMemberSource>,
    settings: EngineSettings,
}

impl RecommendationEngine {
    pub fn new(
        friends: Arc<dyn FriendshipGraphStore>,
        interactions: Arc<dyn InteractionScoreStore>,
        blacklist: Arc<dyn BlacklistGate>,
        members: Arc<dyn RecentMemberSource>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            friends,
            interactions,
            blacklist,
            members,
            settings,
        }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Recommendations for `requester`, 0-based `page` of `page_size` entries
    pub async fn recommend(
        &self,
        requester: MemberId,
        page: usize,
        page_size: usize,
    ) -> Result<RecommendationPage> {
        let start = Instant::now();
        self.check_page(page, page_size)?;
        self.check_requester(requester).await?;

        let degree1 = match self
            .friends
            .sample_friends(requester, self.settings.friend_sample_size)
            .await
        {
            Ok(friends) => friends,
            Err(e) => {
                warn!(requester = %requester, error = %e, "Friend lookup failed, serving filler only");
                metrics::record_degradation("degree1");
                Vec::new()
            }
        };
        // A full sample may have left friends out; those need an explicit check
        let sample_truncated = !degree1.is_empty() && degree1.len() >= self.settings.friend_sample_size;

        let mut visited: HashSet<MemberId> = degree1.iter().copied().collect();
        visited.insert(requester);

        // One past the page end, so `has_next` sees what a deeper hop adds
        let page_end = page.saturating_add(1).saturating_mul(page_size);
        let fill_target = page_end.saturating_add(1).max(self.settings.min_pool_size);
        let mut pool = expansion::expand(
            self.friends.as_ref(),
            &degree1,
            &mut visited,
            fill_target,
            &self.settings,
        )
        .await;

        if sample_truncated {
            let ids: Vec<MemberId> = pool.iter().map(|c| c.member_id).collect();
            let unsampled = self.friends_among(requester, &ids).await;
            pool.retain(|c| !unsampled.contains(&c.member_id));
        }

        self.attach_scores(requester, &mut pool).await;

        let ids: Vec<MemberId> = pool.iter().map(|c| c.member_id).collect();
        let blocked = self.blocked_among(requester, &ids).await?;
        pool.retain(|c| !blocked.contains(&c.member_id));

        ranking::rank(&mut pool);
        let total_count = pool.len();
        let mut items = ranking::page_slice(&pool, page, page_size).to_vec();

        let mut has_next = page_end < total_count;
        if !has_next {
            let (filler, more) = self
                .fill_from_recent(requester, &visited, page, page_size, total_count, sample_truncated)
                .await?;
            items.extend(filler);
            has_next = more;
        }

        let served = served_by_depth(&items);
        metrics::record_recommendation(start.elapsed().as_secs_f64(), total_count, served);
        info!(
            requester = %requester,
            page,
            page_size,
            total_count,
            returned = items.len(),
            filler = items.iter().filter(|c| c.is_fallback()).count(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Recommendations served"
        );

        Ok(RecommendationPage {
            items,
            page,
            page_size,
            total_count,
            has_next,
        })
    }

    fn check_page(&self, page: usize, page_size: usize) -> Result<()> {
        if page_size == 0 || page_size > self.settings.max_page_size {
            return Err(AppError::Validation {
                message: format!("page size must be between 1 and {}", self.settings.max_page_size),
                field: Some("size".to_string()),
            });
        }
        if page.checked_mul(page_size).is_none() {
            return Err(AppError::Validation {
                message: "page is out of range".to_string(),
                field: Some("page".to_string()),
            });
        }
        Ok(())
    }

    async fn check_requester(&self, requester: MemberId) -> Result<()> {
        match self.members.member_exists(requester).await {
            Ok(true) => Ok(()),
            Ok(false) => Err(AppError::InvalidRequester {
                member_id: requester.0,
            }),
            Err(e) => {
                // The graph is still usable, so an unverified requester is served
                warn!(requester = %requester, error = %e, "Requester lookup failed, proceeding");
                metrics::record_degradation("requester");
                Ok(())
            }
        }
    }

    async fn friends_among(&self, requester: MemberId, ids: &[MemberId]) -> HashSet<MemberId> {
        match self.friends.friends_among(requester, ids).await {
            Ok(friends) => friends,
            Err(e) => {
                warn!(requester = %requester, error = %e, "Friend membership check failed");
                metrics::record_degradation("friend_check");
                HashSet::new()
            }
        }
    }

    /// Unscored candidates keep 0
    async fn attach_scores(&self, requester: MemberId, pool: &mut [Candidate]) {
        if pool.is_empty() {
            return;
        }
        let ids: Vec<MemberId> = pool.iter().map(|c| c.member_id).collect();

        match self.interactions.get_scores_batch(requester, &ids).await {
            Ok(scores) => {
                for (candidate, score) in pool.iter_mut().zip(scores) {
                    candidate.interaction_score = score.unwrap_or(0.0);
                }
            }
            Err(e) => {
                warn!(requester = %requester, candidates = ids.len(), error = %e, "Score lookup failed, ranking by depth only");
                metrics::record_degradation("scores");
            }
        }
    }

    async fn blocked_among(&self, requester: MemberId, ids: &[MemberId]) -> Result<HashSet<MemberId>> {
        if ids.is_empty() {
            return Ok(HashSet::new());
        }
        self.blacklist
            .blocked_among(requester, ids)
            .await
            .map_err(|e| AppError::BlacklistCheckFailed {
                message: e.to_string(),
            })
    }

    /// Filler for the slots the ranked pool left empty, and whether a later
    /// page has more.
    ///
    /// Filler continues where earlier pages stopped: page `p` skips the
    /// filler entries pages `0..p` already showed. At most `max_fallback`
    /// filler entries exist across all pages.
    async fn fill_from_recent(
        &self,
        requester: MemberId,
        exclude: &HashSet<MemberId>,
        page: usize,
        page_size: usize,
        ranked_total: usize,
        sample_truncated: bool,
    ) -> Result<(Vec<Candidate>, bool)> {
        let page_start = page.saturating_mul(page_size);
        let ranked_on_page = ranked_total.saturating_sub(page_start).min(page_size);
        let needed = page_size - ranked_on_page;
        let offset = page_start.saturating_sub(ranked_total);
        if offset >= self.settings.max_fallback {
            return Ok((Vec::new(), false));
        }
        let window_end = offset.saturating_add(needed).min(self.settings.max_fallback);

        // Extra rows so blocked members do not leave the page short, plus
        // one past the window to see whether filler continues
        let fetch = window_end.saturating_add(needed).saturating_add(1);
        let mut recent = match self.members.fetch_recent(exclude, fetch).await {
            Ok(recent) => recent,
            Err(e) => {
                warn!(requester = %requester, error = %e, "Recent member lookup failed, page left short");
                metrics::record_degradation("fallback");
                return Ok((Vec::new(), false));
            }
        };

        let mut seen = HashSet::new();
        recent.retain(|m| !exclude.contains(m) && seen.insert(*m));
        if sample_truncated {
            let friends = self.friends_among(requester, &recent).await;
            recent.retain(|m| !friends.contains(m));
        }

        let blocked = self.blocked_among(requester, &recent).await?;
        let mut remaining = recent.into_iter().filter(|m| !blocked.contains(m)).skip(offset);
        let filler: Vec<Candidate> = remaining
            .by_ref()
            .take(window_end - offset)
            .map(Candidate::fallback)
            .collect();
        let more = window_end < self.settings.max_fallback && remaining.next().is_some();

        debug!(requester = %requester, needed, offset, filled = filler.len(), more, "Page topped up");
        Ok((filler, more))
    }
}

fn served_by_depth(items: &[Candidate]) -> [(u8, usize); 3] {
    let count = |depth: u8| items.iter().filter(|c| c.depth == depth).count();
    [
        (FALLBACK_DEPTH, count(FALLBACK_DEPTH)),
        (FIRST_CANDIDATE_DEPTH, count(FIRST_CANDIDATE_DEPTH)),
        (MAX_DEPTH, count(MAX_DEPTH)),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use friendlink_common::config::InteractionConfig;
    use friendlink_common::graph::{MemoryFriendStore, MemoryInteractionStore};
    use friendlink_common::members::{MemoryBlacklist, MemoryMemberSource};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn m(id: i64) -> MemberId {
        MemberId(id)
    }

    fn ids(items: &[Candidate]) -> Vec<i64> {
        items.iter().map(|c| c.member_id.0).collect()
    }

    struct Fixture {
        friends: Arc<MemoryFriendStore>,
        interactions: Arc<MemoryInteractionStore>,
        blacklist: Arc<MemoryBlacklist>,
        members: Arc<MemoryMemberSource>,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                friends: Arc::new(MemoryFriendStore::new()),
                interactions: Arc::new(MemoryInteractionStore::new(InteractionConfig::default())),
                blacklist: Arc::new(MemoryBlacklist::new()),
                members: Arc::new(MemoryMemberSource::new()),
            }
        }

        /// M1 - {M2, M3}; M2 - M4; M3 - {M5, M7}; M4 - M6.
        /// Members 1..=20 joined in id order, so 20 is the newest.
        async fn scenario() -> Self {
            let fixture = Self::new();
            for (a, b) in [(1, 2), (1, 3), (2, 4), (3, 5), (3, 7), (4, 6)] {
                fixture.friends.add_friend(m(a), m(b)).await.unwrap();
            }
            fixture.members.join((1..=20).map(MemberId)).await;
            fixture
        }

        fn engine(&self) -> RecommendationEngine {
            self.engine_with(default_settings())
        }

        fn engine_with(&self, settings: EngineSettings) -> RecommendationEngine {
            RecommendationEngine::new(
                self.friends.clone(),
                self.interactions.clone(),
                self.blacklist.clone(),
                self.members.clone(),
                settings,
            )
        }
    }

    fn default_settings() -> EngineSettings {
        EngineSettings::from(&RecommendationConfig::default())
    }

    /// Friend store that can fail the requester lookup or any expansion hop
    /// from the `fail_batch_from`-th call on
    struct FlakyFriends {
        inner: MemoryFriendStore,
        fail_sample: bool,
        fail_batch_from: usize,
        batch_calls: AtomicUsize,
    }

    impl FlakyFriends {
        fn unavailable() -> AppError {
            AppError::store("redis", "connection refused")
        }
    }

    #[async_trait]
    impl FriendshipGraphStore for FlakyFriends {
        async fn add_friend(&self, a: MemberId, b: MemberId) -> Result<()> {
            self.inner.add_friend(a, b).await
        }

        async fn remove_friend(&self, a: MemberId, b: MemberId) -> Result<()> {
            self.inner.remove_friend(a, b).await
        }

        async fn sample_friends(&self, member: MemberId, max_count: usize) -> Result<Vec<MemberId>> {
            if self.fail_sample {
                return Err(Self::unavailable());
            }
            self.inner.sample_friends(member, max_count).await
        }

        async fn batch_sample_friends(&self, members: &[MemberId], max_count: usize) -> Result<Vec<Vec<MemberId>>> {
            let call = self.batch_calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call >= self.fail_batch_from {
                return Err(Self::unavailable());
            }
            self.inner.batch_sample_friends(members, max_count).await
        }

        async fn friends_among(&self, member: MemberId, candidates: &[MemberId]) -> Result<HashSet<MemberId>> {
            self.inner.friends_among(member, candidates).await
        }

        async fn delete_on_withdraw(&self, member: MemberId) -> Result<()> {
            self.inner.delete_on_withdraw(member).await
        }
    }

    async fn flaky_scenario(fail_sample: bool, fail_batch_from: usize) -> Arc<FlakyFriends> {
        let friends = FlakyFriends {
            inner: MemoryFriendStore::new(),
            fail_sample,
            fail_batch_from,
            batch_calls: AtomicUsize::new(0),
        };
        for (a, b) in [(1, 2), (1, 3), (2, 4), (3, 5), (3, 7), (4, 6)] {
            friends.add_friend(m(a), m(b)).await.unwrap();
        }
        Arc::new(friends)
    }

    struct DownScores;

    #[async_trait]
    impl InteractionScoreStore for DownScores {
        async fn add_interaction_score(&self, _: MemberId, _: MemberId, _: &str) -> Result<bool> {
            Err(AppError::store("redis", "timeout"))
        }

        async fn get_scores_batch(&self, _: MemberId, _: &[MemberId]) -> Result<Vec<Option<f64>>> {
            Err(AppError::store("redis", "timeout"))
        }

        async fn get_top_scores(&self, _: MemberId, _: usize) -> Result<Vec<(MemberId, f64)>> {
            Err(AppError::store("redis", "timeout"))
        }

        async fn apply_decay(&self) -> Result<usize> {
            Err(AppError::store("redis", "timeout"))
        }

        async fn delete_on_withdraw(&self, _: MemberId) -> Result<()> {
            Err(AppError::store("redis", "timeout"))
        }
    }

    struct DownBlacklist;

    #[async_trait]
    impl BlacklistGate for DownBlacklist {
        async fn blocked_among(&self, _: MemberId, _: &[MemberId]) -> Result<HashSet<MemberId>> {
            Err(AppError::DatabaseConnection {
                message: "pool exhausted".to_string(),
            })
        }
    }

    struct DownMembers;

    #[async_trait]
    impl RecentMemberSource for DownMembers {
        async fn fetch_recent(&self, _: &HashSet<MemberId>, _: usize) -> Result<Vec<MemberId>> {
            Err(AppError::DatabaseConnection {
                message: "pool exhausted".to_string(),
            })
        }

        async fn member_exists(&self, _: MemberId) -> Result<bool> {
            Err(AppError::DatabaseConnection {
                message: "pool exhausted".to_string(),
            })
        }
    }

    #[tokio::test]
    async fn test_scenario_degrees_and_acquaintances() {
        let fixture = Fixture::scenario().await;

        let page = tokio_test::assert_ok!(fixture.engine().recommend(m(1), 0, 10).await);

        let graph: Vec<&Candidate> = page.items.iter().filter(|c| !c.is_fallback()).collect();
        assert_eq!(
            graph,
            vec![
                &Candidate::from_graph(m(4), 2, Some(m(2))),
                &Candidate::from_graph(m(5), 2, Some(m(3))),
                &Candidate::from_graph(m(7), 2, Some(m(3))),
                &Candidate::from_graph(m(6), 3, None),
            ]
        );
        assert_eq!(page.total_count, 4);
        // Members 14..=8 are still unshown filler
        assert!(page.has_next);
    }

    #[tokio::test]
    async fn test_scores_order_within_depth_and_blocked_member_dropped() {
        let fixture = Fixture::scenario().await;
        for key in ["post_like:10:1", "comment:11:1"] {
            fixture.interactions.add_interaction_score(m(1), m(4), key).await.unwrap();
        }
        fixture.interactions.add_interaction_score(m(5), m(1), "post_like:12:5").await.unwrap();
        fixture.blacklist.block(m(1), m(7)).await;

        let page = fixture.engine().recommend(m(1), 0, 10).await.unwrap();

        assert_eq!(&ids(&page.items)[..3], &[4, 5, 6]);
        assert_eq!(page.items[0].interaction_score, 2.0);
        assert_eq!(page.items[1].interaction_score, 1.0);
        assert_eq!(page.items[2].interaction_score, 0.0);
        assert!(!ids(&page.items).contains(&7));
        assert_eq!(page.total_count, 3);
    }

    #[tokio::test]
    async fn test_requester_and_friends_never_recommended() {
        let fixture = Fixture::scenario().await;

        let page = fixture.engine().recommend(m(1), 0, 20).await.unwrap();

        let returned = ids(&page.items);
        for excluded in [1, 2, 3] {
            assert!(!returned.contains(&excluded), "{} was recommended", excluded);
        }
        let distinct: HashSet<i64> = returned.iter().copied().collect();
        assert_eq!(distinct.len(), returned.len());
    }

    #[tokio::test]
    async fn test_short_page_topped_up_with_newest_members() {
        let fixture = Fixture::scenario().await;

        let page = fixture.engine().recommend(m(1), 0, 10).await.unwrap();

        assert_eq!(page.items.len(), 10);
        let filler: Vec<&Candidate> = page.items.iter().filter(|c| c.is_fallback()).collect();
        assert_eq!(
            filler.iter().map(|c| c.member_id.0).collect::<Vec<_>>(),
            vec![20, 19, 18, 17, 16, 15]
        );
        assert!(filler.iter().all(|c| c.acquaintance_id.is_none()));
        assert!(page.items[..4].iter().all(|c| !c.is_fallback()));
    }

    #[tokio::test]
    async fn test_friendless_requester_gets_filler_only() {
        let fixture = Fixture::new();
        fixture.members.join((1..=12).map(MemberId)).await;

        let page = fixture.engine().recommend(m(3), 0, 5).await.unwrap();

        assert_eq!(ids(&page.items), vec![12, 11, 10, 9, 8]);
        assert!(page.items.iter().all(|c| c.depth == FALLBACK_DEPTH));
        assert_eq!(page.total_count, 0);
        assert!(page.has_next);

        let last = fixture.engine().recommend(m(3), 1, 5).await.unwrap();
        assert_eq!(ids(&last.items), vec![7, 6, 5, 4, 2]);
        assert!(last.has_next);

        let tail = fixture.engine().recommend(m(3), 2, 5).await.unwrap();
        assert_eq!(ids(&tail.items), vec![1]);
        assert!(!tail.has_next);
    }

    #[tokio::test]
    async fn test_pages_walk_ranked_pool_then_filler() {
        let fixture = Fixture::scenario().await;
        let engine = fixture.engine();

        let first = engine.recommend(m(1), 0, 3).await.unwrap();
        assert_eq!(ids(&first.items), vec![4, 5, 7]);
        assert!(first.has_next);

        let second = engine.recommend(m(1), 1, 3).await.unwrap();
        assert_eq!(ids(&second.items), vec![6, 20, 19]);
        assert!(second.has_next);

        let third = engine.recommend(m(1), 2, 3).await.unwrap();
        assert_eq!(ids(&third.items), vec![18, 17, 16]);
        assert!(third.has_next);
        assert_eq!(third.total_count, 4);

        // Filler runs out at member 8
        let last = engine.recommend(m(1), 5, 3).await.unwrap();
        assert_eq!(ids(&last.items), vec![9, 8]);
        assert!(!last.has_next);
    }

    #[tokio::test]
    async fn test_filler_capped_across_pages() {
        let fixture = Fixture::scenario().await;
        let engine = fixture.engine_with(EngineSettings {
            max_fallback: 4,
            ..default_settings()
        });

        let first = engine.recommend(m(1), 1, 3).await.unwrap();
        assert_eq!(ids(&first.items), vec![6, 20, 19]);
        assert!(first.has_next);

        let second = engine.recommend(m(1), 2, 3).await.unwrap();
        assert_eq!(ids(&second.items), vec![18, 17]);
        assert!(!second.has_next);

        let third = engine.recommend(m(1), 3, 3).await.unwrap();
        assert!(third.items.is_empty());
        assert!(!third.has_next);
    }

    #[tokio::test]
    async fn test_full_last_ranked_page_reports_remaining_filler() {
        let fixture = Fixture::scenario().await;

        let page = fixture.engine().recommend(m(1), 0, 4).await.unwrap();
        assert_eq!(ids(&page.items), vec![4, 5, 7, 6]);
        assert!(page.has_next);

        let empty_directory = Fixture::new();
        for (a, b) in [(1, 2), (2, 3)] {
            empty_directory.friends.add_friend(m(a), m(b)).await.unwrap();
        }
        empty_directory.members.join([m(1)]).await;
        let page = empty_directory.engine().recommend(m(1), 0, 1).await.unwrap();
        assert_eq!(ids(&page.items), vec![3]);
        assert!(!page.has_next);
    }

    #[tokio::test]
    async fn test_degree_three_counted_when_degree_two_fills_page_exactly() {
        // 1 - 2; 2 - 100..=119; each 100 + i - 200 + i
        let fixture = Fixture::new();
        fixture.friends.add_friend(m(1), m(2)).await.unwrap();
        for i in 0..20 {
            fixture.friends.add_friend(m(2), m(100 + i)).await.unwrap();
            fixture.friends.add_friend(m(100 + i), m(200 + i)).await.unwrap();
        }
        fixture.members.join([m(1)]).await;
        let engine = fixture.engine_with(EngineSettings {
            min_pool_size: 20,
            ..default_settings()
        });

        let second = engine.recommend(m(1), 1, 10).await.unwrap();
        assert!(second.items.iter().all(|c| c.depth == FIRST_CANDIDATE_DEPTH));
        assert_eq!(second.total_count, 40);
        assert!(second.has_next);

        let third = engine.recommend(m(1), 2, 10).await.unwrap();
        assert!(third.items.iter().all(|c| c.depth == MAX_DEPTH));
        assert_eq!(third.total_count, 40);
    }

    #[tokio::test]
    async fn test_blocked_filler_is_skipped() {
        let fixture = Fixture::scenario().await;
        fixture.blacklist.block(m(1), m(20)).await;

        let page = fixture.engine().recommend(m(1), 0, 6).await.unwrap();

        assert_eq!(ids(&page.items), vec![4, 5, 7, 6, 19, 18]);
    }

    #[tokio::test]
    async fn test_unknown_requester_rejected() {
        let fixture = Fixture::scenario().await;

        let err = tokio_test::assert_err!(fixture.engine().recommend(m(99), 0, 10).await);

        assert!(matches!(err, AppError::InvalidRequester { member_id: 99 }));
    }

    #[tokio::test]
    async fn test_page_size_bounds() {
        let fixture = Fixture::scenario().await;
        let engine = fixture.engine();

        for size in [0, engine.settings().max_page_size + 1] {
            let err = engine.recommend(m(1), 0, size).await.unwrap_err();
            assert!(matches!(err, AppError::Validation { .. }));
        }
        let err = engine.recommend(m(1), usize::MAX, 2).await.unwrap_err();
        assert!(matches!(err, AppError::Validation { .. }));
    }

    #[tokio::test]
    async fn test_blacklist_failure_propagates() {
        let fixture = Fixture::scenario().await;
        let engine = RecommendationEngine::new(
            fixture.friends.clone(),
            fixture.interactions.clone(),
            Arc::new(DownBlacklist),
            fixture.members.clone(),
            default_settings(),
        );

        let err = engine.recommend(m(1), 0, 10).await.unwrap_err();

        assert!(matches!(err, AppError::BlacklistCheckFailed { .. }));
    }

    #[tokio::test]
    async fn test_score_failure_ranks_by_depth_only() {
        let fixture = Fixture::scenario().await;
        let engine = RecommendationEngine::new(
            fixture.friends.clone(),
            Arc::new(DownScores),
            fixture.blacklist.clone(),
            fixture.members.clone(),
            default_settings(),
        );

        let page = engine.recommend(m(1), 0, 4).await.unwrap();

        assert_eq!(ids(&page.items), vec![4, 5, 7, 6]);
        assert!(page.items.iter().all(|c| c.interaction_score == 0.0));
    }

    #[tokio::test]
    async fn test_friend_lookup_failure_serves_filler() {
        let fixture = Fixture::scenario().await;
        let engine = RecommendationEngine::new(
            flaky_scenario(true, usize::MAX).await,
            fixture.interactions.clone(),
            fixture.blacklist.clone(),
            fixture.members.clone(),
            default_settings(),
        );

        let page = engine.recommend(m(1), 0, 3).await.unwrap();

        assert_eq!(ids(&page.items), vec![20, 19, 18]);
        assert_eq!(page.total_count, 0);
    }

    #[tokio::test]
    async fn test_degree_three_failure_keeps_degree_two() {
        let fixture = Fixture::scenario().await;
        let engine = RecommendationEngine::new(
            flaky_scenario(false, 2).await,
            fixture.interactions.clone(),
            fixture.blacklist.clone(),
            fixture.members.clone(),
            default_settings(),
        );

        let page = engine.recommend(m(1), 0, 5).await.unwrap();

        assert_eq!(ids(&page.items), vec![4, 5, 7, 20, 19]);
        assert_eq!(page.total_count, 3);
    }

    #[tokio::test]
    async fn test_member_source_outage_leaves_page_short() {
        let fixture = Fixture::scenario().await;
        let engine = RecommendationEngine::new(
            fixture.friends.clone(),
            fixture.interactions.clone(),
            fixture.blacklist.clone(),
            Arc::new(DownMembers),
            default_settings(),
        );

        let page = engine.recommend(m(1), 0, 10).await.unwrap();

        assert_eq!(ids(&page.items), vec![4, 5, 7, 6]);
    }

    #[tokio::test]
    async fn test_unsampled_friends_still_excluded() {
        let fixture = Fixture::new();
        for (a, b) in [(1, 2), (1, 3), (2, 3), (2, 8), (3, 9)] {
            fixture.friends.add_friend(m(a), m(b)).await.unwrap();
        }
        fixture.members.join((1..=9).map(MemberId)).await;
        let engine = fixture.engine_with(EngineSettings {
            friend_sample_size: 1,
            ..default_settings()
        });

        let page = engine.recommend(m(1), 0, 5).await.unwrap();

        let returned = ids(&page.items);
        assert!(!returned.contains(&2));
        assert!(!returned.contains(&3));
        assert!(!returned.contains(&1));
    }
}
