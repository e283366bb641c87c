//! Hop-by-hop expansion over the friendship graph

use super::{Candidate, EngineSettings};
use friendlink_common::graph::{FriendshipGraphStore, MemberId};
use friendlink_common::metrics;
use std::collections::HashSet;
use tracing::{debug, warn};

/// Friends of friends: the nearest members that can be recommended
pub const FIRST_CANDIDATE_DEPTH: u8 = 2;

/// Traversal never goes past this depth
pub const MAX_DEPTH: u8 = 3;

/// Collect candidates at depth 2 and, while the pool is below `fill_target`,
/// depth 3.
///
/// `visited` arrives holding the requester and its degree-1 sample. Every
/// discovered member is added to it, so a member appears once, at the depth
/// where it was first reached. A failed hop keeps what earlier hops found.
pub(super) async fn expand(
    friends: &dyn FriendshipGraphStore,
    degree1: &[MemberId],
    visited: &mut HashSet<MemberId>,
    fill_target: usize,
    settings: &EngineSettings,
) -> Vec<Candidate> {
    let mut candidates: Vec<Candidate> = Vec::new();
    let mut frontier: Vec<MemberId> = degree1.to_vec();

    for depth in FIRST_CANDIDATE_DEPTH..=MAX_DEPTH {
        if frontier.is_empty() || candidates.len() >= settings.max_candidates {
            break;
        }
        if depth > FIRST_CANDIDATE_DEPTH {
            if candidates.len() >= fill_target {
                debug!(pool = candidates.len(), fill_target, "Pool filled, not expanding further");
                break;
            }
            frontier.truncate(settings.max_degree3_sources);
        }

        let neighbor_sets = match friends
            .batch_sample_friends(&frontier, settings.neighbor_sample_size)
            .await
        {
            Ok(sets) => sets,
            Err(e) => {
                warn!(
                    depth,
                    sources = frontier.len(),
                    error = %e,
                    "Friend expansion failed, keeping collected candidates"
                );
                metrics::record_degradation(stage(depth));
                break;
            }
        };

        let mut next = Vec::new();
        'sources: for (&source, neighbors) in frontier.iter().zip(neighbor_sets) {
            for neighbor in neighbors {
                if candidates.len() >= settings.max_candidates {
                    break 'sources;
                }
                if visited.insert(neighbor) {
                    // Only the first hop past degree 1 knows the mutual friend
                    let acquaintance = (depth == FIRST_CANDIDATE_DEPTH).then_some(source);
                    candidates.push(Candidate::from_graph(neighbor, depth, acquaintance));
                    next.push(neighbor);
                }
            }
        }

        debug!(depth, sources = frontier.len(), discovered = next.len(), "Hop expanded");
        frontier = next;
    }

    candidates
}

fn stage(depth: u8) -> &'static str {
    if depth == FIRST_CANDIDATE_DEPTH {
        "degree2"
    } else {
        "degree3"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use friendlink_common::config::RecommendationConfig;
    use friendlink_common::graph::MemoryFriendStore;

    fn m(id: i64) -> MemberId {
        MemberId(id)
    }

    async fn chain(len: i64) -> MemoryFriendStore {
        let store = MemoryFriendStore::new();
        for id in 1..len {
            store.add_friend(m(id), m(id + 1)).await.unwrap();
        }
        store
    }

    fn seeded(requester: MemberId, degree1: &[MemberId]) -> HashSet<MemberId> {
        degree1.iter().copied().chain([requester]).collect()
    }

    #[tokio::test]
    async fn test_stops_at_depth_three() {
        let store = chain(6).await;
        let settings = EngineSettings::from(&RecommendationConfig::default());
        let mut visited = seeded(m(1), &[m(2)]);

        let found = expand(&store, &[m(2)], &mut visited, 10, &settings).await;

        assert_eq!(
            found,
            vec![
                Candidate::from_graph(m(3), 2, Some(m(2))),
                Candidate::from_graph(m(4), 3, None),
            ]
        );
        assert!(!visited.contains(&m(5)));
    }

    #[tokio::test]
    async fn test_full_pool_skips_degree_three() {
        let store = chain(6).await;
        let settings = EngineSettings::from(&RecommendationConfig::default());
        let mut visited = seeded(m(1), &[m(2)]);

        let found = expand(&store, &[m(2)], &mut visited, 1, &settings).await;

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].depth, 2);
    }

    #[tokio::test]
    async fn test_candidate_cap_is_hard() {
        let store = MemoryFriendStore::new();
        store.add_friend(m(1), m(2)).await.unwrap();
        for id in 10..30 {
            store.add_friend(m(2), m(id)).await.unwrap();
        }
        let settings = EngineSettings {
            max_candidates: 5,
            ..EngineSettings::from(&RecommendationConfig::default())
        };
        let mut visited = seeded(m(1), &[m(2)]);

        let found = expand(&store, &[m(2)], &mut visited, 100, &settings).await;

        assert_eq!(found.len(), 5);
    }

    #[tokio::test]
    async fn test_shared_neighbor_reported_once() {
        let store = MemoryFriendStore::new();
        store.add_friend(m(1), m(2)).await.unwrap();
        store.add_friend(m(1), m(3)).await.unwrap();
        store.add_friend(m(2), m(9)).await.unwrap();
        store.add_friend(m(3), m(9)).await.unwrap();
        let settings = EngineSettings::from(&RecommendationConfig::default());
        let mut visited = seeded(m(1), &[m(2), m(3)]);

        let found = expand(&store, &[m(2), m(3)], &mut visited, 10, &settings).await;

        assert_eq!(found, vec![Candidate::from_graph(m(9), 2, Some(m(2)))]);
    }
}
