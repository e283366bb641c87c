//! Ordering and pagination of the candidate pool

use super::Candidate;
use std::cmp::Ordering;

/// Nearer members first, then higher interaction score. The sort is stable,
/// so ties keep discovery order.
pub(super) fn rank(candidates: &mut [Candidate]) {
    candidates.sort_by(|a, b| {
        a.depth.cmp(&b.depth).then_with(|| {
            b.interaction_score
                .partial_cmp(&a.interaction_score)
                .unwrap_or(Ordering::Equal)
        })
    });
}

/// The entries of 0-based `page`; empty once past the end
pub(super) fn page_slice(ranked: &[Candidate], page: usize, page_size: usize) -> &[Candidate] {
    let start = page.saturating_mul(page_size).min(ranked.len());
    let end = start.saturating_add(page_size).min(ranked.len());
    &ranked[start..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use friendlink_common::graph::MemberId;

    fn scored(id: i64, depth: u8, score: f64) -> Candidate {
        Candidate {
            member_id: MemberId(id),
            depth,
            acquaintance_id: None,
            interaction_score: score,
        }
    }

    fn ids(candidates: &[Candidate]) -> Vec<i64> {
        candidates.iter().map(|c| c.member_id.0).collect()
    }

    #[test]
    fn test_depth_dominates_score() {
        let mut pool = vec![scored(6, 3, 9.0), scored(5, 2, 1.0), scored(4, 2, 2.0)];
        rank(&mut pool);
        assert_eq!(ids(&pool), vec![4, 5, 6]);
    }

    #[test]
    fn test_ties_keep_discovery_order() {
        let mut pool = vec![scored(8, 2, 0.0), scored(3, 2, 0.0), scored(5, 2, 0.0)];
        rank(&mut pool);
        assert_eq!(ids(&pool), vec![8, 3, 5]);
    }

    #[test]
    fn test_page_slices() {
        let pool: Vec<Candidate> = (1..=5).map(|id| scored(id, 2, 0.0)).collect();

        assert_eq!(ids(page_slice(&pool, 0, 2)), vec![1, 2]);
        assert_eq!(ids(page_slice(&pool, 2, 2)), vec![5]);
        assert!(page_slice(&pool, 3, 2).is_empty());
        assert!(page_slice(&pool, usize::MAX, 2).is_empty());
    }
}
