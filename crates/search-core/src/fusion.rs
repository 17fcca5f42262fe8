use std::hash::Hash;

use ahash::{AHashMap, AHashSet};

pub const DEFAULT_RRF_K: usize = 60;

#[derive(Debug, Clone, PartialEq)]
pub struct ScoredId<K = String> {
    pub id: K,
    pub score: f64,
}

/// Reciprocal Rank Fusion: every id scores `Σ 1 / (k + rank)` over the lists
/// that contain it, rank being 1-based. A list contributes once per id even if
/// the id repeats inside it (first occurrence counts).
///
/// Output is sorted by descending score. Equal scores keep the order in which
/// ids were first seen walking the lists front to back, so the result is a
/// pure function of the input, list order included.
pub fn rrf_fuse<K, L>(lists: &[L], k: usize) -> Vec<ScoredId<K>>
where
    K: Clone + Eq + Hash,
    L: AsRef<[K]>,
{
    let kf = k as f64;
    let mut fused: Vec<ScoredId<K>> = Vec::new();
    let mut position: AHashMap<K, usize> = AHashMap::new();

    for list in lists {
        let mut seen_in_list: AHashSet<&K> = AHashSet::new();
        for (rank, id) in list.as_ref().iter().enumerate() {
            if !seen_in_list.insert(id) {
                continue;
            }
            let rr = 1.0 / (kf + (rank + 1) as f64);
            if let Some(&idx) = position.get(id) {
                fused[idx].score += rr;
            } else {
                position.insert(id.clone(), fused.len());
                fused.push(ScoredId {
                    id: id.clone(),
                    score: rr,
                });
            }
        }
    }

    // sort_by is stable: ties stay in first-seen order.
    fused.sort_by(|a, b| b.score.total_cmp(&a.score));
    fused
}
