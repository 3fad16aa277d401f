use std::collections::BTreeMap;

use crate::fixed::Fixed;

#[derive(Debug, Clone, PartialEq)]
pub struct Ranked<K> {
    pub key: K,
    pub score: Fixed,
    pub rank: Fixed,
}

/// Rank scores in descending order using mid-ranks for ties.
///
/// Every maximal run of equal scores occupying 1-based positions
/// `first..=last` receives the rank `(first + last) / 2`, so `[90, 85, 85, 70]`
/// ranks as `[1, 2.5, 2.5, 4]`. Entries tied on score keep their input order.
pub fn fractional_ranks<K: Clone>(scores: &[(K, Fixed)]) -> Vec<Ranked<K>> {
    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[b].1.cmp(&scores[a].1));

    let mut ranked = Vec::with_capacity(scores.len());
    let mut start = 0;
    while start < order.len() {
        let score = scores[order[start]].1;
        let mut end = start;
        while end + 1 < order.len() && scores[order[end + 1]].1 == score {
            end += 1;
        }

        let rank = Fixed::mid_rank(start + 1, end + 1);
        for &idx in &order[start..=end] {
            ranked.push(Ranked {
                key: scores[idx].0.clone(),
                score,
                rank,
            });
        }
        start = end + 1;
    }
    ranked
}

/// Same ranking, looked up by key.
pub fn rank_map<K: Clone + Ord>(scores: &[(K, Fixed)]) -> BTreeMap<K, Fixed> {
    fractional_ranks(scores)
        .into_iter()
        .map(|r| (r.key, r.rank))
        .collect()
}
