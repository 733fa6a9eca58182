//! Small helpers shared by the election and commit-advancement logic in
//! [`crate::core`]. Kept separate because both "did I win the vote" and
//! "can I advance commit_index" reduce to the same quorum arithmetic.

/// Returns whether `count` constitutes a strict majority of `total` peers
/// (including self).
pub fn is_majority(count: usize, total: usize) -> bool {
    count * 2 > total
}

/// Given the `match_index` of every peer (self excluded) and the size of
/// the full peer set (self included), returns the highest index known to
/// be present on a majority, or `0` if none qualifies.
pub fn majority_match_index(mut match_indices: Vec<u64>, self_index: u64, total_peers: usize) -> u64 {
    match_indices.push(self_index);
    match_indices.sort_unstable_by(|a, b| b.cmp(a));
    let majority_pos = total_peers / 2;
    match_indices.get(majority_pos).copied().unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn majority_of_three() {
        assert!(is_majority(2, 3));
        assert!(!is_majority(1, 3));
    }

    #[test]
    fn majority_match_index_picks_median() {
        // self at 10, two peers at 10 and 5 -> majority (2 of 3) have >= 10
        let idx = majority_match_index(vec![10, 5], 10, 3);
        assert_eq!(idx, 10);
    }
}
