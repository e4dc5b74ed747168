use zaru_utils::num::TotalF32;

/// Returns the indices of the `k` largest values in `scores`, in descending order of score.
///
/// Ties are broken by ascending index. If `scores` has fewer than `k` entries, all of them are
/// returned.
pub fn top_k(scores: &[f32], k: usize) -> Vec<(usize, f32)> {
    let mut indexed: Vec<(usize, f32)> = scores.iter().copied().enumerate().collect();
    indexed.sort_by(|(ia, a), (ib, b)| {
        TotalF32(*b)
            .cmp(&TotalF32(*a))
            .then_with(|| ia.cmp(ib))
    });
    indexed.truncate(k);
    indexed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_scenario() {
        let scores = [0.1, 0.9, 0.9, 0.2];
        let result = top_k(&scores, 2);
        let indices: Vec<usize> = result.iter().map(|(i, _)| *i).collect();
        assert_eq!(indices, vec![1, 2]);
    }

    #[test]
    fn k_larger_than_input_returns_everything() {
        let scores = [0.5, 0.1];
        assert_eq!(top_k(&scores, 10).len(), 2);
    }

    #[test]
    fn zero_k_returns_nothing() {
        assert!(top_k(&[1.0, 2.0], 0).is_empty());
    }
}
