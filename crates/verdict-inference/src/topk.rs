//! Top-k extraction from a class distribution

use std::num::NonZeroUsize;
use verdict_core::TopKPrediction;

/// Class indices ordered by probability descending, ties by ascending index
pub fn ranked_indices(distribution: &[f32]) -> Vec<usize> {
    let mut indices: Vec<usize> = (0..distribution.len()).collect();
    indices.sort_by(|&a, &b| {
        distribution[b]
            .total_cmp(&distribution[a])
            .then_with(|| a.cmp(&b))
    });
    indices
}

/// The `k` most probable labels.
///
/// Returns `min(k, classes)` entries; a `k` above the class count is clamped,
/// never padded.
pub fn top_k(distribution: &[f32], labels: &[String], k: NonZeroUsize) -> Vec<TopKPrediction> {
    let classes = distribution.len().min(labels.len());

    ranked_indices(&distribution[..classes])
        .into_iter()
        .take(k.get())
        .map(|idx| TopKPrediction {
            label: labels[idx].clone(),
            probability: distribution[idx],
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("class_{i}")).collect()
    }

    fn k(n: usize) -> NonZeroUsize {
        NonZeroUsize::new(n).unwrap()
    }

    #[test]
    fn test_sorted_descending() {
        let result = top_k(&[0.1, 0.6, 0.3], &labels(3), k(2));
        assert_eq!(result.len(), 2);
        assert_eq!(result[0].label, "class_1");
        assert_eq!(result[1].label, "class_2");
        assert_eq!(result[0].probability, 0.6);
    }

    #[test]
    fn test_k_clamped_to_class_count() {
        let result = top_k(&[0.5, 0.5], &labels(2), k(10));
        assert_eq!(result.len(), 2);
    }

    #[test]
    fn test_ties_resolve_by_index() {
        let result = top_k(&[0.2, 0.4, 0.4, 0.0], &labels(4), k(4));
        let order: Vec<&str> = result.iter().map(|p| p.label.as_str()).collect();
        assert_eq!(order, vec!["class_1", "class_2", "class_0", "class_3"]);
    }

    #[test]
    fn test_ranked_indices_empty() {
        assert!(ranked_indices(&[]).is_empty());
    }
}
