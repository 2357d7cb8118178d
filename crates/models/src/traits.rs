use crate::error::Result;
use crate::family::Family;
use crate::features::ItemFeatureMatrix;
use data_loader::InteractionMatrix;
use std::collections::HashSet;

/// Common interface of the trainable model families.
///
/// `user_row` is the user's current (item index, weight) row, read live
/// from the interaction stores rather than taken from the training snapshot.
pub trait ModelFamily: Send + Sync {
    fn family(&self) -> Family;

    /// Whether `fit_partial` updates parameters in place instead of refitting
    fn supports_partial(&self) -> bool {
        false
    }

    /// Whether `recommend` drops every item of `user_row`, likes and
    /// bookmarks included. Families that leave it off rely on the serving
    /// pipeline to remove watched movies.
    fn excludes_row_items(&self) -> bool {
        false
    }

    /// Fit from scratch on the complete matrix
    fn fit_full(&mut self, matrix: &InteractionMatrix, features: &ItemFeatureMatrix)
    -> Result<()>;

    /// Fit on new interaction mass.
    ///
    /// `delta` holds only the new cells, `accumulated` the extended matrix.
    /// Families without an incremental primitive refit on `accumulated`.
    fn fit_partial(
        &mut self,
        delta: &InteractionMatrix,
        accumulated: &InteractionMatrix,
        features: &ItemFeatureMatrix,
    ) -> Result<()> {
        let _ = delta;
        self.fit_full(accumulated, features)
    }

    /// Score of every item for one user
    fn score(&self, user_idx: usize, user_row: &[(usize, f32)]) -> Result<Vec<f32>>;

    /// Top `n` (item index, score) pairs, best first
    fn recommend(
        &self,
        user_idx: usize,
        user_row: &[(usize, f32)],
        n: usize,
    ) -> Result<Vec<(usize, f32)>> {
        let scores = self.score(user_idx, user_row)?;
        if !self.excludes_row_items() {
            return Ok(top_n(&scores, n));
        }
        let seen: HashSet<usize> = user_row.iter().map(|&(item, _)| item).collect();
        let mut ranked = top_n(&scores, n + seen.len());
        ranked.retain(|(item, _)| !seen.contains(item));
        ranked.truncate(n);
        Ok(ranked)
    }
}

/// Indices of the `n` highest scores, descending, ties by lower index
pub fn top_n(scores: &[f32], n: usize) -> Vec<(usize, f32)> {
    let mut ranked: Vec<(usize, f32)> = scores.iter().copied().enumerate().collect();
    ranked.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    });
    ranked.truncate(n);
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_top_n_orders_and_breaks_ties() {
        let ranked = top_n(&[0.1, 0.9, 0.5, 0.9], 3);
        let indices: Vec<usize> = ranked.iter().map(|(i, _)| *i).collect();
        assert_eq!(indices, vec![1, 3, 2]);
    }

    struct Fixed {
        scores: Vec<f32>,
        excludes_row: bool,
    }

    impl ModelFamily for Fixed {
        fn family(&self) -> Family {
            Family::Als
        }

        fn excludes_row_items(&self) -> bool {
            self.excludes_row
        }

        fn fit_full(&mut self, _: &InteractionMatrix, _: &ItemFeatureMatrix) -> Result<()> {
            Ok(())
        }

        fn score(&self, _: usize, _: &[(usize, f32)]) -> Result<Vec<f32>> {
            Ok(self.scores.clone())
        }
    }

    #[test]
    fn test_recommend_skips_row_items_when_excluding() {
        let model = Fixed {
            scores: vec![0.9, 0.8, 0.7, 0.6],
            excludes_row: true,
        };
        let ranked = model.recommend(0, &[(0, 1.0), (2, 0.3)], 2).unwrap();
        assert_eq!(ranked, vec![(1, 0.8), (3, 0.6)]);
    }

    #[test]
    fn test_recommend_keeps_row_items_otherwise() {
        let model = Fixed {
            scores: vec![0.9, 0.8, 0.7, 0.6],
            excludes_row: false,
        };
        let ranked = model.recommend(0, &[(0, 1.0), (2, 0.3)], 2).unwrap();
        assert_eq!(ranked, vec![(0, 0.9), (1, 0.8)]);
    }

    #[test]
    fn test_top_n_larger_than_items() {
        assert_eq!(top_n(&[1.0], 5).len(), 1);
        assert!(top_n(&[], 5).is_empty());
    }
}
