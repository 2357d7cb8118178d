//! Hybrid collaborative + content model.
//!
//! A factorization model in the LightFM style: an item is represented by its
//! own identity embedding plus the embeddings of its genre features, and a
//! user by an identity embedding. The score of a pair is
//!
//! ```text
//! s(u, i) = pᵤ · (eᵢ + Σ_f e_f) + bᵢ + Σ_f b_f
//! ```
//!
//! Parameters are learned with the WARP loss: for each observed pair, random
//! negatives are drawn until one violates the margin, and the update is
//! weighted by the log of the estimated rank of the positive item.
//!
//! Unlike ALS this family has a genuine incremental fit: new users and items
//! get freshly initialized rows and only the new interaction mass is replayed
//! for a small number of epochs.

use crate::error::{ModelError, Result};
use crate::family::Family;
use crate::features::ItemFeatureMatrix;
use crate::traits::ModelFamily;
use data_loader::{CooMatrix, InteractionMatrix};
use ndarray::{Array1, Array2, s};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, instrument};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HybridConfig {
    /// Embedding dimension
    pub components: usize,
    pub learning_rate: f32,
    /// L2 penalty applied to updated embeddings
    pub regularization: f32,
    /// Negatives drawn per positive before giving up
    pub max_sampled: usize,
    pub full_epochs: usize,
    pub partial_epochs: usize,
    pub seed: u64,
}

impl Default for HybridConfig {
    fn default() -> Self {
        Self {
            components: 20,
            learning_rate: 0.05,
            regularization: 1e-4,
            max_sampled: 10,
            full_epochs: 10,
            partial_epochs: 5,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HybridModel {
    config: HybridConfig,
    user_embeddings: Array2<f32>,
    item_embeddings: Array2<f32>,
    feature_embeddings: Array2<f32>,
    item_biases: Array1<f32>,
    feature_biases: Array1<f32>,
    /// Feature rows the parameters were fitted against, one per item
    features: ItemFeatureMatrix,
}

impl HybridModel {
    pub fn new(config: HybridConfig) -> Self {
        let k = config.components;
        Self {
            config,
            user_embeddings: Array2::zeros((0, k)),
            item_embeddings: Array2::zeros((0, k)),
            feature_embeddings: Array2::zeros((0, k)),
            item_biases: Array1::zeros(0),
            feature_biases: Array1::zeros(0),
            features: ItemFeatureMatrix::default(),
        }
    }

    pub fn config(&self) -> &HybridConfig {
        &self.config
    }

    pub fn num_users(&self) -> usize {
        self.user_embeddings.nrows()
    }

    pub fn num_items(&self) -> usize {
        self.item_embeddings.nrows()
    }

    pub fn user_embedding(&self, user_idx: usize) -> Option<Array1<f32>> {
        (user_idx < self.num_users()).then(|| self.user_embeddings.row(user_idx).to_owned())
    }

    fn is_fitted(&self) -> bool {
        self.num_items() > 0
    }

    fn random_rows(&self, rows: usize, rng: &mut StdRng) -> Array2<f32> {
        let k = self.config.components;
        let scale = 1.0 / k.max(1) as f32;
        Array2::from_shape_fn((rows, k), |_| (rng.random::<f32>() - 0.5) * scale)
    }

    /// Item representation: identity embedding plus feature embeddings
    fn item_representation(&self, item: usize) -> (Array1<f32>, f32) {
        let mut vector = self.item_embeddings.row(item).to_owned();
        let mut bias = self.item_biases[item];
        for &f in self.features.row(item) {
            vector += &self.feature_embeddings.row(f);
            bias += self.feature_biases[f];
        }
        (vector, bias)
    }

    /// Append freshly initialized rows for users and items the parameters
    /// do not cover yet. Existing rows are copied unchanged.
    fn grow(&mut self, num_users: usize, num_items: usize, rng: &mut StdRng) {
        let k = self.config.components;

        if num_users > self.num_users() {
            let old = self.num_users();
            let mut grown = Array2::zeros((num_users, k));
            grown.slice_mut(s![..old, ..]).assign(&self.user_embeddings);
            grown
                .slice_mut(s![old.., ..])
                .assign(&self.random_rows(num_users - old, rng));
            self.user_embeddings = grown;
        }

        if num_items > self.num_items() {
            let old = self.num_items();
            let mut grown = Array2::zeros((num_items, k));
            grown.slice_mut(s![..old, ..]).assign(&self.item_embeddings);
            grown
                .slice_mut(s![old.., ..])
                .assign(&self.random_rows(num_items - old, rng));
            self.item_embeddings = grown;

            let mut biases = Array1::zeros(num_items);
            biases.slice_mut(s![..old]).assign(&self.item_biases);
            self.item_biases = biases;
        }

        self.features.conform(num_items);
    }

    /// Replay the cells of `samples` for `epochs` passes of WARP updates.
    ///
    /// `positives` holds every item each user interacted with, so that no
    /// known positive is drawn as a negative.
    fn train_epochs(
        &mut self,
        samples: &CooMatrix,
        positives: &[HashSet<usize>],
        epochs: usize,
        rng: &mut StdRng,
    ) -> Result<()> {
        let num_items = self.num_items();
        if num_items < 2 {
            return Ok(());
        }

        let mut order: Vec<usize> = (0..samples.nnz()).collect();
        for epoch in 0..epochs {
            order.shuffle(rng);
            let mut updates = 0usize;

            for &idx in &order {
                let (user, positive, weight) =
                    (samples.row[idx], samples.col[idx], samples.data[idx]);
                if weight <= 0.0 {
                    continue;
                }

                let p_u = self.user_embeddings.row(user).to_owned();
                let (q_pos, b_pos) = self.item_representation(positive);
                let s_pos = p_u.dot(&q_pos) + b_pos;

                for trial in 1..=self.config.max_sampled {
                    let negative = rng.random_range(0..num_items);
                    if positives[user].contains(&negative) {
                        continue;
                    }

                    let (q_neg, b_neg) = self.item_representation(negative);
                    let s_neg = p_u.dot(&q_neg) + b_neg;
                    if s_neg > s_pos - 1.0 {
                        let rank = ((num_items - 1) / trial) as f32;
                        let step = self.config.learning_rate * weight * (1.0 + rank).ln();
                        self.apply_update(user, positive, negative, &p_u, &q_pos, &q_neg, step);
                        updates += 1;
                        break;
                    }
                }
            }

            if self.user_embeddings.iter().any(|v| !v.is_finite())
                || self.item_embeddings.iter().any(|v| !v.is_finite())
            {
                return Err(ModelError::Numerical(format!(
                    "non-finite hybrid embedding after epoch {}",
                    epoch
                )));
            }
            debug!("Hybrid epoch {}: {} WARP updates", epoch, updates);
        }
        Ok(())
    }

    /// Gradient step that raises s(u, positive) relative to s(u, negative)
    #[allow(clippy::too_many_arguments)]
    fn apply_update(
        &mut self,
        user: usize,
        positive: usize,
        negative: usize,
        p_u: &Array1<f32>,
        q_pos: &Array1<f32>,
        q_neg: &Array1<f32>,
        step: f32,
    ) {
        let decay = 1.0 - self.config.learning_rate * self.config.regularization;

        let mut user_row = self.user_embeddings.row_mut(user);
        user_row.zip_mut_with(&(q_pos - q_neg), |p, g| *p = *p * decay + step * g);

        for (item, sign) in [(positive, 1.0f32), (negative, -1.0f32)] {
            self.item_embeddings
                .row_mut(item)
                .zip_mut_with(p_u, |q, g| *q = *q * decay + sign * step * g);
            self.item_biases[item] += sign * step;

            for &f in self.features.row(item) {
                self.feature_embeddings
                    .row_mut(f)
                    .zip_mut_with(p_u, |e, g| *e = *e * decay + sign * step * g);
                self.feature_biases[f] += sign * step;
            }
        }
    }
}

/// Items each user has a positive cell for
fn positives_by_user(matrix: &InteractionMatrix) -> Vec<HashSet<usize>> {
    (0..matrix.csr.rows)
        .map(|u| {
            matrix
                .csr
                .row(u)
                .filter(|&(_, w)| w > 0.0)
                .map(|(i, _)| i)
                .collect()
        })
        .collect()
}

impl ModelFamily for HybridModel {
    fn family(&self) -> Family {
        Family::LightFm
    }

    fn supports_partial(&self) -> bool {
        true
    }

    #[instrument(skip_all, fields(nnz = matrix.nnz(), epochs = self.config.full_epochs))]
    fn fit_full(
        &mut self,
        matrix: &InteractionMatrix,
        features: &ItemFeatureMatrix,
    ) -> Result<()> {
        if matrix.nnz() == 0 {
            return Err(ModelError::EmptyTrainingData { family: "lightfm" });
        }

        let (num_users, num_items) = matrix.shape();
        let mut features = features.clone();
        features.conform(num_items);
        let num_features = features.num_features();

        let mut rng = StdRng::seed_from_u64(self.config.seed);
        let mut fresh = HybridModel::new(self.config.clone());
        fresh.user_embeddings = fresh.random_rows(num_users, &mut rng);
        fresh.item_embeddings = fresh.random_rows(num_items, &mut rng);
        fresh.feature_embeddings = fresh.random_rows(num_features, &mut rng);
        fresh.item_biases = Array1::zeros(num_items);
        fresh.feature_biases = Array1::zeros(num_features);
        fresh.features = features;

        let positives = positives_by_user(matrix);
        fresh.train_epochs(&matrix.coo, &positives, self.config.full_epochs, &mut rng)?;

        *self = fresh;
        Ok(())
    }

    #[instrument(skip_all, fields(delta_nnz = delta.nnz(), epochs = self.config.partial_epochs))]
    fn fit_partial(
        &mut self,
        delta: &InteractionMatrix,
        accumulated: &InteractionMatrix,
        features: &ItemFeatureMatrix,
    ) -> Result<()> {
        if !self.is_fitted() {
            return self.fit_full(accumulated, features);
        }
        if delta.nnz() == 0 {
            return Ok(());
        }

        let (num_users, num_items) = accumulated.shape();
        if num_users < self.num_users() {
            return Err(ModelError::ShapeMismatch {
                what: "accumulated matrix users",
                expected: self.num_users(),
                actual: num_users,
            });
        }
        if num_items < self.num_items() {
            return Err(ModelError::ShapeMismatch {
                what: "accumulated matrix items",
                expected: self.num_items(),
                actual: num_items,
            });
        }

        let mut updated = self.clone();
        let mut rng = StdRng::seed_from_u64(self.config.seed ^ accumulated.nnz() as u64);
        updated.grow(num_users, num_items, &mut rng);

        let positives = positives_by_user(accumulated);
        updated.train_epochs(&delta.coo, &positives, self.config.partial_epochs, &mut rng)?;

        *self = updated;
        Ok(())
    }

    fn score(&self, user_idx: usize, _user_row: &[(usize, f32)]) -> Result<Vec<f32>> {
        let Some(user) = self.user_embedding(user_idx) else {
            return Ok(vec![0.0; self.num_items()]);
        };

        Ok((0..self.num_items())
            .map(|item| {
                let (q, b) = self.item_representation(item);
                user.dot(&q) + b
            })
            .collect())
    }
}
