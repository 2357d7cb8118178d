//! Model Artifact: trained parameters of one family bundled with the index
//! mapping, interaction matrix and item features they were fitted against.
//!
//! Artifacts are immutable once built. A training run produces a new one
//! and the old one is swapped out whole.

use crate::als::{AlsConfig, AlsModel};
use crate::error::Result;
use crate::family::Family;
use crate::features::ItemFeatureMatrix;
use crate::hybrid::{HybridConfig, HybridModel};
use crate::traits::ModelFamily;
use chrono::{DateTime, Utc};
use data_loader::{IndexMapping, InteractionMatrix, MovieId, WeightedInteraction};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Hyperparameters of both families
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    pub als: AlsConfig,
    pub hybrid: HybridConfig,
}

/// Parameters of whichever family an artifact holds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TrainedModel {
    Als(AlsModel),
    LightFm(HybridModel),
}

impl TrainedModel {
    /// Unfitted parameters for `family`
    pub fn untrained(family: Family, config: &ModelConfig) -> Self {
        match family {
            Family::Als => TrainedModel::Als(AlsModel::new(config.als.clone())),
            Family::LightFm => TrainedModel::LightFm(HybridModel::new(config.hybrid.clone())),
        }
    }

    fn inner(&self) -> &dyn ModelFamily {
        match self {
            TrainedModel::Als(model) => model,
            TrainedModel::LightFm(model) => model,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn ModelFamily {
        match self {
            TrainedModel::Als(model) => model,
            TrainedModel::LightFm(model) => model,
        }
    }
}

impl ModelFamily for TrainedModel {
    fn family(&self) -> Family {
        self.inner().family()
    }

    fn supports_partial(&self) -> bool {
        self.inner().supports_partial()
    }

    fn excludes_row_items(&self) -> bool {
        self.inner().excludes_row_items()
    }

    fn fit_full(
        &mut self,
        matrix: &InteractionMatrix,
        features: &ItemFeatureMatrix,
    ) -> Result<()> {
        self.inner_mut().fit_full(matrix, features)
    }

    fn fit_partial(
        &mut self,
        delta: &InteractionMatrix,
        accumulated: &InteractionMatrix,
        features: &ItemFeatureMatrix,
    ) -> Result<()> {
        self.inner_mut().fit_partial(delta, accumulated, features)
    }

    fn score(&self, user_idx: usize, user_row: &[(usize, f32)]) -> Result<Vec<f32>> {
        self.inner().score(user_idx, user_row)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub family: Family,
    pub model: TrainedModel,
    pub mapping: IndexMapping,
    pub matrix: InteractionMatrix,
    pub item_features: ItemFeatureMatrix,
    pub trained_at: DateTime<Utc>,
}

impl ModelArtifact {
    /// Fit `family` from scratch on a freshly built matrix
    pub fn train_full(
        family: Family,
        config: &ModelConfig,
        matrix: InteractionMatrix,
        mapping: IndexMapping,
        item_features: ItemFeatureMatrix,
        trained_at: DateTime<Utc>,
    ) -> Result<Self> {
        let mut model = TrainedModel::untrained(family, config);
        model.fit_full(&matrix, &item_features)?;

        info!(
            "Fitted {} on {} users x {} movies ({} cells)",
            family,
            mapping.num_users(),
            mapping.num_movies(),
            matrix.nnz()
        );
        Ok(Self {
            family,
            model,
            mapping,
            matrix,
            item_features,
            trained_at,
        })
    }

    /// New artifact fitted on top of this one.
    ///
    /// `matrix` and `mapping` are the extended snapshot, `delta` only the new
    /// cells. Item features are carried over unchanged.
    pub fn train_partial(
        &self,
        delta: &InteractionMatrix,
        matrix: InteractionMatrix,
        mapping: IndexMapping,
        trained_at: DateTime<Utc>,
    ) -> Result<Self> {
        let mut model = self.model.clone();
        model.fit_partial(delta, &matrix, &self.item_features)?;

        debug!(
            "Partially fitted {} with {} new cells",
            self.family,
            delta.nnz()
        );
        Ok(Self {
            family: self.family,
            model,
            mapping,
            matrix,
            item_features: self.item_features.clone(),
            trained_at,
        })
    }

    pub fn knows_user(&self, user_id: &str) -> bool {
        self.mapping.contains_user(user_id)
    }

    pub fn knows_movie(&self, movie_id: &str) -> bool {
        self.mapping.contains_movie(movie_id)
    }

    /// Translate a user's live triples into an (item index, weight) row.
    ///
    /// Movies the artifact has never seen are dropped.
    pub fn live_row(&self, triples: &[WeightedInteraction]) -> Vec<(usize, f32)> {
        triples
            .iter()
            .filter_map(|t| self.mapping.movie_idx(&t.movie_id).map(|idx| (idx, t.weight)))
            .collect()
    }

    /// Top `n` movies for a user known to the mapping, best first.
    ///
    /// Returns `None` for a cold-start user.
    pub fn recommend(
        &self,
        user_id: &str,
        live_row: &[(usize, f32)],
        n: usize,
    ) -> Result<Option<Vec<(MovieId, f32)>>> {
        let Some(user_idx) = self.mapping.user_idx(user_id) else {
            return Ok(None);
        };

        let ranked = self.model.recommend(user_idx, live_row, n)?;
        Ok(Some(
            ranked
                .into_iter()
                .filter_map(|(idx, score)| {
                    self.mapping.idx_to_movie(idx).map(|id| (id.clone(), score))
                })
                .collect(),
        ))
    }
}
