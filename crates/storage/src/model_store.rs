//! Model Store: persists one artifact per family plus the training state.
//!
//! Artifacts are bincode blobs under the family's fixed key. The training
//! state is a small JSON document so operators can read it.

use crate::blob::BlobStore;
use crate::error::{Result, StorageError};
use chrono::{DateTime, Utc};
use models::{Family, ModelArtifact};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, instrument};

pub const TRAINING_STATE_KEY: &str = "training_state.json";

/// Training bookkeeping of one family
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FamilyTrainingState {
    /// When the last successful run of either kind finished
    pub last_train: DateTime<Utc>,
    /// Newest interaction timestamp consumed so far
    pub watermark: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingState {
    pub last_full_train: Option<DateTime<Utc>>,
    #[serde(default)]
    pub families: BTreeMap<Family, FamilyTrainingState>,
}

impl TrainingState {
    pub fn family(&self, family: Family) -> Option<&FamilyTrainingState> {
        self.families.get(&family)
    }
}

#[derive(Clone)]
pub struct ModelStore {
    blobs: Arc<dyn BlobStore>,
}

impl ModelStore {
    pub fn new(blobs: Arc<dyn BlobStore>) -> Self {
        Self { blobs }
    }

    /// Replace the stored artifact of `artifact.family`
    #[instrument(skip_all, fields(family = %artifact.family))]
    pub async fn save(&self, artifact: &ModelArtifact) -> Result<()> {
        let bytes = bincode::serialize(artifact)
            .map_err(|e| StorageError::serialization(artifact.family.blob_key(), e))?;
        let size = bytes.len();
        self.blobs.put(artifact.family.blob_key(), bytes).await?;
        info!("Saved {} artifact ({} bytes)", artifact.family, size);
        Ok(())
    }

    /// The stored artifact of `family`, `None` when never trained
    pub async fn load(&self, family: Family) -> Result<Option<ModelArtifact>> {
        let Some(bytes) = self.blobs.get(family.blob_key()).await? else {
            return Ok(None);
        };
        let artifact: ModelArtifact = bincode::deserialize(&bytes)
            .map_err(|e| StorageError::serialization(family.blob_key(), e))?;
        Ok(Some(artifact))
    }

    pub async fn load_state(&self) -> Result<TrainingState> {
        match self.blobs.get(TRAINING_STATE_KEY).await? {
            Some(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| StorageError::serialization(TRAINING_STATE_KEY, e)),
            None => Ok(TrainingState::default()),
        }
    }

    pub async fn save_state(&self, state: &TrainingState) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(state)
            .map_err(|e| StorageError::serialization(TRAINING_STATE_KEY, e))?;
        self.blobs.put(TRAINING_STATE_KEY, bytes).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob::MemoryBlobStore;
    use chrono::TimeZone;
    use data_loader::{MatrixBuilder, WeightedInteraction};
    use models::{AlsConfig, ItemFeatureMatrix, ModelConfig};

    fn artifact() -> ModelArtifact {
        let triples: Vec<WeightedInteraction> = [("u1", "m1"), ("u1", "m2"), ("u2", "m2")]
            .iter()
            .map(|(u, m)| WeightedInteraction {
                user_id: u.to_string(),
                movie_id: m.to_string(),
                weight: 1.0,
            })
            .collect();
        let (matrix, mapping) = MatrixBuilder::build(&triples);
        let config = ModelConfig {
            als: AlsConfig {
                factors: 2,
                iterations: 2,
                ..AlsConfig::default()
            },
            ..ModelConfig::default()
        };
        ModelArtifact::train_full(
            Family::Als,
            &config,
            matrix,
            mapping,
            ItemFeatureMatrix::default(),
            Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_artifact_persists_under_family_key() {
        let blobs = Arc::new(MemoryBlobStore::new());
        let store = ModelStore::new(blobs.clone());

        assert!(store.load(Family::Als).await.unwrap().is_none());
        let saved = artifact();
        store.save(&saved).await.unwrap();

        assert_eq!(blobs.keys().await, vec!["als_model.bin"]);
        assert_eq!(store.load(Family::Als).await.unwrap(), Some(saved));
        assert!(store.load(Family::LightFm).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_training_state_defaults_and_persists() {
        let store = ModelStore::new(Arc::new(MemoryBlobStore::new()));
        assert_eq!(store.load_state().await.unwrap(), TrainingState::default());

        let at = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let mut state = TrainingState {
            last_full_train: Some(at),
            ..TrainingState::default()
        };
        state.families.insert(
            Family::LightFm,
            FamilyTrainingState {
                last_train: at,
                watermark: Some(at),
            },
        );
        store.save_state(&state).await.unwrap();

        let loaded = store.load_state().await.unwrap();
        assert_eq!(loaded, state);
        assert!(loaded.family(Family::Als).is_none());
    }

    #[tokio::test]
    async fn test_corrupt_artifact_is_an_error() {
        let blobs = Arc::new(MemoryBlobStore::new());
        blobs.put("lightfm_model.bin", vec![0xff; 3]).await.unwrap();
        let store = ModelStore::new(blobs);
        assert!(matches!(
            store.load(Family::LightFm).await,
            Err(StorageError::Serialization { .. })
        ));
    }
}
