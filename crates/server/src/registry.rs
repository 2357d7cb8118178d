//! In-process home of the artifacts being served.
//!
//! Serving workers clone an `Arc` out under a short read lock and score
//! against it without holding the lock. Training installs a new artifact by
//! swapping the pointer, so a reader keeps the artifact it started with.

use models::{Family, ModelArtifact};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use storage::ModelStore;
use tracing::{info, warn};

#[derive(Debug, Default)]
pub struct ModelRegistry {
    artifacts: RwLock<HashMap<Family, Arc<ModelArtifact>>>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The artifact currently served for `family`
    pub fn get(&self, family: Family) -> Option<Arc<ModelArtifact>> {
        match self.artifacts.read() {
            Ok(artifacts) => artifacts.get(&family).cloned(),
            Err(poisoned) => poisoned.into_inner().get(&family).cloned(),
        }
    }

    /// Replace the artifact of its family
    pub fn install(&self, artifact: Arc<ModelArtifact>) {
        let family = artifact.family;
        match self.artifacts.write() {
            Ok(mut artifacts) => artifacts.insert(family, artifact),
            Err(poisoned) => poisoned.into_inner().insert(family, artifact),
        };
    }

    pub fn is_empty(&self) -> bool {
        Family::ALL.iter().all(|&family| self.get(family).is_none())
    }

    /// Install every artifact found in `store`.
    ///
    /// A family whose blob is missing stays empty; one whose blob cannot be
    /// decoded is logged and skipped so the other family can still serve.
    pub async fn load_from(&self, store: &ModelStore) -> storage::Result<usize> {
        let mut loaded = 0;
        for family in Family::ALL {
            match store.load(family).await {
                Ok(Some(artifact)) => {
                    info!(
                        "Loaded {} artifact trained at {}",
                        family, artifact.trained_at
                    );
                    self.install(Arc::new(artifact));
                    loaded += 1;
                }
                Ok(None) => info!("No stored {} artifact", family),
                Err(e @ storage::StorageError::Serialization { .. }) => {
                    warn!("Skipping unreadable {} artifact: {}", family, e)
                }
                Err(e) => return Err(e),
            }
        }
        Ok(loaded)
    }
}
