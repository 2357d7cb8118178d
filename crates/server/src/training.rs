//! # Training Controller
//!
//! Full training rebuilds matrices, mappings and item features from scratch
//! and fits both families concurrently. Partial training consumes only the
//! interactions newer than each family's watermark, extends that family's
//! snapshot and fits on top of it.
//!
//! A family's artifact and state change only after its new artifact is
//! persisted. A failed fit or persist leaves both untouched, so the next
//! partial run picks up the same window again.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, MutexGuard};
use tracing::{error, info, instrument, warn};

use data_loader::{
    InteractionAggregator, MatrixBuilder, WeightedInteraction, latest_timestamp, resolve_weights,
};
use models::{Family, ItemFeatureMatrix, ModelArtifact};
use storage::FamilyTrainingState;

use crate::context::AppContext;

/// What a training run did for one family
#[derive(Debug, Clone, PartialEq)]
pub enum TrainingOutcome {
    /// A new artifact was persisted and installed
    Trained { users: usize, movies: usize, cells: usize },
    /// Nothing to consume; artifact and state unchanged
    NoNewData,
    /// The run failed; artifact and state unchanged
    Failed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrainingReport {
    pub partial: bool,
    pub outcomes: BTreeMap<Family, TrainingOutcome>,
}

impl TrainingReport {
    fn uniform(partial: bool, outcome: TrainingOutcome) -> Self {
        Self {
            partial,
            outcomes: Family::ALL.iter().map(|&f| (f, outcome.clone())).collect(),
        }
    }

    pub fn outcome(&self, family: Family) -> Option<&TrainingOutcome> {
        self.outcomes.get(&family)
    }

    pub fn has_failures(&self) -> bool {
        self.outcomes
            .values()
            .any(|o| matches!(o, TrainingOutcome::Failed(_)))
    }
}

pub struct TrainingController {
    ctx: Arc<AppContext>,
    aggregator: InteractionAggregator,
    als_lock: Mutex<()>,
    lightfm_lock: Mutex<()>,
    state_lock: Mutex<()>,
}

impl TrainingController {
    pub fn new(ctx: Arc<AppContext>) -> Self {
        let aggregator = InteractionAggregator::new(ctx.interactions.clone());
        Self {
            ctx,
            aggregator,
            als_lock: Mutex::new(()),
            lightfm_lock: Mutex::new(()),
            state_lock: Mutex::new(()),
        }
    }

    pub async fn train(&self, partial: bool) -> Result<TrainingReport> {
        if partial {
            self.train_partial().await
        } else {
            self.train_full().await
        }
    }

    /// Rebuild everything from the complete interaction history.
    ///
    /// Errors only when a collaborator cannot be read; per-family failures
    /// are reported in the returned report.
    #[instrument(skip(self))]
    pub async fn train_full(&self) -> Result<TrainingReport> {
        let _als = self.lock(Family::Als).await;
        let _lightfm = self.lock(Family::LightFm).await;

        let interactions = self
            .aggregator
            .load_interactions(None)
            .await
            .context("Failed to load interactions")?;
        if interactions.is_empty() {
            info!("No interactions recorded, skipping full training");
            return Ok(TrainingReport::uniform(false, TrainingOutcome::NoNewData));
        }
        let movies = self
            .ctx
            .catalog
            .movies()
            .await
            .context("Failed to load catalog")?;

        let trained_at = Utc::now();
        let watermark = latest_timestamp(&interactions);
        let triples = resolve_weights(&interactions);
        let (matrix, mapping) = MatrixBuilder::build(&triples);
        let features = ItemFeatureMatrix::build(&mapping, &movies);
        info!(
            "Built {} x {} matrix with {} cells and {} genres",
            mapping.num_users(),
            mapping.num_movies(),
            matrix.nnz(),
            features.num_features()
        );

        let config = self.ctx.config.model_config();
        let fit = |family: Family| {
            let config = config.clone();
            let matrix = matrix.clone();
            let mapping = mapping.clone();
            let features = features.clone();
            tokio::task::spawn_blocking(move || {
                let started = Instant::now();
                let result = ModelArtifact::train_full(
                    family, &config, matrix, mapping, features, trained_at,
                );
                (result, started.elapsed())
            })
        };

        // Fit both families in parallel
        let (als_result, lightfm_result) = tokio::join!(fit(Family::Als), fit(Family::LightFm));

        let mut outcomes = BTreeMap::new();
        for (family, joined) in [(Family::Als, als_result), (Family::LightFm, lightfm_result)] {
            let outcome = match joined {
                Ok((result, elapsed)) => {
                    let outcome = match result {
                        Ok(artifact) => self.commit(artifact, watermark).await,
                        Err(e) => Err(anyhow::Error::new(e).context("Fit failed")),
                    };
                    self.finish(family, false, elapsed, outcome)
                }
                Err(e) => {
                    error!("{} training task panicked: {}", family, e);
                    TrainingOutcome::Failed(e.to_string())
                }
            };
            outcomes.insert(family, outcome);
        }

        let report = TrainingReport {
            partial: false,
            outcomes,
        };
        if !report.has_failures() {
            self.update_state(|state| state.last_full_train = Some(trained_at))
                .await
                .context("Failed to record full training time")?;
        }
        Ok(report)
    }

    /// Fit each family on the interactions it has not consumed yet.
    ///
    /// Runs a full training instead when any family has never been trained.
    #[instrument(skip(self))]
    pub async fn train_partial(&self) -> Result<TrainingReport> {
        let state = self
            .ctx
            .model_store
            .load_state()
            .await
            .context("Failed to load training state")?;
        let untrained = Family::ALL.iter().any(|&family| {
            state.family(family).is_none() || self.ctx.registry.get(family).is_none()
        });
        if untrained {
            info!("No previous training state, running full training");
            return self.train_full().await;
        }

        let mut outcomes = BTreeMap::new();
        for family in Family::ALL {
            let _guard = self.lock(family).await;
            let started = Instant::now();
            let outcome = match self.partial_family(family).await {
                Ok(None) => {
                    info!("No new interactions for {}", family);
                    TrainingOutcome::NoNewData
                }
                Ok(Some((artifact, watermark))) => {
                    let result = self.commit(artifact, watermark).await;
                    self.finish(family, true, started.elapsed(), result)
                }
                Err(e) => self.finish(family, true, started.elapsed(), Err(e)),
            };
            outcomes.insert(family, outcome);
        }

        Ok(TrainingReport {
            partial: true,
            outcomes,
        })
    }

    /// New artifact for `family` and the watermark it consumed up to
    async fn partial_family(
        &self,
        family: Family,
    ) -> Result<Option<(ModelArtifact, Option<DateTime<Utc>>)>> {
        let current = self
            .ctx
            .registry
            .get(family)
            .ok_or_else(|| anyhow!("{} has no artifact", family))?;
        let state = self
            .ctx
            .model_store
            .load_state()
            .await
            .context("Failed to load training state")?;
        let since = state
            .family(family)
            .map(|s| s.watermark.unwrap_or(s.last_train));

        let interactions = self
            .aggregator
            .load_interactions(since)
            .await
            .context("Failed to load interactions")?;
        if interactions.is_empty() {
            return Ok(None);
        }

        let watermark = latest_timestamp(&interactions);
        let triples: Vec<WeightedInteraction> = resolve_weights(&interactions);
        let trained_at = Utc::now();

        let artifact = tokio::task::spawn_blocking(move || {
            let (matrix, mapping) =
                MatrixBuilder::extend(&triples, &current.mapping, &current.matrix);
            let delta = MatrixBuilder::delta(&triples, &mapping);
            current.train_partial(&delta, matrix, mapping, trained_at)
        })
        .await
        .context("Training task panicked")?
        .context("Fit failed")?;

        Ok(Some((artifact, watermark)))
    }

    /// Persist, install and advance the family's state
    async fn commit(
        &self,
        artifact: ModelArtifact,
        watermark: Option<DateTime<Utc>>,
    ) -> Result<TrainingOutcome> {
        let family = artifact.family;
        self.ctx
            .model_store
            .save(&artifact)
            .await
            .context("Failed to persist artifact")?;

        let outcome = TrainingOutcome::Trained {
            users: artifact.mapping.num_users(),
            movies: artifact.mapping.num_movies(),
            cells: artifact.matrix.nnz(),
        };
        let last_train = artifact.trained_at;
        self.ctx.metrics.matrix_size(family, artifact.matrix.nnz());
        self.ctx.registry.install(Arc::new(artifact));
        self.ctx.metrics.model_loaded(family, true);

        self.update_state(|state| {
            let previous = state.family(family).and_then(|s| s.watermark);
            state.families.insert(
                family,
                FamilyTrainingState {
                    last_train,
                    watermark: watermark.max(previous),
                },
            );
        })
        .await
        .context("Failed to persist training state")?;
        Ok(outcome)
    }

    fn finish(
        &self,
        family: Family,
        partial: bool,
        elapsed: std::time::Duration,
        result: Result<TrainingOutcome>,
    ) -> TrainingOutcome {
        self.ctx
            .metrics
            .training_finished(family, partial, elapsed, result.is_ok());
        match result {
            Ok(outcome) => {
                info!("Trained {} in {:.2?}: {:?}", family, elapsed, outcome);
                outcome
            }
            Err(e) => {
                error!("Training {} failed after {:.2?}: {:#}", family, elapsed, e);
                TrainingOutcome::Failed(format!("{:#}", e))
            }
        }
    }

    async fn update_state(&self, change: impl FnOnce(&mut storage::TrainingState)) -> Result<()> {
        let _guard = self.state_lock.lock().await;
        let mut state = self.ctx.model_store.load_state().await?;
        change(&mut state);
        self.ctx.model_store.save_state(&state).await?;
        Ok(())
    }

    /// Serializes trainers of one family
    async fn lock(&self, family: Family) -> MutexGuard<'_, ()> {
        let lock = match family {
            Family::Als => &self.als_lock,
            Family::LightFm => &self.lightfm_lock,
        };
        if let Ok(guard) = lock.try_lock() {
            return guard;
        }
        warn!("Waiting for running {} training to finish", family);
        lock.lock().await
    }
}
