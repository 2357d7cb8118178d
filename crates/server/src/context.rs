//! Application context: every collaborator handle the engine needs,
//! built once at startup and shared by reference.

use crate::config::Config;
use crate::metrics::Metrics;
use crate::registry::ModelRegistry;
use crate::selection::{FamilySelector, RandomSelector};
use crate::session::{JsonlSessionLog, MemorySessionLog, SessionLog};
use anyhow::{Context, Result};
use data_loader::{Catalog, Dataset, InteractionStore, MemoryCatalog, MemoryInteractionStore};
use models::Family;
use std::sync::Arc;
use storage::{
    BlobStore, FsBlobStore, MemoryBlobStore, MemoryCache, ModelStore, RecommendationCache,
    RedisCache, create_redis_client,
};
use tracing::info;

pub struct AppContext {
    pub config: Config,
    pub interactions: Arc<dyn InteractionStore>,
    pub catalog: Arc<dyn Catalog>,
    pub model_store: ModelStore,
    pub cache: Arc<dyn RecommendationCache>,
    pub sessions: Arc<dyn SessionLog>,
    pub registry: ModelRegistry,
    pub metrics: Metrics,
    pub selector: Arc<dyn FamilySelector>,
}

impl AppContext {
    pub fn new(
        config: Config,
        interactions: Arc<dyn InteractionStore>,
        catalog: Arc<dyn Catalog>,
        blobs: Arc<dyn BlobStore>,
        cache: Arc<dyn RecommendationCache>,
        sessions: Arc<dyn SessionLog>,
    ) -> Result<Self> {
        Ok(Self {
            config,
            interactions,
            catalog,
            model_store: ModelStore::new(blobs),
            cache,
            sessions,
            registry: ModelRegistry::new(),
            metrics: Metrics::new().context("Failed to register metrics")?,
            selector: Arc::new(RandomSelector),
        })
    }

    /// Context whose every store lives in process memory
    pub fn in_memory(config: Config, dataset: Dataset) -> Result<Self> {
        Self::new(
            config,
            Arc::new(MemoryInteractionStore::with_records(dataset.interactions)),
            Arc::new(MemoryCatalog::new(dataset.movies)),
            Arc::new(MemoryBlobStore::new()),
            Arc::new(MemoryCache::new()),
            Arc::new(MemorySessionLog::new()),
        )
    }

    pub fn with_selector(mut self, selector: impl FamilySelector + 'static) -> Self {
        self.selector = Arc::new(selector);
        self
    }

    /// Build the context described by `config` and load stored artifacts
    pub async fn from_config(config: Config) -> Result<Self> {
        let dataset = match &config.data_dir {
            Some(dir) => {
                let dir = dir.clone();
                let dataset = tokio::task::spawn_blocking(move || Dataset::load_from_dir(&dir))
                    .await
                    .context("Dataset loader panicked")?
                    .context("Failed to load dataset")?;
                info!(
                    "Loaded {} movies and {} interactions",
                    dataset.movies.len(),
                    dataset.interactions.len()
                );
                dataset
            }
            None => Dataset::default(),
        };

        let blobs: Arc<dyn BlobStore> = match &config.model_dir {
            Some(dir) => Arc::new(FsBlobStore::new(dir.clone())),
            None => Arc::new(MemoryBlobStore::new()),
        };
        let cache: Arc<dyn RecommendationCache> = match &config.redis_url {
            Some(url) => Arc::new(RedisCache::new(
                create_redis_client(url).context("Failed to create Redis client")?,
            )),
            None => Arc::new(MemoryCache::new()),
        };
        let sessions: Arc<dyn SessionLog> = match &config.session_dir {
            Some(dir) => Arc::new(JsonlSessionLog::new(dir.clone())),
            None => Arc::new(MemorySessionLog::new()),
        };

        let context = Self::new(
            config,
            Arc::new(MemoryInteractionStore::with_records(dataset.interactions)),
            Arc::new(MemoryCatalog::new(dataset.movies)),
            blobs,
            cache,
            sessions,
        )?;
        let loaded = context
            .registry
            .load_from(&context.model_store)
            .await
            .context("Failed to load model artifacts")?;
        for family in Family::ALL {
            if let Some(artifact) = context.registry.get(family) {
                context.metrics.model_loaded(family, true);
                context.metrics.matrix_size(family, artifact.matrix.nnz());
            }
        }
        info!("Serving {} stored model artifacts", loaded);
        Ok(context)
    }
}
