//! Durable storage for model artifacts and the recommendation cache.
//!
//! - **blob**: `BlobStore` with in-memory and filesystem backends
//! - **model_store**: one artifact per family plus training state
//! - **cache**: `RecommendationCache` with in-memory and Redis backends

pub mod blob;
pub mod cache;
pub mod error;
pub mod model_store;

pub use blob::{BlobStore, FsBlobStore, MemoryBlobStore};
pub use cache::{CacheKey, MemoryCache, RecommendationCache, RedisCache, create_redis_client};
pub use error::{Result, StorageError};
pub use model_store::{FamilyTrainingState, ModelStore, TRAINING_STATE_KEY, TrainingState};
