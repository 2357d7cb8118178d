//! Engine configuration loaded from `RECS_`-prefixed environment variables.
//!
//! A `.env` file in the working directory is read first when present.
//! Every field has a default, so an empty environment is a valid config
//! that keeps all state in memory.

use anyhow::{Context, bail};
use models::{AlsConfig, HybridConfig, ModelConfig};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

pub const ENV_PREFIX: &str = "RECS_";

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct Config {
    /// Directory for model artifacts; in-memory blobs when unset
    #[serde(default)]
    pub model_dir: Option<PathBuf>,

    /// Redis URL for the recommendation cache; in-memory cache when unset
    #[serde(default)]
    pub redis_url: Option<String>,

    /// JSON-lines dataset backing the in-memory interaction stores
    #[serde(default)]
    pub data_dir: Option<PathBuf>,

    /// Directory for the session and feedback logs; in-memory when unset
    #[serde(default)]
    pub session_dir: Option<PathBuf>,

    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,

    /// List length when a request does not specify one
    #[serde(default = "default_recommendations_limit")]
    pub recommendations_limit: usize,

    /// How recent a movie must be to count as fresh
    #[serde(default = "default_fresh_window_days")]
    pub fresh_window_days: i64,

    #[serde(default = "default_full_train_interval_secs")]
    pub full_train_interval_secs: u64,

    #[serde(default = "default_partial_train_interval_secs")]
    pub partial_train_interval_secs: u64,

    #[serde(default = "default_cache_refresh_interval_secs")]
    pub cache_refresh_interval_secs: u64,

    #[serde(default = "default_evaluation_interval_secs")]
    pub evaluation_interval_secs: u64,

    /// K of Precision@K / Recall@K
    #[serde(default = "default_evaluation_k")]
    pub evaluation_k: usize,

    #[serde(default = "default_job_max_retries")]
    pub job_max_retries: u32,

    #[serde(default = "default_job_retry_delay_secs")]
    pub job_retry_delay_secs: u64,

    #[serde(default = "default_als_factors")]
    pub als_factors: usize,

    #[serde(default = "default_als_iterations")]
    pub als_iterations: usize,

    #[serde(default = "default_als_regularization")]
    pub als_regularization: f32,

    #[serde(default = "default_als_alpha")]
    pub als_alpha: f32,

    #[serde(default = "default_hybrid_components")]
    pub hybrid_components: usize,

    #[serde(default = "default_hybrid_learning_rate")]
    pub hybrid_learning_rate: f32,

    #[serde(default = "default_hybrid_full_epochs")]
    pub hybrid_full_epochs: usize,

    #[serde(default = "default_hybrid_partial_epochs")]
    pub hybrid_partial_epochs: usize,
}

fn default_cache_ttl_secs() -> u64 {
    3600
}

fn default_recommendations_limit() -> usize {
    3
}

fn default_fresh_window_days() -> i64 {
    30
}

fn default_full_train_interval_secs() -> u64 {
    24 * 3600
}

fn default_partial_train_interval_secs() -> u64 {
    15 * 60
}

fn default_cache_refresh_interval_secs() -> u64 {
    24 * 3600
}

fn default_evaluation_interval_secs() -> u64 {
    3600
}

fn default_evaluation_k() -> usize {
    3
}

fn default_job_max_retries() -> u32 {
    3
}

fn default_job_retry_delay_secs() -> u64 {
    60
}

fn default_als_factors() -> usize {
    20
}

fn default_als_iterations() -> usize {
    10
}

fn default_als_regularization() -> f32 {
    0.01
}

fn default_als_alpha() -> f32 {
    40.0
}

fn default_hybrid_components() -> usize {
    20
}

fn default_hybrid_learning_rate() -> f32 {
    0.05
}

fn default_hybrid_full_epochs() -> usize {
    10
}

fn default_hybrid_partial_epochs() -> usize {
    5
}

impl Default for Config {
    fn default() -> Self {
        Self {
            model_dir: None,
            redis_url: None,
            data_dir: None,
            session_dir: None,
            cache_ttl_secs: default_cache_ttl_secs(),
            recommendations_limit: default_recommendations_limit(),
            fresh_window_days: default_fresh_window_days(),
            full_train_interval_secs: default_full_train_interval_secs(),
            partial_train_interval_secs: default_partial_train_interval_secs(),
            cache_refresh_interval_secs: default_cache_refresh_interval_secs(),
            evaluation_interval_secs: default_evaluation_interval_secs(),
            evaluation_k: default_evaluation_k(),
            job_max_retries: default_job_max_retries(),
            job_retry_delay_secs: default_job_retry_delay_secs(),
            als_factors: default_als_factors(),
            als_iterations: default_als_iterations(),
            als_regularization: default_als_regularization(),
            als_alpha: default_als_alpha(),
            hybrid_components: default_hybrid_components(),
            hybrid_learning_rate: default_hybrid_learning_rate(),
            hybrid_full_epochs: default_hybrid_full_epochs(),
            hybrid_partial_epochs: default_hybrid_partial_epochs(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        let config = envy::prefixed(ENV_PREFIX)
            .from_env::<Config>()
            .context("Failed to load config")?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from explicit `RECS_*` pairs
    pub fn from_vars(vars: impl IntoIterator<Item = (String, String)>) -> anyhow::Result<Self> {
        let config: Config = envy::prefixed(ENV_PREFIX)
            .from_iter(vars)
            .context("Failed to load config")?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that parse but cannot be used
    pub fn validate(&self) -> anyhow::Result<()> {
        self.fresh_window()?;
        Ok(())
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn job_retry_delay(&self) -> Duration {
        Duration::from_secs(self.job_retry_delay_secs)
    }

    pub fn fresh_window(&self) -> anyhow::Result<chrono::Duration> {
        if self.fresh_window_days < 0 {
            bail!(
                "RECS_FRESH_WINDOW_DAYS must not be negative, got {}",
                self.fresh_window_days
            );
        }
        chrono::Duration::try_days(self.fresh_window_days).with_context(|| {
            format!(
                "RECS_FRESH_WINDOW_DAYS out of range: {}",
                self.fresh_window_days
            )
        })
    }

    /// Hyperparameters of both model families
    pub fn model_config(&self) -> ModelConfig {
        ModelConfig {
            als: AlsConfig {
                factors: self.als_factors,
                iterations: self.als_iterations,
                regularization: self.als_regularization,
                alpha: self.als_alpha,
                ..AlsConfig::default()
            },
            hybrid: HybridConfig {
                components: self.hybrid_components,
                learning_rate: self.hybrid_learning_rate,
                full_epochs: self.hybrid_full_epochs,
                partial_epochs: self.hybrid_partial_epochs,
                ..HybridConfig::default()
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn var(key: &str, value: &str) -> (String, String) {
        (key.to_string(), value.to_string())
    }

    #[test]
    fn test_empty_environment_matches_default() {
        let config = Config::from_vars(std::iter::empty()).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.cache_ttl_secs, 3600);
        assert_eq!(config.recommendations_limit, 3);
        assert_eq!(config.fresh_window_days, 30);
        assert_eq!(config.partial_train_interval_secs, 900);
        assert_eq!(config.job_max_retries, 3);
        assert!(config.model_dir.is_none());
        assert!(config.redis_url.is_none());
    }

    #[test]
    fn test_prefixed_overrides() {
        let config = Config::from_vars([
            var("RECS_CACHE_TTL_SECS", "60"),
            var("RECS_REDIS_URL", "redis://cache:6379"),
            var("RECS_HYBRID_PARTIAL_EPOCHS", "2"),
            var("UNRELATED", "ignored"),
        ])
        .unwrap();

        assert_eq!(config.cache_ttl(), Duration::from_secs(60));
        assert_eq!(config.redis_url.as_deref(), Some("redis://cache:6379"));
        assert_eq!(config.model_config().hybrid.partial_epochs, 2);
        assert_eq!(config.model_config().als.factors, 20);
    }

    #[test]
    fn test_invalid_value_is_an_error() {
        assert!(Config::from_vars([var("RECS_EVALUATION_K", "three")]).is_err());
    }

    #[test]
    fn test_fresh_window_out_of_range_is_an_error() {
        let huge = i64::MAX.to_string();
        assert!(Config::from_vars([var("RECS_FRESH_WINDOW_DAYS", &huge)]).is_err());
        assert!(Config::from_vars([var("RECS_FRESH_WINDOW_DAYS", "-1")]).is_err());

        let config = Config {
            fresh_window_days: i64::MAX,
            ..Config::default()
        };
        assert!(config.fresh_window().is_err());
        assert_eq!(
            Config::default().fresh_window().unwrap(),
            chrono::Duration::days(30)
        );
    }
}
