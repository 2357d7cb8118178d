//! Server crate for the ReelRecs recommendation engine.
//!
//! Wires the collaborator stores, the model registry, training, serving,
//! feedback evaluation and the background scheduler together.

pub mod config;
pub mod context;
pub mod engine;
pub mod evaluation;
pub mod metrics;
pub mod recommender;
pub mod registry;
pub mod scheduler;
pub mod selection;
pub mod session;
pub mod training;

pub use config::Config;
pub use context::AppContext;
pub use engine::Engine;
pub use evaluation::{EvaluationReport, FamilyMetrics, evaluate_sessions};
pub use metrics::{FallbackReason, Metrics, MetricsSnapshot};
pub use recommender::{RecommendationResponse, RecommendationServer};
pub use registry::ModelRegistry;
pub use scheduler::{Job, JobRunner, Scheduler, SchedulerConfig, SchedulerHandle};
pub use selection::{FamilySelector, HashSelector, RandomSelector};
pub use session::{
    Feedback, JsonlSessionLog, MemorySessionLog, RecommendationSession, SessionLog, Source,
};
pub use training::{TrainingController, TrainingOutcome, TrainingReport};

/// Install the `tracing` subscriber used by the binaries
pub fn init_tracing(default_filter: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
