//! The engine: the recommendation server, the training controller and the
//! feedback log behind one handle.

use std::sync::Arc;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use tracing::{info, instrument};
use uuid::Uuid;

use data_loader::Interaction;
use pipeline::filters::FreshnessBlender;

use crate::context::AppContext;
use crate::evaluation::{EvaluationReport, evaluate_sessions};
use crate::metrics::MetricsSnapshot;
use crate::recommender::{RecommendationResponse, RecommendationServer};
use crate::scheduler::{Job, JobRunner};
use crate::session::Feedback;
use crate::training::{TrainingController, TrainingReport};

pub struct Engine {
    ctx: Arc<AppContext>,
    recommender: RecommendationServer,
    trainer: TrainingController,
}

impl Engine {
    pub fn new(ctx: AppContext) -> Self {
        Self::with_blender(ctx, FreshnessBlender::new())
    }

    pub fn with_blender(ctx: AppContext, blender: FreshnessBlender) -> Self {
        let ctx = Arc::new(ctx);
        Self {
            recommender: RecommendationServer::with_blender(ctx.clone(), blender),
            trainer: TrainingController::new(ctx.clone()),
            ctx,
        }
    }

    pub fn context(&self) -> &AppContext {
        &self.ctx
    }

    pub async fn get_recommendations(
        &self,
        user_id: &str,
        model: Option<&str>,
        limit: Option<usize>,
    ) -> Result<RecommendationResponse> {
        self.recommender
            .get_recommendations(user_id, model, limit)
            .await
    }

    /// Log feedback on one movie of a served session
    #[instrument(skip(self))]
    pub async fn submit_feedback(&self, session_id: Uuid, movie_id: &str, liked: bool) -> Result<()> {
        self.ctx
            .sessions
            .record_feedback(&Feedback::new(session_id, movie_id, liked))
            .await
            .context("Failed to record feedback")
    }

    pub async fn record_interaction(&self, interaction: Interaction) -> Result<()> {
        self.recommender.record_interaction(interaction).await
    }

    pub async fn train(&self, partial: bool) -> Result<TrainingReport> {
        self.trainer.train(partial).await
    }

    pub async fn refresh_cache(&self) -> Result<usize> {
        self.recommender.refresh_all().await
    }

    /// Precision@K and Recall@K per family over every logged session
    #[instrument(skip(self))]
    pub async fn evaluate(&self, k: Option<usize>) -> Result<EvaluationReport> {
        let k = k.unwrap_or(self.ctx.config.evaluation_k);
        let (sessions, feedback) =
            tokio::try_join!(self.ctx.sessions.sessions(), self.ctx.sessions.feedback())
                .context("Failed to read session log")?;

        let report = evaluate_sessions(&sessions, &feedback, k);
        for (family, metrics) in &report {
            self.ctx.metrics.evaluation(*family, metrics);
            info!(
                "{}: precision@{} = {:.4}, recall@{} = {:.4} over {} sessions",
                family,
                k,
                metrics.precision_at_k,
                k,
                metrics.recall_at_k,
                metrics.sample_count
            );
        }
        Ok(report)
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.ctx.metrics.snapshot()
    }

    /// All series in the Prometheus text format
    pub fn export_metrics(&self) -> Result<String> {
        self.ctx.metrics.export()
    }
}

#[async_trait]
impl JobRunner for Engine {
    async fn run(&self, job: Job) -> Result<()> {
        match job {
            Job::Train { partial } => {
                let report = self.train(partial).await?;
                if report.has_failures() {
                    bail!("{} left families untrained: {:?}", job, report.outcomes);
                }
            }
            Job::RefreshCache => {
                self.refresh_cache().await?;
            }
            Job::Evaluate => {
                self.evaluate(None).await?;
            }
        }
        info!("Metrics after {}: {:?}", job, self.metrics());
        Ok(())
    }
}
