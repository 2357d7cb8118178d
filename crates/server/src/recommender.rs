//! # Recommendation Server
//!
//! Serves a ranked list for one user and one model family:
//! 1. Resolve the family (explicit parameter or selector)
//! 2. Serve the cached list when one is live
//! 3. Fall back to the popularity list when there is no artifact or the
//!    user is unknown to it
//! 4. Otherwise score the user's live interaction row, drop watched
//!    movies, truncate and blend in fresh movies
//! 5. Log a session and cache the response
//!
//! Cache hits never create a session.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use data_loader::{Interaction, InteractionAggregator, MovieId, resolve_weights};
use models::{Family, ModelArtifact};
use pipeline::filters::FreshnessBlender;
use pipeline::{Candidate, CandidateOrigin, FilterPipeline, UserContext, serving_pipeline};

use crate::context::AppContext;
use crate::metrics::FallbackReason;
use crate::session::{RecommendationSession, Source};

/// Body returned for a recommendation request, and the cached value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationResponse {
    pub source: Source,
    pub recommendations: Vec<MovieId>,
    pub session_id: Uuid,
}

pub struct RecommendationServer {
    ctx: Arc<AppContext>,
    aggregator: InteractionAggregator,
    pipeline: FilterPipeline,
}

impl RecommendationServer {
    pub fn new(ctx: Arc<AppContext>) -> Self {
        Self::with_blender(ctx, FreshnessBlender::new())
    }

    /// Server with a specific freshness sampler
    pub fn with_blender(ctx: Arc<AppContext>, blender: FreshnessBlender) -> Self {
        let aggregator = InteractionAggregator::new(ctx.interactions.clone());
        Self {
            ctx,
            aggregator,
            pipeline: serving_pipeline(blender),
        }
    }

    /// Main entry point: recommendations for `user_id`.
    ///
    /// `model` names a family; anything else lets the selector decide.
    /// `limit` defaults to the configured list length.
    #[instrument(skip(self))]
    pub async fn get_recommendations(
        &self,
        user_id: &str,
        model: Option<&str>,
        limit: Option<usize>,
    ) -> Result<RecommendationResponse> {
        let family = self.ctx.selector.select(user_id, model);
        let limit = limit.unwrap_or(self.ctx.config.recommendations_limit);

        let cached = self
            .ctx
            .cache
            .get(user_id, family)
            .await
            .context("Failed to read recommendation cache")?;
        if let Some(payload) = cached {
            match serde_json::from_str::<RecommendationResponse>(&payload) {
                Ok(response) => {
                    self.ctx.metrics.cache_hit();
                    debug!("Cache hit for user {} ({})", user_id, family);
                    return Ok(response);
                }
                Err(e) => warn!("Discarding unreadable cache entry for {}: {}", user_id, e),
            }
        }

        self.ctx.metrics.cache_miss();
        self.serve_and_cache(user_id, family, limit).await
    }

    /// Compute a fresh list, log its session and overwrite the cache entry
    async fn serve_and_cache(
        &self,
        user_id: &str,
        family: Family,
        limit: usize,
    ) -> Result<RecommendationResponse> {
        let start_time = Instant::now();
        let (source, recommendations) = self.compute(user_id, family, limit).await?;
        self.ctx
            .metrics
            .recommendation_served(source.as_str(), start_time.elapsed());

        let session = RecommendationSession::new(user_id, family, source, recommendations);
        self.ctx
            .sessions
            .create_session(&session)
            .await
            .context("Failed to log recommendation session")?;

        let response = RecommendationResponse {
            source,
            recommendations: session.recommendations,
            session_id: session.session_id,
        };
        let payload = serde_json::to_string(&response)?;
        self.ctx
            .cache
            .put(user_id, family, payload, self.ctx.config.cache_ttl())
            .await
            .context("Failed to write recommendation cache")?;

        info!(
            "Served {} recommendations to user {} from {} (session {}) in {:.2?}",
            response.recommendations.len(),
            user_id,
            source,
            response.session_id,
            start_time.elapsed()
        );
        Ok(response)
    }

    async fn compute(
        &self,
        user_id: &str,
        family: Family,
        limit: usize,
    ) -> Result<(Source, Vec<MovieId>)> {
        let Some(artifact) = self.ctx.registry.get(family) else {
            return self.popular(user_id, limit, FallbackReason::NoModel).await;
        };
        if !artifact.knows_user(user_id) {
            return self.popular(user_id, limit, FallbackReason::NewUser).await;
        }

        let interactions = self
            .aggregator
            .user_interactions(user_id)
            .await
            .context("Failed to read user interactions")?;
        let watched = watched_movies(&interactions);
        let live_row = artifact.live_row(&resolve_weights(&interactions));

        let ranked = artifact
            .recommend(user_id, &live_row, limit + watched.len())?
            .unwrap_or_default();
        let candidates: Vec<Candidate> = ranked
            .into_iter()
            .map(|(movie_id, score)| Candidate::new(movie_id, CandidateOrigin::Model, score))
            .collect();

        let fresh = self.fresh_movies(&artifact).await?;
        let context = UserContext::new(user_id, limit)
            .with_watched(watched)
            .with_fresh_movies(fresh);
        let selected = self.pipeline.apply(candidates, &context)?;

        Ok((
            Source::from(family),
            selected.into_iter().map(|c| c.movie_id).collect(),
        ))
    }

    async fn popular(
        &self,
        user_id: &str,
        limit: usize,
        reason: FallbackReason,
    ) -> Result<(Source, Vec<MovieId>)> {
        self.ctx.metrics.popular_fallback(reason);
        info!(
            "Serving popular movies to user {} (reason: {})",
            user_id,
            reason.as_str()
        );
        let movies = self
            .ctx
            .catalog
            .top_rated(limit)
            .await
            .context("Failed to read catalog")?;
        Ok((Source::Popular, movies))
    }

    /// Recently created movies the artifact has no interactions for
    async fn fresh_movies(&self, artifact: &ModelArtifact) -> Result<Vec<MovieId>> {
        let window = self.ctx.config.fresh_window()?;
        let since = Utc::now()
            .checked_sub_signed(window)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let recent = self
            .ctx
            .catalog
            .created_since(since)
            .await
            .context("Failed to read catalog")?;
        Ok(recent
            .into_iter()
            .map(|movie| movie.id)
            .filter(|id| !artifact.knows_movie(id))
            .collect())
    }

    /// Append an interaction and drop the user's cached lists
    #[instrument(skip(self, interaction), fields(user_id = %interaction.user_id))]
    pub async fn record_interaction(&self, interaction: Interaction) -> Result<()> {
        interaction.validate().context("Rejected interaction")?;
        let user_id = interaction.user_id.clone();
        self.ctx
            .interactions
            .record(interaction)
            .await
            .context("Failed to record interaction")?;
        self.ctx
            .cache
            .invalidate(&user_id)
            .await
            .context("Failed to invalidate recommendation cache")?;
        Ok(())
    }

    /// Recompute and re-cache both families for every user with watch history.
    ///
    /// A failing user is logged and skipped. Returns the number of lists
    /// refreshed.
    #[instrument(skip(self))]
    pub async fn refresh_all(&self) -> Result<usize> {
        let users = self
            .ctx
            .interactions
            .active_users()
            .await
            .context("Failed to list active users")?;
        let limit = self.ctx.config.recommendations_limit;

        let mut refreshed = 0;
        for user_id in &users {
            for family in Family::ALL {
                match self.serve_and_cache(user_id, family, limit).await {
                    Ok(_) => refreshed += 1,
                    Err(e) => warn!("Failed to refresh {} for user {}: {:#}", family, user_id, e),
                }
            }
        }
        info!(
            "Refreshed {} cached lists for {} users",
            refreshed,
            users.len()
        );
        Ok(refreshed)
    }
}

fn watched_movies(interactions: &[Interaction]) -> HashSet<MovieId> {
    interactions
        .iter()
        .filter(|i| i.is_watch())
        .map(|i| i.movie_id.clone())
        .collect()
}
