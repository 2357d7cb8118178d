//! Core domain types for interaction and catalog data.
//!
//! User and movie identifiers are opaque strings owned by the upstream
//! identity and catalog services. Interactions are immutable records; a newer
//! record for the same pair supersedes an older one, nothing is edited in place.

use crate::error::{DataLoadError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// Type Aliases
// =============================================================================

/// Identifier of a user as issued by the identity service
pub type UserId = String;

/// Identifier of a movie as issued by the catalog service
pub type MovieId = String;

// =============================================================================
// Interaction Types
// =============================================================================

/// Weight of a fully watched movie
pub const WATCH_COMPLETE_WEIGHT: f32 = 1.0;
/// Weight of a partially watched movie
pub const WATCH_PARTIAL_WEIGHT: f32 = 0.5;
/// Weight of a bookmark; only used when the pair has no stronger signal
pub const BOOKMARK_WEIGHT: f32 = 0.3;
/// Likes carry a rating on a 0-10 scale which is divided by this
pub const LIKE_RATING_SCALE: f32 = 10.0;

/// The kind of implicit signal, with the data each kind carries
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InteractionKind {
    Watch { complete: bool },
    Like { rating: f32 },
    Bookmark,
}

impl InteractionKind {
    /// Weight this signal contributes to the user-item matrix
    pub fn weight(&self) -> f32 {
        match self {
            InteractionKind::Watch { complete: true } => WATCH_COMPLETE_WEIGHT,
            InteractionKind::Watch { complete: false } => WATCH_PARTIAL_WEIGHT,
            InteractionKind::Like { rating } => rating / LIKE_RATING_SCALE,
            InteractionKind::Bookmark => BOOKMARK_WEIGHT,
        }
    }

    /// Bookmarks never override a watch or a like on the same pair
    pub fn is_weak(&self) -> bool {
        matches!(self, InteractionKind::Bookmark)
    }

    /// Ordering used when resolving a pair: watches, then likes, then bookmarks
    pub(crate) fn precedence(&self) -> u8 {
        match self {
            InteractionKind::Watch { .. } => 0,
            InteractionKind::Like { .. } => 1,
            InteractionKind::Bookmark => 2,
        }
    }
}

/// One recorded user action on a movie
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interaction {
    pub user_id: UserId,
    pub movie_id: MovieId,
    #[serde(flatten)]
    pub kind: InteractionKind,
    pub timestamp: DateTime<Utc>,
}

impl Interaction {
    pub fn watch(
        user_id: impl Into<UserId>,
        movie_id: impl Into<MovieId>,
        complete: bool,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            movie_id: movie_id.into(),
            kind: InteractionKind::Watch { complete },
            timestamp,
        }
    }

    pub fn like(
        user_id: impl Into<UserId>,
        movie_id: impl Into<MovieId>,
        rating: f32,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            movie_id: movie_id.into(),
            kind: InteractionKind::Like { rating },
            timestamp,
        }
    }

    pub fn bookmark(
        user_id: impl Into<UserId>,
        movie_id: impl Into<MovieId>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            movie_id: movie_id.into(),
            kind: InteractionKind::Bookmark,
            timestamp,
        }
    }

    pub fn weight(&self) -> f32 {
        self.kind.weight()
    }

    pub fn is_watch(&self) -> bool {
        matches!(self.kind, InteractionKind::Watch { .. })
    }

    /// Likes must carry a rating within 0-10
    pub fn validate(&self) -> Result<()> {
        if let InteractionKind::Like { rating } = self.kind {
            if !(0.0..=LIKE_RATING_SCALE).contains(&rating) {
                return Err(DataLoadError::InvalidValue {
                    field: "rating".to_string(),
                    value: rating.to_string(),
                });
            }
        }
        Ok(())
    }
}

/// A resolved (user, item, weight) triple ready for the matrix builder
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightedInteraction {
    pub user_id: UserId,
    pub movie_id: MovieId,
    pub weight: f32,
}

// =============================================================================
// Catalog Types
// =============================================================================

/// Movie metadata supplied by the catalog service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Movie {
    pub id: MovieId,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub genres: Vec<String>,
    /// Catalog rating, used to rank the popularity fallback
    #[serde(default)]
    pub rating: f32,
    pub creation_date: DateTime<Utc>,
}
