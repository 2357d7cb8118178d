//! Candidate and per-request user context passed through the filters.

use data_loader::{MovieId, UserId};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Where a candidate entered the list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CandidateOrigin {
    /// Ranked by a trained model
    Model,
    /// Recently added movie blended in for exposure
    Fresh,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub movie_id: MovieId,
    pub origin: CandidateOrigin,
    /// Model score; fresh items carry 0.0
    pub score: f32,
}

impl Candidate {
    pub fn new(movie_id: impl Into<MovieId>, origin: CandidateOrigin, score: f32) -> Self {
        Self {
            movie_id: movie_id.into(),
            origin,
            score,
        }
    }

    pub fn is_fresh(&self) -> bool {
        self.origin == CandidateOrigin::Fresh
    }
}

/// What the filters need to know about the requesting user
#[derive(Debug, Clone, Default)]
pub struct UserContext {
    pub user_id: UserId,
    /// Movies the user has a watch event for
    pub watched_movies: HashSet<MovieId>,
    /// Requested list length
    pub limit: usize,
    /// Recently added movies nobody has interacted with yet
    pub fresh_movies: Vec<MovieId>,
}

impl UserContext {
    pub fn new(user_id: impl Into<UserId>, limit: usize) -> Self {
        Self {
            user_id: user_id.into(),
            limit,
            ..Self::default()
        }
    }

    pub fn with_watched(mut self, movies: impl IntoIterator<Item = MovieId>) -> Self {
        self.watched_movies.extend(movies);
        self
    }

    pub fn with_fresh_movies(mut self, movies: Vec<MovieId>) -> Self {
        self.fresh_movies = movies;
        self
    }

    pub fn has_watched(&self, movie_id: &str) -> bool {
        self.watched_movies.contains(movie_id)
    }
}
