//! Interfaces to the collaborator stores the engine reads from.
//!
//! The interaction stores (watches, likes, bookmarks) and the catalog are
//! owned by other services. The engine only consumes them through these
//! traits; the in-memory implementations back tests, the CLI and local runs.

use crate::error::Result;
use crate::types::{Interaction, InteractionKind, Movie, MovieId, UserId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use tokio::sync::RwLock;

/// Read (and append) access to the append-only interaction collections
#[async_trait]
pub trait InteractionStore: Send + Sync {
    /// Watch events, restricted to `timestamp > since` when given
    async fn watches(&self, since: Option<DateTime<Utc>>) -> Result<Vec<Interaction>>;

    /// Likes, restricted to `timestamp > since` when given
    async fn likes(&self, since: Option<DateTime<Utc>>) -> Result<Vec<Interaction>>;

    /// Bookmarks, restricted to `timestamp > since` when given
    async fn bookmarks(&self, since: Option<DateTime<Utc>>) -> Result<Vec<Interaction>>;

    /// Every interaction of one user, across all kinds
    async fn user_interactions(&self, user_id: &str) -> Result<Vec<Interaction>>;

    /// Distinct users with at least one watch event
    async fn active_users(&self) -> Result<Vec<UserId>>;

    /// Append a new interaction record
    async fn record(&self, interaction: Interaction) -> Result<()>;
}

/// Read access to movie metadata
#[async_trait]
pub trait Catalog: Send + Sync {
    /// All movies, in catalog order
    async fn movies(&self) -> Result<Vec<Movie>>;

    /// Top `limit` movie ids by descending rating, ties in catalog order
    async fn top_rated(&self, limit: usize) -> Result<Vec<MovieId>>;

    /// Movies whose creation date is at or after `since`
    async fn created_since(&self, since: DateTime<Utc>) -> Result<Vec<Movie>>;
}

/// Interaction store held in process memory
#[derive(Debug, Default)]
pub struct MemoryInteractionStore {
    records: RwLock<Vec<Interaction>>,
}

impl MemoryInteractionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: Vec<Interaction>) -> Self {
        Self {
            records: RwLock::new(records),
        }
    }

    async fn select(
        &self,
        since: Option<DateTime<Utc>>,
        keep: impl Fn(&InteractionKind) -> bool,
    ) -> Vec<Interaction> {
        self.records
            .read()
            .await
            .iter()
            .filter(|r| keep(&r.kind))
            .filter(|r| since.is_none_or(|since| r.timestamp > since))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl InteractionStore for MemoryInteractionStore {
    async fn watches(&self, since: Option<DateTime<Utc>>) -> Result<Vec<Interaction>> {
        Ok(self
            .select(since, |k| matches!(k, InteractionKind::Watch { .. }))
            .await)
    }

    async fn likes(&self, since: Option<DateTime<Utc>>) -> Result<Vec<Interaction>> {
        Ok(self
            .select(since, |k| matches!(k, InteractionKind::Like { .. }))
            .await)
    }

    async fn bookmarks(&self, since: Option<DateTime<Utc>>) -> Result<Vec<Interaction>> {
        Ok(self.select(since, InteractionKind::is_weak).await)
    }

    async fn user_interactions(&self, user_id: &str) -> Result<Vec<Interaction>> {
        Ok(self
            .records
            .read()
            .await
            .iter()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn active_users(&self) -> Result<Vec<UserId>> {
        let users: BTreeSet<UserId> = self
            .records
            .read()
            .await
            .iter()
            .filter(|r| r.is_watch())
            .map(|r| r.user_id.clone())
            .collect();
        Ok(users.into_iter().collect())
    }

    async fn record(&self, interaction: Interaction) -> Result<()> {
        self.records.write().await.push(interaction);
        Ok(())
    }
}

/// Catalog held in process memory; insertion order is catalog order
#[derive(Debug, Default)]
pub struct MemoryCatalog {
    movies: RwLock<Vec<Movie>>,
}

impl MemoryCatalog {
    pub fn new(movies: Vec<Movie>) -> Self {
        Self {
            movies: RwLock::new(movies),
        }
    }

    pub async fn insert(&self, movie: Movie) {
        self.movies.write().await.push(movie);
    }
}

#[async_trait]
impl Catalog for MemoryCatalog {
    async fn movies(&self) -> Result<Vec<Movie>> {
        Ok(self.movies.read().await.clone())
    }

    async fn top_rated(&self, limit: usize) -> Result<Vec<MovieId>> {
        let movies = self.movies.read().await;
        let mut ranked: Vec<&Movie> = movies.iter().collect();
        // Stable sort keeps catalog order among equal ratings
        ranked.sort_by(|a, b| {
            b.rating
                .partial_cmp(&a.rating)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        Ok(ranked
            .into_iter()
            .take(limit)
            .map(|m| m.id.clone())
            .collect())
    }

    async fn created_since(&self, since: DateTime<Utc>) -> Result<Vec<Movie>> {
        Ok(self
            .movies
            .read()
            .await
            .iter()
            .filter(|m| m.creation_date >= since)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn movie(id: &str, rating: f32) -> Movie {
        Movie {
            id: id.to_string(),
            title: format!("Movie {}", id),
            genres: vec![],
            rating,
            creation_date: ts(0),
        }
    }

    #[tokio::test]
    async fn test_since_filter_is_strict() {
        let store = MemoryInteractionStore::with_records(vec![
            Interaction::watch("u1", "m1", true, ts(10)),
            Interaction::watch("u1", "m2", true, ts(20)),
            Interaction::like("u2", "m1", 9.0, ts(30)),
        ]);

        assert_eq!(store.watches(None).await.unwrap().len(), 2);
        let newer = store.watches(Some(ts(10))).await.unwrap();
        assert_eq!(newer.len(), 1);
        assert_eq!(newer[0].movie_id, "m2");
        assert!(store.likes(Some(ts(30))).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_active_users_only_count_watches() {
        let store = MemoryInteractionStore::with_records(vec![
            Interaction::watch("u2", "m1", true, ts(1)),
            Interaction::bookmark("u3", "m1", ts(2)),
            Interaction::watch("u1", "m1", false, ts(3)),
            Interaction::watch("u2", "m2", true, ts(4)),
        ]);
        assert_eq!(store.active_users().await.unwrap(), vec!["u1", "u2"]);
    }

    #[tokio::test]
    async fn test_top_rated_ties_keep_catalog_order() {
        let catalog = MemoryCatalog::new(vec![
            movie("a", 7.0),
            movie("b", 9.0),
            movie("c", 7.0),
            movie("d", 8.0),
        ]);
        let top = catalog.top_rated(3).await.unwrap();
        assert_eq!(top, vec!["b", "d", "a"]);
    }

    #[tokio::test]
    async fn test_created_since() {
        let mut fresh = movie("new", 5.0);
        fresh.creation_date = ts(0) + Duration::days(40);
        let catalog = MemoryCatalog::new(vec![movie("old", 5.0), fresh]);

        let recent = catalog.created_since(ts(0) + Duration::days(10)).await.unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].id, "new");
    }
}
