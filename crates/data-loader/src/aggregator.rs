//! Interaction Aggregator.
//!
//! Reads the three interaction collections and turns them into weighted
//! (user, item, weight) triples. The same resolution rule is used for the
//! training matrix and for the live per-user row at serving time:
//!
//! 1. within one kind, the later record wins
//! 2. likes override watches, whatever their timestamps
//! 3. bookmarks only fill pairs that have no watch or like

use crate::error::Result;
use crate::store::InteractionStore;
use crate::types::{Interaction, MovieId, UserId, WeightedInteraction};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, instrument};

/// Loads interactions from the collaborator stores
#[derive(Clone)]
pub struct InteractionAggregator {
    store: Arc<dyn InteractionStore>,
}

impl InteractionAggregator {
    pub fn new(store: Arc<dyn InteractionStore>) -> Self {
        Self { store }
    }

    /// Read watches, likes and bookmarks, newer than `since` when given.
    ///
    /// Returns an empty vector when there is nothing to read. Records are
    /// ordered watches, likes, bookmarks and by timestamp within each kind.
    #[instrument(skip(self))]
    pub async fn load_interactions(
        &self,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<Interaction>> {
        let (watches, likes, bookmarks) = tokio::try_join!(
            self.store.watches(since),
            self.store.likes(since),
            self.store.bookmarks(since),
        )?;

        debug!(
            "Loaded {} watches, {} likes, {} bookmarks",
            watches.len(),
            likes.len(),
            bookmarks.len()
        );

        let mut interactions = Vec::with_capacity(watches.len() + likes.len() + bookmarks.len());
        interactions.extend(watches);
        interactions.extend(likes);
        interactions.extend(bookmarks);
        sort_for_resolution(&mut interactions);
        Ok(interactions)
    }

    /// Every interaction of a single user, read live from the stores
    pub async fn user_interactions(&self, user_id: &str) -> Result<Vec<Interaction>> {
        let mut interactions = self.store.user_interactions(user_id).await?;
        sort_for_resolution(&mut interactions);
        Ok(interactions)
    }
}

fn resolution_order(a: &Interaction, b: &Interaction) -> std::cmp::Ordering {
    a.kind
        .precedence()
        .cmp(&b.kind.precedence())
        .then_with(|| a.timestamp.cmp(&b.timestamp))
}

fn sort_for_resolution(interactions: &mut [Interaction]) {
    interactions.sort_by(resolution_order);
}

/// Collapse interactions into one weight per (user, item) pair.
///
/// Input is put in resolution order first (stable, so equal timestamps keep
/// their relative order). Output order follows the first appearance of each
/// pair, which keeps encounter order meaningful for incremental indexing.
pub fn resolve_weights(interactions: &[Interaction]) -> Vec<WeightedInteraction> {
    let mut ordered: Vec<&Interaction> = interactions.iter().collect();
    ordered.sort_by(|a, b| resolution_order(a, b));

    let mut order: Vec<(UserId, MovieId)> = Vec::new();
    let mut weights: HashMap<(UserId, MovieId), f32> = HashMap::new();

    for interaction in ordered {
        let key = (interaction.user_id.clone(), interaction.movie_id.clone());
        match weights.get_mut(&key) {
            Some(_) if interaction.kind.is_weak() => {}
            Some(weight) => *weight = interaction.weight(),
            None => {
                weights.insert(key.clone(), interaction.weight());
                order.push(key);
            }
        }
    }

    order
        .into_iter()
        .map(|key| {
            let weight = weights[&key];
            WeightedInteraction {
                user_id: key.0,
                movie_id: key.1,
                weight,
            }
        })
        .collect()
}

/// Newest timestamp among the given interactions
pub fn latest_timestamp(interactions: &[Interaction]) -> Option<DateTime<Utc>> {
    interactions.iter().map(|i| i.timestamp).max()
}
