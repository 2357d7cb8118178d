//! Item Feature Matrix: multi-label one-hot encoding of item genres.
//!
//! Rows are aligned to `movie_to_idx` of the mapping the matrix was built
//! against. The matrix is rebuilt on every full training and left as is by
//! incremental runs, so items added since then have no genre features until
//! the next full train.

use data_loader::{IndexMapping, Movie};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use tracing::warn;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ItemFeatureMatrix {
    /// Sorted genre vocabulary; position is the feature column
    genres: Vec<String>,
    /// Active feature columns per item row
    rows: Vec<Vec<usize>>,
}

impl ItemFeatureMatrix {
    /// Encode the genres of every mapped movie.
    ///
    /// Mapped movies missing from the catalog get an empty row.
    pub fn build(mapping: &IndexMapping, movies: &[Movie]) -> Self {
        let vocabulary: BTreeSet<&str> = movies
            .iter()
            .flat_map(|m| m.genres.iter().map(String::as_str))
            .collect();
        let genres: Vec<String> = vocabulary.into_iter().map(str::to_string).collect();
        let column: HashMap<&str, usize> = genres
            .iter()
            .enumerate()
            .map(|(idx, g)| (g.as_str(), idx))
            .collect();

        let mut rows = vec![Vec::new(); mapping.num_movies()];
        for movie in movies {
            if let Some(idx) = mapping.movie_idx(&movie.id) {
                let mut active: Vec<usize> = movie
                    .genres
                    .iter()
                    .filter_map(|g| column.get(g.as_str()).copied())
                    .collect();
                active.sort_unstable();
                active.dedup();
                rows[idx] = active;
            }
        }

        Self { genres, rows }
    }

    pub fn num_items(&self) -> usize {
        self.rows.len()
    }

    pub fn num_features(&self) -> usize {
        self.genres.len()
    }

    pub fn genres(&self) -> &[String] {
        &self.genres
    }

    /// Active feature columns of one item; empty for rows out of range
    pub fn row(&self, item: usize) -> &[usize] {
        self.rows.get(item).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn get(&self, item: usize, feature: usize) -> bool {
        self.row(item).contains(&feature)
    }

    /// Pad with empty rows or truncate so there is exactly one row per item.
    ///
    /// The item count of the interaction matrix is authoritative; a mismatch
    /// means the catalog or mapping moved since the features were built.
    pub fn conform(&mut self, num_items: usize) {
        if self.rows.len() == num_items {
            return;
        }
        warn!(
            "Item feature rows ({}) do not match item count ({}), resizing",
            self.rows.len(),
            num_items
        );
        self.rows.resize(num_items, Vec::new());
    }
}
