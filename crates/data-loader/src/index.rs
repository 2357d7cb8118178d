//! Matrix Builder: index mappings and sparse user-item matrices.
//!
//! A full build assigns dense indices to the sorted user and movie id sets,
//! so two builds over the same interactions are identical. An incremental
//! build appends unseen ids in encounter order and never moves an index that
//! was already handed out; previously persisted model weights stay aligned.
//!
//! Two matrix layouts are produced from the same cells: compressed rows for
//! the latent-factor model and coordinate triplets for the hybrid model.

use crate::types::{MovieId, UserId, WeightedInteraction};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

// =============================================================================
// Index Mapping
// =============================================================================

/// Bijection between entity ids and dense matrix indices
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndexMapping {
    /// Position is the index; doubles as `idx_to_user`
    user_ids: Vec<UserId>,
    /// Position is the index; doubles as `idx_to_movie`
    movie_ids: Vec<MovieId>,
    user_to_idx: HashMap<UserId, usize>,
    movie_to_idx: HashMap<MovieId, usize>,
}

impl IndexMapping {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn user_idx(&self, user_id: &str) -> Option<usize> {
        self.user_to_idx.get(user_id).copied()
    }

    pub fn movie_idx(&self, movie_id: &str) -> Option<usize> {
        self.movie_to_idx.get(movie_id).copied()
    }

    pub fn idx_to_movie(&self, idx: usize) -> Option<&MovieId> {
        self.movie_ids.get(idx)
    }

    pub fn idx_to_user(&self, idx: usize) -> Option<&UserId> {
        self.user_ids.get(idx)
    }

    pub fn contains_user(&self, user_id: &str) -> bool {
        self.user_to_idx.contains_key(user_id)
    }

    pub fn contains_movie(&self, movie_id: &str) -> bool {
        self.movie_to_idx.contains_key(movie_id)
    }

    pub fn num_users(&self) -> usize {
        self.user_ids.len()
    }

    pub fn num_movies(&self) -> usize {
        self.movie_ids.len()
    }

    pub fn movie_ids(&self) -> &[MovieId] {
        &self.movie_ids
    }

    pub fn user_ids(&self) -> &[UserId] {
        &self.user_ids
    }

    /// Index for `user_id`, appending it when unseen
    fn intern_user(&mut self, user_id: &str) -> usize {
        if let Some(&idx) = self.user_to_idx.get(user_id) {
            return idx;
        }
        let idx = self.user_ids.len();
        self.user_ids.push(user_id.to_string());
        self.user_to_idx.insert(user_id.to_string(), idx);
        idx
    }

    /// Index for `movie_id`, appending it when unseen
    fn intern_movie(&mut self, movie_id: &str) -> usize {
        if let Some(&idx) = self.movie_to_idx.get(movie_id) {
            return idx;
        }
        let idx = self.movie_ids.len();
        self.movie_ids.push(movie_id.to_string());
        self.movie_to_idx.insert(movie_id.to_string(), idx);
        idx
    }
}

// =============================================================================
// Sparse Matrices
// =============================================================================

/// Compressed sparse row matrix of interaction weights
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CsrMatrix {
    pub rows: usize,
    pub cols: usize,
    /// Row `r` occupies `indices[indptr[r]..indptr[r + 1]]`
    pub indptr: Vec<usize>,
    pub indices: Vec<usize>,
    pub data: Vec<f32>,
}

/// Coordinate (triplet) matrix of interaction weights
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CooMatrix {
    pub rows: usize,
    pub cols: usize,
    pub row: Vec<usize>,
    pub col: Vec<usize>,
    pub data: Vec<f32>,
}

impl CsrMatrix {
    /// Build from cells keyed by (row, col); keys are unique by construction
    fn from_cells(rows: usize, cols: usize, cells: &BTreeMap<(usize, usize), f32>) -> Self {
        let mut indptr = vec![0; rows + 1];
        let mut indices = Vec::with_capacity(cells.len());
        let mut data = Vec::with_capacity(cells.len());

        for (&(r, c), &v) in cells {
            indptr[r + 1] += 1;
            indices.push(c);
            data.push(v);
        }
        for r in 0..rows {
            indptr[r + 1] += indptr[r];
        }

        Self {
            rows,
            cols,
            indptr,
            indices,
            data,
        }
    }

    fn cells(&self) -> BTreeMap<(usize, usize), f32> {
        let mut cells = BTreeMap::new();
        for r in 0..self.rows {
            for (c, v) in self.row(r) {
                cells.insert((r, c), v);
            }
        }
        cells
    }

    /// Number of stored cells
    pub fn nnz(&self) -> usize {
        self.data.len()
    }

    /// Nonzero (column, weight) pairs of one row
    pub fn row(&self, r: usize) -> impl Iterator<Item = (usize, f32)> + '_ {
        let (start, end) = if r < self.rows {
            (self.indptr[r], self.indptr[r + 1])
        } else {
            (0, 0)
        };
        self.indices[start..end]
            .iter()
            .copied()
            .zip(self.data[start..end].iter().copied())
    }

    pub fn get(&self, r: usize, c: usize) -> f32 {
        self.row(r).find(|&(col, _)| col == c).map_or(0.0, |(_, v)| v)
    }

    /// Row-major (row, col, weight) listing
    pub fn to_coo(&self) -> CooMatrix {
        let mut coo = CooMatrix {
            rows: self.rows,
            cols: self.cols,
            ..CooMatrix::default()
        };
        for r in 0..self.rows {
            for (c, v) in self.row(r) {
                coo.row.push(r);
                coo.col.push(c);
                coo.data.push(v);
            }
        }
        coo
    }

    /// Per-column (row, weight) lists, i.e. the transpose in list form
    pub fn columns(&self) -> Vec<Vec<(usize, f32)>> {
        let mut columns = vec![Vec::new(); self.cols];
        for r in 0..self.rows {
            for (c, v) in self.row(r) {
                columns[c].push((r, v));
            }
        }
        columns
    }
}

impl CooMatrix {
    pub fn nnz(&self) -> usize {
        self.data.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, usize, f32)> + '_ {
        self.row
            .iter()
            .zip(&self.col)
            .zip(&self.data)
            .map(|((&r, &c), &v)| (r, c, v))
    }
}

/// The interaction matrix in both layouts the two model families consume
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InteractionMatrix {
    pub csr: CsrMatrix,
    pub coo: CooMatrix,
}

impl InteractionMatrix {
    fn from_cells(rows: usize, cols: usize, cells: &BTreeMap<(usize, usize), f32>) -> Self {
        let csr = CsrMatrix::from_cells(rows, cols, cells);
        let coo = csr.to_coo();
        Self { csr, coo }
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.csr.rows, self.csr.cols)
    }

    pub fn nnz(&self) -> usize {
        self.csr.nnz()
    }
}

// =============================================================================
// Matrix Builder
// =============================================================================

/// Builds and extends interaction matrices together with their mappings
pub struct MatrixBuilder;

impl MatrixBuilder {
    /// Full build from scratch.
    ///
    /// Ids are sorted before indices are assigned. A pair that appears more
    /// than once keeps its last weight.
    pub fn build(interactions: &[WeightedInteraction]) -> (InteractionMatrix, IndexMapping) {
        let users: BTreeSet<&str> = interactions.iter().map(|i| i.user_id.as_str()).collect();
        let movies: BTreeSet<&str> = interactions.iter().map(|i| i.movie_id.as_str()).collect();

        let mut mapping = IndexMapping::new();
        for user in users {
            mapping.intern_user(user);
        }
        for movie in movies {
            mapping.intern_movie(movie);
        }

        let mut cells = BTreeMap::new();
        for interaction in interactions {
            let r = mapping.user_to_idx[&interaction.user_id];
            let c = mapping.movie_to_idx[&interaction.movie_id];
            cells.insert((r, c), interaction.weight);
        }

        let matrix =
            InteractionMatrix::from_cells(mapping.num_users(), mapping.num_movies(), &cells);
        (matrix, mapping)
    }

    /// Incremental build on top of an existing snapshot.
    ///
    /// Unseen ids are appended in encounter order. The matrix is widened to
    /// the new shape and the new weights are added to the existing cells.
    pub fn extend(
        interactions: &[WeightedInteraction],
        existing_mapping: &IndexMapping,
        existing_matrix: &InteractionMatrix,
    ) -> (InteractionMatrix, IndexMapping) {
        let mut mapping = existing_mapping.clone();
        let mut cells = existing_matrix.csr.cells();

        for interaction in interactions {
            let r = mapping.intern_user(&interaction.user_id);
            let c = mapping.intern_movie(&interaction.movie_id);
            *cells.entry((r, c)).or_insert(0.0) += interaction.weight;
        }

        let matrix =
            InteractionMatrix::from_cells(mapping.num_users(), mapping.num_movies(), &cells);
        (matrix, mapping)
    }

    /// Matrix holding only `interactions`, shaped to `mapping`.
    ///
    /// Used for the new interaction mass of an incremental fit. Every id must
    /// already be present in `mapping`; unknown ids are skipped.
    pub fn delta(
        interactions: &[WeightedInteraction],
        mapping: &IndexMapping,
    ) -> InteractionMatrix {
        let mut cells = BTreeMap::new();
        for interaction in interactions {
            if let (Some(r), Some(c)) = (
                mapping.user_idx(&interaction.user_id),
                mapping.movie_idx(&interaction.movie_id),
            ) {
                *cells.entry((r, c)).or_insert(0.0) += interaction.weight;
            }
        }
        InteractionMatrix::from_cells(mapping.num_users(), mapping.num_movies(), &cells)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triple(user: &str, movie: &str, weight: f32) -> WeightedInteraction {
        WeightedInteraction {
            user_id: user.to_string(),
            movie_id: movie.to_string(),
            weight,
        }
    }

    fn assert_bijection(matrix: &InteractionMatrix, mapping: &IndexMapping) {
        assert_eq!(matrix.shape(), (mapping.num_users(), mapping.num_movies()));
        for (idx, user) in mapping.user_ids().iter().enumerate() {
            assert_eq!(mapping.user_idx(user), Some(idx));
        }
        for (idx, movie) in mapping.movie_ids().iter().enumerate() {
            assert_eq!(mapping.movie_idx(movie), Some(idx));
            assert_eq!(mapping.idx_to_movie(idx), Some(movie));
        }
        for (r, c, _) in matrix.coo.iter() {
            assert!(mapping.idx_to_user(r).is_some());
            assert!(mapping.idx_to_movie(c).is_some());
        }
    }

    #[test]
    fn test_build_sorts_ids() {
        let (matrix, mapping) = MatrixBuilder::build(&[
            triple("u2", "m3", 1.0),
            triple("u1", "m1", 0.5),
            triple("u2", "m2", 0.3),
        ]);

        assert_eq!(mapping.user_ids(), ["u1", "u2"]);
        assert_eq!(mapping.movie_ids(), ["m1", "m2", "m3"]);
        assert_eq!(matrix.nnz(), 3);
        assert_eq!(matrix.csr.get(1, 2), 1.0);
        assert_bijection(&matrix, &mapping);
    }

    #[test]
    fn test_build_last_write_wins() {
        let (matrix, _) = MatrixBuilder::build(&[triple("u", "m", 0.5), triple("u", "m", 1.0)]);
        assert_eq!(matrix.nnz(), 1);
        assert_eq!(matrix.csr.get(0, 0), 1.0);
    }

    #[test]
    fn test_csr_and_coo_agree() {
        let (matrix, _) = MatrixBuilder::build(&[
            triple("a", "x", 1.0),
            triple("b", "y", 0.5),
            triple("b", "x", 0.8),
        ]);
        let coo: Vec<_> = matrix.coo.iter().collect();
        assert_eq!(coo, vec![(0, 0, 1.0), (1, 0, 0.8), (1, 1, 0.5)]);
        assert_eq!(matrix.csr.columns()[0], vec![(0, 1.0), (1, 0.8)]);
    }

    #[test]
    fn test_extend_preserves_existing_indices() {
        let (matrix, mapping) = MatrixBuilder::build(&[
            triple("u1", "m2", 1.0),
            triple("u3", "m1", 0.5),
        ]);

        let new = [
            triple("u9", "m9", 1.0),
            triple("u0", "m2", 0.5),
            triple("u1", "m2", 0.3),
        ];
        let (extended, extended_mapping) = MatrixBuilder::extend(&new, &mapping, &matrix);

        for user in mapping.user_ids() {
            assert_eq!(mapping.user_idx(user), extended_mapping.user_idx(user));
        }
        for movie in mapping.movie_ids() {
            assert_eq!(mapping.movie_idx(movie), extended_mapping.movie_idx(movie));
        }

        // Appended in encounter order, not re-sorted
        assert_eq!(extended_mapping.user_ids(), ["u1", "u3", "u9", "u0"]);
        assert_eq!(extended_mapping.movie_ids(), ["m1", "m2", "m9"]);

        // New mass is added on top of the prior cell
        let u1 = extended_mapping.user_idx("u1").unwrap();
        let m2 = extended_mapping.movie_idx("m2").unwrap();
        assert!((extended.csr.get(u1, m2) - 1.3).abs() < 1e-6);
        assert_bijection(&extended, &extended_mapping);
    }

    #[test]
    fn test_delta_matches_mapping_shape() {
        let (matrix, mapping) = MatrixBuilder::build(&[triple("u1", "m1", 1.0)]);
        let new = [triple("u2", "m1", 0.5)];
        let (_, extended_mapping) = MatrixBuilder::extend(&new, &mapping, &matrix);

        let delta = MatrixBuilder::delta(&new, &extended_mapping);
        assert_eq!(delta.shape(), (2, 1));
        assert_eq!(delta.nnz(), 1);
        assert_eq!(delta.csr.get(1, 0), 0.5);
    }

    #[test]
    fn test_empty_build() {
        let (matrix, mapping) = MatrixBuilder::build(&[]);
        assert_eq!(matrix.shape(), (0, 0));
        assert_eq!(mapping.num_users(), 0);
        assert_eq!(matrix.csr.indptr, vec![0]);
    }
}
