//! # Data Loader Crate
//!
//! Reads implicit feedback from the interaction stores and the catalog, and
//! turns it into the indexed sparse matrices the models train on.
//!
//! ## Main Components
//!
//! - **types**: Domain types (Interaction, Movie, WeightedInteraction)
//! - **store**: Traits for the collaborator stores, plus in-memory versions
//! - **aggregator**: Weighted (user, item, weight) triples from raw interactions
//! - **index**: IndexMapping and the full / incremental MatrixBuilder
//! - **parser**: JSON-lines dataset files for local runs
//! - **error**: Error types for data loading
//!
//! ## Example Usage
//!
//! ```ignore
//! use data_loader::{resolve_weights, Dataset, InteractionAggregator, MatrixBuilder};
//!
//! let dataset = Dataset::load_from_dir(Path::new("data"))?;
//! let store = Arc::new(MemoryInteractionStore::with_records(dataset.interactions));
//! let interactions = InteractionAggregator::new(store).load_interactions(None).await?;
//!
//! let (matrix, mapping) = MatrixBuilder::build(&resolve_weights(&interactions));
//! println!("{} users x {} movies", mapping.num_users(), mapping.num_movies());
//! ```

pub mod aggregator;
pub mod error;
pub mod index;
pub mod parser;
pub mod store;
pub mod types;

pub use aggregator::{InteractionAggregator, latest_timestamp, resolve_weights};
pub use error::{DataLoadError, Result};
pub use index::{CooMatrix, CsrMatrix, IndexMapping, InteractionMatrix, MatrixBuilder};
pub use parser::Dataset;
pub use store::{Catalog, InteractionStore, MemoryCatalog, MemoryInteractionStore};
pub use types::{
    Interaction, InteractionKind, Movie, MovieId, UserId, WeightedInteraction,
};

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_store_to_matrix() {
        let ts = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let store = Arc::new(MemoryInteractionStore::with_records(vec![
            Interaction::watch("u2", "m1", true, ts),
            Interaction::watch("u1", "m2", false, ts),
            Interaction::bookmark("u1", "m1", ts),
        ]));

        let interactions = InteractionAggregator::new(store)
            .load_interactions(None)
            .await
            .unwrap();
        let (matrix, mapping) = MatrixBuilder::build(&resolve_weights(&interactions));

        assert_eq!(matrix.shape(), (2, 2));
        assert_eq!(matrix.nnz(), 3);
        let u1 = mapping.user_idx("u1").unwrap();
        let m1 = mapping.movie_idx("m1").unwrap();
        assert_eq!(matrix.csr.get(u1, m1), 0.3);
    }
}
