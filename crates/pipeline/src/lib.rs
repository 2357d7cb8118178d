//! Post-scoring stages applied to a model's ranked candidates.
//!
//! This crate provides:
//! - Filter trait and implementations for candidate filtering
//! - FilterPipeline for composing filters
//!
//! ## Architecture
//! The recommendation server runs the stages in this order:
//! 1. AlreadyWatchedFilter removes movies the user has watched
//! 2. TruncateFilter cuts the list to the requested length
//! 3. FreshnessBlender swaps the tail for recently added movies
//!
//! ## Example Usage
//! ```ignore
//! use pipeline::filters::*;
//! use pipeline::{FilterPipeline, UserContext};
//!
//! let pipeline = FilterPipeline::new()
//!     .add_filter(AlreadyWatchedFilter)
//!     .add_filter(TruncateFilter)
//!     .add_filter(FreshnessBlender::new());
//!
//! let context = UserContext::new(user_id, limit).with_watched(watched);
//! let ranked = pipeline.apply(candidates, &context)?;
//! ```

pub mod filter_pipeline;
pub mod filters;
pub mod traits;
pub mod types;

// Re-export main types
pub use filter_pipeline::FilterPipeline;
pub use traits::Filter;
pub use types::{Candidate, CandidateOrigin, UserContext};

/// The serving pipeline: watched removal, truncation, freshness blending
pub fn serving_pipeline(blender: filters::FreshnessBlender) -> FilterPipeline {
    FilterPipeline::new()
        .add_filter(filters::AlreadyWatchedFilter)
        .add_filter(filters::TruncateFilter)
        .add_filter(blender)
}
