//! Filter implementations for the candidate pipeline.

pub mod already_watched;
pub mod freshness;
pub mod truncate;

// Re-export for convenience
pub use already_watched::AlreadyWatchedFilter;
pub use freshness::FreshnessBlender;
pub use truncate::TruncateFilter;
