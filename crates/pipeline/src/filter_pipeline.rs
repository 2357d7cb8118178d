//! The FilterPipeline orchestrates multiple filters.
//!
//! Filters run in the order they were added, each on the output of the
//! previous one.

use crate::traits::Filter;
use crate::types::{Candidate, UserContext};
use anyhow::Result;
use tracing;

/// Chains multiple filters together into a processing pipeline.
///
/// ## Usage
/// ```ignore
/// let pipeline = FilterPipeline::new()
///     .add_filter(AlreadyWatchedFilter)
///     .add_filter(TruncateFilter)
///     .add_filter(FreshnessBlender::new());
///
/// let ranked = pipeline.apply(candidates, &context)?;
/// ```
pub struct FilterPipeline {
    filters: Vec<Box<dyn Filter>>,
}

impl FilterPipeline {
    /// Create a new empty FilterPipeline.
    pub fn new() -> Self {
        Self {
            filters: Vec::new(),
        }
    }

    /// Add a filter to the pipeline (builder pattern).
    pub fn add_filter(mut self, filter: impl Filter + 'static) -> Self {
        self.filters.push(Box::new(filter));
        self
    }

    /// Names of the filters, in application order
    pub fn filter_names(&self) -> Vec<&str> {
        self.filters.iter().map(|f| f.name()).collect()
    }

    /// Apply all filters in sequence to the candidates.
    pub fn apply(
        &self,
        candidates: Vec<Candidate>,
        context: &UserContext,
    ) -> Result<Vec<Candidate>> {
        let mut current = candidates;
        for filter in &self.filters {
            tracing::debug!(
                "Applying filter: {} (input count: {})",
                filter.name(),
                current.len()
            );
            current = filter.apply(current, context)?;
            tracing::debug!(
                "Filter applied: {} (output count: {})",
                filter.name(),
                current.len()
            );
        }
        Ok(current)
    }
}

impl Default for FilterPipeline {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filters::{AlreadyWatchedFilter, TruncateFilter};
    use crate::types::CandidateOrigin;

    #[test]
    fn test_empty_pipeline() {
        let pipeline = FilterPipeline::new();
        let context = UserContext::new("u1", 3);

        let candidates = vec![
            Candidate::new("m1", CandidateOrigin::Model, 0.9),
            Candidate::new("m2", CandidateOrigin::Model, 0.8),
        ];

        let filtered = pipeline.apply(candidates, &context).unwrap();
        assert_eq!(filtered.len(), 2);
    }

    #[test]
    fn test_filters_run_in_order() {
        let context = UserContext::new("u1", 1).with_watched(["m1".to_string()]);

        let pipeline = FilterPipeline::new()
            .add_filter(AlreadyWatchedFilter)
            .add_filter(TruncateFilter);
        assert_eq!(
            pipeline.filter_names(),
            vec!["AlreadyWatchedFilter", "TruncateFilter"]
        );

        let candidates = vec![
            Candidate::new("m1", CandidateOrigin::Model, 0.9),
            Candidate::new("m2", CandidateOrigin::Model, 0.8),
            Candidate::new("m3", CandidateOrigin::Model, 0.7),
        ];

        let filtered = pipeline.apply(candidates, &context).unwrap();
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].movie_id, "m2");
    }
}
