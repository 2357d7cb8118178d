//! Filter to remove movies the user has already watched.
//!
//! Runs first: the model is asked for `limit + |watched|` candidates so
//! that enough remain after this filter.

use crate::traits::Filter;
use crate::types::{Candidate, UserContext};
use anyhow::Result;

/// Removes candidates that the user has a watch event for.
///
/// Likes and bookmarks alone do not count as watched.
pub struct AlreadyWatchedFilter;

impl Filter for AlreadyWatchedFilter {
    fn name(&self) -> &str {
        "AlreadyWatchedFilter"
    }

    fn apply(
        &self,
        candidates: Vec<Candidate>,
        context: &UserContext,
    ) -> Result<Vec<Candidate>> {
        let filtered: Vec<Candidate> = candidates
            .into_iter()
            .filter(|candidate| !context.has_watched(&candidate.movie_id))
            .collect();
        Ok(filtered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CandidateOrigin;

    #[test]
    fn test_already_watched_filter() {
        let context = UserContext::new("u1", 3)
            .with_watched(["m100".to_string(), "m200".to_string()]);

        let candidates = vec![
            Candidate::new("m100", CandidateOrigin::Model, 0.9),
            Candidate::new("m101", CandidateOrigin::Model, 0.8),
            Candidate::new("m200", CandidateOrigin::Model, 0.7),
            Candidate::new("m300", CandidateOrigin::Model, 0.6),
        ];

        let filter = AlreadyWatchedFilter;
        let filtered = filter.apply(candidates, &context).unwrap();

        assert_eq!(filtered.len(), 2);
        assert_eq!(filtered[0].movie_id, "m101");
        assert_eq!(filtered[1].movie_id, "m300");
    }
}
