//! Cut the ranked list down to the requested length.

use crate::traits::Filter;
use crate::types::{Candidate, UserContext};
use anyhow::Result;

/// Keeps the first `context.limit` candidates
pub struct TruncateFilter;

impl Filter for TruncateFilter {
    fn name(&self) -> &str {
        "TruncateFilter"
    }

    fn apply(
        &self,
        mut candidates: Vec<Candidate>,
        context: &UserContext,
    ) -> Result<Vec<Candidate>> {
        candidates.truncate(context.limit);
        Ok(candidates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CandidateOrigin;

    #[test]
    fn test_keeps_head_of_list() {
        let context = UserContext::new("u1", 2);
        let candidates = (0..5)
            .map(|i| Candidate::new(format!("m{}", i), CandidateOrigin::Model, 1.0 - i as f32 / 10.0))
            .collect();

        let kept = TruncateFilter.apply(candidates, &context).unwrap();
        let ids: Vec<&str> = kept.iter().map(|c| c.movie_id.as_str()).collect();
        assert_eq!(ids, vec!["m0", "m1"]);
    }

    #[test]
    fn test_short_list_untouched() {
        let context = UserContext::new("u1", 10);
        let candidates = vec![Candidate::new("m0", CandidateOrigin::Model, 0.5)];
        assert_eq!(TruncateFilter.apply(candidates, &context).unwrap().len(), 1);
    }
}
