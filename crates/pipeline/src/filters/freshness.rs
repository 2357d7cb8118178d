//! Freshness blending.
//!
//! Collaborative ranking never surfaces a movie nobody has interacted with.
//! This stage replaces the tail of the list with a random sample of recently
//! added, unseen movies: `max(1, limit / 3)` of them at most, and only when
//! the list is at least that long.

use crate::traits::Filter;
use crate::types::{Candidate, CandidateOrigin, UserContext};
use anyhow::Result;
use data_loader::MovieId;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use std::collections::HashSet;
use std::sync::Mutex;
use tracing::debug;

pub struct FreshnessBlender {
    rng: Mutex<StdRng>,
}

impl FreshnessBlender {
    pub fn new() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_os_rng()),
        }
    }

    /// Deterministic sampling, for tests and replays
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    /// Most fresh movies a list of `limit` may receive
    pub fn quota(limit: usize) -> usize {
        (limit / 3).max(1)
    }
}

impl Default for FreshnessBlender {
    fn default() -> Self {
        Self::new()
    }
}

impl Filter for FreshnessBlender {
    fn name(&self) -> &str {
        "FreshnessBlender"
    }

    fn apply(
        &self,
        mut candidates: Vec<Candidate>,
        context: &UserContext,
    ) -> Result<Vec<Candidate>> {
        let listed: HashSet<&str> = candidates.iter().map(|c| c.movie_id.as_str()).collect();
        let eligible: Vec<&MovieId> = context
            .fresh_movies
            .iter()
            .filter(|id| !context.has_watched(id) && !listed.contains(id.as_str()))
            .collect();

        let count = Self::quota(context.limit).min(eligible.len());
        if count == 0 || candidates.len() < count {
            return Ok(candidates);
        }

        let sampled: Vec<MovieId> = {
            let mut rng = self
                .rng
                .lock()
                .map_err(|_| anyhow::anyhow!("freshness sampler lock poisoned"))?;
            eligible
                .choose_multiple(&mut *rng, count)
                .map(|id| (*id).clone())
                .collect()
        };

        candidates.truncate(candidates.len() - count);
        candidates.extend(
            sampled
                .into_iter()
                .map(|id| Candidate::new(id, CandidateOrigin::Fresh, 0.0)),
        );

        debug!(
            "Blended {} fresh movies into recommendations for user {}",
            count, context.user_id
        );
        Ok(candidates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ranked(n: usize) -> Vec<Candidate> {
        (0..n)
            .map(|i| Candidate::new(format!("m{}", i), CandidateOrigin::Model, 1.0))
            .collect()
    }

    fn ids(candidates: &[Candidate]) -> Vec<&str> {
        candidates.iter().map(|c| c.movie_id.as_str()).collect()
    }

    #[test]
    fn test_quota() {
        assert_eq!(FreshnessBlender::quota(1), 1);
        assert_eq!(FreshnessBlender::quota(3), 1);
        assert_eq!(FreshnessBlender::quota(6), 2);
        assert_eq!(FreshnessBlender::quota(10), 3);
    }

    #[test]
    fn test_replaces_tail_within_quota() {
        let context = UserContext::new("u1", 6)
            .with_watched(["f0".to_string()])
            .with_fresh_movies(vec!["f0".into(), "f1".into(), "f2".into(), "f3".into()]);

        for seed in 0..20 {
            let blended = FreshnessBlender::with_seed(seed)
                .apply(ranked(6), &context)
                .unwrap();

            assert_eq!(blended.len(), 6);
            assert_eq!(ids(&blended[..4]), vec!["m0", "m1", "m2", "m3"]);
            let fresh: Vec<&Candidate> = blended.iter().filter(|c| c.is_fresh()).collect();
            assert_eq!(fresh.len(), 2);
            assert!(fresh.iter().all(|c| c.movie_id != "f0"));
        }
    }

    #[test]
    fn test_single_fresh_movie() {
        let context = UserContext::new("u1", 6).with_fresh_movies(vec!["f1".into()]);
        let blended = FreshnessBlender::with_seed(1)
            .apply(ranked(6), &context)
            .unwrap();

        assert_eq!(blended.len(), 6);
        assert_eq!(blended.last().unwrap().movie_id, "f1");
        assert_eq!(blended.iter().filter(|c| c.is_fresh()).count(), 1);
    }

    #[test]
    fn test_no_eligible_movies() {
        let context = UserContext::new("u1", 3)
            .with_watched(["f1".to_string()])
            .with_fresh_movies(vec!["f1".into(), "m0".into()]);
        let blended = FreshnessBlender::with_seed(1)
            .apply(ranked(3), &context)
            .unwrap();
        assert_eq!(ids(&blended), vec!["m0", "m1", "m2"]);
    }

    #[test]
    fn test_list_shorter_than_quota_is_untouched() {
        let context = UserContext::new("u1", 9)
            .with_fresh_movies(vec!["f1".into(), "f2".into(), "f3".into()]);
        let blended = FreshnessBlender::with_seed(1)
            .apply(ranked(2), &context)
            .unwrap();
        assert_eq!(ids(&blended), vec!["m0", "m1"]);
    }
}
