//! Which model family serves a request.
//!
//! An explicit, valid family name always wins. Otherwise the selector
//! decides, so A/B splits can change without touching serving code.

use models::Family;
use rand::Rng;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use tracing::debug;

pub trait FamilySelector: Send + Sync {
    /// Family for a request that did not name a valid one
    fn choose(&self, user_id: &str) -> Family;

    /// Resolve the `model` parameter of a request
    fn select(&self, user_id: &str, requested: Option<&str>) -> Family {
        match requested.map(str::parse::<Family>) {
            Some(Ok(family)) => family,
            Some(Err(_)) => {
                debug!("Ignoring unknown model family {:?}", requested);
                self.choose(user_id)
            }
            None => self.choose(user_id),
        }
    }
}

/// Uniform random choice per request
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomSelector;

impl FamilySelector for RandomSelector {
    fn choose(&self, _user_id: &str) -> Family {
        Family::ALL[rand::rng().random_range(0..Family::ALL.len())]
    }
}

/// Stable per-user choice from a hash of the user id
#[derive(Debug, Default, Clone, Copy)]
pub struct HashSelector;

impl FamilySelector for HashSelector {
    fn choose(&self, user_id: &str) -> Family {
        let mut hasher = DefaultHasher::new();
        user_id.hash(&mut hasher);
        Family::ALL[(hasher.finish() % Family::ALL.len() as u64) as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_request_wins() {
        assert_eq!(RandomSelector.select("u1", Some("als")), Family::Als);
        assert_eq!(RandomSelector.select("u1", Some("LightFM")), Family::LightFm);
    }

    #[test]
    fn test_random_covers_both_families() {
        let picks: Vec<Family> = (0..200)
            .map(|_| RandomSelector.select("u1", Some("svd")))
            .collect();
        assert!(picks.contains(&Family::Als));
        assert!(picks.contains(&Family::LightFm));
    }

    #[test]
    fn test_hash_is_stable_per_user() {
        for user in ["u1", "u2", "alice", "42"] {
            let first = HashSelector.select(user, None);
            assert!((0..10).all(|_| HashSelector.select(user, None) == first));
        }
        let spread: Vec<Family> = (0..50)
            .map(|i| HashSelector.choose(&format!("user-{}", i)))
            .collect();
        assert!(spread.contains(&Family::Als) && spread.contains(&Family::LightFm));
    }
}
