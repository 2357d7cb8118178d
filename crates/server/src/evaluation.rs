//! Offline comparison of the model families from logged feedback.
//!
//! Per session: `relevant = |recommended ∩ liked|`,
//! `precision = relevant / min(k, |recommended|)` and
//! `recall = relevant / |liked|`. Session scores are averaged per family.
//! Sessions without a single like, empty lists and popularity-fallback
//! sessions are left out.

use crate::session::{Feedback, RecommendationSession};
use models::Family;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FamilyMetrics {
    pub precision_at_k: f64,
    pub recall_at_k: f64,
    pub sample_count: usize,
}

pub type EvaluationReport = BTreeMap<Family, FamilyMetrics>;

#[derive(Default)]
struct Totals {
    precision: f64,
    recall: f64,
    count: usize,
}

pub fn evaluate_sessions(
    sessions: &[RecommendationSession],
    feedback: &[Feedback],
    k: usize,
) -> EvaluationReport {
    let mut liked: HashMap<Uuid, HashSet<&str>> = HashMap::new();
    for row in feedback.iter().filter(|f| f.liked) {
        liked
            .entry(row.session_id)
            .or_default()
            .insert(row.movie_id.as_str());
    }

    let mut totals: BTreeMap<Family, Totals> = BTreeMap::new();
    for session in sessions {
        let Some(family) = session.source.family() else {
            continue;
        };
        let Some(session_likes) = liked.get(&session.session_id) else {
            continue;
        };
        let recommended: HashSet<&str> =
            session.recommendations.iter().map(String::as_str).collect();
        let denominator = k.min(session.recommendations.len());
        if denominator == 0 {
            continue;
        }

        let relevant = recommended.intersection(session_likes).count() as f64;
        let entry = totals.entry(family).or_default();
        entry.precision += relevant / denominator as f64;
        entry.recall += relevant / session_likes.len() as f64;
        entry.count += 1;
    }

    totals
        .into_iter()
        .map(|(family, t)| {
            (
                family,
                FamilyMetrics {
                    precision_at_k: t.precision / t.count as f64,
                    recall_at_k: t.recall / t.count as f64,
                    sample_count: t.count,
                },
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Source;

    fn session(source: Source, recs: &[&str]) -> RecommendationSession {
        let family = source.family().unwrap_or(Family::Als);
        RecommendationSession::new(
            "u1",
            family,
            source,
            recs.iter().map(|s| s.to_string()).collect(),
        )
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_precision_and_recall_at_3() {
        let s = session(Source::Als, &["m1", "m2", "m3"]);
        let feedback = vec![
            Feedback::new(s.session_id, "m1", true),
            Feedback::new(s.session_id, "m2", true),
            Feedback::new(s.session_id, "m3", false),
        ];

        let report = evaluate_sessions(&[s], &feedback, 3);
        let als = report[&Family::Als];
        assert!(close(als.precision_at_k, 2.0 / 3.0));
        assert!(close(als.recall_at_k, 1.0));
        assert_eq!(als.sample_count, 1);
        assert!(!report.contains_key(&Family::LightFm));
    }

    #[test]
    fn test_sessions_without_likes_are_excluded() {
        let liked = session(Source::LightFm, &["m1", "m2", "m3"]);
        let disliked = session(Source::LightFm, &["m4", "m5", "m6"]);
        let silent = session(Source::LightFm, &["m7"]);
        let feedback = vec![
            Feedback::new(liked.session_id, "m9", true),
            Feedback::new(disliked.session_id, "m4", false),
        ];

        let report = evaluate_sessions(&[liked, disliked, silent], &feedback, 3);
        let lightfm = report[&Family::LightFm];
        assert_eq!(lightfm.sample_count, 1);
        assert!(close(lightfm.precision_at_k, 0.0));
        assert!(close(lightfm.recall_at_k, 0.0));
    }

    #[test]
    fn test_short_list_and_family_averaging() {
        let short = session(Source::Als, &["m1"]);
        let full = session(Source::Als, &["m1", "m2", "m3"]);
        let popular = session(Source::Popular, &["m1", "m2", "m3"]);
        let feedback = vec![
            Feedback::new(short.session_id, "m1", true),
            Feedback::new(full.session_id, "m1", true),
            Feedback::new(full.session_id, "m5", true),
            Feedback::new(popular.session_id, "m1", true),
        ];

        let report = evaluate_sessions(&[short, full, popular], &feedback, 3);
        assert_eq!(report.len(), 1);
        let als = report[&Family::Als];
        assert_eq!(als.sample_count, 2);
        // (1/1 + 1/3) / 2 and (1/1 + 1/2) / 2
        assert!(close(als.precision_at_k, (1.0 + 1.0 / 3.0) / 2.0));
        assert!(close(als.recall_at_k, 0.75));
    }
}
