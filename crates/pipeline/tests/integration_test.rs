//! Integration tests for the pipeline.
//!
//! These run the full serving pipeline over a ranked candidate list the
//! way the recommendation server does.

use pipeline::filters::FreshnessBlender;
use pipeline::{Candidate, CandidateOrigin, UserContext, serving_pipeline};

fn model_ranking(ids: &[&str]) -> Vec<Candidate> {
    ids.iter()
        .enumerate()
        .map(|(rank, id)| Candidate::new(*id, CandidateOrigin::Model, 1.0 / (rank + 1) as f32))
        .collect()
}

#[test]
fn test_full_pipeline_with_fresh_movies() {
    // limit 6 plus two watched movies requested from the model
    let candidates = model_ranking(&["w1", "a", "b", "w2", "c", "d", "e", "f"]);
    let context = UserContext::new("U", 6)
        .with_watched(["w1".to_string(), "w2".to_string(), "fresh-watched".to_string()])
        .with_fresh_movies(vec![
            "fresh-1".into(),
            "fresh-2".into(),
            "fresh-watched".into(),
        ]);

    let pipeline = serving_pipeline(FreshnessBlender::with_seed(7));
    let result = pipeline.apply(candidates, &context).unwrap();

    assert_eq!(result.len(), 6);
    let fresh = result.iter().filter(|c| c.is_fresh()).count();
    assert!((1..=2).contains(&fresh));
    assert!(result.iter().all(|c| !context.has_watched(&c.movie_id)));
    assert_eq!(result[0].movie_id, "a");
}

#[test]
fn test_full_pipeline_without_fresh_movies() {
    let candidates = model_ranking(&["w1", "a", "b", "c"]);
    let context = UserContext::new("U", 3).with_watched(["w1".to_string()]);

    let result = serving_pipeline(FreshnessBlender::with_seed(7))
        .apply(candidates, &context)
        .unwrap();

    let ids: Vec<&str> = result.iter().map(|c| c.movie_id.as_str()).collect();
    assert_eq!(ids, vec!["a", "b", "c"]);
}
