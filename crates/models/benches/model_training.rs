//! Benchmarks for model fitting and scoring
//!
//! Run with: cargo bench --package models
//!
//! Uses a synthetic interaction matrix so the benchmark needs no dataset.

use chrono::Utc;
use criterion::{Criterion, black_box, criterion_group, criterion_main};
use data_loader::{IndexMapping, InteractionMatrix, MatrixBuilder, Movie, WeightedInteraction};
use models::{
    AlsConfig, AlsModel, HybridConfig, HybridModel, ItemFeatureMatrix, ModelFamily,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const USERS: usize = 500;
const MOVIES: usize = 300;
const PER_USER: usize = 20;
const GENRES: [&str; 6] = ["Action", "Comedy", "Drama", "Horror", "Romance", "Thriller"];

fn synthetic_data() -> (InteractionMatrix, IndexMapping, ItemFeatureMatrix) {
    let mut rng = StdRng::seed_from_u64(7);
    let mut triples = Vec::with_capacity(USERS * PER_USER);
    for user in 0..USERS {
        for _ in 0..PER_USER {
            triples.push(WeightedInteraction {
                user_id: format!("u{}", user),
                movie_id: format!("m{}", rng.random_range(0..MOVIES)),
                weight: [1.0, 0.5, 0.3][rng.random_range(0..3)],
            });
        }
    }
    let (matrix, mapping) = MatrixBuilder::build(&triples);

    let movies: Vec<Movie> = (0..MOVIES)
        .map(|i| Movie {
            id: format!("m{}", i),
            title: String::new(),
            genres: vec![GENRES[i % GENRES.len()].to_string()],
            rating: 5.0,
            creation_date: Utc::now(),
        })
        .collect();
    let features = ItemFeatureMatrix::build(&mapping, &movies);
    (matrix, mapping, features)
}

fn bench_als_fit(c: &mut Criterion) {
    let (matrix, _, features) = synthetic_data();

    c.bench_function("als_fit_full", |b| {
        b.iter(|| {
            let mut model = AlsModel::new(AlsConfig::default());
            model.fit_full(black_box(&matrix), &features).unwrap();
            black_box(model)
        })
    });
}

fn bench_hybrid_fit(c: &mut Criterion) {
    let (matrix, _, features) = synthetic_data();

    c.bench_function("hybrid_fit_full", |b| {
        b.iter(|| {
            let mut model = HybridModel::new(HybridConfig::default());
            model.fit_full(black_box(&matrix), &features).unwrap();
            black_box(model)
        })
    });
}

fn bench_scoring(c: &mut Criterion) {
    let (matrix, _, features) = synthetic_data();
    let mut als = AlsModel::new(AlsConfig::default());
    als.fit_full(&matrix, &features).unwrap();
    let mut hybrid = HybridModel::new(HybridConfig::default());
    hybrid.fit_full(&matrix, &features).unwrap();

    let live_row: Vec<(usize, f32)> = matrix.csr.row(0).collect();

    c.bench_function("als_recommend_live_row", |b| {
        b.iter(|| black_box(als.recommend(0, black_box(&live_row), 10).unwrap()))
    });
    c.bench_function("hybrid_recommend", |b| {
        b.iter(|| black_box(hybrid.recommend(0, black_box(&live_row), 10).unwrap()))
    });
}

criterion_group!(benches, bench_als_fit, bench_hybrid_fit, bench_scoring);
criterion_main!(benches);
