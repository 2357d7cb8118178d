use data_loader::{Dataset, MatrixBuilder, resolve_weights};
use std::path::Path;
use std::time::Instant;

fn main() {
    let data_dir = std::env::args().nth(1).unwrap_or_else(|| "data".to_string());

    println!("Loading dataset from {}...\n", data_dir);

    let start = Instant::now();
    let dataset = Dataset::load_from_dir(Path::new(&data_dir)).expect("Failed to load dataset");
    let load_elapsed = start.elapsed();

    let start = Instant::now();
    let triples = resolve_weights(&dataset.interactions);
    let (matrix, mapping) = MatrixBuilder::build(&triples);
    let build_elapsed = start.elapsed();

    println!("=== Load Complete ===");
    println!("Load time: {:?}", load_elapsed);
    println!("Matrix build time: {:?}", build_elapsed);
    println!("Movies in catalog: {}", dataset.movies.len());
    println!("Interactions: {}", dataset.interactions.len());
    println!("Matrix: {} users x {} movies, {} cells",
             mapping.num_users(), mapping.num_movies(), matrix.nnz());
    println!("\nPerformance: {:.0} interactions/second",
             dataset.interactions.len() as f64 / (load_elapsed + build_elapsed).as_secs_f64());
}
