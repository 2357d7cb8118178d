use anyhow::{anyhow, Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use colored::Colorize;
use data_loader::UserId;
use rand::seq::IndexedRandom;
use server::{
    AppContext, Config, Engine, Job, Scheduler, SchedulerConfig, TrainingOutcome, TrainingReport,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tracing::info;
use uuid::Uuid;

/// ReelRecs - Movie Recommendation Engine
#[derive(Parser)]
#[command(name = "reel-recs")]
#[command(about = "Movie recommendation engine with ALS and hybrid models", long_about = None)]
struct Cli {
    /// Dataset directory with movies.jsonl, watches.jsonl, likes.jsonl, bookmarks.jsonl
    #[arg(short, long)]
    data_dir: Option<PathBuf>,

    /// Directory holding trained model artifacts
    #[arg(short, long)]
    model_dir: Option<PathBuf>,

    /// Directory holding the session and feedback logs
    #[arg(short, long)]
    session_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Train both model families
    Train {
        /// Only consume interactions recorded since the last run
        #[arg(long)]
        partial: bool,
    },

    /// Get movie recommendations for a user
    Recommend {
        /// User ID to get recommendations for
        #[arg(long)]
        user_id: UserId,

        /// Model family: als or lightfm (random when omitted)
        #[arg(long)]
        model: Option<String>,

        /// Number of recommendations to return
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Record whether the user liked a recommended movie
    Feedback {
        #[arg(long)]
        session_id: Uuid,

        #[arg(long)]
        movie_id: String,

        #[arg(long, action = ArgAction::Set)]
        liked: bool,
    },

    /// Compute Precision@K and Recall@K per model family
    Evaluate {
        #[arg(long)]
        k: Option<usize>,
    },

    /// Run the background scheduler until Ctrl-C
    Serve,

    /// Run benchmark to test performance
    Benchmark {
        /// Number of requests to make
        #[arg(long, default_value = "100")]
        requests: usize,

        /// Number of concurrent requests
        #[arg(long, default_value = "10")]
        concurrent: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    server::init_tracing("info");

    let cli = Cli::parse();
    let mut config = Config::from_env()?;
    config.data_dir = cli.data_dir.or(config.data_dir).or(Some("data".into()));
    config.model_dir = cli.model_dir.or(config.model_dir).or(Some("models".into()));
    config.session_dir = cli
        .session_dir
        .or(config.session_dir)
        .or(Some("sessions".into()));

    let start = Instant::now();
    let context = AppContext::from_config(config)
        .await
        .context("Failed to initialize engine")?;
    println!("{} Loaded engine in {:?}", "✓".green(), start.elapsed());
    let engine = Arc::new(Engine::new(context));

    // Dispatch to appropriate command handler
    match cli.command {
        Commands::Train { partial } => handle_train(&engine, partial).await?,
        Commands::Recommend {
            user_id,
            model,
            limit,
        } => handle_recommend(&engine, &user_id, model.as_deref(), limit).await?,
        Commands::Feedback {
            session_id,
            movie_id,
            liked,
        } => {
            engine.submit_feedback(session_id, &movie_id, liked).await?;
            println!("{} Feedback recorded", "✓".green());
        }
        Commands::Evaluate { k } => handle_evaluate(&engine, k).await?,
        Commands::Serve => handle_serve(engine).await?,
        Commands::Benchmark {
            requests,
            concurrent,
        } => handle_benchmark(engine, requests, concurrent).await?,
    }

    Ok(())
}

async fn handle_train(engine: &Engine, partial: bool) -> Result<()> {
    let start = Instant::now();
    let report = engine.train(partial).await?;
    print_training_report(&report, start.elapsed());
    if report.has_failures() {
        return Err(anyhow!("training failed for at least one family"));
    }
    Ok(())
}

async fn handle_recommend(
    engine: &Engine,
    user_id: &str,
    model: Option<&str>,
    limit: Option<usize>,
) -> Result<()> {
    let response = engine.get_recommendations(user_id, model, limit).await?;
    let movies = engine.context().catalog.movies().await?;

    println!(
        "{}",
        format!("Recommendations for user {} ({})", user_id, response.source)
            .bold()
            .blue()
    );
    for (rank, movie_id) in response.recommendations.iter().enumerate() {
        match movies.iter().find(|m| &m.id == movie_id) {
            Some(movie) => println!(
                "{}. {} [{}] - Rating: {:.1}",
                (rank + 1).to_string().green(),
                movie.title,
                movie.genres.join(", "),
                movie.rating
            ),
            None => println!("{}. {}", (rank + 1).to_string().green(), movie_id),
        }
    }
    println!("Session: {}", response.session_id.to_string().cyan());
    Ok(())
}

async fn handle_evaluate(engine: &Engine, k: Option<usize>) -> Result<()> {
    let k = k.unwrap_or(engine.context().config.evaluation_k);
    let report = engine.evaluate(Some(k)).await?;
    if report.is_empty() {
        println!("No sessions with liked feedback yet");
        return Ok(());
    }

    println!("{}", format!("Evaluation at k={}", k).bold().blue());
    for (family, metrics) in &report {
        println!(
            "{}: precision@{} {:.4}, recall@{} {:.4} ({} sessions)",
            family.to_string().green(),
            k,
            metrics.precision_at_k,
            k,
            metrics.recall_at_k,
            metrics.sample_count
        );
    }
    Ok(())
}

async fn handle_serve(engine: Arc<Engine>) -> Result<()> {
    let config = SchedulerConfig::from(&engine.context().config);
    let untrained = engine.context().registry.is_empty();
    let scheduler = Scheduler::start(engine.clone(), config);
    if untrained {
        scheduler.enqueue(Job::Train { partial: false }).await?;
    }

    println!("{} Scheduler running, press Ctrl-C to stop", "✓".green());
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    info!("Shutting down");
    scheduler.shutdown().await;
    Ok(())
}

/// Handle the 'benchmark' command
async fn handle_benchmark(engine: Arc<Engine>, requests: usize, concurrent: usize) -> Result<()> {
    let users = engine.context().interactions.active_users().await?;
    if users.is_empty() {
        return Err(anyhow!("No users with watch history to benchmark"));
    }

    // Sample users with replacement
    let user_ids: Vec<UserId> = {
        let mut rng = rand::rng();
        (0..requests)
            .filter_map(|_| users.choose(&mut rng).cloned())
            .collect()
    };

    let permits = Arc::new(Semaphore::new(concurrent.max(1)));
    let wall_clock = Instant::now();
    let mut handles = vec![];
    for user in user_ids {
        let engine = engine.clone();
        let permits = permits.clone();
        handles.push(tokio::spawn(async move {
            let _permit = permits.acquire_owned().await?;
            let start = Instant::now();
            engine.get_recommendations(&user, None, None).await?;
            Ok::<_, anyhow::Error>(start.elapsed())
        }));
    }

    let mut timings = vec![];
    for handle in handles {
        timings.push(handle.await??);
    }
    let total_time = wall_clock.elapsed();
    if timings.is_empty() {
        return Ok(());
    }

    let avg_latency = timings.iter().sum::<Duration>() / (timings.len() as u32);
    timings.sort();
    let percentile = |p: f32| timings[((timings.len() as f32 * p) as usize).min(timings.len() - 1)];
    let throughput = timings.len() as f32 / total_time.as_secs_f32();
    let metrics = engine.metrics();

    println!("{}", "Benchmark results:".bold().blue());
    println!("Total time: {:?}", total_time);
    println!("Average latency: {:?}", avg_latency);
    println!("P50 latency: {:?}", percentile(0.50));
    println!("P95 latency: {:?}", percentile(0.95));
    println!("P99 latency: {:?}", percentile(0.99));
    println!("Throughput: {:.2} requests/second", throughput);
    println!(
        "Cache hits/misses: {}/{}",
        metrics.cache_hits, metrics.cache_misses
    );

    Ok(())
}

/// Helper function to format and print a training report
fn print_training_report(report: &TrainingReport, elapsed: Duration) {
    let kind = if report.partial { "Partial" } else { "Full" };
    println!("{}", format!("{} training finished in {:?}", kind, elapsed).bold().blue());
    for (family, outcome) in &report.outcomes {
        let line = match outcome {
            TrainingOutcome::Trained {
                users,
                movies,
                cells,
            } => format!("trained on {} users x {} movies ({} cells)", users, movies, cells).green(),
            TrainingOutcome::NoNewData => "no new interactions".yellow(),
            TrainingOutcome::Failed(reason) => format!("failed: {}", reason).red(),
        };
        println!("  {}: {}", family, line);
    }
}
