//! Simple test harness for the recommendation engine.
//!
//! Loads the configured dataset, trains both families when no stored
//! artifacts exist and prints one recommendation list per family.
//!
//! Usage: `server [user_id]` with `RECS_DATA_DIR` pointing at a dataset.

use anyhow::Result;
use tracing::info;

use server::{AppContext, Config, Engine};

#[tokio::main]
async fn main() -> Result<()> {
    server::init_tracing("info,server=debug,pipeline=debug");
    info!("Starting ReelRecs server test harness");

    let config = Config::from_env()?;
    let context = AppContext::from_config(config).await?;
    let engine = Engine::new(context);

    if engine.context().registry.is_empty() {
        info!("No stored artifacts, training from scratch");
        let report = engine.train(false).await?;
        info!("Training report: {:?}", report.outcomes);
    }

    let user_id = std::env::args().nth(1).unwrap_or_else(|| "1".to_string());
    for model in ["als", "lightfm"] {
        let response = engine.get_recommendations(&user_id, Some(model), None).await?;
        info!(
            "{} -> source {} session {}",
            model, response.source, response.session_id
        );
        for (i, movie_id) in response.recommendations.iter().enumerate() {
            info!("{}. {}", i + 1, movie_id);
        }
    }

    info!("Metrics: {:?}", engine.metrics());
    println!("{}", engine.export_metrics()?);
    Ok(())
}
