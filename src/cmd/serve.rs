use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use shortsmith::server::{self, AppState};
use shortsmith::{Config, Orchestrator};

pub async fn cmd_serve(config_path: Option<&Path>, bind: Option<String>) -> Result<()> {
    let config = Config::load(config_path)?;
    let orchestrator =
        Orchestrator::from_config(&config).context("failed to set up the pipeline")?;
    let bind = bind.unwrap_or_else(|| config.server.bind.clone());

    info!(
        "shortsmith {} (max {} concurrent jobs)",
        shortsmith::VERSION,
        config.server.max_concurrent_jobs
    );

    let state = AppState::new(Arc::new(orchestrator), config.server.max_concurrent_jobs);
    server::serve(&bind, state)
        .await
        .with_context(|| format!("server on {bind} failed"))?;
    Ok(())
}
