use std::path::Path;

use anyhow::{Context, Result};

use shortsmith::{Config, Orchestrator, PipelineRequest};

pub async fn cmd_make(config_path: Option<&Path>, link: &str, start: &str, end: &str) -> Result<()> {
    let mut config = Config::load(config_path)?;
    // The caller already has the machine; local files are fair game here
    config.pipeline.allow_local_sources = true;
    let orchestrator =
        Orchestrator::from_config(&config).context("failed to set up the pipeline")?;

    let request = PipelineRequest::from_query(Some(link), Some(start), Some(end))?;
    let result = orchestrator.run(&request).await?;

    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}
