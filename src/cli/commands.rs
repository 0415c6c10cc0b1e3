use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use crate::cli::config::AppConfig;
use crate::crawler::{split_targets, FetchOrchestrator};
use crate::server;

/// Check one batch of URLs and print the result as JSON
pub async fn check(
    config_path: Option<PathBuf>,
    urls: Vec<String>,
    concurrency: Option<usize>,
    retries: Option<u32>,
    compact: bool,
) -> Result<()> {
    let mut config = AppConfig::load(config_path.as_deref())?;

    // Override configuration with command line parameters if provided
    if let Some(c) = concurrency {
        config.scrape.concurrency = c;
    }
    if let Some(r) = retries {
        config.scrape.max_retries = r;
    }

    let orchestrator = FetchOrchestrator::new(config)?;
    let targets = split_targets(&urls);
    let batch = orchestrator
        .scrape_many(&targets)
        .await
        .context("Batch could not run")?;

    let output = if compact {
        serde_json::to_string(&batch)?
    } else {
        serde_json::to_string_pretty(&batch)?
    };
    println!("{}", output);

    info!(
        "{} of {} targets succeeded",
        batch.summary.success, batch.summary.total
    );

    Ok(())
}

/// Run the HTTP status API until interrupted
pub async fn serve(config_path: Option<PathBuf>, bind: Option<String>) -> Result<()> {
    let config = AppConfig::load(config_path.as_deref())?;
    let addr = bind.unwrap_or_else(|| config.server.bind.clone());

    let orchestrator = Arc::new(FetchOrchestrator::new(config)?);
    let app = server::build_app(orchestrator);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context(format!("Failed to bind to {}", addr))?;

    info!("Listening on {}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}

/// Show the current configuration
pub fn show_config(config_path: Option<PathBuf>) -> Result<()> {
    let config = AppConfig::load(config_path.as_deref())?;
    println!("{}", serde_yaml::to_string(&config)?);
    Ok(())
}

/// Show where the configuration is read from
pub fn show_config_path(config_path: Option<PathBuf>) -> Result<()> {
    let path = config_path.unwrap_or_else(AppConfig::default_path);
    println!("{}", path.display());
    Ok(())
}
