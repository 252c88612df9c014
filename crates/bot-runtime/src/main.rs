//! # Health-Bot Runtime
//!
//! Entry point for the WeCom health assistant gateway.
//!
//! ## Startup Sequence
//!
//! 1. Initialize logging (`RUST_LOG`, default `info`)
//! 2. Load configuration from the environment
//! 3. Load the recipe book
//! 4. Build the WeCom notifier
//! 5. Serve the webhook gateway until Ctrl+C

use std::sync::Arc;

use anyhow::{Context, Result};
use bot_runtime::{RuntimeConfig, WeComNotifier};
use hb_webhook_gateway::{InMemoryRecipeBook, WebhookService};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

fn load_recipe_book(config: &RuntimeConfig) -> Result<InMemoryRecipeBook> {
    match &config.recipes_path {
        Some(path) => InMemoryRecipeBook::from_json_file(path)
            .with_context(|| format!("Failed to load recipe book from {}", path.display())),
        None => {
            warn!("HB_RECIPES_PATH not set, every request gets a placeholder recipe");
            Ok(InMemoryRecipeBook::default())
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
    info!("Received shutdown signal");
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .with_thread_ids(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("===========================================");
    info!("  Health-Bot Runtime v{}", env!("CARGO_PKG_VERSION"));
    info!("===========================================");

    let config = RuntimeConfig::from_env().context("Failed to load configuration")?;
    info!(wecom_api = ?config.wecom_api, "Configuration loaded");

    let recipes = Arc::new(load_recipe_book(&config)?);
    let notifier = Arc::new(
        WeComNotifier::new(config.wecom_api.clone()).context("Failed to build WeCom client")?,
    );

    let service = WebhookService::new(config.gateway, recipes, notifier)
        .context("Failed to build webhook gateway")?;

    info!("Gateway is running. Press Ctrl+C to stop.");
    service.start(shutdown_signal()).await?;

    Ok(())
}
