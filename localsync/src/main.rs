// localsync - Local-first synchronized collections
// Headless driver: loads the memories collection and keeps it fresh

use anyhow::Context;
use localsync::app::AppState;
use localsync::collection::{Facet, ItemFacet};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "localsync=debug,info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting localsync");

    let app_data_dir = std::env::var_os("LOCALSYNC_DATA_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(".localsync"));
    let api_token = std::env::var("LOCALSYNC_API_TOKEN").ok();

    let state = AppState::initialize(app_data_dir, api_token)
        .await
        .context("failed to initialize application")?;
    let memories = &state.memories;

    memories.set_active(true).await?;
    if let Err(e) = memories.load().await {
        tracing::warn!("Initial load failed: {}", e);
    }

    match memories.full_sync_if_needed().await {
        Ok(true) => tracing::info!("Full sync completed"),
        Ok(false) => tracing::debug!("Full sync not needed"),
        Err(e) => tracing::warn!("Full sync failed: {}", e),
    }

    let snapshot = memories.snapshot();
    tracing::info!(
        "Loaded {} items ({} visible, more pages: {})",
        snapshot.loaded_count,
        snapshot.display.visible_items.len(),
        snapshot.has_more_pages
    );

    let counts = memories.facet_counts().await?;
    tracing::info!("All: {}", counts.total);
    for facet in ItemFacet::all() {
        tracing::info!("{}: {}", facet.key(), counts.get(*facet));
    }

    state.scheduler.start().await?;

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;

    tracing::info!("Shutting down");
    state.scheduler.shutdown().await?;

    Ok(())
}
