mod worker;

use anyhow::Context;
use septra_core::clock::SystemClock;
use septra_core::repository::EntityStore;
use septra_procurement::ProcurementEngine;
use septra_store::app_config::{Config, StoreBackend};
use septra_store::{JsonFileStore, MemoryStore, StaticSupplierDirectory, TracingNotifier};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "septra_worker=info,septra_procurement=info,septra_store=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().context("Failed to load config")?;

    let store: Arc<dyn EntityStore> = match config.store.backend {
        StoreBackend::Json => {
            tracing::info!("Using JSON store at {}", config.store.data_dir);
            Arc::new(
                JsonFileStore::open(&config.store.data_dir)
                    .await
                    .context("Failed to open data directory")?,
            )
        }
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory store, nothing survives a restart");
            Arc::new(MemoryStore::new())
        }
    };

    let engine = Arc::new(ProcurementEngine::new(
        store,
        Arc::new(SystemClock),
        Arc::new(TracingNotifier),
        Arc::new(StaticSupplierDirectory::new(config.suppliers.ratings.clone())),
        config.business_rules.clone(),
    ));

    tokio::select! {
        _ = worker::run_sweeper(engine, config.worker.sweep_interval_seconds) => {}
        _ = tokio::signal::ctrl_c() => tracing::info!("Shutting down"),
    }
    Ok(())
}
