use anyhow::Result;
use citewatch::pipeline::Dispatcher;
use citewatch::providers::build_adapters;
use citewatch::server::{router, AppState};
use citewatch::store::InMemoryAnalysisStore;
use citewatch::AppConfig;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("citewatch=debug,tower_http=info")),
        )
        .init();

    let config = AppConfig::from_env();
    let adapters = build_adapters(&config.providers, reqwest::Client::new());
    if adapters.is_empty() {
        warn!("No provider credentials configured; analyses will return empty results");
    }

    let dispatcher = Dispatcher::new(adapters, config.timeouts.clone());
    info!(providers = ?dispatcher.providers(), "Providers configured");

    let shutdown = CancellationToken::new();
    let state = AppState {
        dispatcher: Arc::new(dispatcher),
        store: Arc::new(InMemoryAnalysisStore::new()),
        shutdown: shutdown.clone(),
    };

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    info!("Citewatch server running on http://{}", config.bind_addr);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down, cancelling in-flight analyses");
            shutdown.cancel();
        })
        .await?;
    Ok(())
}
