mod config;
mod db;
mod entities;
mod error;
mod models;
mod routes;
mod state;
mod storage;
mod uploads;
mod users;

#[cfg(test)]
mod test_support;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use config::Config;
use state::AppState;
use storage::LocalStorage;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::parse();
    let storage_config = config.storage();

    tracing::info!("Initializing database at {}", config.db_path);
    let db = db::connect(&config.database())
        .await
        .context("Failed to open database")?;

    let files = LocalStorage::new(&storage_config.root)
        .await
        .context("Failed to prepare storage root")?;
    tracing::info!("Serving uploads from {}", files.root().display());

    let state = AppState::new(
        db,
        Arc::new(files),
        config.auth(),
        storage_config.max_file_size,
    );

    let limiter = state.auth_rate_limiter.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(300));
        loop {
            interval.tick().await;
            limiter.cleanup();
        }
    });

    let app = routes::router(state);

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    tracing::info!("Listening on http://{addr}");
    axum::serve(listener, app).await?;

    Ok(())
}
