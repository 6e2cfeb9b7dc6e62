//! stepforge-ingest - service-manual ingestion service
//!
//! Ingests service-manual PDFs into a content-addressed step ledger and
//! derives per-step assets (narration audio, 3D models) through external
//! collaborators. Serves everything back over HTTP.

use anyhow::Result;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use stepforge_ingest::config::ServiceConfig;
use stepforge_ingest::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting stepforge-ingest");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let toml = stepforge_common::config::TomlConfig::load()?;
    let config = ServiceConfig::resolve(&toml);

    stepforge_common::config::ensure_volume_dir(&config.volume_dir)?;
    info!("Volume: {}", config.volume_dir.display());

    let db_path = config.volume_dir.join("stepforge.db");
    info!("Database: {}", db_path.display());
    let db_pool = stepforge_ingest::db::init_database_pool(&db_path).await?;
    info!("Database connection established");

    let port = config.port;
    let state = AppState::new(db_pool, config)?;
    let app = stepforge_ingest::build_router(state);

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    info!("Listening on http://0.0.0.0:{port}");
    info!("Health check: http://localhost:{port}/health");

    axum::serve(listener, app).await?;

    Ok(())
}
