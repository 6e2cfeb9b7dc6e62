//! stepforge-ingest library interface
//!
//! Exposes the router and state for integration testing.

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;

pub use crate::error::{ApiError, ApiResult};

use crate::config::ServiceConfig;
use crate::services::{
    AssetGenerator, ClassifierClient, IngestPipeline, ModelClient, ModelReconstructor,
    NarrationClient, NarrationSynthesizer,
};
use axum::Router;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::sync::Arc;
use stepforge_common::Result;
use tokio::sync::RwLock;
use tower_http::cors::CorsLayer;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: SqlitePool,
    /// Resolved service configuration
    pub config: Arc<ServiceConfig>,
    /// End-to-end ingestion pipeline
    pub pipeline: Arc<IngestPipeline>,
    /// Asset derivation orchestrator (accessor self-healing path)
    pub generator: Arc<AssetGenerator>,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
    /// Last processing error for diagnostics
    pub last_error: Arc<RwLock<Option<String>>>,
}

impl AppState {
    /// Wire up clients, orchestrator, and pipeline from resolved config.
    ///
    /// Collaborators without a configured API key are left unwired; the
    /// pipeline and orchestrator surface that as a configuration error
    /// when a request actually needs them.
    pub fn new(db: SqlitePool, config: ServiceConfig) -> Result<Self> {
        let narration: Option<Arc<dyn NarrationSynthesizer>> = config
            .fish_audio_api_key
            .clone()
            .map(NarrationClient::new)
            .transpose()
            .map_err(|e| stepforge_common::Error::internal(e.to_string()))?
            .map(|c| Arc::new(c) as Arc<dyn NarrationSynthesizer>);

        let models: Option<Arc<dyn ModelReconstructor>> = config
            .tripo_api_key
            .clone()
            .map(ModelClient::new)
            .transpose()
            .map_err(|e| stepforge_common::Error::internal(e.to_string()))?
            .map(|c| Arc::new(c) as Arc<dyn ModelReconstructor>);

        let classifier = config
            .gemini_api_key
            .clone()
            .map(|key| ClassifierClient::new(key, config.gemini_model.clone()))
            .transpose()
            .map_err(|e| stepforge_common::Error::internal(e.to_string()))?
            .map(Arc::new);

        let generator = Arc::new(AssetGenerator::new(
            db.clone(),
            config.volume_dir.clone(),
            narration,
            models,
        ));

        let pipeline = Arc::new(IngestPipeline::new(
            db.clone(),
            config.volume_dir.clone(),
            classifier,
            generator.clone(),
            config.default_voice.clone(),
        ));

        Ok(Self {
            db,
            config: Arc::new(config),
            pipeline,
            generator,
            startup_time: Utc::now(),
            last_error: Arc::new(RwLock::new(None)),
        })
    }
}

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::health_routes())
        .merge(api::process_routes())
        .merge(api::document_routes())
        .merge(api::asset_routes())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
