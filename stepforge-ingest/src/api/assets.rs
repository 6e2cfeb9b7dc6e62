//! Per-step asset retrieval
//!
//! Image, instruction text, and 3D model are served straight from the
//! volume when the ledger names them. Audio self-heals: a step whose mp3 is
//! unset or missing on disk triggers exactly one synchronous narration call
//! before serving, and the regenerated filename is persisted back to the
//! ledger.

use axum::{
    extract::{Path, State},
    http::header,
    response::IntoResponse,
    routing::get,
    Router,
};
use tracing::warn;

use crate::db::steps::{self, StepRecord};
use crate::error::{ApiError, ApiResult};
use crate::services::content_hash::HASH_PREFIX_LEN;
use crate::services::pdf_extractor::image_extension;
use crate::AppState;

async fn load_step(state: &AppState, hash: &str, step: i64) -> ApiResult<StepRecord> {
    let full_hash = steps::resolve_hash(&state.db, hash).await?;
    steps::get_step(&state.db, &full_hash, step)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Step {step} not found")))
}

async fn serve_file(
    state: &AppState,
    filename: &str,
    content_type: &'static str,
) -> ApiResult<impl IntoResponse> {
    let path = state.config.volume_dir.join(filename);
    let bytes = tokio::fs::read(&path)
        .await
        .map_err(|_| ApiError::NotFound(format!("Asset file missing: {filename}")))?;
    Ok(([(header::CONTENT_TYPE, content_type)], bytes))
}

/// GET /pdfs/{hash}/steps/{step}/image
pub async fn get_step_image(
    State(state): State<AppState>,
    Path((hash, step)): Path<(String, i64)>,
) -> ApiResult<impl IntoResponse> {
    let record = load_step(&state, &hash, step).await?;
    let content_type = match image_extension(&record.image_filename) {
        "jp2" => "image/jp2",
        _ => "image/jpeg",
    };
    serve_file(&state, &record.image_filename, content_type).await
}

/// GET /pdfs/{hash}/steps/{step}/instruction
pub async fn get_step_instruction(
    State(state): State<AppState>,
    Path((hash, step)): Path<(String, i64)>,
) -> ApiResult<impl IntoResponse> {
    let record = load_step(&state, &hash, step).await?;
    serve_file(&state, &record.instruction_filename, "text/plain; charset=utf-8").await
}

/// GET /pdfs/{hash}/steps/{step}/audio
///
/// Self-healing: regenerates a missing narration before serving.
pub async fn get_step_audio(
    State(state): State<AppState>,
    Path((hash, step)): Path<(String, i64)>,
) -> ApiResult<impl IntoResponse> {
    let record = load_step(&state, &hash, step).await?;
    let prefix = &record.pdf_hash[..HASH_PREFIX_LEN];

    let filename = match &record.mp3_filename {
        Some(name) if state.config.volume_dir.join(name).exists() => name.clone(),
        stale => {
            if stale.is_some() {
                warn!(
                    pdf_hash = prefix,
                    step,
                    "Ledger names an mp3 that is missing on disk; regenerating"
                );
            }
            state
                .generator
                .ensure_narration(&record, prefix, &state.config.default_voice)
                .await?
        }
    };

    serve_file(&state, &filename, "audio/mpeg").await
}

/// GET /pdfs/{hash}/steps/{step}/model
pub async fn get_step_model(
    State(state): State<AppState>,
    Path((hash, step)): Path<(String, i64)>,
) -> ApiResult<impl IntoResponse> {
    let record = load_step(&state, &hash, step).await?;
    let filename = record
        .glb_filename
        .as_ref()
        .ok_or_else(|| ApiError::NotFound(format!("No 3D model for step {step}")))?;
    serve_file(&state, filename, "model/gltf-binary").await
}

pub fn asset_routes() -> Router<AppState> {
    Router::new()
        .route("/pdfs/:hash/steps/:step/image", get(get_step_image))
        .route("/pdfs/:hash/steps/:step/instruction", get(get_step_instruction))
        .route("/pdfs/:hash/steps/:step/audio", get(get_step_audio))
        .route("/pdfs/:hash/steps/:step/model", get(get_step_model))
}
