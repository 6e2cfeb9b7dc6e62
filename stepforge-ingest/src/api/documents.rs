//! Document listing and metadata endpoints
//!
//! Documents are addressed by hash: the full 64-char digest or its 16-char
//! prefix both resolve, with an ambiguous prefix rejected as bad input.

use axum::{
    extract::{Path, State},
    http::header,
    response::IntoResponse,
    routing::get,
    Json, Router,
};

use crate::db::steps;
use crate::error::{ApiError, ApiResult};
use crate::services::content_hash::HASH_PREFIX_LEN;
use crate::AppState;

/// GET /pdfs lists all ingested documents with their step counts
pub async fn list_documents(
    State(state): State<AppState>,
) -> ApiResult<Json<Vec<steps::DocumentSummary>>> {
    let mut documents = steps::list_documents(&state.db).await?;
    for doc in &mut documents {
        doc.pdf_hash.truncate(HASH_PREFIX_LEN);
    }
    Ok(Json(documents))
}

/// GET /pdfs/{hash}/file serves the original PDF bytes
pub async fn get_document_file(
    State(state): State<AppState>,
    Path(hash): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let full_hash = steps::resolve_hash(&state.db, &hash).await?;
    let prefix = &full_hash[..HASH_PREFIX_LEN];

    let path = state.config.volume_dir.join(format!("{prefix}.pdf"));
    let bytes = tokio::fs::read(&path)
        .await
        .map_err(|_| ApiError::NotFound(format!("Original PDF missing for {prefix}")))?;

    Ok(([(header::CONTENT_TYPE, "application/pdf")], bytes))
}

/// GET /pdfs/{hash}/steps lists every ledger row for one document
pub async fn list_steps(
    State(state): State<AppState>,
    Path(hash): Path<String>,
) -> ApiResult<Json<Vec<steps::StepRecord>>> {
    let full_hash = steps::resolve_hash(&state.db, &hash).await?;
    let mut records = steps::steps_for_document(&state.db, &full_hash).await?;
    for record in &mut records {
        record.pdf_hash.truncate(HASH_PREFIX_LEN);
    }
    Ok(Json(records))
}

/// GET /pdfs/{hash}/steps/{step}/position
pub async fn get_step_position(
    State(state): State<AppState>,
    Path((hash, step)): Path<(String, i64)>,
) -> ApiResult<Json<crate::models::ImagePosition>> {
    let full_hash = steps::resolve_hash(&state.db, &hash).await?;
    let record = steps::get_step(&state.db, &full_hash, step)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Step {step} not found")))?;

    let position = record
        .position()
        .ok_or_else(|| ApiError::NotFound(format!("No position recorded for step {step}")))?;

    Ok(Json(position))
}

pub fn document_routes() -> Router<AppState> {
    Router::new()
        .route("/pdfs", get(list_documents))
        .route("/pdfs/:hash/file", get(get_document_file))
        .route("/pdfs/:hash/steps", get(list_steps))
        .route("/pdfs/:hash/steps/:step/position", get(get_step_position))
}
