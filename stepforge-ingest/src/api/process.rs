//! Document processing endpoints
//!
//! `POST /process` runs the pipeline on a PDF already in the volume
//! directory; `POST /upload-and-process` accepts a multipart upload, saves
//! it into the volume, then runs the same pipeline.

use axum::{
    extract::{Multipart, State},
    routing::post,
    Json, Router,
};
use serde::Deserialize;
use tracing::{error, info};

use crate::error::{ApiError, ApiResult};
use crate::models::PipelineOutcome;
use crate::services::DerivationRequest;
use crate::AppState;

fn default_true() -> bool {
    true
}

/// POST /process request body
#[derive(Debug, Deserialize)]
pub struct ProcessRequest {
    /// Filename of a PDF already present in the volume directory
    pub pdf_filename: String,
    /// Narration voice; the configured default applies when omitted
    pub voice_id: Option<String>,
    #[serde(default = "default_true")]
    pub generate_tts: bool,
    #[serde(default = "default_true")]
    pub generate_3d: bool,
}

impl ProcessRequest {
    fn derivation(&self) -> DerivationRequest {
        DerivationRequest {
            voice_id: self.voice_id.clone(),
            narration: self.generate_tts,
            models: self.generate_3d,
        }
    }
}

/// POST /process
pub async fn process_pdf(
    State(state): State<AppState>,
    Json(request): Json<ProcessRequest>,
) -> ApiResult<Json<PipelineOutcome>> {
    if request.pdf_filename.contains('/') || request.pdf_filename.contains("..") {
        return Err(ApiError::BadRequest(
            "pdf_filename must be a bare filename".to_string(),
        ));
    }

    let pdf_path = state.config.volume_dir.join(&request.pdf_filename);
    if !pdf_path.exists() {
        return Err(ApiError::NotFound(format!(
            "PDF not found in volume: {}",
            request.pdf_filename
        )));
    }

    run_pipeline(&state, &pdf_path, &request.pdf_filename, &request.derivation()).await
}

/// POST /upload-and-process (multipart)
///
/// Fields: `file` (required, must end in `.pdf`), `voice_id`,
/// `generate_tts`, `generate_3d`.
pub async fn upload_and_process(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<Json<PipelineOutcome>> {
    let mut pdf: Option<(String, Vec<u8>)> = None;
    let mut voice_id: Option<String> = None;
    let mut generate_tts = true;
    let mut generate_3d = true;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Malformed multipart body: {e}")))?
    {
        match field.name().unwrap_or_default() {
            "file" => {
                let filename = field
                    .file_name()
                    .map(sanitize_filename)
                    .ok_or_else(|| ApiError::BadRequest("Upload has no filename".to_string()))?;
                if !filename.to_lowercase().ends_with(".pdf") {
                    return Err(ApiError::BadRequest(
                        "Only PDF files are accepted".to_string(),
                    ));
                }
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::BadRequest(format!("Upload read failed: {e}")))?;
                pdf = Some((filename, bytes.to_vec()));
            }
            "voice_id" => {
                let value = field.text().await.unwrap_or_default();
                if !value.trim().is_empty() {
                    voice_id = Some(value);
                }
            }
            "generate_tts" => {
                generate_tts = parse_flag(&field.text().await.unwrap_or_default(), true);
            }
            "generate_3d" => {
                generate_3d = parse_flag(&field.text().await.unwrap_or_default(), true);
            }
            _ => {}
        }
    }

    let (filename, bytes) = pdf
        .ok_or_else(|| ApiError::BadRequest("Multipart field 'file' is required".to_string()))?;

    let pdf_path = state.config.volume_dir.join(&filename);
    tokio::fs::write(&pdf_path, &bytes).await.map_err(|e| {
        ApiError::Internal(format!("Failed to save upload {filename}: {e}"))
    })?;
    info!(filename = %filename, bytes = bytes.len(), "Upload saved to volume");

    let request = DerivationRequest {
        voice_id,
        narration: generate_tts,
        models: generate_3d,
    };
    run_pipeline(&state, &pdf_path, &filename, &request).await
}

async fn run_pipeline(
    state: &AppState,
    pdf_path: &std::path::Path,
    pdf_filename: &str,
    request: &DerivationRequest,
) -> ApiResult<Json<PipelineOutcome>> {
    match state.pipeline.run(pdf_path, pdf_filename, request).await {
        Ok(outcome) => Ok(Json(outcome)),
        Err(e) => {
            error!(filename = pdf_filename, error = %e, "Processing failed");
            *state.last_error.write().await = Some(e.to_string());
            Err(e.into())
        }
    }
}

/// Strip any path components a client sneaks into the upload filename.
fn sanitize_filename(name: &str) -> String {
    name.rsplit(['/', '\\']).next().unwrap_or(name).to_string()
}

fn parse_flag(value: &str, default: bool) -> bool {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" => true,
        "false" | "0" | "no" => false,
        _ => default,
    }
}

pub fn process_routes() -> Router<AppState> {
    Router::new()
        .route("/process", post(process_pdf))
        .route("/upload-and-process", post(upload_and_process))
}
