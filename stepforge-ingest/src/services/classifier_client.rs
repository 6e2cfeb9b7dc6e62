//! Vision classifier client (Gemini)
//!
//! Sends the extracted manual text plus every extracted image to the Gemini
//! `generateContent` endpoint and parses the returned per-image judgments.
//! Entries come back in image submission order; callers filter on
//! `is_instruction` rather than assuming the instructional subset is
//! contiguous.

use crate::models::ImageJudgment;
use base64::Engine;
use serde::Deserialize;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";
const DEFAULT_MODEL: &str = "gemini-2.5-pro";

/// Images larger than this are recompressed before upload.
const MAX_IMAGE_BYTES: u64 = 1024 * 1024;

/// Classifier client errors
#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("API error {0}: {1}")]
    Api(u16, String),

    #[error("Classifier returned no content")]
    EmptyResponse,

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

/// The judgment set as the model returns it
#[derive(Debug, Deserialize)]
struct MatchReport {
    #[serde(default)]
    matches: Vec<ImageJudgment>,
}

/// Gemini vision classifier client
pub struct ClassifierClient {
    http_client: reqwest::Client,
    api_key: String,
    model: String,
}

impl ClassifierClient {
    pub fn new(api_key: String, model: Option<String>) -> Result<Self, ClassifierError> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(300))
            .build()
            .map_err(|e| ClassifierError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            api_key,
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
        })
    }

    /// Classify every image against the manual text.
    ///
    /// Images over 1 MiB are recompressed through ffmpeg first; when ffmpeg
    /// is unavailable the original bytes are sent with a warning.
    pub async fn classify(
        &self,
        image_paths: &[PathBuf],
        manual_text: &str,
    ) -> Result<Vec<ImageJudgment>, ClassifierError> {
        let mut parts = vec![json!({ "text": build_prompt(manual_text) })];
        let mut temp_files = Vec::new();

        for (index, path) in image_paths.iter().enumerate() {
            let send_path = match shrink_oversized(path).await? {
                Some(temp) => {
                    temp_files.push(temp.clone());
                    temp
                }
                None => path.clone(),
            };

            let bytes = tokio::fs::read(&send_path).await?;
            parts.push(json!({ "text": format!("\n\nImage {}:", index + 1) }));
            parts.push(json!({
                "inline_data": {
                    "mime_type": mime_for(&send_path),
                    "data": base64::engine::general_purpose::STANDARD.encode(&bytes),
                }
            }));
        }

        let url = format!(
            "{GEMINI_BASE_URL}/{}:generateContent?key={}",
            self.model, self.api_key
        );
        let body = json!({
            "contents": [{ "parts": parts }],
            "generationConfig": { "responseMimeType": "application/json" }
        });

        tracing::info!(
            images = image_paths.len(),
            manual_chars = manual_text.len(),
            model = %self.model,
            "Sending classification request"
        );

        let result = self.send(&url, &body).await;

        // Recompressed temp files are only needed for the request
        for temp in temp_files {
            if let Err(e) = tokio::fs::remove_file(&temp).await {
                tracing::debug!(path = %temp.display(), error = %e, "Temp cleanup failed");
            }
        }

        let judgments = result?;
        tracing::info!(
            total = judgments.len(),
            instructional = judgments.iter().filter(|j| j.is_instruction).count(),
            "Classification complete"
        );

        Ok(judgments)
    }

    async fn send(
        &self,
        url: &str,
        body: &serde_json::Value,
    ) -> Result<Vec<ImageJudgment>, ClassifierError> {
        let response = self
            .http_client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| ClassifierError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(ClassifierError::Api(status.as_u16(), error_text));
        }

        let parsed: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| ClassifierError::Parse(e.to_string()))?;

        let text = parsed
            .candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .and_then(|c| c.parts.first())
            .and_then(|p| p.text.clone())
            .ok_or(ClassifierError::EmptyResponse)?;

        parse_match_report(&text)
    }
}

/// Parse the model's JSON reply, tolerating markdown code fences.
fn parse_match_report(text: &str) -> Result<Vec<ImageJudgment>, ClassifierError> {
    let report: MatchReport = serde_json::from_str(strip_code_fences(text))
        .map_err(|e| ClassifierError::Parse(format!("{e}")))?;
    Ok(report.matches)
}

fn strip_code_fences(text: &str) -> &str {
    let mut text = text.trim();
    if let Some(stripped) = text.strip_prefix("```json") {
        text = stripped;
    } else if let Some(stripped) = text.strip_prefix("```") {
        text = stripped;
    }
    if let Some(stripped) = text.strip_suffix("```") {
        text = stripped;
    }
    text.trim()
}

fn mime_for(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        Some("png") => "image/png",
        Some("jp2") => "image/jp2",
        Some("webp") => "image/webp",
        _ => "image/jpeg",
    }
}

/// Recompress an oversized image to JPEG via ffmpeg.
///
/// Returns the temp file path when recompression happened, None when the
/// original is small enough or ffmpeg is not installed.
async fn shrink_oversized(path: &Path) -> Result<Option<PathBuf>, ClassifierError> {
    let size = tokio::fs::metadata(path).await?.len();
    if size <= MAX_IMAGE_BYTES {
        return Ok(None);
    }

    let temp_path = path.with_extension("small.jpg");
    let output = tokio::process::Command::new("ffmpeg")
        .args(["-y", "-i"])
        .arg(path)
        .args(["-q:v", "85", "-vf", "scale=iw:ih"])
        .arg(&temp_path)
        .output()
        .await;

    match output {
        Ok(out) if out.status.success() => {
            tracing::debug!(
                path = %path.display(),
                original_bytes = size,
                "Recompressed oversized image"
            );
            Ok(Some(temp_path))
        }
        Ok(out) => {
            tracing::warn!(
                path = %path.display(),
                stderr = %String::from_utf8_lossy(&out.stderr),
                "ffmpeg recompression failed; sending original"
            );
            Ok(None)
        }
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "ffmpeg not available; sending original oversized image"
            );
            Ok(None)
        }
    }
}

fn build_prompt(manual_text: &str) -> String {
    format!(
        r#"You are given images extracted from a service manual PDF.
When PDFs are parsed, ALL images are extracted, including both useful instructional images and non-instructional images.

NON-INSTRUCTIONAL images include:
- Icons and symbols (warning icons, info icons, lightbulb icons, etc.)
- Individual screws or small components shown in isolation
- Decorative elements
- Simple diagrams showing only screw types or part numbers
- Header/footer graphics
- Logos or branding elements

INSTRUCTIONAL images include:
- Step-by-step assembly/disassembly photos showing hands or tools
- Diagrams showing where components are located in the device
- Before/after comparison images
- Annotated photos showing specific parts to remove/install
- Multi-step procedure illustrations

Here are the instructions from the manual:
{manual_text}

Your task is to:
1. Analyze each image in the order they were provided
2. Determine if the image is an actual instruction (step-by-step photo or useful diagram) or just a non-instructional graphic (icon, logo, isolated component)
3. For instructional images, identify which specific instruction or procedure it corresponds to and provide a clear description
4. For non-instructional images, mark is_instruction as false and use N/A for all other fields

Please output your response as a valid JSON object. For each image provided, add one entry to the matches array.
{{
  "matches": [
    {{
      "image_index": 0,
      "is_instruction": true,
      "instruction_title": "Title or name of the instruction, or N/A if not an instruction",
      "instruction_description": "Clear, user-friendly description of what to do in this step (2-3 sentences, suitable for text-to-speech). For non-instructional images, use N/A.",
      "instruction_reference": "Line numbers or section reference from the manual, or N/A if not an instruction",
      "confidence": "high/medium/low",
      "reasoning": "Brief explanation of why this is or isn't an instructional image"
    }}
  ]
}}

Guidelines for instruction_description:
- Write in clear, simple language suitable for audio playback
- Use second person (e.g., "Remove the screw..." not "The screw is removed...")
- Be specific about what action to take
- Include relevant safety warnings if visible in the image
- Keep it concise (2-3 sentences maximum)
- For non-instructional images, just use "N/A"

Only return the JSON object, no additional text."#
    )
}
