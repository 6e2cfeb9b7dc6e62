//! Narration synthesis client (Fish Audio TTS)
//!
//! Turns one step's instruction text into an MP3 written to the volume
//! directory under the deterministic `<hash-prefix>-<step>.mp3` name.

use async_trait::async_trait;
use serde_json::json;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

const FISH_AUDIO_TTS_URL: &str = "https://api.fish.audio/v1/tts";
pub const DEFAULT_VOICE: &str = "zh_CN-female-1";

/// Narration client errors
#[derive(Debug, Error)]
pub enum NarrationError {
    /// The requested voice ID was rejected by the service
    #[error("Invalid voice ID: {0}")]
    InvalidVoice(String),

    #[error("API error {0}: {1}")]
    Api(u16, String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Seam for narration synthesis, so the orchestrator and the on-demand
/// accessor path can be exercised without the live service.
#[async_trait]
pub trait NarrationSynthesizer: Send + Sync {
    /// Synthesize `text` and write `<hash_prefix>-<step>.mp3` into `out_dir`.
    /// Returns the written filename.
    async fn synthesize(
        &self,
        text: &str,
        hash_prefix: &str,
        step: i64,
        voice_id: &str,
        out_dir: &Path,
    ) -> Result<String, NarrationError>;
}

/// Fish Audio TTS client
pub struct NarrationClient {
    http_client: reqwest::Client,
    api_key: String,
}

impl NarrationClient {
    pub fn new(api_key: String) -> Result<Self, NarrationError> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| NarrationError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            api_key,
        })
    }
}

#[async_trait]
impl NarrationSynthesizer for NarrationClient {
    async fn synthesize(
        &self,
        text: &str,
        hash_prefix: &str,
        step: i64,
        voice_id: &str,
        out_dir: &Path,
    ) -> Result<String, NarrationError> {
        let payload = json!({
            "text": text,
            "model": "fish-speech-1",
            "voice": voice_id,
            "format": "mp3",
        });

        tracing::debug!(hash_prefix, step, voice_id, chars = text.len(), "Requesting narration");

        let response = self
            .http_client
            .post(FISH_AUDIO_TTS_URL)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| NarrationError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            // The service reports an unknown voice in the error body
            if error_text.to_lowercase().contains("voice") {
                return Err(NarrationError::InvalidVoice(voice_id.to_string()));
            }
            return Err(NarrationError::Api(status.as_u16(), error_text));
        }

        let content = response
            .bytes()
            .await
            .map_err(|e| NarrationError::Network(e.to_string()))?;

        let filename = format!("{hash_prefix}-{step}.mp3");
        tokio::fs::write(out_dir.join(&filename), &content).await?;

        tracing::info!(filename = %filename, bytes = content.len(), "Narration saved");

        Ok(filename)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        assert!(NarrationClient::new("test_key".to_string()).is_ok());
    }
}
