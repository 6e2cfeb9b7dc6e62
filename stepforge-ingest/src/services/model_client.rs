//! 3D reconstruction client (Tripo)
//!
//! Turns one step's instructional image into a GLB model through Tripo's
//! task API: upload the image, create an image-to-model task, poll until the
//! task settles, download the model.
//!
//! A task that settles without producing a model (failed/cancelled, or no
//! model URL in the output) is reported as `Ok(None)`, distinct from
//! transport and API errors.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

const TRIPO_BASE_URL: &str = "https://api.tripo3d.ai/v2/openapi";
const POLL_INTERVAL: Duration = Duration::from_secs(5);
// Client-side guard against a task that never settles; not an orchestrator
// timeout, which intentionally does not exist.
const MAX_POLLS: u32 = 120;

/// Model client errors
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("API error {0}: {1}")]
    Api(u16, String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Task {0} did not settle after {1} polls")]
    PollTimeout(String, u32),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Seam for 3D reconstruction, mirrored by test fakes.
#[async_trait]
pub trait ModelReconstructor: Send + Sync {
    /// Build a model from `image_path`, writing `<hash_prefix>-<step>.glb`
    /// into `out_dir`. `Ok(None)` means the service produced no model.
    async fn reconstruct(
        &self,
        image_path: &Path,
        hash_prefix: &str,
        step: i64,
        out_dir: &Path,
    ) -> Result<Option<String>, ModelError>;
}

#[derive(Debug, Deserialize)]
struct ApiEnvelope<T> {
    code: i64,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct UploadData {
    image_token: String,
}

#[derive(Debug, Deserialize)]
struct TaskCreated {
    task_id: String,
}

#[derive(Debug, Deserialize)]
struct TaskData {
    status: String,
    #[serde(default)]
    output: Option<TaskOutput>,
}

#[derive(Debug, Deserialize)]
struct TaskOutput {
    #[serde(default)]
    pbr_model: Option<String>,
    #[serde(default)]
    model: Option<String>,
}

/// Tripo image-to-model client
pub struct ModelClient {
    http_client: reqwest::Client,
    api_key: String,
}

impl ModelClient {
    pub fn new(api_key: String) -> Result<Self, ModelError> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| ModelError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            api_key,
        })
    }

    async fn upload_image(&self, image_path: &Path) -> Result<String, ModelError> {
        let bytes = tokio::fs::read(image_path).await?;
        let file_name = image_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("image.jpg")
            .to_string();

        let part = reqwest::multipart::Part::bytes(bytes).file_name(file_name);
        let form = reqwest::multipart::Form::new().part("file", part);

        let response = self
            .http_client
            .post(format!("{TRIPO_BASE_URL}/upload"))
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| ModelError::Network(e.to_string()))?;

        let envelope: ApiEnvelope<UploadData> = Self::read_envelope(response).await?;
        envelope
            .data
            .map(|d| d.image_token)
            .ok_or_else(|| ModelError::Parse("Upload response missing image token".to_string()))
    }

    async fn create_task(&self, image_token: &str, file_type: &str) -> Result<String, ModelError> {
        let body = json!({
            "type": "image_to_model",
            "file": {
                "type": file_type,
                "file_token": image_token,
            }
        });

        let response = self
            .http_client
            .post(format!("{TRIPO_BASE_URL}/task"))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ModelError::Network(e.to_string()))?;

        let envelope: ApiEnvelope<TaskCreated> = Self::read_envelope(response).await?;
        envelope
            .data
            .map(|d| d.task_id)
            .ok_or_else(|| ModelError::Parse("Task response missing task id".to_string()))
    }

    async fn wait_for_task(&self, task_id: &str) -> Result<TaskData, ModelError> {
        for _ in 0..MAX_POLLS {
            let response = self
                .http_client
                .get(format!("{TRIPO_BASE_URL}/task/{task_id}"))
                .bearer_auth(&self.api_key)
                .send()
                .await
                .map_err(|e| ModelError::Network(e.to_string()))?;

            let envelope: ApiEnvelope<TaskData> = Self::read_envelope(response).await?;
            let task = envelope
                .data
                .ok_or_else(|| ModelError::Parse("Task poll response missing data".to_string()))?;

            match task.status.as_str() {
                "success" | "failed" | "cancelled" | "banned" => return Ok(task),
                other => {
                    tracing::debug!(task_id, status = other, "Reconstruction task pending");
                    tokio::time::sleep(POLL_INTERVAL).await;
                }
            }
        }

        Err(ModelError::PollTimeout(task_id.to_string(), MAX_POLLS))
    }

    async fn download_model(
        &self,
        url: &str,
        hash_prefix: &str,
        step: i64,
        out_dir: &Path,
    ) -> Result<String, ModelError> {
        let response = self
            .http_client
            .get(url)
            .send()
            .await
            .map_err(|e| ModelError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ModelError::Api(status.as_u16(), "Model download failed".to_string()));
        }

        let content = response
            .bytes()
            .await
            .map_err(|e| ModelError::Network(e.to_string()))?;

        let filename = format!("{hash_prefix}-{step}.glb");
        tokio::fs::write(out_dir.join(&filename), &content).await?;

        tracing::info!(filename = %filename, bytes = content.len(), "Model saved");

        Ok(filename)
    }

    async fn read_envelope<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<ApiEnvelope<T>, ModelError> {
        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(ModelError::Api(status.as_u16(), error_text));
        }

        let envelope: ApiEnvelope<T> = response
            .json()
            .await
            .map_err(|e| ModelError::Parse(e.to_string()))?;

        if envelope.code != 0 {
            return Err(ModelError::Api(200, format!("Service code {}", envelope.code)));
        }

        Ok(envelope)
    }
}

#[async_trait]
impl ModelReconstructor for ModelClient {
    async fn reconstruct(
        &self,
        image_path: &Path,
        hash_prefix: &str,
        step: i64,
        out_dir: &Path,
    ) -> Result<Option<String>, ModelError> {
        let file_type = match image_path.extension().and_then(|e| e.to_str()) {
            Some("png") => "png",
            Some("webp") => "webp",
            _ => "jpg",
        };

        let image_token = self.upload_image(image_path).await?;
        let task_id = self.create_task(&image_token, file_type).await?;

        tracing::debug!(task_id = %task_id, hash_prefix, step, "Reconstruction task created");

        let task = self.wait_for_task(&task_id).await?;

        if task.status != "success" {
            tracing::warn!(task_id = %task_id, status = %task.status, "Reconstruction produced no model");
            return Ok(None);
        }

        let model_url = task
            .output
            .and_then(|o| o.pbr_model.or(o.model));

        match model_url {
            Some(url) => {
                let filename = self.download_model(&url, hash_prefix, step, out_dir).await?;
                Ok(Some(filename))
            }
            None => {
                tracing::warn!(task_id = %task_id, "Task succeeded but returned no model URL");
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        assert!(ModelClient::new("test_key".to_string()).is_ok());
    }

    #[test]
    fn test_envelope_parses_task_data() {
        let body = r#"{"code":0,"data":{"status":"success","output":{"pbr_model":"https://e/x.glb"}}}"#;
        let envelope: ApiEnvelope<TaskData> = serde_json::from_str(body).unwrap();
        assert_eq!(envelope.code, 0);
        let task = envelope.data.unwrap();
        assert_eq!(task.status, "success");
        assert_eq!(
            task.output.unwrap().pbr_model.as_deref(),
            Some("https://e/x.glb")
        );
    }
}
