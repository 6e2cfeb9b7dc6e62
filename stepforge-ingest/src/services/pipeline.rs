//! End-to-end ingestion pipeline
//!
//! Drives one document through hash → extract → classify → materialize →
//! derive. The ledger is the idempotency guard: a document whose hash
//! already has rows skips extraction and classification entirely and goes
//! straight to asset derivation, which itself reuses whatever is on disk.

use crate::db::steps;
use crate::services::asset_generator::AssetGenerator;
use crate::services::classifier_client::ClassifierClient;
use crate::services::content_hash::ContentHash;
use crate::services::pdf_extractor;
use crate::services::step_recorder::StepRecorder;
use crate::models::PipelineOutcome;
use sqlx::SqlitePool;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use stepforge_common::{Error, Result};

/// Per-request derivation settings.
#[derive(Debug, Clone)]
pub struct DerivationRequest {
    /// Narration voice; falls back to the configured default when unset
    pub voice_id: Option<String>,
    pub narration: bool,
    pub models: bool,
}

impl Default for DerivationRequest {
    fn default() -> Self {
        Self {
            voice_id: None,
            narration: true,
            models: true,
        }
    }
}

pub struct IngestPipeline {
    db: SqlitePool,
    volume_dir: PathBuf,
    classifier: Option<Arc<ClassifierClient>>,
    recorder: StepRecorder,
    generator: Arc<AssetGenerator>,
    default_voice: String,
}

impl IngestPipeline {
    pub fn new(
        db: SqlitePool,
        volume_dir: PathBuf,
        classifier: Option<Arc<ClassifierClient>>,
        generator: Arc<AssetGenerator>,
        default_voice: String,
    ) -> Self {
        let recorder = StepRecorder::new(db.clone(), volume_dir.clone());
        Self {
            db,
            volume_dir,
            classifier,
            recorder,
            generator,
            default_voice,
        }
    }

    /// Process one PDF: materialize its step ledger (once per content hash)
    /// and derive the requested assets.
    pub async fn run(
        &self,
        pdf_path: &Path,
        pdf_filename: &str,
        request: &DerivationRequest,
    ) -> Result<PipelineOutcome> {
        let hash = ContentHash::of_file(pdf_path).await?;
        let prefix = hash.prefix().to_string();

        tracing::info!(pdf_hash = %prefix, filename = pdf_filename, "Processing document");

        let existing = steps::count_steps(&self.db, hash.as_hex()).await? as usize;

        // A fresh document needs every requested collaborator: its steps do
        // not exist yet, so nothing can be satisfied by reuse. Fail before
        // any bytes land in the volume.
        if existing == 0 {
            if self.classifier.is_none() {
                return Err(Error::missing_credential("Classification", "GEMINI_API_KEY"));
            }
            if request.narration && !self.generator.narration_configured() {
                return Err(Error::missing_credential("Narration", "FISH_AUDIO_API_KEY"));
            }
            if request.models && !self.generator.models_configured() {
                return Err(Error::missing_credential("3D reconstruction", "TRIPO_API_KEY"));
            }
        }

        self.store_original(pdf_path, &prefix).await?;

        let steps_processed = if existing > 0 {
            tracing::info!(
                pdf_hash = %prefix,
                steps = existing,
                "Ledger rows exist; skipping extraction and classification"
            );
            existing
        } else {
            self.materialize(&hash, pdf_path, pdf_filename).await?
        };

        if steps_processed == 0 {
            tracing::warn!(pdf_hash = %prefix, "No instructional steps found");
            return Ok(PipelineOutcome {
                pdf_hash: prefix,
                steps_processed: 0,
                narration: None,
                models: None,
            });
        }

        let voice = request.voice_id.as_deref().unwrap_or(&self.default_voice);
        let (narration, models) = self
            .generator
            .generate_all(
                hash.as_hex(),
                &prefix,
                voice,
                request.narration,
                request.models,
            )
            .await?;

        tracing::info!(
            pdf_hash = %prefix,
            steps = steps_processed,
            "Processing complete"
        );

        Ok(PipelineOutcome {
            pdf_hash: prefix,
            steps_processed,
            narration,
            models,
        })
    }

    /// Extract, classify, and record the step rows for a new document.
    async fn materialize(
        &self,
        hash: &ContentHash,
        pdf_path: &Path,
        pdf_filename: &str,
    ) -> Result<usize> {
        // Guaranteed by the preflight in run(); kept as a guard for direct
        // callers.
        let classifier = self
            .classifier
            .as_ref()
            .ok_or_else(|| Error::missing_credential("Classification", "GEMINI_API_KEY"))?;

        let prefix = hash.prefix();
        let content = pdf_extractor::extract_pdf_content(pdf_path, &self.volume_dir, prefix).await?;

        if content.images.is_empty() {
            tracing::warn!(pdf_hash = prefix, "PDF contains no extractable images");
            return Ok(0);
        }

        let manual_text = tokio::fs::read_to_string(self.volume_dir.join(&content.manual_filename))
            .await?;

        let image_paths: Vec<PathBuf> = content
            .images
            .iter()
            .map(|img| self.volume_dir.join(&img.filename))
            .collect();

        let judgments = classifier
            .classify(&image_paths, &manual_text)
            .await
            .map_err(|e| Error::internal(format!("Classification failed: {e}")))?;

        tracing::info!(
            pdf_hash = prefix,
            images = content.images.len(),
            instructional = judgments.iter().filter(|j| j.is_instruction).count(),
            "Classification complete"
        );

        self.recorder
            .record_steps(hash, pdf_filename, &content.images, &judgments)
            .await
    }

    /// Keep the original bytes addressable by hash for later retrieval.
    async fn store_original(&self, pdf_path: &Path, prefix: &str) -> Result<()> {
        let stored = self.volume_dir.join(format!("{prefix}.pdf"));
        if stored.exists() || stored == pdf_path {
            return Ok(());
        }
        tokio::fs::copy(pdf_path, &stored).await?;
        Ok(())
    }
}
