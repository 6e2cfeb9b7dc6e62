//! Asset derivation orchestration
//!
//! For a materialized document, drives the two derivation pipelines
//! (narration audio, 3D models) across all steps. Each asset kind runs as
//! one fan-out batch; the two kinds run concurrently and neither is fatal
//! to the other.
//!
//! Derivation is idempotent at the file level: the expected output name
//! `<hash-prefix>-<step>.<ext>` is checked before any external call, and an
//! existing file is adopted into the ledger as "reused". Running a batch
//! twice with no files deleted issues zero external calls the second time.
//!
//! Fan-out tasks carry their step number through to completion, so results
//! are reassociated by key rather than by submission order.

use crate::db::steps::{self, StepRecord};
use crate::models::BatchSummary;
use crate::services::model_client::ModelReconstructor;
use crate::services::narration_client::NarrationSynthesizer;
use futures::stream::{FuturesUnordered, StreamExt};
use sqlx::SqlitePool;
use std::path::PathBuf;
use std::sync::Arc;
use stepforge_common::{Error, Result};

pub struct AssetGenerator {
    db: SqlitePool,
    volume_dir: PathBuf,
    narration: Option<Arc<dyn NarrationSynthesizer>>,
    models: Option<Arc<dyn ModelReconstructor>>,
}

impl AssetGenerator {
    pub fn new(
        db: SqlitePool,
        volume_dir: PathBuf,
        narration: Option<Arc<dyn NarrationSynthesizer>>,
        models: Option<Arc<dyn ModelReconstructor>>,
    ) -> Self {
        Self {
            db,
            volume_dir,
            narration,
            models,
        }
    }

    pub fn narration_configured(&self) -> bool {
        self.narration.is_some()
    }

    pub fn models_configured(&self) -> bool {
        self.models.is_some()
    }

    /// Run the requested derivation batches for one document.
    ///
    /// A requested kind whose client is unwired fails with a configuration
    /// error before either batch starts, unless every expected output for
    /// that kind is already on disk and reuse alone can satisfy it. Once
    /// launched, the narration and model batches run concurrently; a failure
    /// inside one batch never cancels tasks in the other.
    pub async fn generate_all(
        &self,
        pdf_hash: &str,
        prefix: &str,
        voice_id: &str,
        want_narration: bool,
        want_models: bool,
    ) -> Result<(Option<BatchSummary>, Option<BatchSummary>)> {
        let records = steps::steps_for_document(&self.db, pdf_hash).await?;
        if want_narration && self.narration.is_none() && self.outputs_missing(&records, prefix, "mp3") {
            return Err(Error::missing_credential("Narration", "FISH_AUDIO_API_KEY"));
        }
        if want_models && self.models.is_none() && self.outputs_missing(&records, prefix, "glb") {
            return Err(Error::missing_credential("3D reconstruction", "TRIPO_API_KEY"));
        }

        let narration_batch = async {
            if want_narration {
                Some(self.generate_narrations(pdf_hash, prefix, voice_id).await)
            } else {
                None
            }
        };
        let model_batch = async {
            if want_models {
                Some(self.generate_models(pdf_hash, prefix).await)
            } else {
                None
            }
        };

        let (narration, models) = tokio::join!(narration_batch, model_batch);
        Ok((narration.transpose()?, models.transpose()?))
    }

    /// Narration batch: one audio clip per step.
    pub async fn generate_narrations(
        &self,
        pdf_hash: &str,
        prefix: &str,
        voice_id: &str,
    ) -> Result<BatchSummary> {
        let records = steps::steps_for_document(&self.db, pdf_hash).await?;
        let mut summary = BatchSummary::default();
        let mut pending: Vec<(i64, String)> = Vec::new();

        for record in &records {
            let expected = format!("{prefix}-{}.mp3", record.step);
            if self.volume_dir.join(&expected).exists() {
                steps::update_mp3_filename(&self.db, pdf_hash, record.step, &expected).await?;
                summary.reused += 1;
                continue;
            }

            match self.instruction_description(record).await {
                Ok(text) => pending.push((record.step, text)),
                Err(e) => {
                    tracing::warn!(
                        pdf_hash = prefix,
                        step = record.step,
                        error = %e,
                        "Could not read instruction text; narration skipped"
                    );
                    summary.failed += 1;
                }
            }
        }

        if pending.is_empty() {
            tracing::info!(pdf_hash = prefix, reused = summary.reused, "All narrations reused");
            return Ok(summary);
        }

        let client = self
            .narration
            .as_ref()
            .ok_or_else(|| Error::missing_credential("Narration", "FISH_AUDIO_API_KEY"))?;

        tracing::info!(
            pdf_hash = prefix,
            to_generate = pending.len(),
            reused = summary.reused,
            voice = voice_id,
            "Generating narrations"
        );

        let mut tasks = FuturesUnordered::new();
        for (step, text) in pending {
            let client = Arc::clone(client);
            let volume_dir = self.volume_dir.clone();
            let prefix = prefix.to_string();
            let voice = voice_id.to_string();
            tasks.push(async move {
                let result = client
                    .synthesize(&text, &prefix, step, &voice, &volume_dir)
                    .await;
                (step, result)
            });
        }

        while let Some((step, result)) = tasks.next().await {
            match result {
                Ok(filename) => {
                    steps::update_mp3_filename(&self.db, pdf_hash, step, &filename).await?;
                    summary.generated += 1;
                }
                Err(e) => {
                    tracing::warn!(pdf_hash = prefix, step, error = %e, "Narration failed");
                    summary.failed += 1;
                }
            }
        }

        tracing::info!(
            pdf_hash = prefix,
            generated = summary.generated,
            reused = summary.reused,
            failed = summary.failed,
            "Narration batch complete"
        );

        Ok(summary)
    }

    /// 3D-model batch: one GLB per step's instructional image.
    pub async fn generate_models(&self, pdf_hash: &str, prefix: &str) -> Result<BatchSummary> {
        let records = steps::steps_for_document(&self.db, pdf_hash).await?;
        let mut summary = BatchSummary::default();
        let mut pending: Vec<(i64, PathBuf)> = Vec::new();

        for record in &records {
            let expected = format!("{prefix}-{}.glb", record.step);
            if self.volume_dir.join(&expected).exists() {
                steps::update_glb_filename(&self.db, pdf_hash, record.step, &expected).await?;
                summary.reused += 1;
                continue;
            }
            pending.push((record.step, self.volume_dir.join(&record.image_filename)));
        }

        if pending.is_empty() {
            tracing::info!(pdf_hash = prefix, reused = summary.reused, "All models reused");
            return Ok(summary);
        }

        let client = self
            .models
            .as_ref()
            .ok_or_else(|| Error::missing_credential("3D reconstruction", "TRIPO_API_KEY"))?;

        tracing::info!(
            pdf_hash = prefix,
            to_generate = pending.len(),
            reused = summary.reused,
            "Generating 3D models"
        );

        let mut tasks = FuturesUnordered::new();
        for (step, image_path) in pending {
            let client = Arc::clone(client);
            let volume_dir = self.volume_dir.clone();
            let prefix = prefix.to_string();
            tasks.push(async move {
                let result = client
                    .reconstruct(&image_path, &prefix, step, &volume_dir)
                    .await;
                (step, result)
            });
        }

        while let Some((step, result)) = tasks.next().await {
            match result {
                Ok(Some(filename)) => {
                    steps::update_glb_filename(&self.db, pdf_hash, step, &filename).await?;
                    summary.generated += 1;
                }
                Ok(None) => {
                    tracing::warn!(pdf_hash = prefix, step, "No model produced for step");
                    summary.failed += 1;
                }
                Err(e) => {
                    tracing::warn!(pdf_hash = prefix, step, error = %e, "Reconstruction failed");
                    summary.failed += 1;
                }
            }
        }

        tracing::info!(
            pdf_hash = prefix,
            generated = summary.generated,
            reused = summary.reused,
            failed = summary.failed,
            "Model batch complete"
        );

        Ok(summary)
    }

    /// Single-step narration, used by the accessor when a requested audio
    /// asset is absent. Makes at most one external call; an output file
    /// already on disk is adopted without a call.
    pub async fn ensure_narration(
        &self,
        record: &StepRecord,
        prefix: &str,
        voice_id: &str,
    ) -> Result<String> {
        let expected = format!("{prefix}-{}.mp3", record.step);
        if self.volume_dir.join(&expected).exists() {
            steps::update_mp3_filename(&self.db, &record.pdf_hash, record.step, &expected).await?;
            return Ok(expected);
        }

        let text = self.instruction_description(record).await?;
        let client = self
            .narration
            .as_ref()
            .ok_or_else(|| Error::missing_credential("Narration regeneration", "FISH_AUDIO_API_KEY"))?;

        tracing::info!(
            pdf_hash = prefix,
            step = record.step,
            "Regenerating missing narration on demand"
        );

        let filename = client
            .synthesize(&text, prefix, record.step, voice_id, &self.volume_dir)
            .await
            .map_err(|e| {
                Error::internal(format!(
                    "Narration regeneration failed for step {}: {e}",
                    record.step
                ))
            })?;

        steps::update_mp3_filename(&self.db, &record.pdf_hash, record.step, &filename).await?;

        Ok(filename)
    }

    /// True when at least one step still needs its `<prefix>-<step>.<ext>`
    /// output, meaning the kind cannot be satisfied by reuse alone.
    fn outputs_missing(&self, records: &[StepRecord], prefix: &str, ext: &str) -> bool {
        records.iter().any(|record| {
            !self
                .volume_dir
                .join(format!("{prefix}-{}.{ext}", record.step))
                .exists()
        })
    }

    /// The narrated portion of a step's instruction artifact: the paragraph
    /// after the title line, or the whole text when no blank line separates
    /// them.
    async fn instruction_description(&self, record: &StepRecord) -> Result<String> {
        let path = self.volume_dir.join(&record.instruction_filename);
        let content = tokio::fs::read_to_string(&path).await?;
        let content = content.trim();
        let description = match content.split_once("\n\n") {
            Some((_title, description)) => description.trim(),
            None => content,
        };
        Ok(description.to_string())
    }
}
