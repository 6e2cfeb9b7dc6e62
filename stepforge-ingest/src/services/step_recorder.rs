//! Step materialization
//!
//! Turns raw classifier output into the step ledger for a document: filters
//! to instructional judgments, assigns contiguous 0-based step numbers in
//! judgment order, copies each source image into the `<prefix>-<step>.<ext>`
//! naming scheme, writes the two-part instruction text artifact, and inserts
//! one ledger row per step.
//!
//! After this pass the document's step numbering, image references, and
//! instruction text are fixed; later derivation failures never change them.

use crate::db::steps::{self, NewStep};
use crate::models::{ExtractedImage, ImageJudgment};
use crate::services::content_hash::ContentHash;
use crate::services::pdf_extractor::image_extension;
use sqlx::SqlitePool;
use std::path::PathBuf;
use stepforge_common::Result;

pub struct StepRecorder {
    db: SqlitePool,
    volume_dir: PathBuf,
}

impl StepRecorder {
    pub fn new(db: SqlitePool, volume_dir: PathBuf) -> Self {
        Self { db, volume_dir }
    }

    /// Materialize the ledger rows for one document.
    ///
    /// Idempotent: if the document already has rows, nothing is filtered,
    /// copied, or written, and the existing row count is returned.
    ///
    /// A classified instructional entry whose source image is missing is
    /// skipped with a warning before step numbers are assigned, so recorded
    /// steps stay contiguous from 0. Per-image failures never abort the
    /// remaining steps.
    pub async fn record_steps(
        &self,
        hash: &ContentHash,
        pdf_filename: &str,
        images: &[ExtractedImage],
        judgments: &[ImageJudgment],
    ) -> Result<usize> {
        let existing = steps::count_steps(&self.db, hash.as_hex()).await?;
        if existing > 0 {
            tracing::info!(
                pdf_hash = hash.prefix(),
                skipped_rows = existing,
                "Document already materialized; skipping"
            );
            return Ok(existing as usize);
        }

        let prefix = hash.prefix();
        let mut step: i64 = 0;

        for judgment in judgments {
            if !judgment.is_instruction {
                continue;
            }

            // Resolve the source image before assigning a step number, so a
            // missing image contributes neither a record nor a gap.
            let Some(image) = images.get(judgment.image_index) else {
                tracing::warn!(
                    pdf_hash = prefix,
                    image_index = judgment.image_index,
                    title = %judgment.instruction_title,
                    "Classified image index out of range; instruction dropped"
                );
                continue;
            };

            let src_path = self.volume_dir.join(&image.filename);
            if tokio::fs::metadata(&src_path).await.is_err() {
                tracing::warn!(
                    pdf_hash = prefix,
                    image = %image.filename,
                    title = %judgment.instruction_title,
                    "Source image missing from volume; instruction dropped"
                );
                continue;
            }

            let ext = image_extension(&image.filename);
            let image_filename = format!("{prefix}-{step}.{ext}");
            let instruction_filename = format!("{prefix}-{step}.txt");

            // Copy, not move: the raw extraction file may still be referenced
            tokio::fs::copy(&src_path, self.volume_dir.join(&image_filename)).await?;

            let instruction_text = format!(
                "{}\n\n{}",
                judgment.instruction_title, judgment.instruction_description
            );
            tokio::fs::write(
                self.volume_dir.join(&instruction_filename),
                &instruction_text,
            )
            .await?;

            steps::insert_step(
                &self.db,
                &NewStep {
                    pdf_hash: hash.as_hex().to_string(),
                    pdf_filename: pdf_filename.to_string(),
                    step,
                    image_filename: image_filename.clone(),
                    instruction_filename,
                    position: image.position,
                },
            )
            .await?;

            tracing::debug!(
                pdf_hash = prefix,
                step,
                image = %image_filename,
                "Recorded step"
            );

            step += 1;
        }

        tracing::info!(
            pdf_hash = prefix,
            steps = step,
            "Materialized step ledger"
        );

        Ok(step as usize)
    }
}
