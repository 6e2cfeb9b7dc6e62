//! Shared data types for the ingest pipeline

use serde::{Deserialize, Serialize};

/// Position of an extracted image on its source page.
///
/// `y_percentage` measures from the top of the page (0-100), independent of
/// rendered resolution, so the frontend can overlay markers on any zoom level.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ImagePosition {
    /// 0-indexed page number
    pub page_number: i64,
    /// Vertical position as percentage from page top (0-100)
    pub y_percentage: f64,
}

/// One image extracted from a PDF, in extraction order.
#[derive(Debug, Clone)]
pub struct ExtractedImage {
    /// Filename within the volume directory
    pub filename: String,
    /// Page position, when the extractor could resolve one
    pub position: Option<ImagePosition>,
}

/// Full extraction output for one PDF.
#[derive(Debug)]
pub struct ExtractedContent {
    /// Extracted images in page/document order
    pub images: Vec<ExtractedImage>,
    /// Filename of the concatenated manual text within the volume directory
    pub manual_filename: String,
}

/// One per-image judgment from the vision classifier.
///
/// Entries arrive in image submission order but gaps and exclusions are
/// expected; callers filter on `is_instruction` rather than assuming a
/// contiguous instructional sequence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageJudgment {
    /// Index back into the submitted image list
    pub image_index: usize,
    /// Whether the image is a genuine step-by-step instruction
    pub is_instruction: bool,
    /// Title of the matched instruction ("N/A" for non-instructional)
    pub instruction_title: String,
    /// Narration-ready description of the step
    pub instruction_description: String,
    /// Manual section or line reference, when the classifier found one
    #[serde(default)]
    pub instruction_reference: Option<String>,
    /// Classifier self-reported confidence (high/medium/low)
    #[serde(default)]
    pub confidence: Option<String>,
    /// Classifier reasoning, for diagnostics only
    #[serde(default)]
    pub reasoning: Option<String>,
}

/// Outcome counts for one asset-kind derivation batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    /// Assets produced by a fresh external call
    pub generated: usize,
    /// Assets whose file already existed on disk (no external call made)
    pub reused: usize,
    /// Steps whose derivation failed; their ledger field stays unset
    pub failed: usize,
}

/// Result of a full ingestion run for one document.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineOutcome {
    /// 16-char hash prefix identifying the document externally
    pub pdf_hash: String,
    /// Number of instructional steps in the ledger for this document
    pub steps_processed: usize,
    /// Narration batch counts when narration was requested
    pub narration: Option<BatchSummary>,
    /// 3D-model batch counts when reconstruction was requested
    pub models: Option<BatchSummary>,
}
