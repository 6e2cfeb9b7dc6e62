// Service components for PDF ingestion and asset derivation

pub mod asset_generator;
pub mod classifier_client;
pub mod content_hash;
pub mod model_client;
pub mod narration_client;
pub mod pdf_extractor;
pub mod pipeline;
pub mod step_recorder;

pub use asset_generator::AssetGenerator;
pub use classifier_client::ClassifierClient;
pub use content_hash::ContentHash;
pub use model_client::{ModelClient, ModelReconstructor};
pub use narration_client::{NarrationClient, NarrationSynthesizer};
pub use pipeline::{DerivationRequest, IngestPipeline};
pub use step_recorder::StepRecorder;
