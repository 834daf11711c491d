use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

use crate::models::{Language, SourceImage};

#[derive(Debug, Error)]
#[error("image synthesis failed: {0}")]
pub struct SynthesisError(pub String);

#[derive(Debug, Error)]
#[error("scene analysis failed: {0}")]
pub struct AnalysisError(pub String);

#[derive(Debug, Error)]
#[error("narration script failed: {0}")]
pub struct ScriptError(pub String);

#[derive(Debug, Error)]
#[error("archive assembly failed: {0}")]
pub struct ArchiveError(pub String);

/// Renders a new image from a prompt and the source photo.
#[async_trait]
pub trait ImageSynthesisService: Send + Sync {
    /// Returns PNG bytes. A response without an image payload is an error.
    async fn synthesize(&self, prompt: &str, image: &SourceImage) -> Result<Bytes, SynthesisError>;
}

#[async_trait]
pub trait NarrationService: Send + Sync {
    /// Short caption of the scene's subject and setting.
    async fn analyze_scene(&self, image: &SourceImage) -> Result<String, AnalysisError>;

    /// Voice-over text for the full horizon sequence. `scene` may be empty.
    async fn write_script(&self, language: Language, scene: &str) -> Result<String, ScriptError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    pub name: String,
    pub bytes: Bytes,
    pub is_text: bool,
}

/// Bundles named blobs into one downloadable file.
#[async_trait]
pub trait ArchiveBuilder: Send + Sync {
    async fn build(&self, entries: Vec<ArchiveEntry>) -> Result<Bytes, ArchiveError>;
}
