//! Renders a photo at six future horizons after humans disappear, writes a
//! narration for the sequence and packages everything as a zip.

pub mod archive;
pub mod chart;
pub mod config;
pub mod error;
pub mod gemini;
pub mod locale;
pub mod models;
pub mod pipeline;
pub mod routes;
pub mod services;
pub mod streetview;

pub use config::AppConfig;
pub use error::{ApiError, PipelineError};
pub use pipeline::{ArchiveHandle, GenerationPipeline};
pub use routes::{router, AppState};
