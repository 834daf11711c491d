use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::services::{ArchiveError, ScriptError, SynthesisError};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("no source image has been submitted")]
    NoSource,
    #[error("a generation run is already in progress")]
    AlreadyRunning,
    #[error("horizon {step} ({label}) failed: {source}")]
    Synthesis {
        step: usize,
        label: String,
        #[source]
        source: SynthesisError,
    },
    #[error(transparent)]
    Script(#[from] ScriptError),
    #[error(transparent)]
    Archive(#[from] ArchiveError),
    #[error("nothing to export until a run is ready")]
    NothingToExport,
    #[error("an export is already being assembled")]
    ExportInProgress,
    #[error("run was superseded by a newer source or run")]
    Superseded,
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("session {0} not found")]
    SessionNotFound(Uuid),
    #[error("artifact {0} not found")]
    ArtifactNotFound(usize),
    #[error("invalid request body: {0}")]
    InvalidRequest(String),
    #[error("invalid source image: {0}")]
    InvalidSource(String),
    #[error("map selection is not configured")]
    MapDisabled,
    #[error("street view fetch failed: {0}")]
    StreetView(String),
    /// Localized, retryable archive failure.
    #[error("{0}")]
    ZipFailed(String),
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: &'static str,
    /// Whether the same request may succeed if retried.
    pub recoverable: bool,
}

impl ApiError {
    fn parts(&self) -> (StatusCode, &'static str, bool) {
        match self {
            ApiError::SessionNotFound(_) => (StatusCode::NOT_FOUND, "session_not_found", false),
            ApiError::ArtifactNotFound(_) => (StatusCode::NOT_FOUND, "artifact_not_found", false),
            ApiError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "invalid_request", false),
            ApiError::InvalidSource(_) => (StatusCode::BAD_REQUEST, "invalid_source", false),
            ApiError::MapDisabled => (StatusCode::SERVICE_UNAVAILABLE, "map_disabled", false),
            ApiError::StreetView(_) => (StatusCode::BAD_GATEWAY, "street_view_failed", true),
            ApiError::ZipFailed(_) => (StatusCode::INTERNAL_SERVER_ERROR, "zip_failed", true),
            ApiError::Pipeline(e) => match e {
                PipelineError::NoSource => (StatusCode::UNPROCESSABLE_ENTITY, "no_source", false),
                PipelineError::AlreadyRunning => (StatusCode::CONFLICT, "already_running", false),
                PipelineError::NothingToExport => (StatusCode::CONFLICT, "nothing_to_export", false),
                PipelineError::ExportInProgress => (StatusCode::CONFLICT, "export_in_progress", true),
                PipelineError::Superseded => (StatusCode::CONFLICT, "superseded", false),
                PipelineError::Synthesis { .. } => (StatusCode::BAD_GATEWAY, "synthesis_failed", true),
                PipelineError::Script(_) => (StatusCode::BAD_GATEWAY, "script_failed", true),
                PipelineError::Archive(_) => (StatusCode::INTERNAL_SERVER_ERROR, "zip_failed", true),
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, recoverable) = self.parts();
        if status.is_server_error() {
            tracing::error!("❌ {}", self);
        } else {
            tracing::debug!("request rejected: {}", self);
        }
        let body = ErrorResponse { error: self.to_string(), code, recoverable };
        (status, Json(body)).into_response()
    }
}
