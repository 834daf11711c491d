use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Path, Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use parking_lot::RwLock;
use std::{collections::HashMap, sync::Arc};
use tower_http::cors::{Any, CorsLayer};
use uuid::Uuid;

use crate::{
    archive::ZipArchiveBuilder,
    chart::{self, DecayChart},
    config::AppConfig,
    error::{ApiError, PipelineError},
    gemini::GeminiClient,
    locale,
    models::{GenerateBody, Horizon, HorizonView, LocaleQuery, SessionView, SourceImage, SourceUpload},
    pipeline::GenerationPipeline,
    services::{ArchiveBuilder, ImageSynthesisService, NarrationService},
    streetview::{self, StreetViewError, StreetViewRequest},
};

#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<RwLock<HashMap<Uuid, GenerationPipeline>>>,
    pub synthesizer: Arc<dyn ImageSynthesisService>,
    pub narrator: Arc<dyn NarrationService>,
    pub archiver: Arc<dyn ArchiveBuilder>,
    pub http: reqwest::Client,
    pub config: Arc<AppConfig>,
}

impl AppState {
    /// Gemini for both AI collaborators, zip for archives.
    pub fn new(config: AppConfig) -> Self {
        let gemini = Arc::new(GeminiClient::new(&config));
        Self::with_services(config, gemini.clone(), gemini, Arc::new(ZipArchiveBuilder))
    }

    pub fn with_services(
        config: AppConfig,
        synthesizer: Arc<dyn ImageSynthesisService>,
        narrator: Arc<dyn NarrationService>,
        archiver: Arc<dyn ArchiveBuilder>,
    ) -> Self {
        Self {
            sessions: Arc::default(),
            synthesizer,
            narrator,
            archiver,
            http: reqwest::Client::new(),
            config: Arc::new(config),
        }
    }

    fn pipeline(&self, id: Uuid) -> Result<GenerationPipeline, ApiError> {
        self.sessions.read().get(&id).cloned().ok_or(ApiError::SessionNotFound(id))
    }
}

pub fn router(state: AppState) -> Router {
    let body_limit = state.config.max_upload_bytes;
    Router::new()
        .route("/api/sessions", post(create_session))
        .route("/api/sessions/:id", get(get_session).delete(delete_session))
        .route("/api/sessions/:id/source", post(submit_source))
        .route("/api/sessions/:id/source/streetview", post(submit_streetview))
        .route("/api/sessions/:id/generate", post(start_generation))
        .route("/api/sessions/:id/artifacts/:index", get(get_artifact))
        .route("/api/sessions/:id/archive", get(download_archive))
        .route("/api/horizons", get(list_horizons))
        .route("/api/decay-chart", get(get_decay_chart))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

fn view(id: Uuid, pipeline: &GenerationPipeline) -> SessionView {
    SessionView { id, run: pipeline.snapshot() }
}

pub async fn create_session(State(state): State<AppState>) -> impl IntoResponse {
    let id = Uuid::new_v4();
    let pipeline = GenerationPipeline::new(
        state.synthesizer.clone(),
        state.narrator.clone(),
        state.archiver.clone(),
    );
    let body = view(id, &pipeline);
    state.sessions.write().insert(id, pipeline);
    tracing::info!("🆕 Created session {}", id);
    (StatusCode::CREATED, Json(body))
}

pub async fn get_session(Path(id): Path<Uuid>, State(state): State<AppState>) -> Result<Json<SessionView>, ApiError> {
    let pipeline = state.pipeline(id)?;
    Ok(Json(view(id, &pipeline)))
}

/// Drops the session and stops whatever it was still generating.
pub async fn delete_session(Path(id): Path<Uuid>, State(state): State<AppState>) -> Result<StatusCode, ApiError> {
    let pipeline = state.sessions.write().remove(&id).ok_or(ApiError::SessionNotFound(id))?;
    pipeline.cancel();
    tracing::info!("🗑️ Deleted session {}", id);
    Ok(StatusCode::NO_CONTENT)
}

pub async fn submit_source(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    Json(body): Json<SourceUpload>,
) -> Result<Json<SessionView>, ApiError> {
    let pipeline = state.pipeline(id)?;
    if body.data.is_empty() {
        return Err(ApiError::InvalidSource("image is empty".into()));
    }
    if !body.mime_type.starts_with("image/") {
        return Err(ApiError::InvalidSource(format!("unsupported type {}", body.mime_type)));
    }
    pipeline.submit_source(SourceImage::new(body.mime_type, body.data));
    Ok(Json(view(id, &pipeline)))
}

pub async fn submit_streetview(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    Json(body): Json<StreetViewRequest>,
) -> Result<Json<SessionView>, ApiError> {
    let pipeline = state.pipeline(id)?;
    let key = state.config.google_maps_api_key.as_deref().ok_or(ApiError::MapDisabled)?;
    let image = streetview::fetch_frame(&state.http, &body, key).await.map_err(|e| match e {
        StreetViewError::InvalidLocation { .. } => ApiError::InvalidSource(e.to_string()),
        other => ApiError::StreetView(other.to_string()),
    })?;
    pipeline.submit_source(image);
    Ok(Json(view(id, &pipeline)))
}

pub async fn start_generation(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let pipeline = state.pipeline(id)?;
    // An empty body selects the configured language; anything else must parse.
    let body: GenerateBody = if body.iter().all(u8::is_ascii_whitespace) {
        GenerateBody::default()
    } else {
        serde_json::from_slice(&body).map_err(|e| ApiError::InvalidRequest(e.to_string()))?
    };
    let language = body.language.unwrap_or(state.config.default_language);
    // Detached; the pipeline keeps the abort handle and records the outcome.
    pipeline.spawn_generation(language)?;
    Ok((StatusCode::ACCEPTED, Json(view(id, &pipeline))))
}

pub async fn get_artifact(
    Path((id, index)): Path<(Uuid, usize)>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ApiError> {
    let pipeline = state.pipeline(id)?;
    let artifact = pipeline.artifact(index).ok_or(ApiError::ArtifactNotFound(index))?;
    Ok(([(header::CONTENT_TYPE, "image/png")], artifact.image))
}

pub async fn download_archive(Path(id): Path<Uuid>, State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let pipeline = state.pipeline(id)?;
    let handle = pipeline.export_archive().await.map_err(|e| match e {
        PipelineError::Archive(_) => ApiError::ZipFailed(locale::archive_failed(pipeline.language()).to_string()),
        other => ApiError::Pipeline(other),
    })?;
    tracing::info!("📦 Session {} exported {} entries", id, handle.entry_names.len());
    let headers = [
        (header::CONTENT_TYPE, handle.content_type.to_string()),
        (header::CONTENT_DISPOSITION, format!("attachment; filename=\"{}\"", handle.file_name)),
    ];
    Ok((headers, handle.bytes))
}

pub async fn list_horizons(Query(query): Query<LocaleQuery>) -> Json<Vec<HorizonView>> {
    let language = query.lang.unwrap_or_default();
    let horizons = Horizon::ALL
        .into_iter()
        .map(|horizon| HorizonView {
            index: horizon.index() + 1,
            horizon,
            years: horizon.years(),
            label: locale::horizon_label(language, horizon).to_string(),
        })
        .collect();
    Json(horizons)
}

pub async fn get_decay_chart(Query(query): Query<LocaleQuery>) -> Json<DecayChart> {
    Json(chart::decay_chart(query.lang.unwrap_or_default(), query.section.as_deref()))
}
