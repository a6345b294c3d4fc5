use askpdf_core::{is_pdf_name, AppConfig, ChunkingConfig, DynPipeline, PipelineError};
use axum::extract::multipart::MultipartRejection;
use axum::extract::rejection::JsonRejection;
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::{header, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

const UPLOAD_FIELD: &str = "file";
const INVALID_UPLOAD: &str = "No valid PDF uploaded try again.";
const PDF_NOT_FOUND: &str = "PDF not found please upload it first";

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub cors_origins: Vec<String>,
    pub max_upload_bytes: usize,
}

#[derive(Clone)]
pub struct AppState {
    pipeline: Arc<DynPipeline>,
    chunking: ChunkingConfig,
    top_k: usize,
}

impl AppState {
    pub fn new(pipeline: DynPipeline, chunking: ChunkingConfig, top_k: usize) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            chunking,
            top_k,
        }
    }

    /// Builds the pipeline and takes chunking and retrieval depth from the
    /// same settings.
    pub fn from_config(config: &AppConfig) -> Result<Self, PipelineError> {
        Ok(Self::new(config.build_pipeline()?, config.chunking, config.top_k))
    }
}

#[derive(Debug, Deserialize)]
pub struct AskRequest {
    question: Option<String>,
    pdf_name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AskResponse {
    answer: String,
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    message: String,
    pdf_name: String,
    chunks: usize,
}

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    Upstream(String),
    Status(StatusCode, String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            ApiError::NotFound(message) => (StatusCode::NOT_FOUND, message),
            ApiError::Upstream(message) => (StatusCode::BAD_GATEWAY, message),
            ApiError::Status(status, message) => (status, message),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

impl From<PipelineError> for ApiError {
    fn from(value: PipelineError) -> Self {
        if value.is_not_found() {
            ApiError::NotFound(PDF_NOT_FOUND.to_string())
        } else if value.is_invalid_input() {
            ApiError::BadRequest(value.to_string())
        } else if matches!(value, PipelineError::Task(_)) {
            error!(error = %value, "request failed");
            ApiError::Status(StatusCode::INTERNAL_SERVER_ERROR, value.to_string())
        } else {
            error!(error = %value, "request failed downstream");
            ApiError::Upstream(value.to_string())
        }
    }
}

pub fn router(state: AppState, config: &ServerConfig) -> Router {
    Router::new()
        .route("/", get(hello))
        .route("/health", get(health))
        .route(
            "/upload_pdf",
            post(upload_pdf).layer(DefaultBodyLimit::max(config.max_upload_bytes)),
        )
        .route("/ask", post(ask_question))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&config.cors_origins))
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "ignoring invalid CORS origin");
                None
            }
        })
        .collect::<Vec<_>>();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
}

pub async fn serve(state: AppState, config: ServerConfig) -> anyhow::Result<()> {
    let router = router(state, &config);

    let listener = tokio::net::TcpListener::bind((config.host.as_str(), config.port)).await?;
    info!(addr = %listener.local_addr()?, "askpdf listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        warn!(%error, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}

async fn hello() -> Json<serde_json::Value> {
    Json(json!({ "message": "Upload ur pdf" }))
}

async fn health() -> &'static str {
    "OK"
}

async fn upload_pdf(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<UploadResponse>, ApiError> {
    let mut multipart =
        multipart.map_err(|_| ApiError::BadRequest(INVALID_UPLOAD.to_string()))?;

    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|error| ApiError::Status(error.status(), error.body_text()))?
    {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }

        let file_name = field.file_name().map(str::to_string);
        let bytes = field
            .bytes()
            .await
            .map_err(|error| ApiError::Status(error.status(), error.body_text()))?;
        upload = file_name.map(|name| (name, bytes));
        break;
    }

    let (file_name, bytes) = upload
        .filter(|(name, _)| is_pdf_name(name))
        .ok_or_else(|| ApiError::BadRequest(INVALID_UPLOAD.to_string()))?;

    info!(file_name = %file_name, bytes = bytes.len(), "pdf upload received");
    let report = state
        .pipeline
        .ingest_pdf(&file_name, &bytes, state.chunking)
        .await?;

    Ok(Json(UploadResponse {
        message: format!("PDF '{file_name}' uploaded and processed."),
        pdf_name: report.key,
        chunks: report.chunks,
    }))
}

async fn ask_question(
    State(state): State<AppState>,
    body: Result<Json<AskRequest>, JsonRejection>,
) -> Result<Json<AskResponse>, ApiError> {
    let Json(request) = body.map_err(|rejection| {
        ApiError::BadRequest(format!("invalid request body: {}", rejection.body_text()))
    })?;

    let question = request.question.filter(|value| !value.trim().is_empty());
    let pdf_name = request.pdf_name.filter(|value| !value.trim().is_empty());

    let (question, pdf_name) = match (question, pdf_name) {
        (Some(question), Some(pdf_name)) => (question, pdf_name),
        (question, pdf_name) => {
            let missing = [
                ("question", question.is_none()),
                ("pdf_name", pdf_name.is_none()),
            ]
            .into_iter()
            .filter_map(|(field, absent)| absent.then_some(field))
            .collect::<Vec<_>>();
            return Err(ApiError::BadRequest(format!(
                "missing {}",
                missing.join(", ")
            )));
        }
    };

    let answer = state
        .pipeline
        .ask(&pdf_name, &question, state.top_k)
        .await?;

    Ok(Json(AskResponse {
        answer: answer.answer,
    }))
}
