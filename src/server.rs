//! HTTP surface of the narrator.

use std::sync::Arc;

use axum::{
    Json, Router,
    body::Body,
    extract::{DefaultBodyLimit, Multipart, Path, State, multipart::MultipartError},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use tower_http::cors::{Any, CorsLayer};

use crate::{
    decode::decode_rgb8,
    engine::{EngineError, InferenceEngine},
    messages::{ErrorResponse, HealthResponse, NarrationResponse},
    narration::{NarrationMode, NarrationRequest, Narrator, NarratorError},
    store::{AudioStore, StoreError},
};

/// Default cap on request bodies.
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

const UPLOAD_FIELD: &str = "file";

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<InferenceEngine<Narrator>>,
    pub store: AudioStore,
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    InvalidInput(String),
    /// The multipart body could not be read, e.g. it exceeds the upload limit.
    #[error("{message}")]
    Upload { status: StatusCode, message: String },
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            ApiError::Upload { status, .. } => *status,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            log::error!("Request failed: {self}");
        } else {
            log::debug!("Request rejected: {self}");
        }
        let body = ErrorResponse {
            status: "error".to_string(),
            error: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

impl From<MultipartError> for ApiError {
    fn from(e: MultipartError) -> Self {
        ApiError::Upload {
            status: e.status(),
            message: e.body_text(),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound => ApiError::NotFound(e.to_string()),
            StoreError::Io(_) => ApiError::Internal(e.to_string()),
        }
    }
}

impl From<EngineError<NarratorError>> for ApiError {
    fn from(e: EngineError<NarratorError>) -> Self {
        ApiError::Internal(e.to_string())
    }
}

/// Builds the router.
///
/// `/analyze` is only routed when the narrator was given a detector.
pub fn router(state: AppState, detection_enabled: bool, max_upload_bytes: usize) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let mut app = Router::new()
        .route("/", get(health))
        .route("/caption", post(caption))
        .route("/audio/{filename}", get(audio));
    if detection_enabled {
        app = app.route("/analyze", post(analyze));
    }

    app.layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(cors)
        .with_state(state)
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        message: "Server is running".to_string(),
        status: "healthy".to_string(),
    })
}

async fn caption(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<NarrationResponse>, ApiError> {
    narrate(state, multipart, NarrationMode::Caption).await
}

async fn analyze(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<NarrationResponse>, ApiError> {
    narrate(state, multipart, NarrationMode::Analyze).await
}

async fn narrate(
    state: AppState,
    multipart: Multipart,
    mode: NarrationMode,
) -> Result<Json<NarrationResponse>, ApiError> {
    let upload = read_image_upload(multipart).await?;

    let image = decode_rgb8(&upload).map_err(|e| ApiError::Internal(e.to_string()))?;

    log::debug!(
        "Submitting {mode:?} request, engine is {}",
        state.engine.state().as_str()
    );
    let pending = state.engine.submit(NarrationRequest { image, mode })?;
    let result = tokio::task::spawn_blocking(move || pending.wait())
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))??;
    log::info!(
        "Narrated request #{} ({mode:?}) in {:?}",
        result.id,
        result.duration
    );

    let narration = result.response;
    let audio_file = match narration.audio {
        Some(audio) => match state.store.save(&audio).await {
            Ok(filename) => Some(filename),
            Err(e) => {
                log::warn!("Could not store audio, answering without it: {e}");
                None
            }
        },
        None => None,
    };

    let explanation = match mode {
        NarrationMode::Caption => None,
        NarrationMode::Analyze => Some(narration.spoken_text),
    };

    Ok(Json(NarrationResponse {
        caption: narration.caption,
        objects: narration.objects,
        explanation,
        audio_file,
        status: "success".to_string(),
    }))
}

/// Pulls the `file` field out of the form, checking it is declared as an image.
async fn read_image_upload(mut multipart: Multipart) -> Result<Vec<u8>, ApiError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }
        let is_image = field
            .content_type()
            .is_some_and(|ct| ct.starts_with("image/"));
        if !is_image {
            return Err(ApiError::InvalidInput("File must be an image".to_string()));
        }
        let bytes = field.bytes().await?;
        return Ok(bytes.to_vec());
    }
    Err(ApiError::InvalidInput(format!(
        "Missing multipart field '{UPLOAD_FIELD}'"
    )))
}

async fn audio(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> Result<Response, ApiError> {
    let path = state.store.locate(&filename).await?;
    let file = tokio::fs::File::open(&path)
        .await
        .map_err(|e| ApiError::from(StoreError::from(e)))?;
    let body = Body::from_stream(tokio_util::io::ReaderStream::new(file));

    Ok((
        [
            (header::CONTENT_TYPE, "audio/mpeg".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"description_{filename}\""),
            ),
        ],
        body,
    )
        .into_response())
}
