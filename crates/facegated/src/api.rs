//! HTTP surface: `POST /register`, `POST /recognize`, `GET /status`.

use crate::config::Config;
use crate::service::{FaceService, Identity, ServiceError};
use axum::extract::multipart::MultipartError;
use axum::extract::multipart::MultipartRejection;
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::{HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<FaceService>,
}

impl AppState {
    pub fn new(service: FaceService) -> Self {
        Self {
            service: Arc::new(service),
        }
    }
}

pub fn router(state: AppState, config: &Config) -> Router {
    Router::new()
        .route("/register", post(register))
        .route("/recognize", post(recognize))
        .route("/status", get(status))
        .layer(DefaultBodyLimit::max(config.max_upload_bytes))
        .layer(cors_layer(&config.allowed_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let allow_origin = if origins.iter().any(|o| o == "*") {
        AllowOrigin::any()
    } else {
        let parsed: Vec<HeaderValue> = origins
            .iter()
            .filter_map(|o| match o.parse() {
                Ok(v) => Some(v),
                Err(_) => {
                    tracing::warn!(origin = %o, "ignoring unparsable CORS origin");
                    None
                }
            })
            .collect();
        AllowOrigin::list(parsed)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operation {
    Register,
    Recognize,
}

#[derive(Debug)]
enum ApiError {
    MissingEmail,
    MissingImage,
    Upload(MultipartError),
    Service(Operation, ServiceError),
}

impl ApiError {
    fn status_and_message(&self) -> (StatusCode, String) {
        match self {
            ApiError::MissingEmail => (StatusCode::BAD_REQUEST, "Email is required".into()),
            ApiError::MissingImage => (StatusCode::BAD_REQUEST, "No image provided".into()),
            ApiError::Upload(e) => (e.status(), format!("Failed to read upload: {}", e.body_text())),
            ApiError::Service(op, err) => match err {
                ServiceError::InvalidImage(e) => (StatusCode::BAD_REQUEST, format!("Invalid image: {e}")),
                ServiceError::NoFaceDetected => (
                    StatusCode::BAD_REQUEST,
                    match op {
                        Operation::Register => "No face detected in image",
                        Operation::Recognize => "No face detected in the image",
                    }
                    .into(),
                ),
                ServiceError::NotRegistered => (StatusCode::BAD_REQUEST, "Email not registered".into()),
                ServiceError::Storage(e) => (StatusCode::INTERNAL_SERVER_ERROR, format!("Database error: {e}")),
                ServiceError::Inference(e) => (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    match op {
                        Operation::Register => format!("Server error: {e}"),
                        Operation::Recognize => format!("Recognition error: {e}"),
                    },
                ),
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = self.status_and_message();
        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), error = %message, "request failed");
        } else {
            tracing::warn!(status = status.as_u16(), error = %message, "request rejected");
        }
        (status, Json(json!({ "error": message }))).into_response()
    }
}

/// The two fields both endpoints accept.
#[derive(Default)]
struct UploadForm {
    email: Option<String>,
    image: Option<Vec<u8>>,
}

impl UploadForm {
    /// A request that is not `multipart/form-data` carries neither field.
    async fn read(multipart: Result<Multipart, MultipartRejection>) -> Result<Self, ApiError> {
        let mut multipart = match multipart {
            Ok(multipart) => multipart,
            Err(rejection) => {
                tracing::debug!(%rejection, "request body is not a multipart form");
                return Ok(UploadForm::default());
            }
        };
        let mut form = UploadForm::default();
        while let Some(field) = multipart.next_field().await.map_err(ApiError::Upload)? {
            let name = field.name().map(str::to_owned);
            match name.as_deref() {
                Some("email") => form.email = Some(field.text().await.map_err(ApiError::Upload)?),
                Some("image") => {
                    let bytes = field.bytes().await.map_err(ApiError::Upload)?;
                    // A file input left empty still sends a zero-length part.
                    if !bytes.is_empty() {
                        form.image = Some(bytes.to_vec());
                    }
                }
                _ => {}
            }
        }
        Ok(form)
    }

    fn identity(&self) -> Result<Identity, ApiError> {
        self.email
            .as_deref()
            .and_then(Identity::parse)
            .ok_or(ApiError::MissingEmail)
    }

    fn take_image(&mut self) -> Result<Vec<u8>, ApiError> {
        self.image.take().ok_or(ApiError::MissingImage)
    }
}

async fn register(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let mut form = UploadForm::read(multipart).await?;
    let identity = form.identity()?;
    let image = form.take_image()?;

    state
        .service
        .register(&identity, image)
        .await
        .map_err(|e| ApiError::Service(Operation::Register, e))?;

    Ok(Json(json!({ "success": true, "message": "Registration successful" })))
}

async fn recognize(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let mut form = UploadForm::read(multipart).await?;
    let image = form.take_image()?;
    let identity = form.identity()?;

    let outcome = state
        .service
        .recognize(&identity, image)
        .await
        .map_err(|e| ApiError::Service(Operation::Recognize, e))?;

    Ok(Json(json!({ "result": outcome.label() })))
}

async fn status(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "version": env!("CARGO_PKG_VERSION"),
        "model_version": state.service.model_version(),
        "store": state.service.store_backend(),
        "similarity_threshold": state.service.threshold(),
    }))
}
