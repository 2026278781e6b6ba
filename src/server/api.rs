//! HTTP API server implementation

use axum::{
    extract::{rejection::JsonRejection, Json, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use utoipa::{OpenApi, ToSchema};

use crate::core::config::ServerConfig;
use crate::core::errors::TranslationError;
use crate::core::models::{TextInput, TranslationRequest, UsageStats};
use crate::core::translator::Translator;

/// Application state
#[derive(Clone)]
pub struct AppState {
    translator: Translator,
}

impl AppState {
    pub fn new(translator: Translator) -> Self {
        Self { translator }
    }
}

/// Health check response
#[derive(Serialize)]
struct HealthResponse {
    status: String,
    service: String,
    version: String,
    model: String,
}

/// Translation request body
#[derive(Deserialize, ToSchema)]
pub struct TranslateBody {
    /// Newline-separated string or array of lines
    #[serde(default)]
    #[schema(value_type = Object)]
    pub text: Option<TextInput>,
}

/// Translation response body
#[derive(Serialize, ToSchema)]
pub struct TranslateResponse {
    pub translated_text: String,
}

/// Error response
#[derive(Serialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
}

/// OpenAPI description of the public routes
#[derive(OpenApi)]
#[openapi(
    paths(translate),
    components(schemas(TranslateBody, TranslateResponse, ErrorResponse))
)]
pub struct ApiDoc;

impl IntoResponse for TranslationError {
    fn into_response(self) -> Response {
        let status = match &self {
            TranslationError::EmptyInput => StatusCode::BAD_REQUEST,
            TranslationError::ContextOverflow { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(ErrorResponse {
            error: self.to_string(),
        });
        (status, body).into_response()
    }
}

/// Health check handler
async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        service: env!("CARGO_PKG_NAME").to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        model: state.translator.model_id().to_string(),
    })
}

/// Usage statistics handler
async fn get_stats(State(state): State<Arc<AppState>>) -> Json<UsageStats> {
    Json(state.translator.get_usage().await)
}

/// OpenAPI document handler
async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

/// Translate subtitle lines, preserving line count
#[utoipa::path(
    post,
    path = "/translate",
    request_body = TranslateBody,
    responses(
        (status = 200, description = "Translated text", body = TranslateResponse),
        (status = 400, description = "No text provided", body = ErrorResponse),
        (status = 413, description = "Input exceeds the model context", body = ErrorResponse),
        (status = 500, description = "Generation failed", body = ErrorResponse)
    )
)]
async fn translate(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<TranslateBody>, JsonRejection>,
) -> Response {
    let Json(payload) = match payload {
        Ok(payload) => payload,
        Err(rejection) => {
            warn!("Rejected translation request: {}", rejection);
            return (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse {
                    error: rejection.body_text(),
                }),
            )
                .into_response();
        }
    };

    let request = match TranslationRequest::from_input(payload.text) {
        Ok(request) => request,
        Err(e) => return e.into_response(),
    };

    match state.translator.translate(&request).await {
        Ok(result) => {
            info!(
                "Translated {} lines in {} attempt(s)",
                request.lines.len(),
                result.attempts
            );
            Json(TranslateResponse {
                translated_text: result.translation,
            })
            .into_response()
        }
        Err(e) => e.into_response(),
    }
}

/// Build the router for the given state
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(health_check))
        .route("/stats", get(get_stats))
        .route("/translate", post(translate))
        .route("/api-docs/openapi.json", get(openapi_json))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Run the HTTP server
pub async fn run_server(config: ServerConfig, translator: Translator) -> anyhow::Result<()> {
    let state = Arc::new(AppState::new(translator));
    let app = router(state);

    let addr = config.addr();
    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
