//! HTTP signaling endpoint and demo page

use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use rtpbridge_session_core::{SessionCoordinator, SessionError, SessionId};

pub const SESSION_ID_HEADER: &str = "x-session-id";
pub const RELAY_PORT_HEADER: &str = "x-relay-port";

#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<SessionCoordinator>,
    pub demo_page: PathBuf,
}

/// Maps session errors onto HTTP status codes; the body is the error text
pub struct ApiError(pub SessionError);

impl From<SessionError> for ApiError {
    fn from(err: SessionError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            SessionError::MalformedOffer(_) | SessionError::AlreadyServiced => StatusCode::BAD_REQUEST,
            SessionError::Negotiation(_) => StatusCode::BAD_GATEWAY,
            SessionError::ShuttingDown => StatusCode::SERVICE_UNAVAILABLE,
            SessionError::SessionNotFound(_) => StatusCode::NOT_FOUND,
            SessionError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            warn!("Request failed: {}", self.0);
        }
        (status, self.0.to_string()).into_response()
    }
}

pub fn router(state: AppState, allow_origin: &str) -> Router {
    let origin = if allow_origin == "*" {
        AllowOrigin::from(Any)
    } else {
        match HeaderValue::from_str(allow_origin) {
            Ok(value) => AllowOrigin::exact(value),
            Err(_) => {
                warn!("Invalid allow_origin {:?}, allowing any origin", allow_origin);
                AllowOrigin::from(Any)
            }
        }
    };
    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_methods(Any)
        .expose_headers([
            HeaderName::from_static(SESSION_ID_HEADER),
            HeaderName::from_static(RELAY_PORT_HEADER),
        ]);

    Router::new()
        .route("/keygen", post(keygen_body))
        .route("/keygen/{key}", get(keygen_path))
        .route("/demo", get(demo))
        .route("/sessions", get(list_sessions))
        .route("/sessions/{id}", delete(terminate_session))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn keygen_path(State(state): State<AppState>, Path(key): Path<String>) -> Result<Response, ApiError> {
    submit(&state, key).await
}

async fn keygen_body(State(state): State<AppState>, body: String) -> Result<Response, ApiError> {
    submit(&state, body).await
}

async fn submit(state: &AppState, encoded_offer: String) -> Result<Response, ApiError> {
    let accepted = state.coordinator.submit_offer(encoded_offer).await?;
    info!(
        "Session {} answered, relay port {}",
        accepted.session_id, accepted.relay_port
    );

    let headers = [
        (SESSION_ID_HEADER, accepted.session_id.to_string()),
        (RELAY_PORT_HEADER, accepted.relay_port.to_string()),
    ];
    Ok((headers, accepted.answer).into_response())
}

/// Serves the demo page, or the read error text in its place
async fn demo(State(state): State<AppState>) -> Html<String> {
    match tokio::fs::read_to_string(&state.demo_page).await {
        Ok(body) => Html(body),
        Err(e) => Html(e.to_string()),
    }
}

async fn list_sessions(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.coordinator.list_sessions().await)
}

async fn terminate_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let session_id: SessionId = id.parse()?;
    state.coordinator.terminate(session_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
