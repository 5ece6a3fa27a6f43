use async_trait::async_trait;
use axum::{
    Json, Router,
    extract::{FromRequestParts, Path},
    http::{StatusCode, header, request::Parts},
    response::sse::{KeepAlive, Sse},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::error::AppError;
use crate::state::{AppState, SessionMetrics, SessionSnapshot, SseStream};

#[derive(Debug, Deserialize)]
pub struct SubmitTopicRequest {
    #[serde(default)]
    pub topic: String,
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    #[serde(flatten)]
    pub session: SessionSnapshot,
    pub capacity: CapacitySnapshot,
}

#[derive(Debug, Serialize)]
pub struct CapacitySnapshot {
    pub max_concurrency: usize,
    pub available_permits: usize,
    pub loading_sessions: usize,
    pub total_sessions: usize,
}

impl From<SessionMetrics> for CapacitySnapshot {
    fn from(value: SessionMetrics) -> Self {
        Self {
            max_concurrency: value.max_concurrency,
            available_permits: value.available_permits,
            loading_sessions: value.loading_sessions,
            total_sessions: value.total_sessions,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ListSessionsResponse {
    pub sessions: Vec<SessionSnapshot>,
    pub capacity: CapacitySnapshot,
}

pub fn session_router() -> Router<AppState> {
    Router::new()
        .route("/sessions", post(create_session).get(list_sessions))
        .route("/sessions/:id", get(get_session))
        .route("/sessions/:id/submit", post(submit_topic))
        .route("/sessions/:id/stream", get(stream_session))
}

async fn create_session(
    GuardedState(state): GuardedState,
) -> Result<(StatusCode, Json<SessionResponse>), AppError> {
    let service = state.session_service();
    let session = service.create_session()?;
    let response = SessionResponse {
        session,
        capacity: service.metrics().into(),
    };
    Ok((StatusCode::CREATED, Json(response)))
}

#[instrument(skip_all, fields(session_id = %session_id))]
async fn submit_topic(
    GuardedState(state): GuardedState,
    Path(session_id): Path<String>,
    Json(payload): Json<SubmitTopicRequest>,
) -> Result<(StatusCode, Json<SessionResponse>), AppError> {
    let service = state.session_service();
    let session = service.submit(&session_id, &payload.topic)?;

    let response = SessionResponse {
        session,
        capacity: service.metrics().into(),
    };
    Ok((StatusCode::ACCEPTED, Json(response)))
}

async fn get_session(
    GuardedState(state): GuardedState,
    Path(session_id): Path<String>,
) -> Result<Json<SessionSnapshot>, AppError> {
    state
        .session_service()
        .status(&session_id)
        .map(Json)
        .ok_or_else(AppError::not_found)
}

async fn stream_session(
    GuardedState(state): GuardedState,
    Path(session_id): Path<String>,
) -> Result<Sse<SseStream>, AppError> {
    match state.session_service().event_stream(&session_id) {
        Some(stream) => Ok(Sse::new(stream).keep_alive(KeepAlive::new())),
        None => Err(AppError::not_found()),
    }
}

async fn list_sessions(
    GuardedState(state): GuardedState,
) -> Result<Json<ListSessionsResponse>, AppError> {
    let service = state.session_service();
    let sessions = service.list_sessions();
    let capacity = service.metrics().into();
    Ok(Json(ListSessionsResponse { sessions, capacity }))
}

pub struct GuardedState(pub AppState);

#[async_trait]
impl FromRequestParts<AppState> for GuardedState {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let app_state = state.clone();

        if let Some(expected) = app_state.auth_token() {
            let provided = parts
                .headers
                .get(header::AUTHORIZATION)
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.strip_prefix("Bearer "))
                .map(str::trim);

            match provided {
                Some(token) if token == expected.as_str() => {}
                _ => {
                    return Err(AppError::new(
                        StatusCode::UNAUTHORIZED,
                        "invalid auth token",
                    ));
                }
            }
        }

        Ok(GuardedState(app_state))
    }
}
