use axum::{Json, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use std::fmt;

use crate::state::{SessionLimitReached, SubmitError};

#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    message: String,
}

impl AppError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn not_found() -> Self {
        Self::new(StatusCode::NOT_FOUND, "session not found")
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let payload = ErrorResponse {
            error: self.message,
        };
        let status = self.status;
        (status, Json(payload)).into_response()
    }
}

impl From<SessionLimitReached> for AppError {
    fn from(_: SessionLimitReached) -> Self {
        Self::new(
            StatusCode::SERVICE_UNAVAILABLE,
            "session limit reached, try again later",
        )
    }
}

impl From<SubmitError> for AppError {
    fn from(error: SubmitError) -> Self {
        match error {
            SubmitError::NotFound => Self::not_found(),
            SubmitError::EmptyTopic => {
                Self::new(StatusCode::BAD_REQUEST, "topic must not be empty")
            }
            SubmitError::AlreadyLoading => Self::new(
                StatusCode::CONFLICT,
                "a generation is already in progress for this session",
            ),
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}
