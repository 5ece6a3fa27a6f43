use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Core error type for the blogger.
#[derive(Debug, Error)]
pub enum BloggerError {
    #[error("configuration error: {0}")]
    InvalidConfiguration(String),
    #[error("missing environment variable: {0}")]
    MissingSecret(String),
    #[error("topic must not be empty")]
    EmptyTopic,
    #[error("generation failed: {0}")]
    Generation(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl BloggerError {
    pub fn generation(reason: impl Into<String>) -> Self {
        Self::Generation(reason.into())
    }
}

/// Error representing a failed call to the hosted model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelError {
    pub reason: String,
    pub retryable: bool,
}

impl ModelError {
    pub fn new(reason: impl Into<String>, retryable: bool) -> Self {
        Self {
            reason: reason.into(),
            retryable,
        }
    }

    pub fn retryable(reason: impl Into<String>) -> Self {
        Self::new(reason, true)
    }

    pub fn terminal(reason: impl Into<String>) -> Self {
        Self::new(reason, false)
    }
}

impl fmt::Display for ModelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let retry = if self.retryable {
            "retryable"
        } else {
            "terminal"
        };
        write!(f, "{retry} model failure: {}", self.reason)
    }
}

impl std::error::Error for ModelError {}

impl From<ModelError> for BloggerError {
    fn from(error: ModelError) -> Self {
        Self::Generation(error.to_string())
    }
}
