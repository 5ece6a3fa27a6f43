//! Per-session view state.
//!
//! A [`BlogSession`] is a value: every transition consumes the old state and
//! returns the new one, so the request handler owning a session entry is the
//! only place it changes.

use blogger_core::Topic;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// User-visible text for any failed generation.
pub const GENERATION_FAILED: &str = "generation failed";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Idle,
    Loading,
    Done,
    Error,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Idle => "idle",
            Phase::Loading => "loading",
            Phase::Done => "done",
            Phase::Error => "error",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SubmitRejection {
    AlreadyLoading,
    EmptyTopic,
}

#[derive(Clone, Debug)]
pub struct BlogSession {
    topic: Option<String>,
    phase: Phase,
    result: Option<String>,
    error: Option<String>,
    updated_at: DateTime<Utc>,
}

impl Default for BlogSession {
    fn default() -> Self {
        Self::new()
    }
}

impl BlogSession {
    pub fn new() -> Self {
        Self {
            topic: None,
            phase: Phase::Idle,
            result: None,
            error: None,
            updated_at: Utc::now(),
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_loading(&self) -> bool {
        self.phase == Phase::Loading
    }

    pub fn topic(&self) -> Option<&str> {
        self.topic.as_deref()
    }

    pub fn result(&self) -> Option<&str> {
        self.result.as_deref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Start a generation for `raw_topic`, clearing the previous outcome.
    pub fn begin(self, raw_topic: &str) -> Result<(Self, Topic), SubmitRejection> {
        if self.is_loading() {
            return Err(SubmitRejection::AlreadyLoading);
        }

        let topic = Topic::parse(raw_topic).map_err(|_| SubmitRejection::EmptyTopic)?;

        let next = Self {
            topic: Some(topic.as_str().to_string()),
            phase: Phase::Loading,
            result: None,
            error: None,
            updated_at: Utc::now(),
        };
        Ok((next, topic))
    }

    /// Store the generated document. Ignored unless a generation is running.
    pub fn complete(self, document: String) -> Self {
        if !self.is_loading() {
            return self;
        }
        Self {
            phase: Phase::Done,
            result: Some(document),
            error: None,
            updated_at: Utc::now(),
            ..self
        }
    }

    /// Record a failed generation. Ignored unless a generation is running.
    pub fn fail(self) -> Self {
        if !self.is_loading() {
            return self;
        }
        Self {
            phase: Phase::Error,
            result: None,
            error: Some(GENERATION_FAILED.to_string()),
            updated_at: Utc::now(),
            ..self
        }
    }
}
