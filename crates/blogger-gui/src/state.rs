use crate::config::AppConfig;
use crate::metrics;
use crate::session::{BlogSession, Phase, SubmitRejection};
use anyhow::Result;
use axum::response::sse::Event;
use blogger_core::{Crew, GraphFlowCrew, build_request, redact_secrets};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::convert::Infallible;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Semaphore, broadcast};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{self as stream, Stream, StreamExt};
use tracing::{error, info, warn};
use uuid::Uuid;

#[derive(Clone)]
pub struct AppState {
    session_service: Arc<SessionService>,
    assets_dir: Arc<PathBuf>,
    auth_token: Option<Arc<String>>,
}

impl AppState {
    /// Build state with the `graph_flow` crew talking to the configured model.
    pub fn try_new(config: &AppConfig) -> Result<Self> {
        let crew = GraphFlowCrew::from_config(&config.blogger)?;
        Ok(Self::with_crew(config, Arc::new(crew)))
    }

    pub fn with_crew(config: &AppConfig, crew: Arc<dyn Crew>) -> Self {
        Self {
            session_service: Arc::new(
                SessionService::new(crew, config.max_concurrency)
                    .with_session_limits(config.max_sessions, config.session_ttl),
            ),
            assets_dir: Arc::new(config.assets_dir.clone()),
            auth_token: config
                .auth_token
                .as_ref()
                .map(|token| Arc::new(token.to_string())),
        }
    }

    pub fn session_service(&self) -> Arc<SessionService> {
        self.session_service.clone()
    }

    pub fn assets_dir(&self) -> Arc<PathBuf> {
        self.assets_dir.clone()
    }

    pub fn auth_token(&self) -> Option<Arc<String>> {
        self.auth_token.clone()
    }

    pub fn metrics(&self) -> SessionMetrics {
        self.session_service.metrics()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SubmitError {
    NotFound,
    EmptyTopic,
    AlreadyLoading,
}

impl From<SubmitRejection> for SubmitError {
    fn from(value: SubmitRejection) -> Self {
        match value {
            SubmitRejection::AlreadyLoading => SubmitError::AlreadyLoading,
            SubmitRejection::EmptyTopic => SubmitError::EmptyTopic,
        }
    }
}

/// Returned when the session table is full of recently active sessions.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionLimitReached;

/// Owns every session's view state and runs generations for them.
#[derive(Clone)]
pub struct SessionService {
    crew: Arc<dyn Crew>,
    semaphore: Arc<Semaphore>,
    max_concurrency: usize,
    max_sessions: usize,
    session_ttl: Duration,
    sessions: Arc<DashMap<String, BlogSession>>,
    streams: Arc<DashMap<String, broadcast::Sender<SessionEvent>>>,
}

impl SessionService {
    pub fn new(crew: Arc<dyn Crew>, max_concurrency: usize) -> Self {
        let max_concurrency = max_concurrency.max(1);
        Self {
            crew,
            semaphore: Arc::new(Semaphore::new(max_concurrency)),
            max_concurrency,
            max_sessions: usize::MAX,
            session_ttl: Duration::MAX,
            sessions: Arc::new(DashMap::new()),
            streams: Arc::new(DashMap::new()),
        }
    }

    /// Cap the session table and evict sessions idle for longer than `ttl`.
    pub fn with_session_limits(mut self, max_sessions: usize, ttl: Duration) -> Self {
        self.max_sessions = max_sessions.max(1);
        self.session_ttl = ttl;
        self
    }

    /// Start a fresh idle session, evicting expired ones first.
    pub fn create_session(&self) -> Result<SessionSnapshot, SessionLimitReached> {
        self.evict_idle();
        if self.sessions.len() >= self.max_sessions {
            warn!(sessions = self.sessions.len(), "session limit reached");
            return Err(SessionLimitReached);
        }

        let session_id = Uuid::new_v4().to_string();
        let session = BlogSession::new();
        let snapshot = SessionSnapshot::from_session(&session_id, &session);
        self.sessions.insert(session_id.clone(), session);
        metrics::session_created(&session_id, self.sessions.len());
        Ok(snapshot)
    }

    /// Drop settled sessions whose last update is older than the idle TTL.
    /// Loading sessions are never evicted.
    pub fn evict_idle(&self) -> usize {
        let now = Utc::now();
        let ttl = self.session_ttl;
        let before = self.sessions.len();
        self.sessions.retain(|_, session| {
            session.is_loading()
                || (now - session.updated_at())
                    .to_std()
                    .map_or(true, |age| age < ttl)
        });
        let evicted = before.saturating_sub(self.sessions.len());
        if evicted > 0 {
            info!(evicted, remaining = self.sessions.len(), "evicted idle sessions");
        }
        evicted
    }

    /// Move the session to loading and start the crew in the background.
    ///
    /// Empty topics and submissions while loading are rejected before the
    /// crew is touched.
    pub fn submit(&self, session_id: &str, raw_topic: &str) -> Result<SessionSnapshot, SubmitError> {
        let (snapshot, topic, sender) = {
            let mut entry = self
                .sessions
                .get_mut(session_id)
                .ok_or(SubmitError::NotFound)?;
            let (next, topic) = match entry.value().clone().begin(raw_topic) {
                Ok(transition) => transition,
                Err(rejection) => {
                    let error = SubmitError::from(rejection);
                    metrics::submission_rejected(session_id, &format!("{error:?}"));
                    return Err(error);
                }
            };
            *entry.value_mut() = next;

            // Registered while the entry is held so stream subscribers never
            // observe a loading session without a channel. Each run gets its
            // own channel; a previous run only ever removes its own.
            let (sender, _rx) = broadcast::channel(16);
            self.streams.insert(session_id.to_string(), sender.clone());
            (
                SessionSnapshot::from_session(session_id, entry.value()),
                topic,
                sender,
            )
        };
        let _ = sender.send(SessionEvent::from_snapshot(snapshot.clone()));

        let request = build_request(&topic);
        let crew = self.crew.clone();
        let semaphore = self.semaphore.clone();
        let sessions = self.sessions.clone();
        let streams = self.streams.clone();
        let session_id = session_id.to_string();

        tokio::spawn(async move {
            let started = Instant::now();
            let outcome = match semaphore.clone().acquire_owned().await {
                Ok(permit) => {
                    metrics::generation_started(
                        &session_id,
                        sessions.iter().filter(|s| s.is_loading()).count(),
                        semaphore.available_permits(),
                    );
                    // A panicking crew must still settle the session.
                    let run = tokio::spawn(async move { crew.kickoff(request).await });
                    let result = match run.await {
                        Ok(result) => result.map_err(|err| err.to_string()),
                        Err(err) => Err(format!("crew task aborted: {err}")),
                    };
                    drop(permit);
                    result
                }
                Err(err) => Err(err.to_string()),
            };
            let elapsed_ms = started.elapsed().as_millis() as u64;

            let snapshot = sessions.get_mut(&session_id).map(|mut entry| {
                let current = entry.value().clone();
                let next = match outcome {
                    Ok(document) => {
                        info!(session_id = %session_id, "generation completed");
                        metrics::generation_completed(&session_id, document.len(), elapsed_ms);
                        current.complete(document)
                    }
                    Err(reason) => {
                        let reason = redact_secrets(&reason);
                        error!(session_id = %session_id, error = %reason, "generation failed");
                        metrics::generation_failed(&session_id, elapsed_ms, &reason);
                        current.fail()
                    }
                };
                *entry.value_mut() = next;
                SessionSnapshot::from_session(&session_id, entry.value())
            });

            if let Some(snapshot) = snapshot {
                let _ = sender.send(SessionEvent::from_snapshot(snapshot));
            }
            streams.remove_if(&session_id, |_, tx| tx.same_channel(&sender));
        });

        Ok(snapshot)
    }

    pub fn status(&self, session_id: &str) -> Option<SessionSnapshot> {
        self.sessions
            .get(session_id)
            .map(|entry| SessionSnapshot::from_session(session_id, entry.value()))
    }

    pub fn list_sessions(&self) -> Vec<SessionSnapshot> {
        let mut sessions: Vec<SessionSnapshot> = self
            .sessions
            .iter()
            .map(|entry| SessionSnapshot::from_session(entry.key(), entry.value()))
            .collect();
        sessions.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        sessions
    }

    /// Live events while loading; otherwise the current state as one event.
    pub fn event_stream(&self, session_id: &str) -> Option<SseStream> {
        // Subscribe before reading the state so a completion racing with this
        // call is either observed as a live event or replayed below.
        let receiver = self
            .streams
            .get(session_id)
            .map(|sender| sender.subscribe());
        let snapshot = self.status(session_id)?;

        metrics::stream_opened(session_id, self.streams.len());

        match receiver {
            Some(rx) if snapshot.is_loading => {
                let initial = SessionEvent::from_snapshot(snapshot).into_sse_event();
                let live = BroadcastStream::new(rx).filter_map(|event| match event {
                    Ok(event) => Some(Result::<Event, Infallible>::Ok(event.into_sse_event())),
                    Err(err) => {
                        warn!(error = %err, "session event stream lagged");
                        None
                    }
                });
                let stream = stream::once(Result::<Event, Infallible>::Ok(initial)).chain(live);
                Some(Box::pin(stream) as SseStream)
            }
            _ => {
                let event = SessionEvent::from_snapshot(snapshot).into_sse_event();
                let stream = stream::iter(vec![Result::<Event, Infallible>::Ok(event)]);
                Some(Box::pin(stream) as SseStream)
            }
        }
    }

    pub fn metrics(&self) -> SessionMetrics {
        SessionMetrics {
            max_concurrency: self.max_concurrency,
            available_permits: self.semaphore.available_permits(),
            loading_sessions: self
                .sessions
                .iter()
                .filter(|entry| entry.value().is_loading())
                .count(),
            total_sessions: self.sessions.len(),
        }
    }
}

pub type SseStream = Pin<Box<dyn Stream<Item = Result<Event, Infallible>> + Send>>;

#[derive(Clone, Debug, Serialize)]
pub struct SessionMetrics {
    pub max_concurrency: usize,
    pub available_permits: usize,
    pub loading_sessions: usize,
    pub total_sessions: usize,
}

/// Serializable view of one session.
#[derive(Clone, Debug, Serialize)]
pub struct SessionSnapshot {
    pub session_id: String,
    pub phase: Phase,
    pub is_loading: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl SessionSnapshot {
    pub fn from_session(session_id: &str, session: &BlogSession) -> Self {
        Self {
            session_id: session_id.to_string(),
            phase: session.phase(),
            is_loading: session.is_loading(),
            topic: session.topic().map(str::to_string),
            result: session.result().map(str::to_string),
            error: session.error().map(str::to_string),
            updated_at: session.updated_at(),
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct SessionEvent {
    pub kind: Phase,
    #[serde(flatten)]
    pub session: SessionSnapshot,
}

impl SessionEvent {
    pub fn from_snapshot(session: SessionSnapshot) -> Self {
        Self {
            kind: session.phase,
            session,
        }
    }

    pub fn into_sse_event(self) -> Event {
        let data = serde_json::to_string(&self).unwrap_or_else(|_| {
            serde_json::json!({
                "kind": Phase::Error,
                "error": "failed to serialize session event",
            })
            .to_string()
        });

        Event::default().event(self.kind.as_str()).data(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use blogger_core::{BloggerError, CrewRequest};

    struct StalledCrew;

    #[async_trait]
    impl Crew for StalledCrew {
        async fn kickoff(&self, _request: CrewRequest) -> Result<String, BloggerError> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn submission_replaces_leftover_stream_channel() {
        let service = SessionService::new(Arc::new(StalledCrew), 1);
        let id = service.create_session().unwrap().session_id;

        // Channel of a previous run that has not cleaned up yet.
        let (stale, _stale_rx) = broadcast::channel(1);
        service.streams.insert(id.clone(), stale.clone());

        service.submit(&id, "fresh run").unwrap();
        assert!(!service.streams.get(&id).unwrap().same_channel(&stale));

        // The previous run's cleanup leaves the new channel in place.
        service
            .streams
            .remove_if(&id, |_, tx| tx.same_channel(&stale));
        assert!(service.streams.contains_key(&id));
        assert!(service.event_stream(&id).is_some());
    }

    #[tokio::test]
    async fn eviction_skips_loading_sessions() {
        let service = SessionService::new(Arc::new(StalledCrew), 1)
            .with_session_limits(10, Duration::ZERO);
        let busy = service.create_session().unwrap().session_id;
        service.submit(&busy, "long run").unwrap();
        let idle = service.create_session().unwrap().session_id;

        assert_eq!(service.evict_idle(), 1);
        assert!(service.status(&idle).is_none());
        assert!(service.status(&busy).is_some_and(|s| s.is_loading));
    }
}
