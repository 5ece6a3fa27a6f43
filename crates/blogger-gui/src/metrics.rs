use tracing::info;

pub fn session_created(session_id: &str, total_sessions: usize) {
    info!(
        target = "telemetry.gui",
        session_id,
        total_sessions,
        event = "session_created"
    );
}

pub fn generation_started(session_id: &str, loading: usize, available_permits: usize) {
    info!(
        target = "telemetry.gui",
        session_id,
        loading_sessions = loading,
        available_permits,
        event = "generation_started"
    );
}

pub fn generation_completed(session_id: &str, chars: usize, elapsed_ms: u64) {
    info!(
        target = "telemetry.gui",
        session_id,
        chars,
        elapsed_ms,
        event = "generation_completed"
    );
}

pub fn generation_failed(session_id: &str, elapsed_ms: u64, error: &str) {
    info!(
        target = "telemetry.gui",
        session_id,
        elapsed_ms,
        error,
        event = "generation_failed"
    );
}

pub fn submission_rejected(session_id: &str, reason: &str) {
    info!(
        target = "telemetry.gui",
        session_id,
        reason,
        event = "submission_rejected"
    );
}

pub fn stream_opened(session_id: &str, active_streams: usize) {
    info!(
        target = "telemetry.gui",
        session_id,
        active_streams,
        event = "stream_opened"
    );
}
