use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use axum::{Json, Router, extract::State, http::HeaderMap, http::StatusCode, routing::post};
use blogger_core::{
    API_ENDPOINT_VAR, API_KEY_VAR, BloggerConfig, ChatMessage, ChatModel, ImagineClient,
    RetryPolicy, RetryingModel,
};
use serde_json::{Value, json};
use tokio::net::TcpListener;

#[derive(Clone)]
struct FakeEndpoint {
    hits: Arc<AtomicUsize>,
    fail_first: usize,
    status: StatusCode,
}

async fn completions(
    State(fake): State<FakeEndpoint>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    let hit = fake.hits.fetch_add(1, Ordering::SeqCst);

    let authorized = headers
        .get("authorization")
        .and_then(|value| value.to_str().ok())
        == Some("Bearer test-key");
    if !authorized {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({"error": {"message": "invalid api key"}})),
        );
    }

    if hit < fake.fail_first {
        return (fake.status, Json(json!({"error": {"message": "try later"}})));
    }

    let prompt = body["messages"][1]["content"].as_str().unwrap_or_default();
    (
        StatusCode::OK,
        Json(json!({
            "id": "cmpl-1",
            "model": body["model"],
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": format!("echo: {prompt}")},
                "finish_reason": "stop"
            }]
        })),
    )
}

async fn spawn_endpoint(fake: FakeEndpoint) -> String {
    let app = Router::new()
        .route("/v1/chat/completions", post(completions))
        .with_state(fake);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}/v1")
}

fn config_for(endpoint: &str, key: &str) -> BloggerConfig {
    let endpoint = endpoint.to_string();
    let key = key.to_string();
    BloggerConfig::from_lookup(move |var| match var {
        API_KEY_VAR => Some(key.clone()),
        API_ENDPOINT_VAR => Some(endpoint.clone()),
        "BLOGGER_REQUEST_TIMEOUT_SECS" => Some("5".into()),
        _ => None,
    })
    .expect("config should load")
}

fn messages() -> Vec<ChatMessage> {
    vec![
        ChatMessage::system("You are the Writing Agent."),
        ChatMessage::user("write about rust"),
    ]
}

fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_retries: 1,
        initial_backoff: Duration::from_millis(5),
        max_backoff: Duration::from_millis(10),
    }
}

#[tokio::test]
async fn returns_first_choice_content() {
    let hits = Arc::new(AtomicUsize::new(0));
    let endpoint = spawn_endpoint(FakeEndpoint {
        hits: hits.clone(),
        fail_first: 0,
        status: StatusCode::OK,
    })
    .await;

    let client = ImagineClient::new(&config_for(&endpoint, "test-key")).unwrap();
    assert!(client.url().ends_with("/v1/chat/completions"));

    let content = client.complete(&messages()).await.expect("completion");
    assert_eq!(content, "echo: write about rust");
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn bad_credentials_are_terminal_and_not_retried() {
    let hits = Arc::new(AtomicUsize::new(0));
    let endpoint = spawn_endpoint(FakeEndpoint {
        hits: hits.clone(),
        fail_first: 0,
        status: StatusCode::OK,
    })
    .await;

    let client: Arc<dyn ChatModel> =
        Arc::new(ImagineClient::new(&config_for(&endpoint, "wrong-key")).unwrap());
    let model = RetryingModel::new(client, fast_retry());

    let err = model.complete(&messages()).await.unwrap_err();
    assert!(!err.retryable);
    assert!(err.reason.contains("401"));
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn rate_limit_is_retried_once() {
    let hits = Arc::new(AtomicUsize::new(0));
    let endpoint = spawn_endpoint(FakeEndpoint {
        hits: hits.clone(),
        fail_first: 1,
        status: StatusCode::TOO_MANY_REQUESTS,
    })
    .await;

    let client: Arc<dyn ChatModel> =
        Arc::new(ImagineClient::new(&config_for(&endpoint, "test-key")).unwrap());
    let model = RetryingModel::new(client, fast_retry());

    let content = model.complete(&messages()).await.expect("retry succeeds");
    assert_eq!(content, "echo: write about rust");
    assert_eq!(hits.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn persistent_server_errors_fail_after_one_retry() {
    let hits = Arc::new(AtomicUsize::new(0));
    let endpoint = spawn_endpoint(FakeEndpoint {
        hits: hits.clone(),
        fail_first: usize::MAX,
        status: StatusCode::SERVICE_UNAVAILABLE,
    })
    .await;

    let client: Arc<dyn ChatModel> =
        Arc::new(ImagineClient::new(&config_for(&endpoint, "test-key")).unwrap());
    let model = RetryingModel::new(client, fast_retry());

    let err = model.complete(&messages()).await.unwrap_err();
    assert!(err.retryable);
    assert_eq!(hits.load(Ordering::SeqCst), 2);
}
