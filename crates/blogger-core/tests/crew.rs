use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use blogger_core::{
    AgentRole, BloggerError, ChatMessage, ChatModel, Crew, GraphFlowCrew, ModelError,
    RESEARCH_TASK_ID, SearchProvider, Topic, build_request, validate,
};

/// Answers as whichever agent the system prompt names and records every call.
#[derive(Default)]
struct RecordingModel {
    calls: Mutex<Vec<Vec<ChatMessage>>>,
}

impl RecordingModel {
    fn calls(&self) -> Vec<Vec<ChatMessage>> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatModel for RecordingModel {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, ModelError> {
        self.calls.lock().unwrap().push(messages.to_vec());
        let system = &messages[0].content;
        if system.contains("Research Agent") {
            Ok("- Finding: solid-state cells are denser".into())
        } else {
            Ok("# Solid-state batteries\n\nThey are denser.".into())
        }
    }
}

struct FailingModel(ModelError);

#[async_trait]
impl ChatModel for FailingModel {
    async fn complete(&self, _messages: &[ChatMessage]) -> Result<String, ModelError> {
        Err(self.0.clone())
    }
}

struct SlowModel;

#[async_trait]
impl ChatModel for SlowModel {
    async fn complete(&self, _messages: &[ChatMessage]) -> Result<String, ModelError> {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok("never".into())
    }
}

struct FixedSearch(Vec<String>);

#[async_trait]
impl SearchProvider for FixedSearch {
    async fn search(&self, _query: &str) -> Result<Vec<String>, BloggerError> {
        Ok(self.0.clone())
    }
}

struct FailingSearch;

#[async_trait]
impl SearchProvider for FailingSearch {
    async fn search(&self, _query: &str) -> Result<Vec<String>, BloggerError> {
        Err(BloggerError::generation("search endpoint returned 503"))
    }
}

#[tokio::test]
async fn research_runs_before_writing_and_feeds_it() {
    let model = Arc::new(RecordingModel::default());
    let crew = GraphFlowCrew::new(model.clone());
    let request = build_request(&Topic::parse("solid-state batteries").unwrap());

    let document = crew.kickoff(request).await.expect("crew should succeed");
    assert_eq!(document, "# Solid-state batteries\n\nThey are denser.");

    let calls = model.calls();
    assert_eq!(calls.len(), 2, "one model call per task");
    assert!(calls[0][0].content.contains("Research Agent"));
    assert!(calls[1][0].content.contains("Writing Agent"));
    assert!(
        calls[1][1]
            .content
            .contains("- Finding: solid-state cells are denser"),
        "writing prompt should include research output: {}",
        calls[1][1].content
    );
}

#[tokio::test]
async fn search_results_reach_the_research_prompt_only() {
    let model = Arc::new(RecordingModel::default());
    let crew = GraphFlowCrew::new(model.clone()).with_search(Some(Arc::new(FixedSearch(vec![
        "Battery breakthrough announced".into(),
    ]))));

    crew.kickoff(build_request(&Topic::parse("batteries").unwrap()))
        .await
        .expect("crew should succeed");

    let calls = model.calls();
    assert!(calls[0][1].content.contains("- Battery breakthrough announced"));
    assert!(!calls[1][1].content.contains("Web search results"));
}

#[tokio::test]
async fn failed_search_does_not_fail_generation() {
    let model = Arc::new(RecordingModel::default());
    let crew = GraphFlowCrew::new(model.clone()).with_search(Some(Arc::new(FailingSearch)));

    let document = crew
        .kickoff(build_request(&Topic::parse("offline search").unwrap()))
        .await
        .expect("crew should succeed without search results");
    assert_eq!(document, "# Solid-state batteries\n\nThey are denser.");

    let calls = model.calls();
    assert_eq!(calls.len(), 2);
    assert!(
        calls[0][1]
            .content
            .contains("No web search results were found for this topic."),
        "research prompt: {}",
        calls[0][1].content
    );
    assert!(!calls[1][1].content.contains("No web search results"));
}

#[tokio::test]
async fn model_failure_collapses_to_generation_error() {
    let crew = GraphFlowCrew::new(Arc::new(FailingModel(ModelError::terminal(
        "endpoint returned 401 Unauthorized",
    ))));

    let err = crew
        .kickoff(build_request(&Topic::parse("anything").unwrap()))
        .await
        .unwrap_err();
    assert!(matches!(err, BloggerError::Generation(_)), "got {err:?}");
}

#[tokio::test]
async fn crew_run_is_bounded_by_timeout() {
    let crew = GraphFlowCrew::new(Arc::new(SlowModel)).with_timeout(Duration::from_millis(50));

    let err = crew
        .kickoff(build_request(&Topic::parse("slow topic").unwrap()))
        .await
        .unwrap_err();
    match err {
        BloggerError::Generation(reason) => assert!(reason.contains("timed out")),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn malformed_requests_are_rejected_before_any_call() {
    let model = Arc::new(RecordingModel::default());
    let crew = GraphFlowCrew::new(model.clone());
    let topic = Topic::parse("graphs").unwrap();

    let mut reversed = build_request(&topic);
    reversed.tasks.reverse();
    assert!(validate(&reversed).is_err());
    assert!(matches!(
        crew.kickoff(reversed).await,
        Err(BloggerError::Generation(_))
    ));

    let mut missing_agent = build_request(&topic);
    missing_agent.agents.retain(|agent| agent.kind != AgentRole::Writer);
    assert!(validate(&missing_agent).is_err());

    let mut unknown_context = build_request(&topic);
    unknown_context.tasks[1].context = vec!["nonexistent".into()];
    assert!(validate(&unknown_context).is_err());

    let mut no_tasks = build_request(&topic);
    no_tasks.tasks.clear();
    assert!(validate(&no_tasks).is_err());

    let mut duplicate = build_request(&topic);
    duplicate.tasks[1].id = RESEARCH_TASK_ID.into();
    duplicate.tasks[1].context.clear();
    assert!(validate(&duplicate).is_err());

    assert!(model.calls().is_empty());
}
