use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use graph_flow::{
    ExecutionStatus, FlowRunner, Graph, GraphBuilder, InMemorySessionStorage, Session,
    SessionStorage, Task,
};
use tracing::{error, info, instrument};
use uuid::Uuid;

use crate::crew::{Crew, CrewRequest};
use crate::model::{ChatModel, ImagineClient, RetryPolicy, RetryingModel};
use crate::search::{DuckDuckGoSearch, SearchProvider};
use crate::tasks::{AgentTask, output_key};
use crate::{BloggerConfig, BloggerError, redact_secrets};

const DEFAULT_CREW_TIMEOUT: Duration = Duration::from_secs(300);

/// Crew backend that runs every task as a node of a `graph_flow` graph.
///
/// Tasks execute sequentially in request order. A task may only list tasks
/// scheduled before it as context; its prompt receives their outputs.
#[derive(Clone)]
pub struct GraphFlowCrew {
    model: Arc<dyn ChatModel>,
    search: Option<Arc<dyn SearchProvider>>,
    timeout: Duration,
}

impl GraphFlowCrew {
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self {
            model,
            search: None,
            timeout: DEFAULT_CREW_TIMEOUT,
        }
    }

    /// Wire the hosted model client, retry policy and optional web search.
    pub fn from_config(config: &BloggerConfig) -> Result<Self, BloggerError> {
        let client: Arc<dyn ChatModel> = Arc::new(ImagineClient::new(config)?);
        let model = Arc::new(RetryingModel::new(client, RetryPolicy::from_config(config)));

        let search = if config.web_search {
            let provider: Arc<dyn SearchProvider> =
                Arc::new(DuckDuckGoSearch::new(config.request_timeout)?);
            Some(provider)
        } else {
            None
        };

        Ok(Self::new(model)
            .with_search(search)
            .with_timeout(config.crew_timeout))
    }

    pub fn with_search(mut self, search: Option<Arc<dyn SearchProvider>>) -> Self {
        self.search = search;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn build_graph(&self, request: &CrewRequest) -> Result<(Arc<Graph>, String, String), BloggerError> {
        validate(request)?;

        let last_index = request.tasks.len() - 1;
        let mut builder = GraphBuilder::new("blog_crew");
        let mut ids = Vec::with_capacity(request.tasks.len());

        for (index, spec) in request.tasks.iter().enumerate() {
            let agent = request.agent(spec.agent).cloned().ok_or_else(|| {
                BloggerError::generation(format!("no agent for role {}", spec.agent.as_str()))
            })?;
            let task: Arc<dyn Task> = Arc::new(
                AgentTask::new(
                    spec.clone(),
                    agent,
                    request.topic.clone(),
                    index == last_index,
                    self.model.clone(),
                )
                .with_search(self.search.clone()),
            );
            builder = builder.add_task(task);
            ids.push(spec.id.clone());
        }

        for pair in ids.windows(2) {
            builder = builder.add_edge(&pair[0], &pair[1]);
        }

        let start = ids[0].clone();
        let last = ids[last_index].clone();
        let graph = Arc::new(builder.set_start_task(&start).build());
        Ok((graph, start, last))
    }

    async fn execute(&self, request: CrewRequest) -> Result<String, BloggerError> {
        let (graph, start, last) = self.build_graph(&request)?;

        let storage = Arc::new(InMemorySessionStorage::new());
        let runner = FlowRunner::new(graph, storage.clone());

        let session_id = Uuid::new_v4().to_string();
        let session = Session::new_from_task(session_id.clone(), &start);
        session
            .context
            .set("topic", request.topic.as_str().to_string())
            .await;

        storage
            .save(session)
            .await
            .map_err(|err| BloggerError::generation(format!("failed to persist session: {err}")))?;

        loop {
            let result = runner
                .run(&session_id)
                .await
                .map_err(|err| BloggerError::generation(format!("graph execution failure: {err}")))?;

            match result.status {
                ExecutionStatus::Completed => break,
                ExecutionStatus::WaitingForInput => continue,
                ExecutionStatus::Error(message) => return Err(BloggerError::generation(message)),
            }
        }

        let session = storage
            .get(&session_id)
            .await
            .map_err(|err| BloggerError::generation(format!("failed to reload session: {err}")))?
            .ok_or_else(|| BloggerError::generation("session missing after execution"))?;

        session
            .context
            .get::<String>(&output_key(&last))
            .await
            .filter(|output| !output.trim().is_empty())
            .ok_or_else(|| BloggerError::generation("final task produced no output"))
    }
}

#[async_trait]
impl Crew for GraphFlowCrew {
    #[instrument(name = "crew.kickoff", skip_all, fields(topic = %request.topic))]
    async fn kickoff(&self, request: CrewRequest) -> Result<String, BloggerError> {
        let outcome = match tokio::time::timeout(self.timeout, self.execute(request)).await {
            Ok(result) => result,
            Err(_) => Err(BloggerError::generation(format!(
                "crew timed out after {}s",
                self.timeout.as_secs()
            ))),
        };

        match &outcome {
            Ok(document) => info!(chars = document.len(), "crew finished"),
            Err(err) => error!(error = %redact_secrets(&err.to_string()), "crew failed"),
        }

        outcome
    }
}

/// Reject requests the runtime cannot execute in order.
pub fn validate(request: &CrewRequest) -> Result<(), BloggerError> {
    if request.tasks.is_empty() {
        return Err(BloggerError::generation("request contains no tasks"));
    }

    let mut scheduled: Vec<&str> = Vec::with_capacity(request.tasks.len());
    for task in &request.tasks {
        if task.id.trim().is_empty() {
            return Err(BloggerError::generation("task id must not be empty"));
        }
        if scheduled.contains(&task.id.as_str()) {
            return Err(BloggerError::generation(format!(
                "duplicate task id {}",
                task.id
            )));
        }
        if request.agent(task.agent).is_none() {
            return Err(BloggerError::generation(format!(
                "task {} is assigned to missing agent {}",
                task.id,
                task.agent.as_str()
            )));
        }
        if let Some(dependency) = task
            .context
            .iter()
            .find(|dependency| !scheduled.contains(&dependency.as_str()))
        {
            return Err(BloggerError::generation(format!(
                "task {} depends on {dependency}, which is not scheduled before it",
                task.id
            )));
        }
        scheduled.push(&task.id);
    }

    Ok(())
}
