use std::sync::Arc;

use async_trait::async_trait;
use graph_flow::{Context, GraphError, NextAction, Task, TaskResult};
use tracing::{debug, info, instrument, warn};

use crate::crew::{AgentRole, AgentSpec, TaskSpec, Topic};
use crate::model::{ChatMessage, ChatModel};
use crate::search::SearchProvider;

/// Context key holding the output of task `id`.
pub fn output_key(id: &str) -> String {
    format!("task.{id}.output")
}

/// Runs one [`TaskSpec`] as its assigned agent against the chat model.
pub struct AgentTask {
    spec: TaskSpec,
    agent: AgentSpec,
    topic: Topic,
    is_final: bool,
    model: Arc<dyn ChatModel>,
    search: Option<Arc<dyn SearchProvider>>,
}

impl AgentTask {
    pub fn new(
        spec: TaskSpec,
        agent: AgentSpec,
        topic: Topic,
        is_final: bool,
        model: Arc<dyn ChatModel>,
    ) -> Self {
        Self {
            spec,
            agent,
            topic,
            is_final,
            model,
            search: None,
        }
    }

    pub fn with_search(mut self, search: Option<Arc<dyn SearchProvider>>) -> Self {
        self.search = search;
        self
    }

    fn system_prompt(&self) -> String {
        format!(
            "You are the {}.\nGoal: {}\nBackstory: {}",
            self.agent.role, self.agent.goal, self.agent.backstory
        )
    }

    fn user_prompt(&self, upstream: &[(String, String)], web_results: Option<&[String]>) -> String {
        let mut prompt = format!(
            "Task: {}\n\nExpected output: {}",
            self.spec.description, self.spec.expected_output
        );

        if let Some(results) = web_results {
            if results.is_empty() {
                prompt.push_str("\n\nNo web search results were found for this topic.");
            } else {
                prompt.push_str("\n\nWeb search results:\n");
                for result in results {
                    prompt.push_str("- ");
                    prompt.push_str(result);
                    prompt.push('\n');
                }
            }
        }

        for (id, output) in upstream {
            prompt.push_str(&format!("\n\nOutput of the {id} task:\n{output}"));
        }

        prompt
    }

    async fn web_results(&self) -> Option<Vec<String>> {
        if self.agent.kind != AgentRole::Researcher {
            return None;
        }
        let search = self.search.as_ref()?;

        match search.search(self.topic.as_str()).await {
            Ok(results) => Some(results),
            Err(err) => {
                warn!(error = %err, "web search failed; continuing without results");
                Some(Vec::new())
            }
        }
    }
}

#[async_trait]
impl Task for AgentTask {
    fn id(&self) -> &str {
        &self.spec.id
    }

    #[instrument(name = "task.agent", skip(self, context), fields(task_id = %self.spec.id, agent = %self.agent.kind.as_str()))]
    async fn run(&self, context: Context) -> graph_flow::Result<TaskResult> {
        let mut upstream = Vec::with_capacity(self.spec.context.len());
        for id in &self.spec.context {
            let output: String = context.get(&output_key(id)).await.ok_or_else(|| {
                GraphError::TaskExecutionFailed(format!(
                    "task {} is missing output of upstream task {id}",
                    self.spec.id
                ))
            })?;
            upstream.push((id.clone(), output));
        }

        let web_results = self.web_results().await;
        let messages = [
            ChatMessage::system(self.system_prompt()),
            ChatMessage::user(self.user_prompt(&upstream, web_results.as_deref())),
        ];

        debug!(
            upstream = upstream.len(),
            web_results = web_results.as_ref().map(Vec::len),
            "agent prompt prepared"
        );

        let output = self
            .model
            .complete(&messages)
            .await
            .map_err(|err| GraphError::TaskExecutionFailed(err.to_string()))?;

        context.set(&output_key(&self.spec.id), output.clone()).await;

        info!(chars = output.len(), "agent task completed");

        let next = if self.is_final {
            NextAction::End
        } else {
            NextAction::ContinueAndExecute
        };

        Ok(TaskResult::new(
            Some(format!("{} finished task {}", self.agent.role, self.spec.id)),
            next,
        ))
    }
}
