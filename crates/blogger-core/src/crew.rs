//! Agent and task descriptors handed to the crew runtime.
//!
//! Two agents exist for the lifetime of the process: a research agent and a
//! writing agent. Each request binds a fresh pair of tasks to the submitted
//! topic; the writing task lists the research task as context so the runtime
//! executes research first and feeds its output forward.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::BloggerError;

pub const RESEARCH_TASK_ID: &str = "research";
pub const WRITE_TASK_ID: &str = "write";

/// A validated, non-empty topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topic(String);

impl Topic {
    pub fn parse(raw: &str) -> Result<Self, BloggerError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(BloggerError::EmptyTopic);
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentRole {
    Researcher,
    Writer,
}

impl AgentRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentRole::Researcher => "researcher",
            AgentRole::Writer => "writer",
        }
    }
}

/// Static configuration of a logical agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentSpec {
    pub kind: AgentRole,
    pub role: String,
    pub goal: String,
    pub backstory: String,
}

impl AgentSpec {
    pub fn researcher() -> Self {
        Self {
            kind: AgentRole::Researcher,
            role: "Research Agent".into(),
            goal: "Search for and gather the most relevant, current information on the given topic \
                   and condense it into accurate key findings."
                .into(),
            backstory: "A meticulous analyst who sifts through sources quickly, separates facts \
                        from noise and always notes where a claim came from."
                .into(),
        }
    }

    pub fn writer() -> Self {
        Self {
            kind: AgentRole::Writer,
            role: "Writing Agent".into(),
            goal: "Turn research findings into an engaging, well-structured blog post written in \
                   markdown."
                .into(),
            backstory: "A seasoned tech blogger who explains complex subjects in plain language \
                        with clear headings and a confident voice."
                .into(),
        }
    }
}

/// A unit of work assigned to one agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSpec {
    pub id: String,
    pub description: String,
    pub expected_output: String,
    pub agent: AgentRole,
    /// Ids of tasks whose output this task consumes.
    #[serde(default)]
    pub context: Vec<String>,
}

/// Everything the crew runtime needs for one generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrewRequest {
    pub topic: Topic,
    pub agents: Vec<AgentSpec>,
    pub tasks: Vec<TaskSpec>,
}

impl CrewRequest {
    pub fn agent(&self, role: AgentRole) -> Option<&AgentSpec> {
        self.agents.iter().find(|agent| agent.kind == role)
    }

    pub fn task(&self, id: &str) -> Option<&TaskSpec> {
        self.tasks.iter().find(|task| task.id == id)
    }
}

/// Build the two agents and two tasks for `topic`.
pub fn build_request(topic: &Topic) -> CrewRequest {
    let research = TaskSpec {
        id: RESEARCH_TASK_ID.into(),
        description: format!(
            "Research the topic \"{topic}\". Identify the key facts, recent developments, \
             notable opinions and open questions a reader should know about."
        ),
        expected_output: "A bullet-point list of the most important findings about the topic, \
                          each with a one-sentence explanation."
            .into(),
        agent: AgentRole::Researcher,
        context: Vec::new(),
    };

    let write = TaskSpec {
        id: WRITE_TASK_ID.into(),
        description: format!(
            "Using the research findings, write a blog post about \"{topic}\" for a general \
             technical audience."
        ),
        expected_output: "A complete blog post in markdown with a title, an introduction, \
                          sections with headings and a short conclusion."
            .into(),
        agent: AgentRole::Writer,
        context: vec![RESEARCH_TASK_ID.into()],
    };

    CrewRequest {
        topic: topic.clone(),
        agents: vec![AgentSpec::researcher(), AgentSpec::writer()],
        tasks: vec![research, write],
    }
}

/// The orchestration entry point: descriptors in, markdown or failure out.
#[async_trait]
pub trait Crew: Send + Sync {
    async fn kickoff(&self, request: CrewRequest) -> Result<String, BloggerError>;
}
