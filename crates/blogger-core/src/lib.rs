//! Agentic blogger core: turns a topic into a blog post with two agents.
//!
//! A research agent gathers findings and a writing agent turns them into a
//! markdown post. The agents run as tasks of a `graph_flow` graph against an
//! OpenAI-compatible chat-completions endpoint.

mod config;
mod crew;
mod error;
mod model;
mod search;
mod security;
mod tasks;
mod telemetry;
mod workflow;

pub use config::{API_ENDPOINT_VAR, API_KEY_VAR, BloggerConfig, parse_bool};
pub use crew::{
    AgentRole, AgentSpec, Crew, CrewRequest, RESEARCH_TASK_ID, TaskSpec, Topic, WRITE_TASK_ID,
    build_request,
};
pub use error::{BloggerError, ModelError};
pub use model::{
    ChatMessage, ChatModel, ImagineClient, RetryPolicy, RetryingModel, completions_url,
};
pub use search::{DuckDuckGoSearch, SearchProvider, parse_result_titles};
pub use security::{SecretValue, redact_secrets, require_var};
pub use tasks::{AgentTask, output_key};
pub use telemetry::{TelemetryOptions, init_telemetry};
pub use workflow::{GraphFlowCrew, validate};
