//! Web front-end for the agentic blogger.
//!
//! Serves a single page with a topic form and a markdown result panel, plus a
//! small JSON/SSE API that drives one [`session::BlogSession`] per visitor.

pub mod config;
pub mod error;
pub mod metrics;
pub mod routes;
pub mod session;
pub mod state;
pub mod telemetry;
