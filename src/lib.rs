//! Papermate: a tool-calling research assistant for academic papers.
//!
//! The crate drives OpenAI-compatible chat models through a multi-round
//! tool loop (literature search, notes, term memory), streams chat replies
//! as typed events, and runs long paper jobs (deep analysis, translation)
//! whose progress is fanned out to per-job queues and SSE frames.
//!
//! # Quick start
//!
//! ```no_run
//! use papermate::agent::{Agent, AgentOptions};
//! use papermate::api::ApiClient;
//! use papermate::config::load_config;
//! use papermate::tools::default_search_tools;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = load_config(None)?.config;
//! let client = Arc::new(ApiClient::new(&config.api, Duration::from_secs(300)));
//! let agent = Agent::new(
//!     client,
//!     config.api.model.clone(),
//!     default_search_tools(&config.tools),
//!     AgentOptions::from_config(&config),
//! );
//! let outcome = agent.run("You are a research assistant.", "What is GRPO?").await?;
//! println!("{}", outcome.text());
//! # Ok(())
//! # }
//! ```

pub mod agent;
pub mod api;
pub mod config;
pub mod error;
pub mod jobs;
pub mod progress;
pub mod session;
#[cfg(test)]
pub mod testsupport;
pub mod tools;
pub mod types;
