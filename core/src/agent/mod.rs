//! Agent module
//!
//! Supported agent kinds and the per-kind CLI configuration.

mod config;
mod kind;

pub use config::{AgentConfig, AgentsConfig, MESSAGE_PLACEHOLDER, RESUME_PLACEHOLDER};
pub use kind::AgentKind;
