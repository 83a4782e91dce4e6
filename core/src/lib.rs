//! Core library for Agent Web
//!
//! This crate contains the domain types shared by the gateway and the server:
//! - Agent kinds and their CLI configuration
//! - Gateway configuration loading
//! - Sessions and the session store

pub mod agent;
pub mod config;
pub mod error;
pub mod session;

pub use agent::{AgentConfig, AgentKind, AgentsConfig};
pub use config::{GatewayConfig, SchedulerConfig, ServerConfig, SessionConfig, StreamConfig};
pub use error::Error;
pub use session::{InMemorySessionStore, Session, SessionStore};
pub type Result<T> = std::result::Result<T, Error>;
