//! Agent Runner - process gateway for CLI coding agents
//!
//! This crate spawns an external agent CLI per message, feeds it the prompt,
//! enforces the configured timeout and either collects or streams the
//! combined stdout/stderr of the process.

mod command;
mod error;
mod event;
mod executor;
mod process;
mod relay;
mod run;
mod scheduler;
mod service;
mod watchdog;

pub use command::CommandSpec;
pub use error::{ExecutorError, Result, SchedulerError};
pub use event::{StreamEvent, CANCELLED_MARKER, TIMEOUT_MARKER};
pub use executor::{AgentGateway, CliAgentGateway};
pub use process::{AgentProcess, ABNORMAL_EXIT_CODE, KILL_GRACE};
pub use relay::{OutputRelay, RelayError, Utf8Decoder};
pub use run::{RunRequest, RunResult};
pub use scheduler::ExecutionScheduler;
pub use service::ChatService;
pub use watchdog::{Outcome, Watchdog};
