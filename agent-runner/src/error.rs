//! Error types for agent-runner

use thiserror::Error;

/// Result type alias for executor operations
pub type Result<T> = std::result::Result<T, ExecutorError>;

/// Errors that can occur while running an agent
#[derive(Debug, Error)]
pub enum ExecutorError {
    /// Agent executable missing or otherwise unusable
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Failed to spawn agent process
    #[error("Failed to spawn agent process: {message}")]
    SpawnFailed {
        message: String,
        #[source]
        source: std::io::Error,
    },

    /// Domain error from the core crate
    #[error(transparent)]
    Core(#[from] agentweb_core::Error),

    /// Streaming job could not be scheduled
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
}

impl ExecutorError {
    /// Create a Configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a SpawnFailed error from the underlying OS error
    pub fn spawn_failed(message: impl Into<String>, source: std::io::Error) -> Self {
        Self::SpawnFailed {
            message: message.into(),
            source,
        }
    }
}

/// Rejections from the execution scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SchedulerError {
    #[error("Execution queue is full ({capacity} pending jobs)")]
    QueueFull { capacity: usize },

    #[error("Execution scheduler is shut down")]
    Closed,
}
