//! Event types for streamed agent runs

use serde::{Deserialize, Serialize};

/// Marker chunk emitted when a run hits its deadline
pub const TIMEOUT_MARKER: &str = "[timeout]\n";

/// Marker chunk emitted when a run is cancelled by the server
pub const CANCELLED_MARKER: &str = "[cancelled]\n";

/// One item of a streamed run
///
/// A stream is any number of `Chunk`s followed by exactly one terminal
/// `Exit` or `Error`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// Decoded output text, in the order the process produced it
    Chunk { text: String },
    /// The process exited with this code (-1 when killed)
    Exit { code: i32 },
    /// The run could not start
    Error { message: String },
}

impl StreamEvent {
    pub fn chunk(text: impl Into<String>) -> Self {
        Self::Chunk { text: text.into() }
    }

    pub fn exit(code: i32) -> Self {
        Self::Exit { code }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    /// Event name used by server-sent events
    pub fn name(&self) -> &'static str {
        match self {
            Self::Chunk { .. } => "chunk",
            Self::Exit { .. } => "exit",
            Self::Error { .. } => "error",
        }
    }

    /// Event payload used by server-sent events
    pub fn data(&self) -> String {
        match self {
            Self::Chunk { text } => text.clone(),
            Self::Exit { code } => code.to_string(),
            Self::Error { message } => message.clone(),
        }
    }

    /// Check if the event ends the stream
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Exit { .. } | Self::Error { .. })
    }
}
