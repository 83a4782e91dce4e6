//! Run request and buffered result types

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use agentweb_core::{AgentKind, Session};

use crate::event::{CANCELLED_MARKER, TIMEOUT_MARKER};
use crate::process::ABNORMAL_EXIT_CODE;

/// One message to deliver to an agent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRequest {
    pub kind: AgentKind,
    pub working_dir: PathBuf,
    pub message: String,
    /// Opaque token asking the agent to continue a prior conversation
    pub resume_token: Option<String>,
}

impl RunRequest {
    pub fn new(kind: AgentKind, working_dir: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self {
            kind,
            working_dir: working_dir.into(),
            message: message.into(),
            resume_token: None,
        }
    }

    /// Build a request against a session's agent and directory
    pub fn for_session(session: &Session, message: impl Into<String>) -> Self {
        Self::new(session.agent_kind, session.working_dir.clone(), message)
    }

    /// Set the resume token; blank tokens are dropped
    pub fn with_resume_token(mut self, token: Option<String>) -> Self {
        self.resume_token = token.filter(|t| !t.trim().is_empty());
        self
    }
}

/// Outcome of a buffered run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunResult {
    /// Process exit code, or -1 when the run was killed
    pub exit_code: i32,
    /// Combined stdout/stderr text
    pub output: String,
    /// Whether the deadline forced termination
    pub timed_out: bool,
}

impl RunResult {
    pub fn completed(exit_code: i32, output: String) -> Self {
        Self {
            exit_code,
            output,
            timed_out: false,
        }
    }

    /// Result for a run killed at its deadline; keeps the partial output
    pub fn timed_out(mut output: String) -> Self {
        output.push_str(TIMEOUT_MARKER);
        Self {
            exit_code: ABNORMAL_EXIT_CODE,
            output,
            timed_out: true,
        }
    }

    /// Result for a run killed by cancellation
    pub fn cancelled(mut output: String) -> Self {
        output.push_str(CANCELLED_MARKER);
        Self {
            exit_code: ABNORMAL_EXIT_CODE,
            output,
            timed_out: false,
        }
    }

    /// Output prefixed with the exit code, e.g. `"[exit=0]\nEcho hello\n"`
    pub fn transcript(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for RunResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[exit={}]\n{}", self.exit_code, self.output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transcript_prefixes_exit_code() {
        let result = RunResult::completed(0, "hello\n".to_string());
        assert_eq!(result.transcript(), "[exit=0]\nhello\n");
    }

    #[test]
    fn test_timed_out_keeps_partial_output() {
        let result = RunResult::timed_out("partial\n".to_string());
        assert_eq!(result.exit_code, -1);
        assert!(result.timed_out);
        assert_eq!(result.transcript(), "[exit=-1]\npartial\n[timeout]\n");
    }

    #[test]
    fn test_blank_resume_token_dropped() {
        let request = RunRequest::new(AgentKind::Claude, "/tmp", "hi")
            .with_resume_token(Some("  ".to_string()));
        assert_eq!(request.resume_token, None);

        let request = request.with_resume_token(Some("abc".to_string()));
        assert_eq!(request.resume_token.as_deref(), Some("abc"));
    }
}
