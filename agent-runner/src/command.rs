//! Argument vector construction for agent CLIs
//!
//! Arguments are always passed to the OS as a vector; nothing is ever joined
//! into a shell string.

use tracing::debug;

use agentweb_core::agent::{AgentConfig, MESSAGE_PLACEHOLDER, RESUME_PLACEHOLDER};

use crate::error::{ExecutorError, Result};

/// A fully resolved process invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    /// Executable to run
    pub program: String,
    /// Arguments as discrete elements
    pub args: Vec<String>,
    /// Whether the message is delivered on stdin
    pub use_stdin: bool,
    /// Extra environment variables
    pub env: Vec<(String, String)>,
}

impl CommandSpec {
    /// Build the invocation for one message
    pub fn build(config: &AgentConfig, message: &str, resume_token: Option<&str>) -> Result<Self> {
        if !config.is_configured() {
            return Err(ExecutorError::configuration("Executable not configured"));
        }

        let mut args = Vec::with_capacity(config.resume_args.len() + config.args.len());
        match resume_token {
            Some(token) if !config.resume_args.is_empty() => {
                args.extend(
                    config
                        .resume_args
                        .iter()
                        .map(|arg| substitute(&arg.replace(RESUME_PLACEHOLDER, token), message)),
                );
            }
            Some(_) => debug!("Agent {} does not support resume, ignoring token", config.exec),
            None => {}
        }
        args.extend(config.args.iter().map(|arg| substitute(arg, message)));

        let mut env: Vec<(String, String)> = config
            .env
            .iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        env.sort();

        Ok(Self {
            program: config.exec.trim().to_string(),
            args,
            use_stdin: config.stdin,
            env,
        })
    }
}

fn substitute(token: &str, message: &str) -> String {
    if token.contains(MESSAGE_PLACEHOLDER) {
        token.replace(MESSAGE_PLACEHOLDER, message)
    } else {
        token.to_string()
    }
}
