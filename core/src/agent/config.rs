//! Per-agent CLI configuration

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::kind::AgentKind;

/// Template marker replaced with the user message
pub const MESSAGE_PLACEHOLDER: &str = "${MESSAGE}";

/// Template marker replaced with the resume token
pub const RESUME_PLACEHOLDER: &str = "${RESUME_ID}";

fn default_stdin() -> bool {
    true
}

fn default_timeout_seconds() -> u64 {
    120
}

/// How to invoke one agent CLI
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Executable path, e.g. "codex" or "/usr/local/bin/claude"
    #[serde(default)]
    pub exec: String,
    /// Argument template; tokens may contain `${MESSAGE}`
    #[serde(default)]
    pub args: Vec<String>,
    /// Inserted before `args` only when a resume token is supplied; tokens may contain `${RESUME_ID}`
    #[serde(default)]
    pub resume_args: Vec<String>,
    /// If true, the message is written to the process stdin
    #[serde(default = "default_stdin")]
    pub stdin: bool,
    /// Max execution time in seconds (0 = no timeout)
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
    /// Additional environment variables
    #[serde(default)]
    pub env: HashMap<String, String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            exec: String::new(),
            args: Vec::new(),
            resume_args: Vec::new(),
            stdin: default_stdin(),
            timeout_seconds: default_timeout_seconds(),
            env: HashMap::new(),
        }
    }
}

impl AgentConfig {
    /// Create a config for the given executable with default policy
    pub fn new(exec: impl Into<String>) -> Self {
        Self {
            exec: exec.into(),
            ..Self::default()
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_resume_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.resume_args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_stdin(mut self, stdin: bool) -> Self {
        self.stdin = stdin;
        self
    }

    pub fn with_timeout_seconds(mut self, timeout_seconds: u64) -> Self {
        self.timeout_seconds = timeout_seconds;
        self
    }

    /// Whether an executable has been configured
    pub fn is_configured(&self) -> bool {
        !self.exec.trim().is_empty()
    }

    /// The execution deadline, if one is configured
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_seconds > 0).then(|| Duration::from_secs(self.timeout_seconds))
    }
}

/// Configuration for every supported agent kind
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentsConfig {
    #[serde(default)]
    pub codex: AgentConfig,
    #[serde(default)]
    pub claude: AgentConfig,
}

impl AgentsConfig {
    pub fn get(&self, kind: AgentKind) -> &AgentConfig {
        match kind {
            AgentKind::Codex => &self.codex,
            AgentKind::Claude => &self.claude,
        }
    }

    pub fn get_mut(&mut self, kind: AgentKind) -> &mut AgentConfig {
        match kind {
            AgentKind::Codex => &mut self.codex,
            AgentKind::Claude => &mut self.claude,
        }
    }

    /// Replace the config for one kind
    pub fn with(mut self, kind: AgentKind, config: AgentConfig) -> Self {
        *self.get_mut(kind) = config;
        self
    }
}
