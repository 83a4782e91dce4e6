//! Gateway configuration
//!
//! Loaded from a TOML file; every section is optional and falls back to
//! defaults. A handful of environment variables override file values.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::agent::{AgentKind, AgentsConfig};
use crate::Result;

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub sessions: SessionConfig,
    #[serde(default)]
    pub stream: StreamConfig,
    #[serde(default)]
    pub agents: AgentsConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Socket address the HTTP server binds to
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8081".to_string(),
        }
    }
}

/// Worker pool sizing for streaming runs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Workers that stay alive for the lifetime of the pool
    pub core_workers: usize,
    /// Upper bound on concurrently running jobs
    pub max_workers: usize,
    /// Pending jobs accepted before submissions are rejected
    pub queue_capacity: usize,
    /// Idle time after which a surplus worker exits
    pub keep_alive_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            core_workers: 2,
            max_workers: 8,
            queue_capacity: 100,
            keep_alive_secs: 60,
        }
    }
}

impl SchedulerConfig {
    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs)
    }
}

/// Session lifetime policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Sessions unused for longer than this are evicted (0 = never)
    pub idle_ttl_secs: u64,
    /// How often the eviction sweep runs
    pub sweep_interval_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_ttl_secs: 24 * 60 * 60,
            sweep_interval_secs: 300,
        }
    }
}

impl SessionConfig {
    pub fn idle_ttl(&self) -> Option<Duration> {
        (self.idle_ttl_secs > 0).then(|| Duration::from_secs(self.idle_ttl_secs))
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }
}

/// Streaming delivery policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Capacity of the event channel between a run and its consumer
    pub buffer: usize,
    /// Kill the agent process when the consumer goes away
    pub cancel_on_disconnect: bool,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            buffer: 64,
            cancel_on_disconnect: true,
        }
    }
}

impl GatewayConfig {
    /// Parse a config from TOML text
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    /// Load a config file; a missing file yields the defaults
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            debug!("Config file {:?} not found, using defaults", path);
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    /// Apply `AGENTWEB_BIND`, `AGENTWEB_<KIND>_EXEC` and
    /// `AGENTWEB_<KIND>_TIMEOUT_SECONDS` overrides from the process environment
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary lookup
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(bind) = lookup("AGENTWEB_BIND") {
            self.server.bind = bind;
        }

        for kind in AgentKind::ALL {
            let prefix = format!("AGENTWEB_{}", kind.as_str());
            let agent = self.agents.get_mut(kind);
            if let Some(exec) = lookup(&format!("{prefix}_EXEC")) {
                agent.exec = exec;
            }
            if let Some(timeout) = lookup(&format!("{prefix}_TIMEOUT_SECONDS")) {
                match timeout.trim().parse() {
                    Ok(seconds) => agent.timeout_seconds = seconds,
                    Err(_) => debug!("Ignoring invalid {prefix}_TIMEOUT_SECONDS: {timeout}"),
                }
            }
        }
    }
}
