//! Session model definitions

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::agent::AgentKind;

/// A chat session bound to a working directory and an agent kind
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub agent_kind: AgentKind,
    pub working_dir: PathBuf,
    pub created_at: DateTime<Utc>,
}

impl Session {
    /// Create a new session; the directory is expected to be validated already
    pub fn new(agent_kind: AgentKind, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            agent_kind,
            working_dir: working_dir.into(),
            created_at: Utc::now(),
        }
    }
}
