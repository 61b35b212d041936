use serde::{Deserialize, Serialize};

use crate::hash::sha256_hex;
use crate::timestamp::Timestamp;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    Completed,
    Abandoned,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Active => "active",
            SessionStatus::Completed => "completed",
            SessionStatus::Abandoned => "abandoned",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(SessionStatus::Active),
            "completed" => Some(SessionStatus::Completed),
            "abandoned" => Some(SessionStatus::Abandoned),
            _ => None,
        }
    }
}

/// Why `parent_session_id` was set, so suggestions and dismissals can tell
/// an inferred link apart from one the agent declared explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParentReason {
    Clear,
    Compact,
    Resume,
    Inferred,
    Explicit,
}

impl ParentReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParentReason::Clear => "clear",
            ParentReason::Compact => "compact",
            ParentReason::Resume => "resume",
            ParentReason::Inferred => "inferred",
            ParentReason::Explicit => "explicit",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "clear" => Some(ParentReason::Clear),
            "compact" => Some(ParentReason::Compact),
            "resume" => Some(ParentReason::Resume),
            "inferred" => Some(ParentReason::Inferred),
            "explicit" => Some(ParentReason::Explicit),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub agent: String,
    pub project_root: String,
    pub started_at: Timestamp,
    pub ended_at: Option<Timestamp>,
    pub status: SessionStatus,
    pub prompt_count: i64,
    pub tool_count: i64,
    pub processed: bool,
    pub summary: Option<String>,
    pub title: Option<String>,
    pub manually_edited_title: bool,
    pub parent_session_id: Option<String>,
    pub parent_session_reason: Option<ParentReason>,
    pub suggested_parent_dismissed: bool,
    pub transcript_path: Option<String>,
    pub source_machine_id: String,
    pub content_hash: String,
}

impl Session {
    pub fn new(id: impl Into<String>, agent: impl Into<String>, project_root: impl Into<String>, source_machine_id: impl Into<String>) -> Self {
        let agent = agent.into();
        let project_root = project_root.into();
        let source_machine_id = source_machine_id.into();
        let id = id.into();
        let content_hash = Self::compute_content_hash(&id, &agent, &project_root, &source_machine_id);
        Self {
            id,
            agent,
            project_root,
            started_at: Timestamp::now(),
            ended_at: None,
            status: SessionStatus::Active,
            prompt_count: 0,
            tool_count: 0,
            processed: false,
            summary: None,
            title: None,
            manually_edited_title: false,
            parent_session_id: None,
            parent_session_reason: None,
            suggested_parent_dismissed: false,
            transcript_path: None,
            source_machine_id,
            content_hash,
        }
    }

    fn compute_content_hash(id: &str, agent: &str, project_root: &str, source_machine_id: &str) -> String {
        sha256_hex(&format!("{id}|{agent}|{project_root}|{source_machine_id}"))
    }

    pub fn recompute_content_hash(&mut self) {
        self.content_hash = Self::compute_content_hash(&self.id, &self.agent, &self.project_root, &self.source_machine_id);
    }
}
