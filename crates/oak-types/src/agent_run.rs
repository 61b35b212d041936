use serde::{Deserialize, Serialize};

use crate::timestamp::Timestamp;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentRunStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
    Timeout,
}

impl AgentRunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentRunStatus::Pending => "pending",
            AgentRunStatus::Running => "running",
            AgentRunStatus::Completed => "completed",
            AgentRunStatus::Failed => "failed",
            AgentRunStatus::Cancelled => "cancelled",
            AgentRunStatus::Timeout => "timeout",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(AgentRunStatus::Pending),
            "running" => Some(AgentRunStatus::Running),
            "completed" => Some(AgentRunStatus::Completed),
            "failed" => Some(AgentRunStatus::Failed),
            "cancelled" => Some(AgentRunStatus::Cancelled),
            "timeout" => Some(AgentRunStatus::Timeout),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, AgentRunStatus::Completed | AgentRunStatus::Failed | AgentRunStatus::Cancelled | AgentRunStatus::Timeout)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRun {
    pub id: String,
    pub agent_name: String,
    pub task: String,
    pub status: AgentRunStatus,
    pub started_at: Option<Timestamp>,
    pub ended_at: Option<Timestamp>,
    pub result: Option<String>,
    pub error: Option<String>,
    pub turns_used: Option<i64>,
    pub cost_usd: Option<f64>,
    pub files_created: Vec<String>,
    pub files_modified: Vec<String>,
    pub files_deleted: Vec<String>,
    pub project_config: Option<serde_json::Value>,
    pub system_prompt_hash: Option<String>,
    pub source_machine_id: String,
}

impl AgentRun {
    pub fn new(id: impl Into<String>, agent_name: impl Into<String>, task: impl Into<String>, source_machine_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            agent_name: agent_name.into(),
            task: task.into(),
            status: AgentRunStatus::Pending,
            started_at: None,
            ended_at: None,
            result: None,
            error: None,
            turns_used: None,
            cost_usd: None,
            files_created: Vec::new(),
            files_modified: Vec::new(),
            files_deleted: Vec::new(),
            project_config: None,
            system_prompt_hash: None,
            source_machine_id: source_machine_id.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_statuses() {
        assert!(AgentRunStatus::Completed.is_terminal());
        assert!(AgentRunStatus::Timeout.is_terminal());
        assert!(!AgentRunStatus::Running.is_terminal());
        assert!(!AgentRunStatus::Pending.is_terminal());
    }
}
