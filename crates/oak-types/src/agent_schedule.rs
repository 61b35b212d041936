use serde::{Deserialize, Serialize};

use crate::timestamp::Timestamp;

/// A cron-driven scheduled agent invocation. `instance_name` is the
/// primary key: `sync_schedules` reconciles by name rather than id so
/// re-applying a config file never duplicates a schedule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSchedule {
    pub instance_name: String,
    pub agent_name: String,
    pub cron_expression: String,
    pub enabled: bool,
    pub last_run_at: Option<Timestamp>,
    pub last_run_id: Option<String>,
    pub next_run_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl AgentSchedule {
    pub fn new(instance_name: impl Into<String>, agent_name: impl Into<String>, cron_expression: impl Into<String>) -> Self {
        let now = Timestamp::now();
        Self {
            instance_name: instance_name.into(),
            agent_name: agent_name.into(),
            cron_expression: cron_expression.into(),
            enabled: true,
            last_run_at: None,
            last_run_id: None,
            next_run_at: None,
            created_at: now,
            updated_at: now,
        }
    }
}
