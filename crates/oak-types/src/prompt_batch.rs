use serde::{Deserialize, Serialize};

use crate::hash::sha256_hex;
use crate::timestamp::Timestamp;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    Active,
    Completed,
}

impl BatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchStatus::Active => "active",
            BatchStatus::Completed => "completed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(BatchStatus::Active),
            "completed" => Some(BatchStatus::Completed),
            _ => None,
        }
    }
}

/// What kind of prompt produced this batch, used by the processor's
/// dispatch table to pick a handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    User,
    AgentNotification,
    Plan,
    System,
    DerivedPlan,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::User => "user",
            SourceType::AgentNotification => "agent_notification",
            SourceType::Plan => "plan",
            SourceType::System => "system",
            SourceType::DerivedPlan => "derived_plan",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(SourceType::User),
            "agent_notification" => Some(SourceType::AgentNotification),
            "plan" => Some(SourceType::Plan),
            "system" => Some(SourceType::System),
            "derived_plan" => Some(SourceType::DerivedPlan),
            _ => None,
        }
    }
}

const USER_PROMPT_MAX_CHARS: usize = 10_000;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptBatch {
    pub id: String,
    pub session_id: String,
    pub prompt_number: i64,
    pub user_prompt: String,
    pub started_at: Timestamp,
    pub ended_at: Option<Timestamp>,
    pub status: BatchStatus,
    pub activity_count: i64,
    pub processed: bool,
    pub classification: Option<String>,
    pub source_type: SourceType,
    pub plan_file_path: Option<String>,
    pub plan_content: Option<String>,
    pub plan_embedded: bool,
    pub source_plan_batch_id: Option<String>,
    pub response_summary: Option<String>,
    pub source_machine_id: String,
    pub content_hash: String,
}

impl PromptBatch {
    pub fn new(
        id: impl Into<String>,
        session_id: impl Into<String>,
        prompt_number: i64,
        user_prompt: impl Into<String>,
        source_type: SourceType,
        source_machine_id: impl Into<String>,
    ) -> Self {
        let id = id.into();
        let session_id = session_id.into();
        let source_machine_id = source_machine_id.into();
        let user_prompt = truncate_prompt(&user_prompt.into());
        let content_hash = Self::compute_content_hash(&id, &session_id, prompt_number, &user_prompt, &source_machine_id);
        Self {
            id,
            session_id,
            prompt_number,
            user_prompt,
            started_at: Timestamp::now(),
            ended_at: None,
            status: BatchStatus::Active,
            activity_count: 0,
            processed: false,
            classification: None,
            source_type,
            plan_file_path: None,
            plan_content: None,
            plan_embedded: false,
            source_plan_batch_id: None,
            response_summary: None,
            source_machine_id,
            content_hash,
        }
    }

    fn compute_content_hash(id: &str, session_id: &str, prompt_number: i64, user_prompt: &str, source_machine_id: &str) -> String {
        sha256_hex(&format!("{id}|{session_id}|{prompt_number}|{user_prompt}|{source_machine_id}"))
    }
}

fn truncate_prompt(prompt: &str) -> String {
    if prompt.chars().count() <= USER_PROMPT_MAX_CHARS {
        prompt.to_string()
    } else {
        prompt.chars().take(USER_PROMPT_MAX_CHARS).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncates_long_prompts() {
        let long = "a".repeat(USER_PROMPT_MAX_CHARS + 500);
        let batch = PromptBatch::new("b1", "s1", 1, long, SourceType::User, "m1");
        assert_eq!(batch.user_prompt.chars().count(), USER_PROMPT_MAX_CHARS);
    }

    #[test]
    fn source_type_round_trips() {
        for st in [
            SourceType::User,
            SourceType::AgentNotification,
            SourceType::Plan,
            SourceType::System,
            SourceType::DerivedPlan,
        ] {
            assert_eq!(SourceType::parse(st.as_str()), Some(st));
        }
    }
}
