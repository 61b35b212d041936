use serde::{Deserialize, Serialize};

use crate::hash::sha256_hex;
use crate::timestamp::Timestamp;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Activity {
    pub id: String,
    pub session_id: String,
    pub prompt_batch_id: Option<String>,
    pub tool_name: String,
    pub tool_input: Option<serde_json::Value>,
    pub tool_output_summary: Option<String>,
    pub file_path: Option<String>,
    pub files_affected: Vec<String>,
    pub duration_ms: Option<i64>,
    pub success: bool,
    pub error_message: Option<String>,
    pub timestamp: Timestamp,
    pub processed: bool,
    pub observation_id: Option<String>,
    pub source_machine_id: String,
    pub content_hash: String,
}

impl Activity {
    pub fn new(
        id: impl Into<String>,
        session_id: impl Into<String>,
        tool_name: impl Into<String>,
        source_machine_id: impl Into<String>,
    ) -> Self {
        let id = id.into();
        let session_id = session_id.into();
        let tool_name = tool_name.into();
        let source_machine_id = source_machine_id.into();
        let timestamp = Timestamp::now();
        let mut result = Self {
            id,
            session_id,
            prompt_batch_id: None,
            tool_name,
            tool_input: None,
            tool_output_summary: None,
            file_path: None,
            files_affected: Vec::new(),
            duration_ms: None,
            success: true,
            error_message: None,
            timestamp,
            processed: false,
            observation_id: None,
            source_machine_id,
            content_hash: String::new(),
        };
        result.recompute_content_hash();
        result
    }

    /// Dedup key across machines: hashes the tool call's content (name,
    /// touched file, what happened, when) but never row identity (`id`,
    /// `session_id`) or `source_machine_id`, so the same tool call replayed
    /// from another machine collides on purpose. Call after mutating
    /// `tool_name`, `file_path`, `tool_output_summary`, or `timestamp`
    /// directly.
    pub fn recompute_content_hash(&mut self) {
        self.content_hash = sha256_hex(&format!(
            "{}|{}|{}|{}",
            self.tool_name,
            self.file_path.as_deref().unwrap_or(""),
            self.tool_output_summary.as_deref().unwrap_or(""),
            self.timestamp.epoch(),
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_successful() {
        let a = Activity::new("a1", "s1", "Edit", "m1");
        assert!(a.success);
        assert!(a.files_affected.is_empty());
    }

    #[test]
    fn same_tool_call_from_different_machines_dedupes() {
        let mut a = Activity::new("a1", "s1", "Edit", "machine-a");
        a.file_path = Some("src/lib.rs".to_string());
        a.timestamp = Timestamp::from_epoch(1_000);
        a.recompute_content_hash();

        let mut b = Activity::new("a2", "s2", "Edit", "machine-b");
        b.file_path = Some("src/lib.rs".to_string());
        b.timestamp = Timestamp::from_epoch(1_000);
        b.recompute_content_hash();

        assert_eq!(a.content_hash, b.content_hash);
    }
}
