use serde::{Deserialize, Serialize};

use crate::hash::sha256_hex;
use crate::timestamp::Timestamp;

/// Kind of thing an observation records. `session_summary` and `plan` are
/// produced by the processor itself rather than extracted from tool use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryType {
    Gotcha,
    BugFix,
    Decision,
    Discovery,
    TradeOff,
    SessionSummary,
    Plan,
}

impl MemoryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryType::Gotcha => "gotcha",
            MemoryType::BugFix => "bug_fix",
            MemoryType::Decision => "decision",
            MemoryType::Discovery => "discovery",
            MemoryType::TradeOff => "trade_off",
            MemoryType::SessionSummary => "session_summary",
            MemoryType::Plan => "plan",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "gotcha" => Some(MemoryType::Gotcha),
            "bug_fix" => Some(MemoryType::BugFix),
            "decision" => Some(MemoryType::Decision),
            "discovery" => Some(MemoryType::Discovery),
            "trade_off" => Some(MemoryType::TradeOff),
            "session_summary" => Some(MemoryType::SessionSummary),
            "plan" => Some(MemoryType::Plan),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObservationStatus {
    Active,
    Resolved,
    Superseded,
}

impl ObservationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ObservationStatus::Active => "active",
            ObservationStatus::Resolved => "resolved",
            ObservationStatus::Superseded => "superseded",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(ObservationStatus::Active),
            "resolved" => Some(ObservationStatus::Resolved),
            "superseded" => Some(ObservationStatus::Superseded),
            _ => None,
        }
    }
}

/// Whether an observation came from a session the daemon observed directly,
/// or was inherited via a resolution event replayed from another machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionOriginType {
    Local,
    Replayed,
}

impl SessionOriginType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionOriginType::Local => "local",
            SessionOriginType::Replayed => "replayed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "local" => Some(SessionOriginType::Local),
            "replayed" => Some(SessionOriginType::Replayed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredObservation {
    pub id: String,
    pub session_id: String,
    pub prompt_batch_id: Option<String>,
    pub observation: String,
    pub memory_type: MemoryType,
    pub context: Option<String>,
    pub tags: Vec<String>,
    pub importance: u8,
    pub file_path: Option<String>,
    pub created_at: Timestamp,
    pub embedded: bool,
    pub status: ObservationStatus,
    pub resolved_by_session_id: Option<String>,
    pub resolved_at: Option<Timestamp>,
    pub superseded_by: Option<String>,
    pub session_origin_type: SessionOriginType,
    pub source_machine_id: String,
    pub content_hash: String,
}

impl StoredObservation {
    pub fn new(
        id: impl Into<String>,
        session_id: impl Into<String>,
        observation: impl Into<String>,
        memory_type: MemoryType,
        importance: u8,
        source_machine_id: impl Into<String>,
    ) -> Self {
        let id = id.into();
        let session_id = session_id.into();
        let observation = observation.into();
        let source_machine_id = source_machine_id.into();
        let importance = importance.clamp(1, 10);
        let mut result = Self {
            id,
            session_id,
            prompt_batch_id: None,
            observation,
            memory_type,
            context: None,
            tags: Vec::new(),
            importance,
            file_path: None,
            created_at: Timestamp::now(),
            embedded: false,
            status: ObservationStatus::Active,
            resolved_by_session_id: None,
            resolved_at: None,
            superseded_by: None,
            session_origin_type: SessionOriginType::Local,
            source_machine_id,
            content_hash: String::new(),
        };
        result.recompute_content_hash();
        result
    }

    /// Dedup key across machines: hashes only the semantically significant
    /// fields, not row identity (`id`, `session_id`) or `source_machine_id`,
    /// so the same observation content arriving from two machines collides
    /// on purpose. Call after mutating `observation`, `memory_type`,
    /// `context`, or `file_path` directly.
    pub fn recompute_content_hash(&mut self) {
        self.content_hash = sha256_hex(&format!(
            "{}|{}|{}|{}",
            self.observation,
            self.memory_type.as_str(),
            self.context.as_deref().unwrap_or(""),
            self.file_path.as_deref().unwrap_or(""),
        ));
    }

    pub fn tags_csv(&self) -> String {
        self.tags.join(",")
    }

    pub fn tags_from_csv(csv: &str) -> Vec<String> {
        csv.split(',').map(str::trim).filter(|s| !s.is_empty()).map(String::from).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn importance_is_clamped() {
        let o = StoredObservation::new("o1", "s1", "text", MemoryType::Gotcha, 255, "m1");
        assert_eq!(o.importance, 10);
        let o2 = StoredObservation::new("o2", "s1", "text", MemoryType::Gotcha, 0, "m1");
        assert_eq!(o2.importance, 1);
    }

    #[test]
    fn tags_round_trip_through_csv() {
        let csv = "a, b ,c";
        assert_eq!(StoredObservation::tags_from_csv(csv), vec!["a", "b", "c"]);
    }

    #[test]
    fn same_content_from_different_machines_dedupes() {
        let a = StoredObservation::new("o1", "s1", "watch for this", MemoryType::Gotcha, 5, "machine-a");
        let b = StoredObservation::new("o2", "s2", "watch for this", MemoryType::Gotcha, 5, "machine-b");
        assert_eq!(a.content_hash, b.content_hash);
    }

    #[test]
    fn recompute_picks_up_context_and_file_path_changes() {
        let mut o = StoredObservation::new("o1", "s1", "watch for this", MemoryType::Gotcha, 5, "m1");
        let before = o.content_hash.clone();
        o.context = Some("during a refactor".to_string());
        o.file_path = Some("src/lib.rs".to_string());
        o.recompute_content_hash();
        assert_ne!(before, o.content_hash);
    }
}
