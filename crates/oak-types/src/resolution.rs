use serde::{Deserialize, Serialize};

use crate::hash::sha256_hex;

/// What happened to an observation, recorded so other machines can replay
/// the same change against their own copy of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionAction {
    Resolved,
    Superseded,
    Reactivated,
}

impl ResolutionAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResolutionAction::Resolved => "resolved",
            ResolutionAction::Superseded => "superseded",
            ResolutionAction::Reactivated => "reactivated",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "resolved" => Some(ResolutionAction::Resolved),
            "superseded" => Some(ResolutionAction::Superseded),
            "reactivated" => Some(ResolutionAction::Reactivated),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolutionEvent {
    pub id: String,
    pub observation_id: String,
    pub action: ResolutionAction,
    pub source_machine_id: String,
    pub resolved_by_session_id: Option<String>,
    pub superseded_by: Option<String>,
    pub applied: bool,
    pub content_hash: String,
}

impl ResolutionEvent {
    pub fn new(id: impl Into<String>, observation_id: impl Into<String>, action: ResolutionAction, source_machine_id: impl Into<String>) -> Self {
        let mut result = Self {
            id: id.into(),
            observation_id: observation_id.into(),
            action,
            source_machine_id: source_machine_id.into(),
            resolved_by_session_id: None,
            superseded_by: None,
            applied: false,
            content_hash: String::new(),
        };
        result.recompute_content_hash();
        result
    }

    /// Deduplication key: a given (machine, observation, action,
    /// resolved_by_session_id, superseded_by) should only ever be replayed
    /// once, regardless of how many times it's re-synced. Two different
    /// resolution outcomes on the same observation from the same machine
    /// (e.g. superseded by two different observations) must not collide,
    /// so both fields are part of the hash. Call after mutating
    /// `resolved_by_session_id` or `superseded_by` directly.
    pub fn recompute_content_hash(&mut self) {
        self.content_hash = sha256_hex(&format!(
            "{}|{}|{}|{}|{}",
            self.observation_id,
            self.action.as_str(),
            self.source_machine_id,
            self.resolved_by_session_id.as_deref().unwrap_or(""),
            self.superseded_by.as_deref().unwrap_or(""),
        ));
    }
}
