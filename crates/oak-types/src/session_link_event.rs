use serde::{Deserialize, Serialize};

use crate::timestamp::Timestamp;

/// What changed about a session's parent link. Recorded purely for
/// analytics (the authoritative link lives on `sessions.parent_session_id`
/// itself); nothing reads this table back into a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionLinkEventType {
    AutoLinked,
    SuggestionAccepted,
    SuggestionRejected,
    ManualLinked,
    Unlinked,
}

impl SessionLinkEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionLinkEventType::AutoLinked => "auto_linked",
            SessionLinkEventType::SuggestionAccepted => "suggestion_accepted",
            SessionLinkEventType::SuggestionRejected => "suggestion_rejected",
            SessionLinkEventType::ManualLinked => "manual_linked",
            SessionLinkEventType::Unlinked => "unlinked",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "auto_linked" => Some(SessionLinkEventType::AutoLinked),
            "suggestion_accepted" => Some(SessionLinkEventType::SuggestionAccepted),
            "suggestion_rejected" => Some(SessionLinkEventType::SuggestionRejected),
            "manual_linked" => Some(SessionLinkEventType::ManualLinked),
            "unlinked" => Some(SessionLinkEventType::Unlinked),
            _ => None,
        }
    }
}

/// One row per parent-link mutation. `id` is left unset until the row is
/// read back, since the table is an autoincrementing analytics log rather
/// than an addressable entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionLinkEvent {
    pub id: Option<i64>,
    pub session_id: String,
    pub event_type: SessionLinkEventType,
    pub old_parent_id: Option<String>,
    pub new_parent_id: Option<String>,
    pub suggested_parent_id: Option<String>,
    pub suggestion_confidence: Option<f64>,
    pub link_reason: Option<String>,
    pub created_at: Timestamp,
}

impl SessionLinkEvent {
    pub fn new(session_id: impl Into<String>, event_type: SessionLinkEventType) -> Self {
        Self {
            id: None,
            session_id: session_id.into(),
            event_type,
            old_parent_id: None,
            new_parent_id: None,
            suggested_parent_id: None,
            suggestion_confidence: None,
            link_reason: None,
            created_at: Timestamp::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_type_round_trips() {
        for t in [
            SessionLinkEventType::AutoLinked,
            SessionLinkEventType::SuggestionAccepted,
            SessionLinkEventType::SuggestionRejected,
            SessionLinkEventType::ManualLinked,
            SessionLinkEventType::Unlinked,
        ] {
            assert_eq!(SessionLinkEventType::parse(t.as_str()), Some(t));
        }
    }
}
