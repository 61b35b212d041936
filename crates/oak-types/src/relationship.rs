use serde::{Deserialize, Serialize};

use crate::timestamp::Timestamp;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipType {
    Related,
}

impl RelationshipType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationshipType::Related => "related",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "related" => Some(RelationshipType::Related),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CreatedBy {
    Suggestion,
    Manual,
}

impl CreatedBy {
    pub fn as_str(&self) -> &'static str {
        match self {
            CreatedBy::Suggestion => "suggestion",
            CreatedBy::Manual => "manual",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "suggestion" => Some(CreatedBy::Suggestion),
            "manual" => Some(CreatedBy::Manual),
            _ => None,
        }
    }
}

/// A relationship between two sessions. `session_a_id`/`session_b_id` are
/// always stored in canonical (lexicographically sorted) order so a pair
/// maps to exactly one row regardless of which side discovered it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRelationship {
    pub id: String,
    pub session_a_id: String,
    pub session_b_id: String,
    pub relationship_type: RelationshipType,
    pub similarity_score: Option<f64>,
    pub created_at: Timestamp,
    pub created_by: CreatedBy,
}

impl SessionRelationship {
    /// Orders the pair canonically and rejects self-links.
    pub fn new(
        id: impl Into<String>,
        session_a: impl Into<String>,
        session_b: impl Into<String>,
        relationship_type: RelationshipType,
        created_by: CreatedBy,
    ) -> Option<Self> {
        let session_a = session_a.into();
        let session_b = session_b.into();
        if session_a == session_b {
            return None;
        }
        let (session_a_id, session_b_id) = if session_a < session_b {
            (session_a, session_b)
        } else {
            (session_b, session_a)
        };
        Some(Self {
            id: id.into(),
            session_a_id,
            session_b_id,
            relationship_type,
            similarity_score: None,
            created_at: Timestamp::now(),
            created_by,
        })
    }

    pub fn involves(&self, session_id: &str) -> bool {
        self.session_a_id == session_id || self.session_b_id == session_id
    }

    pub fn other_session(&self, session_id: &str) -> Option<&str> {
        if self.session_a_id == session_id {
            Some(&self.session_b_id)
        } else if self.session_b_id == session_id {
            Some(&self.session_a_id)
        } else {
            None
        }
    }
}
