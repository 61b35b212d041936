//! Custom assertions for oak-ci-specific validation.
//!
//! High-level checks over the JSON a [`crate::TestWorld`] command or
//! `Tools` call returns, so tests read as intent rather than index chains.

use anyhow::{Context, Result};
use serde_json::Value;

/// Assert that a `search`/`memories` JSON result contains exactly `expected` hits.
pub fn assert_result_count(json: &Value, array_field: &str, expected: usize) -> Result<()> {
    let items = json[array_field].as_array().with_context(|| format!("expected '{array_field}' array in JSON"))?;
    if items.len() != expected {
        anyhow::bail!("expected {} items in '{}', got {}", expected, array_field, items.len());
    }
    Ok(())
}

/// Assert that every session in a `sessions` JSON array has the given project root.
pub fn assert_sessions_belong_to_project(sessions: &Value, project_root: &str) -> Result<()> {
    let sessions = sessions.as_array().context("expected a sessions array")?;
    for (i, session) in sessions.iter().enumerate() {
        let actual = session["project_root"].as_str().with_context(|| format!("session {i} missing project_root"))?;
        if actual != project_root {
            anyhow::bail!("session {i} belongs to project {actual} but expected {project_root}");
        }
    }
    Ok(())
}

/// Assert that a `memories` JSON array contains an observation with the given status.
pub fn assert_memories_contain_status(memories: &Value, status: &str) -> Result<()> {
    let memories = memories.as_array().context("expected a memories array")?;
    let statuses: Vec<String> = memories.iter().filter_map(|m| m["status"].as_str().map(String::from)).collect();
    if !statuses.iter().any(|s| s == status) {
        anyhow::bail!("expected a memory with status {status}, found {statuses:?}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn counts_match_expected() {
        let json = json!({"results": [{"id": "1"}, {"id": "2"}]});
        assert!(assert_result_count(&json, "results", 2).is_ok());
        assert!(assert_result_count(&json, "results", 1).is_err());
    }

    #[test]
    fn sessions_project_check() {
        let sessions = json!([{"project_root": "/a"}, {"project_root": "/a"}]);
        assert!(assert_sessions_belong_to_project(&sessions, "/a").is_ok());
        assert!(assert_sessions_belong_to_project(&sessions, "/b").is_err());
    }
}
