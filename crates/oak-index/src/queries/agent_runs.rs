use oak_types::{AgentRun, AgentRunStatus, Timestamp};
use rusqlite::{Connection, OptionalExtension, Row, params};

use crate::{Error, Result};

pub fn create(conn: &Connection, run: &AgentRun) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO agent_runs (
            id, agent_name, task, status, created_at_epoch, started_at, started_at_epoch,
            completed_at, completed_at_epoch, result, error, turns_used, cost_usd,
            files_created, files_modified, files_deleted, project_config, system_prompt_hash,
            source_machine_id
        ) VALUES (?1, ?2, ?3, ?4, strftime('%s','now'), ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)
        "#,
        params![
            run.id,
            run.agent_name,
            run.task,
            run.status.as_str(),
            run.started_at.map(|t| t.to_iso()),
            run.started_at.map(|t| t.epoch()),
            run.ended_at.map(|t| t.to_iso()),
            run.ended_at.map(|t| t.epoch()),
            run.result,
            run.error,
            run.turns_used,
            run.cost_usd,
            serde_json::to_string(&run.files_created).ok(),
            serde_json::to_string(&run.files_modified).ok(),
            serde_json::to_string(&run.files_deleted).ok(),
            run.project_config.as_ref().map(|v| v.to_string()),
            run.system_prompt_hash,
            run.source_machine_id,
        ],
    )?;
    Ok(())
}

pub fn set_status(conn: &Connection, id: &str, status: AgentRunStatus) -> Result<()> {
    conn.execute("UPDATE agent_runs SET status = ?2 WHERE id = ?1", params![id, status.as_str()])?;
    Ok(())
}

pub fn complete(conn: &Connection, id: &str, status: AgentRunStatus, result: Option<&str>, error: Option<&str>) -> Result<()> {
    let now = Timestamp::now();
    conn.execute(
        "UPDATE agent_runs SET status = ?2, completed_at = ?3, completed_at_epoch = ?4, result = ?5, error = ?6 WHERE id = ?1",
        params![id, status.as_str(), now.to_iso(), now.epoch(), result, error],
    )?;
    Ok(())
}

pub fn get(conn: &Connection, id: &str) -> Result<Option<AgentRun>> {
    conn.query_row("SELECT * FROM agent_runs WHERE id = ?1", [id], row_to_run)
        .optional()
        .map_err(Error::from)
}

pub fn list_recent(conn: &Connection, agent_name: Option<&str>, limit: usize) -> Result<Vec<AgentRun>> {
    if let Some(name) = agent_name {
        let mut stmt = conn.prepare(
            "SELECT * FROM agent_runs WHERE agent_name = ?1 ORDER BY created_at_epoch DESC LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![name, limit as i64], row_to_run)?;
        rows.collect::<std::result::Result<Vec<_>, _>>().map_err(Error::from)
    } else {
        let mut stmt = conn.prepare("SELECT * FROM agent_runs ORDER BY created_at_epoch DESC LIMIT ?1")?;
        let rows = stmt.query_map([limit as i64], row_to_run)?;
        rows.collect::<std::result::Result<Vec<_>, _>>().map_err(Error::from)
    }
}

fn row_to_run(row: &Row) -> rusqlite::Result<AgentRun> {
    let started_epoch: Option<i64> = row.get("started_at_epoch")?;
    let ended_epoch: Option<i64> = row.get("completed_at_epoch")?;
    let status: String = row.get("status")?;
    let files_created: Option<String> = row.get("files_created")?;
    let files_modified: Option<String> = row.get("files_modified")?;
    let files_deleted: Option<String> = row.get("files_deleted")?;
    let project_config: Option<String> = row.get("project_config")?;
    Ok(AgentRun {
        id: row.get("id")?,
        agent_name: row.get("agent_name")?,
        task: row.get("task")?,
        status: AgentRunStatus::parse(&status).unwrap_or(AgentRunStatus::Pending),
        started_at: started_epoch.map(Timestamp::from_epoch),
        ended_at: ended_epoch.map(Timestamp::from_epoch),
        result: row.get("result")?,
        error: row.get("error")?,
        turns_used: row.get("turns_used")?,
        cost_usd: row.get("cost_usd")?,
        files_created: files_created.and_then(|s| serde_json::from_str(&s).ok()).unwrap_or_default(),
        files_modified: files_modified.and_then(|s| serde_json::from_str(&s).ok()).unwrap_or_default(),
        files_deleted: files_deleted.and_then(|s| serde_json::from_str(&s).ok()).unwrap_or_default(),
        project_config: project_config.and_then(|s| serde_json::from_str(&s).ok()),
        system_prompt_hash: row.get("system_prompt_hash")?,
        source_machine_id: row.get::<_, Option<String>>("source_machine_id")?.unwrap_or_default(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Database;

    #[test]
    fn create_then_complete_round_trips() {
        let db = Database::open_in_memory().unwrap();
        let run = AgentRun::new("run1", "doc-writer", "write docs", "m1");
        create(db.conn(), &run).unwrap();
        complete(db.conn(), "run1", AgentRunStatus::Completed, Some("done"), None).unwrap();
        let fetched = get(db.conn(), "run1").unwrap().unwrap();
        assert_eq!(fetched.status, AgentRunStatus::Completed);
        assert_eq!(fetched.result.as_deref(), Some("done"));
    }

    #[test]
    fn list_recent_filters_by_agent_name() {
        let db = Database::open_in_memory().unwrap();
        create(db.conn(), &AgentRun::new("run1", "doc-writer", "task", "m1")).unwrap();
        create(db.conn(), &AgentRun::new("run2", "reviewer", "task", "m1")).unwrap();
        let doc_runs = list_recent(db.conn(), Some("doc-writer"), 10).unwrap();
        assert_eq!(doc_runs.len(), 1);
        assert_eq!(doc_runs[0].id, "run1");
    }
}
