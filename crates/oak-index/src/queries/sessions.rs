use oak_types::{ParentReason, Session, SessionStatus, Timestamp};
use rusqlite::{Connection, OptionalExtension, Row, params};

use crate::{Error, Result};

pub fn upsert(conn: &Connection, session: &Session) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO sessions (
            id, agent, project_root, started_at, started_at_epoch, ended_at, ended_at_epoch,
            status, prompt_count, tool_count, processed, summary, title, manually_edited_title,
            parent_session_id, parent_session_reason, suggested_parent_dismissed,
            transcript_path, source_machine_id, content_hash
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20)
        ON CONFLICT(id) DO UPDATE SET
            ended_at = ?6,
            ended_at_epoch = ?7,
            status = ?8,
            prompt_count = ?9,
            tool_count = ?10,
            processed = ?11,
            summary = ?12,
            title = ?13,
            manually_edited_title = ?14,
            parent_session_id = ?15,
            parent_session_reason = ?16,
            suggested_parent_dismissed = ?17,
            transcript_path = ?18,
            content_hash = ?20
        "#,
        params![
            session.id,
            session.agent,
            session.project_root,
            session.started_at.to_iso(),
            session.started_at.epoch(),
            session.ended_at.map(|t| t.to_iso()),
            session.ended_at.map(|t| t.epoch()),
            session.status.as_str(),
            session.prompt_count,
            session.tool_count,
            session.processed,
            session.summary,
            session.title,
            session.manually_edited_title,
            session.parent_session_id,
            session.parent_session_reason.map(|r| r.as_str()),
            session.suggested_parent_dismissed,
            session.transcript_path,
            session.source_machine_id,
            session.content_hash,
        ],
    )?;
    Ok(())
}

pub fn get(conn: &Connection, id: &str) -> Result<Option<Session>> {
    conn.query_row("SELECT * FROM sessions WHERE id = ?1", [id], row_to_session)
        .optional()
        .map_err(Error::from)
}

pub fn list_recent(conn: &Connection, limit: usize) -> Result<Vec<Session>> {
    let mut stmt = conn.prepare("SELECT * FROM sessions ORDER BY started_at_epoch DESC LIMIT ?1")?;
    let rows = stmt.query_map([limit as i64], row_to_session)?;
    rows.collect::<std::result::Result<Vec<_>, _>>().map_err(Error::from)
}

pub fn list_unprocessed_for_machine(conn: &Connection, machine_id: &str) -> Result<Vec<Session>> {
    let mut stmt = conn.prepare(
        "SELECT * FROM sessions WHERE processed = 0 AND source_machine_id = ?1 ORDER BY started_at_epoch ASC",
    )?;
    let rows = stmt.query_map([machine_id], row_to_session)?;
    rows.collect::<std::result::Result<Vec<_>, _>>().map_err(Error::from)
}

pub fn mark_processed(conn: &Connection, id: &str) -> Result<()> {
    conn.execute("UPDATE sessions SET processed = 1 WHERE id = ?1", [id])?;
    Ok(())
}

pub fn increment_prompt_count(conn: &Connection, id: &str) -> Result<()> {
    conn.execute("UPDATE sessions SET prompt_count = prompt_count + 1 WHERE id = ?1", [id])?;
    Ok(())
}

/// One aggregated `UPDATE` per affected session, not one per activity row.
pub fn increment_tool_count(conn: &Connection, id: &str, by: i64) -> Result<()> {
    if by == 0 {
        return Ok(());
    }
    conn.execute("UPDATE sessions SET tool_count = tool_count + ?2 WHERE id = ?1", params![id, by])?;
    Ok(())
}

pub fn set_parent(conn: &Connection, id: &str, parent_id: &str, reason: ParentReason) -> Result<()> {
    conn.execute(
        "UPDATE sessions SET parent_session_id = ?2, parent_session_reason = ?3 WHERE id = ?1",
        params![id, parent_id, reason.as_str()],
    )?;
    Ok(())
}

pub fn dismiss_suggested_parent(conn: &Connection, id: &str) -> Result<()> {
    conn.execute("UPDATE sessions SET suggested_parent_dismissed = 1 WHERE id = ?1", [id])?;
    Ok(())
}

pub fn reset_suggested_parent_dismissal(conn: &Connection, id: &str) -> Result<()> {
    conn.execute("UPDATE sessions SET suggested_parent_dismissed = 0 WHERE id = ?1", [id])?;
    Ok(())
}

fn row_to_session(row: &Row) -> rusqlite::Result<Session> {
    let started_at_epoch: i64 = row.get("started_at_epoch")?;
    let ended_at_epoch: Option<i64> = row.get("ended_at_epoch")?;
    let status: String = row.get("status")?;
    let parent_reason: Option<String> = row.get("parent_session_reason")?;
    Ok(Session {
        id: row.get("id")?,
        agent: row.get("agent")?,
        project_root: row.get("project_root")?,
        started_at: Timestamp::from_epoch(started_at_epoch),
        ended_at: ended_at_epoch.map(Timestamp::from_epoch),
        status: SessionStatus::parse(&status).unwrap_or(SessionStatus::Active),
        prompt_count: row.get("prompt_count")?,
        tool_count: row.get("tool_count")?,
        processed: row.get("processed")?,
        summary: row.get("summary")?,
        title: row.get("title")?,
        manually_edited_title: row.get("manually_edited_title")?,
        parent_session_id: row.get("parent_session_id")?,
        parent_session_reason: parent_reason.and_then(|r| ParentReason::parse(&r)),
        suggested_parent_dismissed: row.get("suggested_parent_dismissed")?,
        transcript_path: row.get("transcript_path")?,
        source_machine_id: row.get("source_machine_id")?,
        content_hash: row.get::<_, Option<String>>("content_hash")?.unwrap_or_default(),
    })
}
