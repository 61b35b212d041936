use oak_types::{BatchStatus, PromptBatch, SourceType, Timestamp};
use rusqlite::{Connection, OptionalExtension, Row, params};

use crate::{Error, Result};

pub fn upsert(conn: &Connection, batch: &PromptBatch) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO prompt_batches (
            id, session_id, prompt_number, user_prompt, started_at, started_at_epoch,
            ended_at, ended_at_epoch, status, activity_count, processed, classification,
            source_type, plan_file_path, plan_content, plan_embedded, source_plan_batch_id,
            response_summary, source_machine_id, content_hash
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20)
        ON CONFLICT(id) DO UPDATE SET
            ended_at = ?7,
            ended_at_epoch = ?8,
            status = ?9,
            activity_count = ?10,
            processed = ?11,
            classification = ?12,
            plan_embedded = ?16,
            response_summary = ?18,
            content_hash = ?20
        "#,
        params![
            batch.id,
            batch.session_id,
            batch.prompt_number,
            batch.user_prompt,
            batch.started_at.to_iso(),
            batch.started_at.epoch(),
            batch.ended_at.map(|t| t.to_iso()),
            batch.ended_at.map(|t| t.epoch()),
            batch.status.as_str(),
            batch.activity_count,
            batch.processed,
            batch.classification,
            batch.source_type.as_str(),
            batch.plan_file_path,
            batch.plan_content,
            batch.plan_embedded,
            batch.source_plan_batch_id,
            batch.response_summary,
            batch.source_machine_id,
            batch.content_hash,
        ],
    )?;
    Ok(())
}

pub fn get(conn: &Connection, id: &str) -> Result<Option<PromptBatch>> {
    conn.query_row("SELECT * FROM prompt_batches WHERE id = ?1", [id], row_to_batch)
        .optional()
        .map_err(Error::from)
}

pub fn list_for_session(conn: &Connection, session_id: &str) -> Result<Vec<PromptBatch>> {
    let mut stmt = conn.prepare("SELECT * FROM prompt_batches WHERE session_id = ?1 ORDER BY prompt_number ASC")?;
    let rows = stmt.query_map([session_id], row_to_batch)?;
    rows.collect::<std::result::Result<Vec<_>, _>>().map_err(Error::from)
}

pub fn list_unprocessed_for_machine(conn: &Connection, machine_id: &str) -> Result<Vec<PromptBatch>> {
    let mut stmt = conn.prepare(
        "SELECT * FROM prompt_batches WHERE processed = 0 AND source_machine_id = ?1 ORDER BY started_at_epoch ASC",
    )?;
    let rows = stmt.query_map([machine_id], row_to_batch)?;
    rows.collect::<std::result::Result<Vec<_>, _>>().map_err(Error::from)
}

pub fn mark_processed(conn: &Connection, id: &str, classification: &str) -> Result<()> {
    conn.execute(
        "UPDATE prompt_batches SET processed = 1, classification = ?2, status = 'completed' WHERE id = ?1",
        params![id, classification],
    )?;
    Ok(())
}

/// One aggregated `UPDATE` per affected batch, not one per activity row.
pub fn increment_activity_count(conn: &Connection, id: &str, by: i64) -> Result<()> {
    if by == 0 {
        return Ok(());
    }
    conn.execute("UPDATE prompt_batches SET activity_count = activity_count + ?2 WHERE id = ?1", params![id, by])?;
    Ok(())
}

fn row_to_batch(row: &Row) -> rusqlite::Result<PromptBatch> {
    let started_epoch: i64 = row.get("started_at_epoch")?;
    let ended_epoch: Option<i64> = row.get("ended_at_epoch")?;
    let status: String = row.get("status")?;
    let source_type: String = row.get("source_type")?;
    Ok(PromptBatch {
        id: row.get("id")?,
        session_id: row.get("session_id")?,
        prompt_number: row.get("prompt_number")?,
        user_prompt: row.get::<_, Option<String>>("user_prompt")?.unwrap_or_default(),
        started_at: Timestamp::from_epoch(started_epoch),
        ended_at: ended_epoch.map(Timestamp::from_epoch),
        status: BatchStatus::parse(&status).unwrap_or(BatchStatus::Active),
        activity_count: row.get("activity_count")?,
        processed: row.get("processed")?,
        classification: row.get("classification")?,
        source_type: SourceType::parse(&source_type).unwrap_or(SourceType::User),
        plan_file_path: row.get("plan_file_path")?,
        plan_content: row.get("plan_content")?,
        plan_embedded: row.get("plan_embedded")?,
        source_plan_batch_id: row.get("source_plan_batch_id")?,
        response_summary: row.get("response_summary")?,
        source_machine_id: row.get("source_machine_id")?,
        content_hash: row.get::<_, Option<String>>("content_hash")?.unwrap_or_default(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Database;
    use crate::queries::sessions;
    use oak_types::Session;

    fn seed_session(conn: &Connection) {
        sessions::upsert(conn, &Session::new("s1", "claude-code", "/repo", "m1")).unwrap();
    }

    #[test]
    fn upsert_then_get_round_trips() {
        let db = Database::open_in_memory().unwrap();
        seed_session(db.conn());
        let batch = PromptBatch::new("b1", "s1", 1, "fix the bug", SourceType::User, "m1");
        upsert(db.conn(), &batch).unwrap();
        let fetched = get(db.conn(), "b1").unwrap().unwrap();
        assert_eq!(fetched.user_prompt, "fix the bug");
    }

    #[test]
    fn mark_processed_sets_classification_and_status() {
        let db = Database::open_in_memory().unwrap();
        seed_session(db.conn());
        let batch = PromptBatch::new("b1", "s1", 1, "prompt", SourceType::User, "m1");
        upsert(db.conn(), &batch).unwrap();
        mark_processed(db.conn(), "b1", "implementation").unwrap();
        let fetched = get(db.conn(), "b1").unwrap().unwrap();
        assert!(fetched.processed);
        assert_eq!(fetched.classification.as_deref(), Some("implementation"));
        assert_eq!(fetched.status, BatchStatus::Completed);
    }
}
