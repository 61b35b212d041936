use oak_types::{Activity, Timestamp};
use rusqlite::{Connection, OptionalExtension, Row, params};

use crate::{Error, Result};

pub fn insert(conn: &Connection, activity: &Activity) -> Result<()> {
    insert_stmt(conn, activity)
}

fn insert_stmt(conn: &Connection, activity: &Activity) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO activities (
            id, session_id, prompt_batch_id, tool_name, tool_input, tool_output_summary,
            file_path, files_affected, duration_ms, success, error_message, timestamp,
            timestamp_epoch, processed, observation_id, source_machine_id, content_hash
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)
        "#,
        params![
            activity.id,
            activity.session_id,
            activity.prompt_batch_id,
            activity.tool_name,
            activity.tool_input.as_ref().map(|v| v.to_string()),
            activity.tool_output_summary,
            activity.file_path,
            serde_json::to_string(&activity.files_affected).ok(),
            activity.duration_ms,
            activity.success,
            activity.error_message,
            activity.timestamp.to_iso(),
            activity.timestamp.epoch(),
            activity.processed,
            activity.observation_id,
            activity.source_machine_id,
            activity.content_hash,
        ],
    )?;
    Ok(())
}

/// Bulk-insert within a single transaction. If any row trips a foreign-key
/// or unique violation, the whole transaction rolls back and each row is
/// retried individually so one bad activity doesn't drop its siblings.
pub fn insert_many(conn: &mut Connection, activities: &[Activity]) -> Result<usize> {
    let tx = conn.transaction()?;
    let bulk_result = (|| -> Result<()> {
        for activity in activities {
            insert_stmt(&tx, activity)?;
        }
        Ok(())
    })();

    match bulk_result {
        Ok(()) => {
            tx.commit()?;
            Ok(activities.len())
        }
        Err(Error::Integrity(_)) => {
            tx.rollback()?;
            individual_insert_fallback(conn, activities)
        }
        Err(other) => {
            tx.rollback()?;
            Err(other)
        }
    }
}

fn individual_insert_fallback(conn: &Connection, activities: &[Activity]) -> Result<usize> {
    let mut inserted = 0;
    for activity in activities {
        match insert_stmt(conn, activity) {
            Ok(()) => inserted += 1,
            Err(Error::Integrity(msg)) => {
                tracing::warn!(activity_id = %activity.id, error = %msg, "skipping activity with integrity violation");
            }
            Err(other) => return Err(other),
        }
    }
    Ok(inserted)
}

pub fn get(conn: &Connection, id: &str) -> Result<Option<Activity>> {
    conn.query_row("SELECT * FROM activities WHERE id = ?1", [id], row_to_activity)
        .optional()
        .map_err(Error::from)
}

pub fn list_for_session(conn: &Connection, session_id: &str, tool_name: Option<&str>, limit: usize) -> Result<Vec<Activity>> {
    let (sql, params): (&str, Vec<Box<dyn rusqlite::ToSql>>) = if let Some(tool) = tool_name {
        (
            "SELECT * FROM activities WHERE session_id = ?1 AND tool_name = ?2 ORDER BY timestamp_epoch DESC LIMIT ?3",
            vec![Box::new(session_id.to_string()), Box::new(tool.to_string()), Box::new(limit as i64)],
        )
    } else {
        (
            "SELECT * FROM activities WHERE session_id = ?1 ORDER BY timestamp_epoch DESC LIMIT ?2",
            vec![Box::new(session_id.to_string()), Box::new(limit as i64)],
        )
    };
    let mut stmt = conn.prepare(sql)?;
    let refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();
    let rows = stmt.query_map(refs.as_slice(), row_to_activity)?;
    rows.collect::<std::result::Result<Vec<_>, _>>().map_err(Error::from)
}

pub fn list_for_batch(conn: &Connection, batch_id: &str) -> Result<Vec<Activity>> {
    let mut stmt = conn.prepare("SELECT * FROM activities WHERE prompt_batch_id = ?1 ORDER BY timestamp_epoch ASC")?;
    let rows = stmt.query_map([batch_id], row_to_activity)?;
    rows.collect::<std::result::Result<Vec<_>, _>>().map_err(Error::from)
}

pub fn list_unprocessed_for_machine(conn: &Connection, machine_id: &str) -> Result<Vec<Activity>> {
    let mut stmt = conn.prepare(
        "SELECT * FROM activities WHERE processed = 0 AND source_machine_id = ?1 ORDER BY timestamp_epoch ASC",
    )?;
    let rows = stmt.query_map([machine_id], row_to_activity)?;
    rows.collect::<std::result::Result<Vec<_>, _>>().map_err(Error::from)
}

pub fn mark_processed(conn: &Connection, ids: &[String]) -> Result<()> {
    for id in ids {
        conn.execute("UPDATE activities SET processed = 1 WHERE id = ?1", [id])?;
    }
    Ok(())
}

pub fn search(conn: &Connection, query: &str, limit: usize) -> Result<Vec<Activity>> {
    let mut stmt = conn.prepare(
        r#"
        SELECT a.* FROM activities a
        JOIN activities_fts f ON a.rowid = f.rowid
        WHERE activities_fts MATCH ?1
        ORDER BY a.timestamp_epoch DESC
        LIMIT ?2
        "#,
    )?;
    let rows = stmt.query_map(params![query, limit as i64], row_to_activity)?;
    rows.collect::<std::result::Result<Vec<_>, _>>().map_err(Error::from)
}

fn row_to_activity(row: &Row) -> rusqlite::Result<Activity> {
    let timestamp_epoch: i64 = row.get("timestamp_epoch")?;
    let tool_input: Option<String> = row.get("tool_input")?;
    let files_affected: Option<String> = row.get("files_affected")?;
    Ok(Activity {
        id: row.get("id")?,
        session_id: row.get("session_id")?,
        prompt_batch_id: row.get("prompt_batch_id")?,
        tool_name: row.get("tool_name")?,
        tool_input: tool_input.and_then(|s| serde_json::from_str(&s).ok()),
        tool_output_summary: row.get("tool_output_summary")?,
        file_path: row.get("file_path")?,
        files_affected: files_affected.and_then(|s| serde_json::from_str(&s).ok()).unwrap_or_default(),
        duration_ms: row.get("duration_ms")?,
        success: row.get("success")?,
        error_message: row.get("error_message")?,
        timestamp: Timestamp::from_epoch(timestamp_epoch),
        processed: row.get("processed")?,
        observation_id: row.get("observation_id")?,
        source_machine_id: row.get("source_machine_id")?,
        content_hash: row.get::<_, Option<String>>("content_hash")?.unwrap_or_default(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Database;
    use crate::queries::{prompt_batches, sessions};
    use oak_types::{PromptBatch, Session, SourceType};

    fn seed(conn: &Connection) {
        sessions::upsert(conn, &Session::new("s1", "claude-code", "/repo", "m1")).unwrap();
        prompt_batches::upsert(conn, &PromptBatch::new("b1", "s1", 1, "prompt", SourceType::User, "m1")).unwrap();
    }

    #[test]
    fn insert_then_get_round_trips() {
        let db = Database::open_in_memory().unwrap();
        seed(db.conn());
        let mut activity = Activity::new("a1", "s1", "Edit", "m1");
        activity.prompt_batch_id = Some("b1".to_string());
        insert(db.conn(), &activity).unwrap();
        let fetched = get(db.conn(), "a1").unwrap().unwrap();
        assert_eq!(fetched.tool_name, "Edit");
    }

    #[test]
    fn insert_many_falls_back_on_integrity_violation() {
        let mut db = Database::open_in_memory().unwrap();
        seed(db.conn());
        let good = Activity::new("a1", "s1", "Edit", "m1");
        let bad = Activity::new("a2", "missing-session", "Edit", "m1");
        let inserted = insert_many(db.conn_mut(), &[good, bad]).unwrap();
        assert_eq!(inserted, 1);
        assert!(get(db.conn(), "a1").unwrap().is_some());
        assert!(get(db.conn(), "a2").unwrap().is_none());
    }

    #[test]
    fn list_for_batch_returns_only_that_batchs_activities() {
        let db = Database::open_in_memory().unwrap();
        seed(db.conn());
        prompt_batches::upsert(db.conn(), &PromptBatch::new("b2", "s1", 2, "second prompt", SourceType::User, "m1")).unwrap();

        let mut in_b1 = Activity::new("a1", "s1", "Edit", "m1");
        in_b1.prompt_batch_id = Some("b1".to_string());
        insert(db.conn(), &in_b1).unwrap();

        let mut in_b2 = Activity::new("a2", "s1", "Edit", "m1");
        in_b2.prompt_batch_id = Some("b2".to_string());
        insert(db.conn(), &in_b2).unwrap();

        let for_b1 = list_for_batch(db.conn(), "b1").unwrap();
        assert_eq!(for_b1.len(), 1);
        assert_eq!(for_b1[0].id, "a1");
    }

    #[test]
    fn list_unprocessed_respects_machine_scope() {
        let db = Database::open_in_memory().unwrap();
        seed(db.conn());
        insert(db.conn(), &Activity::new("a1", "s1", "Edit", "local")).unwrap();
        insert(db.conn(), &Activity::new("a2", "s1", "Edit", "remote")).unwrap();
        let local = list_unprocessed_for_machine(db.conn(), "local").unwrap();
        assert_eq!(local.len(), 1);
        assert_eq!(local[0].id, "a1");
    }
}
