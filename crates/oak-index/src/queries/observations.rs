use oak_types::{MemoryType, ObservationStatus, SessionOriginType, StoredObservation, Timestamp};
use rusqlite::{Connection, OptionalExtension, Row, params};

use crate::{Error, Result};

pub fn store(conn: &Connection, observation: &StoredObservation) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO memory_observations (
            id, session_id, prompt_batch_id, observation, memory_type, context, tags,
            importance, file_path, created_at, created_at_epoch, embedded, status,
            resolved_by_session_id, resolved_at, resolved_at_epoch, superseded_by,
            session_origin_type, source_machine_id, content_hash
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20)
        ON CONFLICT(id) DO UPDATE SET
            observation = ?4,
            context = ?6,
            tags = ?7,
            importance = ?8,
            embedded = ?12,
            status = ?13,
            resolved_by_session_id = ?14,
            resolved_at = ?15,
            resolved_at_epoch = ?16,
            superseded_by = ?17,
            content_hash = ?20
        "#,
        params![
            observation.id,
            observation.session_id,
            observation.prompt_batch_id,
            observation.observation,
            observation.memory_type.as_str(),
            observation.context,
            observation.tags_csv(),
            observation.importance,
            observation.file_path,
            observation.created_at.to_iso(),
            observation.created_at.epoch(),
            observation.embedded,
            observation.status.as_str(),
            observation.resolved_by_session_id,
            observation.resolved_at.map(|t| t.to_iso()),
            observation.resolved_at.map(|t| t.epoch()),
            observation.superseded_by,
            observation.session_origin_type.as_str(),
            observation.source_machine_id,
            observation.content_hash,
        ],
    )?;
    Ok(())
}

pub fn get(conn: &Connection, id: &str) -> Result<Option<StoredObservation>> {
    conn.query_row("SELECT * FROM memory_observations WHERE id = ?1", [id], row_to_observation)
        .optional()
        .map_err(Error::from)
}

pub fn latest_session_summary(conn: &Connection, session_id: &str) -> Result<Option<StoredObservation>> {
    conn.query_row(
        "SELECT * FROM memory_observations WHERE session_id = ?1 AND memory_type = 'session_summary'
         ORDER BY created_at_epoch DESC LIMIT 1",
        [session_id],
        row_to_observation,
    )
    .optional()
    .map_err(Error::from)
}

pub fn unembedded(conn: &Connection, limit: usize) -> Result<Vec<StoredObservation>> {
    let mut stmt = conn.prepare(
        "SELECT * FROM memory_observations WHERE embedded = 0 ORDER BY created_at_epoch ASC LIMIT ?1",
    )?;
    let rows = stmt.query_map([limit as i64], row_to_observation)?;
    rows.collect::<std::result::Result<Vec<_>, _>>().map_err(Error::from)
}

pub fn mark_embedded(conn: &Connection, ids: &[String]) -> Result<()> {
    for id in ids {
        conn.execute("UPDATE memory_observations SET embedded = 1 WHERE id = ?1", [id])?;
    }
    Ok(())
}

pub fn resolve(conn: &Connection, id: &str, resolved_by_session_id: &str) -> Result<()> {
    let now = Timestamp::now();
    conn.execute(
        "UPDATE memory_observations SET status = 'resolved', resolved_by_session_id = ?2,
         resolved_at = ?3, resolved_at_epoch = ?4 WHERE id = ?1",
        params![id, resolved_by_session_id, now.to_iso(), now.epoch()],
    )?;
    Ok(())
}

pub fn supersede(conn: &Connection, id: &str, superseded_by: &str) -> Result<()> {
    conn.execute(
        "UPDATE memory_observations SET status = 'superseded', superseded_by = ?2 WHERE id = ?1",
        params![id, superseded_by],
    )?;
    Ok(())
}

pub fn reactivate(conn: &Connection, id: &str) -> Result<()> {
    conn.execute(
        "UPDATE memory_observations SET status = 'active', resolved_by_session_id = NULL,
         resolved_at = NULL, resolved_at_epoch = NULL, superseded_by = NULL WHERE id = ?1",
        [id],
    )?;
    Ok(())
}

pub fn search(conn: &Connection, query: &str, limit: usize) -> Result<Vec<StoredObservation>> {
    let mut stmt = conn.prepare(
        r#"
        SELECT m.* FROM memory_observations m
        JOIN memories_fts f ON m.rowid = f.rowid
        WHERE memories_fts MATCH ?1 AND m.status = 'active'
        ORDER BY m.created_at_epoch DESC
        LIMIT ?2
        "#,
    )?;
    let rows = stmt.query_map(params![query, limit as i64], row_to_observation)?;
    rows.collect::<std::result::Result<Vec<_>, _>>().map_err(Error::from)
}

/// Browses observations by type/status, newest first - the backing query
/// for the `memories` tool-call. `include_resolved` widens `status` to
/// also admit `resolved`/`superseded` rows alongside whatever `status`
/// itself was asked for.
pub fn list_filtered(conn: &Connection, memory_type: Option<&str>, status: Option<&str>, include_resolved: bool, limit: usize) -> Result<Vec<StoredObservation>> {
    let mut sql = "SELECT * FROM memory_observations WHERE 1 = 1".to_string();
    let mut bound: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

    if let Some(memory_type) = memory_type {
        sql.push_str(" AND memory_type = ?");
        bound.push(Box::new(memory_type.to_string()));
    }
    match (status, include_resolved) {
        (Some(status), _) => {
            sql.push_str(" AND status = ?");
            bound.push(Box::new(status.to_string()));
        }
        (None, false) => sql.push_str(" AND status = 'active'"),
        (None, true) => {}
    }
    sql.push_str(" ORDER BY created_at_epoch DESC LIMIT ?");
    bound.push(Box::new(limit as i64));

    let params: Vec<&dyn rusqlite::ToSql> = bound.iter().map(|b| b.as_ref()).collect();
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params.as_slice(), row_to_observation)?;
    rows.collect::<std::result::Result<Vec<_>, _>>().map_err(Error::from)
}

fn row_to_observation(row: &Row) -> rusqlite::Result<StoredObservation> {
    let created_epoch: i64 = row.get("created_at_epoch")?;
    let resolved_epoch: Option<i64> = row.get("resolved_at_epoch")?;
    let memory_type: String = row.get("memory_type")?;
    let status: String = row.get("status")?;
    let origin: String = row.get("session_origin_type")?;
    let tags: Option<String> = row.get("tags")?;
    Ok(StoredObservation {
        id: row.get("id")?,
        session_id: row.get("session_id")?,
        prompt_batch_id: row.get("prompt_batch_id")?,
        observation: row.get("observation")?,
        memory_type: MemoryType::parse(&memory_type).unwrap_or(MemoryType::Discovery),
        context: row.get("context")?,
        tags: tags.map(|t| StoredObservation::tags_from_csv(&t)).unwrap_or_default(),
        importance: row.get("importance")?,
        file_path: row.get("file_path")?,
        created_at: Timestamp::from_epoch(created_epoch),
        embedded: row.get("embedded")?,
        status: ObservationStatus::parse(&status).unwrap_or(ObservationStatus::Active),
        resolved_by_session_id: row.get("resolved_by_session_id")?,
        resolved_at: resolved_epoch.map(Timestamp::from_epoch),
        superseded_by: row.get("superseded_by")?,
        session_origin_type: SessionOriginType::parse(&origin).unwrap_or(SessionOriginType::Local),
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

    fn seed(conn: &Connection) {
        sessions::upsert(conn, &Session::new("s1", "claude-code", "/repo", "m1")).unwrap();
    }

    #[test]
    fn store_then_get_round_trips() {
        let db = Database::open_in_memory().unwrap();
        seed(db.conn());
        let obs = StoredObservation::new("o1", "s1", "watch out for X", MemoryType::Gotcha, 7, "m1");
        store(db.conn(), &obs).unwrap();
        let fetched = get(db.conn(), "o1").unwrap().unwrap();
        assert_eq!(fetched.observation, "watch out for X");
        assert_eq!(fetched.importance, 7);
    }

    #[test]
    fn resolve_then_reactivate_round_trips() {
        let db = Database::open_in_memory().unwrap();
        seed(db.conn());
        let obs = StoredObservation::new("o1", "s1", "fixed the bug", MemoryType::BugFix, 5, "m1");
        store(db.conn(), &obs).unwrap();
        resolve(db.conn(), "o1", "s1").unwrap();
        let fetched = get(db.conn(), "o1").unwrap().unwrap();
        assert_eq!(fetched.status, ObservationStatus::Resolved);
        assert!(fetched.resolved_at.is_some());

        reactivate(db.conn(), "o1").unwrap();
        let fetched = get(db.conn(), "o1").unwrap().unwrap();
        assert_eq!(fetched.status, ObservationStatus::Active);
        assert!(fetched.resolved_at.is_none());
    }

    #[test]
    fn list_filtered_defaults_to_active_only() {
        let db = Database::open_in_memory().unwrap();
        seed(db.conn());
        store(db.conn(), &StoredObservation::new("o1", "s1", "a", MemoryType::Gotcha, 5, "m1")).unwrap();
        let mut resolved = StoredObservation::new("o2", "s1", "b", MemoryType::Gotcha, 5, "m1");
        resolved.status = ObservationStatus::Resolved;
        store(db.conn(), &resolved).unwrap();

        let active_only = list_filtered(db.conn(), None, None, false, 10).unwrap();
        assert_eq!(active_only.len(), 1);
        assert_eq!(active_only[0].id, "o1");

        let all = list_filtered(db.conn(), None, None, true, 10).unwrap();
        assert_eq!(all.len(), 2);
    }

    #[test]
    fn list_filtered_by_memory_type() {
        let db = Database::open_in_memory().unwrap();
        seed(db.conn());
        store(db.conn(), &StoredObservation::new("o1", "s1", "a", MemoryType::Gotcha, 5, "m1")).unwrap();
        store(db.conn(), &StoredObservation::new("o2", "s1", "b", MemoryType::Discovery, 5, "m1")).unwrap();

        let gotchas = list_filtered(db.conn(), Some("gotcha"), None, false, 10).unwrap();
        assert_eq!(gotchas.len(), 1);
        assert_eq!(gotchas[0].id, "o1");
    }

    #[test]
    fn unembedded_lists_only_pending() {
        let db = Database::open_in_memory().unwrap();
        seed(db.conn());
        let mut a = StoredObservation::new("o1", "s1", "a", MemoryType::Discovery, 5, "m1");
        a.embedded = true;
        let b = StoredObservation::new("o2", "s1", "b", MemoryType::Discovery, 5, "m1");
        store(db.conn(), &a).unwrap();
        store(db.conn(), &b).unwrap();
        let pending = unembedded(db.conn(), 10).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, "o2");
    }
}
