use oak_types::{ResolutionAction, ResolutionEvent};
use rusqlite::{Connection, OptionalExtension, Row, params};

use crate::queries::observations;
use crate::{Error, Result};

/// Records the event and, if the observation still exists locally, applies
/// it immediately. A duplicate `(source_machine_id, content_hash)` is
/// silently ignored: that's the point of the dedup key, not an error.
pub fn record_and_apply(conn: &Connection, event: &ResolutionEvent) -> Result<bool> {
    let inserted = conn.execute(
        r#"
        INSERT OR IGNORE INTO resolution_events (
            id, observation_id, action, source_machine_id, resolved_by_session_id,
            superseded_by, applied, content_hash, created_at_epoch
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, strftime('%s','now'))
        "#,
        params![
            event.id,
            event.observation_id,
            event.action.as_str(),
            event.source_machine_id,
            event.resolved_by_session_id,
            event.superseded_by,
            event.applied,
            event.content_hash,
        ],
    )?;

    if inserted == 0 {
        return Ok(false);
    }

    let applied = apply(conn, event)?;
    if applied {
        conn.execute(
            "UPDATE resolution_events SET applied = 1 WHERE content_hash = ?1",
            [&event.content_hash],
        )?;
    }
    Ok(applied)
}

fn apply(conn: &Connection, event: &ResolutionEvent) -> Result<bool> {
    if observations::get(conn, &event.observation_id)?.is_none() {
        return Ok(false);
    }
    match event.action {
        ResolutionAction::Resolved => {
            let by = event.resolved_by_session_id.as_deref().unwrap_or(&event.source_machine_id);
            observations::resolve(conn, &event.observation_id, by)?;
        }
        ResolutionAction::Superseded => {
            let by = event.superseded_by.as_deref().unwrap_or_default();
            observations::supersede(conn, &event.observation_id, by)?;
        }
        ResolutionAction::Reactivated => {
            observations::reactivate(conn, &event.observation_id)?;
        }
    }
    Ok(true)
}

pub fn get_by_hash(conn: &Connection, content_hash: &str) -> Result<Option<ResolutionEvent>> {
    conn.query_row(
        "SELECT * FROM resolution_events WHERE content_hash = ?1",
        [content_hash],
        row_to_event,
    )
    .optional()
    .map_err(Error::from)
}

pub fn unapplied(conn: &Connection) -> Result<Vec<ResolutionEvent>> {
    let mut stmt = conn.prepare("SELECT * FROM resolution_events WHERE applied = 0 ORDER BY created_at_epoch ASC")?;
    let rows = stmt.query_map([], row_to_event)?;
    rows.collect::<std::result::Result<Vec<_>, _>>().map_err(Error::from)
}

/// Retries every unapplied event whose observation has since arrived
/// (e.g. imported from a team backup after the resolution event that
/// references it). Returns how many were newly applied.
pub fn replay_unapplied_events(conn: &Connection) -> Result<usize> {
    let mut replayed = 0;
    for event in unapplied(conn)? {
        if apply(conn, &event)? {
            conn.execute("UPDATE resolution_events SET applied = 1 WHERE content_hash = ?1", [&event.content_hash])?;
            replayed += 1;
        }
    }
    Ok(replayed)
}

fn row_to_event(row: &Row) -> rusqlite::Result<ResolutionEvent> {
    let action: String = row.get("action")?;
    Ok(ResolutionEvent {
        id: row.get("id")?,
        observation_id: row.get("observation_id")?,
        action: ResolutionAction::parse(&action).unwrap_or(ResolutionAction::Resolved),
        source_machine_id: row.get("source_machine_id")?,
        resolved_by_session_id: row.get("resolved_by_session_id")?,
        superseded_by: row.get("superseded_by")?,
        applied: row.get("applied")?,
        content_hash: row.get("content_hash")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Database;
    use crate::queries::{observations, sessions};
    use oak_types::{MemoryType, Session, StoredObservation};

    fn seed(conn: &Connection) {
        sessions::upsert(conn, &Session::new("s1", "claude-code", "/repo", "m1")).unwrap();
        observations::store(conn, &StoredObservation::new("o1", "s1", "text", MemoryType::Gotcha, 5, "m1")).unwrap();
    }

    #[test]
    fn applies_resolution_against_existing_observation() {
        let db = Database::open_in_memory().unwrap();
        seed(db.conn());
        let event = ResolutionEvent::new("r1", "o1", ResolutionAction::Resolved, "m1");
        let applied = record_and_apply(db.conn(), &event).unwrap();
        assert!(applied);
        let obs = observations::get(db.conn(), "o1").unwrap().unwrap();
        assert_eq!(obs.status.as_str(), "resolved");
    }

    #[test]
    fn duplicate_event_is_ignored() {
        let db = Database::open_in_memory().unwrap();
        seed(db.conn());
        let event = ResolutionEvent::new("r1", "o1", ResolutionAction::Resolved, "m1");
        record_and_apply(db.conn(), &event).unwrap();
        let duplicate = ResolutionEvent::new("r2", "o1", ResolutionAction::Resolved, "m1");
        let applied_again = record_and_apply(db.conn(), &duplicate).unwrap();
        assert!(!applied_again);
    }

    #[test]
    fn event_for_missing_observation_is_recorded_but_not_applied() {
        let db = Database::open_in_memory().unwrap();
        seed(db.conn());
        let event = ResolutionEvent::new("r1", "missing-obs", ResolutionAction::Resolved, "m1");
        let applied = record_and_apply(db.conn(), &event).unwrap();
        assert!(!applied);
        let stored = get_by_hash(db.conn(), &event.content_hash).unwrap().unwrap();
        assert!(!stored.applied);
    }

    #[test]
    fn replay_applies_events_once_their_observation_arrives() {
        let db = Database::open_in_memory().unwrap();
        sessions::upsert(db.conn(), &Session::new("s1", "claude-code", "/repo", "m1")).unwrap();

        let event = ResolutionEvent::new("r1", "o-later", ResolutionAction::Resolved, "m1");
        let applied = record_and_apply(db.conn(), &event).unwrap();
        assert!(!applied);

        observations::store(db.conn(), &StoredObservation::new("o-later", "s1", "text", MemoryType::Gotcha, 5, "m1")).unwrap();

        let replayed = replay_unapplied_events(db.conn()).unwrap();
        assert_eq!(replayed, 1);
        let obs = observations::get(db.conn(), "o-later").unwrap().unwrap();
        assert_eq!(obs.status.as_str(), "resolved");
        assert!(unapplied(db.conn()).unwrap().is_empty());
    }
}
