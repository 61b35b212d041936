use oak_types::{SessionLinkEvent, SessionLinkEventType, Timestamp};
use rusqlite::{Connection, Row, params};

use crate::{Error, Result};

/// Appends an analytics row; the table is autoincrementing and nothing
/// reads it back into a decision, so this is insert-only.
pub fn record(conn: &Connection, event: &SessionLinkEvent) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO session_link_events (
            session_id, event_type, old_parent_id, new_parent_id,
            suggested_parent_id, suggestion_confidence, link_reason,
            created_at, created_at_epoch
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
        "#,
        params![
            event.session_id,
            event.event_type.as_str(),
            event.old_parent_id,
            event.new_parent_id,
            event.suggested_parent_id,
            event.suggestion_confidence,
            event.link_reason,
            event.created_at.to_iso(),
            event.created_at.epoch(),
        ],
    )?;
    Ok(())
}

pub fn list_for_session(conn: &Connection, session_id: &str) -> Result<Vec<SessionLinkEvent>> {
    let mut stmt = conn.prepare(
        "SELECT * FROM session_link_events WHERE session_id = ?1 ORDER BY created_at_epoch DESC",
    )?;
    let rows = stmt.query_map([session_id], row_to_event)?;
    rows.collect::<std::result::Result<Vec<_>, _>>().map_err(Error::from)
}

fn row_to_event(row: &Row) -> rusqlite::Result<SessionLinkEvent> {
    let created_epoch: i64 = row.get("created_at_epoch")?;
    let event_type: String = row.get("event_type")?;
    Ok(SessionLinkEvent {
        id: row.get("id")?,
        session_id: row.get("session_id")?,
        event_type: SessionLinkEventType::parse(&event_type).unwrap_or(SessionLinkEventType::AutoLinked),
        old_parent_id: row.get("old_parent_id")?,
        new_parent_id: row.get("new_parent_id")?,
        suggested_parent_id: row.get("suggested_parent_id")?,
        suggestion_confidence: row.get("suggestion_confidence")?,
        link_reason: row.get("link_reason")?,
        created_at: Timestamp::from_epoch(created_epoch),
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
    fn record_then_list_round_trips() {
        let db = Database::open_in_memory().unwrap();
        seed(db.conn());
        let mut event = SessionLinkEvent::new("s1", SessionLinkEventType::ManualLinked);
        event.new_parent_id = Some("s0".to_string());
        event.link_reason = Some("explicit".to_string());
        record(db.conn(), &event).unwrap();

        let events = list_for_session(db.conn(), "s1").unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, SessionLinkEventType::ManualLinked);
        assert_eq!(events[0].new_parent_id.as_deref(), Some("s0"));
    }

    #[test]
    fn list_is_scoped_to_session() {
        let db = Database::open_in_memory().unwrap();
        seed(db.conn());
        sessions::upsert(db.conn(), &Session::new("s2", "claude-code", "/repo", "m1")).unwrap();
        record(db.conn(), &SessionLinkEvent::new("s1", SessionLinkEventType::AutoLinked)).unwrap();
        record(db.conn(), &SessionLinkEvent::new("s2", SessionLinkEventType::AutoLinked)).unwrap();

        assert_eq!(list_for_session(db.conn(), "s1").unwrap().len(), 1);
    }
}
