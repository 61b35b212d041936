use rusqlite::Connection;
use serde::Serialize;

use crate::Result;

/// Row counts across the relational store, the raw material behind the
/// `stats` tool-call surface.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RelationalCounts {
    pub sessions: i64,
    pub active_observations: i64,
    pub resolved_observations: i64,
    pub superseded_observations: i64,
    pub activities: i64,
    pub prompt_batches: i64,
}

pub fn counts(conn: &Connection) -> Result<RelationalCounts> {
    Ok(RelationalCounts {
        sessions: count(conn, "SELECT COUNT(*) FROM sessions")?,
        active_observations: count(conn, "SELECT COUNT(*) FROM memory_observations WHERE status = 'active'")?,
        resolved_observations: count(conn, "SELECT COUNT(*) FROM memory_observations WHERE status = 'resolved'")?,
        superseded_observations: count(conn, "SELECT COUNT(*) FROM memory_observations WHERE status = 'superseded'")?,
        activities: count(conn, "SELECT COUNT(*) FROM activities")?,
        prompt_batches: count(conn, "SELECT COUNT(*) FROM prompt_batches")?,
    })
}

fn count(conn: &Connection, sql: &str) -> Result<i64> {
    Ok(conn.query_row(sql, [], |row| row.get(0))?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Database;
    use crate::queries::{observations, sessions};
    use oak_types::{MemoryType, Session, StoredObservation};

    #[test]
    fn counts_reflect_seeded_rows() {
        let db = Database::open_in_memory().unwrap();
        sessions::upsert(db.conn(), &Session::new("s1", "claude-code", "/repo", "m1")).unwrap();
        observations::store(db.conn(), &StoredObservation::new("o1", "s1", "a", MemoryType::Discovery, 5, "m1")).unwrap();
        let mut resolved = StoredObservation::new("o2", "s1", "b", MemoryType::Gotcha, 5, "m1");
        resolved.status = oak_types::ObservationStatus::Resolved;
        observations::store(db.conn(), &resolved).unwrap();

        let counts = counts(db.conn()).unwrap();
        assert_eq!(counts.sessions, 1);
        assert_eq!(counts.active_observations, 1);
        assert_eq!(counts.resolved_observations, 1);
    }
}
