use std::path::Path;

use rusqlite::Connection;

use crate::{Result, schema};

/// A handle on the relational store: one SQLite file per workspace,
/// opened in WAL mode so a background reader (e.g. the retrieval engine)
/// never blocks on an in-flight writer.
pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", true)?;
        schema::init_schema(&conn)?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", true)?;
        schema::init_schema(&conn)?;
        Ok(Self { conn })
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    pub fn conn_mut(&mut self) -> &mut Connection {
        &mut self.conn
    }

    /// Unwraps into the underlying connection, e.g. to hand it to a
    /// caller that manages its own connection pool or mutex.
    pub fn into_conn(self) -> Connection {
        self.conn
    }

    pub fn schema_version(&self) -> Result<i32> {
        Ok(self.conn.query_row("PRAGMA user_version", [], |row| row.get(0))?)
    }

    /// Re-runs schema initialization against the current connection. A
    /// stale `user_version` drops and recreates the schema (see
    /// `schema::init_schema`); a current one is a no-op.
    pub fn run_migrations(&self) -> Result<()> {
        schema::init_schema(&self.conn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_in_memory_initializes_schema() {
        let db = Database::open_in_memory().unwrap();
        assert_eq!(db.schema_version().unwrap(), schema::SCHEMA_VERSION);
    }

    #[test]
    fn open_on_disk_persists_schema_version() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("oak.sqlite3");
        {
            let db = Database::open(&path).unwrap();
            assert_eq!(db.schema_version().unwrap(), schema::SCHEMA_VERSION);
        }
        let db = Database::open(&path).unwrap();
        assert_eq!(db.schema_version().unwrap(), schema::SCHEMA_VERSION);
    }
}
