use rusqlite::Connection;
use rusqlite::types::ValueRef;

use crate::schema::SCHEMA_VERSION;
use crate::Result;

/// Tables replayed between machines. Order matters: children must follow
/// the parents their foreign keys point at.
const EXPORTABLE_TABLES: &[&str] = &[
    "sessions",
    "prompt_batches",
    "activities",
    "memory_observations",
    "resolution_events",
    "session_relationships",
];

/// Serializes every row this machine owns into a self-describing SQL
/// script: a `-- oak-backup` header carrying the schema version, followed
/// by one `INSERT OR REPLACE` per row. Import is just replaying the
/// statements against another machine's database.
pub fn export(conn: &Connection, machine_id: &str) -> Result<String> {
    let mut out = String::new();
    out.push_str(&format!("-- oak-backup schema_version={SCHEMA_VERSION} machine={machine_id}\n"));

    for table in EXPORTABLE_TABLES {
        let scope_column = if *table == "session_relationships" { None } else { Some("source_machine_id") };
        let sql = match scope_column {
            Some(col) => format!("SELECT * FROM {table} WHERE {col} = ?1"),
            None => format!(
                "SELECT r.* FROM {table} r JOIN sessions s ON s.id = r.session_a_id WHERE s.source_machine_id = ?1"
            ),
        };
        let mut stmt = conn.prepare(&sql)?;
        let column_names: Vec<String> = stmt.column_names().iter().map(|s| s.to_string()).collect();
        let mut rows = stmt.query([machine_id])?;
        while let Some(row) = rows.next()? {
            let mut values = Vec::with_capacity(column_names.len());
            for idx in 0..column_names.len() {
                values.push(sql_literal(row.get_ref(idx)?));
            }
            out.push_str(&format!(
                "INSERT OR REPLACE INTO {table} ({}) VALUES ({});\n",
                column_names.join(", "),
                values.join(", ")
            ));
        }
    }
    Ok(out)
}

/// Replays a backup script. Statements are `INSERT OR REPLACE`, so
/// re-importing the same backup twice is a no-op beyond the second write.
pub fn import(conn: &Connection, script: &str) -> Result<()> {
    conn.execute_batch(script)?;
    Ok(())
}

fn sql_literal(value: ValueRef) -> String {
    match value {
        ValueRef::Null => "NULL".to_string(),
        ValueRef::Integer(i) => i.to_string(),
        ValueRef::Real(f) => f.to_string(),
        ValueRef::Text(t) => format!("'{}'", String::from_utf8_lossy(t).replace('\'', "''")),
        ValueRef::Blob(b) => format!("X'{}'", b.iter().map(|byte| format!("{byte:02x}")).collect::<String>()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Database;
    use crate::queries::sessions;
    use oak_types::Session;

    #[test]
    fn export_then_import_round_trips_into_fresh_database() {
        let source = Database::open_in_memory().unwrap();
        sessions::upsert(source.conn(), &Session::new("s1", "claude-code", "/repo", "laptop")).unwrap();
        let script = export(source.conn(), "laptop").unwrap();
        assert!(script.contains("INSERT OR REPLACE INTO sessions"));

        let target = Database::open_in_memory().unwrap();
        import(target.conn(), &script).unwrap();
        let fetched = sessions::get(target.conn(), "s1").unwrap().unwrap();
        assert_eq!(fetched.project_root, "/repo");
    }

    #[test]
    fn export_excludes_other_machines() {
        let db = Database::open_in_memory().unwrap();
        sessions::upsert(db.conn(), &Session::new("s1", "claude-code", "/repo", "laptop")).unwrap();
        sessions::upsert(db.conn(), &Session::new("s2", "claude-code", "/repo", "desktop")).unwrap();
        let script = export(db.conn(), "laptop").unwrap();
        assert!(script.contains("'s1'"));
        assert!(!script.contains("'s2'"));
    }

    #[test]
    fn reimporting_the_same_backup_is_idempotent() {
        let source = Database::open_in_memory().unwrap();
        sessions::upsert(source.conn(), &Session::new("s1", "claude-code", "/repo", "laptop")).unwrap();
        let script = export(source.conn(), "laptop").unwrap();

        let target = Database::open_in_memory().unwrap();
        import(target.conn(), &script).unwrap();
        import(target.conn(), &script).unwrap();
        assert!(sessions::get(target.conn(), "s1").unwrap().is_some());
    }
}
