use rusqlite::Connection;

use crate::Result;

/// Schema version for migrations.
/// v1: sessions, prompt_batches, activities, memory_observations, FTS5 + triggers
/// v2: agent_runs
/// v3: session_link_events, session_relationships
/// v4: agent_schedules
/// v5: resolution_events for cross-machine propagation
pub const SCHEMA_VERSION: i32 = 5;

// NOTE: Schema Design Rationale
//
// Why schema-on-write with a monotonic version, not schema-on-read?
// - Every row is user-visible (search, retrieval, backups); shape stability
//   matters more than migration flexibility.
// - A version mismatch drops and recreates rather than ALTERing in place:
//   this store is a derived cache of the agent's own activity history, so
//   losing it just means the next session repopulates it.
//
// Why content_hash + source_machine_id on every exportable row?
// - Backups are merged across machines by replaying INSERTs; content_hash
//   is the dedup key, source_machine_id scopes what a given backup exports.
pub fn init_schema(conn: &Connection) -> Result<()> {
    let current_version: i32 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;

    if current_version != 0 && current_version != SCHEMA_VERSION {
        drop_all_tables(conn)?;
    }

    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS sessions (
            id TEXT PRIMARY KEY,
            agent TEXT NOT NULL,
            project_root TEXT NOT NULL,
            started_at TEXT NOT NULL,
            started_at_epoch INTEGER NOT NULL,
            ended_at TEXT,
            ended_at_epoch INTEGER,
            status TEXT NOT NULL DEFAULT 'active',
            prompt_count INTEGER NOT NULL DEFAULT 0,
            tool_count INTEGER NOT NULL DEFAULT 0,
            processed BOOLEAN NOT NULL DEFAULT 0,
            summary TEXT,
            title TEXT,
            manually_edited_title BOOLEAN NOT NULL DEFAULT 0,
            parent_session_id TEXT,
            parent_session_reason TEXT,
            suggested_parent_dismissed BOOLEAN NOT NULL DEFAULT 0,
            transcript_path TEXT,
            source_machine_id TEXT NOT NULL,
            content_hash TEXT
        );

        CREATE TABLE IF NOT EXISTS prompt_batches (
            id TEXT PRIMARY KEY,
            session_id TEXT NOT NULL,
            prompt_number INTEGER NOT NULL,
            user_prompt TEXT,
            started_at TEXT NOT NULL,
            started_at_epoch INTEGER NOT NULL,
            ended_at TEXT,
            ended_at_epoch INTEGER,
            status TEXT NOT NULL DEFAULT 'active',
            activity_count INTEGER NOT NULL DEFAULT 0,
            processed BOOLEAN NOT NULL DEFAULT 0,
            classification TEXT,
            source_type TEXT NOT NULL DEFAULT 'user',
            plan_file_path TEXT,
            plan_content TEXT,
            plan_embedded BOOLEAN NOT NULL DEFAULT 0,
            source_plan_batch_id TEXT,
            response_summary TEXT,
            source_machine_id TEXT NOT NULL,
            content_hash TEXT,
            FOREIGN KEY (session_id) REFERENCES sessions(id),
            FOREIGN KEY (source_plan_batch_id) REFERENCES prompt_batches(id)
        );

        CREATE TABLE IF NOT EXISTS activities (
            id TEXT PRIMARY KEY,
            session_id TEXT NOT NULL,
            prompt_batch_id TEXT,
            tool_name TEXT NOT NULL,
            tool_input TEXT,
            tool_output_summary TEXT,
            file_path TEXT,
            files_affected TEXT,
            duration_ms INTEGER,
            success BOOLEAN NOT NULL DEFAULT 1,
            error_message TEXT,
            timestamp TEXT NOT NULL,
            timestamp_epoch INTEGER NOT NULL,
            processed BOOLEAN NOT NULL DEFAULT 0,
            observation_id TEXT,
            source_machine_id TEXT NOT NULL,
            content_hash TEXT,
            FOREIGN KEY (session_id) REFERENCES sessions(id),
            FOREIGN KEY (prompt_batch_id) REFERENCES prompt_batches(id)
        );

        CREATE TABLE IF NOT EXISTS memory_observations (
            id TEXT PRIMARY KEY,
            session_id TEXT NOT NULL,
            prompt_batch_id TEXT,
            observation TEXT NOT NULL,
            memory_type TEXT NOT NULL,
            context TEXT,
            tags TEXT,
            importance INTEGER NOT NULL DEFAULT 5,
            file_path TEXT,
            created_at TEXT NOT NULL,
            created_at_epoch INTEGER NOT NULL,
            embedded BOOLEAN NOT NULL DEFAULT 0,
            status TEXT NOT NULL DEFAULT 'active',
            resolved_by_session_id TEXT,
            resolved_at TEXT,
            resolved_at_epoch INTEGER,
            superseded_by TEXT,
            session_origin_type TEXT NOT NULL DEFAULT 'local',
            source_machine_id TEXT NOT NULL,
            content_hash TEXT,
            FOREIGN KEY (session_id) REFERENCES sessions(id),
            FOREIGN KEY (prompt_batch_id) REFERENCES prompt_batches(id)
        );

        CREATE TABLE IF NOT EXISTS resolution_events (
            id TEXT PRIMARY KEY,
            observation_id TEXT NOT NULL,
            action TEXT NOT NULL,
            source_machine_id TEXT NOT NULL,
            resolved_by_session_id TEXT,
            superseded_by TEXT,
            applied BOOLEAN NOT NULL DEFAULT 0,
            content_hash TEXT NOT NULL,
            created_at_epoch INTEGER NOT NULL,
            UNIQUE(source_machine_id, content_hash)
        );

        CREATE TABLE IF NOT EXISTS agent_runs (
            id TEXT PRIMARY KEY,
            agent_name TEXT NOT NULL,
            task TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending',
            created_at_epoch INTEGER NOT NULL,
            started_at TEXT,
            started_at_epoch INTEGER,
            completed_at TEXT,
            completed_at_epoch INTEGER,
            result TEXT,
            error TEXT,
            turns_used INTEGER DEFAULT 0,
            cost_usd REAL,
            files_created TEXT,
            files_modified TEXT,
            files_deleted TEXT,
            project_config TEXT,
            system_prompt_hash TEXT,
            source_machine_id TEXT
        );

        CREATE TABLE IF NOT EXISTS session_link_events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            session_id TEXT NOT NULL,
            event_type TEXT NOT NULL,
            old_parent_id TEXT,
            new_parent_id TEXT,
            suggested_parent_id TEXT,
            suggestion_confidence REAL,
            link_reason TEXT,
            created_at TEXT NOT NULL,
            created_at_epoch INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS session_relationships (
            id TEXT PRIMARY KEY,
            session_a_id TEXT NOT NULL,
            session_b_id TEXT NOT NULL,
            relationship_type TEXT NOT NULL,
            similarity_score REAL,
            created_at TEXT NOT NULL,
            created_at_epoch INTEGER NOT NULL,
            created_by TEXT NOT NULL,
            FOREIGN KEY (session_a_id) REFERENCES sessions(id),
            FOREIGN KEY (session_b_id) REFERENCES sessions(id),
            UNIQUE(session_a_id, session_b_id)
        );

        CREATE TABLE IF NOT EXISTS agent_schedules (
            instance_name TEXT PRIMARY KEY,
            agent_name TEXT NOT NULL,
            cron_expression TEXT NOT NULL,
            enabled INTEGER NOT NULL DEFAULT 1,
            last_run_at TEXT,
            last_run_at_epoch INTEGER,
            last_run_id TEXT,
            next_run_at TEXT,
            next_run_at_epoch INTEGER,
            created_at TEXT NOT NULL,
            created_at_epoch INTEGER NOT NULL,
            updated_at TEXT NOT NULL,
            updated_at_epoch INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_sessions_status ON sessions(status);
        CREATE INDEX IF NOT EXISTS idx_sessions_processed ON sessions(processed);
        CREATE INDEX IF NOT EXISTS idx_sessions_created_at ON sessions(started_at_epoch DESC);
        CREATE INDEX IF NOT EXISTS idx_sessions_source_machine ON sessions(source_machine_id);
        CREATE INDEX IF NOT EXISTS idx_sessions_parent ON sessions(parent_session_id);

        CREATE INDEX IF NOT EXISTS idx_prompt_batches_session ON prompt_batches(session_id);
        CREATE INDEX IF NOT EXISTS idx_prompt_batches_processed ON prompt_batches(processed);
        CREATE INDEX IF NOT EXISTS idx_prompt_batches_hash ON prompt_batches(content_hash);
        CREATE INDEX IF NOT EXISTS idx_prompt_batches_source_machine ON prompt_batches(source_machine_id);

        CREATE INDEX IF NOT EXISTS idx_activities_session ON activities(session_id);
        CREATE INDEX IF NOT EXISTS idx_activities_prompt_batch ON activities(prompt_batch_id);
        CREATE INDEX IF NOT EXISTS idx_activities_tool ON activities(tool_name);
        CREATE INDEX IF NOT EXISTS idx_activities_processed ON activities(processed);
        CREATE INDEX IF NOT EXISTS idx_activities_timestamp ON activities(timestamp_epoch);
        CREATE INDEX IF NOT EXISTS idx_activities_hash ON activities(content_hash);
        CREATE INDEX IF NOT EXISTS idx_activities_source_machine ON activities(source_machine_id);

        CREATE INDEX IF NOT EXISTS idx_memory_observations_embedded ON memory_observations(embedded);
        CREATE INDEX IF NOT EXISTS idx_memory_observations_session ON memory_observations(session_id);
        CREATE INDEX IF NOT EXISTS idx_memory_observations_hash ON memory_observations(content_hash);
        CREATE INDEX IF NOT EXISTS idx_memory_observations_type ON memory_observations(memory_type);
        CREATE INDEX IF NOT EXISTS idx_memory_observations_status ON memory_observations(status);
        CREATE INDEX IF NOT EXISTS idx_memory_observations_created ON memory_observations(created_at_epoch DESC);
        CREATE INDEX IF NOT EXISTS idx_memory_observations_source_machine ON memory_observations(source_machine_id);

        CREATE INDEX IF NOT EXISTS idx_resolution_events_observation ON resolution_events(observation_id);
        CREATE INDEX IF NOT EXISTS idx_resolution_events_applied ON resolution_events(applied);

        CREATE INDEX IF NOT EXISTS idx_agent_runs_agent ON agent_runs(agent_name);
        CREATE INDEX IF NOT EXISTS idx_agent_runs_status ON agent_runs(status);
        CREATE INDEX IF NOT EXISTS idx_agent_runs_created ON agent_runs(created_at_epoch DESC);

        CREATE INDEX IF NOT EXISTS idx_session_link_events_session ON session_link_events(session_id);
        CREATE INDEX IF NOT EXISTS idx_session_relationships_a ON session_relationships(session_a_id);
        CREATE INDEX IF NOT EXISTS idx_session_relationships_b ON session_relationships(session_b_id);
        CREATE INDEX IF NOT EXISTS idx_agent_schedules_enabled_next ON agent_schedules(enabled, next_run_at_epoch);

        CREATE VIRTUAL TABLE IF NOT EXISTS memories_fts USING fts5(
            observation,
            context,
            content='memory_observations',
            content_rowid='rowid'
        );

        CREATE TRIGGER IF NOT EXISTS memories_fts_insert AFTER INSERT ON memory_observations BEGIN
            INSERT INTO memories_fts(rowid, observation, context) VALUES (NEW.rowid, NEW.observation, NEW.context);
        END;

        CREATE TRIGGER IF NOT EXISTS memories_fts_delete AFTER DELETE ON memory_observations BEGIN
            INSERT INTO memories_fts(memories_fts, rowid, observation, context) VALUES ('delete', OLD.rowid, OLD.observation, OLD.context);
        END;

        CREATE TRIGGER IF NOT EXISTS memories_fts_update AFTER UPDATE ON memory_observations BEGIN
            INSERT INTO memories_fts(memories_fts, rowid, observation, context) VALUES ('delete', OLD.rowid, OLD.observation, OLD.context);
            INSERT INTO memories_fts(rowid, observation, context) VALUES (NEW.rowid, NEW.observation, NEW.context);
        END;

        CREATE VIRTUAL TABLE IF NOT EXISTS activities_fts USING fts5(
            tool_name,
            tool_input,
            tool_output_summary,
            file_path,
            error_message,
            content='activities',
            content_rowid='rowid'
        );

        CREATE TRIGGER IF NOT EXISTS activities_fts_insert AFTER INSERT ON activities BEGIN
            INSERT INTO activities_fts(rowid, tool_name, tool_input, tool_output_summary, file_path, error_message)
            VALUES (NEW.rowid, NEW.tool_name, NEW.tool_input, NEW.tool_output_summary, NEW.file_path, NEW.error_message);
        END;

        CREATE TRIGGER IF NOT EXISTS activities_fts_delete AFTER DELETE ON activities BEGIN
            INSERT INTO activities_fts(activities_fts, rowid, tool_name, tool_input, tool_output_summary, file_path, error_message)
            VALUES ('delete', OLD.rowid, OLD.tool_name, OLD.tool_input, OLD.tool_output_summary, OLD.file_path, OLD.error_message);
        END;

        CREATE TRIGGER IF NOT EXISTS activities_fts_update AFTER UPDATE ON activities BEGIN
            INSERT INTO activities_fts(activities_fts, rowid, tool_name, tool_input, tool_output_summary, file_path, error_message)
            VALUES ('delete', OLD.rowid, OLD.tool_name, OLD.tool_input, OLD.tool_output_summary, OLD.file_path, OLD.error_message);
            INSERT INTO activities_fts(rowid, tool_name, tool_input, tool_output_summary, file_path, error_message)
            VALUES (NEW.rowid, NEW.tool_name, NEW.tool_input, NEW.tool_output_summary, NEW.file_path, NEW.error_message);
        END;
        "#,
    )?;

    conn.execute(&format!("PRAGMA user_version = {SCHEMA_VERSION}"), [])?;

    Ok(())
}

fn drop_all_tables(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        DROP TABLE IF EXISTS activities_fts;
        DROP TABLE IF EXISTS memories_fts;
        DROP TABLE IF EXISTS agent_schedules;
        DROP TABLE IF EXISTS session_relationships;
        DROP TABLE IF EXISTS session_link_events;
        DROP TABLE IF EXISTS agent_runs;
        DROP TABLE IF EXISTS resolution_events;
        DROP TABLE IF EXISTS memory_observations;
        DROP TABLE IF EXISTS activities;
        DROP TABLE IF EXISTS prompt_batches;
        DROP TABLE IF EXISTS sessions;
        "#,
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_schema_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        init_schema(&conn).unwrap();
        let version: i32 = conn.query_row("PRAGMA user_version", [], |row| row.get(0)).unwrap();
        assert_eq!(version, SCHEMA_VERSION);
    }

    #[test]
    fn stale_version_drops_and_recreates() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        conn.execute("PRAGMA user_version = 1", []).unwrap();
        init_schema(&conn).unwrap();
        let version: i32 = conn.query_row("PRAGMA user_version", [], |row| row.get(0)).unwrap();
        assert_eq!(version, SCHEMA_VERSION);
    }
}
