use oak_types::{AgentSchedule, Timestamp};
use rusqlite::{Connection, Row, params};

use crate::{Error, Result};

/// Reconciles the configured set of schedules against what's stored:
/// unseen instance names are created, known ones have their cron
/// expression/agent name refreshed, and ones no longer present are
/// removed. `enabled` is never touched here — that's a user override
/// through the API, not something a config reload should clobber.
pub fn sync_schedules(conn: &Connection, desired: &[AgentSchedule]) -> Result<()> {
    let existing: Vec<String> = {
        let mut stmt = conn.prepare("SELECT instance_name FROM agent_schedules")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        rows.collect::<std::result::Result<Vec<_>, _>>()?
    };

    let desired_names: Vec<&str> = desired.iter().map(|s| s.instance_name.as_str()).collect();
    for name in &existing {
        if !desired_names.contains(&name.as_str()) {
            conn.execute("DELETE FROM agent_schedules WHERE instance_name = ?1", [name])?;
        }
    }

    for schedule in desired {
        upsert_definition(conn, schedule)?;
    }
    Ok(())
}

fn upsert_definition(conn: &Connection, schedule: &AgentSchedule) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO agent_schedules (
            instance_name, agent_name, cron_expression, enabled, last_run_at, last_run_at_epoch,
            last_run_id, next_run_at, next_run_at_epoch, created_at, created_at_epoch,
            updated_at, updated_at_epoch
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
        ON CONFLICT(instance_name) DO UPDATE SET
            agent_name = ?2,
            cron_expression = ?3,
            updated_at = ?12,
            updated_at_epoch = ?13
        "#,
        params![
            schedule.instance_name,
            schedule.agent_name,
            schedule.cron_expression,
            schedule.enabled,
            schedule.last_run_at.map(|t| t.to_iso()),
            schedule.last_run_at.map(|t| t.epoch()),
            schedule.last_run_id,
            schedule.next_run_at.map(|t| t.to_iso()),
            schedule.next_run_at.map(|t| t.epoch()),
            schedule.created_at.to_iso(),
            schedule.created_at.epoch(),
            schedule.updated_at.to_iso(),
            schedule.updated_at.epoch(),
        ],
    )?;
    Ok(())
}

pub fn record_run(conn: &Connection, instance_name: &str, run_id: &str, next_run_at: Timestamp) -> Result<()> {
    let now = Timestamp::now();
    conn.execute(
        r#"
        UPDATE agent_schedules SET
            last_run_at = ?2, last_run_at_epoch = ?3, last_run_id = ?4,
            next_run_at = ?5, next_run_at_epoch = ?6, updated_at = ?7, updated_at_epoch = ?8
        WHERE instance_name = ?1
        "#,
        params![
            instance_name,
            now.to_iso(),
            now.epoch(),
            run_id,
            next_run_at.to_iso(),
            next_run_at.epoch(),
            now.to_iso(),
            now.epoch(),
        ],
    )?;
    Ok(())
}

pub fn due_schedules(conn: &Connection, as_of: Timestamp) -> Result<Vec<AgentSchedule>> {
    let mut stmt = conn.prepare(
        "SELECT * FROM agent_schedules WHERE enabled = 1 AND (next_run_at_epoch IS NULL OR next_run_at_epoch <= ?1)",
    )?;
    let rows = stmt.query_map([as_of.epoch()], row_to_schedule)?;
    rows.collect::<std::result::Result<Vec<_>, _>>().map_err(Error::from)
}

fn row_to_schedule(row: &Row) -> rusqlite::Result<AgentSchedule> {
    let created_epoch: i64 = row.get("created_at_epoch")?;
    let updated_epoch: i64 = row.get("updated_at_epoch")?;
    let last_run_epoch: Option<i64> = row.get("last_run_at_epoch")?;
    let next_run_epoch: Option<i64> = row.get("next_run_at_epoch")?;
    Ok(AgentSchedule {
        instance_name: row.get("instance_name")?,
        agent_name: row.get("agent_name")?,
        cron_expression: row.get("cron_expression")?,
        enabled: row.get("enabled")?,
        last_run_at: last_run_epoch.map(Timestamp::from_epoch),
        last_run_id: row.get("last_run_id")?,
        next_run_at: next_run_epoch.map(Timestamp::from_epoch),
        created_at: Timestamp::from_epoch(created_epoch),
        updated_at: Timestamp::from_epoch(updated_epoch),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Database;

    #[test]
    fn sync_creates_updates_and_removes() {
        let db = Database::open_in_memory().unwrap();
        sync_schedules(db.conn(), &[AgentSchedule::new("nightly", "reviewer", "0 0 * * *")]).unwrap();

        sync_schedules(db.conn(), &[AgentSchedule::new("nightly", "doc-writer", "0 1 * * *")]).unwrap();
        let due = due_schedules(db.conn(), Timestamp::from_epoch(0)).unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].agent_name, "doc-writer");

        sync_schedules(db.conn(), &[]).unwrap();
        let due = due_schedules(db.conn(), Timestamp::from_epoch(0)).unwrap();
        assert!(due.is_empty());
    }

    #[test]
    fn sync_preserves_enabled_override() {
        let db = Database::open_in_memory().unwrap();
        sync_schedules(db.conn(), &[AgentSchedule::new("nightly", "reviewer", "0 0 * * *")]).unwrap();
        db.conn().execute("UPDATE agent_schedules SET enabled = 0 WHERE instance_name = 'nightly'", []).unwrap();

        sync_schedules(db.conn(), &[AgentSchedule::new("nightly", "reviewer", "0 2 * * *")]).unwrap();
        let due = due_schedules(db.conn(), Timestamp::from_epoch(0)).unwrap();
        assert!(due.is_empty());
    }
}
