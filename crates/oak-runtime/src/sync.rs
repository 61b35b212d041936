//! Reconciles a workstation's local database and vector store against a
//! newer build of the daemon and any team backups dropped into the
//! backup directory since the last sync.
//!
//! The daemon here IS the long-running process rather than something a
//! separate CLI starts and stops, so there's no OS process to shell out
//! to the way a process-supervisor model would. `DaemonHandle` stands in
//! for that supervisor: a real implementation pauses/resumes the HTTP
//! listener and scheduler loop in place, while tests substitute an
//! in-memory fake.

use std::fs;
use std::path::PathBuf;

use oak_index::Database;

use crate::Result;

/// Why `detect_changes` decided a sync is needed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncReason {
    OakVersionChanged,
    SchemaVersionChanged,
    TeamBackupsAvailable,
    ManualFullRebuild,
    NoChanges,
}

/// A plan computed without touching any state, so it can be inspected
/// (or dry-run logged) before `execute_sync` commits to anything.
#[derive(Debug, Clone)]
pub struct SyncPlan {
    pub needs_sync: bool,
    pub reasons: Vec<SyncReason>,
    pub current_oak_version: String,
    pub running_oak_version: Option<String>,
    pub current_schema_version: i32,
    pub running_schema_version: Option<i32>,
    pub db_schema_version: i32,
    pub stop_daemon: bool,
    pub start_daemon: bool,
    pub run_migrations: bool,
    pub restore_team_backups: bool,
    pub full_index_rebuild: bool,
    pub team_backup_count: usize,
    pub team_backup_files: Vec<PathBuf>,
    pub daemon_running: bool,
}

#[derive(Debug, Clone, Default)]
pub struct SyncResult {
    pub success: bool,
    pub operations_completed: Vec<String>,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
    pub records_imported: usize,
    pub records_skipped: usize,
    pub migrations_applied: usize,
}

/// What `execute_sync` needs to control about the running daemon. In this
/// process the "daemon" is us, so `stop`/`start` don't kill a process -
/// they ask the caller to quiesce and resume whatever else touches the
/// database (the HTTP listener, the scheduler loop).
pub trait DaemonHandle {
    fn is_running(&self) -> bool;
    fn daemon_version(&self) -> Option<String>;
    fn daemon_schema_version(&self) -> Option<i32>;
    fn stop(&mut self) -> Result<()>;
    fn start(&mut self) -> Result<()>;
}

pub struct SyncService {
    machine_id: String,
    backup_dir: PathBuf,
    vector_store_dir: PathBuf,
    current_oak_version: String,
}

impl SyncService {
    pub fn new(machine_id: impl Into<String>, backup_dir: PathBuf, vector_store_dir: PathBuf, current_oak_version: impl Into<String>) -> Self {
        Self { machine_id: machine_id.into(), backup_dir, vector_store_dir, current_oak_version: current_oak_version.into() }
    }

    /// Pure: reads daemon and database state but performs no mutation.
    pub fn detect_changes(&self, db: &Database, daemon: &dyn DaemonHandle, include_team: bool, force_full: bool) -> Result<SyncPlan> {
        let daemon_running = daemon.is_running();
        let running_oak_version = if daemon_running { daemon.daemon_version() } else { None };
        let running_schema_version = if daemon_running { daemon.daemon_schema_version() } else { None };
        let db_schema_version = db.schema_version()?;

        let team_backup_files = if include_team { self.scan_team_backups()? } else { Vec::new() };
        let team_backup_count = team_backup_files.len();

        let mut reasons = Vec::new();
        if force_full {
            reasons.push(SyncReason::ManualFullRebuild);
        }
        if let Some(running) = &running_oak_version {
            if running != &self.current_oak_version {
                reasons.push(SyncReason::OakVersionChanged);
            }
        }
        if let Some(running) = running_schema_version {
            if running != oak_index::SCHEMA_VERSION {
                reasons.push(SyncReason::SchemaVersionChanged);
            }
        }
        if team_backup_count > 0 {
            reasons.push(SyncReason::TeamBackupsAvailable);
        }

        let needs_sync = !reasons.is_empty();
        if !needs_sync {
            reasons.push(SyncReason::NoChanges);
        }

        let run_migrations = db_schema_version < oak_index::SCHEMA_VERSION;
        let full_index_rebuild = force_full || reasons.contains(&SyncReason::OakVersionChanged);

        Ok(SyncPlan {
            needs_sync,
            reasons,
            current_oak_version: self.current_oak_version.clone(),
            running_oak_version,
            current_schema_version: oak_index::SCHEMA_VERSION,
            running_schema_version,
            db_schema_version,
            stop_daemon: needs_sync && daemon_running,
            start_daemon: needs_sync,
            run_migrations,
            restore_team_backups: team_backup_count > 0,
            full_index_rebuild,
            team_backup_count,
            team_backup_files,
            daemon_running,
        })
    }

    /// Executes a previously computed plan. `dry_run` logs every step
    /// that would run without touching the database, vector store, or
    /// daemon handle.
    pub fn execute_sync(&self, db: &mut Database, daemon: &mut dyn DaemonHandle, plan: &SyncPlan, dry_run: bool, include_activities: bool) -> Result<SyncResult> {
        let mut result = SyncResult { success: true, ..Default::default() };

        if !plan.needs_sync {
            result.operations_completed.push("no changes detected".to_string());
            return Ok(result);
        }

        if plan.stop_daemon {
            if dry_run {
                result.operations_completed.push("[dry-run] stop daemon".to_string());
            } else {
                daemon.stop()?;
                result.operations_completed.push("stopped daemon".to_string());
            }
        }

        if plan.restore_team_backups {
            for file in &plan.team_backup_files {
                if dry_run {
                    result.operations_completed.push(format!("[dry-run] restore {}", file.display()));
                    continue;
                }
                match fs::read_to_string(file) {
                    Ok(script) => match oak_index::import(db.conn(), &script) {
                        Ok(()) => {
                            result.records_imported += 1;
                            result.operations_completed.push(format!("restored {}", file.display()));
                        }
                        Err(err) => {
                            result.records_skipped += 1;
                            result.warnings.push(format!("skipped {}: {err}", file.display()));
                        }
                    },
                    Err(err) => {
                        result.records_skipped += 1;
                        result.warnings.push(format!("could not read {}: {err}", file.display()));
                    }
                }
            }

            if !dry_run {
                match oak_index::queries::resolution::replay_unapplied_events(db.conn()) {
                    Ok(0) => {}
                    Ok(n) => result.operations_completed.push(format!("replayed {n} resolution event(s) against restored observations")),
                    Err(err) => result.warnings.push(format!("resolution replay failed: {err}")),
                }
            }
        }

        if plan.full_index_rebuild {
            if dry_run {
                result.operations_completed.push("[dry-run] delete vector store for full rebuild".to_string());
            } else if self.vector_store_dir.exists() {
                fs::remove_dir_all(&self.vector_store_dir)?;
                result.operations_completed.push("deleted vector store for full rebuild".to_string());
            }
        }

        if plan.run_migrations {
            if dry_run {
                result.operations_completed.push("[dry-run] run migrations".to_string());
            } else {
                db.run_migrations()?;
                result.migrations_applied += 1;
                result.operations_completed.push("ran migrations".to_string());
            }
        }

        if plan.start_daemon {
            if dry_run {
                result.operations_completed.push("[dry-run] start daemon".to_string());
            } else {
                daemon.start()?;
                result.operations_completed.push("started daemon".to_string());
            }
        }

        if !dry_run {
            match oak_index::export(db.conn(), &self.machine_id) {
                Ok(script) => {
                    let path = self.backup_dir.join(format!("{}-post-sync.sql", self.machine_id));
                    fs::create_dir_all(&self.backup_dir)?;
                    fs::write(&path, script)?;
                    result.operations_completed.push(format!("wrote backup {}", path.display()));
                }
                Err(err) => result.warnings.push(format!("backup export failed: {err}")),
            }
        }

        if include_activities && plan.restore_team_backups && !dry_run {
            result.operations_completed.push("re-embedding will run in the background".to_string());
        }

        result.success = result.errors.is_empty();
        Ok(result)
    }

    fn scan_team_backups(&self) -> Result<Vec<PathBuf>> {
        if !self.backup_dir.exists() {
            return Ok(Vec::new());
        }
        let mut files = Vec::new();
        for entry in fs::read_dir(&self.backup_dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) == Some("sql") {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oak_index::Database;
    use std::cell::Cell;
    use tempfile::TempDir;

    struct MockDaemon {
        running: bool,
        version: Option<String>,
        schema_version: Option<i32>,
        stop_calls: Cell<usize>,
        start_calls: Cell<usize>,
    }

    impl DaemonHandle for MockDaemon {
        fn is_running(&self) -> bool { self.running }
        fn daemon_version(&self) -> Option<String> { self.version.clone() }
        fn daemon_schema_version(&self) -> Option<i32> { self.schema_version }
        fn stop(&mut self) -> Result<()> { self.stop_calls.set(self.stop_calls.get() + 1); self.running = false; Ok(()) }
        fn start(&mut self) -> Result<()> { self.start_calls.set(self.start_calls.get() + 1); self.running = true; Ok(()) }
    }

    fn not_running() -> MockDaemon {
        MockDaemon { running: false, version: None, schema_version: None, stop_calls: Cell::new(0), start_calls: Cell::new(0) }
    }

    #[test]
    fn no_daemon_and_no_backups_means_no_changes() {
        let dir = TempDir::new().unwrap();
        let db = Database::open_in_memory().unwrap();
        let service = SyncService::new("m1", dir.path().join("backups"), dir.path().join("vectors"), "1.0.0");
        let daemon = not_running();

        let plan = service.detect_changes(&db, &daemon, true, false).unwrap();
        assert!(!plan.needs_sync);
        assert_eq!(plan.reasons, vec![SyncReason::NoChanges]);
    }

    #[test]
    fn version_mismatch_triggers_full_rebuild() {
        let dir = TempDir::new().unwrap();
        let db = Database::open_in_memory().unwrap();
        let service = SyncService::new("m1", dir.path().join("backups"), dir.path().join("vectors"), "2.0.0");
        let daemon = MockDaemon { running: true, version: Some("1.0.0".to_string()), schema_version: Some(oak_index::SCHEMA_VERSION), stop_calls: Cell::new(0), start_calls: Cell::new(0) };

        let plan = service.detect_changes(&db, &daemon, false, false).unwrap();
        assert!(plan.needs_sync);
        assert!(plan.reasons.contains(&SyncReason::OakVersionChanged));
        assert!(plan.full_index_rebuild);
        assert!(plan.stop_daemon);
    }

    #[test]
    fn force_full_rebuild_overrides_everything_else() {
        let dir = TempDir::new().unwrap();
        let db = Database::open_in_memory().unwrap();
        let service = SyncService::new("m1", dir.path().join("backups"), dir.path().join("vectors"), "1.0.0");
        let daemon = not_running();

        let plan = service.detect_changes(&db, &daemon, false, true).unwrap();
        assert!(plan.needs_sync);
        assert!(plan.full_index_rebuild);
        assert!(plan.reasons.contains(&SyncReason::ManualFullRebuild));
    }

    #[test]
    fn team_backups_available_are_detected_and_restored() {
        let dir = TempDir::new().unwrap();
        let backup_dir = dir.path().join("backups");
        fs::create_dir_all(&backup_dir).unwrap();

        let mut source_db = Database::open_in_memory().unwrap();
        let session = oak_types::Session::new("s1", "claude-code", "/proj", "teammate");
        oak_index::queries::sessions::upsert(source_db.conn(), &session).unwrap();
        let script = oak_index::export(source_db.conn(), "teammate").unwrap();
        fs::write(backup_dir.join("teammate.sql"), script).unwrap();

        let mut db = Database::open_in_memory().unwrap();
        let service = SyncService::new("m1", backup_dir, dir.path().join("vectors"), "1.0.0");
        let mut daemon = not_running();

        let plan = service.detect_changes(&db, &daemon, true, false).unwrap();
        assert!(plan.needs_sync);
        assert_eq!(plan.team_backup_count, 1);

        let result = service.execute_sync(&mut db, &mut daemon, &plan, false, false).unwrap();
        assert!(result.success);
        assert_eq!(result.records_imported, 1);

        let restored = oak_index::queries::sessions::get(db.conn(), "s1").unwrap();
        assert!(restored.is_some());
    }

    #[test]
    fn restoring_a_backup_replays_resolution_events_it_unblocks() {
        let dir = TempDir::new().unwrap();
        let backup_dir = dir.path().join("backups");
        fs::create_dir_all(&backup_dir).unwrap();

        let mut source_db = Database::open_in_memory().unwrap();
        let session = oak_types::Session::new("s1", "claude-code", "/proj", "teammate");
        oak_index::queries::sessions::upsert(source_db.conn(), &session).unwrap();
        let obs = oak_types::StoredObservation::new("o1", "s1", "text", oak_types::MemoryType::Gotcha, 5, "teammate");
        oak_index::queries::observations::store(source_db.conn(), &obs).unwrap();
        let script = oak_index::export(source_db.conn(), "teammate").unwrap();
        fs::write(backup_dir.join("teammate.sql"), script).unwrap();

        let mut db = Database::open_in_memory().unwrap();
        let event = oak_types::ResolutionEvent::new("r1", "o1", oak_types::ResolutionAction::Resolved, "m1");
        oak_index::queries::resolution::record_and_apply(db.conn(), &event).unwrap();
        assert_eq!(oak_index::queries::resolution::unapplied(db.conn()).unwrap().len(), 1);

        let service = SyncService::new("m1", backup_dir, dir.path().join("vectors"), "1.0.0");
        let mut daemon = not_running();
        let plan = service.detect_changes(&db, &daemon, true, false).unwrap();
        let result = service.execute_sync(&mut db, &mut daemon, &plan, false, false).unwrap();

        assert!(result.success);
        assert!(oak_index::queries::resolution::unapplied(db.conn()).unwrap().is_empty());
        let restored_obs = oak_index::queries::observations::get(db.conn(), "o1").unwrap().unwrap();
        assert_eq!(restored_obs.status.as_str(), "resolved");
    }

    #[test]
    fn dry_run_reports_steps_without_mutating_state() {
        let dir = TempDir::new().unwrap();
        let mut db = Database::open_in_memory().unwrap();
        let service = SyncService::new("m1", dir.path().join("backups"), dir.path().join("vectors"), "1.0.0");
        let mut daemon = not_running();

        let plan = service.detect_changes(&db, &daemon, false, true).unwrap();
        let result = service.execute_sync(&mut db, &mut daemon, &plan, true, false).unwrap();

        assert!(result.success);
        assert!(result.operations_completed.iter().all(|op| op.starts_with("[dry-run]")));
        assert_eq!(daemon.start_calls.get(), 0);
    }
}
