//! Runs configured agent instances on cron expressions: exactly once per
//! tick, with overlap suppression and a watchdog for runs that never
//! reported back.

use std::str::FromStr;

use cron::Schedule;
use rusqlite::Connection;

use oak_index::queries::{agent_runs, agent_schedules};
use oak_types::{AgentRun, AgentRunStatus, AgentSchedule, Timestamp};

use crate::Result;

/// Executes a resolved agent instance. A real implementation shells out
/// to (or otherwise invokes) the named agent; tests substitute a stub.
pub trait AgentExecutor: Send + Sync {
    fn execute(&self, schedule: &AgentSchedule) -> AgentOutcome;
}

#[derive(Debug, Clone)]
pub struct AgentOutcome {
    pub status: AgentRunStatus,
    pub result: Option<String>,
    pub error: Option<String>,
    pub cost_usd: Option<f64>,
    pub files_created: Vec<String>,
    pub files_modified: Vec<String>,
}

impl AgentOutcome {
    pub fn completed(result: impl Into<String>) -> Self {
        Self { status: AgentRunStatus::Completed, result: Some(result.into()), error: None, cost_usd: None, files_created: Vec::new(), files_modified: Vec::new() }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self { status: AgentRunStatus::Failed, result: None, error: Some(error.into()), cost_usd: None, files_created: Vec::new(), files_modified: Vec::new() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Ran { run_id: String },
    AlreadyRunning,
    Error(String),
}

pub struct Scheduler<'a> {
    machine_id: &'a str,
}

impl<'a> Scheduler<'a> {
    pub fn new(machine_id: &'a str) -> Self {
        Self { machine_id }
    }

    /// Reconciles `desired` against stored schedules, computing
    /// `next_run_at` for any schedule that doesn't have one yet.
    pub fn sync_schedules(&self, conn: &Connection, mut desired: Vec<AgentSchedule>) -> Result<()> {
        let now = Timestamp::now();
        for schedule in &mut desired {
            if schedule.next_run_at.is_none() {
                schedule.next_run_at = next_fire_after(&schedule.cron_expression, now);
            }
        }
        agent_schedules::sync_schedules(conn, &desired)?;
        Ok(())
    }

    pub fn get_due_schedules(&self, conn: &Connection) -> Result<Vec<AgentSchedule>> {
        Ok(agent_schedules::due_schedules(conn, Timestamp::now())?)
    }

    /// Skips with `AlreadyRunning` if another run for the same instance
    /// is still in flight - overlap suppression, not an error.
    pub fn run_scheduled_agent(&self, conn: &Connection, schedule: &AgentSchedule, executor: &dyn AgentExecutor) -> Result<RunOutcome> {
        let recent = agent_runs::list_recent(conn, Some(&schedule.agent_name), 20)?;
        if recent.iter().any(|run| run.status == AgentRunStatus::Running) {
            tracing::debug!(instance = schedule.instance_name, "skipping tick: already running");
            return Ok(RunOutcome::AlreadyRunning);
        }

        let run_id = format!("{}-{}", schedule.instance_name, Timestamp::now().epoch());
        let mut run = AgentRun::new(&run_id, &schedule.agent_name, format!("scheduled: {}", schedule.instance_name), self.machine_id);
        run.status = AgentRunStatus::Running;
        run.started_at = Some(Timestamp::now());
        agent_runs::create(conn, &run)?;

        let outcome = executor.execute(schedule);
        run.files_created = outcome.files_created;
        run.files_modified = outcome.files_modified;
        run.cost_usd = outcome.cost_usd;
        agent_runs::complete(conn, &run_id, outcome.status, outcome.result.as_deref(), outcome.error.as_deref())?;

        let next_run_at = next_fire_after(&schedule.cron_expression, Timestamp::now()).unwrap_or_else(Timestamp::now);
        agent_schedules::record_run(conn, &schedule.instance_name, &run_id, next_run_at)?;

        if outcome.error.is_some() {
            tracing::warn!(instance = schedule.instance_name, run_id, "scheduled run completed with error");
        }
        Ok(RunOutcome::Ran { run_id })
    }

    /// Fans out over every due schedule, sequentially. Errors in one
    /// schedule never stop the others from being attempted.
    pub fn check_and_run(&self, conn: &Connection, executor: &dyn AgentExecutor) -> Result<Vec<(String, RunOutcome)>> {
        let due = self.get_due_schedules(conn)?;
        let mut outcomes = Vec::with_capacity(due.len());
        for schedule in due {
            let outcome = match self.run_scheduled_agent(conn, &schedule, executor) {
                Ok(outcome) => outcome,
                Err(err) => {
                    tracing::error!(instance = schedule.instance_name, error = %err, "scheduled run failed");
                    RunOutcome::Error(err.to_string())
                }
            };
            outcomes.push((schedule.instance_name, outcome));
        }
        Ok(outcomes)
    }

    /// Marks as `failed` any run that has been `running` for longer than
    /// `default_timeout_seconds + buffer_seconds`, so a crashed executor
    /// doesn't hold `already_running` open forever.
    pub fn recover_stale_runs(&self, conn: &Connection, default_timeout_seconds: i64, buffer_seconds: i64) -> Result<usize> {
        let now = Timestamp::now().epoch();
        let running = agent_runs::list_recent(conn, None, 500)?;
        let mut recovered = 0;
        for run in running {
            if run.status != AgentRunStatus::Running {
                continue;
            }
            let Some(started_at) = run.started_at else { continue };
            if started_at.epoch() + default_timeout_seconds + buffer_seconds < now {
                agent_runs::complete(conn, &run.id, AgentRunStatus::Failed, None, Some("watchdog: exceeded timeout without completing"))?;
                recovered += 1;
            }
        }
        Ok(recovered)
    }
}

fn next_fire_after(cron_expression: &str, after: Timestamp) -> Option<Timestamp> {
    let schedule = Schedule::from_str(cron_expression).ok()?;
    let next = schedule.after(&after.to_datetime()).next()?;
    Some(Timestamp::from_datetime(next))
}

/// Drives `check_and_run` on a fixed interval until `stop` resolves.
/// Errors in one tick never stop the loop - they're logged and the next
/// interval still fires.
pub async fn run_background_loop(
    conn: std::sync::Arc<std::sync::Mutex<Connection>>,
    machine_id: String,
    executor: std::sync::Arc<dyn AgentExecutor>,
    interval_seconds: u64,
    mut stop: tokio::sync::watch::Receiver<bool>,
) {
    let mut interval = tokio::time::interval(std::time::Duration::from_secs(interval_seconds.max(1)));
    loop {
        tokio::select! {
            _ = interval.tick() => {
                let scheduler = Scheduler::new(&machine_id);
                let conn = conn.lock().unwrap();
                if let Err(err) = scheduler.check_and_run(&conn, executor.as_ref()) {
                    tracing::error!(error = %err, "scheduler tick failed");
                }
            }
            _ = stop.changed() => {
                if *stop.borrow() {
                    tracing::info!("scheduler loop stopping");
                    return;
                }
            }
        }
    }
}

/// An executor that resolves no agents. Used when the daemon is running
/// without an agent-dispatch backend configured - overdue schedules are
/// recorded as failed runs rather than silently skipped.
pub struct UnconfiguredExecutor;

impl AgentExecutor for UnconfiguredExecutor {
    fn execute(&self, schedule: &AgentSchedule) -> AgentOutcome {
        tracing::warn!(instance = schedule.instance_name, "no agent executor configured; marking run failed");
        AgentOutcome::failed("no agent executor configured")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oak_index::Database;

    struct StubExecutor(AgentOutcome);

    impl AgentExecutor for StubExecutor {
        fn execute(&self, _schedule: &AgentSchedule) -> AgentOutcome {
            self.0.clone()
        }
    }

    fn success() -> AgentOutcome {
        AgentOutcome::completed("ok")
    }

    #[test]
    fn sync_then_due_schedules_round_trips() {
        let db = Database::open_in_memory().unwrap();
        let scheduler = Scheduler::new("m1");
        let schedule = AgentSchedule::new("nightly-review", "reviewer", "* * * * * *");
        scheduler.sync_schedules(db.conn(), vec![schedule]).unwrap();

        let due = scheduler.get_due_schedules(db.conn()).unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].instance_name, "nightly-review");
    }

    #[test]
    fn run_scheduled_agent_suppresses_overlap() {
        let db = Database::open_in_memory().unwrap();
        let scheduler = Scheduler::new("m1");
        let schedule = AgentSchedule::new("reviewer-1", "reviewer", "* * * * * *");
        scheduler.sync_schedules(db.conn(), vec![schedule.clone()]).unwrap();

        let mut running = AgentRun::new("run-already", "reviewer", "task", "m1");
        running.status = AgentRunStatus::Running;
        running.started_at = Some(Timestamp::now());
        agent_runs::create(db.conn(), &running).unwrap();

        let executor = StubExecutor(success());
        let outcome = scheduler.run_scheduled_agent(db.conn(), &schedule, &executor).unwrap();
        assert_eq!(outcome, RunOutcome::AlreadyRunning);
    }

    #[test]
    fn run_scheduled_agent_records_completion() {
        let db = Database::open_in_memory().unwrap();
        let scheduler = Scheduler::new("m1");
        let schedule = AgentSchedule::new("reviewer-2", "reviewer-b", "* * * * * *");
        scheduler.sync_schedules(db.conn(), vec![schedule.clone()]).unwrap();

        let executor = StubExecutor(success());
        let outcome = scheduler.run_scheduled_agent(db.conn(), &schedule, &executor).unwrap();
        assert!(matches!(outcome, RunOutcome::Ran { .. }));
    }

    #[test]
    fn recover_stale_runs_fails_overdue_running_rows() {
        let db = Database::open_in_memory().unwrap();
        let scheduler = Scheduler::new("m1");

        let mut stale = AgentRun::new("run-stale", "reviewer", "task", "m1");
        stale.status = AgentRunStatus::Running;
        stale.started_at = Some(Timestamp::from_epoch(0));
        agent_runs::create(db.conn(), &stale).unwrap();

        let recovered = scheduler.recover_stale_runs(db.conn(), 60, 10).unwrap();
        assert_eq!(recovered, 1);
        let reloaded = agent_runs::get(db.conn(), "run-stale").unwrap().unwrap();
        assert_eq!(reloaded.status, AgentRunStatus::Failed);
    }
}
