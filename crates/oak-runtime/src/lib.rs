//! The daemon process: ingests hook events into the relational store,
//! runs scheduled agents, keeps a workstation's local state in sync with
//! team backups, and exposes both over HTTP.
//!
//! [`serve`] is the production entrypoint; the modules underneath it
//! (`ingest`, `scheduler`, `sync`, `hooks`) are independently testable
//! against an in-memory database.

pub mod batch_runner;
pub mod config;
pub mod error;
pub mod hooks;
pub mod ingest;
pub mod scheduler;
pub mod sync;

pub use config::{Config, ProviderEntry};
pub use error::{Error, Result};
pub use hooks::AppState;
pub use ingest::Ingestor;
pub use scheduler::{AgentExecutor, AgentOutcome, RunOutcome, Scheduler, UnconfiguredExecutor};
pub use sync::{DaemonHandle, SyncPlan, SyncReason, SyncResult, SyncService};

use std::sync::{Arc, Mutex};

/// The current build's version, reported over `/healthz` for the sync
/// orchestrator's cross-process comparison.
pub const OAK_VERSION: &str = env!("CARGO_PKG_VERSION");

/// A `DaemonHandle` that actually controls this process: stopping
/// quiesces the scheduler loop via its shutdown channel, starting
/// resumes it. The HTTP listener itself isn't paused - rejecting writes
/// during a sync window is handled by the sync lock in `execute_sync`'s
/// caller, not by this handle.
pub struct InProcessDaemon {
    scheduler_stop: Option<tokio::sync::watch::Sender<bool>>,
    scheduler_task: Option<tokio::task::JoinHandle<()>>,
    batch_processor_stop: Option<tokio::sync::watch::Sender<bool>>,
    batch_processor_task: Option<tokio::task::JoinHandle<()>>,
}

impl InProcessDaemon {
    pub fn new(scheduler_stop: tokio::sync::watch::Sender<bool>, scheduler_task: tokio::task::JoinHandle<()>) -> Self {
        Self { scheduler_stop: Some(scheduler_stop), scheduler_task: Some(scheduler_task), batch_processor_stop: None, batch_processor_task: None }
    }

    pub fn with_batch_processor(mut self, stop: tokio::sync::watch::Sender<bool>, task: tokio::task::JoinHandle<()>) -> Self {
        self.batch_processor_stop = Some(stop);
        self.batch_processor_task = Some(task);
        self
    }
}

impl DaemonHandle for InProcessDaemon {
    fn is_running(&self) -> bool {
        self.scheduler_task.as_ref().is_some_and(|task| !task.is_finished())
    }

    fn daemon_version(&self) -> Option<String> {
        Some(OAK_VERSION.to_string())
    }

    fn daemon_schema_version(&self) -> Option<i32> {
        Some(oak_index::SCHEMA_VERSION)
    }

    fn stop(&mut self) -> Result<()> {
        if let Some(stop) = self.scheduler_stop.take() {
            let _ = stop.send(true);
        }
        if let Some(stop) = self.batch_processor_stop.take() {
            let _ = stop.send(true);
        }
        Ok(())
    }

    fn start(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Opens the relational store, builds the ingestor/scheduler/sync
/// services from `config`, and serves the HTTP hook surface until the
/// process is asked to stop. Blocks the calling task.
pub async fn serve(config: Config) -> Result<()> {
    let workspace = config.workspace_dir()?;
    std::fs::create_dir_all(&workspace)?;
    let db_path = workspace.join("oak.sqlite3");
    let conn = oak_index::Database::open(&db_path)?.into_conn();

    let machine_id = oak_core::machine_id();
    let vector_store_dir = oak_core::vector_store_dir(&workspace);
    let embedding_chain = config.build_embedding_chain();
    let vector_store = match oak_vector::VectorStore::open(&vector_store_dir, embedding_chain) {
        Ok(store) => Some(store),
        Err(err) => {
            tracing::warn!(error = %err, "vector store unavailable; index stats will report zero");
            None
        }
    };

    let conn = Arc::new(Mutex::new(conn));
    let ingestor = Ingestor::new(machine_id.clone(), config.activity_buffer_threshold);
    let state = Arc::new(AppState::new(conn.clone(), ingestor, vector_store, config.bearer_token.clone(), OAK_VERSION, oak_index::SCHEMA_VERSION));

    let (stop_tx, stop_rx) = tokio::sync::watch::channel(false);
    let executor: Arc<dyn AgentExecutor> = Arc::new(UnconfiguredExecutor);
    let scheduler_task = tokio::task::spawn(scheduler::run_background_loop(conn.clone(), machine_id, executor, config.scheduler_interval_seconds, stop_rx));

    let batch_processor_conn = oak_index::Database::open(&db_path)?.into_conn();
    let llm_chain = config.build_llm_chain();
    let (batch_stop_tx, batch_stop_rx) = tokio::sync::watch::channel(false);
    let batch_processor_task = tokio::task::spawn(batch_runner::run_background_loop(
        state.clone(),
        batch_processor_conn,
        llm_chain,
        oak_engine::ContextBudget::default(),
        config.batch_processor_interval_seconds,
        batch_stop_rx,
    ));
    let mut daemon_handle = InProcessDaemon::new(stop_tx, scheduler_task).with_batch_processor(batch_stop_tx, batch_processor_task);

    let app = hooks::router(state.clone());
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, "oak-ci daemon listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown signal received");
        })
        .await?;

    daemon_handle.stop()?;
    Ok(())
}
