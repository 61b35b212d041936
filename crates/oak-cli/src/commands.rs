use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use oak_index::Database;
use oak_runtime::{Config, DaemonHandle, SyncService};
use oak_sdk::Tools;
use oak_sdk::tools::{SearchArgs, SearchType};
use oak_vector::VectorStore;

use crate::args::{Cli, Commands};

pub async fn run(cli: Cli) -> Result<()> {
    init_tracing(&cli.log_level);

    let mut config = Config::load()?;
    if let Some(workspace) = cli.workspace {
        config.workspace_path = Some(workspace);
    }

    match cli.command {
        Commands::Serve => oak_runtime::serve(config).await.context("daemon exited"),
        Commands::Mcp => {
            let tools = open_tools(&config)?;
            oak_sdk::mcp::run_server(tools).await
        }
        Commands::Sync { dry_run, include_activities } => run_sync(&config, dry_run, include_activities).await,
        Commands::Stats => {
            let tools = open_tools(&config)?;
            let stats = tools.stats()?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
            Ok(())
        }
        Commands::Search { query, search_type, limit } => {
            let tools = open_tools(&config)?;
            let search_type = serde_json::from_value(serde_json::Value::String(search_type.clone()))
                .with_context(|| format!("unknown search type: {search_type}"))?;
            let result = tools.search(SearchArgs { query, search_type: Some(search_type), limit: Some(limit), include_resolved: None }).await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(())
        }
    }
}

fn init_tracing(log_level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_new(log_level).unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// Opens both stores read-write against the configured workspace, for the
/// one-shot commands that aren't the long-running daemon.
fn open_tools(config: &Config) -> Result<Tools> {
    let workspace = config.workspace_dir()?;
    std::fs::create_dir_all(&workspace)?;
    let conn = Arc::new(Mutex::new(Database::open(&workspace.join("oak.sqlite3"))?.into_conn()));
    let vector_store = Arc::new(VectorStore::open(&oak_core::vector_store_dir(&workspace), config.build_embedding_chain())?);
    Ok(Tools::new(conn, vector_store, oak_core::machine_id()).with_llm_chain(config.build_llm_chain()))
}

/// `DaemonHandle` for a sync invoked as a separate, one-shot CLI process:
/// there's no in-process scheduler to pause, so `is_running` always
/// reports false and `stop`/`start` are no-ops.
struct DetachedDaemon;

impl DaemonHandle for DetachedDaemon {
    fn is_running(&self) -> bool {
        false
    }

    fn daemon_version(&self) -> Option<String> {
        None
    }

    fn daemon_schema_version(&self) -> Option<i32> {
        None
    }

    fn stop(&mut self) -> oak_runtime::Result<()> {
        Ok(())
    }

    fn start(&mut self) -> oak_runtime::Result<()> {
        Ok(())
    }
}

async fn run_sync(config: &Config, dry_run: bool, include_activities: bool) -> Result<()> {
    let workspace = config.workspace_dir()?;
    let mut db = Database::open(&workspace.join("oak.sqlite3"))?;
    let machine_id = oak_core::machine_id();
    let backup_dir = oak_core::backup_dir(&workspace);
    let vector_store_dir = oak_core::vector_store_dir(&workspace);

    let service = SyncService::new(machine_id, backup_dir, vector_store_dir, oak_runtime::OAK_VERSION);
    let mut daemon = DetachedDaemon;

    let plan = service.detect_changes(&db, &daemon, true, false)?;
    if !plan.needs_sync {
        println!("nothing to sync");
        return Ok(());
    }

    let result = service.execute_sync(&mut db, &mut daemon, &plan, dry_run, include_activities)?;
    println!("{}", serde_json::to_string_pretty(&SyncReport::from(result))?);
    Ok(())
}

#[derive(serde::Serialize)]
struct SyncReport {
    success: bool,
    operations_completed: Vec<String>,
    warnings: Vec<String>,
    errors: Vec<String>,
    records_imported: usize,
    records_skipped: usize,
    migrations_applied: usize,
}

impl From<oak_runtime::SyncResult> for SyncReport {
    fn from(r: oak_runtime::SyncResult) -> Self {
        Self {
            success: r.success,
            operations_completed: r.operations_completed,
            warnings: r.warnings,
            errors: r.errors,
            records_imported: r.records_imported,
            records_skipped: r.records_skipped,
            migrations_applied: r.migrations_applied,
        }
    }
}
