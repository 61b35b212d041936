use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "oak-ci")]
#[command(about = "Codebase-intelligence daemon: ingest, extract, and serve durable memory", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Overrides the workspace directory (`OAK_PATH`, then the system data dir, then `~/.oak-ci`).
    #[arg(long, global = true)]
    pub workspace: Option<String>,

    #[arg(long, default_value = "info", global = true)]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the daemon: HTTP hook surface, scheduler, and sync orchestrator.
    Serve,
    /// Run the MCP server over stdio, one JSON-RPC request per line.
    Mcp,
    /// Compare local state against the team backup directory and apply pending changes.
    Sync {
        /// Report what would change without writing anything.
        #[arg(long)]
        dry_run: bool,
        /// Include other machines' activity rows in the comparison, not just observations/sessions.
        #[arg(long)]
        include_activities: bool,
    },
    /// Print row counts and vector-collection sizes across both stores.
    Stats,
    /// Search code chunks, memory, plans, or session summaries.
    Search {
        query: String,
        #[arg(long, default_value = "all")]
        search_type: String,
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
}
