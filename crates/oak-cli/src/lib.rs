//! Thin CLI over [`oak_sdk`]: start the daemon, run the MCP server, force a
//! sync, or poke at either store from a terminal without going through an
//! agent.

mod args;
mod commands;

pub use args::{Cli, Commands};
pub use commands::run;
