//! Tool-call SDK for the oak-ci codebase-intelligence daemon.
//!
//! `Tools` is the in-process facade over the relational store
//! (`oak-index`) and the vector store (`oak-vector`) that both the MCP
//! server in [`mcp`] and, eventually, a thin CLI wrap. Each of its twelve
//! methods corresponds to one tool an agent can call: `search`,
//! `remember`, `context`, `resolve_memory`, `sessions`, `memories`,
//! `stats`, `activity`, `archive_memories`, `suggest_parent`,
//! `dismiss_suggested_parent`, `reset_suggested_parent`.

pub mod error;
pub mod mcp;
pub mod tools;

pub use error::{Error, Result};
pub use tools::Tools;
