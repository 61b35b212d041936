//! MCP tool handlers: thin wrappers turning a [`Tools`] call into the
//! `Result<Value, String>` shape `tools/call` responses expect.

use serde_json::Value;

use crate::Tools;
use crate::tools::{
    ActivityArgs, ArchiveMemoriesArgs, ContextArgs, MemoriesArgs, RememberArgs, ResolveMemoryArgs, SearchArgs, SessionIdArgs, SessionsArgs,
    SuggestParentArgs,
};

pub async fn handle_search(tools: &Tools, args: SearchArgs) -> Result<Value, String> {
    let result = tools.search(args).await.map_err(|e| e.to_string())?;
    serde_json::to_value(&result).map_err(|e| format!("serialization error: {e}"))
}

pub async fn handle_remember(tools: &Tools, args: RememberArgs) -> Result<Value, String> {
    let result = tools.remember(args).await.map_err(|e| e.to_string())?;
    serde_json::to_value(&result).map_err(|e| format!("serialization error: {e}"))
}

pub async fn handle_context(tools: &Tools, args: ContextArgs) -> Result<Value, String> {
    let result = tools.context(args).await.map_err(|e| e.to_string())?;
    serde_json::to_value(&result).map_err(|e| format!("serialization error: {e}"))
}

pub async fn handle_resolve_memory(tools: &Tools, args: ResolveMemoryArgs) -> Result<Value, String> {
    let result = tools.resolve_memory(args).map_err(|e| e.to_string())?;
    serde_json::to_value(&result).map_err(|e| format!("serialization error: {e}"))
}

pub async fn handle_sessions(tools: &Tools, args: SessionsArgs) -> Result<Value, String> {
    let result = tools.sessions(args).map_err(|e| e.to_string())?;
    serde_json::to_value(&result).map_err(|e| format!("serialization error: {e}"))
}

pub async fn handle_memories(tools: &Tools, args: MemoriesArgs) -> Result<Value, String> {
    let result = tools.memories(args).map_err(|e| e.to_string())?;
    serde_json::to_value(&result).map_err(|e| format!("serialization error: {e}"))
}

pub async fn handle_stats(tools: &Tools) -> Result<Value, String> {
    let result = tools.stats().map_err(|e| e.to_string())?;
    serde_json::to_value(&result).map_err(|e| format!("serialization error: {e}"))
}

pub async fn handle_activity(tools: &Tools, args: ActivityArgs) -> Result<Value, String> {
    let result = tools.activity(args).map_err(|e| e.to_string())?;
    serde_json::to_value(&result).map_err(|e| format!("serialization error: {e}"))
}

pub async fn handle_archive_memories(tools: &Tools, args: ArchiveMemoriesArgs) -> Result<Value, String> {
    let result = tools.archive_memories(args).map_err(|e| e.to_string())?;
    serde_json::to_value(&result).map_err(|e| format!("serialization error: {e}"))
}

pub async fn handle_suggest_parent(tools: &Tools, args: SuggestParentArgs) -> Result<Value, String> {
    let result = tools.suggest_parent(args).await.map_err(|e| e.to_string())?;
    serde_json::to_value(&result).map_err(|e| format!("serialization error: {e}"))
}

pub async fn handle_dismiss_suggested_parent(tools: &Tools, args: SessionIdArgs) -> Result<Value, String> {
    let result = tools.dismiss_suggested_parent(args).map_err(|e| e.to_string())?;
    serde_json::to_value(&result).map_err(|e| format!("serialization error: {e}"))
}

pub async fn handle_reset_suggested_parent(tools: &Tools, args: SessionIdArgs) -> Result<Value, String> {
    let result = tools.reset_suggested_parent(args).map_err(|e| e.to_string())?;
    serde_json::to_value(&result).map_err(|e| format!("serialization error: {e}"))
}
