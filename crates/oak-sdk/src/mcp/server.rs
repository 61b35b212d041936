//! MCP JSON-RPC server.

use schemars::schema_for;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::io::{BufRead, BufReader, Write};

use crate::Tools;
use crate::tools::{
    ActivityArgs, ArchiveMemoriesArgs, ContextArgs, MemoriesArgs, RememberArgs, ResolveMemoryArgs, SearchArgs, SessionIdArgs, SessionsArgs,
    SuggestParentArgs,
};

use super::tools::{
    handle_activity, handle_archive_memories, handle_context, handle_dismiss_suggested_parent, handle_memories, handle_remember,
    handle_reset_suggested_parent, handle_resolve_memory, handle_search, handle_sessions, handle_stats, handle_suggest_parent,
};

#[derive(Debug, Deserialize)]
struct JsonRpcRequest {
    #[allow(dead_code)]
    jsonrpc: String,
    id: Option<Value>,
    method: String,
    params: Option<Value>,
}

#[derive(Debug, Serialize)]
struct JsonRpcResponse {
    jsonrpc: String,
    id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<JsonRpcError>,
}

#[derive(Debug, Serialize)]
struct JsonRpcError {
    code: i32,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
}

pub struct OakMcpServer {
    tools: Tools,
}

impl OakMcpServer {
    pub fn new(tools: Tools) -> Self {
        Self { tools }
    }

    /// Converts a serde deserialization error into an MCP-compliant error,
    /// special-cased for the common "missing field" shape so the agent
    /// gets a structured `missing` list instead of a raw parser message.
    fn parse_validation_error(tool_name: &str, error: serde_json::Error) -> JsonRpcError {
        let error_msg = error.to_string();

        if error_msg.contains("missing field") {
            if let Some(field_start) = error_msg.find('`') {
                if let Some(field_end) = error_msg[field_start + 1..].find('`') {
                    let field_name = &error_msg[field_start + 1..field_start + 1 + field_end];
                    return JsonRpcError {
                        code: -32602,
                        message: format!("Invalid params: missing required field \"{field_name}\""),
                        data: Some(json!({"missing": [field_name], "tool": tool_name})),
                    };
                }
            }
        }

        JsonRpcError {
            code: -32602,
            message: format!("Invalid params: {error}"),
            data: Some(json!({"tool": tool_name, "detail": error_msg})),
        }
    }

    async fn handle_request(&self, request: JsonRpcRequest) -> JsonRpcResponse {
        let id = request.id.clone().unwrap_or_else(|| Value::Number(serde_json::Number::from(0)));

        match request.method.as_str() {
            "initialize" => self.handle_initialize(id),
            "tools/list" => self.handle_list_tools(id),
            "tools/call" => self.handle_call_tool(id, request.params).await,
            _ => JsonRpcResponse {
                jsonrpc: "2.0".to_string(),
                id,
                result: None,
                error: Some(JsonRpcError { code: -32601, message: format!("Method not found: {}", request.method), data: None }),
            },
        }
    }

    fn handle_initialize(&self, id: Value) -> JsonRpcResponse {
        JsonRpcResponse {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(json!({
                "protocolVersion": "2024-11-05",
                "capabilities": {"tools": {}},
                "serverInfo": {"name": "oak-ci", "version": env!("CARGO_PKG_VERSION")},
                "instructions": "oak-ci MCP server - codebase intelligence for coding agents. Search and write durable memory, fetch curated task context, and inspect session/activity history.",
            })),
            error: None,
        }
    }

    fn handle_list_tools(&self, id: Value) -> JsonRpcResponse {
        let search_schema = schema_for!(SearchArgs);
        let remember_schema = schema_for!(RememberArgs);
        let context_schema = schema_for!(ContextArgs);
        let resolve_memory_schema = schema_for!(ResolveMemoryArgs);
        let sessions_schema = schema_for!(SessionsArgs);
        let memories_schema = schema_for!(MemoriesArgs);
        let activity_schema = schema_for!(ActivityArgs);
        let archive_memories_schema = schema_for!(ArchiveMemoriesArgs);
        let suggest_parent_schema = schema_for!(SuggestParentArgs);
        let session_id_schema = schema_for!(SessionIdArgs);

        JsonRpcResponse {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(json!({
                "tools": [
                    {
                        "name": "oak_search",
                        "description": "Layer-1 search over code chunks, memory observations, plans, and session summaries. WORKFLOW: call this first to find candidate ids, then oak_context for full content.",
                        "inputSchema": serde_json::to_value(&search_schema).unwrap(),
                    },
                    {
                        "name": "oak_remember",
                        "description": "Write a durable observation (gotcha, bug fix, decision, discovery, trade-off, session summary, or plan) to memory.",
                        "inputSchema": serde_json::to_value(&remember_schema).unwrap(),
                    },
                    {
                        "name": "oak_context",
                        "description": "Curated context for a task: relevant code and memory within a token budget, 70% code / 30% memory.",
                        "inputSchema": serde_json::to_value(&context_schema).unwrap(),
                    },
                    {
                        "name": "oak_resolve_memory",
                        "description": "Mark an observation resolved or superseded. Emits a resolution event other machines replay against their own copy.",
                        "inputSchema": serde_json::to_value(&resolve_memory_schema).unwrap(),
                    },
                    {
                        "name": "oak_sessions",
                        "description": "Recent coding sessions, most recently started first, optionally with stored summaries.",
                        "inputSchema": serde_json::to_value(&sessions_schema).unwrap(),
                    },
                    {
                        "name": "oak_memories",
                        "description": "Browse memory observations by type and status.",
                        "inputSchema": serde_json::to_value(&memories_schema).unwrap(),
                    },
                    {
                        "name": "oak_stats",
                        "description": "Row counts and vector-collection sizes across both stores.",
                        "inputSchema": {"type": "object", "properties": {}},
                    },
                    {
                        "name": "oak_activity",
                        "description": "Raw tool-call activity history for a session.",
                        "inputSchema": serde_json::to_value(&activity_schema).unwrap(),
                    },
                    {
                        "name": "oak_archive_memories",
                        "description": "Bulk-archive memory records in the vector store by id or by status/age filter. Supports a dry run.",
                        "inputSchema": serde_json::to_value(&archive_memories_schema).unwrap(),
                    },
                    {
                        "name": "oak_suggest_parent",
                        "description": "Propose a parent session for a session never explicitly linked, scored from session-summary similarity, time gap, and optional LLM refinement.",
                        "inputSchema": serde_json::to_value(&suggest_parent_schema).unwrap(),
                    },
                    {
                        "name": "oak_dismiss_suggested_parent",
                        "description": "Dismiss the standing parent-session suggestion for a session.",
                        "inputSchema": serde_json::to_value(&session_id_schema).unwrap(),
                    },
                    {
                        "name": "oak_reset_suggested_parent",
                        "description": "Clear a prior suggestion dismissal so it surfaces again next time it's computed.",
                        "inputSchema": serde_json::to_value(&session_id_schema).unwrap(),
                    },
                ]
            })),
            error: None,
        }
    }

    async fn handle_call_tool(&self, id: Value, params: Option<Value>) -> JsonRpcResponse {
        let params = match params {
            Some(p) => p,
            None => {
                return JsonRpcResponse {
                    jsonrpc: "2.0".to_string(),
                    id,
                    result: None,
                    error: Some(JsonRpcError { code: -32602, message: "Missing params".to_string(), data: None }),
                };
            }
        };

        let tool_name = match params.get("name").and_then(|v| v.as_str()) {
            Some(name) => name,
            None => {
                return JsonRpcResponse {
                    jsonrpc: "2.0".to_string(),
                    id,
                    result: None,
                    error: Some(JsonRpcError { code: -32602, message: "Missing tool name".to_string(), data: None }),
                };
            }
        };

        let arguments = params.get("arguments").cloned().unwrap_or(json!({}));

        macro_rules! parse_args {
            ($ty:ty) => {
                match serde_json::from_value::<$ty>(arguments) {
                    Ok(args) => args,
                    Err(e) => return JsonRpcResponse { jsonrpc: "2.0".to_string(), id, result: None, error: Some(Self::parse_validation_error(tool_name, e)) },
                }
            };
        }

        let result = match tool_name {
            "oak_search" => handle_search(&self.tools, parse_args!(SearchArgs)).await,
            "oak_remember" => handle_remember(&self.tools, parse_args!(RememberArgs)).await,
            "oak_context" => handle_context(&self.tools, parse_args!(ContextArgs)).await,
            "oak_resolve_memory" => handle_resolve_memory(&self.tools, parse_args!(ResolveMemoryArgs)).await,
            "oak_sessions" => handle_sessions(&self.tools, parse_args!(SessionsArgs)).await,
            "oak_memories" => handle_memories(&self.tools, parse_args!(MemoriesArgs)).await,
            "oak_stats" => handle_stats(&self.tools).await,
            "oak_activity" => handle_activity(&self.tools, parse_args!(ActivityArgs)).await,
            "oak_archive_memories" => handle_archive_memories(&self.tools, parse_args!(ArchiveMemoriesArgs)).await,
            "oak_suggest_parent" => handle_suggest_parent(&self.tools, parse_args!(SuggestParentArgs)).await,
            "oak_dismiss_suggested_parent" => handle_dismiss_suggested_parent(&self.tools, parse_args!(SessionIdArgs)).await,
            "oak_reset_suggested_parent" => handle_reset_suggested_parent(&self.tools, parse_args!(SessionIdArgs)).await,
            _ => Err(format!("Unknown tool: {tool_name}")),
        };

        match result {
            Ok(content) => JsonRpcResponse {
                jsonrpc: "2.0".to_string(),
                id,
                result: Some(json!({
                    "content": [{"type": "text", "text": serde_json::to_string(&content).unwrap_or_else(|_| content.to_string())}]
                })),
                error: None,
            },
            Err(e) => JsonRpcResponse { jsonrpc: "2.0".to_string(), id, result: None, error: Some(JsonRpcError { code: -32603, message: e, data: None }) },
        }
    }
}

/// Runs the MCP server over stdio, one JSON-RPC request per line.
pub async fn run_server(tools: Tools) -> anyhow::Result<()> {
    let server = OakMcpServer::new(tools);
    let stdin = std::io::stdin();
    let mut stdout = std::io::stdout();
    let reader = BufReader::new(stdin);

    for line in reader.lines() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let request: JsonRpcRequest = match serde_json::from_str(trimmed) {
            Ok(req) => req,
            Err(e) => {
                let error_response = JsonRpcResponse {
                    jsonrpc: "2.0".to_string(),
                    id: Value::Number(serde_json::Number::from(-1)),
                    result: None,
                    error: Some(JsonRpcError { code: -32700, message: format!("Parse error: {e}"), data: None }),
                };
                writeln!(stdout, "{}", serde_json::to_string(&error_response)?)?;
                stdout.flush()?;
                continue;
            }
        };

        let response = server.handle_request(request).await;
        writeln!(stdout, "{}", serde_json::to_string(&response)?)?;
        stdout.flush()?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use oak_engine::RetrievalConfig;
    use oak_index::Database;
    use oak_providers::{EmbeddingChain, EmbeddingProvider, HashEmbeddingProvider};
    use oak_vector::VectorStore;
    use std::sync::{Arc, Mutex};

    fn server() -> OakMcpServer {
        let conn = Arc::new(Mutex::new(Database::open_in_memory().unwrap().into_conn()));
        let dir = tempfile::tempdir().unwrap();
        let chain = EmbeddingChain::new(vec![Box::new(HashEmbeddingProvider::new("test", 8)) as Box<dyn EmbeddingProvider>]);
        let vector_store = Arc::new(VectorStore::open(dir.into_path().as_path(), chain).unwrap());
        let tools = Tools::new(conn, vector_store, "m1").with_retrieval_config(RetrievalConfig::default());
        OakMcpServer::new(tools)
    }

    #[tokio::test]
    async fn tools_list_reports_all_twelve_tools() {
        let response = server().handle_list_tools(json!(1));
        let tools = response.result.unwrap();
        let names: Vec<&str> = tools["tools"].as_array().unwrap().iter().map(|t| t["name"].as_str().unwrap()).collect();
        assert_eq!(names.len(), 12);
        assert!(names.contains(&"oak_remember"));
        assert!(names.contains(&"oak_archive_memories"));
        assert!(names.contains(&"oak_suggest_parent"));
        assert!(names.contains(&"oak_dismiss_suggested_parent"));
        assert!(names.contains(&"oak_reset_suggested_parent"));
    }

    #[tokio::test]
    async fn unknown_method_returns_method_not_found() {
        let request = JsonRpcRequest { jsonrpc: "2.0".to_string(), id: Some(json!(1)), method: "bogus".to_string(), params: None };
        let response = server().handle_request(request).await;
        assert_eq!(response.error.unwrap().code, -32601);
    }

    #[tokio::test]
    async fn remember_then_search_round_trips_over_jsonrpc() {
        let server = server();
        let remember = JsonRpcRequest {
            jsonrpc: "2.0".to_string(),
            id: Some(json!(1)),
            method: "tools/call".to_string(),
            params: Some(json!({"name": "oak_remember", "arguments": {"observation": "watch out for X", "memory_type": "gotcha"}})),
        };
        let response = server.handle_request(remember).await;
        assert!(response.error.is_none(), "{:?}", response.error);

        let search = JsonRpcRequest {
            jsonrpc: "2.0".to_string(),
            id: Some(json!(2)),
            method: "tools/call".to_string(),
            params: Some(json!({"name": "oak_search", "arguments": {"query": "watch out for X", "search_type": "memory"}})),
        };
        let response = server.handle_request(search).await;
        let content = response.result.unwrap();
        let text = content["content"][0]["text"].as_str().unwrap();
        assert!(text.contains("watch out for X"));
    }

    #[tokio::test]
    async fn missing_required_field_reports_structured_error() {
        let server = server();
        let request = JsonRpcRequest {
            jsonrpc: "2.0".to_string(),
            id: Some(json!(1)),
            method: "tools/call".to_string(),
            params: Some(json!({"name": "oak_remember", "arguments": {"observation": "no type given"}})),
        };
        let response = server.handle_request(request).await;
        let error = response.error.unwrap();
        assert_eq!(error.code, -32602);
        assert_eq!(error.data.unwrap()["missing"][0], "memory_type");
    }
}
