//! MCP (Model Context Protocol) server: lets an agent query and write to
//! oak-ci's stores over JSON-RPC via stdio, one method per tool.

mod server;
mod tools;

pub use server::{OakMcpServer, run_server};
