//! Three-layer progressive disclosure over the vector store: an agent
//! sees compact index-level summaries first, then asks for context on
//! the items it cares about, then fetches full content for specific ids.

use serde::Serialize;

use oak_vector::{MemoryFilters, VectorRecord, VectorStore};

use crate::error::Result;

#[derive(Debug, Clone)]
pub struct RetrievalConfig {
    pub default_limit: usize,
    pub max_context_tokens: usize,
    pub relevance_threshold: f32,
    pub preview_length: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self { default_limit: 20, max_context_tokens: 2_000, relevance_threshold: 0.3, preview_length: 200 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchScope {
    All,
    Code,
    Memory,
}

#[derive(Debug, Clone, Serialize)]
pub struct IndexEntry {
    pub id: String,
    pub kind: String,
    pub name: String,
    pub filepath: String,
    pub lines: String,
    pub tokens: usize,
    pub relevance: f32,
}

#[derive(Debug, Clone, Serialize)]
pub struct MemoryIndexEntry {
    pub id: String,
    pub kind: String,
    pub summary: String,
    pub tokens: usize,
    pub relevance: f32,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct IndexResult {
    pub query: String,
    pub code: Vec<IndexEntry>,
    pub memory: Vec<MemoryIndexEntry>,
    pub total_tokens_available: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ContextChunk {
    pub id: String,
    pub kind: String,
    pub name: String,
    pub filepath: String,
    pub preview: String,
    pub tokens: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct RelatedEntry {
    pub id: String,
    pub kind: String,
    pub name: String,
    pub filepath: String,
    pub relevance: f32,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ContextResult {
    pub chunks: Vec<ContextChunk>,
    pub related: Vec<RelatedEntry>,
    pub total_tokens: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct FullItem {
    pub id: String,
    pub kind: String,
    pub filepath: Option<String>,
    pub name: Option<String>,
    pub start_line: Option<i64>,
    pub end_line: Option<i64>,
    pub language: Option<String>,
    pub context: Option<String>,
    pub content: String,
    pub tokens: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct FullResult {
    pub items: Vec<FullItem>,
    pub total_tokens: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct CodeContextItem {
    pub filepath: String,
    pub name: String,
    pub kind: String,
    pub lines: String,
    pub content: String,
    pub relevance: f32,
}

#[derive(Debug, Clone, Serialize)]
pub struct MemoryContextItem {
    pub kind: String,
    pub observation: String,
    pub context: Option<String>,
    pub relevance: f32,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct TaskContextResult {
    pub task: String,
    pub code_context: Vec<CodeContextItem>,
    pub memory_context: Vec<MemoryContextItem>,
    pub total_tokens: usize,
}

/// `chars / 4`, the same rough heuristic used to budget LLM output
/// tokens from a rendered context size.
pub fn token_estimate(text: &str) -> usize {
    text.chars().count() / 4
}

pub struct RetrievalEngine<'a> {
    store: &'a VectorStore,
    config: RetrievalConfig,
}

impl<'a> RetrievalEngine<'a> {
    pub fn new(store: &'a VectorStore, config: RetrievalConfig) -> Self {
        Self { store, config }
    }

    /// Layer 1: compact summaries only, enough for an agent to decide
    /// what's worth expanding.
    pub async fn search_index(&self, query: &str, scope: SearchScope, limit: Option<usize>) -> Result<IndexResult> {
        let limit = limit.unwrap_or(self.config.default_limit);
        let mut result = IndexResult { query: query.to_string(), ..Default::default() };

        if matches!(scope, SearchScope::All | SearchScope::Code) {
            for hit in self.store.search_code(query, limit).await? {
                if hit.relevance < self.config.relevance_threshold {
                    continue;
                }
                let tokens = token_estimate(&hit.record.text);
                result.code.push(IndexEntry {
                    id: hit.record.id.clone(),
                    kind: meta_str(&hit.record, "chunk_type", "unknown"),
                    name: meta_str(&hit.record, "name", ""),
                    filepath: meta_str(&hit.record, "filepath", ""),
                    lines: format!("{}-{}", meta_i64(&hit.record, "start_line"), meta_i64(&hit.record, "end_line")),
                    tokens,
                    relevance: round2(hit.relevance),
                });
                result.total_tokens_available += tokens;
            }
        }

        if matches!(scope, SearchScope::All | SearchScope::Memory) {
            for hit in self.store.search_memory(query, limit, &MemoryFilters::default()).await? {
                if hit.relevance < self.config.relevance_threshold {
                    continue;
                }
                let tokens = token_estimate(&hit.record.text);
                result.memory.push(MemoryIndexEntry {
                    id: hit.record.id.clone(),
                    kind: meta_str(&hit.record, "memory_type", "unknown"),
                    summary: preview(&hit.record.text, 100),
                    tokens,
                    relevance: round2(hit.relevance),
                });
                result.total_tokens_available += tokens;
            }
        }

        Ok(result)
    }

    /// Layer 2: the requested chunks, plus up to 5 related code items
    /// found by searching on the first code chunk's own content.
    pub async fn get_context(&self, chunk_ids: &[String]) -> Result<ContextResult> {
        let mut result = ContextResult::default();
        let mut first_code_text: Option<String> = None;

        for id in chunk_ids {
            if let Some(record) = self.store.get_code(id) {
                let tokens = token_estimate(&record.text);
                if first_code_text.is_none() {
                    first_code_text = Some(record.text.clone());
                }
                result.chunks.push(ContextChunk {
                    id: record.id.clone(),
                    kind: "code".to_string(),
                    name: meta_str(&record, "name", ""),
                    filepath: meta_str(&record, "filepath", ""),
                    preview: preview(&record.text, self.config.preview_length),
                    tokens,
                });
                result.total_tokens += tokens;
            } else if let Some(record) = self.store.get_memory_record(id) {
                let tokens = token_estimate(&record.text);
                result.chunks.push(ContextChunk {
                    id: record.id.clone(),
                    kind: "memory".to_string(),
                    name: meta_str(&record, "memory_type", ""),
                    filepath: String::new(),
                    preview: preview(&record.text, self.config.preview_length),
                    tokens,
                });
                result.total_tokens += tokens;
            }
        }

        if let Some(text) = first_code_text {
            let sample: String = text.chars().take(500).collect();
            for hit in self.store.search_code(&sample, 5).await? {
                if chunk_ids.iter().any(|id| id == &hit.record.id) {
                    continue;
                }
                result.related.push(RelatedEntry {
                    id: hit.record.id.clone(),
                    kind: meta_str(&hit.record, "chunk_type", ""),
                    name: meta_str(&hit.record, "name", ""),
                    filepath: meta_str(&hit.record, "filepath", ""),
                    relevance: round2(hit.relevance),
                });
            }
        }

        Ok(result)
    }

    /// Layer 3: full content for specific ids, tried against both
    /// collections.
    pub async fn fetch_full(&self, ids: &[String]) -> Result<FullResult> {
        let mut result = FullResult::default();
        for id in ids {
            if let Some(record) = self.store.get_code(id) {
                let tokens = token_estimate(&record.text);
                result.items.push(FullItem {
                    id: record.id.clone(),
                    kind: "code".to_string(),
                    filepath: Some(meta_str(&record, "filepath", "")),
                    name: Some(meta_str(&record, "name", "")),
                    start_line: meta_i64_opt(&record, "start_line"),
                    end_line: meta_i64_opt(&record, "end_line"),
                    language: record.metadata.get("language").and_then(|v| v.as_str()).map(String::from),
                    context: None,
                    content: record.text.clone(),
                    tokens,
                });
                result.total_tokens += tokens;
            } else if let Some(record) = self.store.get_memory_record(id) {
                let tokens = token_estimate(&record.text);
                result.items.push(FullItem {
                    id: record.id.clone(),
                    kind: "memory".to_string(),
                    filepath: None,
                    name: Some(meta_str(&record, "memory_type", "")),
                    start_line: None,
                    end_line: None,
                    language: None,
                    context: record.metadata.get("context").and_then(|v| v.as_str()).map(String::from),
                    content: record.text.clone(),
                    tokens,
                });
                result.total_tokens += tokens;
            }
        }
        Ok(result)
    }

    /// Curated context for a task: 70% of the token budget for code,
    /// 30% for memory, greedily filled in relevance order.
    pub async fn get_task_context(&self, task: &str, max_tokens: Option<usize>) -> Result<TaskContextResult> {
        let max_tokens = max_tokens.unwrap_or(self.config.max_context_tokens);
        let code_budget = (max_tokens as f64 * 0.7) as usize;
        let mut result = TaskContextResult { task: task.to_string(), ..Default::default() };

        for hit in self.store.search_code(task, 10).await? {
            if hit.relevance < self.config.relevance_threshold {
                continue;
            }
            let tokens = token_estimate(&hit.record.text);
            if result.total_tokens + tokens > code_budget {
                break;
            }
            result.code_context.push(CodeContextItem {
                filepath: meta_str(&hit.record, "filepath", ""),
                name: meta_str(&hit.record, "name", ""),
                kind: meta_str(&hit.record, "chunk_type", ""),
                lines: format!("{}-{}", meta_i64(&hit.record, "start_line"), meta_i64(&hit.record, "end_line")),
                content: hit.record.text.clone(),
                relevance: round2(hit.relevance),
            });
            result.total_tokens += tokens;
        }

        for hit in self.store.search_memory(task, 5, &MemoryFilters::default()).await? {
            if hit.relevance < self.config.relevance_threshold {
                continue;
            }
            let tokens = token_estimate(&hit.record.text);
            if result.total_tokens + tokens > max_tokens {
                break;
            }
            result.memory_context.push(MemoryContextItem {
                kind: meta_str(&hit.record, "memory_type", ""),
                observation: hit.record.text.clone(),
                context: hit.record.metadata.get("context").and_then(|v| v.as_str()).map(String::from),
                relevance: round2(hit.relevance),
            });
            result.total_tokens += tokens;
        }

        Ok(result)
    }
}

fn meta_str(record: &VectorRecord, key: &str, default: &str) -> String {
    record.metadata.get(key).and_then(|v| v.as_str()).unwrap_or(default).to_string()
}

fn meta_i64(record: &VectorRecord, key: &str) -> i64 {
    record.metadata.get(key).and_then(|v| v.as_i64()).unwrap_or(0)
}

fn meta_i64_opt(record: &VectorRecord, key: &str) -> Option<i64> {
    record.metadata.get(key).and_then(|v| v.as_i64())
}

fn preview(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let mut truncated: String = text.chars().take(max_chars).collect();
        truncated.push_str("...");
        truncated
    }
}

fn round2(value: f32) -> f32 {
    (value * 100.0).round() / 100.0
}
