//! The twelve tool-call operations an agent drives over MCP: search,
//! remember, context, resolve_memory, sessions, memories, stats,
//! activity, archive_memories, suggest_parent, dismiss_suggested_parent,
//! reset_suggested_parent. `Tools` is the stateful facade each handler
//! in `mcp::tools` is a thin wrapper around.

use std::sync::{Arc, Mutex};

use rusqlite::Connection;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use oak_engine::{RetrievalConfig, RetrievalEngine, SuggestedParent, TaskContextResult};
use oak_index::queries::{activities, observations, resolution, sessions, stats as stats_queries};
use oak_providers::LlmChain;
use oak_types::{Activity, MemoryType, ObservationStatus, ResolutionAction, ResolutionEvent, Session, StoredObservation, Timestamp};
use oak_vector::{CollectionStats, MemoryFilters, RecordKind, VectorRecord, VectorStore};

use crate::error::{Error, Result};

const SECONDS_PER_DAY: i64 = 86_400;
const STANDALONE_SESSION_ID: &str = "oak-sdk-standalone";

/// Owns the connections to both stores plus the machine identity used to
/// stamp anything this process writes (resolution events, standalone
/// observations). Cheap to clone: `Connection` and `VectorStore` are
/// already behind `Arc`/interior mutexes upstream.
pub struct Tools {
    conn: Arc<Mutex<Connection>>,
    vector_store: Arc<VectorStore>,
    retrieval_config: RetrievalConfig,
    machine_id: String,
    llm: Option<LlmChain>,
}

impl Tools {
    pub fn new(conn: Arc<Mutex<Connection>>, vector_store: Arc<VectorStore>, machine_id: impl Into<String>) -> Self {
        Self { conn, vector_store, retrieval_config: RetrievalConfig::default(), machine_id: machine_id.into(), llm: None }
    }

    pub fn with_retrieval_config(mut self, config: RetrievalConfig) -> Self {
        self.retrieval_config = config;
        self
    }

    /// Enables the LLM-refinement pass in [`Tools::suggest_parent`].
    /// Without it, suggestions still work off vector similarity and time
    /// gap alone.
    pub fn with_llm_chain(mut self, llm: LlmChain) -> Self {
        self.llm = Some(llm);
        self
    }

    fn engine(&self) -> RetrievalEngine<'_> {
        RetrievalEngine::new(&self.vector_store, self.retrieval_config.clone())
    }

    // ---------------------------------------------------------------- search

    pub async fn search(&self, args: SearchArgs) -> Result<SearchResult> {
        let limit = args.limit.unwrap_or(20).clamp(1, 100);
        let include_resolved = args.include_resolved.unwrap_or(false);
        let search_type = args.search_type.unwrap_or_default();

        let mut hits = Vec::new();

        if matches!(search_type, SearchType::All | SearchType::Code) {
            for hit in self.vector_store.search_code(&args.query, limit).await? {
                hits.push(SearchHit {
                    id: hit.record.id,
                    kind: "code".to_string(),
                    summary: preview(&hit.record.text, 200),
                    relevance: hit.relevance,
                    status: None,
                });
            }
        }

        if matches!(search_type, SearchType::All | SearchType::Memory) {
            let filters = MemoryFilters {
                exclude_kinds: vec![RecordKind::Plan],
                status: active_only_filter(include_resolved),
                ..Default::default()
            };
            for hit in self.vector_store.search_memory(&args.query, limit, &filters).await? {
                hits.push(memory_hit(hit, "memory"));
            }
        }

        if search_type == SearchType::Plans {
            let filters = MemoryFilters { kinds: vec![RecordKind::Plan], status: active_only_filter(include_resolved), ..Default::default() };
            for hit in self.vector_store.search_memory(&args.query, limit, &filters).await? {
                hits.push(memory_hit(hit, "plan"));
            }
        }

        if search_type == SearchType::Sessions {
            for hit in self.vector_store.search_session_summaries(&args.query, limit).await? {
                hits.push(memory_hit(hit, "session"));
            }
        }

        hits.sort_by(|a, b| b.relevance.total_cmp(&a.relevance));
        hits.truncate(limit);

        Ok(SearchResult { query: args.query, search_type, results: hits })
    }

    // -------------------------------------------------------------- remember

    pub async fn remember(&self, args: RememberArgs) -> Result<RememberResult> {
        let memory_type = MemoryType::parse(&args.memory_type).ok_or_else(|| Error::InvalidInput(format!("unknown memory_type: {}", args.memory_type)))?;
        let session_id = self.resolve_or_create_session(args.session_id.as_deref())?;

        let conn = self.conn.lock().unwrap();
        let digest = oak_types::sha256_hex(&args.observation);
        let id = format!("remember-{}", &digest[..16]);

        let mut observation = StoredObservation::new(id, session_id, args.observation, memory_type, args.importance.unwrap_or(5), self.machine_id.clone());
        observation.context = args.context;
        observations::store(&conn, &observation)?;

        let project_root = sessions::get(&conn, &observation.session_id)?.map(|s| s.project_root);
        drop(conn);

        let record = VectorRecord {
            id: observation.id.clone(),
            kind: RecordKind::Memory,
            text: observation.observation.clone(),
            metadata: serde_json::json!({"project_root": project_root, "memory_type": observation.memory_type.as_str(), "context": observation.context}),
            tags: observation.tags.clone(),
            status: Some(observation.status.as_str().to_string()),
            archived: false,
            created_at_epoch: observation.created_at.epoch(),
        };
        match observation.memory_type {
            MemoryType::SessionSummary => self.vector_store.add_session_summary(&record).await?,
            MemoryType::Plan => self.vector_store.add_plan(&record).await?,
            _ => self.vector_store.add_memory(&record).await?,
        }

        let conn = self.conn.lock().unwrap();
        observations::mark_embedded(&conn, std::slice::from_ref(&observation.id))?;

        Ok(RememberResult { id: observation.id, stored: true })
    }

    fn resolve_or_create_session(&self, session_id: Option<&str>) -> Result<String> {
        let conn = self.conn.lock().unwrap();
        let id = session_id.unwrap_or(STANDALONE_SESSION_ID);
        if sessions::get(&conn, id)?.is_none() {
            sessions::upsert(&conn, &Session::new(id, "oak-sdk", "", self.machine_id.clone()))?;
        }
        Ok(id.to_string())
    }

    // --------------------------------------------------------------- context

    pub async fn context(&self, args: ContextArgs) -> Result<TaskContextResult> {
        let task = match &args.current_files {
            Some(files) if !files.is_empty() => format!("{}\nRelevant files: {}", args.task, files.join(", ")),
            _ => args.task.clone(),
        };
        let mut result = self.engine().get_task_context(&task, args.max_tokens).await?;
        result.task = args.task;
        Ok(result)
    }

    // --------------------------------------------------------- resolve_memory

    pub fn resolve_memory(&self, args: ResolveMemoryArgs) -> Result<ResolveMemoryResult> {
        let conn = self.conn.lock().unwrap();
        if observations::get(&conn, &args.id)?.is_none() {
            return Err(Error::NotFound(format!("observation {} not found", args.id)));
        }

        let action = match args.status {
            ResolveStatus::Resolved => ResolutionAction::Resolved,
            ResolveStatus::Superseded => ResolutionAction::Superseded,
        };
        if let Some(reason) = &args.reason {
            tracing::info!(observation_id = %args.id, reason, "resolving memory");
        }

        let event = ResolutionEvent::new(uuid::Uuid::new_v4().to_string(), args.id.clone(), action, self.machine_id.clone());
        let applied = resolution::record_and_apply(&conn, &event)?;
        drop(conn);

        if applied {
            self.vector_store.set_status(&args.id, args.status.as_str())?;
        }

        Ok(ResolveMemoryResult { id: args.id, status: args.status.as_str().to_string(), applied })
    }

    // -------------------------------------------------------------- sessions

    pub fn sessions(&self, args: SessionsArgs) -> Result<Vec<Session>> {
        let limit = args.limit.unwrap_or(20).clamp(1, 200);
        let conn = self.conn.lock().unwrap();
        let mut sessions = sessions::list_recent(&conn, limit)?;
        if !args.include_summary.unwrap_or(true) {
            for session in &mut sessions {
                session.summary = None;
            }
        }
        Ok(sessions)
    }

    // -------------------------------------------------------------- memories

    pub fn memories(&self, args: MemoriesArgs) -> Result<Vec<StoredObservation>> {
        let limit = args.limit.unwrap_or(50).clamp(1, 500);
        let conn = self.conn.lock().unwrap();
        Ok(observations::list_filtered(&conn, args.memory_type.as_deref(), args.status.as_deref(), args.include_resolved.unwrap_or(false), limit)?)
    }

    // ----------------------------------------------------------------- stats

    pub fn stats(&self) -> Result<StatsResult> {
        let conn = self.conn.lock().unwrap();
        let relational = stats_queries::counts(&conn)?;
        drop(conn);
        let vector = self.vector_store.stats();
        Ok(StatsResult { relational, vector })
    }

    // -------------------------------------------------------------- activity

    pub fn activity(&self, args: ActivityArgs) -> Result<Vec<Activity>> {
        let limit = args.limit.unwrap_or(50).clamp(1, 500);
        let conn = self.conn.lock().unwrap();
        Ok(activities::list_for_session(&conn, &args.session_id, args.tool_name.as_deref(), limit)?)
    }

    // ------------------------------------------------------- archive_memories

    pub fn archive_memories(&self, args: ArchiveMemoriesArgs) -> Result<ArchiveMemoriesResult> {
        let dry_run = args.dry_run.unwrap_or(false);

        let ids = match args.ids {
            Some(ids) => ids,
            None => {
                let cutoff = args.older_than_days.map(|days| Timestamp::now().epoch() - days * SECONDS_PER_DAY);
                let filters = MemoryFilters { status: args.status_filter.clone(), ..Default::default() };
                self.vector_store
                    .list_memory(&filters)
                    .into_iter()
                    .filter(|record| cutoff.is_none_or(|cutoff| record.created_at_epoch <= cutoff))
                    .map(|record| record.id)
                    .collect()
            }
        };

        if !dry_run {
            self.vector_store.bulk_archive(&ids)?;
        }

        Ok(ArchiveMemoriesResult { archived: if dry_run { 0 } else { ids.len() }, candidates: ids.len(), ids, dry_run })
    }

    // ---------------------------------------------------------- suggest_parent

    pub async fn suggest_parent(&self, args: SuggestParentArgs) -> Result<SuggestParentResult> {
        let conn = self.conn.lock().unwrap();
        let suggestion = oak_engine::compute_suggested_parent(&conn, &self.vector_store, self.llm.as_ref(), &args.session_id).await?;
        Ok(SuggestParentResult { session_id: args.session_id, suggestion })
    }

    /// Dismisses the standing suggestion for a session. Idempotent:
    /// dismissing an already-dismissed or parentless session is a no-op.
    pub fn dismiss_suggested_parent(&self, args: SessionIdArgs) -> Result<DismissSuggestedParentResult> {
        let conn = self.conn.lock().unwrap();
        oak_engine::dismiss_suggestion(&conn, &args.session_id)?;
        Ok(DismissSuggestedParentResult { session_id: args.session_id, dismissed: true })
    }

    /// Clears a prior dismissal so the suggestion surfaces again next time
    /// it's computed.
    pub fn reset_suggested_parent(&self, args: SessionIdArgs) -> Result<DismissSuggestedParentResult> {
        let conn = self.conn.lock().unwrap();
        oak_engine::reset_suggestion_dismissal(&conn, &args.session_id)?;
        Ok(DismissSuggestedParentResult { session_id: args.session_id, dismissed: false })
    }
}

fn active_only_filter(include_resolved: bool) -> Option<String> {
    (!include_resolved).then(|| ObservationStatus::Active.as_str().to_string())
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

fn memory_hit(hit: oak_vector::SearchHit, kind: &str) -> SearchHit {
    SearchHit {
        id: hit.record.id,
        kind: kind.to_string(),
        summary: preview(&hit.record.text, 200),
        relevance: hit.relevance,
        status: hit.record.status,
    }
}

// -------------------------------------------------------------------- search

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum SearchType {
    #[default]
    All,
    Code,
    Memory,
    Plans,
    Sessions,
}

/// Layer-1 search across code chunks, memory observations, plans, and
/// session summaries.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct SearchArgs {
    pub query: String,
    /// One of `all`, `code`, `memory`, `plans`, `sessions`. Defaults to `all` (code + memory).
    #[serde(default)]
    pub search_type: Option<SearchType>,
    #[serde(default)]
    pub limit: Option<usize>,
    /// Include resolved/superseded observations. Ignored for `code` and `sessions`.
    #[serde(default)]
    pub include_resolved: Option<bool>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub id: String,
    pub kind: String,
    pub summary: String,
    pub relevance: f32,
    pub status: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SearchResult {
    pub query: String,
    pub search_type: SearchType,
    pub results: Vec<SearchHit>,
}

// ------------------------------------------------------------------ remember

/// Writes a durable observation extracted from the current session.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct RememberArgs {
    pub observation: String,
    /// One of `gotcha`, `bug_fix`, `decision`, `discovery`, `trade_off`, `session_summary`, `plan`.
    pub memory_type: String,
    #[serde(default)]
    pub context: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub importance: Option<u8>,
}

#[derive(Debug, Serialize)]
pub struct RememberResult {
    pub id: String,
    pub stored: bool,
}

// ------------------------------------------------------------------- context

/// Curated task context: code and memory results within a token budget.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct ContextArgs {
    pub task: String,
    #[serde(default)]
    pub current_files: Option<Vec<String>>,
    #[serde(default)]
    pub max_tokens: Option<usize>,
}

// ----------------------------------------------------------------- resolve

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ResolveStatus {
    Resolved,
    Superseded,
}

impl ResolveStatus {
    fn as_str(&self) -> &'static str {
        match self {
            ResolveStatus::Resolved => "resolved",
            ResolveStatus::Superseded => "superseded",
        }
    }
}

/// Marks an observation resolved or superseded, and emits a resolution
/// event other machines replay against their own copy.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct ResolveMemoryArgs {
    pub id: String,
    pub status: ResolveStatus,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ResolveMemoryResult {
    pub id: String,
    pub status: String,
    pub applied: bool,
}

// ------------------------------------------------------------------ sessions

/// Recent sessions, most recently started first.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct SessionsArgs {
    #[serde(default)]
    pub limit: Option<usize>,
    /// Include each session's stored summary text. Defaults to true.
    #[serde(default)]
    pub include_summary: Option<bool>,
}

// ------------------------------------------------------------------ memories

/// Browses observations by type/status.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct MemoriesArgs {
    #[serde(default)]
    pub memory_type: Option<String>,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub include_resolved: Option<bool>,
}

// --------------------------------------------------------------------- stats

#[derive(Debug, Serialize)]
pub struct StatsResult {
    pub relational: stats_queries::RelationalCounts,
    pub vector: CollectionStats,
}

// ------------------------------------------------------------------ activity

/// Raw tool-call activity for a session.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct ActivityArgs {
    pub session_id: String,
    #[serde(default)]
    pub tool_name: Option<String>,
    #[serde(default)]
    pub limit: Option<usize>,
}

// ---------------------------------------------------------- archive_memories

/// Bulk-archives memory records in the vector store. Never touches the
/// relational store's `embedded` flag.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct ArchiveMemoriesArgs {
    #[serde(default)]
    pub ids: Option<Vec<String>>,
    #[serde(default)]
    pub status_filter: Option<String>,
    #[serde(default)]
    pub older_than_days: Option<i64>,
    #[serde(default)]
    pub dry_run: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct ArchiveMemoriesResult {
    pub archived: usize,
    pub candidates: usize,
    pub ids: Vec<String>,
    pub dry_run: bool,
}

// ------------------------------------------------------------ suggest_parent

/// Proposes a parent session for a session the user never explicitly
/// linked, scored from vector similarity over session summaries, time
/// gap, and (if configured) an LLM refinement pass.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct SuggestParentArgs {
    pub session_id: String,
}

#[derive(Debug, Serialize)]
pub struct SuggestParentResult {
    pub session_id: String,
    pub suggestion: Option<SuggestedParent>,
}

/// Targets a session by id for `oak_dismiss_suggested_parent` /
/// `oak_reset_suggested_parent`.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct SessionIdArgs {
    pub session_id: String,
}

#[derive(Debug, Serialize)]
pub struct DismissSuggestedParentResult {
    pub session_id: String,
    pub dismissed: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use oak_index::Database;
    use oak_providers::{EmbeddingChain, EmbeddingProvider, HashEmbeddingProvider};

    fn tools() -> Tools {
        let conn = Arc::new(Mutex::new(Database::open_in_memory().unwrap().into_conn()));
        let dir = tempfile::tempdir().unwrap();
        let chain = EmbeddingChain::new(vec![Box::new(HashEmbeddingProvider::new("test", 8)) as Box<dyn EmbeddingProvider>]);
        let vector_store = Arc::new(VectorStore::open(dir.into_path().as_path(), chain).unwrap());
        Tools::new(conn, vector_store, "machine-1")
    }

    #[tokio::test]
    async fn remember_without_session_id_creates_standalone_session() {
        let tools = tools();
        let result = tools.remember(RememberArgs { observation: "watch out for X".to_string(), memory_type: "gotcha".to_string(), context: None, session_id: None, importance: None }).await.unwrap();
        assert!(result.stored);

        let conn = tools.conn.lock().unwrap();
        let session = sessions::get(&conn, STANDALONE_SESSION_ID).unwrap();
        assert!(session.is_some());
    }

    #[tokio::test]
    async fn remember_rejects_unknown_memory_type() {
        let tools = tools();
        let err = tools.remember(RememberArgs { observation: "x".to_string(), memory_type: "not_a_type".to_string(), context: None, session_id: None, importance: None }).await.unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[tokio::test]
    async fn search_finds_remembered_observation() {
        let tools = tools();
        tools.remember(RememberArgs { observation: "connection pool exhausts under load".to_string(), memory_type: "gotcha".to_string(), context: None, session_id: None, importance: None }).await.unwrap();

        let result = tools.search(SearchArgs { query: "connection pool exhausts under load".to_string(), search_type: Some(SearchType::Memory), limit: Some(5), include_resolved: None }).await.unwrap();
        assert_eq!(result.results.len(), 1);
        assert_eq!(result.results[0].kind, "memory");
    }

    #[tokio::test]
    async fn resolve_memory_excludes_from_default_search() {
        let tools = tools();
        let remembered = tools.remember(RememberArgs { observation: "stale workaround, fixed upstream".to_string(), memory_type: "gotcha".to_string(), context: None, session_id: None, importance: None }).await.unwrap();

        let resolved = tools.resolve_memory(ResolveMemoryArgs { id: remembered.id.clone(), status: ResolveStatus::Resolved, reason: Some("fixed upstream".to_string()) }).unwrap();
        assert!(resolved.applied);
        assert_eq!(resolved.status, "resolved");

        let result = tools.search(SearchArgs { query: "stale workaround".to_string(), search_type: Some(SearchType::Memory), limit: Some(5), include_resolved: None }).await.unwrap();
        assert!(result.results.is_empty());

        let result = tools.search(SearchArgs { query: "stale workaround".to_string(), search_type: Some(SearchType::Memory), limit: Some(5), include_resolved: Some(true) }).await.unwrap();
        assert_eq!(result.results.len(), 1);
    }

    #[test]
    fn resolve_memory_unknown_id_is_not_found() {
        let tools = tools();
        let err = tools.resolve_memory(ResolveMemoryArgs { id: "missing".to_string(), status: ResolveStatus::Resolved, reason: None }).unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn archive_memories_dry_run_does_not_archive() {
        let tools = tools();
        let remembered = tools.remember(RememberArgs { observation: "old note".to_string(), memory_type: "discovery".to_string(), context: None, session_id: None, importance: None }).await.unwrap();

        let dry = tools.archive_memories(ArchiveMemoriesArgs { ids: Some(vec![remembered.id.clone()]), status_filter: None, older_than_days: None, dry_run: Some(true) }).unwrap();
        assert_eq!(dry.archived, 0);
        assert_eq!(dry.candidates, 1);

        let real = tools.archive_memories(ArchiveMemoriesArgs { ids: Some(vec![remembered.id]), status_filter: None, older_than_days: None, dry_run: Some(false) }).unwrap();
        assert_eq!(real.archived, 1);
    }

    #[test]
    fn sessions_lists_recent_and_can_drop_summary() {
        let tools = tools();
        let conn = tools.conn.lock().unwrap();
        let mut session = Session::new("s1", "claude-code", "/repo", "machine-1");
        session.summary = Some("did some stuff".to_string());
        sessions::upsert(&conn, &session).unwrap();
        drop(conn);

        let with_summary = tools.sessions(SessionsArgs { limit: None, include_summary: Some(true) }).unwrap();
        assert_eq!(with_summary[0].summary.as_deref(), Some("did some stuff"));

        let without_summary = tools.sessions(SessionsArgs { limit: None, include_summary: Some(false) }).unwrap();
        assert_eq!(without_summary[0].summary, None);
    }

    #[test]
    fn stats_reports_relational_and_vector_counts() {
        let tools = tools();
        let conn = tools.conn.lock().unwrap();
        sessions::upsert(&conn, &Session::new("s1", "claude-code", "/repo", "machine-1")).unwrap();
        drop(conn);

        let stats = tools.stats().unwrap();
        assert_eq!(stats.relational.sessions, 1);
    }

    #[tokio::test]
    async fn suggest_parent_returns_none_without_a_session_summary() {
        let tools = tools();
        let conn = tools.conn.lock().unwrap();
        sessions::upsert(&conn, &Session::new("s1", "claude-code", "/repo", "machine-1")).unwrap();
        drop(conn);

        let result = tools.suggest_parent(SuggestParentArgs { session_id: "s1".to_string() }).await.unwrap();
        assert!(result.suggestion.is_none());
    }

    #[test]
    fn dismiss_suggested_parent_is_idempotent() {
        let tools = tools();
        let conn = tools.conn.lock().unwrap();
        sessions::upsert(&conn, &Session::new("s1", "claude-code", "/repo", "machine-1")).unwrap();
        drop(conn);

        let first = tools.dismiss_suggested_parent(SessionIdArgs { session_id: "s1".to_string() }).unwrap();
        assert!(first.dismissed);
        let second = tools.dismiss_suggested_parent(SessionIdArgs { session_id: "s1".to_string() }).unwrap();
        assert!(second.dismissed);

        let reset = tools.reset_suggested_parent(SessionIdArgs { session_id: "s1".to_string() }).unwrap();
        assert!(!reset.dismissed);
    }
}
