use std::path::{Path, PathBuf};
use std::sync::Mutex;

use oak_providers::EmbeddingChain;
use serde::Serialize;

use crate::collection::{Collection, RecordKind, SearchHit, VectorRecord};
use crate::error::Result;

const DEFAULT_DIMENSION: usize = 384;
const SECONDS_PER_DAY: i64 = 86_400;

#[derive(Debug, Clone, Copy)]
pub enum CollectionKind {
    Code,
    Memory,
    SessionSummaries,
}

impl CollectionKind {
    fn dir_name(self) -> &'static str {
        match self {
            CollectionKind::Code => "oak_code",
            CollectionKind::Memory => "oak_memory",
            CollectionKind::SessionSummaries => "oak_session_summaries",
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct MemoryFilters {
    pub kinds: Vec<RecordKind>,
    pub exclude_kinds: Vec<RecordKind>,
    pub tag: Option<String>,
    pub status: Option<String>,
    pub include_archived: bool,
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct CollectionStats {
    pub code: usize,
    pub memory: usize,
    pub session_summaries: usize,
}

/// Owns the three named HNSW collections (`oak_code`, `oak_memory`,
/// `oak_session_summaries`) and the embedding chain used to populate
/// them. Every public method re-derives the collection's expected
/// dimensionality from the chain so a provider swap is picked up
/// transparently on the next write.
pub struct VectorStore {
    base_dir: PathBuf,
    embeddings: Mutex<EmbeddingChain>,
    code: Mutex<Collection>,
    memory: Mutex<Collection>,
    session_summaries: Mutex<Collection>,
}

impl VectorStore {
    pub fn open(base_dir: &Path, embeddings: EmbeddingChain) -> Result<Self> {
        let dimension = embeddings.current_dimension().unwrap_or(DEFAULT_DIMENSION);
        let code = Collection::open_or_create(&base_dir.join(CollectionKind::Code.dir_name()), dimension)?;
        let memory = Collection::open_or_create(&base_dir.join(CollectionKind::Memory.dir_name()), dimension)?;
        let session_summaries =
            Collection::open_or_create(&base_dir.join(CollectionKind::SessionSummaries.dir_name()), dimension)?;
        Ok(Self {
            base_dir: base_dir.to_path_buf(),
            embeddings: Mutex::new(embeddings),
            code: Mutex::new(code),
            memory: Mutex::new(memory),
            session_summaries: Mutex::new(session_summaries),
        })
    }

    /// Swaps the embedding chain. If the new primary provider's
    /// dimensionality differs from the one collections were built with,
    /// every collection is cleared and rebuilt empty.
    pub fn update_embedding_provider(&self, embeddings: EmbeddingChain) -> Result<()> {
        let new_dimension = embeddings.current_dimension().unwrap_or(DEFAULT_DIMENSION);
        let old_dimension = self.code.lock().unwrap().dimension();
        *self.embeddings.lock().unwrap() = embeddings;
        if new_dimension != old_dimension {
            self.code.lock().unwrap().ensure_dimension(new_dimension)?;
            self.memory.lock().unwrap().ensure_dimension(new_dimension)?;
            self.session_summaries.lock().unwrap().ensure_dimension(new_dimension)?;
        }
        Ok(())
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let chain = {
            // Cloning the chain isn't possible (it owns trait objects), so
            // the lock is held only long enough to get a reference out via
            // a scoped call below instead.
            self.embeddings.lock().unwrap()
        };
        let (_, vector) = chain.embed(text).await?;
        Ok(vector)
    }

    pub async fn add_code_chunks_batched(
        &self,
        chunks: &[VectorRecord],
        batch_size: usize,
        mut progress: impl FnMut(usize, usize),
    ) -> Result<usize> {
        let mut seen = std::collections::HashSet::new();
        let deduped: Vec<&VectorRecord> = chunks.iter().filter(|c| seen.insert(c.id.clone())).collect();
        let total = deduped.len();
        let mut written = 0;
        for batch in deduped.chunks(batch_size.max(1)) {
            for chunk in batch {
                let vector = self.embed(&chunk.text).await?;
                self.code.lock().unwrap().upsert(&chunk.id, &vector, chunk_with_kind(chunk, RecordKind::CodeChunk))?;
                written += 1;
            }
            progress(written, total);
        }
        Ok(written)
    }

    pub async fn add_memory(&self, record: &VectorRecord) -> Result<()> {
        let vector = self.embed(&record.text).await?;
        self.memory.lock().unwrap().upsert(&record.id, &vector, chunk_with_kind(record, RecordKind::Memory))
    }

    pub async fn add_plan(&self, record: &VectorRecord) -> Result<()> {
        let vector = self.embed(&record.text).await?;
        self.memory.lock().unwrap().upsert(&record.id, &vector, chunk_with_kind(record, RecordKind::Plan))
    }

    /// Writes a session summary into its own collection, keyed by session
    /// id rather than observation id, so `find_similar_sessions` has
    /// something to search.
    pub async fn add_session_summary(&self, record: &VectorRecord) -> Result<()> {
        let vector = self.embed(&record.text).await?;
        self.session_summaries.lock().unwrap().upsert(&record.id, &vector, chunk_with_kind(record, RecordKind::SessionSummary))
    }

    pub async fn search_code(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>> {
        let vector = self.embed(query).await?;
        self.code.lock().unwrap().search(&vector, limit)
    }

    pub async fn search_memory(&self, query: &str, limit: usize, filters: &MemoryFilters) -> Result<Vec<SearchHit>> {
        let vector = self.embed(query).await?;
        let hits = self.memory.lock().unwrap().search(&vector, limit.max(1) * 4)?;
        Ok(hits
            .into_iter()
            .filter(|hit| matches_filters(&hit.record, filters))
            .take(limit)
            .collect())
    }

    pub async fn find_similar_sessions(
        &self,
        query_text: &str,
        project_root: &str,
        exclude_session_id: Option<&str>,
        limit: usize,
        max_age_days: i64,
        now_epoch: i64,
    ) -> Result<Vec<(String, f32)>> {
        let vector = self.embed(query_text).await?;
        let hits = self.session_summaries.lock().unwrap().search(&vector, limit.max(1) * 4)?;
        let cutoff = now_epoch - max_age_days * SECONDS_PER_DAY;
        Ok(hits
            .into_iter()
            .filter(|hit| hit.record.metadata.get("project_root").and_then(|v| v.as_str()) == Some(project_root))
            .filter(|hit| exclude_session_id.is_none_or(|id| hit.record.id != id))
            .filter(|hit| hit.record.created_at_epoch >= cutoff)
            .take(limit)
            .map(|hit| (hit.record.id, hit.relevance))
            .collect())
    }

    /// Searches the session-summaries collection directly by text, for
    /// tool-call surfaces that want session search without the
    /// project/age filtering `find_similar_sessions` applies.
    pub async fn search_session_summaries(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>> {
        let vector = self.embed(query).await?;
        self.session_summaries.lock().unwrap().search(&vector, limit)
    }

    /// Fetches a single record from the code collection by id, for the
    /// retrieval engine's context/fetch layers.
    pub fn get_code(&self, id: &str) -> Option<VectorRecord> {
        self.code.lock().unwrap().get(id).cloned()
    }

    /// Fetches a single record from the memory collection by id.
    pub fn get_memory_record(&self, id: &str) -> Option<VectorRecord> {
        self.memory.lock().unwrap().get(id).cloned()
    }

    pub fn archive(&self, id: &str) -> Result<()> {
        self.mutate_memory_record(id, |record| record.archived = true)
    }

    /// Mirrors an RS status change onto the memory record's metadata, so
    /// search results can be filtered by status without a join back to
    /// the relational store.
    pub fn set_status(&self, id: &str, status: &str) -> Result<()> {
        self.mutate_memory_record(id, |record| record.status = Some(status.to_string()))
    }

    pub fn bulk_archive(&self, ids: &[String]) -> Result<()> {
        for id in ids {
            self.archive(id)?;
        }
        Ok(())
    }

    pub fn add_tag(&self, id: &str, tag: &str) -> Result<()> {
        self.mutate_memory_record(id, |record| {
            if !record.tags.iter().any(|t| t == tag) {
                record.tags.push(tag.to_string());
            }
        })
    }

    pub fn remove_tag(&self, id: &str, tag: &str) -> Result<()> {
        self.mutate_memory_record(id, |record| record.tags.retain(|t| t != tag))
    }

    fn mutate_memory_record(&self, id: &str, f: impl FnOnce(&mut VectorRecord)) -> Result<()> {
        let mut memory = self.memory.lock().unwrap();
        if let Some(record) = memory.get(id).cloned() {
            let mut updated = record;
            f(&mut updated);
            // Re-embedding on a metadata-only change would be wasteful and
            // the vector hasn't changed, so the collection's upsert is
            // called with a zero-length skip guard instead: fetch the
            // existing vector is not exposed by usearch, so tag/status/
            // archive edits go through a lighter path that only rewrites
            // the sidecar, not the index.
            memory.overwrite_metadata(id, updated)?;
        }
        Ok(())
    }

    pub fn list_memory(&self, filters: &MemoryFilters) -> Vec<VectorRecord> {
        self.memory.lock().unwrap().list(|record| matches_filters(record, filters))
    }

    pub fn stats(&self) -> CollectionStats {
        CollectionStats {
            code: self.code.lock().unwrap().count(),
            memory: self.memory.lock().unwrap().count(),
            session_summaries: self.session_summaries.lock().unwrap().count(),
        }
    }

    pub fn clear_code_only(&self) -> Result<()> {
        self.code.lock().unwrap().clear()
    }

    pub fn clear_all(&self) -> Result<()> {
        self.code.lock().unwrap().clear()?;
        self.memory.lock().unwrap().clear()?;
        self.session_summaries.lock().unwrap().clear()
    }

    pub fn hard_reset(&self) -> Result<()> {
        self.code.lock().unwrap().hard_reset()?;
        self.memory.lock().unwrap().hard_reset()?;
        self.session_summaries.lock().unwrap().hard_reset()
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }
}

fn chunk_with_kind(record: &VectorRecord, kind: RecordKind) -> VectorRecord {
    let mut record = record.clone();
    record.kind = kind;
    record
}

fn matches_filters(record: &VectorRecord, filters: &MemoryFilters) -> bool {
    if !filters.include_archived && record.archived {
        return false;
    }
    if !filters.kinds.is_empty() && !filters.kinds.contains(&record.kind) {
        return false;
    }
    if filters.exclude_kinds.contains(&record.kind) {
        return false;
    }
    if let Some(tag) = &filters.tag {
        if !record.tags.iter().any(|t| t == tag) {
            return false;
        }
    }
    if let Some(status) = &filters.status {
        if record.status.as_deref() != Some(status.as_str()) {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use oak_providers::{EmbeddingProvider, HashEmbeddingProvider};

    fn chain(dimension: usize) -> EmbeddingChain {
        EmbeddingChain::new(vec![Box::new(HashEmbeddingProvider::new("test", dimension)) as Box<dyn EmbeddingProvider>])
    }

    fn record(id: &str, text: &str) -> VectorRecord {
        VectorRecord {
            id: id.to_string(),
            kind: RecordKind::Memory,
            text: text.to_string(),
            metadata: serde_json::json!({}),
            tags: Vec::new(),
            status: Some("active".to_string()),
            archived: false,
            created_at_epoch: 0,
        }
    }

    #[tokio::test]
    async fn add_memory_then_search_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = VectorStore::open(dir.path(), chain(8)).unwrap();
        store.add_memory(&record("m1", "watch out for off-by-one errors")).await.unwrap();
        let hits = store.search_memory("watch out for off-by-one errors", 5, &MemoryFilters::default()).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].record.id, "m1");
    }

    #[tokio::test]
    async fn archived_records_excluded_by_default() {
        let dir = tempfile::tempdir().unwrap();
        let store = VectorStore::open(dir.path(), chain(8)).unwrap();
        store.add_memory(&record("m1", "some gotcha")).await.unwrap();
        store.archive("m1").unwrap();
        let hits = store.search_memory("some gotcha", 5, &MemoryFilters::default()).await.unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn stats_reflect_each_collection() {
        let dir = tempfile::tempdir().unwrap();
        let store = VectorStore::open(dir.path(), chain(8)).unwrap();
        store.add_memory(&record("m1", "text")).await.unwrap();
        let stats = store.stats();
        assert_eq!(stats.memory, 1);
        assert_eq!(stats.code, 0);
    }
}
