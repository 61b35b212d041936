use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use usearch::{Index, IndexOptions, MetricKind, ScalarKind};

use crate::error::{Error, Result};

const CONSTRUCTION_EF: usize = 200;
const CONNECTIVITY: usize = 16;
const SEARCH_EF: usize = 64;
const INITIAL_CAPACITY: usize = 256;

/// What kind of thing a record projects from the relational store.
/// `Plan` is stored in the memory collection alongside observations,
/// distinguished only by this tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    CodeChunk,
    Memory,
    Plan,
    SessionSummary,
}

/// A record stored alongside its embedding. `usearch` only stores the
/// vector and an integer key, so everything id/content/metadata-shaped
/// lives in this sidecar instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorRecord {
    pub id: String,
    pub kind: RecordKind,
    pub text: String,
    pub metadata: serde_json::Value,
    pub tags: Vec<String>,
    pub status: Option<String>,
    pub archived: bool,
    pub created_at_epoch: i64,
}

#[derive(Debug, Clone)]
pub struct SearchHit {
    pub record: VectorRecord,
    pub relevance: f32,
}

fn key_for(id: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    id.hash(&mut hasher);
    hasher.finish()
}

/// One named HNSW collection: an on-disk index file plus a JSON sidecar
/// of `id -> VectorRecord`. Every operation reopens lazily and treats a
/// missing or corrupt index as empty rather than failing, so a
/// concurrently deleted collection directory never poisons the caller.
pub struct Collection {
    dir: PathBuf,
    dimension: usize,
    index: Index,
    records: HashMap<String, VectorRecord>,
}

impl Collection {
    pub fn open_or_create(dir: &Path, dimension: usize) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        let records = load_sidecar(&sidecar_path(dir)).unwrap_or_default();
        let index = open_index(dir, dimension).unwrap_or_else(|_| new_index(dimension));
        let mut collection = Self { dir: dir.to_path_buf(), dimension, index, records };
        collection.ensure_dimension(dimension)?;
        Ok(collection)
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Recreates the collection from scratch if `dimension` doesn't match
    /// the one the index was built with. Called at startup (peeking one
    /// sample) and whenever an upsert detects a mismatch.
    pub fn ensure_dimension(&mut self, dimension: usize) -> Result<()> {
        if dimension == self.dimension && self.index.dimensions() == dimension {
            return Ok(());
        }
        tracing::info!(old = self.dimension, new = dimension, "recreating vector collection for new embedding dimensionality");
        self.dimension = dimension;
        self.index = new_index(dimension);
        self.records.clear();
        self.persist()
    }

    pub fn upsert(&mut self, id: &str, vector: &[f32], record: VectorRecord) -> Result<()> {
        if vector.len() != self.dimension {
            self.ensure_dimension(vector.len())?;
        }
        let key = key_for(id);
        if self.index.contains(key) {
            self.index.remove(key).map_err(|e| Error::Index(e.to_string()))?;
        }
        if self.index.size() >= self.index.capacity() {
            self.index.reserve(self.index.capacity() + INITIAL_CAPACITY).map_err(|e| Error::Index(e.to_string()))?;
        }
        self.index.add(key, vector).map_err(|e| Error::Index(e.to_string()))?;
        self.records.insert(id.to_string(), record);
        self.persist()
    }

    /// Replaces a record's sidecar metadata in place without touching its
    /// vector. Used for tag/status/archive edits, which don't change what
    /// the embedding represents.
    pub fn overwrite_metadata(&mut self, id: &str, record: VectorRecord) -> Result<()> {
        if self.records.contains_key(id) {
            self.records.insert(id.to_string(), record);
            self.persist()?;
        }
        Ok(())
    }

    pub fn remove(&mut self, id: &str) -> Result<()> {
        let key = key_for(id);
        let _ = self.index.remove(key);
        self.records.remove(id);
        self.persist()
    }

    pub fn get(&self, id: &str) -> Option<&VectorRecord> {
        self.records.get(id)
    }

    pub fn search(&self, query: &[f32], limit: usize) -> Result<Vec<SearchHit>> {
        if query.len() != self.dimension || self.index.size() == 0 {
            return Ok(Vec::new());
        }
        let matches = self.index.search(query, limit).map_err(|e| Error::Index(e.to_string()))?;
        let mut hits = Vec::with_capacity(matches.keys.len());
        for (key, distance) in matches.keys.iter().zip(matches.distances.iter()) {
            if let Some(record) = self.find_by_key(*key) {
                let relevance = (1.0 - distance).clamp(0.0, 1.0);
                hits.push(SearchHit { record: record.clone(), relevance });
            }
        }
        Ok(hits)
    }

    fn find_by_key(&self, key: u64) -> Option<&VectorRecord> {
        self.records.values().find(|r| key_for(&r.id) == key)
    }

    pub fn list(&self, predicate: impl Fn(&VectorRecord) -> bool) -> Vec<VectorRecord> {
        self.records.values().filter(|r| predicate(r)).cloned().collect()
    }

    pub fn count(&self) -> usize {
        self.records.len()
    }

    pub fn clear(&mut self) -> Result<()> {
        self.index = new_index(self.dimension);
        self.records.clear();
        self.persist()
    }

    pub fn hard_reset(&mut self) -> Result<()> {
        let _ = std::fs::remove_dir_all(&self.dir);
        std::fs::create_dir_all(&self.dir)?;
        self.index = new_index(self.dimension);
        self.records.clear();
        Ok(())
    }

    fn persist(&self) -> Result<()> {
        let _ = self.index.save(index_path(&self.dir).to_string_lossy().as_ref());
        let json = serde_json::to_string_pretty(&self.records)?;
        std::fs::write(sidecar_path(&self.dir), json)?;
        Ok(())
    }
}

fn new_index(dimension: usize) -> Index {
    let options = IndexOptions {
        dimensions: dimension,
        metric: MetricKind::Cos,
        quantization: ScalarKind::F32,
        connectivity: CONNECTIVITY,
        expansion_add: CONSTRUCTION_EF,
        expansion_search: SEARCH_EF,
        multi: false,
    };
    let index = Index::new(&options).expect("usearch index options are always valid here");
    let _ = index.reserve(INITIAL_CAPACITY);
    index
}

fn open_index(dir: &Path, dimension: usize) -> Result<Index> {
    let path = index_path(dir);
    if !path.exists() {
        return Err(Error::Index("no index file on disk".to_string()));
    }
    let index = new_index(dimension);
    index.load(path.to_string_lossy().as_ref()).map_err(|e| Error::Index(e.to_string()))?;
    Ok(index)
}

fn load_sidecar(path: &Path) -> Result<HashMap<String, VectorRecord>> {
    let bytes = std::fs::read(path)?;
    Ok(serde_json::from_slice(&bytes)?)
}

fn index_path(dir: &Path) -> PathBuf {
    dir.join("index.usearch")
}

fn sidecar_path(dir: &Path) -> PathBuf {
    dir.join("metadata.json")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str) -> VectorRecord {
        VectorRecord {
            id: id.to_string(),
            kind: RecordKind::Memory,
            text: "hello world".to_string(),
            metadata: serde_json::json!({}),
            tags: Vec::new(),
            status: None,
            archived: false,
            created_at_epoch: 0,
        }
    }

    #[test]
    fn upsert_then_search_finds_itself() {
        let dir = tempfile::tempdir().unwrap();
        let mut collection = Collection::open_or_create(dir.path(), 3).unwrap();
        collection.upsert("a", &[1.0, 0.0, 0.0], record("a")).unwrap();
        let hits = collection.search(&[1.0, 0.0, 0.0], 5).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].record.id, "a");
    }

    #[test]
    fn dimension_mismatch_recreates_collection() {
        let dir = tempfile::tempdir().unwrap();
        let mut collection = Collection::open_or_create(dir.path(), 3).unwrap();
        collection.upsert("a", &[1.0, 0.0, 0.0], record("a")).unwrap();
        assert_eq!(collection.count(), 1);
        collection.upsert("b", &[1.0, 0.0], record("b")).unwrap();
        assert_eq!(collection.dimension(), 2);
        assert_eq!(collection.count(), 1);
    }

    #[test]
    fn reopen_after_persist_round_trips_records() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut collection = Collection::open_or_create(dir.path(), 3).unwrap();
            collection.upsert("a", &[1.0, 0.0, 0.0], record("a")).unwrap();
        }
        let reopened = Collection::open_or_create(dir.path(), 3).unwrap();
        assert_eq!(reopened.count(), 1);
        assert!(reopened.get("a").is_some());
    }

    #[test]
    fn missing_index_file_is_treated_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let collection = Collection::open_or_create(dir.path(), 3).unwrap();
        assert_eq!(collection.count(), 0);
    }
}
