//! `TestWorld` pattern for declarative integration test setup: an isolated
//! temp workspace with its own database and vector store, seeded through
//! the [`crate::fixtures`] builders rather than hand-written SQL.

use std::sync::{Arc, Mutex};

use anyhow::Result;
use oak_index::Database;
use oak_providers::{EmbeddingChain, EmbeddingProvider, HashEmbeddingProvider};
use oak_sdk::Tools;
use oak_types::{Activity, Session, StoredObservation};
use oak_vector::VectorStore;
use rusqlite::Connection;
use tempfile::TempDir;

/// An isolated workspace: its own SQLite file and vector-store directory
/// under a fresh temp dir, torn down when the `TestWorld` drops.
pub struct TestWorld {
    _temp_dir: TempDir,
    conn: Arc<Mutex<Connection>>,
    vector_store: Arc<VectorStore>,
    machine_id: String,
}

impl Default for TestWorld {
    fn default() -> Self {
        Self::new()
    }
}

impl TestWorld {
    /// Creates a fresh workspace with a deterministic, network-free
    /// embedding provider so vector search is exercised without a live
    /// model.
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let conn = Database::open_in_memory().expect("failed to open database").into_conn();
        let chain = EmbeddingChain::new(vec![Box::new(HashEmbeddingProvider::new("test", 16)) as Box<dyn EmbeddingProvider>]);
        let vector_store = VectorStore::open(temp_dir.path(), chain).expect("failed to open vector store");

        Self { _temp_dir: temp_dir, conn: Arc::new(Mutex::new(conn)), vector_store: Arc::new(vector_store), machine_id: "test-machine".to_string() }
    }

    /// A `Tools` facade bound to this workspace's stores.
    pub fn tools(&self) -> Tools {
        Tools::new(self.conn.clone(), self.vector_store.clone(), self.machine_id.clone())
    }

    /// Direct access to the underlying connection, for assertions or
    /// fixture setup `Tools` doesn't expose.
    pub fn conn(&self) -> Arc<Mutex<Connection>> {
        self.conn.clone()
    }

    pub fn vector_store(&self) -> Arc<VectorStore> {
        self.vector_store.clone()
    }

    /// Inserts a session row directly, bypassing `Tools::remember`'s
    /// implicit session creation.
    pub fn seed_session(&self, session: &Session) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        oak_index::queries::sessions::upsert(&conn, session)?;
        Ok(())
    }

    /// Inserts an observation row directly, without the vector-store write
    /// `Tools::remember` performs alongside it.
    pub fn seed_observation(&self, observation: &StoredObservation) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        oak_index::queries::observations::store(&conn, observation)?;
        Ok(())
    }

    pub fn seed_activity(&self, activity: &Activity) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        oak_index::queries::activities::insert(&conn, activity)?;
        Ok(())
    }
}
