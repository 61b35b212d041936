//! Dense-embedding vector store: three HNSW collections (`oak_code`,
//! `oak_memory`, `oak_session_summaries`) backed by `usearch`, with a
//! JSON sidecar per collection carrying everything the index itself
//! doesn't (id, text, tags, status, archival state).
//!
//! Dimension changes from the embedding chain are handled transparently:
//! a collection built for a different dimensionality is dropped and
//! rebuilt empty rather than erroring.

mod collection;
mod error;
mod store;

pub use collection::{RecordKind, SearchHit, VectorRecord};
pub use error::{Error, Result};
pub use store::{CollectionKind, CollectionStats, MemoryFilters, VectorStore};
