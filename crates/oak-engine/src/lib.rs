//! Turns raw activity into memory: the batch processor classifies and
//! extracts observations from completed prompt batches, the retrieval
//! engine exposes them to agents through progressive disclosure, and the
//! suggestion engine proposes parent-session links.
//!
//! None of this talks to SQLite or HNSW directly — it's built entirely
//! on `oak-index`'s query modules and `oak-vector`'s `VectorStore`.

mod error;
mod processor;
mod retrieval;
mod suggest;

pub use error::{Error, Result};
pub use processor::{BatchProcessor, ContextBudget, ProcessingResult};
pub use retrieval::{
    CodeContextItem, ContextChunk, ContextResult, FullItem, FullResult, IndexEntry, IndexResult, MemoryContextItem, MemoryIndexEntry, RelatedEntry,
    RetrievalConfig, RetrievalEngine, SearchScope, TaskContextResult, token_estimate,
};
pub use suggest::{Confidence, SuggestedParent, compute_suggested_parent, dismiss_suggestion, reset_suggestion_dismissal};
