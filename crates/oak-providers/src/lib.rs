//! Capability interfaces for the two kinds of external model calls the
//! daemon makes: chat completion (for batch extraction and summarization)
//! and embedding (for the vector store). Neither module binds to a
//! specific vendor; both are ordered chains so a provider outage or a
//! missing API key degrades to the next configured backend instead of
//! failing the batch outright.

mod embedding;
mod error;
mod llm;

pub use embedding::{EmbeddingChain, EmbeddingProvider, HashEmbeddingProvider, HttpEmbeddingProvider};
pub use error::{Error, Result};
pub use llm::{HttpLlmProvider, LlmChain, LlmProvider, LlmRequest, LlmResponse, extract_json, strip_reasoning_tokens};
