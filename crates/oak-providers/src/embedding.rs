use async_trait::async_trait;

use crate::error::{Error, Result};

/// A single embedding backend. Implementors hide the vendor-specific
/// request/response shape; the chain only cares about dimensionality and
/// whether a call succeeded.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Dimensionality of vectors this provider currently produces. Must be
    /// stable for a given provider instance — if the upstream model changes
    /// dimension, callers are expected to construct a new provider.
    fn dimension(&self) -> usize;

    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await?);
        }
        Ok(out)
    }
}

/// Ordered list of embedding providers tried in turn. The first provider
/// that succeeds wins; its dimensionality becomes the chain's current
/// dimensionality, which callers use to decide whether a vector-store
/// collection needs to be recreated.
pub struct EmbeddingChain {
    providers: Vec<Box<dyn EmbeddingProvider>>,
}

impl EmbeddingChain {
    pub fn new(providers: Vec<Box<dyn EmbeddingProvider>>) -> Self {
        Self { providers }
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Dimensionality reported by the first (primary) provider. The vector
    /// store uses this to decide, at startup, whether a persisted
    /// collection was built for a different embedding model.
    pub fn current_dimension(&self) -> Option<usize> {
        self.providers.first().map(|p| p.dimension())
    }

    pub fn provider_names(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    /// Embed `text` with the first provider that succeeds, returning which
    /// provider answered alongside the vector.
    pub async fn embed(&self, text: &str) -> Result<(String, Vec<f32>)> {
        let mut last_err: Option<String> = None;
        for provider in &self.providers {
            match provider.embed(text).await {
                Ok(vector) => return Ok((provider.name().to_string(), vector)),
                Err(err) => {
                    tracing::warn!(provider = provider.name(), error = %err, "embedding provider failed, trying next");
                    last_err = Some(err.to_string());
                }
            }
        }
        Err(Error::ChainExhausted(
            last_err.unwrap_or_else(|| "no embedding providers configured".to_string()),
        ))
    }
}

/// Deterministic, network-free embedding provider used in tests and as a
/// last-resort fallback: hashes the input into a fixed-size vector so the
/// vector store's distance math is still exercised without a live model.
pub struct HashEmbeddingProvider {
    name: String,
    dimension: usize,
}

impl HashEmbeddingProvider {
    pub fn new(name: impl Into<String>, dimension: usize) -> Self {
        Self { name: name.into(), dimension }
    }
}

#[async_trait]
impl EmbeddingProvider for HashEmbeddingProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if text.is_empty() {
            return Err(Error::Request("cannot embed empty text".to_string()));
        }
        let mut seed: u64 = 1469598103934665603;
        for byte in text.bytes() {
            seed ^= byte as u64;
            seed = seed.wrapping_mul(1099511628211);
        }
        let mut vector = Vec::with_capacity(self.dimension);
        let mut state = seed;
        for _ in 0..self.dimension {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1);
            let bucket = ((state >> 33) as u32 % 2000) as f32 / 1000.0 - 1.0;
            vector.push(bucket);
        }
        Ok(vector)
    }
}

/// A vendor-neutral embedding endpoint reachable over HTTP: POSTs
/// `{"input": "..."}` and expects `{"embedding": [...]}` back. `dimension`
/// is supplied at construction time rather than inferred, since the chain
/// needs it up front to size vector-store collections before the first
/// call ever goes out.
pub struct HttpEmbeddingProvider {
    name: String,
    endpoint: String,
    api_key: Option<String>,
    dimension: usize,
    client: reqwest::Client,
}

impl HttpEmbeddingProvider {
    pub fn new(name: impl Into<String>, endpoint: impl Into<String>, api_key: Option<String>, dimension: usize) -> Self {
        Self { name: name.into(), endpoint: endpoint.into(), api_key, dimension, client: reqwest::Client::new() }
    }
}

#[derive(serde::Serialize)]
struct HttpEmbeddingRequestBody<'a> {
    input: &'a str,
}

#[derive(serde::Deserialize)]
struct HttpEmbeddingResponseBody {
    embedding: Vec<f32>,
}

#[async_trait]
impl EmbeddingProvider for HttpEmbeddingProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut builder = self.client.post(&self.endpoint).json(&HttpEmbeddingRequestBody { input: text });
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }
        let response = builder.send().await.map_err(|err| Error::Request(err.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Request(format!("{status}: {body}")));
        }
        let body: HttpEmbeddingResponseBody = response.json().await.map_err(|err| Error::Malformed(err.to_string()))?;
        if body.embedding.len() != self.dimension {
            return Err(Error::Malformed(format!(
                "provider {} returned {}-dim vector, expected {}",
                self.name,
                body.embedding.len(),
                self.dimension
            )));
        }
        Ok(body.embedding)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingProvider;

    #[async_trait]
    impl EmbeddingProvider for FailingProvider {
        fn name(&self) -> &str {
            "failing"
        }
        fn dimension(&self) -> usize {
            8
        }
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Err(Error::Request("simulated outage".to_string()))
        }
    }

    #[tokio::test]
    async fn falls_back_to_next_provider_on_failure() {
        let chain = EmbeddingChain::new(vec![
            Box::new(FailingProvider),
            Box::new(HashEmbeddingProvider::new("fallback", 16)),
        ]);
        let (provider, vector) = chain.embed("hello world").await.unwrap();
        assert_eq!(provider, "fallback");
        assert_eq!(vector.len(), 16);
    }

    #[tokio::test]
    async fn exhausted_chain_returns_error() {
        let chain = EmbeddingChain::new(vec![Box::new(FailingProvider)]);
        assert!(chain.embed("x").await.is_err());
    }

    #[tokio::test]
    async fn same_text_hashes_deterministically() {
        let provider = HashEmbeddingProvider::new("hash", 4);
        let a = provider.embed("stable").await.unwrap();
        let b = provider.embed("stable").await.unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn current_dimension_reflects_primary_provider() {
        let chain = EmbeddingChain::new(vec![Box::new(HashEmbeddingProvider::new("a", 768))]);
        assert_eq!(chain.current_dimension(), Some(768));
    }
}
