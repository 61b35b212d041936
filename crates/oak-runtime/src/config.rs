use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use oak_providers::{EmbeddingChain, EmbeddingProvider, HttpEmbeddingProvider, HttpLlmProvider, LlmChain, LlmProvider};

use crate::Result;

/// One configured LLM or embedding backend, tried in the order it appears
/// in `Config`. `api_key_env` names an environment variable rather than
/// carrying the key itself so config files are safe to check in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderEntry {
    pub name: String,
    pub endpoint: String,
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default)]
    pub supports_json_mode: bool,
    #[serde(default)]
    pub dimension: Option<usize>,
}

fn default_bind_addr() -> String {
    "127.0.0.1:7493".to_string()
}

fn default_scheduler_interval_seconds() -> u64 {
    30
}

fn default_batch_processor_interval_seconds() -> u64 {
    15
}

fn default_activity_buffer_threshold() -> usize {
    20
}

fn default_scheduler_stop_timeout_seconds() -> u64 {
    10
}

/// The daemon's on-disk configuration: where its state lives, how agents
/// reach it, and which LLM/embedding backends it falls back across.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Overrides `oak-core::resolve_workspace_path`'s default chain.
    #[serde(default)]
    pub workspace_path: Option<String>,
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    #[serde(default)]
    pub bearer_token: Option<String>,
    #[serde(default = "default_scheduler_interval_seconds")]
    pub scheduler_interval_seconds: u64,
    #[serde(default = "default_scheduler_stop_timeout_seconds")]
    pub scheduler_stop_timeout_seconds: u64,
    #[serde(default = "default_batch_processor_interval_seconds")]
    pub batch_processor_interval_seconds: u64,
    #[serde(default = "default_activity_buffer_threshold")]
    pub activity_buffer_threshold: usize,
    #[serde(default)]
    pub llm_providers: Vec<ProviderEntry>,
    #[serde(default)]
    pub embedding_providers: Vec<ProviderEntry>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            workspace_path: None,
            bind_addr: default_bind_addr(),
            bearer_token: None,
            scheduler_interval_seconds: default_scheduler_interval_seconds(),
            scheduler_stop_timeout_seconds: default_scheduler_stop_timeout_seconds(),
            batch_processor_interval_seconds: default_batch_processor_interval_seconds(),
            activity_buffer_threshold: default_activity_buffer_threshold(),
            llm_providers: Vec::new(),
            embedding_providers: Vec::new(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let path = Self::default_path()?;
        Self::load_from(&path)
    }

    pub fn load_from(path: &PathBuf) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::default_path()?;
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &PathBuf) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, toml::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn default_path() -> Result<PathBuf> {
        Ok(oak_core::resolve_workspace_path(None)?.join("config.toml"))
    }

    pub fn workspace_dir(&self) -> Result<PathBuf> {
        Ok(oak_core::resolve_workspace_path(self.workspace_path.as_deref())?)
    }

    /// Builds the LLM fallback chain from `llm_providers`, resolving each
    /// entry's API key from its named environment variable. A provider
    /// whose key env var isn't set is skipped rather than failing the
    /// whole chain - the remaining providers still try.
    pub fn build_llm_chain(&self) -> LlmChain {
        let providers = self
            .llm_providers
            .iter()
            .map(|entry| {
                let api_key = entry.api_key_env.as_deref().and_then(|var| std::env::var(var).ok());
                Box::new(HttpLlmProvider::new(&entry.name, &entry.endpoint, api_key, entry.supports_json_mode)) as Box<dyn LlmProvider>
            })
            .collect();
        LlmChain::new(providers)
    }

    pub fn build_embedding_chain(&self) -> EmbeddingChain {
        let providers = self
            .embedding_providers
            .iter()
            .map(|entry| {
                let api_key = entry.api_key_env.as_deref().and_then(|var| std::env::var(var).ok());
                let dimension = entry.dimension.unwrap_or(384);
                Box::new(HttpEmbeddingProvider::new(&entry.name, &entry.endpoint, api_key, dimension)) as Box<dyn EmbeddingProvider>
            })
            .collect();
        EmbeddingChain::new(providers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn default_has_sane_bind_addr_and_empty_providers() {
        let config = Config::default();
        assert_eq!(config.bind_addr, "127.0.0.1:7493");
        assert!(config.llm_providers.is_empty());
    }

    #[test]
    fn save_and_load_round_trips() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = Config::default();
        config.llm_providers.push(ProviderEntry {
            name: "openai".to_string(),
            endpoint: "https://api.openai.com/v1/chat/completions".to_string(),
            api_key_env: Some("OPENAI_API_KEY".to_string()),
            supports_json_mode: true,
            dimension: None,
        });
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.llm_providers.len(), 1);
        assert_eq!(loaded.llm_providers[0].name, "openai");
    }

    #[test]
    fn load_nonexistent_returns_default() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing.toml");
        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.bind_addr, default_bind_addr());
    }
}
