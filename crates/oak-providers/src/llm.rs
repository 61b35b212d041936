use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{Error, Result};

/// A single chat-completion backend, hidden behind a vendor-neutral
/// request/response shape. `supports_json_mode` lets the chain skip
/// providers that can't be asked for structured output.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    fn name(&self) -> &str;

    fn supports_json_mode(&self) -> bool {
        true
    }

    async fn complete(&self, request: &LlmRequest) -> Result<String>;
}

#[derive(Debug, Clone)]
pub struct LlmRequest {
    pub system_prompt: String,
    pub user_prompt: String,
    pub want_json: bool,
}

/// Ordered list of LLM providers tried in turn on failure. Mirrors
/// [`crate::embedding::EmbeddingChain`]: first success wins.
pub struct LlmChain {
    providers: Vec<Box<dyn LlmProvider>>,
    /// Once a provider has told us (via a 400-class error) that it doesn't
    /// support the structured `response_format` we asked for, we stop
    /// asking it for the rest of the process lifetime rather than paying
    /// for a failed round trip on every batch.
    json_mode_unsupported: AtomicBool,
}

impl LlmChain {
    pub fn new(providers: Vec<Box<dyn LlmProvider>>) -> Self {
        Self { providers, json_mode_unsupported: AtomicBool::new(false) }
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    pub async fn complete(&self, mut request: LlmRequest) -> Result<LlmResponse> {
        if request.want_json && self.json_mode_unsupported.load(Ordering::Relaxed) {
            request.want_json = false;
        }

        let mut last_err: Option<String> = None;
        for provider in &self.providers {
            let mut attempt = request.clone();
            if attempt.want_json && !provider.supports_json_mode() {
                attempt.want_json = false;
            }
            match provider.complete(&attempt).await {
                Ok(raw) => {
                    let cleaned = strip_reasoning_tokens(&raw);
                    return Ok(LlmResponse { provider: provider.name().to_string(), raw: cleaned });
                }
                Err(Error::Request(msg)) if looks_like_unsupported_json_mode(&msg) => {
                    self.json_mode_unsupported.store(true, Ordering::Relaxed);
                    last_err = Some(msg);
                }
                Err(err) => {
                    tracing::warn!(provider = provider.name(), error = %err, "llm provider failed, trying next");
                    last_err = Some(err.to_string());
                }
            }
        }
        Err(Error::ChainExhausted(last_err.unwrap_or_else(|| "no llm providers configured".to_string())))
    }
}

pub struct LlmResponse {
    pub provider: String,
    pub raw: String,
}

/// A vendor-neutral chat-completion endpoint reachable over HTTP: POSTs
/// `{system_prompt, user_prompt, json_mode}` and expects `{"text": "..."}`
/// back. Concrete vendors are adapted to this shape outside this crate —
/// it exists so the daemon can be pointed at any self-hosted or gateway
/// endpoint without a vendor SDK dependency.
pub struct HttpLlmProvider {
    name: String,
    endpoint: String,
    api_key: Option<String>,
    supports_json_mode: bool,
    client: reqwest::Client,
}

impl HttpLlmProvider {
    pub fn new(name: impl Into<String>, endpoint: impl Into<String>, api_key: Option<String>, supports_json_mode: bool) -> Self {
        Self { name: name.into(), endpoint: endpoint.into(), api_key, supports_json_mode, client: reqwest::Client::new() }
    }
}

#[derive(serde::Serialize)]
struct HttpLlmRequestBody<'a> {
    system_prompt: &'a str,
    user_prompt: &'a str,
    json_mode: bool,
}

#[derive(serde::Deserialize)]
struct HttpLlmResponseBody {
    text: String,
}

#[async_trait]
impl LlmProvider for HttpLlmProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn supports_json_mode(&self) -> bool {
        self.supports_json_mode
    }

    async fn complete(&self, request: &LlmRequest) -> Result<String> {
        let mut builder = self.client.post(&self.endpoint).json(&HttpLlmRequestBody {
            system_prompt: &request.system_prompt,
            user_prompt: &request.user_prompt,
            json_mode: request.want_json,
        });
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }
        let response = builder.send().await.map_err(|err| Error::Request(err.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Request(format!("{status}: {body}")));
        }
        let body: HttpLlmResponseBody = response.json().await.map_err(|err| Error::Malformed(err.to_string()))?;
        Ok(body.text)
    }
}

fn looks_like_unsupported_json_mode(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    lower.contains("response_format") && (lower.contains("400") || lower.contains("unsupported") || lower.contains("not supported"))
}

/// Reasoning models embed their chain-of-thought in the content field
/// using special tokens. Tried in order, most specific first; an implicit
/// opening tag (no `<think>`, just a dangling `</think>`) is only caught
/// by the second pattern once the first has had its shot.
static REASONING_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(r"(?is)<think>.*?</think>\s*").unwrap(),
        Regex::new(r"(?is)^[\s\S]*?</think>\s*").unwrap(),
        Regex::new(r"(?is)<reasoning>.*?</reasoning>\s*").unwrap(),
        Regex::new(r"(?is)<\|thinking\|>.*?<\|/thinking\|>\s*").unwrap(),
    ]
});

/// Strips reasoning/chain-of-thought tokens from LLM response text.
/// Returns the original text if no pattern matches, or if stripping
/// would leave an empty result.
pub fn strip_reasoning_tokens(raw: &str) -> String {
    if raw.is_empty() {
        return raw.to_string();
    }
    let original_trimmed = raw.trim();
    for pattern in REASONING_PATTERNS.iter() {
        let stripped = pattern.replace_all(raw, "").trim().to_string();
        if !stripped.is_empty() && stripped != original_trimmed {
            return stripped;
        }
    }
    raw.to_string()
}

/// Extracts a JSON value from LLM output that may or may not be cleanly
/// formatted, trying progressively looser strategies:
/// 1. a fenced ```json code block
/// 2. the first balanced `{...}` span
/// 3. the raw text, parsed as-is
pub fn extract_json(raw: &str) -> Result<serde_json::Value> {
    static FENCED: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)```(?:json)?\s*(\{.*?\})\s*```").unwrap());

    if let Some(captures) = FENCED.captures(raw)
        && let Some(body) = captures.get(1)
        && let Ok(value) = serde_json::from_str(body.as_str())
    {
        return Ok(value);
    }

    if let Some(span) = first_balanced_object(raw)
        && let Ok(value) = serde_json::from_str(span)
    {
        return Ok(value);
    }

    serde_json::from_str(raw.trim()).map_err(|err| Error::Malformed(err.to_string()))
}

fn first_balanced_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let bytes = text.as_bytes();
    let mut depth = 0i32;
    for (offset, &byte) in bytes[start..].iter().enumerate() {
        match byte {
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_fenced_json() {
        let raw = "Here you go:\n```json\n{\"type\": \"gotcha\", \"importance\": 7}\n```\nThanks.";
        let value = extract_json(raw).unwrap();
        assert_eq!(value["type"], "gotcha");
    }

    #[test]
    fn extracts_bare_object_among_prose() {
        let raw = "Sure, the result is {\"type\": \"decision\"} and that's final.";
        let value = extract_json(raw).unwrap();
        assert_eq!(value["type"], "decision");
    }

    #[test]
    fn falls_back_to_raw_parse() {
        let raw = "{\"type\": \"discovery\"}";
        let value = extract_json(raw).unwrap();
        assert_eq!(value["type"], "discovery");
    }

    #[test]
    fn unparseable_text_is_malformed() {
        assert!(extract_json("not json at all").is_err());
    }

    #[test]
    fn strips_think_block() {
        let raw = "<think>reasoning about the answer</think>\n{\"ok\": true}";
        assert_eq!(strip_reasoning_tokens(raw), "{\"ok\": true}");
    }

    #[test]
    fn leaves_output_without_reasoning_unchanged() {
        let raw = "{\"ok\": true}";
        assert_eq!(strip_reasoning_tokens(raw), raw);
    }

    #[test]
    fn strips_implicit_opening_think_tag() {
        let raw = "still reasoning with no opening tag</think>\n{\"ok\": true}";
        assert_eq!(strip_reasoning_tokens(raw), "{\"ok\": true}");
    }

    #[test]
    fn strips_reasoning_block() {
        let raw = "<reasoning>weighing the options</reasoning>\n{\"ok\": true}";
        assert_eq!(strip_reasoning_tokens(raw), "{\"ok\": true}");
    }

    #[test]
    fn strips_pipe_delimited_thinking_block() {
        let raw = "<|thinking|>considering alternatives<|/thinking|>\n{\"ok\": true}";
        assert_eq!(strip_reasoning_tokens(raw), "{\"ok\": true}");
    }

    #[test]
    fn keeps_original_when_stripping_would_empty_the_result() {
        let raw = "<think>the whole response was reasoning</think>";
        assert_eq!(strip_reasoning_tokens(raw), raw);
    }

    struct StaticProvider {
        name: &'static str,
        response: Result<String>,
    }

    #[async_trait]
    impl LlmProvider for StaticProvider {
        fn name(&self) -> &str {
            self.name
        }
        async fn complete(&self, _request: &LlmRequest) -> Result<String> {
            match &self.response {
                Ok(text) => Ok(text.clone()),
                Err(_) => Err(Error::Request("simulated failure".to_string())),
            }
        }
    }

    #[tokio::test]
    async fn chain_falls_back_on_provider_failure() {
        let chain = LlmChain::new(vec![
            Box::new(StaticProvider { name: "primary", response: Err(Error::Request("down".into())) }),
            Box::new(StaticProvider { name: "secondary", response: Ok("{\"ok\": true}".to_string()) }),
        ]);
        let response = chain
            .complete(LlmRequest { system_prompt: "sys".into(), user_prompt: "user".into(), want_json: true })
            .await
            .unwrap();
        assert_eq!(response.provider, "secondary");
    }

    #[tokio::test]
    async fn json_mode_unsupported_is_cached_across_calls() {
        let chain = LlmChain::new(vec![Box::new(StaticProvider {
            name: "primary",
            response: Err(Error::Request("400 response_format not supported".into())),
        })]);
        assert!(chain.complete(LlmRequest { system_prompt: "s".into(), user_prompt: "u".into(), want_json: true }).await.is_err());
        assert!(chain.json_mode_unsupported.load(Ordering::Relaxed));
    }
}
