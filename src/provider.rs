//! HTTP-backed embedding and chat provider.
//!
//! [`HttpProvider`] implements both [`Embedder`] and [`ChatModel`] against
//! one of two wire dialects:
//!
//! | Provider | Embeddings | Chat |
//! |----------|------------|------|
//! | `openai` (and compatible gateways) | `POST {base}/embeddings` → `data[].embedding` | `POST {base}/chat/completions` → `choices[0].message.content` |
//! | `ollama` | `POST {base}/api/embed` → `embeddings[]` | `POST {base}/api/chat` (`stream: false`) → `message.content` |
//!
//! # Retry Strategy
//!
//! Off by default (`llm.max_retries = 0`). When enabled:
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors and timeouts → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)
//!
//! Every failure surfaces as [`RagError::Provider`].

use std::time::Duration;

use async_trait::async_trait;
use groundwork_core::embedding::{ensure_embeddings, Embedder};
use groundwork_core::error::{RagError, Result};
use groundwork_core::llm::{ChatMessage, ChatModel};

use crate::config::{LlmConfig, LlmProviderKind};

pub struct HttpProvider {
    kind: LlmProviderKind,
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    chat_model: String,
    embedding_model: String,
    dims: usize,
    max_retries: u32,
}

impl HttpProvider {
    /// Build a provider from `[llm]`. `dims` is the expected embedding size
    /// reported through [`Embedder::dims`].
    ///
    /// # Errors
    ///
    /// [`RagError::Configuration`] when the OpenAI API key variable is unset.
    pub fn new(config: &LlmConfig, dims: usize) -> Result<Self> {
        let api_key = match config.provider {
            LlmProviderKind::Openai => {
                let key = std::env::var(&config.api_key_env).map_err(|_| {
                    RagError::config(format!(
                        "{} environment variable not set",
                        config.api_key_env
                    ))
                })?;
                Some(key)
            }
            LlmProviderKind::Ollama => std::env::var(&config.api_key_env).ok(),
        };

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(RagError::provider)?;

        Ok(Self {
            kind: config.provider,
            client,
            base_url: config.base_url().to_string(),
            api_key,
            chat_model: config.chat_model.clone(),
            embedding_model: config.embedding_model.clone(),
            dims,
            max_retries: config.max_retries,
        })
    }

    fn label(&self) -> &'static str {
        match self.kind {
            LlmProviderKind::Openai => "OpenAI",
            LlmProviderKind::Ollama => "Ollama",
        }
    }

    /// POST `body` to `path` with the configured retry policy.
    async fn post_json(&self, path: &str, body: &serde_json::Value) -> Result<serde_json::Value> {
        let url = format!("{}{}", self.base_url, path);
        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tracing::debug!(attempt, delay_secs = delay.as_secs(), url = %url, "retrying provider call");
                tokio::time::sleep(delay).await;
            }

            let mut request = self.client.post(&url).json(body);
            if let Some(key) = &self.api_key {
                request = request.bearer_auth(key);
            }

            match request.send().await {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        return response.json().await.map_err(|e| {
                            RagError::Provider(format!("{} returned invalid JSON: {}", self.label(), e))
                        });
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    let err = RagError::Provider(format!(
                        "{} API error {}: {}",
                        self.label(),
                        status,
                        body_text
                    ));
                    if status.as_u16() == 429 || status.is_server_error() {
                        last_err = Some(err);
                        continue;
                    }
                    return Err(err);
                }
                Err(e) => {
                    let reason = if e.is_timeout() { "timed out" } else { "failed" };
                    last_err = Some(RagError::Provider(format!(
                        "{} request to {} {}: {}",
                        self.label(),
                        url,
                        reason,
                        e
                    )));
                }
            }
        }

        Err(last_err.unwrap_or_else(|| {
            RagError::Provider(format!("{} call failed after retries", self.label()))
        }))
    }
}

#[async_trait]
impl Embedder for HttpProvider {
    fn model_name(&self) -> &str {
        &self.embedding_model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let body = serde_json::json!({
            "model": self.embedding_model,
            "input": texts,
        });
        let vectors = match self.kind {
            LlmProviderKind::Openai => parse_openai_embeddings(&self.post_json("/embeddings", &body).await?)?,
            LlmProviderKind::Ollama => parse_ollama_embeddings(&self.post_json("/api/embed", &body).await?)?,
        };
        ensure_embeddings(texts.len(), vectors)
    }
}

#[async_trait]
impl ChatModel for HttpProvider {
    fn default_model(&self) -> &str {
        &self.chat_model
    }

    async fn chat(&self, messages: &[ChatMessage], model: Option<&str>) -> Result<String> {
        let model = model.unwrap_or(&self.chat_model);
        match self.kind {
            LlmProviderKind::Openai => {
                let body = serde_json::json!({ "model": model, "messages": messages });
                parse_openai_chat(&self.post_json("/chat/completions", &body).await?)
            }
            LlmProviderKind::Ollama => {
                let body = serde_json::json!({ "model": model, "messages": messages, "stream": false });
                parse_ollama_chat(&self.post_json("/api/chat", &body).await?)
            }
        }
    }
}

fn json_to_vector(value: &serde_json::Value, what: &str) -> Result<Vec<f32>> {
    let array = value
        .as_array()
        .ok_or_else(|| RagError::Provider(format!("invalid response: {} is not an array", what)))?;
    array
        .iter()
        .map(|v| {
            v.as_f64()
                .map(|f| f as f32)
                .ok_or_else(|| RagError::Provider(format!("invalid response: non-numeric value in {}", what)))
        })
        .collect()
}

/// Extract `data[].embedding`, ordered by each entry's `index`.
///
/// The indices must be a permutation of `0..data.len()`; a duplicate or
/// out-of-range index would pair vectors with the wrong texts.
fn parse_openai_embeddings(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| RagError::Provider("invalid OpenAI response: missing data array".to_string()))?;

    let mut slots: Vec<Option<Vec<f32>>> = vec![None; data.len()];
    for (position, item) in data.iter().enumerate() {
        let index = match item.get("index") {
            None => position,
            Some(i) => i.as_u64().map(|i| i as usize).ok_or_else(|| {
                RagError::Provider(format!("invalid OpenAI response: bad index {}", i))
            })?,
        };
        let embedding = item
            .get("embedding")
            .ok_or_else(|| RagError::Provider("invalid OpenAI response: missing embedding".to_string()))?;
        let slot = slots.get_mut(index).ok_or_else(|| {
            RagError::Provider(format!(
                "invalid OpenAI response: index {} out of range for {} embeddings",
                index,
                data.len()
            ))
        })?;
        if slot.is_some() {
            return Err(RagError::Provider(format!(
                "invalid OpenAI response: duplicate index {}",
                index
            )));
        }
        *slot = Some(json_to_vector(embedding, "embedding")?);
    }

    // n entries filling n distinct slots leaves none empty
    Ok(slots.into_iter().flatten().collect())
}

fn parse_ollama_embeddings(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let embeddings = json
        .get("embeddings")
        .and_then(|e| e.as_array())
        .ok_or_else(|| {
            RagError::Provider("invalid Ollama response: missing embeddings array".to_string())
        })?;
    embeddings
        .iter()
        .map(|e| json_to_vector(e, "embedding"))
        .collect()
}

fn parse_openai_chat(json: &serde_json::Value) -> Result<String> {
    json.pointer("/choices/0/message/content")
        .and_then(|c| c.as_str())
        .map(str::to_string)
        .ok_or_else(|| RagError::Provider("invalid OpenAI response: missing choices[0].message.content".to_string()))
}

fn parse_ollama_chat(json: &serde_json::Value) -> Result<String> {
    json.pointer("/message/content")
        .and_then(|c| c.as_str())
        .map(str::to_string)
        .ok_or_else(|| RagError::Provider("invalid Ollama response: missing message.content".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_openai_embeddings_ordered_by_index() {
        let response = json!({
            "data": [
                {"index": 1, "embedding": [0.0, 1.0]},
                {"index": 0, "embedding": [1.0, 0.0]}
            ]
        });
        let vectors = parse_openai_embeddings(&response).unwrap();
        assert_eq!(vectors, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
    }

    #[test]
    fn test_openai_embeddings_reject_bad_indices() {
        let duplicate = json!({
            "data": [
                {"index": 1, "embedding": [0.0, 1.0]},
                {"index": 1, "embedding": [1.0, 0.0]}
            ]
        });
        assert!(matches!(
            parse_openai_embeddings(&duplicate),
            Err(RagError::Provider(_))
        ));

        let out_of_range = json!({
            "data": [
                {"index": 0, "embedding": [0.0, 1.0]},
                {"index": 2, "embedding": [1.0, 0.0]}
            ]
        });
        assert!(matches!(
            parse_openai_embeddings(&out_of_range),
            Err(RagError::Provider(_))
        ));

        let negative = json!({"data": [{"index": -1, "embedding": [1.0]}]});
        assert!(parse_openai_embeddings(&negative).is_err());

        // entries without an index keep their position
        let positional = json!({"data": [{"embedding": [1.0]}, {"embedding": [2.0]}]});
        assert_eq!(
            parse_openai_embeddings(&positional).unwrap(),
            vec![vec![1.0], vec![2.0]]
        );
    }

    #[test]
    fn test_openai_embeddings_missing_data() {
        let err = parse_openai_embeddings(&json!({"error": "nope"})).unwrap_err();
        assert!(matches!(err, RagError::Provider(_)));
    }

    #[test]
    fn test_non_numeric_embedding_rejected() {
        let response = json!({"embeddings": [[0.1, "x"]]});
        assert!(parse_ollama_embeddings(&response).is_err());
    }

    #[test]
    fn test_ollama_embeddings() {
        let response = json!({"embeddings": [[0.5, 0.5], [1.0, 0.0]]});
        assert_eq!(parse_ollama_embeddings(&response).unwrap().len(), 2);
    }

    #[test]
    fn test_chat_parsing() {
        let openai = json!({"choices": [{"message": {"role": "assistant", "content": "hi"}}]});
        assert_eq!(parse_openai_chat(&openai).unwrap(), "hi");
        assert!(parse_openai_chat(&json!({"choices": []})).is_err());

        let ollama = json!({"message": {"role": "assistant", "content": "hello"}, "done": true});
        assert_eq!(parse_ollama_chat(&ollama).unwrap(), "hello");
        assert!(parse_ollama_chat(&json!({})).is_err());
    }

    #[test]
    fn test_openai_requires_api_key() {
        let config: LlmConfig = toml::from_str(
            r#"
provider = "openai"
api_key_env = "GROUNDWORK_TEST_KEY_THAT_IS_NEVER_SET"
chat_model = "gpt-4o-mini"
embedding_model = "text-embedding-3-small"
"#,
        )
        .unwrap();
        assert!(matches!(
            HttpProvider::new(&config, 1536),
            Err(RagError::Configuration(_))
        ));
    }

    #[tokio::test]
    async fn test_unreachable_host_is_provider_error() {
        let config: LlmConfig = toml::from_str(
            r#"
provider = "ollama"
base_url = "http://127.0.0.1:9"
chat_model = "llama3"
embedding_model = "nomic-embed-text"
timeout_secs = 2
"#,
        )
        .unwrap();
        let provider = HttpProvider::new(&config, 768).unwrap();
        let err = provider.embed(&["hello".to_string()]).await.unwrap_err();
        assert!(matches!(err, RagError::Provider(_)));
    }
}
