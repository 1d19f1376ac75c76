//! Upstream LLM and embeddings clients
//!
//! Thin reqwest clients for OpenAI-compatible endpoints. Every request goes
//! through the upstream's [`RateLimitedCaller`]; the token estimate charged
//! on entry is reconciled from the provider's reported usage.

use kgraph_core::config::{LlmConfig, UpstreamConfig};
use kgraph_limiter::{CallOutcome, RateLimitedCaller, UpstreamError};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

/// Rough prompt-size estimate: four bytes per token.
fn estimate_tokens(text: &str) -> u64 {
    (text.len() as u64) / 4 + 1
}

/// Map a transport-level reqwest failure onto the retry classification.
fn classify(e: reqwest::Error) -> UpstreamError {
    if e.is_timeout() {
        UpstreamError::Timeout
    } else if e.is_builder() {
        UpstreamError::InvalidArgument(e.to_string())
    } else {
        UpstreamError::Transport(e.to_string())
    }
}

#[derive(Debug, Deserialize)]
struct Usage {
    total_tokens: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingItem {
    embedding: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingItem>,
    usage: Option<Usage>,
}

async fn post_json(
    http: &reqwest::Client,
    url: String,
    api_key: Option<String>,
    body: Value,
) -> Result<(reqwest::StatusCode, Value), UpstreamError> {
    let mut request = http.post(&url).json(&body);
    if let Some(key) = api_key {
        request = request.bearer_auth(key);
    }
    let response = request.send().await.map_err(classify)?;
    let status = response.status();
    let payload: Value = response.json().await.unwrap_or(Value::Null);
    Ok((status, payload))
}

/// Chat-completion client used for extraction.
pub struct LlmClient {
    http: reqwest::Client,
    caller: RateLimitedCaller,
    base_url: String,
    api_key: Option<String>,
    model: String,
    max_tokens: u32,
    temperature: f32,
    repetition_penalty: Option<f32>,
}

impl LlmClient {
    /// Build a client from the `llm` configuration section.
    pub fn new(cfg: &LlmConfig) -> Self {
        let upstream = &cfg.upstream;
        LlmClient {
            http: reqwest::Client::new(),
            caller: RateLimitedCaller::new(
                "llm",
                &upstream.concurrency,
                &upstream.rate_limit,
                &upstream.retry,
            ),
            base_url: upstream.api_base_url.trim_end_matches('/').to_string(),
            api_key: upstream.resolved_api_key(),
            model: upstream.model.clone(),
            max_tokens: cfg.max_tokens,
            temperature: cfg.temperature,
            repetition_penalty: cfg.repetition_penalty,
        }
    }

    /// One chat completion; returns the assistant message content.
    pub async fn chat(
        &self,
        system: &str,
        user: &str,
        cancel: &CancellationToken,
    ) -> Result<String, UpstreamError> {
        let mut body = json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "temperature": self.temperature,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": user},
            ],
        });
        if let Some(penalty) = self.repetition_penalty {
            body["repetition_penalty"] = json!(penalty);
        }
        let url = format!("{}/chat/completions", self.base_url);
        let estimated = estimate_tokens(system) + estimate_tokens(user) + self.max_tokens as u64;

        self.caller
            .call(estimated, cancel, || {
                let http = self.http.clone();
                let url = url.clone();
                let api_key = self.api_key.clone();
                let body = body.clone();
                async move {
                    let (status, payload) = post_json(&http, url, api_key, body).await?;
                    if !status.is_success() {
                        return Err(UpstreamError::Status(status.as_u16()));
                    }
                    let parsed: ChatResponse = serde_json::from_value(payload)
                        .map_err(|e| UpstreamError::Other(format!("malformed response: {e}")))?;
                    let content = parsed
                        .choices
                        .into_iter()
                        .next()
                        .and_then(|c| c.message.content)
                        .ok_or_else(|| UpstreamError::Other("no choices in response".into()))?;
                    let tokens = parsed.usage.and_then(|u| u.total_tokens);
                    Ok(CallOutcome {
                        value: content,
                        tokens_used: tokens,
                    })
                }
            })
            .await
    }
}

/// Embeddings client, present only when the `embeddings` section is set.
pub struct EmbeddingsClient {
    http: reqwest::Client,
    caller: RateLimitedCaller,
    base_url: String,
    api_key: Option<String>,
    model: String,
}

impl EmbeddingsClient {
    /// Build a client from the `embeddings` configuration section.
    pub fn new(cfg: &UpstreamConfig) -> Self {
        EmbeddingsClient {
            http: reqwest::Client::new(),
            caller: RateLimitedCaller::new(
                "embeddings",
                &cfg.concurrency,
                &cfg.rate_limit,
                &cfg.retry,
            ),
            base_url: cfg.api_base_url.trim_end_matches('/').to_string(),
            api_key: cfg.resolved_api_key(),
            model: cfg.model.clone(),
        }
    }

    /// Embed a batch of texts, preserving input order.
    pub async fn embed(
        &self,
        inputs: &[String],
        cancel: &CancellationToken,
    ) -> Result<Vec<Vec<f32>>, UpstreamError> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }
        let body = json!({ "model": self.model, "input": inputs });
        let url = format!("{}/embeddings", self.base_url);
        let estimated: u64 = inputs.iter().map(|t| estimate_tokens(t)).sum();

        self.caller
            .call(estimated, cancel, || {
                let http = self.http.clone();
                let url = url.clone();
                let api_key = self.api_key.clone();
                let body = body.clone();
                async move {
                    let (status, payload) = post_json(&http, url, api_key, body).await?;
                    if !status.is_success() {
                        return Err(UpstreamError::Status(status.as_u16()));
                    }
                    let parsed: EmbeddingsResponse = serde_json::from_value(payload)
                        .map_err(|e| UpstreamError::Other(format!("malformed response: {e}")))?;
                    let tokens = parsed.usage.and_then(|u| u.total_tokens);
                    Ok(CallOutcome {
                        value: parsed.data.into_iter().map(|d| d.embedding).collect(),
                        tokens_used: tokens,
                    })
                }
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_estimate_scales_with_length() {
        assert_eq!(estimate_tokens(""), 1);
        assert_eq!(estimate_tokens("abcd"), 2);
        assert!(estimate_tokens(&"x".repeat(4000)) >= 1000);
    }
}
