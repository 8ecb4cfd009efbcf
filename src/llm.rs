//! Chat-completion clients for the lyric analysis prompt.
//!
//! Two backends share one call contract: a hosted OpenAI-compatible API and a
//! local Ollama-style inference server. The backend is chosen once, when the
//! client is built from configuration.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tracing::debug;

use crate::config::{LlmConfig, LlmProvider};

pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const LOCAL_BASE_URL: &str = "http://localhost:11434";

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("network error talking to {backend}: {message}")]
    Network { backend: &'static str, message: String },

    #[error("{backend} returned HTTP {status}: {body}")]
    Api {
        backend: &'static str,
        status: u16,
        body: String,
    },

    #[error("unexpected response envelope: {0}")]
    Envelope(String),

    #[error("model returned empty content")]
    EmptyContent,

    #[error("model content is not valid JSON: {0}")]
    InvalidJson(String),
}

// ============================================================================
// Request / Response Types
// ============================================================================

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".into(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".into(),
            content: content.into(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ChatOptions {
    /// Ask the backend for a strict JSON object and validate the reply.
    pub json_response: bool,
    pub temperature: f32,
}

impl Default for ChatOptions {
    fn default() -> Self {
        Self {
            json_response: true,
            temperature: 0.3,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ChatCompletion {
    pub content: String,
    pub usage: Option<TokenUsage>,
}

pub type LlmFuture<'a> = Pin<Box<dyn Future<Output = Result<ChatCompletion, LlmError>> + Send + 'a>>;

/// Uniform call interface over the configured backend.
pub trait LlmClient: Send + Sync {
    fn name(&self) -> &'static str;

    /// Local backends share the host's memory and go through the resource gate.
    fn is_local(&self) -> bool;

    fn complete<'a>(
        &'a self,
        model: &'a str,
        messages: &'a [ChatMessage],
        options: ChatOptions,
    ) -> LlmFuture<'a>;
}

/// Build the client selected by configuration.
pub fn build_client(config: &LlmConfig) -> Result<Box<dyn LlmClient>, LlmError> {
    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()
        .map_err(|e| LlmError::Network {
            backend: "http",
            message: e.to_string(),
        })?;

    Ok(match config.provider {
        LlmProvider::OpenAi => Box::new(HostedClient::new(
            http,
            config.openai_base_url.clone(),
            config.api_key.clone().unwrap_or_default(),
        )),
        LlmProvider::Local => Box::new(LocalClient::new(http, config.local_url.clone())),
    })
}

// ============================================================================
// Hosted Backend
// ============================================================================

#[derive(Debug, Deserialize)]
struct HostedResponse {
    choices: Vec<HostedChoice>,
    usage: Option<TokenUsage>,
}

#[derive(Debug, Deserialize)]
struct HostedChoice {
    message: HostedMessage,
}

#[derive(Debug, Deserialize)]
struct HostedMessage {
    content: Option<String>,
}

/// OpenAI-compatible `/chat/completions` client.
pub struct HostedClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl HostedClient {
    pub fn new(http: reqwest::Client, base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }

    async fn call(
        &self,
        model: &str,
        messages: &[ChatMessage],
        options: ChatOptions,
    ) -> Result<ChatCompletion, LlmError> {
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let mut body = json!({
            "model": model,
            "messages": messages,
            "temperature": options.temperature,
        });
        if options.json_response {
            body["response_format"] = json!({ "type": "json_object" });
        }

        debug!(backend = self.name(), %url, model, "Sending chat completion");
        let request = self.http.post(&url).bearer_auth(&self.api_key).json(&body);
        let raw = send(self.name(), request).await?;

        let parsed: HostedResponse =
            serde_json::from_str(&raw).map_err(|e| LlmError::Envelope(e.to_string()))?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();

        finish(content, parsed.usage, options)
    }
}

impl LlmClient for HostedClient {
    fn name(&self) -> &'static str {
        "openai"
    }

    fn is_local(&self) -> bool {
        false
    }

    fn complete<'a>(
        &'a self,
        model: &'a str,
        messages: &'a [ChatMessage],
        options: ChatOptions,
    ) -> LlmFuture<'a> {
        Box::pin(self.call(model, messages, options))
    }
}

// ============================================================================
// Local Backend
// ============================================================================

#[derive(Debug, Deserialize)]
struct LocalResponse {
    message: Option<HostedMessage>,
    prompt_eval_count: Option<u64>,
    eval_count: Option<u64>,
}

/// Ollama-style `/api/chat` client for a model running on this host.
pub struct LocalClient {
    http: reqwest::Client,
    base_url: String,
}

impl LocalClient {
    pub fn new(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
        }
    }

    async fn call(
        &self,
        model: &str,
        messages: &[ChatMessage],
        options: ChatOptions,
    ) -> Result<ChatCompletion, LlmError> {
        let url = format!("{}/api/chat", self.base_url.trim_end_matches('/'));
        let mut body = json!({
            "model": model,
            "messages": messages,
            "stream": false,
            "options": { "temperature": options.temperature },
        });
        if options.json_response {
            body["format"] = json!("json");
        }

        debug!(backend = self.name(), %url, model, "Sending chat completion");
        let raw = send(self.name(), self.http.post(&url).json(&body)).await?;

        let parsed: LocalResponse =
            serde_json::from_str(&raw).map_err(|e| LlmError::Envelope(e.to_string()))?;
        let usage = match (parsed.prompt_eval_count, parsed.eval_count) {
            (None, None) => None,
            (prompt, completion) => Some(TokenUsage {
                prompt_tokens: prompt.unwrap_or(0),
                completion_tokens: completion.unwrap_or(0),
            }),
        };
        let content = parsed.message.and_then(|m| m.content).unwrap_or_default();

        finish(content, usage, options)
    }
}

impl LlmClient for LocalClient {
    fn name(&self) -> &'static str {
        "local"
    }

    fn is_local(&self) -> bool {
        true
    }

    fn complete<'a>(
        &'a self,
        model: &'a str,
        messages: &'a [ChatMessage],
        options: ChatOptions,
    ) -> LlmFuture<'a> {
        Box::pin(self.call(model, messages, options))
    }
}

// ============================================================================
// Shared Helpers
// ============================================================================

async fn send(backend: &'static str, request: reqwest::RequestBuilder) -> Result<String, LlmError> {
    let response = request.send().await.map_err(|e| LlmError::Network {
        backend,
        message: e.to_string(),
    })?;

    let status = response.status();
    let text = response.text().await.map_err(|e| LlmError::Network {
        backend,
        message: e.to_string(),
    })?;

    if !status.is_success() {
        return Err(LlmError::Api {
            backend,
            status: status.as_u16(),
            body: text,
        });
    }
    Ok(text)
}

fn finish(content: String, usage: Option<TokenUsage>, options: ChatOptions) -> Result<ChatCompletion, LlmError> {
    let content = strip_code_fence(&content).to_string();
    if content.trim().is_empty() {
        return Err(LlmError::EmptyContent);
    }
    if options.json_response {
        if let Err(e) = serde_json::from_str::<serde_json::Value>(&content) {
            return Err(LlmError::InvalidJson(e.to_string()));
        }
    }
    Ok(ChatCompletion { content, usage })
}

/// Some local models wrap JSON in a markdown fence even in JSON mode.
fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}
