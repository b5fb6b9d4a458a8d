//! Chat-completion clients used by the pipeline's model calls.
//!
//! Provides a `ChatBackend` trait with implementations for:
//! - **Ollama**: local models via `/api/chat`
//! - **OpenAI-compatible**: any server exposing `/chat/completions`
//!
//! Clients are built once at startup and shared; none of them retry.

use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// ChatBackend trait
// ============================================================================

/// Abstraction over chat model providers.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// One completion for a system prompt plus a single user message.
    /// Returns the trimmed reply text; an empty reply is an error.
    async fn complete(&self, system: &str, user: &str) -> Result<String, LlmError>;

    /// Whether the provider answers at all. Never errors.
    async fn health_check(&self) -> bool;

    /// Backend name for logging.
    fn name(&self) -> &str;

    /// Model identifier sent with each request.
    fn model(&self) -> &str;
}

// ============================================================================
// Error types
// ============================================================================

#[derive(Error, Debug)]
pub enum LlmError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({code}): {message}")]
    Api { code: u16, message: String },

    #[error("Model returned an empty response")]
    EmptyResponse,

    #[error("Missing API key")]
    MissingApiKey,
}

// ============================================================================
// Config types
// ============================================================================

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    pub timeout_seconds: u64,
    pub api_key: Option<String>,
}

impl LlmConfig {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            model: model.into(),
            temperature: 0.0,
            timeout_seconds: 120,
            api_key: None,
        }
    }
}

/// Configuration union for the backend factory.
pub enum BackendConfig {
    Ollama(LlmConfig),
    OpenAi(LlmConfig),
}

/// Create the appropriate backend from configuration.
pub fn create_backend(config: BackendConfig) -> Result<Box<dyn ChatBackend>, LlmError> {
    match config {
        BackendConfig::Ollama(c) => Ok(Box::new(OllamaClient::new(c)?)),
        BackendConfig::OpenAi(c) => Ok(Box::new(OpenAiClient::new(c)?)),
    }
}

fn http_client(config: &LlmConfig) -> Result<Client, LlmError> {
    Ok(Client::builder()
        .timeout(Duration::from_secs(config.timeout_seconds))
        .build()?)
}

#[derive(Debug, Serialize, Deserialize, Clone)]
struct ChatMessage {
    role: String,
    content: String,
}

fn messages(system: &str, user: &str) -> Vec<ChatMessage> {
    vec![
        ChatMessage {
            role: "system".to_string(),
            content: system.to_string(),
        },
        ChatMessage {
            role: "user".to_string(),
            content: user.to_string(),
        },
    ]
}

fn non_empty(content: String) -> Result<String, LlmError> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return Err(LlmError::EmptyResponse);
    }
    Ok(trimmed.to_string())
}

// ============================================================================
// Ollama API structs (private)
// ============================================================================

#[derive(Debug, Serialize)]
struct OllamaChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct OllamaErrorResponse {
    error: String,
}

// ============================================================================
// OllamaClient
// ============================================================================

#[derive(Debug, Clone)]
pub struct OllamaClient {
    client: Client,
    config: LlmConfig,
}

impl OllamaClient {
    pub fn new(config: LlmConfig) -> Result<Self, LlmError> {
        let client = http_client(&config)?;
        Ok(Self { client, config })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }
}

#[async_trait]
impl ChatBackend for OllamaClient {
    async fn complete(&self, system: &str, user: &str) -> Result<String, LlmError> {
        let request = OllamaChatRequest {
            model: self.config.model.clone(),
            messages: messages(system, user),
            stream: false,
            options: OllamaOptions {
                temperature: self.config.temperature,
            },
        };

        let response = self
            .client
            .post(self.url("/api/chat"))
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<OllamaErrorResponse>(&body)
                .map(|e| e.error)
                .unwrap_or(body);
            tracing::error!(code = status.as_u16(), message = %message, "Ollama API error");
            return Err(LlmError::Api {
                code: status.as_u16(),
                message,
            });
        }

        let chat: OllamaChatResponse = response.json().await?;
        non_empty(chat.message.content)
    }

    async fn health_check(&self) -> bool {
        match self.client.get(self.url("/api/tags")).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }

    fn name(&self) -> &str {
        "ollama"
    }

    fn model(&self) -> &str {
        &self.config.model
    }
}

// ============================================================================
// OpenAI-compatible API structs (private)
// ============================================================================

#[derive(Debug, Serialize)]
struct OpenAiChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct OpenAiChatResponse {
    choices: Vec<OpenAiChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAiErrorResponse {
    error: OpenAiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct OpenAiErrorDetail {
    message: String,
}

// ============================================================================
// OpenAiClient
// ============================================================================

#[derive(Debug, Clone)]
pub struct OpenAiClient {
    client: Client,
    config: LlmConfig,
    api_key: String,
}

impl OpenAiClient {
    pub fn new(config: LlmConfig) -> Result<Self, LlmError> {
        let api_key = config
            .api_key
            .clone()
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .unwrap_or_default();
        if api_key.is_empty() {
            return Err(LlmError::MissingApiKey);
        }

        let client = http_client(&config)?;
        Ok(Self {
            client,
            config,
            api_key,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }
}

#[async_trait]
impl ChatBackend for OpenAiClient {
    async fn complete(&self, system: &str, user: &str) -> Result<String, LlmError> {
        let request = OpenAiChatRequest {
            model: self.config.model.clone(),
            messages: messages(system, user),
            temperature: self.config.temperature,
        };

        let response = self
            .client
            .post(self.url("/chat/completions"))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<OpenAiErrorResponse>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            tracing::error!(code = status.as_u16(), message = %message, "Chat completion API error");
            return Err(LlmError::Api {
                code: status.as_u16(),
                message,
            });
        }

        let chat: OpenAiChatResponse = response.json().await?;
        let content = chat
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .unwrap_or_default();
        non_empty(content)
    }

    async fn health_check(&self) -> bool {
        match self
            .client
            .get(self.url("/models"))
            .bearer_auth(&self.api_key)
            .send()
            .await
        {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }

    fn name(&self) -> &str {
        "openai"
    }

    fn model(&self) -> &str {
        &self.config.model
    }
}

// ============================================================================
// Reply cleanup
// ============================================================================

/// Body of a single Markdown code fence wrapping the whole reply, or the
/// trimmed reply itself when it is not fenced. A language tag ends at a
/// newline, or at a space for the common tags of one-line fences.
pub fn strip_code_fence(reply: &str) -> String {
    static FENCE: OnceLock<Regex> = OnceLock::new();
    let fence = FENCE.get_or_init(|| {
        Regex::new(
            r"(?s)^```(?:[A-Za-z0-9_+-]*[ \t]*\r?\n|(?i:sql|sqlite|json|text)[ \t]+)?(.*?)\r?\n?```$",
        )
        .expect("static regex")
    });
    let trimmed = reply.trim();
    match fence.captures(trimmed) {
        Some(caps) => caps[1].trim().to_string(),
        None => trimmed.to_string(),
    }
}

/// First `{ ... }` span of a reply, tolerating fences and prose around it.
pub fn extract_json_object(reply: &str) -> Option<String> {
    let body = strip_code_fence(reply);
    let start = body.find('{')?;
    let end = body.rfind('}')?;
    (end > start).then(|| body[start..=end].to_string())
}

// ============================================================================
// TESTS
// ============================================================================
