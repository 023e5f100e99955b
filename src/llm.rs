//! Chat-completion client for an OpenAI-compatible endpoint.
//!
//! One blocking request per prompt. There is no retry, backoff or caching;
//! any failure comes back as an [`LlmError`] for the caller to place.

use crate::config::Settings;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A two-message completion request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatRequest {
    pub system: String,
    pub user: String,
    pub max_tokens: u32,
}

/// Why a completion could not be obtained.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LlmError {
    #[error("request failed: {0}")]
    Transport(String),
    #[error("API returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("could not decode response: {0}")]
    Decode(String),
    #[error("response contained no completion choices")]
    NoChoices,
    #[error("first completion choice has no message content")]
    MissingContent,
}

/// Anything that can turn a [`ChatRequest`] into completion text.
///
/// `Sync` so one client can serve several worker threads.
pub trait CompletionClient: Sync {
    fn complete(&self, request: &ChatRequest) -> Result<String, LlmError>;
}

// ============================================================================
// Wire format
// ============================================================================

#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct CompletionBody<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

fn request_body<'a>(model: &'a str, request: &'a ChatRequest) -> CompletionBody<'a> {
    CompletionBody {
        model,
        messages: vec![
            WireMessage {
                role: "system",
                content: &request.system,
            },
            WireMessage {
                role: "user",
                content: &request.user,
            },
        ],
        max_tokens: request.max_tokens,
    }
}

/// Extract the first choice's content from a response body.
pub fn parse_completion(body: &str) -> Result<String, LlmError> {
    let response: CompletionResponse =
        serde_json::from_str(body).map_err(|e| LlmError::Decode(e.to_string()))?;
    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or(LlmError::NoChoices)?;
    choice.message.content.ok_or(LlmError::MissingContent)
}

// ============================================================================
// Groq client
// ============================================================================

/// Client for Groq's OpenAI-compatible chat-completion API.
pub struct GroqClient {
    http: reqwest::blocking::Client,
    endpoint: String,
    model: String,
    api_key: String,
}

impl GroqClient {
    pub fn new(api_key: &str, settings: &Settings) -> anyhow::Result<Self> {
        if api_key.trim().is_empty() {
            anyhow::bail!("An API key is required");
        }
        let http = reqwest::blocking::Client::builder().build()?;
        Ok(Self {
            http,
            endpoint: format!("{}/chat/completions", settings.base_url.trim_end_matches('/')),
            model: settings.model.clone(),
            api_key: api_key.trim().to_string(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl fmt::Debug for GroqClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GroqClient")
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

impl CompletionClient for GroqClient {
    fn complete(&self, request: &ChatRequest) -> Result<String, LlmError> {
        log::debug!(
            "POST {} ({} prompt chars, max_tokens={})",
            self.endpoint,
            request.user.len(),
            request.max_tokens
        );

        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request_body(&self.model, request))
            .send()
            .map_err(|e| LlmError::Transport(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .map_err(|e| LlmError::Transport(e.to_string()))?;

        if !status.is_success() {
            return Err(LlmError::Status {
                status: status.as_u16(),
                body,
            });
        }

        parse_completion(&body)
    }
}
