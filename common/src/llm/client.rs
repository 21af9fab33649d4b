// OpenAI-compatible commit message generator

use crate::config::LlmConfig;
use crate::errors::GenerationError;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const SYSTEM_PROMPT: &str = "You generate concise git commit messages in conventional format.";

const USER_PROMPT: &str = "You are a Git commit message generator. Your task is to write a clear, \
concise commit message in the conventional commit format (type: description) based on the \
following Git diff. Focus only on the most important changes, and keep the message under 72 \
characters. Respond with ONLY the commit message, nothing else, do not add any other prefix or \
suffix.";

/// Source of generated commit messages
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MessageGenerator: Send + Sync {
    /// Whether generation can be attempted at all
    fn has_credentials(&self) -> bool;

    /// Generate a commit message for `diff`
    async fn generate(&self, diff: &str) -> Result<String, GenerationError>;
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

/// Chat-completions client for OpenAI-compatible endpoints
pub struct OpenAiClient {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    max_tokens: u32,
    max_diff_chars: usize,
}

impl OpenAiClient {
    /// Create a client from the LLM settings
    pub fn new(config: &LlmConfig) -> Result<Self, GenerationError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| {
                GenerationError::Request(format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.trim().to_string(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            max_diff_chars: config.max_diff_chars,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    fn prompt(&self, diff: &str) -> String {
        format!(
            "{}\n\nDiff:\n{}",
            USER_PROMPT,
            truncate_chars(diff, self.max_diff_chars)
        )
    }
}

#[async_trait]
impl MessageGenerator for OpenAiClient {
    fn has_credentials(&self) -> bool {
        !self.api_key.is_empty()
    }

    #[tracing::instrument(skip(self, diff), fields(model = %self.model, diff_len = diff.len()))]
    async fn generate(&self, diff: &str) -> Result<String, GenerationError> {
        if !self.has_credentials() {
            return Err(GenerationError::MissingCredentials);
        }

        let prompt = self.prompt(diff);
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: &prompt,
                },
            ],
            max_tokens: (self.max_tokens > 0).then_some(self.max_tokens),
        };

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(match serde_json::from_str::<ErrorResponse>(&body) {
                Ok(err) => GenerationError::Api(err.error.message),
                Err(_) => GenerationError::Status(status.as_u16()),
            });
        }

        let body = response.text().await?;
        let parsed: ChatResponse = serde_json::from_str(&body)
            .map_err(|e| GenerationError::MalformedResponse(e.to_string()))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or(GenerationError::EmptyResponse)?;

        let message = clean_message(&content);
        if message.is_empty() {
            return Err(GenerationError::EmptyResponse);
        }

        tracing::debug!(message = %message, "Generated commit message");
        Ok(message)
    }
}

/// Trim surrounding whitespace and quote characters from a generated message
pub fn clean_message(raw: &str) -> String {
    raw.trim()
        .trim_matches(|c| c == '"' || c == '\'')
        .trim()
        .to_string()
}

fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
