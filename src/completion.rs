//! Chat completion client.
//!
//! [`CompletionModel`] is the seam the chat session talks through; the
//! production implementation calls an OpenAI-compatible
//! `POST /chat/completions` endpoint. Errors propagate to the caller (the
//! session decides which failures are degradations and which are hard);
//! no retry is performed.

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::CompletionConfig;

/// Message role on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl std::str::FromStr for Role {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "system" => Ok(Role::System),
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            other => bail!("unknown chat role: {other}"),
        }
    }
}

/// One turn of conversation as sent to the completion model.
#[derive(Debug, Clone, Serialize)]
pub struct ChatTurn {
    pub role: Role,
    pub content: String,
}

impl ChatTurn {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Instruction-following completion service.
#[async_trait]
pub trait CompletionModel: Send + Sync {
    /// Generate the next assistant message for `messages`.
    async fn complete(&self, messages: &[ChatTurn]) -> Result<String>;
}

/// Production implementation over an OpenAI-compatible API. Requires
/// `OPENAI_API_KEY` in the environment at construction time.
pub struct OpenAiChat {
    http: reqwest::Client,
    url: String,
    model: String,
    api_key: String,
}

impl OpenAiChat {
    pub fn new(config: &CompletionConfig) -> Result<Self> {
        let api_key = match std::env::var("OPENAI_API_KEY") {
            Ok(key) => key,
            Err(_) => bail!("OPENAI_API_KEY environment variable not set"),
        };

        // The HTTP timeout backstops the session-level deadline; give it
        // headroom so the session's timer is the one that fires.
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs * 2))
            .build()?;

        Ok(Self {
            http,
            url: config.url.clone(),
            model: config.model.clone(),
            api_key,
        })
    }
}

#[async_trait]
impl CompletionModel for OpenAiChat {
    async fn complete(&self, messages: &[ChatTurn]) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": messages,
        });

        let response = self
            .http
            .post(format!("{}/chat/completions", self.url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            bail!("chat completions API error {status}: {body_text}");
        }

        let json: serde_json::Value = response.json().await?;
        parse_completion_response(&json)
    }
}

/// Extract `choices[0].message.content` from a chat-completions response.
fn parse_completion_response(json: &serde_json::Value) -> Result<String> {
    json.get("choices")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
        .and_then(|choice| choice.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| {
            anyhow::anyhow!("invalid chat completions response: missing choices[0].message.content")
        })
}
