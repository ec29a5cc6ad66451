use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use gradeloop_types::{DurationUsage, GenerationOptions, TokenUsage};

/// Message role in a chat conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A role-tagged message sent to the model backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Non-streaming completion result as returned by a backend. `content` is
/// kept as raw JSON: the retry layer accepts an attempt only when it is
/// textual, so a backend returning any other shape counts as a failure.
#[derive(Debug, Clone)]
pub struct ChatResponse {
    pub content: Value,
    pub usage: Option<TokenUsage>,
    pub duration: Option<DurationUsage>,
}

/// The model backend collaborator. Implementations own their transport; the
/// orchestrator only consumes the outcome.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn chat(
        &self,
        model: &str,
        messages: &[ChatMessage],
        options: &GenerationOptions,
    ) -> Result<ChatResponse>;
}

/// Backend speaking the Ollama `/api/chat` non-streaming JSON protocol.
pub struct OllamaBackend {
    client: reqwest::Client,
    base_url: String,
}

impl OllamaBackend {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl ChatBackend for OllamaBackend {
    async fn chat(
        &self,
        model: &str,
        messages: &[ChatMessage],
        options: &GenerationOptions,
    ) -> Result<ChatResponse> {
        let body = build_request_body(model, messages, options);
        let url = format!("{}/api/chat", self.base_url);
        let resp = self
            .client
            .post(&url)
            .timeout(Duration::from_millis(options.timeout_ms))
            .json(&body)
            .send()
            .await
            .with_context(|| format!("Request to {} failed", url))?
            .error_for_status()
            .context("Backend returned an error status")?;
        let v: Value = resp.json().await.context("Invalid JSON from backend")?;
        Ok(parse_response(v))
    }
}

/// Map generation options onto the Ollama request shape. The system prompt
/// travels as a leading `system` message.
pub(crate) fn build_request_body(
    model: &str,
    messages: &[ChatMessage],
    options: &GenerationOptions,
) -> Value {
    let mut wire_messages: Vec<Value> = Vec::with_capacity(messages.len() + 1);
    if !options.system_prompt.is_empty() {
        wire_messages.push(json!({ "role": "system", "content": options.system_prompt }));
    }
    for m in messages {
        wire_messages.push(json!({ "role": m.role, "content": m.content }));
    }

    json!({
        "model": model,
        "messages": wire_messages,
        "stream": false,
        "options": {
            "num_predict": options.max_output_tokens,
            "temperature": options.temperature,
            "top_p": options.top_p,
            "presence_penalty": options.presence_penalty,
            "frequency_penalty": options.frequency_penalty,
        }
    })
}

pub(crate) fn parse_response(v: Value) -> ChatResponse {
    let usage = match (
        v.get("prompt_eval_count").and_then(Value::as_u64),
        v.get("eval_count").and_then(Value::as_u64),
    ) {
        (Some(prompt), Some(completion)) => Some(TokenUsage {
            total_tokens: prompt + completion,
            prompt_tokens: prompt,
            completion_tokens: completion,
        }),
        _ => None,
    };

    let duration = v
        .get("total_duration")
        .and_then(Value::as_u64)
        .map(|total| DurationUsage {
            total_duration: total,
            load_duration: v.get("load_duration").and_then(Value::as_u64).unwrap_or(0),
            prompt_eval_duration: v
                .get("prompt_eval_duration")
                .and_then(Value::as_u64)
                .unwrap_or(0),
            eval_duration: v.get("eval_duration").and_then(Value::as_u64).unwrap_or(0),
        });

    let content = v
        .get("message")
        .and_then(|m| m.get("content"))
        .cloned()
        .unwrap_or(Value::Null);

    ChatResponse {
        content,
        usage,
        duration,
    }
}
