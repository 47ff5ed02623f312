//! Core types for the backend gateway.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::error::ProviderError;

/// Chat message role.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
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

/// A chat message. A conversation is an ordered slice of these; the harness
/// always builds conversations of shape `[system=objective, user=prompt]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
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

/// Build the standard evaluation conversation for one prompt.
pub fn conversation(objective: &str, prompt: &str) -> Vec<Message> {
    vec![Message::system(objective), Message::user(prompt)]
}

/// Validate the conversation shape every adapter expects: non-empty, ending
/// with a user message.
pub fn validate_conversation(messages: &[Message]) -> Result<(), ProviderError> {
    let Some(last) = messages.last() else {
        return Err(ProviderError::invalid_request("conversation is empty"));
    };
    if last.role != Role::User {
        return Err(ProviderError::invalid_request(
            "conversation must end with a user message",
        ));
    }
    Ok(())
}

/// Flatten a conversation into a single role-tagged prompt string.
///
/// Used by adapters for completion-style APIs that take one flat prompt
/// instead of structured messages. Deterministic: same conversation, same
/// string. The trailing `assistant:` tag cues the model to answer in the
/// assistant role.
pub fn flatten_conversation(messages: &[Message]) -> String {
    let mut out = String::new();
    for m in messages {
        out.push_str(m.role.as_str());
        out.push_str(": ");
        out.push_str(&m.content);
        out.push_str("\n\n");
    }
    out.push_str("assistant:");
    out
}

/// Reason the model stopped generating.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FinishReason {
    Stop,
    Length,
    ContentFilter,
    Unknown(String),
}

impl From<Option<String>> for FinishReason {
    fn from(s: Option<String>) -> Self {
        match s.as_deref() {
            Some("stop") | Some("COMPLETE") => FinishReason::Stop,
            Some("length") | Some("MAX_TOKENS") => FinishReason::Length,
            Some("content_filter") => FinishReason::ContentFilter,
            Some(other) => FinishReason::Unknown(other.to_string()),
            None => FinishReason::Unknown("none".to_string()),
        }
    }
}

/// Response from a chat completion.
#[derive(Debug, Clone)]
pub struct ChatResponse {
    /// Generated content.
    pub content: String,
    /// Input tokens consumed, if the provider reported usage.
    pub input_tokens: u32,
    /// Output tokens generated, if the provider reported usage.
    pub output_tokens: u32,
    /// Time taken for the request.
    pub latency: Duration,
    /// Why the model stopped.
    pub finish_reason: FinishReason,
}

impl ChatResponse {
    pub fn empty() -> Self {
        Self {
            content: String::new(),
            input_tokens: 0,
            output_tokens: 0,
            latency: Duration::ZERO,
            finish_reason: FinishReason::Unknown("none".to_string()),
        }
    }
}
