//! OpenAI adapter for completion-style (flat prompt) models.
//!
//! Older instruct models take one prompt string rather than structured
//! messages. The adapter flattens the conversation into a role-tagged prompt
//! so callers see the same conversation contract as everywhere else.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::error::ProviderError;
use super::openai::{
    build_bearer_client, check_input_size, extract_request_id, openai_status_error,
    read_capped_body,
};
use super::types::{flatten_conversation, ChatResponse, FinishReason, Message};
use super::ChatBackend;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Hard cap on generated tokens for a flat completion. Without a stop
/// condition the instruct models will happily continue the dialogue
/// transcript past the assistant turn.
const COMPLETION_MAX_TOKENS: u32 = 512;

#[derive(Debug, Clone)]
pub struct OpenAiCompletionsAdapter {
    client: reqwest::Client,
    base_url: String,
    model: String,
}

impl OpenAiCompletionsAdapter {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Result<Self, ProviderError> {
        Self::with_config(api_key, DEFAULT_BASE_URL, Duration::from_secs(120), model)
    }

    pub fn with_config(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        timeout: Duration,
        model: impl Into<String>,
    ) -> Result<Self, ProviderError> {
        let client = build_bearer_client(&api_key.into(), timeout)?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            model: model.into(),
        })
    }

    fn completions_url(&self) -> String {
        format!("{}/completions", self.base_url)
    }
}

#[derive(Serialize)]
struct CompletionApiRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    temperature: f32,
    max_tokens: u32,
    stop: [&'a str; 2],
}

#[derive(Deserialize)]
struct CompletionApiResponse {
    choices: Option<Vec<CompletionChoice>>,
    error: Option<super::openai::ApiError>,
    usage: Option<super::openai::Usage>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    text: Option<String>,
    finish_reason: Option<String>,
}

#[async_trait]
impl ChatBackend for OpenAiCompletionsAdapter {
    async fn complete_chat(&self, conversation: &[Message]) -> Result<ChatResponse, ProviderError> {
        let prompt = flatten_conversation(conversation);
        check_input_size(prompt.len())?;

        let start = Instant::now();

        let api_req = CompletionApiRequest {
            model: &self.model,
            prompt: &prompt,
            temperature: 0.0,
            max_tokens: COMPLETION_MAX_TOKENS,
            // Stop before the transcript invents the next turn.
            stop: ["\nuser:", "\nsystem:"],
        };

        let response = self
            .client
            .post(self.completions_url())
            .json(&api_req)
            .send()
            .await?;

        let status = response.status();
        let request_id = extract_request_id(response.headers());
        let body = read_capped_body(response, "openai").await?;

        if !status.is_success() {
            return Err(openai_status_error("openai", status.as_u16(), &body, request_id));
        }

        let parsed: CompletionApiResponse = serde_json::from_str(&body)
            .map_err(|e| ProviderError::provider("openai", format!("Invalid JSON: {e}"), false))?;

        if let Some(error) = parsed.error {
            return Err(ProviderError::provider(
                "openai",
                error.message.unwrap_or_default(),
                false,
            ));
        }

        let choice = parsed
            .choices
            .and_then(|c| c.into_iter().next())
            .ok_or_else(|| ProviderError::provider("openai", "No choices in response", false))?;

        let content = choice.text.unwrap_or_default().trim().to_string();

        let usage = parsed.usage;
        Ok(ChatResponse {
            content,
            input_tokens: usage.as_ref().and_then(|u| u.prompt_tokens).unwrap_or(0),
            output_tokens: usage.as_ref().and_then(|u| u.completion_tokens).unwrap_or(0),
            latency: start.elapsed(),
            finish_reason: FinishReason::from(choice.finish_reason),
        })
    }

    fn provider(&self) -> &'static str {
        "openai"
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}
