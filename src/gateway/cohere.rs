//! Cohere adapter for the generate (flat prompt) API.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::error::{ErrorContext, ProviderError};
use super::openai::{build_bearer_client, check_input_size, read_capped_body};
use super::types::{flatten_conversation, ChatResponse, FinishReason, Message};
use super::ChatBackend;

const DEFAULT_BASE_URL: &str = "https://api.cohere.ai/v1";

const GENERATE_MAX_TOKENS: u32 = 512;

/// Cohere generate adapter. Like the completions adapter it takes a single
/// flat prompt, so the conversation is flattened the same deterministic way.
#[derive(Debug, Clone)]
pub struct CohereAdapter {
    client: reqwest::Client,
    base_url: String,
    model: String,
}

impl CohereAdapter {
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

    fn generate_url(&self) -> String {
        format!("{}/generate", self.base_url)
    }
}

#[derive(Serialize)]
struct GenerateApiRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct GenerateApiResponse {
    generations: Option<Vec<Generation>>,
    message: Option<String>,
}

#[derive(Deserialize)]
struct Generation {
    text: Option<String>,
    finish_reason: Option<String>,
}

#[async_trait]
impl ChatBackend for CohereAdapter {
    async fn complete_chat(&self, conversation: &[Message]) -> Result<ChatResponse, ProviderError> {
        let prompt = flatten_conversation(conversation);
        check_input_size(prompt.len())?;

        let start = Instant::now();

        let api_req = GenerateApiRequest {
            model: &self.model,
            prompt: &prompt,
            temperature: 0.0,
            max_tokens: GENERATE_MAX_TOKENS,
        };

        let response = self
            .client
            .post(self.generate_url())
            .json(&api_req)
            .send()
            .await?;

        let status = response.status();
        let body = read_capped_body(response, "cohere").await?;

        if !status.is_success() {
            let ctx = ErrorContext::new().with_status(status.as_u16());
            let message = serde_json::from_str::<GenerateApiResponse>(&body)
                .ok()
                .and_then(|r| r.message)
                .unwrap_or_else(|| format!("HTTP {}", status.as_u16()));

            return Err(match status.as_u16() {
                429 => ProviderError::rate_limited(Duration::from_secs(60), ctx),
                s => ProviderError::provider_with_context("cohere", message, s >= 500, ctx),
            });
        }

        let parsed: GenerateApiResponse = serde_json::from_str(&body)
            .map_err(|e| ProviderError::provider("cohere", format!("Invalid JSON: {e}"), false))?;

        let generation = parsed
            .generations
            .and_then(|g| g.into_iter().next())
            .ok_or_else(|| ProviderError::provider("cohere", "No generations in response", false))?;

        let content = generation.text.unwrap_or_default().trim().to_string();

        // Cohere's generate endpoint reports no token usage in this shape.
        Ok(ChatResponse {
            content,
            input_tokens: 0,
            output_tokens: 0,
            latency: start.elapsed(),
            finish_reason: FinishReason::from(generation.finish_reason),
        })
    }

    fn provider(&self) -> &'static str {
        "cohere"
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}
