//! OpenAI adapter for chat-structured completions.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};

use super::error::{ErrorContext, ProviderError};
use super::types::{ChatResponse, FinishReason, Message};
use super::ChatBackend;

/// Maximum allowed response content length (1MB).
pub(crate) const MAX_RESPONSE_LEN: usize = 1_024 * 1_024;

/// Maximum allowed input characters (~125k tokens).
pub(crate) const MAX_INPUT_CHARS: usize = 500_000;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// OpenAI chat completions adapter. Sends the conversation as structured
/// messages, the native shape for this API.
#[derive(Debug, Clone)]
pub struct OpenAiChatAdapter {
    client: reqwest::Client,
    base_url: String,
    model: String,
}

impl OpenAiChatAdapter {
    /// Create from API key, with the default endpoint and timeout.
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Result<Self, ProviderError> {
        Self::with_config(api_key, DEFAULT_BASE_URL, Duration::from_secs(120), model)
    }

    /// Create with custom configuration. The base URL override is what lets
    /// tests point the adapter at a local mock server.
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

    fn chat_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

/// Build a reqwest client with JSON content type and bearer auth headers.
pub(crate) fn build_bearer_client(
    api_key: &str,
    timeout: Duration,
) -> Result<reqwest::Client, ProviderError> {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

    let auth_value = HeaderValue::from_str(&format!("Bearer {api_key}"))
        .map_err(|_| ProviderError::config("Invalid API key format"))?;
    headers.insert(AUTHORIZATION, auth_value);

    reqwest::Client::builder()
        .timeout(timeout)
        .default_headers(headers)
        .gzip(true)
        .build()
        .map_err(|e| ProviderError::config(format!("Failed to create HTTP client: {e}")))
}

/// Extract request ID from response headers.
pub(crate) fn extract_request_id(headers: &reqwest::header::HeaderMap) -> Option<String> {
    headers
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
}

/// Read the response body with a size cap, so a misbehaving provider cannot
/// balloon memory.
pub(crate) async fn read_capped_body(
    mut response: reqwest::Response,
    provider: &'static str,
) -> Result<String, ProviderError> {
    let mut bytes = Vec::new();
    while let Some(chunk) = response.chunk().await? {
        let new_len = bytes.len() + chunk.len();
        if new_len > MAX_RESPONSE_LEN {
            return Err(ProviderError::provider(
                provider,
                format!("Response too large: {new_len} bytes"),
                false,
            ));
        }
        bytes.extend_from_slice(&chunk);
    }
    Ok(String::from_utf8_lossy(&bytes).to_string())
}

pub(crate) fn check_input_size(total_chars: usize) -> Result<(), ProviderError> {
    if total_chars > MAX_INPUT_CHARS {
        return Err(ProviderError::invalid_request(format!(
            "Input too large: {total_chars} chars (max {MAX_INPUT_CHARS})"
        )));
    }
    Ok(())
}

// =============================================================================
// API TYPES
// =============================================================================

#[derive(Serialize)]
struct ChatApiRequest<'a> {
    model: &'a str,
    messages: &'a [ApiMessage],
    temperature: f32,
}

#[derive(Serialize)]
struct ApiMessage {
    role: &'static str,
    content: String,
}

impl From<&Message> for ApiMessage {
    fn from(m: &Message) -> Self {
        Self {
            role: m.role.as_str(),
            content: m.content.clone(),
        }
    }
}

#[derive(Deserialize)]
struct ChatApiResponse {
    choices: Option<Vec<Choice>>,
    usage: Option<Usage>,
    error: Option<ApiError>,
}

#[derive(Deserialize)]
struct Choice {
    message: Option<ChoiceMessage>,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
pub(crate) struct Usage {
    pub prompt_tokens: Option<u32>,
    pub completion_tokens: Option<u32>,
}

#[derive(Deserialize)]
pub(crate) struct ApiError {
    pub message: Option<String>,
    pub code: Option<String>,
}

/// Map a non-success OpenAI-shaped status/body to a ProviderError.
pub(crate) fn openai_status_error(
    provider: &'static str,
    status: u16,
    body: &str,
    request_id: Option<String>,
) -> ProviderError {
    let ctx = ErrorContext::new().with_status(status);
    let ctx = if let Some(id) = request_id {
        ctx.with_request_id(id)
    } else {
        ctx
    };

    if let Ok(parsed) = serde_json::from_str::<ChatApiResponse>(body) {
        if let Some(error) = parsed.error {
            let message = error.message.unwrap_or_default();
            let ctx = if let Some(code) = error.code {
                ctx.with_code(code)
            } else {
                ctx
            };

            return match status {
                429 => ProviderError::rate_limited(Duration::from_secs(60), ctx),
                _ => ProviderError::provider_with_context(provider, message, status >= 500, ctx),
            };
        }
    }

    match status {
        429 => ProviderError::rate_limited(Duration::from_secs(60), ctx),
        _ => ProviderError::provider_with_context(
            provider,
            format!("HTTP {status}"),
            status >= 500,
            ctx,
        ),
    }
}

// =============================================================================
// CHAT BACKEND IMPL
// =============================================================================

#[async_trait]
impl ChatBackend for OpenAiChatAdapter {
    async fn complete_chat(&self, conversation: &[Message]) -> Result<ChatResponse, ProviderError> {
        let total_chars: usize = conversation.iter().map(|m| m.content.len()).sum();
        check_input_size(total_chars)?;

        let start = Instant::now();

        let messages: Vec<ApiMessage> = conversation.iter().map(ApiMessage::from).collect();
        let api_req = ChatApiRequest {
            model: &self.model,
            messages: &messages,
            temperature: 0.0,
        };

        let response = self.client.post(self.chat_url()).json(&api_req).send().await?;

        let status = response.status();
        let request_id = extract_request_id(response.headers());
        let body = read_capped_body(response, "openai").await?;

        if !status.is_success() {
            return Err(openai_status_error("openai", status.as_u16(), &body, request_id));
        }

        let parsed: ChatApiResponse = serde_json::from_str(&body)
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

        let content = choice
            .message
            .and_then(|m| m.content)
            .unwrap_or_default()
            .trim()
            .to_string();

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
