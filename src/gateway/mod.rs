//! Backend gateway: one uniform chat-completion capability over
//! heterogeneous provider APIs.

pub mod cohere;
pub mod completions;
pub mod error;
pub mod openai;
pub mod types;
pub mod usage;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::sleep;
use tracing::warn;

use usage::{BackendCallRecord, CallStatus, UsageSink as UsageSinkTrait};

pub use cohere::CohereAdapter;
pub use completions::OpenAiCompletionsAdapter;
pub use error::{ErrorContext, ProviderError};
pub use openai::OpenAiChatAdapter;
pub use types::{
    conversation, flatten_conversation, validate_conversation, ChatResponse, FinishReason,
    Message, Role,
};
pub use usage::{NoopUsageSink, StderrUsageSink, UsageSink};

/// The model-adapter capability: send a conversation, get assistant text.
///
/// Implementations perform one network call per invocation, hold no state
/// between calls, and are safe to invoke concurrently.
#[async_trait::async_trait]
pub trait ChatBackend: Send + Sync {
    async fn complete_chat(&self, conversation: &[Message]) -> Result<ChatResponse, ProviderError>;

    /// Provider name for logging ("openai", "cohere", ...).
    fn provider(&self) -> &'static str;

    /// Model identifier within the provider.
    fn model_id(&self) -> &str;
}

/// Retry configuration for the gateway.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub max_retries: u32,
    pub retry_base_delay: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            retry_base_delay: Duration::from_secs(1),
        }
    }
}

/// Wraps a concrete adapter with conversation validation, bounded retry and
/// usage recording. Errors surfaced from here are post-retry: a caller that
/// sees one knows the backend-level retry budget is spent.
pub struct BackendGateway<U: UsageSinkTrait> {
    inner: Arc<dyn ChatBackend>,
    usage_sink: Arc<U>,
    config: GatewayConfig,
}

impl<U: UsageSinkTrait> BackendGateway<U> {
    pub fn new(inner: Arc<dyn ChatBackend>, usage_sink: Arc<U>, config: GatewayConfig) -> Self {
        Self {
            inner,
            usage_sink,
            config,
        }
    }

    async fn record_usage(&self, resp: &ChatResponse, status: CallStatus, error_code: Option<String>) {
        self.usage_sink
            .record(BackendCallRecord {
                provider: self.inner.provider(),
                model: self.inner.model_id().to_string(),
                input_tokens: resp.input_tokens,
                output_tokens: resp.output_tokens,
                latency_ms: resp.latency.as_millis() as u64,
                status,
                error_code,
                timestamp: Utc::now(),
            })
            .await;
    }
}

#[async_trait::async_trait]
impl<U: UsageSinkTrait> ChatBackend for BackendGateway<U> {
    async fn complete_chat(&self, conversation: &[Message]) -> Result<ChatResponse, ProviderError> {
        validate_conversation(conversation)?;

        let mut last_error: Option<ProviderError> = None;

        for attempt in 0..=self.config.max_retries {
            match self.inner.complete_chat(conversation).await {
                Ok(resp) => {
                    self.record_usage(&resp, CallStatus::Success, None).await;
                    return Ok(resp);
                }
                Err(err) => {
                    let code = err.code().to_string();
                    self.record_usage(&ChatResponse::empty(), CallStatus::Error, Some(code))
                        .await;

                    if !err.is_retryable() || attempt == self.config.max_retries {
                        return Err(err);
                    }

                    let delay = backoff_delay(self.config.retry_base_delay, attempt);
                    warn!(
                        provider = self.inner.provider(),
                        model = self.inner.model_id(),
                        error = %err,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "backend call failed, retrying"
                    );
                    last_error = Some(err);
                    sleep(delay).await;
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| ProviderError::provider("gateway", "unknown error", false)))
    }

    fn provider(&self) -> &'static str {
        self.inner.provider()
    }

    fn model_id(&self) -> &str {
        self.inner.model_id()
    }
}

fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let multiplier = 2u64.pow(attempt.min(5));
    base * multiplier as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_per_attempt() {
        let base = Duration::from_millis(100);
        assert_eq!(backoff_delay(base, 0), Duration::from_millis(100));
        assert_eq!(backoff_delay(base, 1), Duration::from_millis(200));
        assert_eq!(backoff_delay(base, 3), Duration::from_millis(800));
        // Exponent caps so the delay stays bounded.
        assert_eq!(backoff_delay(base, 40), backoff_delay(base, 5));
    }
}
