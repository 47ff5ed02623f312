//! Usage tracking via the UsageSink trait.
//!
//! The gateway logs every backend call through a UsageSink. This decouples
//! the gateway from any specific destination:
//! - CLI runs use NoopUsageSink or StderrUsageSink
//! - Tests use NoopUsageSink or a capturing sink

use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Status of a backend call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallStatus {
    Success,
    Error,
}

impl CallStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallStatus::Success => "success",
            CallStatus::Error => "error",
        }
    }
}

/// Record of one backend API call.
#[derive(Debug, Clone)]
pub struct BackendCallRecord {
    /// Provider name: "openai", "cohere", etc.
    pub provider: &'static str,
    /// Model used.
    pub model: String,
    /// Input tokens consumed.
    pub input_tokens: u32,
    /// Output tokens generated.
    pub output_tokens: u32,
    /// Latency in milliseconds.
    pub latency_ms: u64,
    /// Call status.
    pub status: CallStatus,
    /// Error code if status is Error.
    pub error_code: Option<String>,
    /// When the call was made.
    pub timestamp: DateTime<Utc>,
}

/// Sink for backend call records.
#[async_trait]
pub trait UsageSink: Send + Sync + 'static {
    async fn record(&self, record: BackendCallRecord);
}

/// Sink that discards all records.
pub struct NoopUsageSink;

#[async_trait]
impl UsageSink for NoopUsageSink {
    async fn record(&self, _record: BackendCallRecord) {}
}

/// Sink that writes one line per call to stderr.
pub struct StderrUsageSink;

#[async_trait]
impl UsageSink for StderrUsageSink {
    async fn record(&self, record: BackendCallRecord) {
        eprintln!(
            "[usage] {} {} {} in={} out={} {}ms{}",
            record.timestamp.to_rfc3339(),
            record.provider,
            record.model,
            record.input_tokens,
            record.output_tokens,
            record.latency_ms,
            match &record.error_code {
                Some(code) => format!(" error={code}"),
                None => String::new(),
            }
        );
    }
}
