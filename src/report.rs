//! Result rendering and trace capture.
//!
//! Both are consumers of the orchestrator's result stream, not part of the
//! evaluation core: a plain-text renderer for terminals and a JSONL sink
//! that streams one record per completed comparison.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::mpsc;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::eval::{ComparisonOutcome, ComparisonResult};
use crate::judge::Verdict;

#[derive(Debug, Clone, Serialize)]
pub struct ComparisonTrace {
    pub timestamp_ms: i64,
    pub comparison_index: usize,
    pub judge: String,
    #[serde(flatten)]
    pub result: ComparisonResult,
}

#[derive(Debug, thiserror::Error)]
pub enum TraceError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(String),
    #[error("trace channel closed")]
    Closed,
    #[error("trace worker failed: {0}")]
    Join(String),
}

pub trait TraceSink: Send + Sync {
    fn record(&self, event: ComparisonTrace) -> Result<(), TraceError>;
}

/// Streams trace records to a JSONL file from a dedicated writer thread, so
/// recording never blocks an in-flight comparison on file I/O.
#[derive(Clone)]
pub struct JsonlTraceSink {
    sender: mpsc::Sender<ComparisonTrace>,
}

pub struct TraceWorker {
    handle: Option<std::thread::JoinHandle<Result<(), TraceError>>>,
}

impl TraceWorker {
    pub fn join(mut self) -> Result<(), TraceError> {
        let handle = self.handle.take();
        match handle {
            Some(handle) => match handle.join() {
                Ok(result) => result,
                Err(_) => Err(TraceError::Join("trace worker panicked".to_string())),
            },
            None => Ok(()),
        }
    }
}

impl JsonlTraceSink {
    pub fn new(path: impl AsRef<Path>) -> Result<(Self, TraceWorker), TraceError> {
        let file = std::fs::File::create(path)?;
        let (sender, receiver) = mpsc::channel::<ComparisonTrace>();
        let handle = std::thread::spawn(move || write_trace_loop(file, receiver));
        Ok((
            Self { sender },
            TraceWorker {
                handle: Some(handle),
            },
        ))
    }
}

impl TraceSink for JsonlTraceSink {
    fn record(&self, event: ComparisonTrace) -> Result<(), TraceError> {
        self.sender.send(event).map_err(|_| TraceError::Closed)
    }
}

fn write_trace_loop(
    file: std::fs::File,
    receiver: mpsc::Receiver<ComparisonTrace>,
) -> Result<(), TraceError> {
    let mut writer = BufWriter::new(file);
    for event in receiver {
        let line = serde_json::to_string(&event).map_err(|e| TraceError::Serde(e.to_string()))?;
        writeln!(writer, "{line}")?;
    }
    writer.flush()?;
    Ok(())
}

pub fn now_epoch_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

// =============================================================================
// Text rendering
// =============================================================================

/// Times each model was preferred, keyed by model name. A raw tally for the
/// footer; deliberately not a ranking.
pub fn preferred_counts(results: &[ComparisonResult]) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for r in results {
        let preferred = match r.verdict() {
            Some(Verdict::FirstPreferred) => Some(r.model_a.clone()),
            Some(Verdict::SecondPreferred) => Some(r.model_b.clone()),
            _ => None,
        };
        if let Some(name) = preferred {
            *counts.entry(name).or_insert(0) += 1;
        }
    }
    counts
}

fn outcome_line(result: &ComparisonResult) -> String {
    match &result.outcome {
        ComparisonOutcome::Judged { verdict } => match verdict {
            Verdict::FirstPreferred => format!("preferred: {}", result.model_a),
            Verdict::SecondPreferred => format!("preferred: {}", result.model_b),
            Verdict::Invalid => "preferred: none (judge output unrecognized)".to_string(),
        },
        ComparisonOutcome::CandidateFailed { failure_a, failure_b } => {
            let mut parts = Vec::new();
            if let Some(f) = failure_a {
                parts.push(format!("{} failed ({})", result.model_a, f.error_code));
            }
            if let Some(f) = failure_b {
                parts.push(format!("{} failed ({})", result.model_b, f.error_code));
            }
            format!("skipped: {}", parts.join(", "))
        }
        ComparisonOutcome::JudgeFailed { failure } => {
            format!("judge failed ({})", failure.error_code)
        }
    }
}

/// Render a result sequence for a terminal.
pub fn render_results(results: &[ComparisonResult]) -> String {
    let mut out = String::new();

    for (i, r) in results.iter().enumerate() {
        let _ = writeln!(out, "[{}] {}", i + 1, r.prompt);
        let _ = writeln!(out, "  1: {} -> {}", r.model_a, truncated(&r.response_a));
        let _ = writeln!(out, "  2: {} -> {}", r.model_b, truncated(&r.response_b));
        let _ = writeln!(out, "  {}", outcome_line(r));
    }

    let counts = preferred_counts(results);
    if !counts.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "preferred counts:");
        for (name, count) in counts {
            let _ = writeln!(out, "  {name}: {count}");
        }
    }

    out
}

fn truncated(response: &Option<String>) -> String {
    const MAX: usize = 120;
    match response {
        None => "(no response)".to_string(),
        Some(text) => {
            let flat = text.replace('\n', " ");
            if flat.chars().count() <= MAX {
                flat
            } else {
                let cut: String = flat.chars().take(MAX).collect();
                format!("{cut}…")
            }
        }
    }
}
