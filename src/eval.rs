//! Evaluation orchestrator.
//!
//! Drives one run: for each prompt, for each unordered model pair, fetch both
//! candidate responses, ask the judge, and record the outcome. Comparisons
//! are independent and run with bounded concurrency; a failing backend spoils
//! only its own comparisons, never the run.

use std::time::Duration;

use futures::stream::{self, StreamExt};
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::gateway::{conversation, ChatBackend, Message, ProviderError};
use crate::judge::{Judge, Verdict};
use crate::pairing::{all_pairs, PairingError};
use crate::registry::ModelHandle;
use crate::report::{now_epoch_ms, ComparisonTrace, TraceSink};

/// Default number of comparisons in flight at once.
const DEFAULT_COMPARISON_CONCURRENCY: usize = 4;
const MAX_COMPARISON_CONCURRENCY: usize = 32;

/// Options for one evaluation run.
#[derive(Debug, Clone)]
pub struct EvalOptions {
    /// Maximum comparisons in flight at once. Clamped to a sane range; size
    /// this to respect the slowest backend's rate limits.
    pub comparison_concurrency: usize,
    /// Deadline for each individual backend call within a comparison. A call
    /// that exceeds it counts as backend-unavailable for that comparison
    /// only.
    pub comparison_timeout: Duration,
}

impl Default for EvalOptions {
    fn default() -> Self {
        Self {
            comparison_concurrency: DEFAULT_COMPARISON_CONCURRENCY,
            comparison_timeout: Duration::from_secs(120),
        }
    }
}

#[derive(Debug, Error)]
pub enum EvalError {
    #[error(transparent)]
    Pairing(#[from] PairingError),
}

/// One backend failure, as recorded in a result.
#[derive(Debug, Clone, Serialize)]
pub struct BackendFailure {
    pub error_code: String,
    pub message: String,
    /// Throttling rather than outage; the caller may retry this comparison
    /// later instead of writing the backend off.
    pub rate_limited: bool,
}

impl From<&ProviderError> for BackendFailure {
    fn from(err: &ProviderError) -> Self {
        Self {
            error_code: err.code().to_string(),
            message: err.to_string(),
            rate_limited: err.is_rate_limited(),
        }
    }
}

/// How one comparison ended.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ComparisonOutcome {
    /// Both candidates answered and the judge was reached.
    Judged { verdict: Verdict },
    /// At least one candidate backend failed; the judge was never asked.
    CandidateFailed {
        failure_a: Option<BackendFailure>,
        failure_b: Option<BackendFailure>,
    },
    /// Both candidates answered but the judge backend failed.
    JudgeFailed { failure: BackendFailure },
}

/// The atomic unit of run output.
#[derive(Debug, Clone, Serialize)]
pub struct ComparisonResult {
    pub prompt: String,
    pub model_a: String,
    pub model_b: String,
    /// Candidate responses, present when the corresponding call succeeded.
    pub response_a: Option<String>,
    pub response_b: Option<String>,
    pub outcome: ComparisonOutcome,
}

impl ComparisonResult {
    /// The verdict, if this comparison was judged.
    pub fn verdict(&self) -> Option<Verdict> {
        match &self.outcome {
            ComparisonOutcome::Judged { verdict } => Some(*verdict),
            _ => None,
        }
    }
}

/// Run the full evaluation: `prompts` × all unordered pairs of `handles`,
/// judged by `judge_handle`.
///
/// Results come back in deterministic (prompt, pair) order regardless of how
/// comparisons interleave. The judge may itself be one of the candidates;
/// the pairing invariant already rules out judging a self-pair. Only
/// insufficient participants aborts; everything later is recorded per
/// comparison.
pub async fn run_evaluation(
    objective: &str,
    prompts: &[String],
    handles: &[ModelHandle],
    judge_handle: &ModelHandle,
    options: &EvalOptions,
) -> Result<Vec<ComparisonResult>, EvalError> {
    run_evaluation_inner(objective, prompts, handles, judge_handle, options, None).await
}

/// Like [`run_evaluation`], additionally streaming one trace record per
/// completed comparison into `sink`.
pub async fn run_evaluation_with_trace(
    objective: &str,
    prompts: &[String],
    handles: &[ModelHandle],
    judge_handle: &ModelHandle,
    options: &EvalOptions,
    sink: &dyn TraceSink,
) -> Result<Vec<ComparisonResult>, EvalError> {
    run_evaluation_inner(objective, prompts, handles, judge_handle, options, Some(sink)).await
}

async fn run_evaluation_inner(
    objective: &str,
    prompts: &[String],
    handles: &[ModelHandle],
    judge_handle: &ModelHandle,
    options: &EvalOptions,
    sink: Option<&dyn TraceSink>,
) -> Result<Vec<ComparisonResult>, EvalError> {
    let pairs = all_pairs(handles)?;
    let judge = Judge::new(judge_handle.clone());
    let concurrency = options.comparison_concurrency.clamp(1, MAX_COMPARISON_CONCURRENCY);

    let tasks: Vec<(usize, &String, &(ModelHandle, ModelHandle))> = prompts
        .iter()
        .flat_map(|prompt| pairs.iter().map(move |pair| (prompt, pair)))
        .enumerate()
        .map(|(idx, (prompt, pair))| (idx, prompt, pair))
        .collect();

    info!(
        models = handles.len(),
        prompts = prompts.len(),
        comparisons = tasks.len(),
        judge = judge.name(),
        concurrency,
        "starting evaluation run"
    );

    let judge = &judge;
    let mut indexed: Vec<(usize, ComparisonResult)> = stream::iter(tasks.into_iter().map(
        |(idx, prompt, (model_a, model_b))| async move {
            let result = run_comparison(
                objective,
                prompt,
                model_a,
                model_b,
                judge,
                options.comparison_timeout,
            )
            .await;

            if let Some(sink) = sink {
                let trace = ComparisonTrace {
                    timestamp_ms: now_epoch_ms(),
                    comparison_index: idx,
                    judge: judge.name().to_string(),
                    result: result.clone(),
                };
                if let Err(err) = sink.record(trace) {
                    warn!(error = %err, "failed to record comparison trace");
                }
            }

            (idx, result)
        },
    ))
    .buffer_unordered(concurrency)
    .collect()
    .await;

    indexed.sort_by_key(|(idx, _)| *idx);
    Ok(indexed.into_iter().map(|(_, result)| result).collect())
}

async fn run_comparison(
    objective: &str,
    prompt: &str,
    model_a: &ModelHandle,
    model_b: &ModelHandle,
    judge: &Judge,
    timeout: Duration,
) -> ComparisonResult {
    let conv = conversation(objective, prompt);

    // The candidate calls have no ordering dependency; issue them together.
    let (result_a, result_b) = tokio::join!(
        call_with_timeout(model_a.backend(), &conv, timeout),
        call_with_timeout(model_b.backend(), &conv, timeout),
    );

    let (response_a, response_b) = match (result_a, result_b) {
        (Ok(a), Ok(b)) => (a, b),
        (result_a, result_b) => {
            let failure_a = result_a.as_ref().err().map(BackendFailure::from);
            let failure_b = result_b.as_ref().err().map(BackendFailure::from);
            warn!(
                prompt,
                model_a = model_a.name(),
                model_b = model_b.name(),
                failed_a = failure_a.is_some(),
                failed_b = failure_b.is_some(),
                "candidate backend failed, skipping judgement"
            );
            return ComparisonResult {
                prompt: prompt.to_string(),
                model_a: model_a.name().to_string(),
                model_b: model_b.name().to_string(),
                response_a: result_a.ok(),
                response_b: result_b.ok(),
                outcome: ComparisonOutcome::CandidateFailed { failure_a, failure_b },
            };
        }
    };

    let judged = tokio::time::timeout(timeout, judge.choose(objective, prompt, &response_a, &response_b))
        .await
        .unwrap_or_else(|_| Err(ProviderError::timeout(timeout)));

    let outcome = match judged {
        Ok(verdict) => ComparisonOutcome::Judged { verdict },
        Err(err) => {
            warn!(
                prompt,
                model_a = model_a.name(),
                model_b = model_b.name(),
                error = %err,
                "judge backend failed"
            );
            ComparisonOutcome::JudgeFailed {
                failure: BackendFailure::from(&err),
            }
        }
    };

    ComparisonResult {
        prompt: prompt.to_string(),
        model_a: model_a.name().to_string(),
        model_b: model_b.name().to_string(),
        response_a: Some(response_a),
        response_b: Some(response_b),
        outcome,
    }
}

async fn call_with_timeout(
    backend: &dyn ChatBackend,
    conversation: &[Message],
    timeout: Duration,
) -> Result<String, ProviderError> {
    match tokio::time::timeout(timeout, backend.complete_chat(conversation)).await {
        Ok(result) => result.map(|resp| resp.content),
        Err(_) => Err(ProviderError::timeout(timeout)),
    }
}
