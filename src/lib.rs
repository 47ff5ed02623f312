#![forbid(unsafe_code)]

//! # duel-harness
//!
//! Head-to-head evaluation of chat models with an LLM judge.
//!
//! Candidate models answer the same prompts; for every unordered pair of
//! candidates a judge model is asked which answer better serves a stated
//! objective. Heterogeneous provider APIs (chat-structured and flat-prompt)
//! sit behind one adapter trait, the participant set is decided at runtime
//! by which credentials are present, and a failing backend spoils only its
//! own comparisons.

pub mod eval;
pub mod gateway;
pub mod judge;
pub mod pairing;
pub mod prompts;
pub mod registry;
pub mod report;

pub use eval::{
    run_evaluation, run_evaluation_with_trace, BackendFailure, ComparisonOutcome,
    ComparisonResult, EvalError, EvalOptions,
};
pub use gateway::{ChatBackend, GatewayConfig, NoopUsageSink, ProviderError, StderrUsageSink};
pub use judge::{parse_verdict, Judge, Verdict};
pub use pairing::{all_pairs, PairingError};
pub use registry::{BackendRegistry, ModelHandle, RegistryError};
pub use report::{JsonlTraceSink, TraceSink, TraceWorker};
