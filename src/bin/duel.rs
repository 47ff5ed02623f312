#![forbid(unsafe_code)]

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use duel_harness::eval::{run_evaluation, run_evaluation_with_trace, EvalOptions};
use duel_harness::gateway::{GatewayConfig, NoopUsageSink, StderrUsageSink};
use duel_harness::pairing::PairingError;
use duel_harness::registry::{BackendRegistry, ModelHandle};
use duel_harness::report::{render_results, JsonlTraceSink};
use duel_harness::EvalError;

/// Preferred default judge when its credential is present.
const DEFAULT_JUDGE: &str = "openai/gpt-3.5-turbo";

#[derive(Parser)]
#[command(name = "duel", version, about = "Head-to-head chat model evaluation")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run an evaluation over all available backends
    Run {
        /// The evaluation criterion shared by every comparison
        #[arg(long)]
        objective: String,
        /// Conversation opener; repeat for multiple prompts
        #[arg(long = "prompt", required = true)]
        prompts: Vec<String>,
        /// Judge backend name (defaults to openai/gpt-3.5-turbo when
        /// available, otherwise the first available backend)
        #[arg(long)]
        judge: Option<String>,
        /// Maximum comparisons in flight at once
        #[arg(long, default_value_t = 4)]
        concurrency: usize,
        /// Per-backend-call timeout within a comparison
        #[arg(long, default_value_t = 120)]
        timeout_secs: u64,
        /// Write one JSONL trace record per comparison
        #[arg(long)]
        trace: Option<PathBuf>,
        /// Log every backend call to stderr
        #[arg(long)]
        log_usage: bool,
    },
    /// List registered backends and whether their credential is set
    Models,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let registry = BackendRegistry::standard();

    match cli.command {
        Commands::Models => {
            let handles = match registry.available_handles(Arc::new(NoopUsageSink), GatewayConfig::default()) {
                Ok(handles) => handles,
                Err(err) => {
                    eprintln!("error: {err}");
                    return ExitCode::from(2);
                }
            };
            let available: Vec<&str> = handles.iter().map(|h| h.name()).collect();
            for name in registry.names() {
                let status = if available.contains(&name) { "available" } else { "no credential" };
                println!("{name}\t{status}");
            }
            ExitCode::SUCCESS
        }
        Commands::Run {
            objective,
            prompts,
            judge,
            concurrency,
            timeout_secs,
            trace,
            log_usage,
        } => {
            let config = GatewayConfig::default();
            let handles = if log_usage {
                registry.available_handles(Arc::new(StderrUsageSink), config)
            } else {
                registry.available_handles(Arc::new(NoopUsageSink), config)
            };
            let handles = match handles {
                Ok(handles) => handles,
                Err(err) => {
                    eprintln!("error: {err}");
                    return ExitCode::from(2);
                }
            };

            if handles.len() < 2 {
                eprintln!(
                    "error: insufficient participants: need at least 2 configured backends, have {}",
                    handles.len()
                );
                eprintln!("set OPENAI_API_KEY and/or COHERE_API_KEY");
                return ExitCode::FAILURE;
            }

            let judge_handle = match pick_judge(&handles, judge.as_deref()) {
                Ok(handle) => handle,
                Err(msg) => {
                    eprintln!("error: {msg}");
                    return ExitCode::from(2);
                }
            };

            let options = EvalOptions {
                comparison_concurrency: concurrency,
                comparison_timeout: Duration::from_secs(timeout_secs),
            };

            let run = match trace {
                Some(path) => {
                    let (sink, worker) = match JsonlTraceSink::new(&path) {
                        Ok(pair) => pair,
                        Err(err) => {
                            eprintln!("error: cannot open trace file: {err}");
                            return ExitCode::from(2);
                        }
                    };
                    let results = run_evaluation_with_trace(
                        &objective,
                        &prompts,
                        &handles,
                        &judge_handle,
                        &options,
                        &sink,
                    )
                    .await;
                    drop(sink);
                    if let Err(err) = worker.join() {
                        eprintln!("warning: trace incomplete: {err}");
                    }
                    results
                }
                None => run_evaluation(&objective, &prompts, &handles, &judge_handle, &options).await,
            };

            match run {
                Ok(results) => {
                    print!("{}", render_results(&results));
                    ExitCode::SUCCESS
                }
                Err(EvalError::Pairing(PairingError::InsufficientParticipants { .. })) => {
                    eprintln!("error: insufficient participants");
                    ExitCode::FAILURE
                }
            }
        }
    }
}

fn pick_judge(handles: &[ModelHandle], requested: Option<&str>) -> Result<ModelHandle, String> {
    match requested {
        Some(name) => handles
            .iter()
            .find(|h| h.name() == name)
            .cloned()
            .ok_or_else(|| {
                let names: Vec<&str> = handles.iter().map(|h| h.name()).collect();
                format!("judge '{name}' is not available; available: {}", names.join(", "))
            }),
        None => Ok(handles
            .iter()
            .find(|h| h.name() == DEFAULT_JUDGE)
            .unwrap_or(&handles[0])
            .clone()),
    }
}
