// src/cli/run.rs — Default command: analyze a dataset

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::progress::terminal_progress;
use super::Cli;
use crate::core::oracle::ProviderOracle;
use crate::core::orchestrator::Orchestrator;
use crate::core::prompts::PromptLibrary;
use crate::core::runner::RunnerConfig;
use crate::core::types::{RunOutcome, SubtaskResult};
use crate::infra::config::Config;
use crate::infra::errors::AnalystError;
use crate::provider::resolver::resolve_provider;
use crate::provider::ModelRef;
use crate::sandbox::{RhaiSandbox, SandboxLimits};

/// Fold command-line overrides into the loaded config.
pub fn apply_overrides(mut config: Config, cli: &Cli) -> Result<Config, AnalystError> {
    if let Some(ref spec) = cli.model {
        let model_ref = ModelRef::parse(spec).ok_or_else(|| {
            AnalystError::Config(format!(
                "invalid --model '{spec}': expected provider/model"
            ))
        })?;
        config.model.provider = model_ref.provider;
        config.model.model = model_ref.model;
    }
    if let Some(n) = cli.max_retries {
        config.execution.max_retries = n;
    }
    config.validate()?;
    Ok(config)
}

fn load_prompts(config: &Config) -> Result<PromptLibrary, AnalystError> {
    match config.prompts_dir() {
        Some(dir) => PromptLibrary::from_dir(&dir),
        None => PromptLibrary::builtin(),
    }
}

/// Execute one analysis run and print the outcome.
pub async fn run_analysis(cli: &Cli, config: Config) -> anyhow::Result<()> {
    let config = apply_overrides(config, cli)?;
    let request = cli.request_text();

    let library = load_prompts(&config)?;
    let provider = resolve_provider(&config.model, &config.retry)?;
    tracing::debug!(
        provider = provider.id(),
        model = %config.model.model,
        "Using model"
    );

    let oracle = Arc::new(ProviderOracle::from_config(provider, library, &config.model));
    let sandbox = Arc::new(RhaiSandbox::new(SandboxLimits::from(&config.execution)));

    let cancel = Arc::new(AtomicBool::new(false));
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("Cancelling after the current step...");
                cancel.store(true, Ordering::SeqCst);
            }
        });
    }

    let mut orchestrator = Orchestrator::new(
        oracle,
        sandbox,
        RunnerConfig::from(&config.execution),
    )
    .with_cancel_flag(cancel);
    if !cli.quiet {
        orchestrator = orchestrator.with_progress(terminal_progress());
    }

    let outcome = orchestrator.run(&request, &cli.data).await?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        print!("{}", render_outcome(&outcome));
    }
    Ok(())
}

/// Summary first, then each subtask with its preview or error.
pub fn render_outcome(outcome: &RunOutcome) -> String {
    let mut out = String::new();
    out.push_str("FINAL SUMMARY:\n");
    out.push_str(&outcome.summary);
    out.push_str("\n\nSUBTASK OUTPUTS:\n");
    for (i, result) in outcome.results.iter().enumerate() {
        out.push_str(&format!("\nSubtask {}: {}\n", i + 1, result.subtask()));
        match result {
            SubtaskResult::Success {
                preview, retries, ..
            } => {
                out.push_str(&format!("  Result preview: {preview}\n"));
                if *retries > 0 {
                    out.push_str(&format!("  (succeeded after {retries} repair(s))\n"));
                }
            }
            SubtaskResult::Failure { error, .. } => {
                out.push_str(&format!("  Error: {error}\n"));
            }
        }
    }
    out
}
