//! autoheal - Main CLI Entry Point

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::Parser;
use colored::Colorize;
use serde::Deserialize;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use autoheal::browser::{ActionOutcome, BrowserDriver, NoopDriver};
use autoheal::{
    cli::{Args, Commands, FailureArgs},
    config::Config,
    service::RecoveryService,
    telemetry::init_tracing,
    types::{ActionContext, AutomationError, RecoveryResult},
};

/// Dry-run browser whose retries fail a fixed number of times
struct DryRunDriver {
    retry_failures: AtomicUsize,
}

#[async_trait]
impl BrowserDriver for DryRunDriver {
    async fn wait(
        &self,
        duration: Duration,
        context: &ActionContext,
    ) -> autoheal::Result<ActionOutcome> {
        NoopDriver.wait(duration, context).await
    }

    async fn refresh_page(&self, context: &ActionContext) -> autoheal::Result<ActionOutcome> {
        NoopDriver.refresh_page(context).await
    }

    async fn retry_action(&self, _context: &ActionContext) -> autoheal::Result<ActionOutcome> {
        let failed = self
            .retry_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if failed {
            Ok(ActionOutcome::failed("simulated retry failure"))
        } else {
            Ok(ActionOutcome::ok())
        }
    }

    async fn scroll_to_element(&self, context: &ActionContext) -> autoheal::Result<ActionOutcome> {
        NoopDriver.scroll_to_element(context).await
    }

    async fn alternative_selector(&self, context: &ActionContext) -> autoheal::Result<ActionOutcome> {
        NoopDriver.alternative_selector(context).await
    }

    async fn navigate_back(&self, context: &ActionContext) -> autoheal::Result<ActionOutcome> {
        NoopDriver.navigate_back(context).await
    }

    async fn wait_for_network_idle(&self, context: &ActionContext) -> autoheal::Result<ActionOutcome> {
        NoopDriver.wait_for_network_idle(context).await
    }

    async fn dismiss_overlay(&self, context: &ActionContext) -> autoheal::Result<ActionOutcome> {
        NoopDriver.dismiss_overlay(context).await
    }

    async fn clear_cookies(&self, context: &ActionContext) -> autoheal::Result<ActionOutcome> {
        NoopDriver.clear_cookies(context).await
    }
}

/// One recorded failure in a stats replay file
#[derive(Debug, Deserialize)]
struct RecordedFailure {
    #[serde(rename = "type")]
    error_type: String,
    message: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    objective: String,
    #[serde(default)]
    target: Option<String>,
}

impl RecordedFailure {
    fn into_parts(self) -> (AutomationError, ActionContext) {
        let mut context = ActionContext::new(self.url, self.objective);
        context.target_element = self.target;
        (AutomationError::new(self.error_type, self.message), context)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbosity());

    let mut config = load_config(&args)?;
    args.apply_overrides(&mut config);

    match &args.command {
        Commands::Classify { failure } => classify(&args, config, failure).await?,
        Commands::Strategies { failure } => strategies(config, failure).await?,
        Commands::Recover {
            failure,
            fail_retries,
            repeat,
        } => recover(&args, config, failure, *fail_retries, *repeat).await?,
        Commands::Stats { input } => replay_stats(&args, config, input).await?,
        Commands::Config { init } => show_config(&args, &config, *init)?,
    }

    Ok(())
}

fn load_config(args: &Args) -> Result<Config> {
    match &args.config {
        Some(path) => Config::load_from(path),
        None => match Config::config_path() {
            Ok(path) if path.exists() => Config::load_from(&path),
            _ => Ok(Config::default()),
        },
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn classify(args: &Args, config: Config, failure: &FailureArgs) -> Result<()> {
    let service = RecoveryService::from_config(Arc::new(NoopDriver), config);
    let classification = service
        .classify_error(&failure.error(), &failure.context())
        .await;
    let severity = service.analyze_severity(&classification).await;
    let recoverable = service.is_recoverable(&classification).await;

    print_json(&serde_json::json!({
        "classification": classification,
        "blended_severity": severity.severity,
        "severity_score": severity.score,
        "recoverable": recoverable,
    }))?;

    if args.verbosity().show_summary() {
        eprintln!(
            "{} {} ({}, confidence {:.2})",
            "Classified as".bold(),
            classification.error_type.to_string().cyan(),
            classification.severity,
            classification.confidence
        );
    }
    Ok(())
}

async fn strategies(config: Config, failure: &FailureArgs) -> Result<()> {
    let service = RecoveryService::from_config(Arc::new(NoopDriver), config);
    let context = failure.context();
    let classification = service.classify_error(&failure.error(), &context).await;
    let strategies = service
        .generate_recovery_strategies(&classification, &context)
        .await;

    print_json(&strategies)?;

    for (rank, strategy) in strategies.iter().enumerate() {
        eprintln!(
            "{}. {} p={:.2} priority={} chain={}",
            rank + 1,
            strategy.name.bold(),
            strategy.success_probability,
            strategy.priority,
            strategy.chain_ids().join(" -> ")
        );
    }
    Ok(())
}

async fn recover(
    args: &Args,
    config: Config,
    failure: &FailureArgs,
    fail_retries: usize,
    repeat: usize,
) -> Result<()> {
    let driver = Arc::new(DryRunDriver {
        retry_failures: AtomicUsize::new(fail_retries),
    });
    let service = RecoveryService::from_config(driver, config);
    let context = failure.context();

    let mut last = None;
    for _ in 0..repeat.max(1) {
        let result = service.recover(&failure.error(), &context).await;
        print_summary(&result);
        last = Some(result);
    }

    if let Some(result) = &last {
        print_json(result)?;
    }
    if args.verbosity().show_summary() {
        eprintln!("\n{}", service.telemetry().summary());
    }
    Ok(())
}

fn print_summary(result: &RecoveryResult) {
    let status = if result.success {
        "RECOVERED".green().bold()
    } else if result.cancelled {
        "CANCELLED".yellow().bold()
    } else {
        "FAILED".red().bold()
    };
    eprintln!(
        "{} via {} ({} steps, {}ms)",
        status,
        result.strategies_attempted.join(" -> "),
        result.completed_steps.len(),
        result.duration.as_millis()
    );
}

async fn replay_stats(args: &Args, config: Config, input: &Path) -> Result<()> {
    let raw = tokio::fs::read_to_string(input)
        .await
        .with_context(|| format!("Failed to read {}", input.display()))?;
    let failures: Vec<RecordedFailure> =
        serde_json::from_str(&raw).context("Replay file is not a JSON array of failures")?;

    let service = RecoveryService::from_config(Arc::new(NoopDriver), config);
    for failure in failures {
        let (error, context) = failure.into_parts();
        let result = service.recover(&error, &context).await;
        if args.verbosity().show_summary() {
            print_summary(&result);
        }
    }

    let stats = service.get_recovery_stats().await;
    let patterns = service.detect_error_patterns().await;
    print_json(&serde_json::json!({
        "stats": stats,
        "patterns": patterns,
    }))?;

    if args.verbosity().show_summary() {
        eprintln!(
            "{} {:.1}% of {} failures recovered ({} unrecoverable)",
            "Stats:".bold(),
            stats.success_rate * 100.0,
            stats.total_errors,
            stats.unrecoverable_errors
        );
    }
    Ok(())
}

fn show_config(args: &Args, config: &Config, init: bool) -> Result<()> {
    if init {
        let path = Config::config_path()?;
        if path.exists() {
            eprintln!("Config already exists at {}", path.display());
        } else {
            config.save_to(&path)?;
            eprintln!("{} {}", "Wrote".green(), path.display());
        }
    }

    println!("{}", toml::to_string_pretty(config)?);
    if args.verbosity().show_summary() {
        eprintln!(
            "Oracle: {} at {} ({})",
            config.oracle.model,
            config.oracle.base_url(),
            if config.oracle.enabled { "enabled" } else { "disabled" }
        );
    }
    Ok(())
}
