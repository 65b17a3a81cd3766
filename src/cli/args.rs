//! Command-line argument parsing for autoheal
//!
//! Provides clap-based CLI with subcommands and verbosity control.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::Config;
use crate::types::{ActionContext, AutomationError};

/// autoheal - Classify browser automation failures and recover from them
#[derive(Parser, Debug)]
#[command(name = "autoheal")]
#[command(version)]
#[command(about = "Failure recovery engine for browser automation", long_about = None)]
pub struct Args {
    /// Ollama model used as reasoning oracle (overrides config)
    #[arg(short, long, global = true)]
    pub model: Option<String>,

    /// Ollama host (overrides config)
    #[arg(long, global = true)]
    pub host: Option<String>,

    /// Ollama port (overrides config)
    #[arg(long, global = true)]
    pub port: Option<u16>,

    /// Run on the deterministic rules only, without contacting the oracle
    #[arg(long, global = true)]
    pub offline: bool,

    /// Configuration file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbosity level: -q (quiet), default (normal), -v (verbose), -vv (very verbose)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (only errors are logged)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// A failure described on the command line
#[derive(clap::Args, Debug, Clone)]
pub struct FailureArgs {
    /// Raw error tag, e.g. element_not_found
    #[arg(short = 't', long = "type", value_name = "TYPE")]
    pub error_type: String,

    /// Error message as reported by the browser layer
    #[arg(long)]
    pub message: String,

    /// Page URL at the time of failure
    #[arg(long, default_value = "")]
    pub url: String,

    /// What the automation was trying to do
    #[arg(long, default_value = "")]
    pub objective: String,

    /// Descriptor of the targeted element
    #[arg(long)]
    pub target: Option<String>,
}

impl FailureArgs {
    pub fn error(&self) -> AutomationError {
        AutomationError::new(self.error_type.clone(), self.message.clone())
    }

    pub fn context(&self) -> ActionContext {
        let context = ActionContext::new(self.url.clone(), self.objective.clone());
        match &self.target {
            Some(target) => context.with_target(target.clone()),
            None => context,
        }
    }
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Classify a failure
    Classify {
        #[command(flatten)]
        failure: FailureArgs,
    },

    /// Generate ranked recovery strategies for a failure
    Strategies {
        #[command(flatten)]
        failure: FailureArgs,
    },

    /// Run the full recovery pipeline against a dry-run browser
    Recover {
        #[command(flatten)]
        failure: FailureArgs,

        /// Number of times the simulated retry step fails before succeeding
        #[arg(long, default_value_t = 0)]
        fail_retries: usize,

        /// Repeat the recovery this many times
        #[arg(long, default_value_t = 1)]
        repeat: usize,
    },

    /// Replay recorded failures and print recovery statistics
    Stats {
        /// JSON array of {"type", "message", "url", "objective", "target"}
        #[arg(long)]
        input: PathBuf,
    },

    /// Display current configuration
    Config {
        /// Write the default configuration file if none exists
        #[arg(long)]
        init: bool,
    },
}

/// Verbosity level enum
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verbosity {
    Quiet,
    Normal,
    Verbose,
    VeryVerbose,
}

impl Args {
    /// Get verbosity level based on flags
    pub fn verbosity(&self) -> Verbosity {
        if self.quiet {
            Verbosity::Quiet
        } else {
            match self.verbose {
                0 => Verbosity::Normal,
                1 => Verbosity::Verbose,
                _ => Verbosity::VeryVerbose,
            }
        }
    }

    /// Apply command-line overrides to a loaded configuration
    pub fn apply_overrides(&self, config: &mut Config) {
        if let Some(model) = &self.model {
            config.oracle.model = model.clone();
        }
        if let Some(host) = &self.host {
            config.oracle.host = host.clone();
        }
        if let Some(port) = self.port {
            config.oracle.port = port;
        }
        if self.offline {
            config.oracle.enabled = false;
        }
    }
}

impl Verbosity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verbosity::Quiet => "quiet",
            Verbosity::Normal => "normal",
            Verbosity::Verbose => "verbose",
            Verbosity::VeryVerbose => "very_verbose",
        }
    }

    /// Whether the telemetry summary is printed
    pub fn show_summary(&self) -> bool {
        !matches!(self, Verbosity::Quiet)
    }
}
