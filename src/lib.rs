//! autoheal - failure recovery core for browser automation
//!
//! When an automation step fails, autoheal classifies the failure, ranks
//! candidate recovery strategies, executes them with live monitoring and
//! fallback chains, and learns from every outcome.
//!
//! # Architecture
//!
//! - **classifier**: pattern cache, reasoning oracle, rule table
//! - **strategy**: templates, probability blend, fallback chains
//! - **recovery**: step-wise orchestrator with progress monitor
//! - **ledger**: effectiveness EMA, learning, statistics
//! - **service**: the caller-facing facade

pub mod errors;
pub mod types;
pub mod config;
pub mod telemetry;
pub mod events;
pub mod cli;

pub mod oracle;
pub mod browser;
pub mod memory;

pub mod classifier;
pub mod strategy;
pub mod recovery;
pub mod ledger;
pub mod specialized;
pub mod service;

// Re-export commonly used types
pub use errors::{RecoveryError, Result};
pub use service::RecoveryService;
