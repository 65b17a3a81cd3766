//! Reasoning oracle boundary
//!
//! The oracle is an external text-completion service consulted for semantic
//! judgments. Every use site pairs it with a deterministic local fallback,
//! so nothing here is allowed to be load-bearing.

pub mod client;
pub mod parser;
pub mod prompts;
pub mod schema;

use async_trait::async_trait;

use crate::errors::{RecoveryError, Result};

pub use client::OllamaOracle;
pub use schema::{
    request, ClassificationReply, OracleSchema, ProbabilityReply, ProposedStep, ProposedStrategy,
    RecoverabilityJudgment, RecoverabilityReply, StrategyProposalReply, ValidatedClassification,
};

/// Sampling options for a completion call
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompletionOptions {
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for CompletionOptions {
    fn default() -> Self {
        Self {
            temperature: 0.2,
            max_tokens: 800,
        }
    }
}

/// External semantic text-completion service
#[async_trait]
pub trait ReasoningOracle: Send + Sync {
    async fn complete(&self, prompt: &str, options: CompletionOptions) -> Result<String>;
}

/// Oracle that is never reachable; every caller falls back to its rules
#[derive(Debug, Clone, Copy, Default)]
pub struct UnavailableOracle;

#[async_trait]
impl ReasoningOracle for UnavailableOracle {
    async fn complete(&self, _prompt: &str, _options: CompletionOptions) -> Result<String> {
        Err(RecoveryError::OracleUnavailable(
            "reasoning oracle disabled".to_string(),
        ))
    }
}
