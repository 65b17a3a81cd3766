//! Schema-validated decoding of oracle completions
//!
//! Each request names a reply schema. A completion either decodes and
//! validates into a typed value, or yields an explicit error that the caller
//! answers with its deterministic fallback.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

use crate::errors::{RecoveryError, Result};
use crate::oracle::parser::extract_json_object;
use crate::oracle::{CompletionOptions, ReasoningOracle};
use crate::types::{
    ErrorType, RecoveryActionType, RecoveryStep, RecoveryStrategy, Severity, WAIT_TIMEOUT_HEADROOM,
};

/// A reply shape the oracle is asked to produce
pub trait OracleSchema: DeserializeOwned {
    /// Typed value produced once the reply passes validation
    type Output;

    /// Check invariants and convert into the typed value
    fn validate(self) -> Result<Self::Output>;
}

/// Ask the oracle and decode its completion against `T`, within `timeout`
pub async fn request<T: OracleSchema>(
    oracle: &dyn ReasoningOracle,
    prompt: &str,
    options: CompletionOptions,
    timeout: Duration,
) -> Result<T::Output> {
    let text = tokio::time::timeout(timeout, oracle.complete(prompt, options))
        .await
        .map_err(|_| RecoveryError::OracleTimeout {
            duration_ms: timeout.as_millis() as u64,
        })??;

    let json = extract_json_object(&text)?;
    let reply: T = serde_json::from_str(json)
        .map_err(|e| RecoveryError::SchemaViolation(format!("Reply does not match schema: {}", e)))?;

    reply.validate()
}

/// Full classification reply
#[derive(Debug, Clone, Deserialize)]
pub struct ClassificationReply {
    #[serde(alias = "type")]
    pub error_type: String,
    pub severity: String,
    #[serde(default)]
    pub possible_causes: Vec<String>,
    pub recoverable: bool,
    pub confidence: f64,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

/// Classification reply after validation
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedClassification {
    pub error_type: ErrorType,
    pub severity: Severity,
    pub possible_causes: Vec<String>,
    pub recoverable: bool,
    pub confidence: f64,
    pub metadata: HashMap<String, serde_json::Value>,
}

impl OracleSchema for ClassificationReply {
    type Output = ValidatedClassification;

    fn validate(self) -> Result<Self::Output> {
        if self.error_type.trim().is_empty() {
            return Err(RecoveryError::SchemaViolation("empty error type".to_string()));
        }
        check_unit("confidence", self.confidence)?;
        let severity = Severity::parse(&self.severity).ok_or_else(|| {
            RecoveryError::SchemaViolation(format!("unknown severity '{}'", self.severity))
        })?;

        Ok(ValidatedClassification {
            error_type: ErrorType::from_raw(&self.error_type),
            severity,
            possible_causes: self
                .possible_causes
                .into_iter()
                .filter(|c| !c.trim().is_empty())
                .collect(),
            recoverable: self.recoverable,
            confidence: self.confidence,
            metadata: self.metadata,
        })
    }
}

/// Proposed strategy list
#[derive(Debug, Clone, Deserialize)]
pub struct StrategyProposalReply {
    pub strategies: Vec<ProposedStrategy>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProposedStrategy {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub steps: Vec<ProposedStep>,
    #[serde(alias = "estimated_probability", alias = "probability")]
    pub success_probability: f64,
    #[serde(default = "default_priority")]
    pub priority: i32,
    #[serde(default)]
    pub time_estimate_ms: Option<u64>,
    #[serde(default)]
    pub applicable_conditions: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProposedStep {
    #[serde(alias = "type", alias = "action")]
    pub action_type: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub parameters: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    #[serde(default)]
    pub optional: bool,
}

fn default_priority() -> i32 {
    5
}

impl ProposedStrategy {
    fn into_strategy(self) -> Result<RecoveryStrategy> {
        let name = self.name.trim().to_string();
        if name.is_empty() {
            return Err(RecoveryError::SchemaViolation("strategy without a name".to_string()));
        }
        if self.steps.is_empty() {
            return Err(RecoveryError::SchemaViolation(format!("strategy '{}' has no steps", name)));
        }
        check_unit("success_probability", self.success_probability)?;

        let steps = self
            .steps
            .into_iter()
            .map(ProposedStep::into_step)
            .collect::<Result<Vec<_>>>()?;

        let mut strategy = RecoveryStrategy::new(
            format!("oracle_{}", slug(&name)),
            name,
            self.description,
            steps,
        )
        .with_probability(self.success_probability)
        .with_priority(self.priority.clamp(1, 10));

        if let Some(ms) = self.time_estimate_ms {
            strategy = strategy.with_time_estimate(Duration::from_millis(ms));
        }
        strategy.applicable_conditions = self.applicable_conditions;
        Ok(strategy)
    }
}

impl ProposedStep {
    fn into_step(self) -> Result<RecoveryStep> {
        let action = RecoveryActionType::parse(&self.action_type).ok_or_else(|| {
            RecoveryError::SchemaViolation(format!("unknown action '{}'", self.action_type))
        })?;

        let mut step = RecoveryStep::new(action, self.description);
        step.parameters = self.parameters;
        step.optional = self.optional;
        if let Some(ms) = self.timeout_ms.filter(|ms| *ms > 0) {
            step.timeout = Duration::from_millis(ms);
        }
        // a wait must be able to outlast its own delay
        if let Some(delay) = step.delay() {
            let floor = delay + WAIT_TIMEOUT_HEADROOM;
            if self.timeout_ms.is_none() || step.timeout < floor {
                step.timeout = floor;
            }
        }
        Ok(step)
    }
}

impl OracleSchema for StrategyProposalReply {
    type Output = Vec<RecoveryStrategy>;

    /// Invalid proposals are dropped; an empty remainder is a violation
    fn validate(self) -> Result<Self::Output> {
        let total = self.strategies.len();
        let strategies: Vec<RecoveryStrategy> = self
            .strategies
            .into_iter()
            .filter_map(|proposal| match proposal.into_strategy() {
                Ok(strategy) => Some(strategy),
                Err(e) => {
                    debug!(error = %e, "dropping invalid strategy proposal");
                    None
                }
            })
            .collect();

        if strategies.is_empty() {
            return Err(RecoveryError::SchemaViolation(format!(
                "none of {} proposed strategies were valid",
                total
            )));
        }
        Ok(strategies)
    }
}

/// Single-number fit estimate
#[derive(Debug, Clone, Deserialize)]
pub struct ProbabilityReply {
    #[serde(alias = "estimate", alias = "success_probability")]
    pub probability: f64,
}

impl OracleSchema for ProbabilityReply {
    type Output = f64;

    /// Finite values are clamped into the requested 0.1-0.9 band
    fn validate(self) -> Result<Self::Output> {
        if !self.probability.is_finite() {
            return Err(RecoveryError::SchemaViolation("probability is not finite".to_string()));
        }
        Ok(self.probability.clamp(0.1, 0.9))
    }
}

/// Recoverability judgment
#[derive(Debug, Clone, Deserialize)]
pub struct RecoverabilityReply {
    pub recoverable: bool,
    pub confidence: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RecoverabilityJudgment {
    pub recoverable: bool,
    pub confidence: f64,
}

impl OracleSchema for RecoverabilityReply {
    type Output = RecoverabilityJudgment;

    fn validate(self) -> Result<Self::Output> {
        check_unit("confidence", self.confidence)?;
        Ok(RecoverabilityJudgment {
            recoverable: self.recoverable,
            confidence: self.confidence,
        })
    }
}

fn check_unit(field: &str, value: f64) -> Result<()> {
    if value.is_finite() && (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(RecoveryError::SchemaViolation(format!(
            "{} must be within [0, 1], got {}",
            field, value
        )))
    }
}

/// Lowercase identifier made of ascii alphanumerics and underscores
pub fn slug(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut last_underscore = true;
    for ch in name.chars() {
        if ch.is_ascii_alphanumeric() {
            out.push(ch.to_ascii_lowercase());
            last_underscore = false;
        } else if !last_underscore {
            out.push('_');
            last_underscore = true;
        }
    }
    while out.ends_with('_') {
        out.pop();
    }
    out
}
