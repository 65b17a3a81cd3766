//! Qualitative learning extracted from one execution attempt

use serde::{Deserialize, Serialize};

use crate::types::RecoveryResult;

/// Bias signal for a fast, clean success
pub const FAST_SUCCESS_SIGNAL: f64 = 0.1;

/// Bias signal for an early abandonment
pub const EARLY_ABANDON_SIGNAL: f64 = -0.1;

/// How an attempt ended, from the ledger's point of view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptKind {
    /// Last strategy tried for a failure; its outcome is what the caller sees
    Final,
    /// Abandoned in favour of its fallback
    Abandoned,
    /// Never attempted: the failure was judged unrecoverable
    Gated,
}

/// What the ledger learned from one result
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LearningReport {
    pub strategy_id: String,
    pub success_factors: Vec<String>,
    pub failure_factors: Vec<String>,

    /// Signal fed into the strategy's confidence bias
    pub confidence_adjustment: f64,

    /// Overall effectiveness after the update; unchanged for cancelled attempts
    pub effectiveness: f64,
}

/// Success/failure factors and the confidence signal of a result
pub fn extract_factors(result: &RecoveryResult, kind: AttemptKind) -> LearningReport {
    let mut report = LearningReport {
        strategy_id: result.strategy.id.clone(),
        ..Default::default()
    };

    let estimate = result.strategy.time_estimate;
    let fast = !estimate.is_zero() && result.duration <= estimate;
    if result.duration <= estimate / 2 {
        report.success_factors.push("completed well within the time estimate".to_string());
    } else if result.duration > estimate.mul_f64(1.5) {
        report.failure_factors.push(format!(
            "took {}ms against an estimate of {}ms",
            result.duration.as_millis(),
            estimate.as_millis()
        ));
    }

    let total = result.strategy.steps.len();
    let completed = result.completed_steps.len();
    if completed == total {
        report.success_factors.push("all steps completed".to_string());
    } else {
        report
            .failure_factors
            .push(format!("{} of {} steps completed", completed, total));
    }

    if let Some(error) = &result.error {
        report
            .failure_factors
            .push(format!("error attached: {}", error.message));
    }

    if result.cancelled {
        report.failure_factors.push("cancelled by stop signal".to_string());
    }

    let early_abandon = !result.success
        && !result.cancelled
        && (kind == AttemptKind::Abandoned || result.completion_ratio() < 0.5);

    report.confidence_adjustment = if result.success && result.error.is_none() && fast {
        FAST_SUCCESS_SIGNAL
    } else if early_abandon {
        EARLY_ABANDON_SIGNAL
    } else {
        0.0
    };

    report
}
