//! Progress monitor consulted before every step
//!
//! Compares completed steps against the share of the time estimate already
//! spent and recommends continuing, adjusting the next step, or switching to
//! the fallback strategy.

use std::time::Duration;

use crate::config::OrchestratorConfig;
use crate::types::{ActionContext, RecoveryStep, RecoveryStrategy};

/// Upper bound for any extended step timeout
pub const MAX_EXTENDED_TIMEOUT: Duration = Duration::from_secs(90);

/// Snapshot of an execution in progress
#[derive(Debug, Clone, Copy)]
pub struct Progress<'a> {
    pub strategy: &'a RecoveryStrategy,
    /// Index of the step about to run
    pub step_index: usize,
    pub completed: usize,
    /// Optional steps that failed and were skipped
    pub failed: usize,
    pub elapsed: Duration,
    pub context: &'a ActionContext,
}

impl Progress<'_> {
    /// Elapsed time as a share of the time estimate
    pub fn elapsed_fraction(&self) -> f64 {
        let estimate = self.strategy.time_estimate.as_secs_f64();
        if estimate <= 0.0 {
            return 0.0;
        }
        self.elapsed.as_secs_f64() / estimate
    }

    /// Completed steps as a share of all steps
    pub fn completion_rate(&self) -> f64 {
        if self.strategy.steps.is_empty() {
            return 1.0;
        }
        self.completed as f64 / self.strategy.steps.len() as f64
    }
}

/// Parameter changes for the next step
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepAdjustment {
    pub timeout_multiplier: f64,
    pub delay_multiplier: f64,
}

impl Default for StepAdjustment {
    fn default() -> Self {
        Self {
            timeout_multiplier: 1.0,
            delay_multiplier: 1.0,
        }
    }
}

impl StepAdjustment {
    /// Copy of `step` with the adjustment applied
    pub fn apply(&self, step: &RecoveryStep) -> RecoveryStep {
        let mut adjusted = step.clone();

        if self.timeout_multiplier != 1.0 {
            adjusted.timeout = step
                .timeout
                .mul_f64(self.timeout_multiplier.max(0.0))
                .min(MAX_EXTENDED_TIMEOUT.max(step.timeout));
        }

        if self.delay_multiplier != 1.0 {
            if let Some(delay) = step.delay() {
                let reduced = delay.mul_f64(self.delay_multiplier.max(0.0));
                adjusted = adjusted.with_param(
                    "duration_ms",
                    serde_json::json!(reduced.as_millis() as u64),
                );
            }
        }

        adjusted
    }
}

/// What the orchestrator should do before the next step
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MonitorDecision {
    Continue,
    Adjust(StepAdjustment),
    /// Abandon the strategy for its fallback
    Switch,
}

/// Pluggable monitoring policy
pub trait ExecutionMonitor: Send + Sync {
    fn evaluate(&self, progress: &Progress<'_>) -> MonitorDecision;
}

/// Time-proportional progress monitor
#[derive(Debug, Clone)]
pub struct ProgressMonitor {
    config: OrchestratorConfig,
}

impl ProgressMonitor {
    pub fn new(config: &OrchestratorConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }
}

impl Default for ProgressMonitor {
    fn default() -> Self {
        Self::new(&OrchestratorConfig::default())
    }
}

impl ExecutionMonitor for ProgressMonitor {
    fn evaluate(&self, progress: &Progress<'_>) -> MonitorDecision {
        let elapsed = progress.elapsed_fraction();
        if elapsed < self.config.min_elapsed_fraction {
            return MonitorDecision::Continue;
        }

        let expected = elapsed.min(1.0);
        let completion = progress.completion_rate();
        let total = progress.strategy.steps.len() as f64;
        let in_first_half = (progress.step_index as f64) < total / 2.0;
        let too_slow = completion < self.config.slow_progress_ratio * expected;

        if too_slow && in_first_half && progress.strategy.fallback_strategy.is_some() {
            return MonitorDecision::Switch;
        }

        let mut adjustment = StepAdjustment::default();
        if elapsed > self.config.timeout_extension_threshold {
            adjustment.timeout_multiplier = self.config.timeout_multiplier;
        }
        if completion < expected {
            adjustment.delay_multiplier = self.config.delay_reduction;
        }

        if adjustment == StepAdjustment::default() {
            MonitorDecision::Continue
        } else {
            MonitorDecision::Adjust(adjustment)
        }
    }
}
