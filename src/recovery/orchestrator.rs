//! Step-wise execution of a recovery strategy and its fallback chain
//!
//! Each attempt walks `Pending -> Running(step) -> Succeeded | Failed |
//! Switched | Cancelled`. A failed or switched attempt hands over to the
//! strategy's fallback with the original context; the chain runs strictly
//! one attempt after another.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::browser::BrowserDriver;
use crate::config::{Config, OrchestratorConfig};
use crate::errors::RecoveryError;
use crate::events::{EventBus, RecoveryEvent, SwitchReason};
use crate::ledger::EffectivenessLedger;
use crate::recovery::dispatch::execute_step;
use crate::recovery::monitor::{ExecutionMonitor, MonitorDecision, Progress, ProgressMonitor};
use crate::telemetry::{RecoveryTelemetry, TelemetryEvent};
use crate::types::{
    ActionContext, AutomationError, ErrorType, RecoveryResult, RecoveryStep, RecoveryStrategy,
};

/// Raw error tag attached to a result whose chain ran out
pub const RECOVERY_FAILED: &str = "recovery_failed";

/// Terminal state of one attempt
#[derive(Debug, Clone, PartialEq)]
pub enum AttemptState {
    Succeeded,
    Failed,
    Switched(SwitchReason),
    Cancelled,
}

struct Attempt {
    state: AttemptState,
    result: RecoveryResult,
}

/// Executes strategies against a browser driver and feeds the ledger
pub struct RecoveryOrchestrator {
    driver: Arc<dyn BrowserDriver>,
    ledger: Arc<EffectivenessLedger>,
    monitor: Arc<dyn ExecutionMonitor>,
    events: Option<EventBus>,
    telemetry: RecoveryTelemetry,
}

impl RecoveryOrchestrator {
    pub fn new(
        driver: Arc<dyn BrowserDriver>,
        ledger: Arc<EffectivenessLedger>,
        config: &Config,
    ) -> Self {
        Self::with_orchestrator_config(driver, ledger, &config.orchestrator)
    }

    pub fn with_orchestrator_config(
        driver: Arc<dyn BrowserDriver>,
        ledger: Arc<EffectivenessLedger>,
        config: &OrchestratorConfig,
    ) -> Self {
        Self {
            driver,
            ledger,
            monitor: Arc::new(ProgressMonitor::new(config)),
            events: None,
            telemetry: RecoveryTelemetry::new(),
        }
    }

    pub fn with_monitor(mut self, monitor: Arc<dyn ExecutionMonitor>) -> Self {
        self.monitor = monitor;
        self
    }

    pub fn with_event_bus(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    pub fn with_telemetry(mut self, telemetry: RecoveryTelemetry) -> Self {
        self.telemetry = telemetry;
        self
    }

    fn emit(&self, event: RecoveryEvent) {
        if let Some(bus) = &self.events {
            bus.emit(event);
        }
    }

    /// Execute `strategy`, falling back along its chain until one attempt
    /// succeeds, the chain runs out, or `cancel` fires.
    ///
    /// Every attempt is recorded in the ledger. The returned result describes
    /// the last attempt, with the total duration and the learnings of every
    /// attempt.
    pub async fn execute(
        &self,
        strategy: &RecoveryStrategy,
        error_type: ErrorType,
        context: &ActionContext,
        cancel: &CancellationToken,
    ) -> RecoveryResult {
        let started = Instant::now();
        let mut attempted = Vec::new();
        let mut learnings = Vec::new();
        let mut current = strategy;

        loop {
            attempted.push(current.id.clone());
            let attempt = self.run_attempt(current, error_type, context, cancel).await;

            let reason = match &attempt.state {
                AttemptState::Failed => Some(SwitchReason::RequiredStepFailed),
                AttemptState::Switched(reason) => Some(*reason),
                AttemptState::Succeeded | AttemptState::Cancelled => None,
            };

            if let (Some(reason), Some(fallback)) = (reason, current.fallback_strategy.as_deref()) {
                self.ledger.record_abandoned(&attempt.result).await;
                info!(from = %current.id, to = %fallback.id, %reason, "switching to fallback strategy");
                self.emit(RecoveryEvent::StrategySwitched {
                    from: current.id.clone(),
                    to: fallback.id.clone(),
                    reason,
                });
                self.telemetry.record(TelemetryEvent::StrategySwitched);
                learnings.extend(
                    attempt
                        .result
                        .learnings
                        .iter()
                        .map(|l| format!("{}: {}", current.id, l)),
                );
                learnings.push(format!("{}: abandoned, {}", current.id, reason));
                current = fallback;
                continue;
            }

            self.ledger.learn_from_result(&attempt.result).await;

            let mut result = attempt.result;
            result.strategy = current.clone();
            learnings.append(&mut result.learnings);
            result.learnings = learnings;
            result.duration = started.elapsed();
            result.strategies_attempted = attempted;

            self.emit(RecoveryEvent::RecoveryFinished {
                strategy_id: current.id.clone(),
                success: result.success,
                duration_ms: result.duration.as_millis() as u64,
            });
            self.telemetry.record(TelemetryEvent::RecoveryCompleted {
                success: result.success,
                duration_ms: result.duration.as_millis() as u64,
            });
            return result;
        }
    }

    async fn run_attempt(
        &self,
        strategy: &RecoveryStrategy,
        error_type: ErrorType,
        initial_context: &ActionContext,
        cancel: &CancellationToken,
    ) -> Attempt {
        let started = Instant::now();
        let mut context = initial_context.clone();
        let mut context_changed = false;
        let mut completed: Vec<RecoveryStep> = Vec::new();
        let mut skipped = 0usize;
        let mut learnings = Vec::new();
        let mut failure: Option<AutomationError> = None;
        let mut state = AttemptState::Succeeded;

        debug!(strategy = %strategy.id, steps = strategy.steps.len(), "starting recovery strategy");
        self.emit(RecoveryEvent::StrategyStarted {
            strategy_id: strategy.id.clone(),
            steps: strategy.steps.len(),
        });

        for (index, step) in strategy.steps.iter().enumerate() {
            if cancel.is_cancelled() {
                info!(strategy = %strategy.id, completed = completed.len(), "recovery cancelled");
                self.emit(RecoveryEvent::RecoveryCancelled {
                    strategy_id: strategy.id.clone(),
                    completed_steps: completed.len(),
                });
                self.telemetry.record(TelemetryEvent::RecoveryCancelled);
                state = AttemptState::Cancelled;
                break;
            }

            let progress = Progress {
                strategy,
                step_index: index,
                completed: completed.len(),
                failed: skipped,
                elapsed: started.elapsed(),
                context: &context,
            };
            let step = match self.monitor.evaluate(&progress) {
                MonitorDecision::Continue => step.clone(),
                MonitorDecision::Adjust(adjustment) => {
                    debug!(index, ?adjustment, "adjusting step parameters");
                    adjustment.apply(step)
                }
                MonitorDecision::Switch if strategy.fallback_strategy.is_some() => {
                    state = AttemptState::Switched(SwitchReason::SlowProgress);
                    break;
                }
                MonitorDecision::Switch => {
                    debug!(index, "switch recommended without a fallback, continuing");
                    step.clone()
                }
            };

            self.emit(RecoveryEvent::StepStarted {
                strategy_id: strategy.id.clone(),
                index,
                action: step.action_type,
            });
            let step_started = Instant::now();

            match execute_step(self.driver.as_ref(), &step, &context).await {
                Ok(outcome) => {
                    self.telemetry.record(TelemetryEvent::StepExecuted { success: true });
                    self.emit(RecoveryEvent::StepCompleted {
                        strategy_id: strategy.id.clone(),
                        index,
                        duration_ms: step_started.elapsed().as_millis() as u64,
                    });
                    if let Some(next) = outcome.new_context {
                        context = next;
                        context_changed = true;
                    }
                    completed.push(step);
                }
                Err(e) => {
                    self.telemetry.record(TelemetryEvent::StepExecuted { success: false });
                    self.emit(RecoveryEvent::StepFailed {
                        strategy_id: strategy.id.clone(),
                        index,
                        optional: step.optional,
                        reason: e.to_string(),
                    });

                    if step.optional {
                        debug!(index, action = %step.action_type, error = %e, "optional step failed, skipping");
                        learnings.push(format!("optional step {} skipped: {}", step.action_type, e));
                        skipped += 1;
                        continue;
                    }

                    warn!(strategy = %strategy.id, index, error = %e, "required step failed");
                    failure = Some(step_failure(strategy, index, &step, &e));
                    state = AttemptState::Failed;
                    break;
                }
            }
        }

        let duration = started.elapsed();
        let success = state == AttemptState::Succeeded;
        learnings.extend(summarize(strategy, completed.len(), duration, success));

        Attempt {
            result: RecoveryResult {
                success,
                strategy: strategy.detached(),
                completed_steps: completed,
                duration,
                new_context: context_changed.then_some(context),
                error: failure,
                learnings,
                error_type,
                initial_context: initial_context.clone(),
                cancelled: state == AttemptState::Cancelled,
                strategies_attempted: vec![strategy.id.clone()],
            },
            state,
        }
    }
}

fn step_failure(
    strategy: &RecoveryStrategy,
    index: usize,
    step: &RecoveryStep,
    error: &RecoveryError,
) -> AutomationError {
    AutomationError::new(RECOVERY_FAILED, error.to_string())
        .with_context("strategy_id", serde_json::json!(strategy.id))
        .with_context("step_index", serde_json::json!(index))
        .with_context("action", serde_json::json!(step.action_type.as_str()))
}

fn summarize(
    strategy: &RecoveryStrategy,
    completed: usize,
    duration: Duration,
    success: bool,
) -> Vec<String> {
    let mut learnings = Vec::new();
    if success && duration < strategy.time_estimate {
        learnings.push("completed faster than expected".to_string());
    } else if duration > strategy.time_estimate.mul_f64(1.5) {
        learnings.push("took longer than expected".to_string());
    }
    let remaining = strategy.steps.len().saturating_sub(completed);
    if remaining > 0 {
        learnings.push(format!("{} steps not completed", remaining));
    }
    learnings
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::{ActionOutcome, NoopDriver};
    use crate::errors::Result;
    use crate::strategy::templates;
    use crate::types::RecoveryActionType;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Waits instantly; retries fail a fixed number of times then succeed
    struct FlakyDriver {
        retry_failures: AtomicUsize,
    }

    impl FlakyDriver {
        fn failing(times: usize) -> Self {
            Self {
                retry_failures: AtomicUsize::new(times),
            }
        }
    }

    #[async_trait]
    impl BrowserDriver for FlakyDriver {
        async fn wait(&self, _duration: Duration, _context: &ActionContext) -> Result<ActionOutcome> {
            Ok(ActionOutcome::ok())
        }

        async fn refresh_page(&self, context: &ActionContext) -> Result<ActionOutcome> {
            Ok(ActionOutcome::ok().with_context(context.clone().with_action("refreshed")))
        }

        async fn retry_action(&self, _context: &ActionContext) -> Result<ActionOutcome> {
            let left = self.retry_failures.load(Ordering::SeqCst);
            if left > 0 {
                self.retry_failures.store(left - 1, Ordering::SeqCst);
                Ok(ActionOutcome::failed("still failing"))
            } else {
                Ok(ActionOutcome::ok())
            }
        }
    }

    struct AlwaysSwitch;

    impl ExecutionMonitor for AlwaysSwitch {
        fn evaluate(&self, _progress: &Progress<'_>) -> MonitorDecision {
            MonitorDecision::Switch
        }
    }

    fn orchestrator(driver: impl BrowserDriver + 'static) -> (RecoveryOrchestrator, Arc<EffectivenessLedger>) {
        let ledger = Arc::new(EffectivenessLedger::default());
        let orchestrator =
            RecoveryOrchestrator::new(Arc::new(driver), ledger.clone(), &Config::default());
        (orchestrator, ledger)
    }

    #[tokio::test]
    async fn test_success_records_every_step() {
        let (orchestrator, ledger) = orchestrator(NoopDriver);
        let result = orchestrator
            .execute(
                &templates::wait_and_retry(),
                ErrorType::ElementNotFound,
                &ActionContext::default(),
                &CancellationToken::new(),
            )
            .await;

        assert!(result.success);
        assert_eq!(result.completed_steps.len(), 2);
        assert!(result.error.is_none());
        assert!(result.learnings.contains(&"completed faster than expected".to_string()));
        assert!(ledger.effectiveness(templates::WAIT_AND_RETRY).await > 0.5);
    }

    #[tokio::test]
    async fn test_required_failure_without_fallback() {
        let (orchestrator, ledger) = orchestrator(FlakyDriver::failing(1));
        let strategy = templates::wait_and_retry();
        let result = orchestrator
            .execute(
                &strategy,
                ErrorType::ElementNotFound,
                &ActionContext::default(),
                &CancellationToken::new(),
            )
            .await;

        assert!(!result.success);
        assert_eq!(result.completed_steps, vec![strategy.steps[0].clone()]);
        let error = result.error.unwrap();
        assert_eq!(error.error_type, RECOVERY_FAILED);
        assert!(error.message.contains("still failing"));
        assert!(result.learnings.contains(&"1 steps not completed".to_string()));
        assert!(ledger.effectiveness(templates::WAIT_AND_RETRY).await < 0.5);
    }

    #[tokio::test]
    async fn test_fallback_runs_with_original_context() {
        let (orchestrator, ledger) = orchestrator(FlakyDriver::failing(1));
        let mut primary = templates::refresh_and_retry();
        primary.fallback_strategy = Some(Box::new(templates::generic_retry()));
        let context = ActionContext::new("https://shop.test", "checkout");

        let result = orchestrator
            .execute(&primary, ErrorType::StaleElement, &context, &CancellationToken::new())
            .await;

        assert!(result.success);
        assert_eq!(result.strategy.id, templates::GENERIC_RETRY);
        assert_eq!(
            result.strategies_attempted,
            vec![templates::REFRESH_AND_RETRY, templates::GENERIC_RETRY]
        );
        // generic retry never refreshes, so the context is untouched
        assert!(result.new_context.is_none());
        assert!(result.learnings.iter().any(|l| l.starts_with("refresh_and_retry: abandoned")));
        assert!(ledger.effectiveness(templates::REFRESH_AND_RETRY).await < 0.5);
        assert!(ledger.effectiveness(templates::GENERIC_RETRY).await > 0.5);
    }

    #[tokio::test]
    async fn test_optional_failure_is_skipped() {
        let (orchestrator, _) = orchestrator(FlakyDriver::failing(0));
        // refresh_and_retry's network-idle step is optional and unsupported here
        let result = orchestrator
            .execute(
                &templates::refresh_and_retry(),
                ErrorType::PageLoadTimeout,
                &ActionContext::default(),
                &CancellationToken::new(),
            )
            .await;

        assert!(result.success);
        assert_eq!(result.completed_steps.len(), 2);
        assert!(result
            .learnings
            .iter()
            .any(|l| l.starts_with("optional step wait_for_network_idle skipped")));
        assert_eq!(
            result.new_context.unwrap().previous_actions,
            vec!["refreshed".to_string()]
        );
    }

    #[tokio::test]
    async fn test_cancelled_before_first_step() {
        let (orchestrator, ledger) = orchestrator(NoopDriver);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = orchestrator
            .execute(
                &templates::wait_and_retry(),
                ErrorType::ElementNotFound,
                &ActionContext::default(),
                &cancel,
            )
            .await;

        assert!(!result.success);
        assert!(result.cancelled);
        assert!(result.completed_steps.is_empty());
        assert!(result.error.is_none());
        assert_eq!(ledger.effectiveness(templates::WAIT_AND_RETRY).await, 0.5);
    }

    #[tokio::test]
    async fn test_monitor_switch_abandons_primary() {
        let (orchestrator, _) = orchestrator(NoopDriver);
        let orchestrator = orchestrator.with_monitor(Arc::new(AlwaysSwitch));
        let mut primary = templates::scroll_and_search();
        primary.fallback_strategy = Some(Box::new(templates::generic_retry()));

        let result = orchestrator
            .execute(
                &primary,
                ErrorType::ElementNotFound,
                &ActionContext::default(),
                &CancellationToken::new(),
            )
            .await;

        // the fallback has no fallback of its own, so it runs to completion
        assert!(result.success);
        assert_eq!(result.strategy.id, templates::GENERIC_RETRY);
        assert!(result
            .learnings
            .contains(&"scroll_and_search: abandoned, progress too slow".to_string()));
    }

    #[tokio::test]
    async fn test_events_are_emitted() {
        let (bus, mut rx) = EventBus::new();
        let (orchestrator, _) = orchestrator(NoopDriver);
        let orchestrator = orchestrator.with_event_bus(bus);

        orchestrator
            .execute(
                &templates::generic_retry(),
                ErrorType::Unknown,
                &ActionContext::default(),
                &CancellationToken::new(),
            )
            .await;

        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        assert!(matches!(events.first(), Some(RecoveryEvent::StrategyStarted { steps: 2, .. })));
        assert!(matches!(
            events.get(1),
            Some(RecoveryEvent::StepStarted { action: RecoveryActionType::Wait, .. })
        ));
        assert!(matches!(events.last(), Some(RecoveryEvent::RecoveryFinished { success: true, .. })));
    }
}
