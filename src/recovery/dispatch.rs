//! Maps recovery steps onto primitive browser actions

use std::time::Duration;
use tracing::debug;

use crate::browser::{ActionOutcome, BrowserDriver};
use crate::errors::{RecoveryError, Result};
use crate::types::{ActionContext, RecoveryActionType, RecoveryStep};

/// Wait used when a wait step carries no duration
const DEFAULT_WAIT: Duration = Duration::from_secs(1);

/// Step parameter holding the relative jitter applied to a wait, e.g. 0.25
pub const JITTER_PARAM: &str = "jitter_ratio";

/// Spread `delay` uniformly by up to `ratio` in either direction
pub fn jittered(delay: Duration, ratio: f64) -> Duration {
    let ratio = ratio.clamp(0.0, 1.0);
    let spread = (rand::random::<f64>() * 2.0 - 1.0) * ratio;
    delay.mul_f64((1.0 + spread).max(0.0))
}

/// Run one step under its timeout.
///
/// A timeout, a driver error and an unsuccessful outcome are all step
/// failures; only a successful outcome is `Ok`.
pub async fn execute_step(
    driver: &dyn BrowserDriver,
    step: &RecoveryStep,
    context: &ActionContext,
) -> Result<ActionOutcome> {
    let action = step.action_type.as_str();
    debug!(action, timeout_ms = step.timeout.as_millis() as u64, "executing recovery step");

    let outcome = tokio::time::timeout(step.timeout, dispatch(driver, step, context))
        .await
        .map_err(|_| RecoveryError::StepTimeout {
            action: action.to_string(),
            duration_ms: step.timeout.as_millis() as u64,
        })??;

    if outcome.success {
        Ok(outcome)
    } else {
        Err(RecoveryError::StepFailed {
            action: action.to_string(),
            reason: outcome
                .detail
                .unwrap_or_else(|| "action reported failure".to_string()),
        })
    }
}

async fn dispatch(
    driver: &dyn BrowserDriver,
    step: &RecoveryStep,
    context: &ActionContext,
) -> Result<ActionOutcome> {
    match step.action_type {
        RecoveryActionType::Wait => {
            let delay = step.delay().unwrap_or(DEFAULT_WAIT);
            let delay = match step.parameters.get(JITTER_PARAM).and_then(|v| v.as_f64()) {
                Some(ratio) => jittered(delay, ratio),
                None => delay,
            };
            driver.wait(delay, context).await
        }
        RecoveryActionType::RefreshPage => driver.refresh_page(context).await,
        RecoveryActionType::RetryAction => driver.retry_action(context).await,
        RecoveryActionType::ScrollToElement => driver.scroll_to_element(context).await,
        RecoveryActionType::AlternativeSelector => driver.alternative_selector(context).await,
        RecoveryActionType::NavigateBack => driver.navigate_back(context).await,
        RecoveryActionType::WaitForNetworkIdle => driver.wait_for_network_idle(context).await,
        RecoveryActionType::DismissOverlay => driver.dismiss_overlay(context).await,
        RecoveryActionType::ClearCookies => driver.clear_cookies(context).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::NoopDriver;
    use async_trait::async_trait;

    struct StuckDriver;

    #[async_trait]
    impl BrowserDriver for StuckDriver {
        async fn refresh_page(&self, _context: &ActionContext) -> Result<ActionOutcome> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(ActionOutcome::ok())
        }

        async fn retry_action(&self, _context: &ActionContext) -> Result<ActionOutcome> {
            Ok(ActionOutcome::failed("button still missing"))
        }
    }

    #[tokio::test]
    async fn test_step_timeout_is_failure() {
        let step = RecoveryStep::new(RecoveryActionType::RefreshPage, "reload")
            .with_timeout(Duration::from_millis(20));
        let result = execute_step(&StuckDriver, &step, &ActionContext::default()).await;
        assert!(matches!(result, Err(RecoveryError::StepTimeout { duration_ms: 20, .. })));
    }

    #[tokio::test]
    async fn test_unsuccessful_outcome_is_failure() {
        let step = RecoveryStep::new(RecoveryActionType::RetryAction, "retry");
        let result = execute_step(&StuckDriver, &step, &ActionContext::default()).await;
        match result {
            Err(RecoveryError::StepFailed { action, reason }) => {
                assert_eq!(action, "retry_action");
                assert_eq!(reason, "button still missing");
            }
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unsupported_action_propagates() {
        let step = RecoveryStep::new(RecoveryActionType::ClearCookies, "clear");
        let result = execute_step(&StuckDriver, &step, &ActionContext::default()).await;
        assert!(matches!(result, Err(RecoveryError::UnsupportedAction(_))));
    }

    #[test]
    fn test_jitter_stays_in_range() {
        let base = Duration::from_millis(10_000);
        for _ in 0..100 {
            let delay = jittered(base, 0.25);
            assert!(delay >= Duration::from_millis(7_500));
            assert!(delay <= Duration::from_millis(12_500));
        }
        assert_eq!(jittered(base, 0.0), base);
    }

    #[tokio::test]
    async fn test_noop_driver_runs_every_action() {
        for action in [
            RecoveryActionType::Wait,
            RecoveryActionType::ScrollToElement,
            RecoveryActionType::NavigateBack,
            RecoveryActionType::DismissOverlay,
        ] {
            let step = RecoveryStep::new(action, "noop");
            assert!(execute_step(&NoopDriver, &step, &ActionContext::default()).await.is_ok());
        }
    }
}
