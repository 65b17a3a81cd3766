//! Timeout management
//!
//! Timeouts are grouped by kind, each with a fixed handler. Handlers that
//! repeat work do so under an extended timeout, capped at 90 seconds.

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::browser::BrowserDriver;
use crate::recovery::MAX_EXTENDED_TIMEOUT;
use crate::specialized::run_steps;
use crate::types::{
    ActionContext, AutomationError, RecoveryActionType, RecoveryStep, SpecializedResult,
};

/// Growth applied to the timeout that was exceeded
const EXTENSION_FACTOR: f64 = 1.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeoutKind {
    PageLoad,
    Element,
    Network,
    Script,
    /// Whole-task budget ran out
    Task,
}

impl TimeoutKind {
    /// Kind of timeout described by an error, if it is one at all
    pub fn detect(error: &AutomationError) -> Option<TimeoutKind> {
        let tag = error.error_type.to_lowercase();
        let message = error.message.to_lowercase();
        let mentions_timeout = tag.contains("timeout")
            || tag.contains("timed_out")
            || message.contains("timeout")
            || message.contains("timed out");
        if !mentions_timeout {
            return None;
        }

        let text = format!("{} {}", tag, message);
        let kind = if text.contains("script") || text.contains("javascript") {
            TimeoutKind::Script
        } else if text.contains("network") || text.contains("request") || text.contains("connection") {
            TimeoutKind::Network
        } else if text.contains("element") || text.contains("selector") || text.contains("waiting for") {
            TimeoutKind::Element
        } else if text.contains("task") {
            TimeoutKind::Task
        } else {
            TimeoutKind::PageLoad
        };
        Some(kind)
    }

    /// Timeout assumed when the error does not report one
    pub fn default_timeout(&self) -> Duration {
        match self {
            TimeoutKind::PageLoad => Duration::from_secs(30),
            TimeoutKind::Element => Duration::from_secs(10),
            TimeoutKind::Network => Duration::from_secs(20),
            TimeoutKind::Script => Duration::from_secs(15),
            TimeoutKind::Task => Duration::from_secs(60),
        }
    }

    fn method(&self) -> &'static str {
        match self {
            TimeoutKind::PageLoad => "refresh_with_extended_timeout",
            TimeoutKind::Element => "wait_for_element",
            TimeoutKind::Network => "await_network_idle",
            TimeoutKind::Script => "reload_page",
            TimeoutKind::Task => "extend_task_timeout",
        }
    }

    /// Steps that retry the timed-out work under `timeout`
    fn steps(&self, timeout: Duration) -> Vec<RecoveryStep> {
        let retry = RecoveryStep::new(RecoveryActionType::RetryAction, "Retry the timed-out action")
            .with_timeout(timeout);
        match self {
            TimeoutKind::PageLoad => vec![
                RecoveryStep::new(RecoveryActionType::RefreshPage, "Reload the page").with_timeout(timeout),
                RecoveryStep::new(RecoveryActionType::WaitForNetworkIdle, "Wait for the load to settle")
                    .optional(),
                retry,
            ],
            TimeoutKind::Element => vec![
                RecoveryStep::wait(Duration::from_secs(2), "Give the element time to appear"),
                retry,
            ],
            TimeoutKind::Network => vec![
                RecoveryStep::new(RecoveryActionType::WaitForNetworkIdle, "Wait for network activity to settle")
                    .with_timeout(timeout)
                    .optional(),
                retry,
            ],
            TimeoutKind::Script => vec![
                RecoveryStep::new(RecoveryActionType::RefreshPage, "Reload to reset page scripts")
                    .with_timeout(timeout),
                retry,
            ],
            TimeoutKind::Task => vec![retry],
        }
    }
}

/// Extend `exceeded` by half, never beyond the cap
pub fn extended_timeout(exceeded: Duration) -> Duration {
    exceeded.mul_f64(EXTENSION_FACTOR).min(MAX_EXTENDED_TIMEOUT)
}

/// Timeout the error reports in its `timeout_ms` context value
fn reported_timeout(error: &AutomationError) -> Option<Duration> {
    error
        .context
        .get("timeout_ms")
        .and_then(|v| v.as_u64())
        .filter(|ms| *ms > 0)
        .map(Duration::from_millis)
}

/// Handle a timeout failure. Never fails; the outcome is in the result.
pub async fn manage_timeout(
    driver: &dyn BrowserDriver,
    error: &AutomationError,
    context: &ActionContext,
    cancel: &CancellationToken,
) -> SpecializedResult {
    let started = Instant::now();

    let Some(kind) = TimeoutKind::detect(error) else {
        return SpecializedResult::failed("timeout_detection", started.elapsed(), "not a timeout failure");
    };

    let exceeded = reported_timeout(error).unwrap_or_else(|| kind.default_timeout());
    let mut extended = extended_timeout(exceeded);
    if let Some(budget) = context.time_constraint {
        extended = extended.min(budget);
    }
    info!(?kind, exceeded_ms = exceeded.as_millis() as u64, extended_ms = extended.as_millis() as u64, "managing timeout");

    if extended <= exceeded && kind == TimeoutKind::Task {
        return SpecializedResult::failed(
            kind.method(),
            started.elapsed(),
            "no time left to extend the task",
        );
    }

    match run_steps(driver, &kind.steps(extended), context, cancel).await {
        Ok(_) => {
            // scales with the extension gained, at most 0.6
            let headroom = (extended.as_secs_f64() / exceeded.as_secs_f64().max(f64::EPSILON)).min(1.5);
            SpecializedResult::succeeded(kind.method(), started.elapsed(), 0.4 * headroom)
        }
        Err(e) => {
            warn!(?kind, error = %e, "timeout handling failed");
            SpecializedResult::failed(kind.method(), started.elapsed(), e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::NoopDriver;

    #[test]
    fn test_detect_kinds() {
        let cases = [
            ("page_load_timeout", "Navigation timeout of 30000 ms exceeded", Some(TimeoutKind::PageLoad)),
            ("timeout", "Timeout waiting for selector #buy", Some(TimeoutKind::Element)),
            ("network_error", "request timed out", Some(TimeoutKind::Network)),
            ("javascript_error", "script timeout", Some(TimeoutKind::Script)),
            ("task_timeout", "Task timed out after 90 seconds", Some(TimeoutKind::Task)),
            ("element_not_found", "button missing", None),
        ];
        for (tag, message, expected) in cases {
            let error = AutomationError::new(tag, message);
            assert_eq!(TimeoutKind::detect(&error), expected, "{} / {}", tag, message);
        }
    }

    #[test]
    fn test_extension_is_capped() {
        assert_eq!(extended_timeout(Duration::from_secs(30)), Duration::from_secs(45));
        assert_eq!(extended_timeout(Duration::from_secs(80)), MAX_EXTENDED_TIMEOUT);
    }

    #[tokio::test]
    async fn test_page_load_timeout_handled() {
        let error = AutomationError::new("page_load_timeout", "load took too long")
            .with_context("timeout_ms", serde_json::json!(20_000));
        let result = manage_timeout(
            &NoopDriver,
            &error,
            &ActionContext::default(),
            &CancellationToken::new(),
        )
        .await;
        assert!(result.success);
        assert_eq!(result.method, "refresh_with_extended_timeout");
        assert!((result.confidence - 0.6).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_exhausted_task_budget() {
        let error = AutomationError::new("task_timeout", "task timed out")
            .with_context("timeout_ms", serde_json::json!(90_000));
        let result = manage_timeout(
            &NoopDriver,
            &error,
            &ActionContext::default(),
            &CancellationToken::new(),
        )
        .await;
        assert!(!result.success);
        assert_eq!(result.method, "extend_task_timeout");
    }

    #[tokio::test]
    async fn test_non_timeout_rejected() {
        let error = AutomationError::new("captcha", "verify you are human");
        let result = manage_timeout(
            &NoopDriver,
            &error,
            &ActionContext::default(),
            &CancellationToken::new(),
        )
        .await;
        assert!(!result.success);
        assert_eq!(result.method, "timeout_detection");
    }

    #[tokio::test]
    async fn test_cancelled_flow_runs_no_steps() {
        let error = AutomationError::new("page_load_timeout", "load took too long");
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result =
            manage_timeout(&NoopDriver, &error, &ActionContext::default(), &cancel).await;
        assert!(!result.success);
        assert_eq!(result.method, "refresh_with_extended_timeout");
        assert_eq!(result.error.as_deref(), Some("Recovery cancelled"));
    }
}
