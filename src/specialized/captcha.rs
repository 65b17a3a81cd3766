//! CAPTCHA detection and provider-specific handling

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::browser::BrowserDriver;
use crate::errors::RecoveryError;
use crate::specialized::run_steps;
use crate::types::{
    ActionContext, AutomationError, RecoveryActionType, RecoveryStep, SpecializedResult,
};

/// Keywords that mark a failure as a bot check of unknown make
const GENERIC_KEYWORDS: [&str; 5] = ["captcha", "challenge", "verification", "bot", "blocked"];

/// Time allowed for an external solver
const SOLVER_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptchaProvider {
    Recaptcha,
    Hcaptcha,
    Turnstile,
    Generic,
}

impl CaptchaProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            CaptchaProvider::Recaptcha => "recaptcha",
            CaptchaProvider::Hcaptcha => "hcaptcha",
            CaptchaProvider::Turnstile => "turnstile",
            CaptchaProvider::Generic => "generic",
        }
    }
}

impl fmt::Display for CaptchaProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a provider's challenge is handled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptchaMethod {
    /// Hand the challenge to the driver's solver
    Solve,
    /// Wait for a non-interactive challenge to pass, then retry
    AwaitChallenge,
    /// Clear cookies, reload and retry with a fresh session
    SessionReset,
}

struct CaptchaHandler {
    method: CaptchaMethod,
    label: &'static str,
    confidence: f64,
}

fn handler_for(provider: CaptchaProvider) -> CaptchaHandler {
    match provider {
        CaptchaProvider::Recaptcha => CaptchaHandler {
            method: CaptchaMethod::Solve,
            label: "recaptcha_solver",
            confidence: 0.8,
        },
        CaptchaProvider::Hcaptcha => CaptchaHandler {
            method: CaptchaMethod::Solve,
            label: "hcaptcha_solver",
            confidence: 0.75,
        },
        CaptchaProvider::Turnstile => CaptchaHandler {
            method: CaptchaMethod::AwaitChallenge,
            label: "turnstile_wait",
            confidence: 0.6,
        },
        CaptchaProvider::Generic => CaptchaHandler {
            method: CaptchaMethod::SessionReset,
            label: "session_reset",
            confidence: 0.4,
        },
    }
}

/// Detect the challenge provider from the error message, its context values
/// and the page URL. Named providers win over the generic keywords.
pub fn detect_provider(error: &AutomationError, context: &ActionContext) -> Option<CaptchaProvider> {
    let mut haystack = format!(
        "{} {} {}",
        error.error_type, error.message, context.current_url
    )
    .to_lowercase();
    for value in error.context.values() {
        haystack.push(' ');
        haystack.push_str(&value.to_string().to_lowercase());
    }

    if haystack.contains("recaptcha") || haystack.contains("g-recaptcha") {
        Some(CaptchaProvider::Recaptcha)
    } else if haystack.contains("hcaptcha") || haystack.contains("h-captcha") {
        Some(CaptchaProvider::Hcaptcha)
    } else if haystack.contains("turnstile") || haystack.contains("cf-challenge") {
        Some(CaptchaProvider::Turnstile)
    } else if GENERIC_KEYWORDS.iter().any(|k| haystack.contains(k)) {
        Some(CaptchaProvider::Generic)
    } else {
        None
    }
}

/// Detect and handle a CAPTCHA. Never fails; the outcome is in the result.
///
/// `cancel` ends the flow between steps and abandons a pending solver call.
pub async fn handle_captcha(
    driver: &dyn BrowserDriver,
    error: &AutomationError,
    context: &ActionContext,
    cancel: &CancellationToken,
) -> SpecializedResult {
    let started = Instant::now();

    let Some(provider) = detect_provider(error, context) else {
        return SpecializedResult::failed(
            "captcha_detection",
            started.elapsed(),
            "no captcha provider detected",
        );
    };

    let handler = handler_for(provider);
    info!(%provider, method = handler.label, "handling captcha");

    let outcome = match handler.method {
        CaptchaMethod::Solve => {
            let solve = tokio::time::timeout(SOLVER_TIMEOUT, driver.solve_captcha(provider.as_str(), context));
            tokio::select! {
                _ = cancel.cancelled() => Err(RecoveryError::Cancelled.to_string()),
                solved = solve => match solved {
                    Ok(Ok(outcome)) if outcome.success => Ok(()),
                    Ok(Ok(outcome)) => Err(outcome.detail.unwrap_or_else(|| "solver gave up".to_string())),
                    Ok(Err(e)) => Err(e.to_string()),
                    Err(_) => Err(format!("solver timed out after {}s", SOLVER_TIMEOUT.as_secs())),
                },
            }
        }
        CaptchaMethod::AwaitChallenge => {
            let steps = [
                RecoveryStep::wait(Duration::from_secs(5), "Let the challenge complete"),
                RecoveryStep::new(RecoveryActionType::RetryAction, "Retry the blocked action"),
            ];
            run_steps(driver, &steps, context, cancel).await.map(|_| ()).map_err(|e| e.to_string())
        }
        CaptchaMethod::SessionReset => {
            let steps = [
                RecoveryStep::new(RecoveryActionType::ClearCookies, "Drop the flagged session"),
                RecoveryStep::new(RecoveryActionType::RefreshPage, "Reload the page"),
                RecoveryStep::new(RecoveryActionType::RetryAction, "Retry the blocked action"),
            ];
            run_steps(driver, &steps, context, cancel).await.map(|_| ()).map_err(|e| e.to_string())
        }
    };

    match outcome {
        Ok(()) => SpecializedResult::succeeded(handler.label, started.elapsed(), handler.confidence),
        Err(reason) => {
            warn!(%provider, reason = %reason, "captcha handling failed");
            SpecializedResult::failed(handler.label, started.elapsed(), reason)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::{ActionOutcome, NoopDriver};
    use crate::errors::Result;
    use async_trait::async_trait;

    struct SolvingDriver;

    #[async_trait]
    impl BrowserDriver for SolvingDriver {
        async fn refresh_page(&self, _context: &ActionContext) -> Result<ActionOutcome> {
            Ok(ActionOutcome::ok())
        }

        async fn retry_action(&self, _context: &ActionContext) -> Result<ActionOutcome> {
            Ok(ActionOutcome::ok())
        }

        async fn solve_captcha(&self, provider: &str, _context: &ActionContext) -> Result<ActionOutcome> {
            if provider == "recaptcha" {
                Ok(ActionOutcome::ok())
            } else {
                Ok(ActionOutcome::failed("no solver for this provider"))
            }
        }
    }

    #[test]
    fn test_detect_named_providers() {
        let ctx = ActionContext::default();
        let error = AutomationError::new("captcha", "iframe g-recaptcha appeared");
        assert_eq!(detect_provider(&error, &ctx), Some(CaptchaProvider::Recaptcha));

        let error = AutomationError::new("blocked", "challenge page")
            .with_context("widget", serde_json::json!("hCaptcha"));
        assert_eq!(detect_provider(&error, &ctx), Some(CaptchaProvider::Hcaptcha));

        let ctx = ActionContext::new("https://challenges.cloudflare.com/turnstile/v0", "login");
        let error = AutomationError::new("unknown", "page did not load");
        assert_eq!(detect_provider(&error, &ctx), Some(CaptchaProvider::Turnstile));
    }

    #[test]
    fn test_detect_generic_and_none() {
        let ctx = ActionContext::default();
        let error = AutomationError::new("unknown", "Access blocked: unusual traffic");
        assert_eq!(detect_provider(&error, &ctx), Some(CaptchaProvider::Generic));

        let error = AutomationError::new("element_not_found", "button missing");
        assert_eq!(detect_provider(&error, &ctx), None);
    }

    #[tokio::test]
    async fn test_recaptcha_solved() {
        let error = AutomationError::new("captcha", "recaptcha v2");
        let result = handle_captcha(
            &SolvingDriver,
            &error,
            &ActionContext::default(),
            &CancellationToken::new(),
        )
        .await;
        assert!(result.success);
        assert_eq!(result.method, "recaptcha_solver");
        assert_eq!(result.confidence, 0.8);
    }

    #[tokio::test]
    async fn test_hcaptcha_solver_failure_reported() {
        let error = AutomationError::new("captcha", "hcaptcha checkbox");
        let result = handle_captcha(
            &SolvingDriver,
            &error,
            &ActionContext::default(),
            &CancellationToken::new(),
        )
        .await;
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("no solver for this provider"));
    }

    #[tokio::test]
    async fn test_generic_needs_cookie_clearing() {
        let error = AutomationError::new("bot_detected", "verification required");
        // the default driver cannot clear cookies
        let result = handle_captcha(
            &SolvingDriver,
            &error,
            &ActionContext::default(),
            &CancellationToken::new(),
        )
        .await;
        assert!(!result.success);
        assert_eq!(result.method, "session_reset");

        let result = handle_captcha(
            &NoopDriver,
            &error,
            &ActionContext::default(),
            &CancellationToken::new(),
        )
        .await;
        assert!(result.success);
        assert_eq!(result.confidence, 0.4);
    }

    #[tokio::test]
    async fn test_no_captcha() {
        let error = AutomationError::new("network", "connection reset");
        let result = handle_captcha(
            &NoopDriver,
            &error,
            &ActionContext::default(),
            &CancellationToken::new(),
        )
        .await;
        assert!(!result.success);
        assert_eq!(result.method, "captcha_detection");
    }

    struct StalledSolver;

    #[async_trait]
    impl BrowserDriver for StalledSolver {
        async fn refresh_page(&self, _context: &ActionContext) -> Result<ActionOutcome> {
            Ok(ActionOutcome::ok())
        }

        async fn retry_action(&self, _context: &ActionContext) -> Result<ActionOutcome> {
            Ok(ActionOutcome::ok())
        }

        async fn solve_captcha(&self, _provider: &str, _context: &ActionContext) -> Result<ActionOutcome> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn test_cancelled_before_session_reset() {
        let error = AutomationError::new("bot_detected", "verification required");
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result =
            handle_captcha(&NoopDriver, &error, &ActionContext::default(), &cancel).await;
        assert!(!result.success);
        assert_eq!(result.method, "session_reset");
        assert_eq!(result.error.as_deref(), Some("Recovery cancelled"));
    }

    #[tokio::test]
    async fn test_cancel_abandons_pending_solver() {
        let error = AutomationError::new("captcha", "recaptcha v2");
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let result = tokio::time::timeout(
            Duration::from_secs(5),
            handle_captcha(&StalledSolver, &error, &ActionContext::default(), &cancel),
        )
        .await
        .unwrap();
        assert!(!result.success);
        assert_eq!(result.method, "recaptcha_solver");
        assert_eq!(result.error.as_deref(), Some("Recovery cancelled"));
    }
}
