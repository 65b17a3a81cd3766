//! Browser-driving boundary
//!
//! The layer that actually clicks, navigates and types lives outside this
//! crate. The orchestrator only asks it for primitive recovery actions.

use async_trait::async_trait;
use std::time::Duration;

use crate::errors::{RecoveryError, Result};
use crate::types::{ActionContext, RecoveryActionType};

/// Outcome of one primitive action
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActionOutcome {
    pub success: bool,

    /// Replacement context when the action changed the page
    pub new_context: Option<ActionContext>,

    /// Free-form detail for logs and learnings
    pub detail: Option<String>,
}

impl ActionOutcome {
    /// Successful outcome without a context change
    pub fn ok() -> Self {
        Self {
            success: true,
            ..Default::default()
        }
    }

    /// Failed outcome with a reason
    pub fn failed(detail: impl Into<String>) -> Self {
        Self {
            success: false,
            new_context: None,
            detail: Some(detail.into()),
        }
    }

    pub fn with_context(mut self, context: ActionContext) -> Self {
        self.new_context = Some(context);
        self
    }
}

/// Primitive recovery actions offered by the browser-driving layer.
///
/// `refresh_page` and `retry_action` are mandatory. The remaining actions
/// default to `UnsupportedAction`, which the orchestrator treats as a step
/// failure.
#[async_trait]
pub trait BrowserDriver: Send + Sync {
    async fn wait(&self, duration: Duration, _context: &ActionContext) -> Result<ActionOutcome> {
        tokio::time::sleep(duration).await;
        Ok(ActionOutcome::ok())
    }

    async fn refresh_page(&self, context: &ActionContext) -> Result<ActionOutcome>;

    /// Re-run the action that originally failed
    async fn retry_action(&self, context: &ActionContext) -> Result<ActionOutcome>;

    async fn scroll_to_element(&self, _context: &ActionContext) -> Result<ActionOutcome> {
        Err(unsupported(RecoveryActionType::ScrollToElement))
    }

    /// Look the target up again through a different selector
    async fn alternative_selector(&self, _context: &ActionContext) -> Result<ActionOutcome> {
        Err(unsupported(RecoveryActionType::AlternativeSelector))
    }

    async fn navigate_back(&self, _context: &ActionContext) -> Result<ActionOutcome> {
        Err(unsupported(RecoveryActionType::NavigateBack))
    }

    async fn wait_for_network_idle(&self, _context: &ActionContext) -> Result<ActionOutcome> {
        Err(unsupported(RecoveryActionType::WaitForNetworkIdle))
    }

    async fn dismiss_overlay(&self, _context: &ActionContext) -> Result<ActionOutcome> {
        Err(unsupported(RecoveryActionType::DismissOverlay))
    }

    async fn clear_cookies(&self, _context: &ActionContext) -> Result<ActionOutcome> {
        Err(unsupported(RecoveryActionType::ClearCookies))
    }

    /// Hand a detected challenge to an external solver
    async fn solve_captcha(&self, provider: &str, _context: &ActionContext) -> Result<ActionOutcome> {
        Err(RecoveryError::UnsupportedAction(format!("solve_captcha({})", provider)))
    }
}

fn unsupported(action: RecoveryActionType) -> RecoveryError {
    RecoveryError::UnsupportedAction(action.as_str().to_string())
}

/// Driver that performs nothing and reports success for every action.
///
/// Backs dry runs from the command line. Waits are skipped.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopDriver;

#[async_trait]
impl BrowserDriver for NoopDriver {
    async fn wait(&self, _duration: Duration, _context: &ActionContext) -> Result<ActionOutcome> {
        Ok(ActionOutcome::ok())
    }

    async fn refresh_page(&self, _context: &ActionContext) -> Result<ActionOutcome> {
        Ok(ActionOutcome::ok())
    }

    async fn retry_action(&self, _context: &ActionContext) -> Result<ActionOutcome> {
        Ok(ActionOutcome::ok())
    }

    async fn scroll_to_element(&self, _context: &ActionContext) -> Result<ActionOutcome> {
        Ok(ActionOutcome::ok())
    }

    async fn alternative_selector(&self, _context: &ActionContext) -> Result<ActionOutcome> {
        Ok(ActionOutcome::ok())
    }

    async fn navigate_back(&self, _context: &ActionContext) -> Result<ActionOutcome> {
        Ok(ActionOutcome::ok())
    }

    async fn wait_for_network_idle(&self, _context: &ActionContext) -> Result<ActionOutcome> {
        Ok(ActionOutcome::ok())
    }

    async fn dismiss_overlay(&self, _context: &ActionContext) -> Result<ActionOutcome> {
        Ok(ActionOutcome::ok())
    }

    async fn clear_cookies(&self, _context: &ActionContext) -> Result<ActionOutcome> {
        Ok(ActionOutcome::ok())
    }
}
