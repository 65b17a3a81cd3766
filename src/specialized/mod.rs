//! Specialized recovery flows
//!
//! CAPTCHA and timeout failures bypass strategy ranking. Each is dispatched
//! through a fixed table to a handler, and every handler reports the same
//! `SpecializedResult` shape.

pub mod captcha;
pub mod timeout;

use std::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::browser::BrowserDriver;
use crate::errors::{RecoveryError, Result};
use crate::recovery::execute_step;
use crate::types::{ActionContext, RecoveryStep};

pub use captcha::{detect_provider, handle_captcha, CaptchaMethod, CaptchaProvider};
pub use timeout::{extended_timeout, manage_timeout, TimeoutKind};

/// Run steps in order, stopping at the first required failure or when
/// `cancel` fires between steps. Returns the context after the last step.
pub(crate) async fn run_steps(
    driver: &dyn BrowserDriver,
    steps: &[RecoveryStep],
    context: &ActionContext,
    cancel: &CancellationToken,
) -> Result<ActionContext> {
    let started = Instant::now();
    let mut current = context.clone();
    for step in steps {
        if cancel.is_cancelled() {
            tracing::info!(action = %step.action_type, "specialized flow cancelled");
            return Err(RecoveryError::Cancelled);
        }
        match execute_step(driver, step, &current).await {
            Ok(outcome) => {
                if let Some(next) = outcome.new_context {
                    current = next;
                }
            }
            Err(e) if step.optional => {
                tracing::debug!(action = %step.action_type, error = %e, "optional step failed");
            }
            Err(e) => return Err(e),
        }
    }
    tracing::debug!(steps = steps.len(), elapsed_ms = started.elapsed().as_millis() as u64, "specialized steps finished");
    Ok(current)
}
