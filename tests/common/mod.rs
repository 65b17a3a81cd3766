//! Scripted test doubles shared by the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use autoheal::browser::{ActionOutcome, BrowserDriver};
use autoheal::oracle::{CompletionOptions, ReasoningOracle};
use autoheal::types::{ActionContext, RecoveryActionType};
use autoheal::{RecoveryError, Result};

/// Oracle answering prompts by the first marker they contain
pub struct ScriptedOracle {
    replies: Vec<(String, String)>,
    calls: AtomicUsize,
}

impl ScriptedOracle {
    pub fn new() -> Self {
        Self {
            replies: Vec::new(),
            calls: AtomicUsize::new(0),
        }
    }

    /// Answer prompts containing `marker` with `reply`
    pub fn on(mut self, marker: &str, reply: &str) -> Self {
        self.replies.push((marker.to_string(), reply.to_string()));
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ReasoningOracle for ScriptedOracle {
    async fn complete(&self, prompt: &str, _options: CompletionOptions) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.replies
            .iter()
            .find(|(marker, _)| prompt.contains(marker.as_str()))
            .map(|(_, reply)| reply.clone())
            .ok_or_else(|| RecoveryError::OracleUnavailable("no scripted reply".to_string()))
    }
}

/// Browser driver with scripted failures and a call log
#[derive(Default)]
pub struct ScriptedDriver {
    retry_failures: AtomicUsize,
    failing: HashSet<RecoveryActionType>,
    cancel_after: Option<(usize, CancellationToken)>,
    step_delay: Duration,
    calls: AtomicUsize,
    log: Mutex<Vec<RecoveryActionType>>,
}

impl ScriptedDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Retry fails this many times, then succeeds
    pub fn failing_retries(mut self, times: usize) -> Self {
        self.retry_failures = AtomicUsize::new(times);
        self
    }

    /// Action always reports failure
    pub fn failing(mut self, action: RecoveryActionType) -> Self {
        self.failing.insert(action);
        self
    }

    /// Cancel `token` once `calls` actions have finished
    pub fn cancel_after(mut self, calls: usize, token: CancellationToken) -> Self {
        self.cancel_after = Some((calls, token));
        self
    }

    /// Each action takes this long
    pub fn with_step_delay(mut self, delay: Duration) -> Self {
        self.step_delay = delay;
        self
    }

    pub fn log(&self) -> Vec<RecoveryActionType> {
        self.log.lock().unwrap().clone()
    }

    async fn act(&self, action: RecoveryActionType) -> Result<ActionOutcome> {
        if !self.step_delay.is_zero() {
            tokio::time::sleep(self.step_delay).await;
        }
        self.log.lock().unwrap().push(action);

        let outcome = if self.failing.contains(&action) {
            ActionOutcome::failed(format!("{} failed", action))
        } else if action == RecoveryActionType::RetryAction
            && self
                .retry_failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
        {
            ActionOutcome::failed("retry failed")
        } else {
            ActionOutcome::ok()
        };

        let done = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some((limit, token)) = &self.cancel_after {
            if done >= *limit {
                token.cancel();
            }
        }
        Ok(outcome)
    }
}

#[async_trait]
impl BrowserDriver for ScriptedDriver {
    async fn wait(&self, _duration: Duration, _context: &ActionContext) -> Result<ActionOutcome> {
        self.act(RecoveryActionType::Wait).await
    }

    async fn refresh_page(&self, _context: &ActionContext) -> Result<ActionOutcome> {
        self.act(RecoveryActionType::RefreshPage).await
    }

    async fn retry_action(&self, _context: &ActionContext) -> Result<ActionOutcome> {
        self.act(RecoveryActionType::RetryAction).await
    }

    async fn scroll_to_element(&self, _context: &ActionContext) -> Result<ActionOutcome> {
        self.act(RecoveryActionType::ScrollToElement).await
    }

    async fn alternative_selector(&self, _context: &ActionContext) -> Result<ActionOutcome> {
        self.act(RecoveryActionType::AlternativeSelector).await
    }

    async fn navigate_back(&self, _context: &ActionContext) -> Result<ActionOutcome> {
        self.act(RecoveryActionType::NavigateBack).await
    }

    async fn wait_for_network_idle(&self, _context: &ActionContext) -> Result<ActionOutcome> {
        self.act(RecoveryActionType::WaitForNetworkIdle).await
    }

    async fn dismiss_overlay(&self, _context: &ActionContext) -> Result<ActionOutcome> {
        self.act(RecoveryActionType::DismissOverlay).await
    }

    async fn clear_cookies(&self, _context: &ActionContext) -> Result<ActionOutcome> {
        self.act(RecoveryActionType::ClearCookies).await
    }
}
