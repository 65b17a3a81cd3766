//! Deterministic strategy templates keyed by error type
//!
//! Template ids are stable across runs so the ledger can learn per id.

use std::time::Duration;

use crate::recovery::dispatch::JITTER_PARAM;
use crate::types::{ErrorType, RecoveryActionType, RecoveryStep, RecoveryStrategy};

pub const WAIT_AND_RETRY: &str = "wait_and_retry";
pub const ALTERNATIVE_SELECTOR: &str = "alternative_selector";
pub const SCROLL_AND_SEARCH: &str = "scroll_and_search";
pub const DISMISS_OVERLAY: &str = "dismiss_overlay_and_retry";
pub const REFRESH_AND_RETRY: &str = "refresh_and_retry";
pub const NETWORK_OPTIMIZATION: &str = "network_optimization";
pub const NAVIGATE_BACK: &str = "navigate_back_and_retry";
pub const BACKOFF_AND_RETRY: &str = "backoff_and_retry";
pub const CLEAR_SESSION: &str = "clear_session_and_retry";
pub const GENERIC_RETRY: &str = "generic_retry";

pub fn wait_and_retry() -> RecoveryStrategy {
    RecoveryStrategy::new(
        WAIT_AND_RETRY,
        "Wait and Retry",
        "Give the page time to settle, then retry the failed action",
        vec![
            RecoveryStep::wait(Duration::from_millis(2000), "Wait for the page to settle"),
            RecoveryStep::new(RecoveryActionType::RetryAction, "Retry the failed action"),
        ],
    )
    .with_probability(0.7)
    .with_priority(8)
    .with_conditions(&["element_timing", "dynamic_content"])
}

pub fn alternative_selector() -> RecoveryStrategy {
    RecoveryStrategy::new(
        ALTERNATIVE_SELECTOR,
        "Alternative Selector",
        "Locate the target through a different selector and act on it",
        vec![
            RecoveryStep::new(
                RecoveryActionType::AlternativeSelector,
                "Find the element with an alternative selector",
            ),
            RecoveryStep::new(RecoveryActionType::RetryAction, "Retry with the new selector"),
        ],
    )
    .with_probability(0.6)
    .with_priority(7)
    .with_conditions(&["selector_changed"])
}

pub fn scroll_and_search() -> RecoveryStrategy {
    RecoveryStrategy::new(
        SCROLL_AND_SEARCH,
        "Scroll and Search",
        "Scroll the target into view before retrying",
        vec![
            RecoveryStep::new(RecoveryActionType::ScrollToElement, "Scroll the element into view"),
            RecoveryStep::wait(Duration::from_millis(500), "Let lazy content render").optional(),
            RecoveryStep::new(RecoveryActionType::RetryAction, "Retry the failed action"),
        ],
    )
    .with_probability(0.55)
    .with_priority(6)
    .with_conditions(&["element_outside_viewport", "lazy_loading"])
}

pub fn dismiss_overlay_and_retry() -> RecoveryStrategy {
    RecoveryStrategy::new(
        DISMISS_OVERLAY,
        "Dismiss Overlay",
        "Close whatever covers the target, then retry",
        vec![
            RecoveryStep::new(RecoveryActionType::DismissOverlay, "Close popups and overlays"),
            RecoveryStep::new(RecoveryActionType::RetryAction, "Retry the failed action"),
        ],
    )
    .with_probability(0.65)
    .with_priority(8)
    .with_conditions(&["overlay_present"])
}

pub fn refresh_and_retry() -> RecoveryStrategy {
    RecoveryStrategy::new(
        REFRESH_AND_RETRY,
        "Refresh and Retry",
        "Reload the page and retry once it is idle",
        vec![
            RecoveryStep::new(RecoveryActionType::RefreshPage, "Reload the page"),
            RecoveryStep::new(
                RecoveryActionType::WaitForNetworkIdle,
                "Wait for network activity to settle",
            )
            .optional(),
            RecoveryStep::new(RecoveryActionType::RetryAction, "Retry the failed action"),
        ],
    )
    .with_probability(0.6)
    .with_priority(7)
    .with_conditions(&["stale_page", "slow_load"])
}

pub fn network_optimization() -> RecoveryStrategy {
    RecoveryStrategy::new(
        NETWORK_OPTIMIZATION,
        "Network Optimization",
        "Wait out network instability before retrying",
        vec![
            RecoveryStep::new(
                RecoveryActionType::WaitForNetworkIdle,
                "Wait for network activity to settle",
            )
            .optional(),
            RecoveryStep::wait(Duration::from_millis(3000), "Back off before retrying"),
            RecoveryStep::new(RecoveryActionType::RetryAction, "Retry the failed action"),
        ],
    )
    .with_probability(0.5)
    .with_priority(6)
    .with_conditions(&["network_instability"])
}

pub fn navigate_back_and_retry() -> RecoveryStrategy {
    RecoveryStrategy::new(
        NAVIGATE_BACK,
        "Navigate Back and Retry",
        "Return to the previous page and repeat the navigation",
        vec![
            RecoveryStep::new(RecoveryActionType::NavigateBack, "Go back one page"),
            RecoveryStep::new(RecoveryActionType::RetryAction, "Retry the navigation"),
        ],
    )
    .with_probability(0.5)
    .with_priority(6)
    .with_conditions(&["navigation_error"])
}

pub fn backoff_and_retry() -> RecoveryStrategy {
    RecoveryStrategy::new(
        BACKOFF_AND_RETRY,
        "Back Off and Retry",
        "Pause long enough for a rate limit to reset",
        vec![
            RecoveryStep::wait(Duration::from_millis(10_000), "Wait for the rate limit window")
                .with_param(JITTER_PARAM, serde_json::json!(0.25))
                .with_timeout(Duration::from_secs(14)),
            RecoveryStep::new(RecoveryActionType::RetryAction, "Retry the failed action"),
        ],
    )
    .with_probability(0.6)
    .with_priority(8)
    .with_conditions(&["rate_limited"])
}

pub fn clear_session_and_retry() -> RecoveryStrategy {
    RecoveryStrategy::new(
        CLEAR_SESSION,
        "Clear Session and Retry",
        "Drop cookies, reload and retry with a clean session",
        vec![
            RecoveryStep::new(RecoveryActionType::ClearCookies, "Clear cookies"),
            RecoveryStep::new(RecoveryActionType::RefreshPage, "Reload the page"),
            RecoveryStep::new(RecoveryActionType::RetryAction, "Retry the failed action"),
        ],
    )
    .with_probability(0.35)
    .with_priority(5)
    .with_conditions(&["session_flagged"])
}

/// Terminal strategy of every fallback chain and the unconditional floor
pub fn generic_retry() -> RecoveryStrategy {
    RecoveryStrategy::new(
        GENERIC_RETRY,
        "Generic Retry",
        "Wait briefly and retry the failed action",
        vec![
            RecoveryStep::wait(Duration::from_millis(1000), "Short pause"),
            RecoveryStep::new(RecoveryActionType::RetryAction, "Retry the failed action"),
        ],
    )
    .with_probability(0.45)
    .with_priority(1)
}

/// Primary candidates for an error type, most specific first
pub fn templates_for(error_type: ErrorType) -> Vec<RecoveryStrategy> {
    match error_type {
        ErrorType::ElementNotFound => {
            vec![wait_and_retry(), alternative_selector(), scroll_and_search()]
        }
        ErrorType::ElementNotInteractable => vec![
            dismiss_overlay_and_retry(),
            scroll_and_search(),
            wait_and_retry(),
        ],
        ErrorType::StaleElement => vec![wait_and_retry(), refresh_and_retry()],
        ErrorType::PageLoadTimeout => vec![refresh_and_retry(), network_optimization()],
        ErrorType::NavigationFailed => vec![navigate_back_and_retry(), refresh_and_retry()],
        ErrorType::NetworkError => vec![network_optimization(), refresh_and_retry()],
        ErrorType::JavascriptError => vec![refresh_and_retry(), wait_and_retry()],
        ErrorType::RateLimited => vec![backoff_and_retry()],
        ErrorType::CaptchaDetected => vec![clear_session_and_retry(), backoff_and_retry()],
        ErrorType::PermissionDenied | ErrorType::AuthenticationRequired => {
            vec![navigate_back_and_retry()]
        }
        ErrorType::Unknown => vec![wait_and_retry(), refresh_and_retry()],
    }
}

/// Progressively simpler fallbacks for an error type, ending in the generic retry
pub fn fallback_ladder(error_type: ErrorType) -> Vec<RecoveryStrategy> {
    let mut ladder = match error_type {
        ErrorType::ElementNotFound | ErrorType::ElementNotInteractable => {
            vec![refresh_and_retry(), wait_and_retry()]
        }
        ErrorType::StaleElement | ErrorType::JavascriptError | ErrorType::Unknown => {
            vec![refresh_and_retry(), wait_and_retry()]
        }
        ErrorType::PageLoadTimeout | ErrorType::NetworkError => {
            vec![network_optimization(), refresh_and_retry()]
        }
        ErrorType::NavigationFailed => vec![refresh_and_retry()],
        ErrorType::RateLimited | ErrorType::CaptchaDetected => vec![backoff_and_retry()],
        ErrorType::PermissionDenied | ErrorType::AuthenticationRequired => Vec::new(),
    };
    ladder.push(generic_retry());
    ladder
}

/// Lookup by stable id, for the command line and tests
pub fn template_by_id(id: &str) -> Option<RecoveryStrategy> {
    let strategy = match id {
        WAIT_AND_RETRY => wait_and_retry(),
        ALTERNATIVE_SELECTOR => alternative_selector(),
        SCROLL_AND_SEARCH => scroll_and_search(),
        DISMISS_OVERLAY => dismiss_overlay_and_retry(),
        REFRESH_AND_RETRY => refresh_and_retry(),
        NETWORK_OPTIMIZATION => network_optimization(),
        NAVIGATE_BACK => navigate_back_and_retry(),
        BACKOFF_AND_RETRY => backoff_and_retry(),
        CLEAR_SESSION => clear_session_and_retry(),
        GENERIC_RETRY => generic_retry(),
        _ => return None,
    };
    Some(strategy)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_element_not_found_templates() {
        let templates = templates_for(ErrorType::ElementNotFound);
        let ids: Vec<&str> = templates.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec![WAIT_AND_RETRY, ALTERNATIVE_SELECTOR, SCROLL_AND_SEARCH]);

        let top = &templates[0];
        assert_eq!(top.name, "Wait and Retry");
        assert_eq!(top.steps.len(), 2);
        assert_eq!(top.steps[0].action_type, RecoveryActionType::Wait);
        assert_eq!(top.steps[1].action_type, RecoveryActionType::RetryAction);
        assert_eq!(top.success_probability, 0.7);
    }

    #[test]
    fn test_page_load_timeout_templates() {
        let ids: Vec<String> = templates_for(ErrorType::PageLoadTimeout)
            .into_iter()
            .map(|s| s.id)
            .collect();
        assert_eq!(ids, vec![REFRESH_AND_RETRY, NETWORK_OPTIMIZATION]);
    }

    #[test]
    fn test_every_type_has_templates_and_ladder() {
        for ty in ErrorType::all() {
            assert!(!templates_for(*ty).is_empty(), "{:?}", ty);
            let ladder = fallback_ladder(*ty);
            assert_eq!(ladder.last().map(|s| s.id.as_str()), Some(GENERIC_RETRY));
        }
    }

    #[test]
    fn test_generic_retry_floor_shape() {
        let floor = generic_retry();
        assert_eq!(floor.steps.len(), 2);
        assert!((0.4..=0.5).contains(&floor.success_probability));
    }

    #[test]
    fn test_backoff_wait_is_jittered() {
        let backoff = backoff_and_retry();
        let wait = &backoff.steps[0];
        assert!(wait.parameters.contains_key(JITTER_PARAM));
        // longest jittered wait still fits
        assert!(wait.timeout > wait.delay().unwrap().mul_f64(1.25));
    }

    #[test]
    fn test_template_lookup() {
        assert_eq!(template_by_id(SCROLL_AND_SEARCH).unwrap().steps.len(), 3);
        assert!(template_by_id("teleport").is_none());
    }
}
