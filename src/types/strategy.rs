//! Recovery plans and the outcomes of executing them

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::time::Duration;

use crate::types::context::ActionContext;
use crate::types::failure::{AutomationError, ErrorType};

/// Lowest success probability a strategy may carry
pub const MIN_SUCCESS_PROBABILITY: f64 = 0.1;

/// Highest success probability a strategy may carry
pub const MAX_SUCCESS_PROBABILITY: f64 = 0.95;

/// Primitive actions a recovery step can request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryActionType {
    Wait,
    RefreshPage,
    RetryAction,
    ScrollToElement,
    AlternativeSelector,
    NavigateBack,
    WaitForNetworkIdle,
    DismissOverlay,
    ClearCookies,
}

impl RecoveryActionType {
    /// Parse an action label as produced by the reasoning oracle
    pub fn parse(label: &str) -> Option<RecoveryActionType> {
        let normalized = label.trim().to_lowercase().replace(['-', ' '], "_");
        match normalized.as_str() {
            "wait" | "delay" | "sleep" => Some(RecoveryActionType::Wait),
            "refresh" | "refresh_page" | "reload" => Some(RecoveryActionType::RefreshPage),
            "retry" | "retry_action" => Some(RecoveryActionType::RetryAction),
            "scroll" | "scroll_to_element" => Some(RecoveryActionType::ScrollToElement),
            "alternative_selector" | "alternate_selector" => {
                Some(RecoveryActionType::AlternativeSelector)
            }
            "navigate_back" | "back" | "go_back" => Some(RecoveryActionType::NavigateBack),
            "wait_for_network_idle" | "wait_for_network" => {
                Some(RecoveryActionType::WaitForNetworkIdle)
            }
            "dismiss_overlay" | "close_popup" | "dismiss_popup" => {
                Some(RecoveryActionType::DismissOverlay)
            }
            "clear_cookies" | "clear_state" => Some(RecoveryActionType::ClearCookies),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RecoveryActionType::Wait => "wait",
            RecoveryActionType::RefreshPage => "refresh_page",
            RecoveryActionType::RetryAction => "retry_action",
            RecoveryActionType::ScrollToElement => "scroll_to_element",
            RecoveryActionType::AlternativeSelector => "alternative_selector",
            RecoveryActionType::NavigateBack => "navigate_back",
            RecoveryActionType::WaitForNetworkIdle => "wait_for_network_idle",
            RecoveryActionType::DismissOverlay => "dismiss_overlay",
            RecoveryActionType::ClearCookies => "clear_cookies",
        }
    }

    /// Default timeout when a step does not specify one
    pub fn default_timeout(&self) -> Duration {
        match self {
            RecoveryActionType::Wait => Duration::from_secs(15),
            RecoveryActionType::RefreshPage => Duration::from_secs(30),
            RecoveryActionType::RetryAction => Duration::from_secs(10),
            RecoveryActionType::ScrollToElement => Duration::from_secs(5),
            RecoveryActionType::AlternativeSelector => Duration::from_secs(10),
            RecoveryActionType::NavigateBack => Duration::from_secs(20),
            RecoveryActionType::WaitForNetworkIdle => Duration::from_secs(20),
            RecoveryActionType::DismissOverlay => Duration::from_secs(5),
            RecoveryActionType::ClearCookies => Duration::from_secs(5),
        }
    }
}

impl fmt::Display for RecoveryActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Time a wait step is allowed beyond its delay
pub const WAIT_TIMEOUT_HEADROOM: Duration = Duration::from_secs(1);

/// One primitive recovery action with its own timeout and optionality
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryStep {
    pub action_type: RecoveryActionType,
    pub description: String,
    #[serde(default)]
    pub parameters: HashMap<String, serde_json::Value>,
    pub timeout: Duration,
    #[serde(default)]
    pub optional: bool,
}

impl RecoveryStep {
    /// Required step with the action's default timeout
    pub fn new(action_type: RecoveryActionType, description: impl Into<String>) -> Self {
        Self {
            action_type,
            description: description.into(),
            parameters: HashMap::new(),
            timeout: action_type.default_timeout(),
            optional: false,
        }
    }

    /// Wait step for a fixed delay
    pub fn wait(duration: Duration, description: impl Into<String>) -> Self {
        Self::new(RecoveryActionType::Wait, description)
            .with_param("duration_ms", serde_json::json!(duration.as_millis() as u64))
            .with_timeout(duration + WAIT_TIMEOUT_HEADROOM)
    }

    pub fn with_param(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.parameters.insert(key.into(), value);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// Requested delay for wait-like steps
    pub fn delay(&self) -> Option<Duration> {
        self.parameters
            .get("duration_ms")
            .and_then(|v| v.as_u64())
            .map(Duration::from_millis)
    }
}

/// Ordered, prioritized recovery plan with an optional owned fallback.
///
/// The fallback relation is a singly linked chain built once at generation
/// time; it cannot form a cycle because each strategy owns its successor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryStrategy {
    pub id: String,
    pub name: String,
    pub description: String,
    pub steps: Vec<RecoveryStep>,

    /// Always within [0.1, 0.95]
    pub success_probability: f64,

    pub priority: i32,
    pub time_estimate: Duration,
    #[serde(default)]
    pub applicable_conditions: Vec<String>,
    #[serde(default)]
    pub fallback_strategy: Option<Box<RecoveryStrategy>>,
}

impl RecoveryStrategy {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
        steps: Vec<RecoveryStep>,
    ) -> Self {
        let time_estimate = steps.iter().map(estimated_step_time).sum();
        Self {
            id: id.into(),
            name: name.into(),
            description: description.into(),
            steps,
            success_probability: 0.5,
            priority: 5,
            time_estimate,
            applicable_conditions: Vec::new(),
            fallback_strategy: None,
        }
    }

    pub fn with_probability(mut self, probability: f64) -> Self {
        self.set_probability(probability);
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_time_estimate(mut self, estimate: Duration) -> Self {
        self.time_estimate = estimate;
        self
    }

    pub fn with_conditions(mut self, conditions: &[&str]) -> Self {
        self.applicable_conditions = conditions.iter().map(|c| c.to_string()).collect();
        self
    }

    /// Set the success probability, clamped into [0.1, 0.95]
    pub fn set_probability(&mut self, probability: f64) {
        self.success_probability = clamp_probability(probability);
    }

    /// Number of fallbacks below this strategy
    pub fn fallback_depth(&self) -> usize {
        let mut depth = 0;
        let mut current = self.fallback_strategy.as_deref();
        while let Some(next) = current {
            depth += 1;
            current = next.fallback_strategy.as_deref();
        }
        depth
    }

    /// Ids of this strategy followed by every fallback, in order
    pub fn chain_ids(&self) -> Vec<String> {
        let mut ids = vec![self.id.clone()];
        let mut current = self.fallback_strategy.as_deref();
        while let Some(next) = current {
            ids.push(next.id.clone());
            current = next.fallback_strategy.as_deref();
        }
        ids
    }

    /// True when no id appears twice along the chain
    pub fn chain_is_acyclic(&self) -> bool {
        let ids = self.chain_ids();
        let unique: HashSet<&String> = ids.iter().collect();
        unique.len() == ids.len()
    }

    /// Copy without the fallback chain
    pub fn detached(&self) -> RecoveryStrategy {
        RecoveryStrategy {
            fallback_strategy: None,
            ..self.clone()
        }
    }
}

/// Clamp a probability into the strategy range, mapping NaN to the floor
pub fn clamp_probability(probability: f64) -> f64 {
    if probability.is_nan() {
        MIN_SUCCESS_PROBABILITY
    } else {
        probability.clamp(MIN_SUCCESS_PROBABILITY, MAX_SUCCESS_PROBABILITY)
    }
}

fn estimated_step_time(step: &RecoveryStep) -> Duration {
    match step.action_type {
        RecoveryActionType::Wait => step.delay().unwrap_or(Duration::from_secs(1)),
        RecoveryActionType::RefreshPage | RecoveryActionType::NavigateBack => {
            Duration::from_secs(3)
        }
        RecoveryActionType::WaitForNetworkIdle => Duration::from_secs(2),
        _ => Duration::from_secs(1),
    }
}

/// Outcome of one execution attempt. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryResult {
    pub success: bool,

    /// The strategy whose execution produced this result
    pub strategy: RecoveryStrategy,

    /// Never longer than `strategy.steps`
    pub completed_steps: Vec<RecoveryStep>,

    pub duration: Duration,
    pub new_context: Option<ActionContext>,
    pub error: Option<AutomationError>,
    pub learnings: Vec<String>,

    /// Error category the attempt was recovering from
    pub error_type: ErrorType,

    /// Context as it was before the strategy started
    pub initial_context: ActionContext,

    /// Set when a stop signal ended the attempt between steps
    #[serde(default)]
    pub cancelled: bool,

    /// Ids of every strategy tried, primary first
    #[serde(default)]
    pub strategies_attempted: Vec<String>,
}

impl RecoveryResult {
    /// Fraction of the strategy's steps that completed
    pub fn completion_ratio(&self) -> f64 {
        if self.strategy.steps.is_empty() {
            return 1.0;
        }
        self.completed_steps.len() as f64 / self.strategy.steps.len() as f64
    }
}

/// Uniform result shape shared by the specialized recovery flows
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpecializedResult {
    pub success: bool,
    pub method: String,
    pub duration: Duration,
    pub confidence: f64,
    pub error: Option<String>,
}

impl SpecializedResult {
    pub fn succeeded(method: impl Into<String>, duration: Duration, confidence: f64) -> Self {
        Self {
            success: true,
            method: method.into(),
            duration,
            confidence: confidence.clamp(0.0, 1.0),
            error: None,
        }
    }

    pub fn failed(method: impl Into<String>, duration: Duration, error: impl Into<String>) -> Self {
        Self {
            success: false,
            method: method.into(),
            duration,
            confidence: 0.0,
            error: Some(error.into()),
        }
    }
}
