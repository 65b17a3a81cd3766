//! Failure signals and their structured classification

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::types::context::ActionContext;

/// Closed set of failure categories the pipeline reasons about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorType {
    ElementNotFound,
    ElementNotInteractable,
    StaleElement,
    PageLoadTimeout,
    NavigationFailed,
    NetworkError,
    JavascriptError,
    RateLimited,
    CaptchaDetected,
    PermissionDenied,
    AuthenticationRequired,
    Unknown,
}

impl ErrorType {
    /// Map a raw, loosely formatted error tag onto the closed set.
    ///
    /// Accepts `element_not_found`, `ELEMENT_NOT_FOUND`, `element-not-found`
    /// and a handful of common aliases. Anything else is `Unknown`.
    pub fn from_raw(raw: &str) -> ErrorType {
        let normalized = raw.trim().to_lowercase().replace(['-', ' '], "_");
        match normalized.as_str() {
            "element_not_found" | "no_such_element" | "elementnotfound" => {
                ErrorType::ElementNotFound
            }
            "element_not_interactable" | "element_click_intercepted" | "not_clickable" => {
                ErrorType::ElementNotInteractable
            }
            "stale_element" | "stale_element_reference" => ErrorType::StaleElement,
            "page_load_timeout" | "timeout" | "navigation_timeout" | "load_timeout" => {
                ErrorType::PageLoadTimeout
            }
            "navigation_failed" | "navigation_error" => ErrorType::NavigationFailed,
            "network" | "network_error" | "connection_refused" | "dns_error" => {
                ErrorType::NetworkError
            }
            "javascript_error" | "script_error" | "js_error" => ErrorType::JavascriptError,
            "rate_limited" | "too_many_requests" => ErrorType::RateLimited,
            "captcha" | "captcha_detected" | "bot_detected" => ErrorType::CaptchaDetected,
            "permission_denied" | "forbidden" => ErrorType::PermissionDenied,
            "authentication_required" | "auth_required" | "unauthorized" => {
                ErrorType::AuthenticationRequired
            }
            _ => ErrorType::Unknown,
        }
    }

    /// Canonical tag, matching the serialized form
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorType::ElementNotFound => "ELEMENT_NOT_FOUND",
            ErrorType::ElementNotInteractable => "ELEMENT_NOT_INTERACTABLE",
            ErrorType::StaleElement => "STALE_ELEMENT",
            ErrorType::PageLoadTimeout => "PAGE_LOAD_TIMEOUT",
            ErrorType::NavigationFailed => "NAVIGATION_FAILED",
            ErrorType::NetworkError => "NETWORK_ERROR",
            ErrorType::JavascriptError => "JAVASCRIPT_ERROR",
            ErrorType::RateLimited => "RATE_LIMITED",
            ErrorType::CaptchaDetected => "CAPTCHA_DETECTED",
            ErrorType::PermissionDenied => "PERMISSION_DENIED",
            ErrorType::AuthenticationRequired => "AUTHENTICATION_REQUIRED",
            ErrorType::Unknown => "UNKNOWN",
        }
    }

    /// All variants, in declaration order
    pub fn all() -> &'static [ErrorType] {
        &[
            ErrorType::ElementNotFound,
            ErrorType::ElementNotInteractable,
            ErrorType::StaleElement,
            ErrorType::PageLoadTimeout,
            ErrorType::NavigationFailed,
            ErrorType::NetworkError,
            ErrorType::JavascriptError,
            ErrorType::RateLimited,
            ErrorType::CaptchaDetected,
            ErrorType::PermissionDenied,
            ErrorType::AuthenticationRequired,
            ErrorType::Unknown,
        ]
    }
}

impl fmt::Display for ErrorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Severity levels, ordered from least to most severe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Threshold a blended 0-1 score into a level (0.8 / 0.6 / 0.4)
    pub fn from_score(score: f64) -> Severity {
        if score >= 0.8 {
            Severity::Critical
        } else if score >= 0.6 {
            Severity::High
        } else if score >= 0.4 {
            Severity::Medium
        } else {
            Severity::Low
        }
    }

    /// Parse a severity label, case-insensitive
    pub fn parse(label: &str) -> Option<Severity> {
        match label.trim().to_lowercase().as_str() {
            "low" => Some(Severity::Low),
            "medium" => Some(Severity::Medium),
            "high" => Some(Severity::High),
            "critical" => Some(Severity::Critical),
            _ => None,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        };
        f.write_str(label)
    }
}

/// Failure reported by the browser-driving layer. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutomationError {
    pub id: String,

    /// Raw tag as reported, e.g. `element_not_found`
    #[serde(rename = "type")]
    pub error_type: String,

    pub message: String,

    #[serde(default)]
    pub context: HashMap<String, serde_json::Value>,

    pub timestamp: DateTime<Utc>,
}

impl AutomationError {
    /// Create a new error with a fresh id and the current timestamp
    pub fn new(error_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            error_type: error_type.into(),
            message: message.into(),
            context: HashMap::new(),
            timestamp: Utc::now(),
        }
    }

    /// Attach a context value
    pub fn with_context(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.context.insert(key.into(), value);
        self
    }

    /// Closed category of the raw tag
    pub fn kind(&self) -> ErrorType {
        ErrorType::from_raw(&self.error_type)
    }

    /// Cache key: raw type plus the first `prefix_len` characters of the message
    pub fn pattern_key(&self, prefix_len: usize) -> String {
        let prefix: String = self.message.chars().take(prefix_len).collect();
        format!("{}:{}", self.error_type, prefix)
    }
}

/// Snapshot of the failure circumstances stored with a classification
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorContext {
    pub url: String,
    pub objective: String,
    pub target_element: Option<String>,
    pub recent_actions: Vec<String>,
    pub raw_type: String,
    pub message: String,
}

impl ErrorContext {
    /// Number of trailing actions kept in the snapshot
    pub const RECENT_ACTIONS: usize = 5;

    pub fn capture(error: &AutomationError, context: &ActionContext) -> Self {
        let skip = context
            .previous_actions
            .len()
            .saturating_sub(Self::RECENT_ACTIONS);
        Self {
            url: context.current_url.clone(),
            objective: context.objective.clone(),
            target_element: context.target_element.clone(),
            recent_actions: context.previous_actions[skip..].to_vec(),
            raw_type: error.error_type.clone(),
            message: error.message.clone(),
        }
    }
}

/// Where a classification came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassificationSource {
    Cache,
    Oracle,
    RuleTable,
}

/// Structured judgment about an `AutomationError`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorClassification {
    pub error_type: ErrorType,
    pub severity: Severity,
    pub context: ErrorContext,
    pub possible_causes: Vec<String>,
    pub recoverable: bool,

    /// Always within [0, 1]
    pub confidence: f64,

    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,

    pub source: ClassificationSource,
}

impl ErrorClassification {
    /// Build a classification, clamping confidence into [0, 1]
    pub fn new(
        error_type: ErrorType,
        severity: Severity,
        context: ErrorContext,
        confidence: f64,
        source: ClassificationSource,
    ) -> Self {
        Self {
            error_type,
            severity,
            context,
            possible_causes: Vec::new(),
            recoverable: true,
            confidence: clamp_unit(confidence),
            metadata: HashMap::new(),
            source,
        }
    }

    pub fn with_causes(mut self, causes: Vec<String>) -> Self {
        self.possible_causes = causes;
        self
    }

    pub fn with_recoverable(mut self, recoverable: bool) -> Self {
        self.recoverable = recoverable;
        self
    }
}

/// Clamp into [0, 1], mapping NaN to 0
pub fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}
