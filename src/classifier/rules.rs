//! Deterministic classification rule table
//!
//! Guaranteed fallback when the oracle is unreachable or its reply fails
//! validation. Mapped types carry confidence 0.5, unmapped ones 0.3.

use crate::types::{
    ClassificationSource, ErrorClassification, ErrorContext, ErrorType, Severity,
};

/// Confidence of a rule-table classification for a known type
pub const RULE_CONFIDENCE: f64 = 0.5;

/// Confidence when the raw type maps to nothing
pub const UNMAPPED_CONFIDENCE: f64 = 0.3;

/// Types no automated step can recover from
pub const UNRECOVERABLE_TYPES: &[ErrorType] =
    &[ErrorType::PermissionDenied, ErrorType::AuthenticationRequired];

/// Severity assigned by the rule table
pub fn rule_severity(error_type: ErrorType) -> Severity {
    match error_type {
        ErrorType::ElementNotFound
        | ErrorType::ElementNotInteractable
        | ErrorType::PageLoadTimeout
        | ErrorType::JavascriptError
        | ErrorType::RateLimited => Severity::Medium,
        ErrorType::NetworkError
        | ErrorType::NavigationFailed
        | ErrorType::CaptchaDetected
        | ErrorType::AuthenticationRequired => Severity::High,
        ErrorType::PermissionDenied => Severity::Critical,
        ErrorType::StaleElement | ErrorType::Unknown => Severity::Low,
    }
}

fn rule_causes(error_type: ErrorType) -> &'static [&'static str] {
    match error_type {
        ErrorType::ElementNotFound => &[
            "element not rendered yet",
            "selector changed",
            "element outside the viewport",
        ],
        ErrorType::ElementNotInteractable => &[
            "element covered by an overlay",
            "element disabled",
        ],
        ErrorType::StaleElement => &["page re-rendered after lookup"],
        ErrorType::PageLoadTimeout => &["slow server response", "heavy page resources"],
        ErrorType::NavigationFailed => &["invalid URL", "redirect loop"],
        ErrorType::NetworkError => &["connection dropped", "DNS resolution failed"],
        ErrorType::JavascriptError => &["page script exception"],
        ErrorType::RateLimited => &["too many requests in a short period"],
        ErrorType::CaptchaDetected => &["bot detection challenge"],
        ErrorType::PermissionDenied => &["account lacks access"],
        ErrorType::AuthenticationRequired => &["session expired", "login required"],
        ErrorType::Unknown => &[],
    }
}

pub fn is_unrecoverable(error_type: ErrorType) -> bool {
    UNRECOVERABLE_TYPES.contains(&error_type)
}

/// Classify from the raw type tag alone
pub fn rule_classification(raw_type: &str, context: ErrorContext) -> ErrorClassification {
    let error_type = ErrorType::from_raw(raw_type);
    let confidence = if error_type == ErrorType::Unknown {
        UNMAPPED_CONFIDENCE
    } else {
        RULE_CONFIDENCE
    };

    ErrorClassification::new(
        error_type,
        rule_severity(error_type),
        context,
        confidence,
        ClassificationSource::RuleTable,
    )
    .with_causes(rule_causes(error_type).iter().map(|c| c.to_string()).collect())
    .with_recoverable(!is_unrecoverable(error_type))
}
