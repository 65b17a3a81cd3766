//! Severity blend over five factors
//!
//! ```text
//! score = 0.25·criticality + 0.25·user_impact + 0.20·system_impact
//!       + 0.15·(1 - recoverability) + 0.15·frequency
//! ```
//!
//! Every factor lies in [0, 1], so the score does too. The score is then
//! thresholded at 0.8 / 0.6 / 0.4.

use serde::{Deserialize, Serialize};

use crate::types::{clamp_unit, ErrorClassification, ErrorType, Severity};

const CRITICALITY_WEIGHT: f64 = 0.25;
const USER_IMPACT_WEIGHT: f64 = 0.25;
const SYSTEM_IMPACT_WEIGHT: f64 = 0.20;
const RECOVERABILITY_WEIGHT: f64 = 0.15;
const FREQUENCY_WEIGHT: f64 = 0.15;

/// Occurrences in the trend window that saturate the frequency factor
pub const FREQUENCY_SATURATION: usize = 10;

const PAYMENT_KEYWORDS: &[&str] = &["payment", "pay ", "checkout", "purchase", "billing"];
const SUBMIT_KEYWORDS: &[&str] = &["submit", "order", "confirm", "sign up", "register"];

/// Types whose failure affects the whole session rather than one element
const HIGH_IMPACT_TYPES: &[ErrorType] = &[
    ErrorType::NetworkError,
    ErrorType::NavigationFailed,
    ErrorType::PageLoadTimeout,
    ErrorType::CaptchaDetected,
    ErrorType::AuthenticationRequired,
    ErrorType::PermissionDenied,
];

/// The five inputs of the blend, each in [0, 1]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeverityFactors {
    pub context_criticality: f64,
    pub user_impact: f64,
    pub system_impact: f64,
    pub inverse_recoverability: f64,
    pub historical_frequency: f64,
}

impl SeverityFactors {
    /// Weighted sum, clamped into [0, 1]
    pub fn score(&self) -> f64 {
        clamp_unit(
            CRITICALITY_WEIGHT * clamp_unit(self.context_criticality)
                + USER_IMPACT_WEIGHT * clamp_unit(self.user_impact)
                + SYSTEM_IMPACT_WEIGHT * clamp_unit(self.system_impact)
                + RECOVERABILITY_WEIGHT * clamp_unit(self.inverse_recoverability)
                + FREQUENCY_WEIGHT * clamp_unit(self.historical_frequency),
        )
    }

    pub fn severity(&self) -> Severity {
        Severity::from_score(self.score())
    }
}

/// Result of `analyze_severity`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeverityAssessment {
    pub factors: SeverityFactors,
    pub score: f64,
    pub severity: Severity,
}

/// Criticality of the objective: payment flows score highest
pub fn context_criticality(objective: &str) -> f64 {
    let objective = format!("{} ", objective.to_lowercase());
    if PAYMENT_KEYWORDS.iter().any(|k| objective.contains(k)) {
        1.0
    } else if SUBMIT_KEYWORDS.iter().any(|k| objective.contains(k)) {
        0.7
    } else {
        0.3
    }
}

/// Per-type weight of the impact on the person running the automation
pub fn user_impact(error_type: ErrorType) -> f64 {
    match error_type {
        ErrorType::PermissionDenied | ErrorType::AuthenticationRequired => 0.9,
        ErrorType::NetworkError | ErrorType::CaptchaDetected => 0.8,
        ErrorType::NavigationFailed => 0.7,
        ErrorType::PageLoadTimeout | ErrorType::RateLimited => 0.6,
        ErrorType::ElementNotFound | ErrorType::ElementNotInteractable | ErrorType::Unknown => 0.5,
        ErrorType::JavascriptError => 0.4,
        ErrorType::StaleElement => 0.3,
    }
}

pub fn system_impact(error_type: ErrorType) -> f64 {
    if HIGH_IMPACT_TYPES.contains(&error_type) {
        1.0
    } else {
        0.3
    }
}

/// `min(occurrences / 10, 1)`
pub fn frequency_factor(occurrences: usize) -> f64 {
    (occurrences as f64 / FREQUENCY_SATURATION as f64).min(1.0)
}

/// Derive the five factors from a classification and its recent frequency
pub fn factors_for(classification: &ErrorClassification, occurrences: usize) -> SeverityFactors {
    SeverityFactors {
        context_criticality: context_criticality(&classification.context.objective),
        user_impact: user_impact(classification.error_type),
        system_impact: system_impact(classification.error_type),
        inverse_recoverability: if classification.recoverable {
            1.0 - classification.confidence
        } else {
            1.0
        },
        historical_frequency: frequency_factor(occurrences),
    }
}

/// Blend the factors into an assessment
pub fn analyze_severity(factors: SeverityFactors) -> SeverityAssessment {
    SeverityAssessment {
        factors,
        score: factors.score(),
        severity: factors.severity(),
    }
}
