//! Type definitions module
//!
//! Data model shared by the classifier, strategy generator, orchestrator
//! and effectiveness ledger.

pub mod context;
pub mod failure;
pub mod strategy;

// Re-export commonly used types
pub use context::ActionContext;
pub use failure::{
    clamp_unit, AutomationError, ClassificationSource, ErrorClassification, ErrorContext,
    ErrorType, Severity,
};
pub use strategy::{
    clamp_probability, RecoveryActionType, RecoveryResult, RecoveryStep, RecoveryStrategy,
    SpecializedResult, MAX_SUCCESS_PROBABILITY, MIN_SUCCESS_PROBABILITY, WAIT_TIMEOUT_HEADROOM,
};
