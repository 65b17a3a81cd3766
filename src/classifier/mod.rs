//! Error classifier
//!
//! Turns an `AutomationError` plus its `ActionContext` into an
//! `ErrorClassification`. Lookup order: pattern cache, reasoning oracle,
//! rule table. `classify` never fails.

pub mod rules;
pub mod severity;
pub mod trends;

use chrono::Utc;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::config::{ClassifierConfig, Config, OracleConfig};
use crate::memory::{ErrorHistory, ErrorRecord, PatternCache};
use crate::oracle::{
    prompts, request, ClassificationReply, CompletionOptions, ReasoningOracle, RecoverabilityReply,
};
use crate::telemetry::{RecoveryTelemetry, TelemetryEvent};
use crate::types::{
    ActionContext, AutomationError, ClassificationSource, ErrorClassification, ErrorContext,
};

pub use rules::{is_unrecoverable, rule_classification};
pub use severity::{analyze_severity, SeverityAssessment, SeverityFactors};
pub use trends::{detect_error_patterns, ErrorPattern, PatternReport, RiskLevel, Trend, TrendSettings};

/// Classifier with its cache and failure history
pub struct ErrorClassifier {
    oracle: Arc<dyn ReasoningOracle>,
    oracle_config: OracleConfig,
    config: ClassifierConfig,
    cache: RwLock<PatternCache>,
    history: RwLock<ErrorHistory>,
    telemetry: RecoveryTelemetry,
}

impl ErrorClassifier {
    pub fn new(oracle: Arc<dyn ReasoningOracle>, config: &Config) -> Self {
        Self {
            oracle,
            oracle_config: config.oracle.clone(),
            config: config.classifier.clone(),
            cache: RwLock::new(PatternCache::bounded(
                config.classifier.cache_entries_per_key,
                config.classifier.cache_max_keys,
            )),
            history: RwLock::new(ErrorHistory::with_capacity(config.classifier.history_capacity)),
            telemetry: RecoveryTelemetry::new(),
        }
    }

    pub fn with_telemetry(mut self, telemetry: RecoveryTelemetry) -> Self {
        self.telemetry = telemetry;
        self
    }

    /// Classify a failure, degrading to the rule table when the oracle fails
    pub async fn classify(
        &self,
        error: &AutomationError,
        context: &ActionContext,
    ) -> ErrorClassification {
        self.history.write().await.record(ErrorRecord {
            error_type: error.kind(),
            signature: context.signature(),
            timestamp: error.timestamp,
        });

        let key = error.pattern_key(self.config.message_prefix_len);

        if let Some(cached) = self.cache.read().await.latest(&key) {
            debug!(key = %key, "classification cache hit");
            self.telemetry.record(TelemetryEvent::Classified {
                source: ClassificationSource::Cache,
            });
            return ErrorClassification {
                source: ClassificationSource::Cache,
                ..cached.clone()
            };
        }

        let snapshot = ErrorContext::capture(error, context);
        let classification = match self.ask_oracle(error, context, snapshot.clone()).await {
            Ok(classification) => classification,
            Err(e) => {
                warn!(error = %e, raw_type = %error.error_type, "oracle classification failed, using rule table");
                rule_classification(&error.error_type, snapshot)
            }
        };

        self.telemetry.record(TelemetryEvent::Classified {
            source: classification.source,
        });
        self.cache.write().await.insert(key, classification.clone());
        classification
    }

    async fn ask_oracle(
        &self,
        error: &AutomationError,
        context: &ActionContext,
        snapshot: ErrorContext,
    ) -> crate::errors::Result<ErrorClassification> {
        let prompt = prompts::classification_prompt(error, context);
        let reply = request::<ClassificationReply>(
            self.oracle.as_ref(),
            &prompt,
            CompletionOptions {
                temperature: self.oracle_config.classification_temperature,
                max_tokens: self.oracle_config.max_tokens,
            },
            self.oracle_config.timeout(),
        )
        .await?;

        let mut classification = ErrorClassification::new(
            reply.error_type,
            reply.severity,
            snapshot,
            reply.confidence,
            ClassificationSource::Oracle,
        )
        .with_causes(reply.possible_causes)
        .with_recoverable(reply.recoverable && !is_unrecoverable(reply.error_type));
        classification.metadata = reply.metadata;
        Ok(classification)
    }

    /// Recompute severity from the five-factor blend
    pub async fn analyze_severity(&self, classification: &ErrorClassification) -> SeverityAssessment {
        let window = chrono::Duration::hours(self.config.trend_window_hours);
        let occurrences = self
            .history
            .read()
            .await
            .count_since(classification.error_type, Utc::now() - window);
        analyze_severity(severity::factors_for(classification, occurrences))
    }

    /// Patterns, trends and risk over the configured window
    pub async fn detect_error_patterns(&self) -> PatternReport {
        let settings = TrendSettings {
            window: chrono::Duration::hours(self.config.trend_window_hours),
            min_occurrences: self.config.pattern_min_occurrences,
            threshold: self.config.trend_threshold,
        };
        let history = self.history.read().await;
        detect_error_patterns(&history, Utc::now(), settings)
    }

    /// Deny-listed types are never recoverable; otherwise the oracle decides
    /// when confident enough, and the answer defaults to recoverable.
    pub async fn is_recoverable(&self, classification: &ErrorClassification) -> bool {
        if is_unrecoverable(classification.error_type) {
            debug!(error_type = %classification.error_type, "deny-listed, not recoverable");
            return false;
        }

        let prompt = prompts::recoverability_prompt(classification);
        let judgment = request::<RecoverabilityReply>(
            self.oracle.as_ref(),
            &prompt,
            CompletionOptions {
                temperature: self.oracle_config.classification_temperature,
                max_tokens: 100,
            },
            self.oracle_config.timeout(),
        )
        .await;

        match judgment {
            Ok(j) if j.confidence > self.config.recoverability_confidence => j.recoverable,
            Ok(j) => {
                debug!(confidence = j.confidence, "recoverability judgment below threshold");
                true
            }
            Err(e) => {
                debug!(error = %e, "recoverability oracle failed, assuming recoverable");
                true
            }
        }
    }

    /// Number of distinct cached pattern keys
    pub async fn cached_patterns(&self) -> usize {
        self.cache.read().await.len()
    }

    /// Number of failures in the history
    pub async fn observed_failures(&self) -> usize {
        self.history.read().await.len()
    }
}
