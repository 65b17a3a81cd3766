//! Caller-facing recovery service
//!
//! One `RecoveryService` is constructed per process and shared (usually in
//! an `Arc`) by every automation task. It owns the classifier, generator,
//! orchestrator and ledger, and none of its operations return an error for
//! an expected failure.

use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::browser::BrowserDriver;
use crate::classifier::{ErrorClassifier, PatternReport, SeverityAssessment};
use crate::config::{Config, OracleConfig};
use crate::events::EventBus;
use crate::ledger::{EffectivenessLedger, RecoveryStats};
use crate::oracle::{OllamaOracle, ReasoningOracle, UnavailableOracle};
use crate::recovery::RecoveryOrchestrator;
use crate::specialized;
use crate::strategy::{generic_retry, StrategyGenerator};
use crate::telemetry::{RecoveryTelemetry, TelemetryEvent};
use crate::types::{
    ActionContext, AutomationError, ErrorClassification, ErrorType, RecoveryResult,
    RecoveryStrategy, SpecializedResult,
};

/// Oracle described by the config, or the unavailable oracle when it is
/// disabled or its client cannot be built
pub fn oracle_from_config(config: &OracleConfig) -> Arc<dyn ReasoningOracle> {
    if !config.enabled {
        return Arc::new(UnavailableOracle);
    }
    match OllamaOracle::from_config(config) {
        Ok(oracle) => Arc::new(oracle),
        Err(e) => {
            warn!(error = %e, "could not build oracle client, running on rules only");
            Arc::new(UnavailableOracle)
        }
    }
}

pub struct RecoveryService {
    classifier: ErrorClassifier,
    generator: StrategyGenerator,
    orchestrator: RecoveryOrchestrator,
    driver: Arc<dyn BrowserDriver>,
    ledger: Arc<EffectivenessLedger>,
    telemetry: RecoveryTelemetry,
    shutdown: CancellationToken,
    config: Config,
}

impl RecoveryService {
    pub fn new(
        oracle: Arc<dyn ReasoningOracle>,
        driver: Arc<dyn BrowserDriver>,
        config: Config,
    ) -> Self {
        let telemetry = RecoveryTelemetry::new();
        let ledger = Arc::new(EffectivenessLedger::new(&config.ledger));

        let classifier =
            ErrorClassifier::new(oracle.clone(), &config).with_telemetry(telemetry.clone());
        let generator = StrategyGenerator::new(oracle, ledger.clone(), &config)
            .with_telemetry(telemetry.clone());
        let orchestrator = RecoveryOrchestrator::new(driver.clone(), ledger.clone(), &config)
            .with_telemetry(telemetry.clone());

        Self {
            classifier,
            generator,
            orchestrator,
            driver,
            ledger,
            telemetry,
            shutdown: CancellationToken::new(),
            config,
        }
    }

    /// Service whose oracle is built from `config.oracle`
    pub fn from_config(driver: Arc<dyn BrowserDriver>, config: Config) -> Self {
        let oracle = oracle_from_config(&config.oracle);
        Self::new(oracle, driver, config)
    }

    /// Publish orchestration events on `bus`
    pub fn with_event_bus(mut self, bus: EventBus) -> Self {
        self.orchestrator = self.orchestrator.with_event_bus(bus);
        self
    }

    pub async fn classify_error(
        &self,
        error: &AutomationError,
        context: &ActionContext,
    ) -> ErrorClassification {
        self.classifier.classify(error, context).await
    }

    pub async fn analyze_severity(&self, classification: &ErrorClassification) -> SeverityAssessment {
        self.classifier.analyze_severity(classification).await
    }

    pub async fn detect_error_patterns(&self) -> PatternReport {
        self.classifier.detect_error_patterns().await
    }

    pub async fn generate_recovery_strategies(
        &self,
        classification: &ErrorClassification,
        context: &ActionContext,
    ) -> Vec<RecoveryStrategy> {
        self.generator.generate(classification, context).await
    }

    /// Execute a strategy and its fallback chain; `stop_automation` ends it
    /// between steps
    pub async fn execute_recovery_strategy(
        &self,
        strategy: &RecoveryStrategy,
        error_type: ErrorType,
        context: &ActionContext,
    ) -> RecoveryResult {
        let token = self.cancellation_token();
        self.orchestrator
            .execute(strategy, error_type, context, &token)
            .await
    }

    /// Execute under a caller-supplied token. Tokens obtained from
    /// `cancellation_token` are also reached by `stop_automation`.
    pub async fn execute_recovery_strategy_with_cancel(
        &self,
        strategy: &RecoveryStrategy,
        error_type: ErrorType,
        context: &ActionContext,
        cancel: &CancellationToken,
    ) -> RecoveryResult {
        self.orchestrator
            .execute(strategy, error_type, context, cancel)
            .await
    }

    pub async fn handle_captcha(
        &self,
        error: &AutomationError,
        context: &ActionContext,
    ) -> SpecializedResult {
        let token = self.cancellation_token();
        specialized::handle_captcha(self.driver.as_ref(), error, context, &token).await
    }

    pub async fn manage_timeout(
        &self,
        error: &AutomationError,
        context: &ActionContext,
    ) -> SpecializedResult {
        let token = self.cancellation_token();
        specialized::manage_timeout(self.driver.as_ref(), error, context, &token).await
    }

    pub async fn is_recoverable(&self, classification: &ErrorClassification) -> bool {
        self.classifier.is_recoverable(classification).await
    }

    pub async fn get_recovery_stats(&self) -> RecoveryStats {
        self.ledger.get_recovery_stats().await
    }

    /// Classify, gate, generate and execute the top-ranked strategy
    pub async fn recover(&self, error: &AutomationError, context: &ActionContext) -> RecoveryResult {
        let classification = self.classify_error(error, context).await;

        if !self.is_recoverable(&classification).await {
            info!(error_type = %classification.error_type, "failure is not recoverable");
            self.telemetry.record(TelemetryEvent::RecoveryCompleted {
                success: false,
                duration_ms: 0,
            });
            self.ledger.record_unrecoverable(classification.error_type).await;
            return unrecoverable_result(error, &classification, context);
        }

        let strategies = self.generate_recovery_strategies(&classification, context).await;
        let top = strategies.into_iter().next().unwrap_or_else(generic_retry);
        self.execute_recovery_strategy(&top, classification.error_type, context)
            .await
    }

    /// Token that `stop_automation` cancels
    pub fn cancellation_token(&self) -> CancellationToken {
        self.shutdown.child_token()
    }

    /// Stop every in-flight and future execution between steps
    pub fn stop_automation(&self) {
        info!("stop requested, cancelling in-flight recoveries");
        self.shutdown.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    pub fn ledger(&self) -> Arc<EffectivenessLedger> {
        self.ledger.clone()
    }

    pub fn telemetry(&self) -> &RecoveryTelemetry {
        &self.telemetry
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}

fn unrecoverable_result(
    error: &AutomationError,
    classification: &ErrorClassification,
    context: &ActionContext,
) -> RecoveryResult {
    RecoveryResult {
        success: false,
        strategy: generic_retry(),
        completed_steps: Vec::new(),
        duration: std::time::Duration::ZERO,
        new_context: None,
        error: Some(error.clone()),
        learnings: vec![format!("{} is not recoverable", classification.error_type)],
        error_type: classification.error_type,
        initial_context: context.clone(),
        cancelled: false,
        strategies_attempted: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::NoopDriver;

    fn offline_service() -> RecoveryService {
        let mut config = Config::default();
        config.oracle.enabled = false;
        RecoveryService::from_config(Arc::new(NoopDriver), config)
    }

    #[tokio::test]
    async fn test_recover_offline_succeeds_with_noop_driver() {
        let service = offline_service();
        let error = AutomationError::new("element_not_found", "Target element not found: button.submit");
        let result = service.recover(&error, &ActionContext::default()).await;

        assert!(result.success);
        assert_eq!(result.strategies_attempted, vec!["wait_and_retry".to_string()]);
        let stats = service.get_recovery_stats().await;
        assert_eq!(stats.total_errors, 1);
        assert_eq!(stats.successful_recoveries, 1);
    }

    #[tokio::test]
    async fn test_unrecoverable_skips_execution() {
        let service = offline_service();
        let error = AutomationError::new("permission_denied", "403 Forbidden");
        let result = service.recover(&error, &ActionContext::default()).await;

        assert!(!result.success);
        assert!(result.strategies_attempted.is_empty());
        assert_eq!(result.error.unwrap().id, error.id);
        assert!(service.ledger().is_empty().await);

        let stats = service.get_recovery_stats().await;
        assert_eq!(stats.total_errors, 1);
        assert_eq!(stats.unrecoverable_errors, 1);
        assert_eq!(stats.successful_recoveries, 0);
        assert!(stats.top_strategies.is_empty());
    }

    #[tokio::test]
    async fn test_stop_automation_cancels_executions() {
        let service = offline_service();
        let token = service.cancellation_token();
        service.stop_automation();
        assert!(token.is_cancelled());
        assert!(service.is_stopped());

        let result = service
            .execute_recovery_strategy(
                &generic_retry(),
                ErrorType::Unknown,
                &ActionContext::default(),
            )
            .await;
        assert!(result.cancelled);
        assert!(result.completed_steps.is_empty());
        assert!(result.error.is_none());
    }

    #[tokio::test]
    async fn test_stop_automation_reaches_specialized_flows() {
        let service = offline_service();
        service.stop_automation();

        let captcha = AutomationError::new("bot_detected", "verification required");
        let result = service.handle_captcha(&captcha, &ActionContext::default()).await;
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("Recovery cancelled"));

        let timeout = AutomationError::new("page_load_timeout", "Navigation timeout exceeded");
        let result = service.manage_timeout(&timeout, &ActionContext::default()).await;
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("Recovery cancelled"));
    }
}
