//! Recovery strategy generation
//!
//! Candidates come from two sources: oracle proposals and deterministic
//! templates. Each candidate's success probability is re-estimated as a blend
//! of ledger history, a narrow oracle estimate and a context adjustment, then
//! the list is ranked, truncated and given fallback chains.

pub mod fallback;
pub mod templates;

use futures_util::future::join_all;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::{Config, OracleConfig, StrategyConfig};
use crate::ledger::{EffectivenessLedger, RankingSignals};
use crate::oracle::{
    prompts, request, CompletionOptions, ProbabilityReply, ReasoningOracle, StrategyProposalReply,
};
use crate::telemetry::{RecoveryTelemetry, TelemetryEvent};
use crate::types::{ActionContext, ErrorClassification, RecoveryStrategy};

pub use fallback::build_chain;
pub use templates::{fallback_ladder, generic_retry, template_by_id, templates_for};

/// Range accepted from the narrow probability estimate
const ESTIMATE_RANGE: (f64, f64) = (0.1, 0.9);

/// Blend ledger signals with an oracle estimate into a strategy probability.
///
/// `historical_weight * historical + oracle_weight * (estimate + bias)`, plus
/// the context adjustment bounded by `context_adjustment_limit`, clamped to
/// `[min_probability, max_probability]`.
pub fn blend_probability(signals: RankingSignals, estimate: f64, config: &StrategyConfig) -> f64 {
    let biased = (estimate + signals.confidence_bias).clamp(ESTIMATE_RANGE.0, ESTIMATE_RANGE.1);
    let limit = config.context_adjustment_limit.abs();
    let adjustment = signals.context_adjustment.clamp(-limit, limit);

    let blended = config.historical_weight * signals.historical
        + config.oracle_weight * biased
        + adjustment;

    if blended.is_nan() {
        return config.min_probability;
    }
    blended.clamp(config.min_probability, config.max_probability)
}

/// Ranked strategy generator backed by the shared ledger
pub struct StrategyGenerator {
    oracle: Arc<dyn ReasoningOracle>,
    ledger: Arc<EffectivenessLedger>,
    oracle_config: OracleConfig,
    config: StrategyConfig,
    telemetry: RecoveryTelemetry,
}

impl StrategyGenerator {
    pub fn new(
        oracle: Arc<dyn ReasoningOracle>,
        ledger: Arc<EffectivenessLedger>,
        config: &Config,
    ) -> Self {
        Self {
            oracle,
            ledger,
            oracle_config: config.oracle.clone(),
            config: config.strategy.clone(),
            telemetry: RecoveryTelemetry::new(),
        }
    }

    pub fn with_telemetry(mut self, telemetry: RecoveryTelemetry) -> Self {
        self.telemetry = telemetry;
        self
    }

    /// Ranked strategies for a classification; never empty
    pub async fn generate(
        &self,
        classification: &ErrorClassification,
        context: &ActionContext,
    ) -> Vec<RecoveryStrategy> {
        let proposals = self.propose(classification, context).await;
        let from_oracle = proposals.len();

        let mut seen = HashSet::new();
        let mut candidates: Vec<RecoveryStrategy> = proposals
            .into_iter()
            .chain(templates_for(classification.error_type))
            .filter(|s| seen.insert(s.id.clone()))
            .collect();

        let estimates = join_all(
            candidates
                .iter()
                .map(|s| self.estimate(s, classification, context)),
        )
        .await;

        for (strategy, estimate) in candidates.iter_mut().zip(estimates) {
            let signals = self
                .ledger
                .ranking_signals(&strategy.id, classification.error_type, context)
                .await;
            let probability = blend_probability(signals, estimate, &self.config);
            debug!(
                strategy = %strategy.id,
                historical = signals.historical,
                estimate,
                probability,
                "blended strategy probability"
            );
            strategy.set_probability(probability);
        }

        rank(&mut candidates);
        candidates.truncate(self.config.max_strategies);

        let ladder = fallback_ladder(classification.error_type);
        let mut ranked: Vec<RecoveryStrategy> = candidates
            .into_iter()
            .map(|s| build_chain(s, &ladder, self.config.max_fallback_depth))
            .collect();

        if ranked.is_empty() {
            warn!(error_type = %classification.error_type, "no strategies generated, using generic retry");
            ranked.push(generic_retry());
        }

        self.telemetry.record(TelemetryEvent::StrategiesGenerated {
            count: ranked.len(),
            from_oracle,
        });
        info!(
            error_type = %classification.error_type,
            count = ranked.len(),
            top = %ranked[0].id,
            "generated recovery strategies"
        );
        ranked
    }

    async fn propose(
        &self,
        classification: &ErrorClassification,
        context: &ActionContext,
    ) -> Vec<RecoveryStrategy> {
        let prompt = prompts::strategy_prompt(classification, context);
        let reply = request::<StrategyProposalReply>(
            self.oracle.as_ref(),
            &prompt,
            CompletionOptions {
                temperature: self.oracle_config.strategy_temperature,
                max_tokens: self.oracle_config.max_tokens,
            },
            self.oracle_config.timeout(),
        )
        .await;

        match reply {
            Ok(strategies) => strategies,
            Err(e) => {
                debug!(error = %e, "no oracle strategy proposals");
                Vec::new()
            }
        }
    }

    async fn estimate(
        &self,
        strategy: &RecoveryStrategy,
        classification: &ErrorClassification,
        context: &ActionContext,
    ) -> f64 {
        let prompt = prompts::probability_prompt(strategy, classification, context);
        let reply = request::<ProbabilityReply>(
            self.oracle.as_ref(),
            &prompt,
            CompletionOptions {
                temperature: self.oracle_config.classification_temperature,
                max_tokens: 50,
            },
            self.oracle_config.timeout(),
        )
        .await;

        match reply {
            Ok(probability) => probability,
            Err(e) => {
                debug!(strategy = %strategy.id, error = %e, "probability estimate failed");
                self.config.default_estimate
            }
        }
    }
}

/// Priority descending, then probability descending
fn rank(strategies: &mut [RecoveryStrategy]) {
    strategies.sort_by(|a, b| {
        b.priority.cmp(&a.priority).then(
            b.success_probability
                .partial_cmp(&a.success_probability)
                .unwrap_or(std::cmp::Ordering::Equal),
        )
    });
}
