//! Effectiveness ledger
//!
//! Shared table of learned per-strategy success rates, the context patterns
//! behind the ranking's context adjustment, per-strategy confidence biases
//! and the outcome history behind `get_recovery_stats`.
//!
//! All state sits behind one lock, so each moving-average update is applied
//! atomically per strategy id. Update rule, with learning rate α:
//!
//! ```text
//! success: e ← e + (1 - e)·α
//! failure: e ← e - e·α
//! e ← clamp(e, 0, 1)
//! ```

pub mod learning;
pub mod stats;
pub mod store;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, VecDeque};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::config::LedgerConfig;
use crate::types::{clamp_unit, ActionContext, ErrorType, RecoveryResult};

pub use learning::{extract_factors, AttemptKind, LearningReport};
pub use stats::{OutcomeRecord, RecoveryStats, StrategyRate, UNRECOVERABLE};
pub use store::{InMemoryStore, LedgerStore};

use store::{effectiveness_key, BIASES_KEY, CONTEXTS_KEY, INDEX_KEY};

/// Effectiveness of a strategy never seen before
pub const NEUTRAL_EFFECTIVENESS: f64 = 0.5;

/// Scale applied to a context pattern's deviation from an even success rate
const CONTEXT_ADJUSTMENT_SCALE: f64 = 0.6;

/// One exponential moving-average step
pub fn ema_update(current: f64, success: bool, learning_rate: f64) -> f64 {
    let next = if success {
        current + (1.0 - current) * learning_rate
    } else {
        current - current * learning_rate
    };
    clamp_unit(next)
}

/// Learned effectiveness of one strategy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EffectivenessEntry {
    pub strategy_id: String,

    /// Always within [0, 1]
    pub overall: f64,

    #[serde(default)]
    pub by_error_type: BTreeMap<ErrorType, f64>,

    pub total_executions: u64,
    pub successful_executions: u64,
    pub last_updated: DateTime<Utc>,
}

impl EffectivenessEntry {
    pub fn new(strategy_id: impl Into<String>) -> Self {
        Self {
            strategy_id: strategy_id.into(),
            overall: NEUTRAL_EFFECTIVENESS,
            by_error_type: BTreeMap::new(),
            total_executions: 0,
            successful_executions: 0,
            last_updated: Utc::now(),
        }
    }

    fn apply(&mut self, error_type: Option<ErrorType>, success: bool, learning_rate: f64) {
        self.overall = ema_update(self.overall, success, learning_rate);
        if let Some(error_type) = error_type {
            let value = self
                .by_error_type
                .entry(error_type)
                .or_insert(NEUTRAL_EFFECTIVENESS);
            *value = ema_update(*value, success, learning_rate);
        }
        self.total_executions += 1;
        if success {
            self.successful_executions += 1;
        }
        self.last_updated = Utc::now();
    }

    /// Repair values that escaped [0, 1] in stored data
    fn sanitize(&mut self) {
        self.overall = clamp_unit(self.overall);
        for value in self.by_error_type.values_mut() {
            *value = clamp_unit(*value);
        }
        self.successful_executions = self.successful_executions.min(self.total_executions);
    }
}

/// Observed outcomes of a strategy in one `(host, objective)` context
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextPattern {
    pub strategy_id: String,
    pub host: String,
    pub objective: String,

    /// Applicable conditions of the strategy when it ran here
    #[serde(default)]
    pub conditions: Vec<String>,

    pub attempts: u64,
    pub successes: u64,
    pub last_seen: DateTime<Utc>,
}

/// Ledger-derived inputs to the probability blend
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RankingSignals {
    pub historical: f64,
    pub confidence_bias: f64,
    pub context_adjustment: f64,
}

#[derive(Debug, Default)]
struct LedgerState {
    entries: HashMap<String, EffectivenessEntry>,
    contexts: HashMap<String, ContextPattern>,
    biases: HashMap<String, f64>,
    outcomes: VecDeque<OutcomeRecord>,
}

impl LedgerState {
    fn push_outcome(&mut self, outcome: OutcomeRecord, capacity: usize) {
        if self.outcomes.len() >= capacity.max(1) {
            self.outcomes.pop_front();
        }
        self.outcomes.push_back(outcome);
    }
}

fn context_key(strategy_id: &str, host: &str, objective: &str) -> String {
    format!("{}|{}|{}", strategy_id, host, objective.trim().to_lowercase())
}

/// Concurrency-safe effectiveness ledger
#[derive(Debug)]
pub struct EffectivenessLedger {
    config: LedgerConfig,
    state: RwLock<LedgerState>,
}

impl EffectivenessLedger {
    pub fn new(config: &LedgerConfig) -> Self {
        Self {
            config: config.clone(),
            state: RwLock::new(LedgerState::default()),
        }
    }

    /// Apply one success/failure to a strategy's overall effectiveness
    pub async fn update_strategy_effectiveness(&self, strategy_id: &str, success: bool) -> f64 {
        let mut state = self.state.write().await;
        let entry = state
            .entries
            .entry(strategy_id.to_string())
            .or_insert_with(|| EffectivenessEntry::new(strategy_id));
        entry.apply(None, success, self.config.learning_rate);
        debug!(strategy = %strategy_id, success, effectiveness = entry.overall, "effectiveness updated");
        entry.overall
    }

    /// Learn from the attempt whose outcome the caller receives
    pub async fn learn_from_result(&self, result: &RecoveryResult) -> LearningReport {
        self.learn(result, AttemptKind::Final).await
    }

    /// Learn from a strategy abandoned in favour of its fallback
    pub async fn record_abandoned(&self, result: &RecoveryResult) -> LearningReport {
        self.learn(result, AttemptKind::Abandoned).await
    }

    /// Count a failure that was turned away without running any strategy.
    ///
    /// Only the outcome history changes; effectiveness is untouched.
    pub async fn record_unrecoverable(&self, error_type: ErrorType) {
        let mut state = self.state.write().await;
        state.push_outcome(
            OutcomeRecord {
                strategy_id: UNRECOVERABLE.to_string(),
                error_type,
                success: false,
                cancelled: false,
                kind: AttemptKind::Gated,
                duration_ms: 0,
                timestamp: Utc::now(),
            },
            self.config.history_capacity,
        );
        debug!(%error_type, "recorded unrecoverable failure");
    }

    async fn learn(&self, result: &RecoveryResult, kind: AttemptKind) -> LearningReport {
        let mut report = extract_factors(result, kind);
        let strategy_id = result.strategy.id.as_str();
        let host = result.initial_context.host();
        let key = context_key(strategy_id, &host, &result.initial_context.objective);

        let mut state = self.state.write().await;

        // Cancellation says nothing about the strategy itself
        if !result.cancelled {
            let entry = state
                .entries
                .entry(strategy_id.to_string())
                .or_insert_with(|| EffectivenessEntry::new(strategy_id));
            entry.apply(Some(result.error_type), result.success, self.config.learning_rate);

            let pattern = state.contexts.entry(key).or_insert_with(|| ContextPattern {
                strategy_id: strategy_id.to_string(),
                host,
                objective: result.initial_context.objective.trim().to_lowercase(),
                conditions: Vec::new(),
                attempts: 0,
                successes: 0,
                last_seen: Utc::now(),
            });
            pattern.conditions = result.strategy.applicable_conditions.clone();
            pattern.attempts += 1;
            if result.success {
                pattern.successes += 1;
            }
            pattern.last_seen = Utc::now();
        }

        if report.confidence_adjustment != 0.0 {
            let limit = self.config.max_confidence_bias;
            let bias = state.biases.entry(strategy_id.to_string()).or_insert(0.0);
            *bias = (*bias + report.confidence_adjustment).clamp(-limit, limit);
        }

        state.push_outcome(
            OutcomeRecord {
                strategy_id: strategy_id.to_string(),
                error_type: result.error_type,
                success: result.success,
                cancelled: result.cancelled,
                kind,
                duration_ms: result.duration.as_millis() as u64,
                timestamp: Utc::now(),
            },
            self.config.history_capacity,
        );

        report.effectiveness = state
            .entries
            .get(strategy_id)
            .map(|e| e.overall)
            .unwrap_or(NEUTRAL_EFFECTIVENESS);

        info!(
            strategy = %strategy_id,
            success = result.success,
            kind = ?kind,
            effectiveness = report.effectiveness,
            "learned from recovery attempt"
        );
        report
    }

    /// Overall effectiveness, neutral when unseen
    pub async fn effectiveness(&self, strategy_id: &str) -> f64 {
        self.state
            .read()
            .await
            .entries
            .get(strategy_id)
            .map(|e| e.overall)
            .unwrap_or(NEUTRAL_EFFECTIVENESS)
    }

    pub async fn entry(&self, strategy_id: &str) -> Option<EffectivenessEntry> {
        self.state.read().await.entries.get(strategy_id).cloned()
    }

    /// Historical effectiveness, confidence bias and context adjustment in
    /// one read
    pub async fn ranking_signals(
        &self,
        strategy_id: &str,
        error_type: ErrorType,
        context: &ActionContext,
    ) -> RankingSignals {
        let state = self.state.read().await;

        let historical = state
            .entries
            .get(strategy_id)
            .map(|e| e.by_error_type.get(&error_type).copied().unwrap_or(e.overall))
            .unwrap_or(NEUTRAL_EFFECTIVENESS);

        let confidence_bias = state.biases.get(strategy_id).copied().unwrap_or(0.0);

        let key = context_key(strategy_id, &context.host(), &context.objective);
        let context_adjustment = state
            .contexts
            .get(&key)
            .filter(|p| p.attempts > 0)
            .map(|p| {
                let rate = p.successes as f64 / p.attempts as f64;
                (rate - 0.5) * CONTEXT_ADJUSTMENT_SCALE
            })
            .unwrap_or(0.0);

        RankingSignals {
            historical,
            confidence_bias,
            context_adjustment,
        }
    }

    /// Statistics over the configured window; never mutates
    pub async fn get_recovery_stats(&self) -> RecoveryStats {
        let state = self.state.read().await;
        stats::project(state.outcomes.iter(), Utc::now(), self.config.stats_window_days)
    }

    /// Number of strategies with an entry
    pub async fn len(&self) -> usize {
        self.state.read().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.read().await.entries.is_empty()
    }

    /// Drop entries and context patterns not updated within `max_age`
    pub async fn prune_idle(&self, max_age: chrono::Duration) -> usize {
        let cutoff = Utc::now() - max_age;
        let mut state = self.state.write().await;

        let before = state.entries.len();
        state.entries.retain(|_, e| e.last_updated >= cutoff);
        let removed = before - state.entries.len();

        let LedgerState {
            entries,
            contexts,
            biases,
            ..
        } = &mut *state;
        contexts.retain(|_, p| p.last_seen >= cutoff);
        biases.retain(|id, _| entries.contains_key(id));

        if removed > 0 {
            info!(removed, "pruned idle ledger entries");
        }
        removed
    }

    /// Write every entry plus the bias and context tables to `store`.
    ///
    /// Returns the number of entries written; storage failures are logged.
    pub async fn persist(&self, store: &dyn LedgerStore) -> usize {
        let (entries, biases, contexts) = {
            let state = self.state.read().await;
            (
                state.entries.values().cloned().collect::<Vec<_>>(),
                state.biases.clone(),
                state.contexts.values().cloned().collect::<Vec<_>>(),
            )
        };

        let mut written = 0;
        let mut ids = Vec::with_capacity(entries.len());
        for entry in &entries {
            match put(store, &effectiveness_key(&entry.strategy_id), entry).await {
                Ok(()) => {
                    written += 1;
                    ids.push(entry.strategy_id.clone());
                }
                Err(e) => warn!(strategy = %entry.strategy_id, error = %e, "failed to persist entry"),
            }
        }

        for (key, result) in [
            (INDEX_KEY, put(store, INDEX_KEY, &ids).await),
            (BIASES_KEY, put(store, BIASES_KEY, &biases).await),
            (CONTEXTS_KEY, put(store, CONTEXTS_KEY, &contexts).await),
        ] {
            if let Err(e) = result {
                warn!(key, error = %e, "failed to persist ledger table");
            }
        }

        debug!(written, "ledger persisted");
        written
    }

    /// Restore state previously written by `persist`.
    ///
    /// Missing or corrupt keys are skipped; returns the number of entries
    /// restored.
    pub async fn hydrate(&self, store: &dyn LedgerStore) -> usize {
        let ids: Vec<String> = fetch(store, INDEX_KEY).await.unwrap_or_default();

        let mut entries = Vec::with_capacity(ids.len());
        for id in &ids {
            if let Some(mut entry) =
                fetch::<EffectivenessEntry>(store, &effectiveness_key(id)).await
            {
                entry.sanitize();
                entries.push(entry);
            }
        }
        let biases: HashMap<String, f64> = fetch(store, BIASES_KEY).await.unwrap_or_default();
        let contexts: Vec<ContextPattern> =
            fetch(store, CONTEXTS_KEY).await.unwrap_or_default();

        let limit = self.config.max_confidence_bias;
        let restored = entries.len();
        let mut state = self.state.write().await;
        for entry in entries {
            state.entries.insert(entry.strategy_id.clone(), entry);
        }
        for (id, bias) in biases {
            if bias.is_finite() {
                state.biases.insert(id, bias.clamp(-limit, limit));
            }
        }
        for pattern in contexts {
            let key = context_key(&pattern.strategy_id, &pattern.host, &pattern.objective);
            state.contexts.insert(key, pattern);
        }

        info!(restored, "ledger hydrated");
        restored
    }
}

impl Default for EffectivenessLedger {
    fn default() -> Self {
        Self::new(&LedgerConfig::default())
    }
}

async fn put<T: Serialize>(store: &dyn LedgerStore, key: &str, value: &T) -> crate::errors::Result<()> {
    store.set(key, serde_json::to_value(value)?).await
}

async fn fetch<T: serde::de::DeserializeOwned>(store: &dyn LedgerStore, key: &str) -> Option<T> {
    match store.get(key).await {
        Ok(Some(value)) => match serde_json::from_value(value) {
            Ok(parsed) => Some(parsed),
            Err(e) => {
                warn!(key, error = %e, "corrupt ledger value ignored");
                None
            }
        },
        Ok(None) => None,
        Err(e) => {
            warn!(key, error = %e, "ledger storage read failed");
            None
        }
    }
}
