//! Read-only statistics projection over the outcome history

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::ledger::learning::AttemptKind;
use crate::types::ErrorType;

/// Entries kept in each top-N list
pub const TOP_N: usize = 5;

/// Strategy id recorded for failures no strategy was run for
pub const UNRECOVERABLE: &str = "unrecoverable";

/// One recorded attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutcomeRecord {
    pub strategy_id: String,
    pub error_type: ErrorType,
    pub success: bool,
    pub cancelled: bool,
    pub kind: AttemptKind,
    pub duration_ms: u64,
    pub timestamp: DateTime<Utc>,
}

/// Per-strategy rate inside the window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyRate {
    pub strategy_id: String,
    pub attempts: usize,
    pub successes: usize,
    pub success_rate: f64,
}

/// Aggregate statistics over a rolling window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryStats {
    pub window_days: i64,

    /// Failures seen, including those judged unrecoverable
    pub total_errors: usize,
    /// Failures turned away before any strategy ran
    pub unrecoverable_errors: usize,
    pub successful_recoveries: usize,
    pub cancelled_recoveries: usize,
    pub success_rate: f64,

    /// Most frequent first
    pub top_error_types: Vec<(ErrorType, usize)>,

    /// Highest success rate first, over every attempt including abandoned ones
    pub top_strategies: Vec<StrategyRate>,

    pub mean_recovery_duration_ms: f64,
}

/// Project the statistics of `outcomes` inside `window_days` before `now`.
///
/// Final attempts and gated failures count as errors seen; only final
/// attempts count toward durations, and abandoned primaries feed the
/// per-strategy rates.
pub fn project<'a, I>(outcomes: I, now: DateTime<Utc>, window_days: i64) -> RecoveryStats
where
    I: IntoIterator<Item = &'a OutcomeRecord>,
{
    let cutoff = now - Duration::days(window_days);

    let mut total_errors = 0;
    let mut unrecoverable = 0;
    let mut recoveries = 0;
    let mut successful = 0;
    let mut cancelled = 0;
    let mut duration_total: u64 = 0;
    let mut by_type: HashMap<ErrorType, usize> = HashMap::new();
    let mut by_strategy: HashMap<&str, (usize, usize)> = HashMap::new();

    for outcome in outcomes.into_iter().filter(|o| o.timestamp >= cutoff) {
        if outcome.kind == AttemptKind::Gated {
            total_errors += 1;
            unrecoverable += 1;
            *by_type.entry(outcome.error_type).or_insert(0) += 1;
            continue;
        }

        let rate = by_strategy.entry(outcome.strategy_id.as_str()).or_insert((0, 0));
        if !outcome.cancelled {
            rate.0 += 1;
            if outcome.success {
                rate.1 += 1;
            }
        }

        if outcome.kind != AttemptKind::Final {
            continue;
        }
        total_errors += 1;
        recoveries += 1;
        duration_total += outcome.duration_ms;
        *by_type.entry(outcome.error_type).or_insert(0) += 1;
        if outcome.success {
            successful += 1;
        }
        if outcome.cancelled {
            cancelled += 1;
        }
    }

    let mut top_error_types: Vec<(ErrorType, usize)> = by_type.into_iter().collect();
    top_error_types.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    top_error_types.truncate(TOP_N);

    let mut top_strategies: Vec<StrategyRate> = by_strategy
        .into_iter()
        .filter(|(_, (attempts, _))| *attempts > 0)
        .map(|(id, (attempts, successes))| StrategyRate {
            strategy_id: id.to_string(),
            attempts,
            successes,
            success_rate: successes as f64 / attempts as f64,
        })
        .collect();
    top_strategies.sort_by(|a, b| {
        b.success_rate
            .total_cmp(&a.success_rate)
            .then_with(|| b.attempts.cmp(&a.attempts))
            .then_with(|| a.strategy_id.cmp(&b.strategy_id))
    });
    top_strategies.truncate(TOP_N);

    RecoveryStats {
        window_days,
        total_errors,
        unrecoverable_errors: unrecoverable,
        successful_recoveries: successful,
        cancelled_recoveries: cancelled,
        success_rate: if total_errors > 0 {
            successful as f64 / total_errors as f64
        } else {
            0.0
        },
        top_error_types,
        top_strategies,
        mean_recovery_duration_ms: if recoveries > 0 {
            duration_total as f64 / recoveries as f64
        } else {
            0.0
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(id: &str, ty: ErrorType, success: bool, kind: AttemptKind, days_ago: i64) -> OutcomeRecord {
        OutcomeRecord {
            strategy_id: id.to_string(),
            error_type: ty,
            success,
            cancelled: false,
            kind,
            duration_ms: 1000,
            timestamp: Utc::now() - Duration::days(days_ago),
        }
    }

    #[test]
    fn test_empty_history() {
        let stats = project(&Vec::<OutcomeRecord>::new(), Utc::now(), 30);
        assert_eq!(stats.total_errors, 0);
        assert_eq!(stats.success_rate, 0.0);
        assert!(stats.top_strategies.is_empty());
    }

    #[test]
    fn test_window_and_final_attempts() {
        let outcomes = vec![
            outcome("wait_and_retry", ErrorType::ElementNotFound, false, AttemptKind::Abandoned, 1),
            outcome("refresh_and_retry", ErrorType::ElementNotFound, true, AttemptKind::Final, 1),
            outcome("wait_and_retry", ErrorType::ElementNotFound, true, AttemptKind::Final, 2),
            outcome("network_optimization", ErrorType::NetworkError, false, AttemptKind::Final, 3),
            outcome("wait_and_retry", ErrorType::NetworkError, true, AttemptKind::Final, 45),
        ];

        let stats = project(&outcomes, Utc::now(), 30);
        assert_eq!(stats.total_errors, 3);
        assert_eq!(stats.successful_recoveries, 2);
        assert!((stats.success_rate - 2.0 / 3.0).abs() < 1e-9);
        assert_eq!(stats.top_error_types[0], (ErrorType::ElementNotFound, 2));
        assert_eq!(stats.top_strategies[0].strategy_id, "refresh_and_retry");
        let wait = stats
            .top_strategies
            .iter()
            .find(|s| s.strategy_id == "wait_and_retry")
            .unwrap();
        assert_eq!(wait.attempts, 2);
        assert_eq!(wait.successes, 1);
        assert_eq!(stats.mean_recovery_duration_ms, 1000.0);
    }

    #[test]
    fn test_gated_failures_counted_as_errors() {
        let mut gated = outcome(UNRECOVERABLE, ErrorType::PermissionDenied, false, AttemptKind::Gated, 0);
        gated.duration_ms = 0;
        let outcomes = vec![
            gated.clone(),
            gated,
            outcome("wait_and_retry", ErrorType::ElementNotFound, true, AttemptKind::Final, 0),
        ];

        let stats = project(&outcomes, Utc::now(), 30);
        assert_eq!(stats.total_errors, 3);
        assert_eq!(stats.unrecoverable_errors, 2);
        assert_eq!(stats.successful_recoveries, 1);
        assert_eq!(stats.top_error_types[0], (ErrorType::PermissionDenied, 2));
        assert!(stats.top_strategies.iter().all(|s| s.strategy_id != UNRECOVERABLE));
        assert_eq!(stats.mean_recovery_duration_ms, 1000.0);
    }
}
