//! Telemetry for autoheal
//!
//! Tracing subscriber setup for the binary plus in-process counters of
//! recovery activity for the terminal summary.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;
use tracing_subscriber::EnvFilter;

use crate::cli::Verbosity;
use crate::types::ClassificationSource;

/// Environment variable overriding the log filter
pub const LOG_ENV: &str = "AUTOHEAL_LOG";

/// Install the global fmt subscriber. Only the binary calls this.
pub fn init_tracing(verbosity: Verbosity) {
    let default_level = match verbosity {
        Verbosity::Quiet => "error",
        Verbosity::Normal => "warn",
        Verbosity::Verbose => "autoheal=info",
        Verbosity::VeryVerbose => "autoheal=debug",
    };

    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default_level));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Telemetry event types
#[derive(Debug, Clone, PartialEq)]
pub enum TelemetryEvent {
    Classified { source: ClassificationSource },
    StrategiesGenerated { count: usize, from_oracle: usize },
    StepExecuted { success: bool },
    StrategySwitched,
    RecoveryCancelled,
    RecoveryCompleted { success: bool, duration_ms: u64 },
}

/// Telemetry statistics
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TelemetryStats {
    pub classified_from_cache: usize,
    pub classified_by_oracle: usize,
    pub classified_by_rules: usize,
    pub strategies_generated: usize,
    pub oracle_strategies: usize,
    pub steps_executed: usize,
    pub steps_failed: usize,
    pub strategy_switches: usize,
    pub cancellations: usize,
    pub recoveries: usize,
    pub recoveries_succeeded: usize,
    pub recovery_time_ms: u64,
}

/// Shared counter set
#[derive(Debug, Clone)]
pub struct RecoveryTelemetry {
    stats: Arc<Mutex<TelemetryStats>>,
    start_time: Instant,
}

impl RecoveryTelemetry {
    pub fn new() -> Self {
        Self {
            stats: Arc::new(Mutex::new(TelemetryStats::default())),
            start_time: Instant::now(),
        }
    }

    fn stats(&self) -> MutexGuard<'_, TelemetryStats> {
        // Counters stay usable after a panicking holder
        self.stats.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Record an event
    pub fn record(&self, event: TelemetryEvent) {
        let mut stats = self.stats();
        match event {
            TelemetryEvent::Classified { source } => match source {
                ClassificationSource::Cache => stats.classified_from_cache += 1,
                ClassificationSource::Oracle => stats.classified_by_oracle += 1,
                ClassificationSource::RuleTable => stats.classified_by_rules += 1,
            },
            TelemetryEvent::StrategiesGenerated { count, from_oracle } => {
                stats.strategies_generated += count;
                stats.oracle_strategies += from_oracle;
            }
            TelemetryEvent::StepExecuted { success } => {
                stats.steps_executed += 1;
                if !success {
                    stats.steps_failed += 1;
                }
            }
            TelemetryEvent::StrategySwitched => stats.strategy_switches += 1,
            TelemetryEvent::RecoveryCancelled => stats.cancellations += 1,
            TelemetryEvent::RecoveryCompleted {
                success,
                duration_ms,
            } => {
                stats.recoveries += 1;
                stats.recovery_time_ms += duration_ms;
                if success {
                    stats.recoveries_succeeded += 1;
                }
            }
        }
    }

    /// Get current statistics
    pub fn get_stats(&self) -> TelemetryStats {
        self.stats().clone()
    }

    pub fn elapsed(&self) -> std::time::Duration {
        self.start_time.elapsed()
    }

    /// Share of finished recoveries that succeeded; 1.0 before any finished
    pub fn recovery_success_rate(&self) -> f64 {
        let stats = self.stats();
        if stats.recoveries == 0 {
            1.0
        } else {
            stats.recoveries_succeeded as f64 / stats.recoveries as f64
        }
    }

    /// Multi-line terminal summary
    pub fn summary(&self) -> String {
        let stats = self.get_stats();
        let mut lines = Vec::new();
        lines.push("Recovery Summary".to_string());
        lines.push("─────────────────────────────────────".to_string());
        lines.push(format!("Duration:          {:?}", self.elapsed()));
        lines.push(format!(
            "Classifications:   {} cache / {} oracle / {} rules",
            stats.classified_from_cache, stats.classified_by_oracle, stats.classified_by_rules
        ));
        lines.push(format!(
            "Strategies:        {} ({} proposed by oracle)",
            stats.strategies_generated, stats.oracle_strategies
        ));
        lines.push(format!(
            "Steps:             {} executed, {} failed",
            stats.steps_executed, stats.steps_failed
        ));
        lines.push(format!("Switches:          {}", stats.strategy_switches));
        lines.push(format!("Cancellations:     {}", stats.cancellations));
        lines.push(format!(
            "Success rate:      {:.1}%",
            self.recovery_success_rate() * 100.0
        ));
        lines.join("\n")
    }
}

impl Default for RecoveryTelemetry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collector_creation() {
        let telemetry = RecoveryTelemetry::new();
        assert_eq!(telemetry.get_stats(), TelemetryStats::default());
        assert_eq!(telemetry.recovery_success_rate(), 1.0);
    }

    #[test]
    fn test_classification_sources_counted() {
        let telemetry = RecoveryTelemetry::new();
        telemetry.record(TelemetryEvent::Classified {
            source: ClassificationSource::Cache,
        });
        telemetry.record(TelemetryEvent::Classified {
            source: ClassificationSource::RuleTable,
        });
        telemetry.record(TelemetryEvent::Classified {
            source: ClassificationSource::RuleTable,
        });

        let stats = telemetry.get_stats();
        assert_eq!(stats.classified_from_cache, 1);
        assert_eq!(stats.classified_by_oracle, 0);
        assert_eq!(stats.classified_by_rules, 2);
    }

    #[test]
    fn test_recovery_success_rate() {
        let telemetry = RecoveryTelemetry::new();
        for success in [true, true, false] {
            telemetry.record(TelemetryEvent::RecoveryCompleted {
                success,
                duration_ms: 100,
            });
        }

        let rate = telemetry.recovery_success_rate();
        assert!((rate - 0.666).abs() < 0.01);
        assert_eq!(telemetry.get_stats().recovery_time_ms, 300);
    }

    #[test]
    fn test_clones_share_counters() {
        let telemetry = RecoveryTelemetry::new();
        let clone = telemetry.clone();
        clone.record(TelemetryEvent::StepExecuted { success: false });
        clone.record(TelemetryEvent::StrategySwitched);

        let stats = telemetry.get_stats();
        assert_eq!(stats.steps_executed, 1);
        assert_eq!(stats.steps_failed, 1);
        assert_eq!(stats.strategy_switches, 1);
    }

    #[test]
    fn test_summary_mentions_counters() {
        let telemetry = RecoveryTelemetry::new();
        telemetry.record(TelemetryEvent::StrategiesGenerated {
            count: 3,
            from_oracle: 1,
        });
        let summary = telemetry.summary();
        assert!(summary.contains("3 (1 proposed by oracle)"));
    }
}
