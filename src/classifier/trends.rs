//! Pattern and trend detection over the failure history
//!
//! Groups failures by `(type, signature)` and compares, per type, the
//! occurrence rate in the second half of the window with the rate over the
//! whole window:
//!
//! ```text
//! overall = n_window / window
//! recent  = n_second_half / (window / 2)
//! change  = (recent - overall) / overall
//! change > +threshold → increasing, change < -threshold → decreasing
//! ```

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::memory::ErrorHistory;
use crate::types::ErrorType;

/// Occurrence total at which risk is high regardless of trend
const HIGH_RISK_OCCURRENCES: usize = 20;
/// Occurrence total at which an increasing trend makes risk high
const TRENDING_HIGH_RISK_OCCURRENCES: usize = 10;
const MEDIUM_RISK_OCCURRENCES: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Increasing,
    Decreasing,
    Stable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

/// A repeated failure in the same place
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorPattern {
    pub error_type: ErrorType,
    pub signature: String,
    pub occurrences: usize,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternReport {
    /// Most frequent first
    pub patterns: Vec<ErrorPattern>,
    pub trends: BTreeMap<ErrorType, Trend>,
    pub risk: RiskLevel,
}

/// Tunables for detection
#[derive(Debug, Clone, Copy)]
pub struct TrendSettings {
    pub window: Duration,
    pub min_occurrences: usize,
    pub threshold: f64,
}

impl Default for TrendSettings {
    fn default() -> Self {
        Self {
            window: Duration::hours(24),
            min_occurrences: 3,
            threshold: 0.2,
        }
    }
}

/// Detect patterns, per-type trends and the derived risk level as of `now`
pub fn detect_error_patterns(
    history: &ErrorHistory,
    now: DateTime<Utc>,
    settings: TrendSettings,
) -> PatternReport {
    let window_start = now - settings.window;
    let half_start = now - settings.window / 2;

    let mut groups: HashMap<(ErrorType, &str), ErrorPattern> = HashMap::new();
    let mut per_type: BTreeMap<ErrorType, (usize, usize)> = BTreeMap::new();

    for record in history.since(window_start) {
        let counts = per_type.entry(record.error_type).or_insert((0, 0));
        counts.0 += 1;
        if record.timestamp >= half_start {
            counts.1 += 1;
        }

        groups
            .entry((record.error_type, record.signature.as_str()))
            .and_modify(|p| {
                p.occurrences += 1;
                p.first_seen = p.first_seen.min(record.timestamp);
                p.last_seen = p.last_seen.max(record.timestamp);
            })
            .or_insert_with(|| ErrorPattern {
                error_type: record.error_type,
                signature: record.signature.clone(),
                occurrences: 1,
                first_seen: record.timestamp,
                last_seen: record.timestamp,
            });
    }

    let mut patterns: Vec<ErrorPattern> = groups
        .into_values()
        .filter(|p| p.occurrences >= settings.min_occurrences)
        .collect();
    patterns.sort_by(|a, b| {
        b.occurrences
            .cmp(&a.occurrences)
            .then_with(|| a.signature.cmp(&b.signature))
    });

    let trends: BTreeMap<ErrorType, Trend> = per_type
        .into_iter()
        .map(|(ty, (total, recent))| (ty, trend_of(total, recent, settings.threshold)))
        .collect();

    let risk = risk_level(&patterns, &trends);

    PatternReport {
        patterns,
        trends,
        risk,
    }
}

fn trend_of(total: usize, second_half: usize, threshold: f64) -> Trend {
    if total == 0 {
        return Trend::Stable;
    }
    // Rates per half-window: overall = total / 2, recent = second_half
    let overall = total as f64 / 2.0;
    let change = (second_half as f64 - overall) / overall;
    if change > threshold {
        Trend::Increasing
    } else if change < -threshold {
        Trend::Decreasing
    } else {
        Trend::Stable
    }
}

fn risk_level(patterns: &[ErrorPattern], trends: &BTreeMap<ErrorType, Trend>) -> RiskLevel {
    let occurrences: usize = patterns.iter().map(|p| p.occurrences).sum();
    let increasing = trends.values().any(|t| *t == Trend::Increasing);

    if occurrences >= HIGH_RISK_OCCURRENCES
        || (occurrences >= TRENDING_HIGH_RISK_OCCURRENCES && increasing)
    {
        RiskLevel::High
    } else if occurrences >= MEDIUM_RISK_OCCURRENCES || increasing {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::ErrorRecord;

    fn push(history: &mut ErrorHistory, ty: ErrorType, sig: &str, at: DateTime<Utc>) {
        history.record(ErrorRecord {
            error_type: ty,
            signature: sig.to_string(),
            timestamp: at,
        });
    }

    #[test]
    fn test_empty_history() {
        let report = detect_error_patterns(&ErrorHistory::new(), Utc::now(), TrendSettings::default());
        assert!(report.patterns.is_empty());
        assert!(report.trends.is_empty());
        assert_eq!(report.risk, RiskLevel::Low);
    }

    #[test]
    fn test_groups_below_minimum_are_not_patterns() {
        let now = Utc::now();
        let mut history = ErrorHistory::new();
        push(&mut history, ErrorType::ElementNotFound, "a.test|#buy", now - Duration::hours(20));
        push(&mut history, ErrorType::ElementNotFound, "a.test|#buy", now - Duration::hours(2));
        push(&mut history, ErrorType::ElementNotFound, "b.test|#buy", now - Duration::hours(1));

        let report = detect_error_patterns(&history, now, TrendSettings::default());
        assert!(report.patterns.is_empty());
    }

    #[test]
    fn test_increasing_trend() {
        let now = Utc::now();
        let mut history = ErrorHistory::new();
        push(&mut history, ErrorType::NetworkError, "a.test|-", now - Duration::hours(20));
        for h in 1..=5 {
            push(&mut history, ErrorType::NetworkError, "a.test|-", now - Duration::hours(h));
        }

        let report = detect_error_patterns(&history, now, TrendSettings::default());
        assert_eq!(report.trends[&ErrorType::NetworkError], Trend::Increasing);
        assert_eq!(report.patterns.len(), 1);
        assert_eq!(report.patterns[0].occurrences, 6);
        // 6 occurrences plus an increasing trend
        assert_eq!(report.risk, RiskLevel::Medium);
    }

    #[test]
    fn test_decreasing_and_stable_trends() {
        let now = Utc::now();
        let mut history = ErrorHistory::new();
        for h in [23, 22, 21, 20, 1] {
            push(&mut history, ErrorType::StaleElement, "x|-", now - Duration::hours(h));
        }
        for h in [20, 2] {
            push(&mut history, ErrorType::RateLimited, "y|-", now - Duration::hours(h));
        }

        let report = detect_error_patterns(&history, now, TrendSettings::default());
        assert_eq!(report.trends[&ErrorType::StaleElement], Trend::Decreasing);
        assert_eq!(report.trends[&ErrorType::RateLimited], Trend::Stable);
    }

    #[test]
    fn test_records_outside_window_ignored() {
        let now = Utc::now();
        let mut history = ErrorHistory::new();
        for _ in 0..30 {
            push(&mut history, ErrorType::NetworkError, "old|-", now - Duration::hours(48));
        }
        let report = detect_error_patterns(&history, now, TrendSettings::default());
        assert!(report.patterns.is_empty());
        assert_eq!(report.risk, RiskLevel::Low);
    }

    #[test]
    fn test_high_risk_from_volume() {
        let now = Utc::now();
        let mut history = ErrorHistory::new();
        for i in 0..22 {
            let at = now - Duration::minutes(60 * 23 - i * 60);
            push(&mut history, ErrorType::ElementNotFound, "a.test|#go", at);
        }
        let report = detect_error_patterns(&history, now, TrendSettings::default());
        assert_eq!(report.risk, RiskLevel::High);
    }
}
