//! Raw failure signatures, kept for severity frequency and trend detection

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use crate::types::ErrorType;

/// Default number of records retained
pub const DEFAULT_HISTORY_CAPACITY: usize = 5000;

/// One observed failure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub error_type: ErrorType,

    /// `host|target` signature of where the failure happened
    pub signature: String,

    pub timestamp: DateTime<Utc>,
}

/// Bounded FIFO of failure records
#[derive(Debug, Clone)]
pub struct ErrorHistory {
    capacity: usize,
    records: VecDeque<ErrorRecord>,
}

impl ErrorHistory {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_HISTORY_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            records: VecDeque::new(),
        }
    }

    pub fn record(&mut self, record: ErrorRecord) {
        if self.records.len() >= self.capacity {
            self.records.pop_front();
        }
        self.records.push_back(record);
    }

    /// Records at or after `cutoff`, oldest first
    pub fn since(&self, cutoff: DateTime<Utc>) -> impl Iterator<Item = &ErrorRecord> {
        self.records.iter().filter(move |r| r.timestamp >= cutoff)
    }

    /// Occurrences of `error_type` at or after `cutoff`
    pub fn count_since(&self, error_type: ErrorType, cutoff: DateTime<Utc>) -> usize {
        self.since(cutoff)
            .filter(|r| r.error_type == error_type)
            .count()
    }

    pub fn records(&self) -> &VecDeque<ErrorRecord> {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl Default for ErrorHistory {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn record(error_type: ErrorType, hours_ago: i64) -> ErrorRecord {
        ErrorRecord {
            error_type,
            signature: "a.test|-".to_string(),
            timestamp: Utc::now() - Duration::hours(hours_ago),
        }
    }

    #[test]
    fn test_bounded_capacity() {
        let mut history = ErrorHistory::with_capacity(3);
        for _ in 0..5 {
            history.record(record(ErrorType::NetworkError, 0));
        }
        assert_eq!(history.len(), 3);
    }

    #[test]
    fn test_count_since_window() {
        let mut history = ErrorHistory::new();
        history.record(record(ErrorType::NetworkError, 30));
        history.record(record(ErrorType::NetworkError, 2));
        history.record(record(ErrorType::NetworkError, 1));
        history.record(record(ErrorType::StaleElement, 1));

        let cutoff = Utc::now() - Duration::hours(24);
        assert_eq!(history.count_since(ErrorType::NetworkError, cutoff), 2);
        assert_eq!(history.count_since(ErrorType::StaleElement, cutoff), 1);
        assert_eq!(history.since(cutoff).count(), 3);
    }
}
