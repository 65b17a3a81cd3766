//! Pattern cache: last-write-wins classification lists per pattern key
//!
//! Keyed by `type:message-prefix`. Each key keeps at most `per_key`
//! classifications; the oldest is evicted first. At most `max_keys` keys are
//! kept, dropping the least recently written key. There is no TTL.

use std::collections::{HashMap, VecDeque};

use crate::types::ErrorClassification;

/// Default number of classifications kept per key
pub const DEFAULT_ENTRIES_PER_KEY: usize = 10;

/// Default number of distinct keys
pub const DEFAULT_MAX_KEYS: usize = 1000;

/// Bounded per-key classification store
#[derive(Debug, Clone)]
pub struct PatternCache {
    per_key: usize,
    max_keys: usize,
    entries: HashMap<String, VecDeque<ErrorClassification>>,
    /// Keys by last write, oldest first
    write_order: VecDeque<String>,
}

impl PatternCache {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_ENTRIES_PER_KEY)
    }

    /// Create a cache keeping `per_key` classifications per key (at least one)
    pub fn with_capacity(per_key: usize) -> Self {
        Self::bounded(per_key, DEFAULT_MAX_KEYS)
    }

    /// Create a cache keeping `per_key` classifications for each of at most
    /// `max_keys` keys
    pub fn bounded(per_key: usize, max_keys: usize) -> Self {
        Self {
            per_key: per_key.max(1),
            max_keys: max_keys.max(1),
            entries: HashMap::new(),
            write_order: VecDeque::new(),
        }
    }

    /// Most recent classification stored under `key`
    pub fn latest(&self, key: &str) -> Option<&ErrorClassification> {
        self.entries.get(key).and_then(|list| list.back())
    }

    /// Store a classification, superseding earlier ones for the same key
    pub fn insert(&mut self, key: impl Into<String>, classification: ErrorClassification) {
        let key = key.into();
        self.touch(&key);

        let list = self.entries.entry(key).or_default();
        if list.len() >= self.per_key {
            list.pop_front();
        }
        list.push_back(classification);
    }

    /// Mark `key` as most recently written, evicting the stalest key when a
    /// new key would exceed `max_keys`
    fn touch(&mut self, key: &str) {
        if let Some(pos) = self.write_order.iter().position(|k| k == key) {
            self.write_order.remove(pos);
        } else if self.entries.len() >= self.max_keys {
            if let Some(stale) = self.write_order.pop_front() {
                self.entries.remove(&stale);
            }
        }
        self.write_order.push_back(key.to_string());
    }

    /// All retained classifications for `key`, oldest first
    pub fn history(&self, key: &str) -> Vec<&ErrorClassification> {
        self.entries
            .get(key)
            .map(|list| list.iter().collect())
            .unwrap_or_default()
    }

    /// Number of distinct keys
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.write_order.clear();
    }
}

impl Default for PatternCache {
    fn default() -> Self {
        Self::new()
    }
}
