//! Classification cache and failure history
//!
//! Plain data structures; the classifier owns them behind its locks.
//!
//! Components:
//! - Pattern Cache: last classifications per `type:message-prefix` key
//! - Error History: bounded record of raw failure signatures

pub mod cache;
pub mod history;

pub use cache::PatternCache;
pub use history::{ErrorHistory, ErrorRecord};
