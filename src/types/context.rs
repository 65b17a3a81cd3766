//! Action context snapshots supplied by the browser-driving layer

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Snapshot of what the automation was doing when a failure occurred.
///
/// Read-only to the recovery pipeline; primitive actions may hand back a
/// new snapshot, which replaces this one for subsequent steps.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionContext {
    /// Page URL at the time of failure
    pub current_url: String,

    /// What the automation was trying to achieve
    pub objective: String,

    /// Descriptor of the element the failed action targeted
    #[serde(default)]
    pub target_element: Option<String>,

    /// Remaining time budget for the overall task
    #[serde(default)]
    pub time_constraint: Option<Duration>,

    /// Actions performed before the failure, oldest first
    #[serde(default)]
    pub previous_actions: Vec<String>,

    /// Open metadata bag validated at the boundary
    #[serde(default)]
    pub extra: HashMap<String, serde_json::Value>,
}

impl ActionContext {
    /// Create a context for a URL and objective
    pub fn new(current_url: impl Into<String>, objective: impl Into<String>) -> Self {
        Self {
            current_url: current_url.into(),
            objective: objective.into(),
            ..Default::default()
        }
    }

    /// Set the targeted element descriptor
    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target_element = Some(target.into());
        self
    }

    /// Set the remaining time budget
    pub fn with_time_constraint(mut self, limit: Duration) -> Self {
        self.time_constraint = Some(limit);
        self
    }

    /// Append a previously performed action
    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        self.previous_actions.push(action.into());
        self
    }

    /// Hostname of the current URL, or the raw string when it does not parse
    pub fn host(&self) -> String {
        match url::Url::parse(&self.current_url) {
            Ok(parsed) => parsed.host_str().unwrap_or_default().to_string(),
            Err(_) => self.current_url.trim().to_string(),
        }
    }

    /// Signature used to group repeated failures in the same place
    pub fn signature(&self) -> String {
        format!(
            "{}|{}",
            self.host(),
            self.target_element.as_deref().unwrap_or("-")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_extraction() {
        let ctx = ActionContext::new("https://shop.example.com/cart?x=1", "checkout");
        assert_eq!(ctx.host(), "shop.example.com");
    }

    #[test]
    fn test_host_of_unparseable_url() {
        let ctx = ActionContext::new("not a url", "x");
        assert_eq!(ctx.host(), "not a url");

        let empty = ActionContext::default();
        assert_eq!(empty.host(), "");
    }

    #[test]
    fn test_signature() {
        let ctx = ActionContext::new("https://example.com/login", "log in")
            .with_target("button.submit");
        assert_eq!(ctx.signature(), "example.com|button.submit");

        let ctx = ActionContext::new("https://example.com/", "browse");
        assert_eq!(ctx.signature(), "example.com|-");
    }

    #[test]
    fn test_builder() {
        let ctx = ActionContext::new("https://a.test", "search")
            .with_action("click search")
            .with_action("type query")
            .with_time_constraint(Duration::from_secs(30));
        assert_eq!(ctx.previous_actions.len(), 2);
        assert_eq!(ctx.time_constraint, Some(Duration::from_secs(30)));
    }
}
