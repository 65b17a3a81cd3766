//! Prompt builders for the three oracle uses plus the recoverability check
//!
//! Each prompt ends with the exact JSON shape the matching schema in
//! `oracle::schema` decodes.

use crate::types::{ActionContext, AutomationError, ErrorClassification, RecoveryStrategy};

/// Full classification request
pub fn classification_prompt(error: &AutomationError, context: &ActionContext) -> String {
    let mut parts = Vec::new();

    parts.push("SYSTEM: You classify failures of a browser automation step.".to_string());
    parts.push(format!("ERROR_TYPE: {}", error.error_type));
    parts.push(format!("MESSAGE: {}", error.message));
    if !error.context.is_empty() {
        parts.push(format!(
            "ERROR_CONTEXT: {}",
            serde_json::Value::Object(error.context.clone().into_iter().collect())
        ));
    }
    push_context(&mut parts, context);

    parts.push(format!(
        "ALLOWED_TYPES: {}",
        crate::types::ErrorType::all()
            .iter()
            .map(|t| t.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    ));
    parts.push(
        "Respond with JSON only:\n\
         {\"error_type\": \"<ALLOWED_TYPE>\", \"severity\": \"low|medium|high|critical\", \
         \"possible_causes\": [\"...\"], \"recoverable\": true, \"confidence\": 0.0, \
         \"metadata\": {}}"
            .to_string(),
    );

    parts.join("\n\n")
}

/// Strategy proposal request
pub fn strategy_prompt(classification: &ErrorClassification, context: &ActionContext) -> String {
    let mut parts = Vec::new();

    parts.push(
        "SYSTEM: You propose recovery strategies for a failed browser automation step."
            .to_string(),
    );
    push_classification(&mut parts, classification);
    push_context(&mut parts, context);

    parts.push(
        "ALLOWED_ACTIONS: wait, refresh_page, retry_action, scroll_to_element, \
         alternative_selector, navigate_back, wait_for_network_idle, dismiss_overlay, \
         clear_cookies"
            .to_string(),
    );
    parts.push(
        "Respond with JSON only, at most 3 strategies:\n\
         {\"strategies\": [{\"name\": \"...\", \"description\": \"...\", \
         \"steps\": [{\"action_type\": \"<ALLOWED_ACTION>\", \"description\": \"...\", \
         \"parameters\": {}, \"timeout_ms\": 5000, \"optional\": false}], \
         \"success_probability\": 0.5, \"priority\": 5, \"time_estimate_ms\": 3000}]}"
            .to_string(),
    );

    parts.join("\n\n")
}

/// Narrow fit estimate for one candidate strategy
pub fn probability_prompt(
    strategy: &RecoveryStrategy,
    classification: &ErrorClassification,
    context: &ActionContext,
) -> String {
    let mut parts = Vec::new();

    parts.push("SYSTEM: Estimate how likely a recovery strategy is to succeed.".to_string());
    push_classification(&mut parts, classification);
    parts.push(format!("STRATEGY: {} ({})", strategy.name, strategy.description));
    parts.push("STEPS:".to_string());
    for (i, step) in strategy.steps.iter().enumerate() {
        let marker = if step.optional { " [optional]" } else { "" };
        parts.push(format!(
            "  {}. {} - {}{}",
            i + 1,
            step.action_type,
            step.description,
            marker
        ));
    }
    parts.push(format!("URL: {}", context.current_url));
    parts.push(
        "Respond with JSON only, probability between 0.1 and 0.9:\n{\"probability\": 0.5}"
            .to_string(),
    );

    parts.join("\n")
}

/// Recoverability judgment
pub fn recoverability_prompt(classification: &ErrorClassification) -> String {
    let mut parts = Vec::new();

    parts.push(
        "SYSTEM: Decide whether an automated retry can recover from this failure.".to_string(),
    );
    push_classification(&mut parts, classification);
    parts.push(format!("URL: {}", classification.context.url));
    parts.push(
        "Respond with JSON only:\n{\"recoverable\": true, \"confidence\": 0.0}".to_string(),
    );

    parts.join("\n\n")
}

fn push_classification(parts: &mut Vec<String>, classification: &ErrorClassification) {
    parts.push(format!(
        "CLASSIFICATION: {} severity={} confidence={:.2}",
        classification.error_type, classification.severity, classification.confidence
    ));
    parts.push(format!("MESSAGE: {}", classification.context.message));
    if !classification.possible_causes.is_empty() {
        parts.push(format!(
            "POSSIBLE_CAUSES: {}",
            classification.possible_causes.join("; ")
        ));
    }
}

fn push_context(parts: &mut Vec<String>, context: &ActionContext) {
    parts.push(format!("URL: {}", context.current_url));
    parts.push(format!("OBJECTIVE: {}", context.objective));
    if let Some(target) = &context.target_element {
        parts.push(format!("TARGET: {}", target));
    }
    if let Some(limit) = context.time_constraint {
        parts.push(format!("TIME_LEFT_MS: {}", limit.as_millis()));
    }
    if !context.previous_actions.is_empty() {
        let skip = context.previous_actions.len().saturating_sub(5);
        parts.push("RECENT_ACTIONS:".to_string());
        for action in &context.previous_actions[skip..] {
            parts.push(format!("  - {}", action));
        }
    }
}
