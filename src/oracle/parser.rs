//! JSON object extraction from free-form completions
//!
//! Completions often wrap the requested JSON in prose or code fences. The
//! extractor finds the first balanced top-level object with a single pass
//! of bracket matching:
//!
//! ```text
//! depth ← 0, start ← None
//! for each char cᵢ outside string literals:
//!   '{' → if depth = 0: start ← i; depth ← depth + 1
//!   '}' → depth ← depth - 1; if depth = 0: return text[start..=i]
//! return None
//! ```

use crate::errors::{RecoveryError, Result};

/// Maximum completion size accepted for extraction (1MB)
pub const MAX_COMPLETION_SIZE: usize = 1_048_576;

/// Extract the first complete JSON object from `text`
pub fn extract_json_object(text: &str) -> Result<&str> {
    if text.len() > MAX_COMPLETION_SIZE {
        return Err(RecoveryError::JsonParseError(format!(
            "Completion of {} bytes exceeds maximum {}",
            text.len(),
            MAX_COMPLETION_SIZE
        )));
    }

    let (start, end) = find_complete_json(text).ok_or_else(|| {
        RecoveryError::JsonParseError("No complete JSON object in completion".to_string())
    })?;

    Ok(&text[start..=end])
}

/// Returns byte offsets of the first balanced object
fn find_complete_json(text: &str) -> Option<(usize, usize)> {
    let mut depth: i32 = 0;
    let mut start: Option<usize> = None;
    let mut in_string = false;
    let mut escape_next = false;

    for (i, ch) in text.char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }

        if ch == '\\' && in_string {
            escape_next = true;
            continue;
        }

        if ch == '"' {
            // Quotes before the first brace are prose, not JSON strings
            if start.is_some() {
                in_string = !in_string;
            }
            continue;
        }

        if in_string {
            continue;
        }

        match ch {
            '{' => {
                if depth == 0 {
                    start = Some(i);
                }
                depth += 1;
            }
            '}' => {
                if start.is_none() {
                    continue;
                }
                depth -= 1;
                if depth == 0 {
                    return start.map(|s| (s, i));
                }
            }
            _ => {}
        }
    }

    None
}
