//! Provider compatibility rules.

use crate::error::ApiError;

/// Substrings of an error body that indicate the provider choked on the
/// tool-calling parameters rather than on the conversation itself.
const TOOLING_ERROR_HINTS: &[&str] = &[
    "tools",
    "tool_choice",
    "tool_calls",
    "function calling",
    "function_call",
    "functions",
    "unknown parameter",
    "unsupported",
];

/// Status codes a provider uses to reject request shape outright.
const TOOLING_REJECTION_STATUSES: &[u16] = &[400, 404, 422];

/// True when a tool-bearing request failed in a way that a toolless retry
/// is likely to fix.
pub fn is_tool_incompatibility(err: &ApiError) -> bool {
    match err {
        ApiError::Status { code, body, .. } => {
            if TOOLING_REJECTION_STATUSES.contains(code) {
                return true;
            }
            // Only client errors are worth inspecting; 5xx bodies mention
            // arbitrary things.
            (400..500).contains(code) && *code != 429 && mentions_tooling(body)
        }
        ApiError::InvalidResponse(msg) => mentions_tooling(msg),
        ApiError::Http(_) | ApiError::Connection(_) => false,
    }
}

fn mentions_tooling(text: &str) -> bool {
    let lowered = text.to_lowercase();
    TOOLING_ERROR_HINTS.iter().any(|hint| lowered.contains(hint))
}
