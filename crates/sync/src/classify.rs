//! Fetch-error signature classification.
//!
//! Adapters classify what they can, but some failures surface as generic
//! fetch errors wrapping a provider message. Known signatures in those
//! messages are pattern-matched back into the taxonomy so callers get an
//! actionable code instead of `fetch_failed`.

use tradelog_brokers::BrokerError;

/// Refines a fetch error into its most specific taxonomy code.
pub fn refine_error_code(error: &BrokerError) -> &'static str {
    match error {
        BrokerError::FetchFailed { message, .. }
        | BrokerError::Network { message, .. }
        | BrokerError::Unknown { message } => {
            classify_message(message).unwrap_or_else(|| error.error_code())
        }
        _ => error.error_code(),
    }
}

/// Known provider failure signatures.
fn classify_message(message: &str) -> Option<&'static str> {
    let lowered = message.to_lowercase();

    if lowered.contains("token")
        || lowered.contains("session expired")
        || lowered.contains("invalid session")
    {
        return Some("token_expired");
    }
    if lowered.contains("not found")
        || lowered.contains("404")
        || lowered.contains("unavailable")
        || lowered.contains("no longer supported")
    {
        return Some("tradebook_unavailable");
    }
    if lowered.contains("reactivat")
        || lowered.contains("suspended")
        || lowered.contains("dormant")
        || lowered.contains("blocked")
    {
        return Some("reactivation_required");
    }
    None
}
