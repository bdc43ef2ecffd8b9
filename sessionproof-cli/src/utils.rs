//! Shared utility functions.

use chrono::{DateTime, Utc};
use sessionproof_proto::SignatureRecord;

/// Format an RFC 3339 timestamp as a human-readable string.
pub fn format_timestamp(rfc3339: &str) -> String {
    DateTime::parse_from_rfc3339(rfc3339)
        .map(|dt| {
            dt.with_timezone(&Utc)
                .format("%Y-%m-%d %H:%M:%S UTC")
                .to_string()
        })
        .unwrap_or_else(|_| "invalid".to_string())
}

/// Shorten `s` to at most `max` characters for display.
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

/// JSON form of a signature record.
pub fn record_to_json(record: &SignatureRecord) -> serde_json::Value {
    serde_json::json!({
        "session_id": record.session_id,
        "user_id": record.user_id,
        "proof": record.proof,
        "signature": record.signature,
        "created_at": record.created_at,
    })
}
