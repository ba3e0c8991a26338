//! Failure classification.
//!
//! Maps a [`ProviderError`] (or a bare message) onto a [`FailoverReason`].
//! Signals are consulted in a fixed order: an existing classification, the
//! HTTP status, the machine error code, structured timeout signals, and finally
//! the lower-cased message against ordered phrase lists.

use super::types::FailoverReason;
use crate::llm::error::ProviderError;

/// Error codes that indicate a dropped or stalled connection.
const TRANSIENT_NETWORK_CODES: &[&str] = &[
    "ECONNRESET",
    "ECONNABORTED",
    "ETIMEDOUT",
    "ESOCKETTIMEDOUT",
];

const TIMEOUT_PHRASES: &[&str] = &[
    "timeout",
    "timed out",
    "deadline exceeded",
    "deadline_exceeded",
];

const RATE_LIMIT_PHRASES: &[&str] = &[
    "rate limit",
    "rate_limit",
    "ratelimit",
    "too many requests",
    "429",
    "overloaded",
    "quota exceeded",
    "exceeded your current quota",
    "resource has been exhausted",
    "resource_exhausted",
    "usage limit",
];

const BILLING_PHRASES: &[&str] = &[
    "402",
    "payment required",
    "insufficient credits",
    "insufficient credit",
    "insufficient balance",
    "credit balance",
    "billing",
    "upgrade your plan",
];

const AUTH_PHRASES: &[&str] = &[
    "401",
    "403",
    "unauthorized",
    "forbidden",
    "invalid api key",
    "invalid_api_key",
    "incorrect api key",
    "invalid x-api-key",
    "authentication",
    "invalid token",
    "expired",
    "access denied",
    "no api key",
    "no credentials",
];

const FORMAT_PHRASES: &[&str] = &[
    "invalid_request_error",
    "invalid request format",
    "malformed",
    "string should match pattern",
    "tool_use_id",
    "tool_use.id",
    "tool_call_id",
    "tool call id",
    "unexpected tool",
    "must be followed by tool",
];

const COMPACTION_PHRASES: &[&str] = &[
    "summarization failed",
    "summarisation failed",
    "compaction failed",
    "auto-compaction",
    "context compaction",
    "failed to summarize",
    "failed to compact",
];

/// Secondary safety net for errors the classifier leaves uncategorized.
const RETRYABLE_FALLBACK_PHRASES: &[&str] = &[
    "econnreset",
    "econnrefused",
    "socket hang up",
    "network",
    "connection reset",
    "fetch failed",
    "502",
    "503",
    "504",
    "rate limit",
    "too many requests",
];

/// Classify a provider error. Returns `None` when no signal matches.
pub fn classify(error: &ProviderError) -> Option<FailoverReason> {
    if let ProviderError::Failover(existing) = error {
        return Some(existing.reason);
    }

    if let Some(reason) = error.status().and_then(classify_status) {
        return Some(reason);
    }

    if let Some(code) = error.code()
        && is_transient_network_code(code)
    {
        return Some(FailoverReason::Timeout);
    }

    if error.is_timeout() {
        return Some(FailoverReason::Timeout);
    }
    if let ProviderError::Aborted { reason } = error
        && contains_any(&reason.to_lowercase(), TIMEOUT_PHRASES)
    {
        return Some(FailoverReason::Timeout);
    }

    classify_message(&error.to_string())
}

/// Classify an error from its message text alone.
pub fn classify_message(message: &str) -> Option<FailoverReason> {
    let lower = message.to_lowercase();
    if lower.trim().is_empty() {
        return None;
    }

    let ordered: [(&[&str], FailoverReason); 6] = [
        (RATE_LIMIT_PHRASES, FailoverReason::RateLimit),
        (TIMEOUT_PHRASES, FailoverReason::Timeout),
        (BILLING_PHRASES, FailoverReason::Billing),
        (AUTH_PHRASES, FailoverReason::Auth),
        (FORMAT_PHRASES, FailoverReason::Format),
        (COMPACTION_PHRASES, FailoverReason::Compaction),
    ];

    ordered
        .iter()
        .find(|(phrases, _)| contains_any(&lower, phrases))
        .map(|(_, reason)| *reason)
}

/// Status codes with a fixed meaning; anything else falls through to text.
pub fn classify_status(status: u16) -> Option<FailoverReason> {
    match status {
        402 => Some(FailoverReason::Billing),
        429 => Some(FailoverReason::RateLimit),
        401 | 403 => Some(FailoverReason::Auth),
        408 => Some(FailoverReason::Timeout),
        _ => None,
    }
}

/// Decide whether an error is worth retrying.
///
/// Known reasons use the fixed table. `None` and
/// [`FailoverReason::Unknown`] fall back to a coarse text check that is kept
/// separate from the classifier phrase lists on purpose: it decides retries
/// for errors the classifier could not place.
pub fn is_retryable(reason: Option<FailoverReason>, message: &str) -> bool {
    match reason.and_then(FailoverReason::is_retryable) {
        Some(retryable) => retryable,
        None => contains_any(&message.to_lowercase(), RETRYABLE_FALLBACK_PHRASES),
    }
}

/// Classify and decide in one step.
pub fn is_retryable_error(error: &ProviderError) -> bool {
    is_retryable(classify(error), &error.to_string())
}

fn is_transient_network_code(code: &str) -> bool {
    TRANSIENT_NETWORK_CODES
        .iter()
        .any(|known| known.eq_ignore_ascii_case(code))
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|needle| haystack.contains(needle))
}
