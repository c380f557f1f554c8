//! Quota detection for provider failures
//!
//! Distinguishes quota exhaustion (triggers failover to the fallback
//! provider) from everything else (terminates in an error result). A
//! structured 429 is authoritative; the message substring check is a last
//! resort for failures that arrive without an HTTP status, such as errors
//! embedded in a 200 body or connection-level failures that quote the
//! upstream message.

use provider::ProviderError;

/// Quota exhaustion phrases seen in Gemini and OpenRouter error messages.
const QUOTA_PATTERNS: &[&str] = &[
    "quota_exceeded",
    "resource_exhausted",
    "resource has been exhausted",
    "quota exceeded",
    "429",
];

/// Check an error message for known quota exhaustion phrases.
pub fn is_quota_message(message: &str) -> bool {
    let lower = message.to_lowercase();
    QUOTA_PATTERNS.iter().any(|pattern| lower.contains(pattern))
}

/// Classify a provider failure as quota exhaustion.
///
/// `Quota` and a structured 429 are always quota exhaustion. A transport
/// failure with any other status is not, regardless of what the body says:
/// a 500 quoting a quota phrase must not flag the provider. Only statusless
/// failures fall back to the substring heuristic.
pub fn is_quota_error(error: &ProviderError) -> bool {
    match error {
        ProviderError::Quota(_) => true,
        ProviderError::Transport {
            status: Some(status),
            ..
        } => *status == 429,
        ProviderError::Transport {
            status: None,
            message,
        } => is_quota_message(message),
        ProviderError::Format(_) | ProviderError::MissingCredential(_) => false,
    }
}
