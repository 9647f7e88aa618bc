//! Error classification at the transport boundary.
//!
//! Raw errors from the SFU and the signaling server arrive as free-form
//! message text, sometimes with a structured code. These functions map them
//! deterministically into the closed [`VoiceErrorCode`] taxonomy so nothing
//! downstream ever inspects raw error shapes. Both functions are pure and
//! side-effect-free.

use crate::errors::{VoiceError, VoiceErrorCode};
use crate::transport::TransportError;

/// Wording that indicates an authentication-class failure.
const AUTH_INDICATORS: &[&str] = &[
    "unauthorized",
    "unauthenticated",
    "forbidden",
    "expired",
    "invalid token",
    "invalid-token",
    "bad token",
    "401",
    "403",
];

/// Wording that indicates a network-unreachable-class failure.
const NETWORK_INDICATORS: &[&str] = &[
    "fetch failed",
    "failed to fetch",
    "timeout",
    "timed out",
    "connection refused",
    "econnrefused",
    "unreachable",
    "network",
    "dns",
];

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|needle| haystack.contains(needle))
}

/// Classify a raw SFU/media transport error.
///
/// - Authentication indicators map to [`VoiceErrorCode::AuthFailed`]
///   (never retried automatically).
/// - Network indicators map to [`VoiceErrorCode::NetworkUnavailable`]
///   (retried, surfaced as service-unavailable on exhaustion).
/// - Everything else maps to [`VoiceErrorCode::ConnectionFailed`] with the
///   original text preserved only in the technical message.
#[must_use]
pub fn classify_sfu_error(raw: &TransportError) -> VoiceError {
    let text = match &raw.code {
        Some(code) => format!("{} {}", code, raw.message).to_lowercase(),
        None => raw.message.to_lowercase(),
    };

    let code = if contains_any(&text, AUTH_INDICATORS) {
        VoiceErrorCode::AuthFailed
    } else if contains_any(&text, NETWORK_INDICATORS) {
        VoiceErrorCode::NetworkUnavailable
    } else {
        VoiceErrorCode::ConnectionFailed
    };

    VoiceError::new(code, raw.message.clone())
}

/// Classify an error reported over the signaling channel (`voice:error`).
///
/// Network/availability wording maps to the retryable
/// [`VoiceErrorCode::Unavailable`]; anything else is a generic
/// [`VoiceErrorCode::ServerError`].
#[must_use]
pub fn classify_signaling_error(message: &str, code: Option<&str>) -> VoiceError {
    let text = match code {
        Some(code) => format!("{code} {message}").to_lowercase(),
        None => message.to_lowercase(),
    };

    let code = if contains_any(&text, NETWORK_INDICATORS) || text.contains("unavailable") {
        VoiceErrorCode::Unavailable
    } else {
        VoiceErrorCode::ServerError
    };

    VoiceError::new(code, message.to_string())
}
