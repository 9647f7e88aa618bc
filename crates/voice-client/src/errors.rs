//! Voice client error types.
//!
//! Raw failures from the signaling transport and the SFU are normalized at the
//! boundary into a closed taxonomy ([`VoiceErrorCode`]) carried by
//! [`VoiceError`]. Technical detail stays in `technical_message` (logged,
//! never shown); `user_message` is always one of a fixed set of client-safe
//! sentences. Nothing downstream inspects raw error shapes again.

use thiserror::Error;

/// Closed error taxonomy for both layers of the voice stack.
///
/// Exactly one error per layer is active at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceErrorCode {
    /// Signaling transport is down or not yet connected.
    Unavailable,
    /// Voice backend unreachable after exhausting retries.
    ServiceUnavailable,
    /// No authoritative state confirmed the join in time.
    JoinTimeout,
    /// A moderator muted this participant.
    ServerMuted,
    /// A moderator removed this participant.
    Kicked,
    /// Signaling server reported an error.
    ServerError,
    /// Local identity is not known; cannot join.
    InvalidIdentity,

    /// SFU rejected the session credential.
    AuthFailed,
    /// SFU endpoint unreachable (network-class failure).
    NetworkUnavailable,
    /// Any other SFU connection failure.
    ConnectionFailed,
}

impl VoiceErrorCode {
    /// Whether the "unavailable" class applies.
    ///
    /// These take display priority over a simultaneous SFU-layer error.
    #[must_use]
    pub fn is_unavailable_class(self) -> bool {
        matches!(
            self,
            VoiceErrorCode::Unavailable | VoiceErrorCode::ServiceUnavailable
        )
    }

    /// Default retryability for this code.
    #[must_use]
    pub fn retryable(self) -> bool {
        match self {
            VoiceErrorCode::Unavailable
            | VoiceErrorCode::ServiceUnavailable
            | VoiceErrorCode::JoinTimeout
            | VoiceErrorCode::ServerError
            | VoiceErrorCode::NetworkUnavailable
            | VoiceErrorCode::ConnectionFailed => true,
            VoiceErrorCode::ServerMuted
            | VoiceErrorCode::Kicked
            | VoiceErrorCode::InvalidIdentity
            | VoiceErrorCode::AuthFailed => false,
        }
    }

    /// Client-safe sentence for this code (no internal details).
    #[must_use]
    pub fn user_message(self) -> &'static str {
        match self {
            VoiceErrorCode::Unavailable => "Voice chat is unavailable right now.",
            VoiceErrorCode::ServiceUnavailable => {
                "The voice service is unavailable. Please try again later."
            }
            VoiceErrorCode::JoinTimeout => "Joining voice timed out. Please try again.",
            VoiceErrorCode::ServerMuted => "You have been muted by a host.",
            VoiceErrorCode::Kicked => "You have been removed from the voice channel.",
            VoiceErrorCode::ServerError => "Something went wrong with voice chat.",
            VoiceErrorCode::InvalidIdentity => "Your identity could not be verified.",
            VoiceErrorCode::AuthFailed => "Voice session expired. Please rejoin the channel.",
            VoiceErrorCode::NetworkUnavailable => {
                "The voice service is unavailable. Check your network and try again."
            }
            VoiceErrorCode::ConnectionFailed => {
                "Could not connect to voice. Please try again."
            }
        }
    }
}

/// A classified voice error.
///
/// `user_message` is what the surrounding application shows;
/// `technical_message` is logged server-side detail only.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{code:?}: {technical_message}")]
pub struct VoiceError {
    /// Taxonomy code.
    pub code: VoiceErrorCode,
    /// Raw detail for logs, never displayed.
    pub technical_message: String,
    /// Client-safe message for display.
    pub user_message: String,
    /// Whether a retry (manual or automatic) can succeed.
    pub retryable: bool,
}

impl VoiceError {
    /// Build an error with the code's default user message and retryability.
    #[must_use]
    pub fn new(code: VoiceErrorCode, technical_message: impl Into<String>) -> Self {
        Self {
            code,
            technical_message: technical_message.into(),
            user_message: code.user_message().to_string(),
            retryable: code.retryable(),
        }
    }

    /// Kick error carrying the server-supplied reason as the displayed
    /// message, falling back to the generic sentence.
    #[must_use]
    pub fn kicked(reason: Option<String>) -> Self {
        let user_message =
            reason.unwrap_or_else(|| VoiceErrorCode::Kicked.user_message().to_string());
        Self {
            code: VoiceErrorCode::Kicked,
            technical_message: format!("kicked from channel: {user_message}"),
            user_message,
            retryable: false,
        }
    }
}

/// Pick the error to display when both layers report one simultaneously.
///
/// A new error of either layer supersedes the previous one, but the signaling
/// layer's unavailable class always outranks an SFU-layer error: there is no
/// point surfacing a media failure while signaling itself is down.
#[must_use]
pub fn display_error<'a>(
    signaling: Option<&'a VoiceError>,
    sfu: Option<&'a VoiceError>,
) -> Option<&'a VoiceError> {
    match (signaling, sfu) {
        (Some(sig), Some(_)) if sig.code.is_unavailable_class() => Some(sig),
        (Some(sig), None) => Some(sig),
        (_, Some(media)) => Some(media),
        (None, None) => None,
    }
}

/// Internal actor plumbing failure (mailbox closed, response dropped).
///
/// Distinct from [`VoiceError`]: this is a bug or shutdown race, not a
/// user-visible voice condition.
#[derive(Debug, Error)]
pub enum ActorError {
    /// The actor's mailbox was closed before the message was delivered.
    #[error("voice actor mailbox closed: {0}")]
    MailboxClosed(&'static str),

    /// The actor dropped the response channel without answering.
    #[error("voice actor dropped response: {0}")]
    ResponseDropped(&'static str),
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_retryability_mapping() {
        assert!(VoiceErrorCode::Unavailable.retryable());
        assert!(VoiceErrorCode::JoinTimeout.retryable());
        assert!(VoiceErrorCode::NetworkUnavailable.retryable());
        assert!(VoiceErrorCode::ConnectionFailed.retryable());
        assert!(!VoiceErrorCode::AuthFailed.retryable());
        assert!(!VoiceErrorCode::Kicked.retryable());
        assert!(!VoiceErrorCode::ServerMuted.retryable());
        assert!(!VoiceErrorCode::InvalidIdentity.retryable());
    }

    #[test]
    fn test_user_messages_hide_technical_detail() {
        let err = VoiceError::new(
            VoiceErrorCode::ConnectionFailed,
            "ICE gathering failed at 10.0.0.3:3478",
        );
        assert!(!err.user_message.contains("10.0.0.3"));
        assert_eq!(err.user_message, VoiceErrorCode::ConnectionFailed.user_message());
    }

    #[test]
    fn test_kicked_uses_server_reason() {
        let err = VoiceError::kicked(Some("spam".to_string()));
        assert_eq!(err.user_message, "spam");
        assert!(!err.retryable);

        let fallback = VoiceError::kicked(None);
        assert_eq!(fallback.user_message, VoiceErrorCode::Kicked.user_message());
    }

    #[test]
    fn test_display_priority_unavailable_beats_sfu() {
        let sig = VoiceError::new(VoiceErrorCode::Unavailable, "socket closed");
        let media = VoiceError::new(VoiceErrorCode::ConnectionFailed, "handshake failed");

        let shown = display_error(Some(&sig), Some(&media)).unwrap();
        assert_eq!(shown.code, VoiceErrorCode::Unavailable);
    }

    #[test]
    fn test_display_priority_sfu_beats_informational_signaling() {
        let sig = VoiceError::new(VoiceErrorCode::ServerMuted, "host muted");
        let media = VoiceError::new(VoiceErrorCode::ConnectionFailed, "handshake failed");

        let shown = display_error(Some(&sig), Some(&media)).unwrap();
        assert_eq!(shown.code, VoiceErrorCode::ConnectionFailed);
    }

    #[test]
    fn test_display_single_layer() {
        let sig = VoiceError::new(VoiceErrorCode::JoinTimeout, "timer fired");
        assert_eq!(display_error(Some(&sig), None).unwrap().code, VoiceErrorCode::JoinTimeout);

        let media = VoiceError::new(VoiceErrorCode::AuthFailed, "401");
        assert_eq!(display_error(None, Some(&media)).unwrap().code, VoiceErrorCode::AuthFailed);

        assert!(display_error(None, None).is_none());
    }
}
