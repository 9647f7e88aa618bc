//! Observable state snapshots.
//!
//! Each actor publishes its state through a `tokio::sync::watch` channel as a
//! cheap-to-clone snapshot struct. The channel facade merges the two layers
//! into one [`VoiceSnapshot`] for the surrounding application.

use crate::errors::{display_error, VoiceError, VoiceErrorCode};
use crate::protocol::Role;

/// A voice channel participant, derived wholesale from the latest
/// authoritative broadcast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Participant {
    /// Stable identity.
    pub identity: String,
    /// Display name (identity fallback).
    pub display_name: String,
    /// Self-mute flag.
    pub local_muted: bool,
    /// Server-enforced mute flag.
    pub server_muted: bool,
    /// Channel role.
    pub role: Role,
    /// Whether this entry is the local participant.
    pub is_self: bool,
}

/// Signaling state machine phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SignalingPhase {
    /// Not in the channel.
    #[default]
    NotJoined,
    /// Join intent emitted, awaiting authoritative confirmation.
    Joining,
    /// Confirmed member of the channel.
    Joined,
}

/// Snapshot of the signaling layer.
#[derive(Debug, Clone, Default)]
pub struct SignalingSnapshot {
    /// Current phase.
    pub phase: SignalingPhase,
    /// Latest authoritative participant list.
    pub participants: Vec<Participant>,
    /// Local self-mute flag (optimistic until the next broadcast).
    pub local_muted: bool,
    /// Server-enforced mute on the local participant.
    pub server_muted: bool,
    /// Local participant role.
    pub role: Role,
    /// Active signaling-layer error, if any.
    pub error: Option<VoiceError>,
}

/// SFU connection lifecycle state. Exactly one value at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// No connection wanted or established.
    #[default]
    Idle,
    /// First handshake of a cycle in flight.
    Connecting,
    /// Live transport with the local track published.
    Connected,
    /// Recovering from a failure; automatic retries pending.
    Reconnecting,
    /// Automatic retries exhausted (or not applicable).
    Failed(VoiceErrorCode),
}

/// Snapshot of the connection layer.
#[derive(Debug, Clone, Default)]
pub struct ConnectionSnapshot {
    /// Lifecycle state.
    pub state: ConnectionState,
    /// Active SFU-layer error, if any.
    pub error: Option<VoiceError>,
    /// Remote audio waiting on a user gesture to start.
    pub audio_blocked: bool,
}

/// Merged view exposed to the surrounding application.
#[derive(Debug, Clone, Default)]
pub struct VoiceSnapshot {
    /// Latest authoritative participant list.
    pub participants: Vec<Participant>,
    /// Confirmed channel member.
    pub joined: bool,
    /// Join in progress.
    pub joining: bool,
    /// Media transport live.
    pub connected: bool,
    /// Media transport recovering.
    pub reconnecting: bool,
    /// Local self-mute flag.
    pub local_muted: bool,
    /// Server-enforced mute on the local participant.
    pub server_muted: bool,
    /// Local participant role.
    pub role: Role,
    /// Remote audio waiting on a user gesture.
    pub audio_blocked: bool,
    /// The one error currently worth displaying, if any.
    pub error: Option<VoiceError>,
}

/// Merge the two layer snapshots. Pure; display priority per the error rules.
#[must_use]
pub fn merge_snapshots(
    signaling: &SignalingSnapshot,
    connection: &ConnectionSnapshot,
) -> VoiceSnapshot {
    VoiceSnapshot {
        participants: signaling.participants.clone(),
        joined: signaling.phase == SignalingPhase::Joined,
        joining: signaling.phase == SignalingPhase::Joining,
        connected: connection.state == ConnectionState::Connected,
        reconnecting: connection.state == ConnectionState::Reconnecting,
        local_muted: signaling.local_muted,
        server_muted: signaling.server_muted,
        role: signaling.role,
        audio_blocked: connection.audio_blocked,
        error: display_error(signaling.error.as_ref(), connection.error.as_ref()).cloned(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_phase_booleans() {
        let mut signaling = SignalingSnapshot::default();
        let connection = ConnectionSnapshot::default();

        let merged = merge_snapshots(&signaling, &connection);
        assert!(!merged.joined);
        assert!(!merged.joining);

        signaling.phase = SignalingPhase::Joining;
        assert!(merge_snapshots(&signaling, &connection).joining);

        signaling.phase = SignalingPhase::Joined;
        let merged = merge_snapshots(&signaling, &connection);
        assert!(merged.joined);
        assert!(!merged.joining);
    }

    #[test]
    fn test_merge_connection_booleans() {
        let signaling = SignalingSnapshot::default();
        let mut connection = ConnectionSnapshot::default();

        connection.state = ConnectionState::Connected;
        assert!(merge_snapshots(&signaling, &connection).connected);

        connection.state = ConnectionState::Reconnecting;
        let merged = merge_snapshots(&signaling, &connection);
        assert!(merged.reconnecting);
        assert!(!merged.connected);
    }

    #[test]
    fn test_merge_error_priority() {
        let mut signaling = SignalingSnapshot::default();
        let mut connection = ConnectionSnapshot::default();

        signaling.error = Some(VoiceError::new(VoiceErrorCode::Unavailable, "socket down"));
        connection.error = Some(VoiceError::new(VoiceErrorCode::AuthFailed, "401"));

        let merged = merge_snapshots(&signaling, &connection);
        assert_eq!(merged.error.unwrap().code, VoiceErrorCode::Unavailable);

        signaling.error = Some(VoiceError::new(VoiceErrorCode::ServerMuted, "muted"));
        let merged = merge_snapshots(&signaling, &connection);
        assert_eq!(merged.error.unwrap().code, VoiceErrorCode::AuthFailed);
    }
}
