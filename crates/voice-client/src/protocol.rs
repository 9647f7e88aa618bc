//! Wire protocol for the voice signaling channel.
//!
//! The signaling transport is a persistent bidirectional connection carrying
//! named JSON events. Outbound intents are [`ClientEvent`] values; inbound
//! authoritative state, moderation actions, errors, and session grants arrive
//! as [`ServerEvent`] values. Everything is externally tagged with the literal
//! `voice:*` event name and camelCase payload fields so the Rust types map 1:1
//! onto the server's wire format.

use chrono::{DateTime, Utc};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};

/// Participant role within a voice channel.
///
/// Hosts and cohosts may issue moderation intents. Unknown or absent role
/// strings from the server fall back to [`Role::Listener`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Channel owner.
    Host,
    /// Delegated moderator.
    Cohost,
    /// Active speaker.
    Speaker,
    /// Listen-only participant.
    #[default]
    Listener,
}

impl Role {
    /// Parse a wire role string, defaulting unknown values to listener.
    #[must_use]
    pub fn from_wire(value: Option<&str>) -> Self {
        match value {
            Some("host") => Role::Host,
            Some("cohost") => Role::Cohost,
            Some("speaker") => Role::Speaker,
            _ => Role::Listener,
        }
    }

    /// Whether this role may issue host moderation intents.
    #[must_use]
    pub fn can_moderate(self) -> bool {
        matches!(self, Role::Host | Role::Cohost)
    }
}

/// Outbound signaling intents emitted by the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", content = "data")]
pub enum ClientEvent {
    /// Request to join the voice channel.
    #[serde(rename = "voice:join", rename_all = "camelCase")]
    Join { channel_id: String },

    /// Request to leave the voice channel.
    #[serde(rename = "voice:leave", rename_all = "camelCase")]
    Leave { channel_id: String },

    /// Self-mute toggle (optimistic; server echoes authoritative state).
    #[serde(rename = "voice:mute", rename_all = "camelCase")]
    Mute { channel_id: String, muted: bool },

    /// Host mutes a participant (enforced by the server).
    #[serde(rename = "voice:host-mute", rename_all = "camelCase")]
    HostMute {
        channel_id: String,
        target_identity: String,
    },

    /// Host lifts a server-enforced mute.
    #[serde(rename = "voice:host-unmute", rename_all = "camelCase")]
    HostUnmute {
        channel_id: String,
        target_identity: String,
    },

    /// Host removes a participant from the channel.
    #[serde(rename = "voice:host-kick", rename_all = "camelCase")]
    HostKick {
        channel_id: String,
        target_identity: String,
    },
}

/// Inbound signaling events broadcast by the server.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    /// Authoritative channel membership and mute state.
    #[serde(rename = "voice:state")]
    State(StateBroadcast),

    /// Transport-level error report.
    #[serde(rename = "voice:error")]
    Error(ErrorNotice),

    /// Server-initiated moderation action.
    #[serde(rename = "voice:moderation")]
    Moderation(ModerationNotice),

    /// Session credential grant for the media transport.
    #[serde(rename = "voice:session")]
    Session(SessionGrant),
}

/// Authoritative participant list. Replaces local state wholesale on arrival.
#[derive(Debug, Clone, Deserialize)]
pub struct StateBroadcast {
    /// All participants currently in the channel.
    pub participants: Vec<ParticipantWire>,
}

/// A single participant entry in a state broadcast.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantWire {
    /// Stable participant identity.
    pub identity: String,
    /// Optional display name; falls back to the identity.
    #[serde(default)]
    pub display_name: Option<String>,
    /// Self-mute flag.
    #[serde(default)]
    pub muted: bool,
    /// Server-enforced mute flag.
    #[serde(default)]
    pub server_muted: bool,
    /// Role string; unknown values default to listener.
    #[serde(default)]
    pub role: Option<String>,
}

/// Error payload from the signaling server.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorNotice {
    /// Raw error message (logged, never shown to the user).
    pub message: String,
    /// Optional structured error code.
    #[serde(default)]
    pub code: Option<String>,
}

/// Moderation action kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ModerationKind {
    /// Server-enforced mute applied.
    ServerMute,
    /// Server-enforced mute lifted.
    ServerUnmute,
    /// Participant removed from the channel.
    Kick,
}

/// Server-initiated moderation notice.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModerationNotice {
    /// What the server did.
    #[serde(rename = "type")]
    pub kind: ModerationKind,
    /// Channel the action applies to.
    pub channel_id: String,
    /// Target participant; absent means the receiving client.
    #[serde(default)]
    pub target_identity: Option<String>,
    /// Human-readable reason supplied by the moderator.
    #[serde(default)]
    pub reason: Option<String>,
}

/// Session credential grant for one media connection cycle.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionGrant {
    /// Server-assigned session identifier.
    pub session_id: String,
    /// Channel this grant belongs to; mismatches are ignored.
    pub channel_id: String,
    /// Identity the grant was issued for.
    pub identity: String,
    /// Media transport connection details.
    pub transport: TransportGrant,
}

/// Media transport connection details within a [`SessionGrant`].
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransportGrant {
    /// SFU room to connect to.
    pub room_name: String,
    /// Identity to present to the SFU.
    pub identity: String,
    /// Access token. Redacted in Debug output, zeroized on drop.
    pub token: SecretString,
    /// SFU endpoint URL.
    pub url: String,
    /// Token expiry.
    pub expires_at: DateTime<Utc>,
}

/// Credential owned by the connection lifecycle manager for the lifetime of
/// one connection attempt cycle (including its retries).
///
/// The most recently received credential always supersedes an older one.
#[derive(Debug, Clone)]
pub struct SessionCredential {
    /// Server-assigned session identifier.
    pub session_id: String,
    /// Channel this credential belongs to.
    pub channel_id: String,
    /// Identity the credential was issued for.
    pub identity: String,
    /// SFU room name.
    pub room_name: String,
    /// Access token for the SFU handshake.
    pub token: SecretString,
    /// SFU endpoint URL.
    pub url: String,
    /// Token expiry.
    pub expires_at: DateTime<Utc>,
}

impl From<SessionGrant> for SessionCredential {
    fn from(grant: SessionGrant) -> Self {
        Self {
            session_id: grant.session_id,
            channel_id: grant.channel_id,
            identity: grant.identity,
            room_name: grant.transport.room_name,
            token: grant.transport.token,
            url: grant.transport.url,
            expires_at: grant.transport.expires_at,
        }
    }
}
