//! Pre-built server events for driving the signaling actor in tests.

use chrono::{Duration, Utc};
use secrecy::SecretString;
use voice_client::protocol::{
    ErrorNotice, ModerationKind, ModerationNotice, ParticipantWire, ServerEvent, SessionGrant,
    StateBroadcast, TransportGrant,
};

/// Builder for one participant entry in a state broadcast.
#[derive(Clone)]
pub struct TestParticipant {
    identity: String,
    display_name: Option<String>,
    muted: bool,
    server_muted: bool,
    role: Option<String>,
}

impl TestParticipant {
    /// Set the display name.
    #[must_use]
    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = Some(display_name.into());
        self
    }

    /// Mark the participant self-muted.
    #[must_use]
    pub fn muted(mut self) -> Self {
        self.muted = true;
        self
    }

    /// Mark the participant server-muted.
    #[must_use]
    pub fn server_muted(mut self) -> Self {
        self.server_muted = true;
        self
    }

    /// Set the wire role string.
    #[must_use]
    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }

    fn into_wire(self) -> ParticipantWire {
        ParticipantWire {
            identity: self.identity,
            display_name: self.display_name,
            muted: self.muted,
            server_muted: self.server_muted,
            role: self.role,
        }
    }
}

/// An unmuted listener with the given identity.
#[must_use]
pub fn participant(identity: impl Into<String>) -> TestParticipant {
    TestParticipant {
        identity: identity.into(),
        display_name: None,
        muted: false,
        server_muted: false,
        role: None,
    }
}

/// A `voice:state` broadcast carrying the given participants.
#[must_use]
pub fn state_event(participants: &[TestParticipant]) -> ServerEvent {
    ServerEvent::State(StateBroadcast {
        participants: participants
            .iter()
            .cloned()
            .map(TestParticipant::into_wire)
            .collect(),
    })
}

/// A `voice:error` notice.
#[must_use]
pub fn error_event(message: impl Into<String>, code: Option<&str>) -> ServerEvent {
    ServerEvent::Error(ErrorNotice {
        message: message.into(),
        code: code.map(ToString::to_string),
    })
}

/// A `voice:moderation` notice.
#[must_use]
pub fn moderation_event(
    kind: ModerationKind,
    channel_id: impl Into<String>,
    target_identity: Option<&str>,
    reason: Option<&str>,
) -> ServerEvent {
    ServerEvent::Moderation(ModerationNotice {
        kind,
        channel_id: channel_id.into(),
        target_identity: target_identity.map(ToString::to_string),
        reason: reason.map(ToString::to_string),
    })
}

/// A `voice:session` credential grant for the given channel and identity.
#[must_use]
pub fn session_event(channel_id: impl Into<String>, identity: impl Into<String>) -> ServerEvent {
    let channel_id = channel_id.into();
    let identity = identity.into();
    ServerEvent::Session(SessionGrant {
        session_id: uuid::Uuid::new_v4().to_string(),
        channel_id: channel_id.clone(),
        identity: identity.clone(),
        transport: TransportGrant {
            room_name: format!("sfu-{channel_id}"),
            identity,
            token: SecretString::from("test-token"),
            url: "wss://sfu.test.invalid".to_string(),
            expires_at: Utc::now() + Duration::hours(1),
        },
    })
}
