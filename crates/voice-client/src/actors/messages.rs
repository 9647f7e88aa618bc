//! Message types for actor communication.
//!
//! All inter-actor communication uses strongly-typed message passing via
//! `tokio::sync::mpsc`. Request-reply uses `tokio::sync::oneshot`.

use crate::protocol::SessionCredential;
use crate::transport::CaptureSource;
use std::sync::Arc;
use tokio::sync::oneshot;

/// User-triggered commands for the `SignalingActor`.
#[derive(Debug)]
pub enum SignalingCommand {
    /// Join the voice channel. Idempotent while Joining/Joined.
    RequestJoin,
    /// Leave the voice channel (optimistic, no server confirmation awaited).
    RequestLeave,
    /// Flip the local mute flag. Silent no-op while server-muted.
    ToggleMute,
    /// Host: apply a server-enforced mute to a participant.
    HostMute {
        /// Participant to mute.
        target_identity: String,
    },
    /// Host: lift a server-enforced mute.
    HostUnmute {
        /// Participant to unmute.
        target_identity: String,
    },
    /// Host: remove a participant from the channel.
    HostKick {
        /// Participant to remove.
        target_identity: String,
    },
    /// Clear the active signaling-layer error.
    ClearError,
}

/// Commands for the `ConnectionActor`.
pub enum ConnectionCommand {
    /// Membership half of the "should be connected" signal.
    SetJoined(bool),
    /// Supply or revoke the capture stream handle.
    SetCapture(Option<Arc<dyn CaptureSource>>),
    /// Deliver a session credential. The latest one wins.
    SetCredential(Box<SessionCredential>),
    /// Manual retry after the automatic budget is exhausted.
    Retry,
    /// Resume autoplay-blocked sinks from a user gesture.
    StartAudio {
        /// Answers true when no sink remains blocked.
        respond_to: oneshot::Sender<bool>,
    },
}
