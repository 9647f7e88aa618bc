//! Seams to the external transports.
//!
//! The core consumes a signaling transport, an SFU connector, a capture
//! source, and an audio sink factory as trait objects. Concrete
//! implementations (a websocket client, a WebRTC/SFU SDK, a platform audio
//! element) live outside this crate; mocks live in `voice-test-utils`.
//!
//! The signaling transport handle is shared with other room features: this
//! core only emits on it and consumes its event stream, never closes it.
//! Likewise the capture stream is owned upstream and only read here.

use crate::protocol::{ClientEvent, SessionCredential};
use thiserror::Error;
use tokio::sync::mpsc;

/// Raw error from a transport boundary. The only error shape the classifier
/// accepts; normalized immediately on receipt.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct TransportError {
    /// Free-form message text.
    pub message: String,
    /// Structured code when the transport supplies one.
    pub code: Option<String>,
}

impl TransportError {
    /// Error from message text alone.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
        }
    }

    /// Error with a structured code.
    #[must_use]
    pub fn with_code(message: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: Some(code.into()),
        }
    }
}

/// Outbound side of the signaling transport.
#[async_trait::async_trait]
pub trait SignalingEmitter: Send + Sync {
    /// Whether the persistent signaling connection is currently up.
    fn is_connected(&self) -> bool;

    /// Emit an intent to the server.
    async fn emit(&self, event: ClientEvent) -> Result<(), TransportError>;
}

/// Media track kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    /// Audio track.
    Audio,
    /// Video track (ignored by this client).
    Video,
}

/// A remote track announced by the SFU.
#[derive(Debug, Clone)]
pub struct RemoteTrack {
    /// SFU track identifier, when available.
    pub track_id: Option<String>,
    /// Identity of the publishing participant.
    pub participant_identity: String,
    /// Track kind.
    pub kind: TrackKind,
    /// Whether this is the local participant's own track.
    pub is_local: bool,
}

impl RemoteTrack {
    /// Deterministic sink key: the track id, falling back to the participant
    /// identity when the SFU supplied none.
    #[must_use]
    pub fn sink_key(&self) -> String {
        self.track_id
            .clone()
            .unwrap_or_else(|| self.participant_identity.clone())
    }
}

/// Events surfaced by a live SFU session.
#[derive(Debug)]
pub enum SfuEvent {
    /// A remote track became available for subscription.
    TrackSubscribed(RemoteTrack),
    /// A remote track went away.
    TrackUnsubscribed {
        /// SFU track identifier, when available.
        track_id: Option<String>,
        /// Identity of the publishing participant.
        participant_identity: String,
    },
    /// The live session ended.
    Disconnected {
        /// Why the session ended.
        reason: DisconnectReason,
        /// Transport-supplied detail for logs.
        detail: String,
    },
}

/// Why a live session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The transport dropped unexpectedly.
    Unexpected,
    /// The same identity connected elsewhere and the SFU evicted this
    /// session.
    DuplicateIdentity,
}

/// Options for deriving the local audio track from the capture stream.
#[derive(Debug, Clone)]
pub struct AudioTrackOptions {
    /// Device to capture from, preserving the upstream selection.
    pub device_id: Option<String>,
    /// Echo cancellation (default: on).
    pub echo_cancellation: bool,
    /// Noise suppression (default: on).
    pub noise_suppression: bool,
    /// Automatic gain control (default: on).
    pub auto_gain_control: bool,
}

impl Default for AudioTrackOptions {
    fn default() -> Self {
        Self {
            device_id: None,
            echo_cancellation: true,
            noise_suppression: true,
            auto_gain_control: true,
        }
    }
}

/// A published or publishable local audio track.
#[async_trait::async_trait]
pub trait LocalAudioTrack: Send {
    /// Stop the track and release its capture resources.
    async fn stop(&mut self);
}

/// Upstream producer of the microphone capture stream.
///
/// Owned by an external collaborator; this core derives tracks from it but
/// never stops the underlying stream.
#[async_trait::async_trait]
pub trait CaptureSource: Send + Sync {
    /// Device the capture stream was opened on, if known.
    fn device_id(&self) -> Option<String>;

    /// Derive a local audio track honoring the given options.
    async fn create_audio_track(
        &self,
        options: AudioTrackOptions,
    ) -> Result<Box<dyn LocalAudioTrack>, TransportError>;
}

/// A live connection to the SFU.
#[async_trait::async_trait]
pub trait SfuSession: Send {
    /// Publish the local audio track.
    async fn publish(&mut self, track: Box<dyn LocalAudioTrack>) -> Result<(), TransportError>;

    /// Take the session's event stream. Yields `None` after the first call.
    fn take_events(&mut self) -> Option<mpsc::Receiver<SfuEvent>>;

    /// Tear down the transport and stop any published track. Idempotent.
    async fn disconnect(&mut self);
}

/// Establishes SFU sessions from credentials.
#[async_trait::async_trait]
pub trait SfuConnector: Send + Sync {
    /// Open a session using the given credential.
    async fn connect(
        &self,
        credential: &SessionCredential,
    ) -> Result<Box<dyn SfuSession>, TransportError>;
}

/// Playback start was rejected by the platform's autoplay policy.
///
/// Not a connection error: playback can be resumed later from a user gesture.
#[derive(Debug, Clone, Copy, Error)]
#[error("playback blocked by autoplay policy")]
pub struct PlaybackBlocked;

/// A local playback sink for one remote audio track.
#[async_trait::async_trait]
pub trait AudioSink: Send {
    /// Attempt to start playback.
    async fn play(&mut self) -> Result<(), PlaybackBlocked>;

    /// Detach the track and release the output handle. Idempotent.
    fn detach(&mut self);
}

/// Creates playback sinks for remote audio tracks.
///
/// The concrete sink (platform audio element, native renderer) is an
/// implementation detail behind this seam.
pub trait AudioSinkFactory: Send + Sync {
    /// Attach a sink for the given track, marked for autoplay and unmuted.
    fn attach(&self, track: &RemoteTrack) -> Box<dyn AudioSink>;
}
