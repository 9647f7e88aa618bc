//! Waveroom Voice Client Library
//!
//! This library provides the voice-chat connection manager for Waveroom
//! listening rooms - a dual-layer client that coordinates:
//!
//! - Voice channel membership, mute state, roles, and moderation over the
//!   room's signaling transport
//! - The SFU media connection lifecycle: session credentials, local track
//!   publication, remote playback sinks, and bounded reconnection
//!
//! # Architecture
//!
//! The client uses an actor model hierarchy:
//!
//! ```text
//! VoiceChannel (facade, one per joined room)
//! ├── SignalingActor (membership state machine)
//! │   ├── owns participant/mute/role/moderation state
//! │   └── supervises the ConnectionActor (enable, credential, disable)
//! └── ConnectionActor (media lifecycle)
//!     ├── owns the SFU session and reconnect policy
//!     └── owns the playback sink registry
//! ```
//!
//! # Key Design Decisions
//!
//! - **Server-authoritative membership**: every `voice:state` broadcast
//!   replaces local participant state wholesale; intents are optimistic
//! - **Connect when wanted**: the media connection follows a single derived
//!   signal (membership confirmed AND capture present AND credential held)
//! - **Epoch-tagged attempts**: results of connection attempts that outlive a
//!   teardown are released, never applied
//! - **Bounded recovery**: exponential backoff with a hard attempt budget;
//!   credential rejections are never retried automatically
//!
//! # Modules
//!
//! - [`channel`] - the public `VoiceChannel` facade
//! - [`actors`] - signaling and connection actor implementations
//! - [`protocol`] - wire-level signaling event types
//! - [`transport`] - seams for the signaling emitter, SFU, capture, playback
//! - [`errors`] - error taxonomy and display priority
//! - [`classify`] - raw transport error classification
//! - [`sinks`] - playback sink registry
//! - [`state`] - observable snapshots
//! - [`config`] - voice configuration

pub mod actors;
pub mod channel;
pub mod classify;
pub mod config;
pub mod errors;
pub mod protocol;
pub mod sinks;
pub mod state;
pub mod transport;

pub use channel::{VoiceChannel, VoiceChannelHandle};
pub use config::VoiceConfig;
pub use errors::{VoiceError, VoiceErrorCode};
pub use protocol::{ClientEvent, Role, ServerEvent, SessionCredential};
pub use state::{Participant, VoiceSnapshot};
