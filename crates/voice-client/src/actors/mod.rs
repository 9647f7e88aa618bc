//! Actor implementations for the voice client.
//!
//! Two long-lived actors own all mutable voice state:
//!
//! - [`SignalingActor`] - channel membership, mute, roles, moderation
//! - [`ConnectionActor`] - SFU connection lifecycle, retries, playback sinks
//!
//! The signaling actor supervises the connection actor through its handle.
//! Handles are cheap to clone; dropping every handle (or cancelling the
//! shared token) stops the actors.

pub mod connection;
pub mod messages;
pub mod signaling;

pub use connection::{ConnectionActor, ConnectionActorHandle};
pub use messages::{ConnectionCommand, SignalingCommand};
pub use signaling::{SignalingActor, SignalingActorHandle};
