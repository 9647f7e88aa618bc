//! # Voice Test Utilities
//!
//! Shared test utilities for the voice client.
//!
//! This crate provides mock implementations of the transport seams so the
//! actors can be tested in isolation, without a real signaling socket, SFU,
//! microphone, or audio output.
//!
//! ## Modules
//!
//! - `mock_signaling` - Mock signaling emitter recording outbound intents
//! - `mock_sfu` - Scriptable SFU connector, sessions, and capture source
//! - `mock_sinks` - Playback sink factory with per-sink probes
//! - `fixtures` - Pre-built server events (state, session, moderation)
//! - `harness` - A fully wired voice channel over the mocks
//!
//! ## Usage
//!
//! ```rust,ignore
//! use voice_test_utils::*;
//!
//! #[tokio::test(start_paused = true)]
//! async fn test_example() {
//!     let harness = VoiceHarness::spawn_default();
//!
//!     harness.handle.join().await.unwrap();
//!     harness.send(state_event(&[participant("alice")])).await;
//!
//!     let snapshot = harness
//!         .wait_for(|s| s.joined)
//!         .await
//!         .expect("join should confirm");
//!     assert!(snapshot.joined);
//! }
//! ```

pub mod fixtures;
pub mod harness;
pub mod mock_sfu;
pub mod mock_signaling;
pub mod mock_sinks;

pub use fixtures::{
    error_event, moderation_event, participant, session_event, state_event, TestParticipant,
};
pub use harness::VoiceHarness;
pub use mock_sfu::{MockCapture, MockConnector, MockSessionState};
pub use mock_signaling::MockEmitter;
pub use mock_sinks::{MockSinkFactory, SinkProbe};
