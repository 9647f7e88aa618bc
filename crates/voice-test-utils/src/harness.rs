//! A fully wired voice channel over the mock transports.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use voice_client::channel::{VoiceChannel, VoiceChannelHandle};
use voice_client::config::VoiceConfig;
use voice_client::protocol::ServerEvent;
use voice_client::state::VoiceSnapshot;

use crate::fixtures::{participant, state_event, TestParticipant};
use crate::mock_sfu::MockConnector;
use crate::mock_signaling::MockEmitter;
use crate::mock_sinks::MockSinkFactory;

/// Default channel id used by [`VoiceHarness::spawn_default`].
pub const TEST_CHANNEL: &str = "room-1";
/// Default local identity used by [`VoiceHarness::spawn_default`].
pub const TEST_IDENTITY: &str = "alice";

/// A spawned voice channel with every seam mocked.
pub struct VoiceHarness {
    /// The application handle under test.
    pub handle: VoiceChannelHandle,
    /// The mock signaling emitter (records outbound intents).
    pub emitter: Arc<MockEmitter>,
    /// The scriptable mock SFU connector.
    pub connector: Arc<MockConnector>,
    /// The mock playback sink factory.
    pub sinks: Arc<MockSinkFactory>,
    /// The configuration the channel was spawned with.
    pub config: VoiceConfig,
    events_tx: mpsc::Sender<ServerEvent>,
}

impl VoiceHarness {
    /// Spawn a voice channel over fresh mocks with the given configuration.
    #[must_use]
    pub fn spawn(config: VoiceConfig) -> Self {
        let emitter = Arc::new(MockEmitter::new());
        let connector = Arc::new(MockConnector::new());
        let sinks = Arc::new(MockSinkFactory::new());
        let (events_tx, events_rx) = mpsc::channel(16);

        let handle = VoiceChannel::spawn(
            config.clone(),
            Arc::clone(&emitter) as _,
            Arc::clone(&connector) as _,
            Arc::clone(&sinks) as _,
            events_rx,
        );

        Self {
            handle,
            emitter,
            connector,
            sinks,
            config,
            events_tx,
        }
    }

    /// Spawn with the default test channel and identity.
    #[must_use]
    pub fn spawn_default() -> Self {
        Self::spawn(VoiceConfig::new(TEST_CHANNEL, TEST_IDENTITY))
    }

    /// Deliver a server event to the signaling actor.
    ///
    /// # Panics
    ///
    /// Panics if the inbound event stream was dropped.
    pub async fn send(&self, event: ServerEvent) {
        self.events_tx
            .send(event)
            .await
            .expect("inbound event stream dropped");
    }

    /// Emit a join intent and confirm it with a state broadcast naming the
    /// local identity plus the given other participants.
    ///
    /// # Panics
    ///
    /// Panics if the join does not confirm.
    pub async fn join_confirmed(&self, others: &[TestParticipant]) {
        self.handle.join().await.expect("join send failed");
        // The broadcast only confirms once the join intent has been
        // processed; before that the actor discards state events
        self.wait_for(|s| s.joining)
            .await
            .expect("join intent not processed");
        let mut participants = vec![participant(TEST_IDENTITY)];
        participants.extend_from_slice(others);
        self.send(state_event(&participants)).await;
        self.wait_for(|s| s.joined).await.expect("join should confirm");
    }

    /// Wait until the merged snapshot satisfies the predicate.
    ///
    /// Returns `None` if it never does within the (paused-time) timeout.
    pub async fn wait_for(
        &self,
        mut predicate: impl FnMut(&VoiceSnapshot) -> bool,
    ) -> Option<VoiceSnapshot> {
        let mut rx = self.handle.watch();
        tokio::time::timeout(Duration::from_secs(60), async move {
            loop {
                let snapshot = rx.borrow_and_update().clone();
                if predicate(&snapshot) {
                    return snapshot;
                }
                if rx.changed().await.is_err() {
                    // Channel closed without satisfying the predicate
                    std::future::pending::<()>().await;
                }
            }
        })
        .await
        .ok()
    }

    /// Let the actors drain their mailboxes without advancing time.
    pub async fn settle(&self) {
        for _ in 0..64 {
            tokio::task::yield_now().await;
        }
    }
}
