//! `ConnectionActor` - SFU connection lifecycle manager.
//!
//! Owns the media transport for one voice channel:
//! - Connects to the SFU once membership is confirmed, a capture stream is
//!   present, and a session credential has arrived (latest credential wins)
//! - Publishes the local audio track derived from the capture stream
//! - Delegates remote audio tracks to the playback sink registry
//! - Recovers from unexpected disconnects with bounded exponential backoff
//!
//! # Lifecycle
//!
//! Idle -> Connecting -> Connected -> Reconnecting -> Failed, with any state
//! dropping back to Idle the moment the channel no longer wants a connection
//! (leave, kick, membership loss, capture revoked).
//!
//! # Staleness
//!
//! Connection attempts run as spawned subtasks tagged with an epoch. Teardown
//! bumps the epoch and cancels the attempt token; a result that arrives with
//! a stale epoch is actively released (session disconnected, track stopped),
//! never applied.

use crate::classify::classify_sfu_error;
use crate::config::VoiceConfig;
use crate::errors::{ActorError, VoiceError, VoiceErrorCode};
use crate::protocol::SessionCredential;
use crate::sinks::PlaybackSinkRegistry;
use crate::state::{ConnectionSnapshot, ConnectionState};
use crate::transport::{
    AudioSinkFactory, AudioTrackOptions, CaptureSource, DisconnectReason, SfuConnector, SfuEvent,
    SfuSession, TransportError,
};

use super::messages::ConnectionCommand;

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Outcome of one connection attempt subtask.
enum AttemptOutcome {
    /// Handshake and publish succeeded.
    Established {
        session: Box<dyn SfuSession>,
        events: Option<mpsc::Receiver<SfuEvent>>,
    },
    /// Handshake or publish failed; raw error awaiting classification.
    Failed(TransportError),
    /// The attempt observed its cancellation token and released everything.
    Aborted,
}

/// Attempt result tagged with the epoch it was started under.
struct AttemptResult {
    epoch: u64,
    outcome: AttemptOutcome,
}

/// Handle to a `ConnectionActor`.
#[derive(Clone)]
pub struct ConnectionActorHandle {
    sender: mpsc::Sender<ConnectionCommand>,
    cancel_token: CancellationToken,
    state_rx: watch::Receiver<ConnectionSnapshot>,
}

impl ConnectionActorHandle {
    /// Current connection snapshot.
    #[must_use]
    pub fn state(&self) -> ConnectionSnapshot {
        self.state_rx.borrow().clone()
    }

    /// Watch the connection snapshot for changes.
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<ConnectionSnapshot> {
        self.state_rx.clone()
    }

    /// Update the membership half of the "should be connected" signal.
    pub async fn set_joined(&self, joined: bool) -> Result<(), ActorError> {
        self.sender
            .send(ConnectionCommand::SetJoined(joined))
            .await
            .map_err(|_| ActorError::MailboxClosed("connection.set_joined"))
    }

    /// Supply or revoke the capture stream handle.
    pub async fn set_capture(
        &self,
        capture: Option<Arc<dyn CaptureSource>>,
    ) -> Result<(), ActorError> {
        self.sender
            .send(ConnectionCommand::SetCapture(capture))
            .await
            .map_err(|_| ActorError::MailboxClosed("connection.set_capture"))
    }

    /// Deliver a session credential (latest one wins).
    pub async fn set_credential(&self, credential: SessionCredential) -> Result<(), ActorError> {
        self.sender
            .send(ConnectionCommand::SetCredential(Box::new(credential)))
            .await
            .map_err(|_| ActorError::MailboxClosed("connection.set_credential"))
    }

    /// Manually retry after the automatic budget is exhausted.
    pub async fn retry(&self) -> Result<(), ActorError> {
        self.sender
            .send(ConnectionCommand::Retry)
            .await
            .map_err(|_| ActorError::MailboxClosed("connection.retry"))
    }

    /// Resume playback blocked by the autoplay policy (from a user gesture).
    ///
    /// Returns true when no sink remains blocked afterwards.
    pub async fn start_audio(&self) -> Result<bool, ActorError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.sender
            .send(ConnectionCommand::StartAudio { respond_to: tx })
            .await
            .map_err(|_| ActorError::MailboxClosed("connection.start_audio"))?;
        rx.await
            .map_err(|_| ActorError::ResponseDropped("connection.start_audio"))
    }

    /// Cancel the connection actor.
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    /// Check if the actor is cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }
}

/// The `ConnectionActor` implementation.
pub struct ConnectionActor {
    /// Voice configuration (backoff policy, channel id).
    config: VoiceConfig,
    /// SFU connector seam.
    connector: Arc<dyn SfuConnector>,
    /// Command receiver.
    receiver: mpsc::Receiver<ConnectionCommand>,
    /// Cancellation token (child of the channel's token).
    cancel_token: CancellationToken,
    /// Snapshot publisher.
    state_tx: watch::Sender<ConnectionSnapshot>,
    /// Attempt subtask result channel.
    attempt_tx: mpsc::Sender<AttemptResult>,
    attempt_rx: mpsc::Receiver<AttemptResult>,
    /// Playback sinks for the current session.
    sinks: PlaybackSinkRegistry,
    /// Membership half of "should be connected".
    joined: bool,
    /// Capture half of "should be connected".
    capture: Option<Arc<dyn CaptureSource>>,
    /// Last received credential (latest wins).
    credential: Option<SessionCredential>,
    /// Live session, when connected.
    session: Option<Box<dyn SfuSession>>,
    /// Event stream of the live session.
    session_events: Option<mpsc::Receiver<SfuEvent>>,
    /// Lifecycle state.
    state: ConnectionState,
    /// Active SFU-layer error.
    error: Option<VoiceError>,
    /// Reconnect attempt counter for the current cycle.
    attempts: u32,
    /// Epoch for staleness checks across suspension points.
    epoch: u64,
    /// Whether an attempt subtask is in flight.
    in_flight: bool,
    /// Cancellation token for the in-flight attempt.
    attempt_cancel: CancellationToken,
    /// Deadline of the pending backoff timer, if any.
    retry_at: Option<Instant>,
}

impl ConnectionActor {
    /// Spawn a new connection actor.
    ///
    /// Returns a handle and the task join handle.
    pub fn spawn(
        config: VoiceConfig,
        connector: Arc<dyn SfuConnector>,
        sink_factory: Arc<dyn AudioSinkFactory>,
        cancel_token: CancellationToken,
    ) -> (ConnectionActorHandle, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(config.mailbox_buffer);
        let (state_tx, state_rx) = watch::channel(ConnectionSnapshot::default());
        let (attempt_tx, attempt_rx) = mpsc::channel(4);

        let actor = Self {
            config,
            connector,
            receiver,
            cancel_token: cancel_token.clone(),
            state_tx,
            attempt_tx,
            attempt_rx,
            sinks: PlaybackSinkRegistry::new(sink_factory),
            joined: false,
            capture: None,
            credential: None,
            session: None,
            session_events: None,
            state: ConnectionState::Idle,
            error: None,
            attempts: 0,
            epoch: 0,
            in_flight: false,
            attempt_cancel: cancel_token.child_token(),
            retry_at: None,
        };

        let task_handle = tokio::spawn(actor.run());

        let handle = ConnectionActorHandle {
            sender,
            cancel_token,
            state_rx,
        };

        (handle, task_handle)
    }

    /// Run the actor message loop.
    #[instrument(skip_all, name = "voice.connection", fields(channel_id = %self.config.channel_id))]
    async fn run(mut self) {
        debug!(target: "voice.connection", "ConnectionActor started");

        loop {
            let retry_at = self.retry_at;

            tokio::select! {
                () = self.cancel_token.cancelled() => {
                    debug!(target: "voice.connection", "ConnectionActor received cancellation signal");
                    self.teardown("disposed").await;
                    break;
                }

                Some(result) = self.attempt_rx.recv() => {
                    self.handle_attempt_result(result).await;
                }

                event = recv_session_event(&mut self.session_events) => {
                    self.handle_session_event(event).await;
                }

                () = async {
                    match retry_at {
                        Some(at) => tokio::time::sleep_until(at).await,
                        None => std::future::pending().await,
                    }
                }, if retry_at.is_some() => {
                    self.retry_at = None;
                    debug!(target: "voice.connection", attempts = self.attempts, "Backoff elapsed, retrying");
                    self.begin_attempt();
                }

                cmd = self.receiver.recv() => {
                    match cmd {
                        Some(command) => self.handle_command(command).await,
                        None => {
                            debug!(target: "voice.connection", "ConnectionActor channel closed, exiting");
                            self.teardown("handle dropped").await;
                            break;
                        }
                    }
                }
            }
        }

        info!(target: "voice.connection", "ConnectionActor stopped");
    }

    /// Handle a single command.
    async fn handle_command(&mut self, command: ConnectionCommand) {
        match command {
            ConnectionCommand::SetJoined(joined) => {
                if joined == self.joined {
                    return;
                }
                self.joined = joined;
                if joined {
                    self.maybe_connect();
                } else {
                    // Credential is scoped to one membership cycle
                    self.credential = None;
                    self.teardown("left channel").await;
                }
            }

            ConnectionCommand::SetCapture(capture) => {
                let revoked = capture.is_none() && self.capture.is_some();
                self.capture = capture;
                if revoked {
                    self.teardown("capture revoked").await;
                } else {
                    self.maybe_connect();
                }
            }

            ConnectionCommand::SetCredential(credential) => {
                if credential.channel_id != self.config.channel_id {
                    warn!(
                        target: "voice.connection",
                        credential_channel_id = %credential.channel_id,
                        "Ignoring credential for another channel"
                    );
                    return;
                }
                debug!(
                    target: "voice.connection",
                    session_id = %credential.session_id,
                    "Session credential received"
                );
                self.credential = Some(*credential);
                self.maybe_connect();
            }

            ConnectionCommand::Retry => self.handle_retry(),

            ConnectionCommand::StartAudio { respond_to } => {
                let resumed = self.sinks.resume_all().await;
                self.publish_state();
                let _ = respond_to.send(resumed);
            }
        }
    }

    /// Manual retry: only effective when no connection is live or in flight.
    fn handle_retry(&mut self) {
        if self.in_flight || self.session.is_some() || self.retry_at.is_some() {
            warn!(
                target: "voice.connection",
                state = ?self.state,
                "Manual retry ignored, a connection is live or transitioning"
            );
            return;
        }
        info!(target: "voice.connection", "Manual retry requested");
        self.attempts = 0;
        if self.should_connect() && self.credential.is_some() {
            self.set_state(ConnectionState::Connecting);
            self.begin_attempt();
        } else {
            warn!(target: "voice.connection", "Manual retry with nothing to retry");
        }
    }

    /// Whether the channel currently wants a live media connection.
    fn should_connect(&self) -> bool {
        self.joined && self.capture.is_some()
    }

    /// Start a connection cycle when every precondition holds and nothing is
    /// live, in flight, or already scheduled. Never auto-starts from Failed.
    fn maybe_connect(&mut self) {
        if !self.should_connect()
            || self.credential.is_none()
            || self.in_flight
            || self.session.is_some()
            || self.retry_at.is_some()
            || matches!(self.state, ConnectionState::Failed(_))
        {
            return;
        }
        self.begin_attempt();
    }

    /// Spawn one connection attempt subtask.
    ///
    /// The single-attempt invariant is checked synchronously here, before any
    /// asynchronous work begins.
    fn begin_attempt(&mut self) {
        if self.in_flight || self.session.is_some() {
            return;
        }
        let Some(credential) = self.credential.clone() else {
            return;
        };
        let Some(capture) = self.capture.clone() else {
            return;
        };
        if !self.joined {
            return;
        }

        self.in_flight = true;
        self.attempt_cancel = self.cancel_token.child_token();

        let next_state = if self.state == ConnectionState::Reconnecting {
            ConnectionState::Reconnecting
        } else {
            ConnectionState::Connecting
        };
        self.set_state(next_state);

        let options = AudioTrackOptions {
            device_id: capture.device_id(),
            ..AudioTrackOptions::default()
        };
        let connector = Arc::clone(&self.connector);
        let cancel = self.attempt_cancel.clone();
        let epoch = self.epoch;
        let tx = self.attempt_tx.clone();

        debug!(
            target: "voice.connection",
            session_id = %credential.session_id,
            attempts = self.attempts,
            "Starting connection attempt"
        );

        tokio::spawn(async move {
            let outcome = run_attempt(connector, credential, capture, options, cancel).await;
            let _ = tx.send(AttemptResult { epoch, outcome }).await;
        });
    }

    /// Apply the result of a connection attempt, discarding stale epochs.
    async fn handle_attempt_result(&mut self, result: AttemptResult) {
        if result.epoch != self.epoch {
            // The owner tore down while this attempt was in flight; release
            // whatever it produced instead of applying it to stale state.
            if let AttemptOutcome::Established { mut session, .. } = result.outcome {
                debug!(target: "voice.connection", "Discarding connection established after teardown");
                tokio::spawn(async move { session.disconnect().await });
            }
            return;
        }

        self.in_flight = false;

        match result.outcome {
            AttemptOutcome::Established { session, events } => {
                info!(target: "voice.connection", "Connected to SFU");
                self.session = Some(session);
                self.session_events = events;
                self.attempts = 0;
                self.error = None;
                self.set_state(ConnectionState::Connected);
            }

            AttemptOutcome::Aborted => {
                debug!(target: "voice.connection", "Connection attempt aborted");
            }

            AttemptOutcome::Failed(raw) => self.handle_attempt_failure(&raw),
        }
    }

    /// Classify a failed attempt and either schedule a retry or give up.
    fn handle_attempt_failure(&mut self, raw: &TransportError) {
        let error = classify_sfu_error(raw);
        warn!(
            target: "voice.connection",
            code = ?error.code,
            attempts = self.attempts,
            error = %error.technical_message,
            "Connection attempt failed"
        );

        if error.code == VoiceErrorCode::AuthFailed {
            // Credential rejections are never retried automatically
            self.attempts = self.config.max_reconnect_attempts;
            self.error = Some(error);
            self.set_state(ConnectionState::Failed(VoiceErrorCode::AuthFailed));
            return;
        }

        self.attempts += 1;
        if self.attempts >= self.config.max_reconnect_attempts {
            // Repeated network-class failures mean the service is down, not
            // that this particular handshake went wrong
            let code = if error.code == VoiceErrorCode::NetworkUnavailable {
                VoiceErrorCode::ServiceUnavailable
            } else {
                error.code
            };
            self.error = Some(VoiceError::new(code, error.technical_message));
            self.set_state(ConnectionState::Failed(code));
            warn!(
                target: "voice.connection",
                code = ?code,
                "Automatic reconnect budget exhausted"
            );
        } else {
            let delay = backoff_delay(
                self.config.reconnect_base_delay,
                self.config.reconnect_max_delay,
                self.attempts - 1,
            );
            self.retry_at = Some(Instant::now() + delay);
            self.error = Some(error);
            self.set_state(ConnectionState::Reconnecting);
            debug!(
                target: "voice.connection",
                delay_ms = delay.as_millis() as u64,
                attempts = self.attempts,
                "Reconnect scheduled"
            );
        }
    }

    /// Handle an event from the live session's stream.
    async fn handle_session_event(&mut self, event: Option<SfuEvent>) {
        match event {
            Some(SfuEvent::TrackSubscribed(track)) => {
                self.sinks.attach(&track).await;
                self.publish_state();
            }

            Some(SfuEvent::TrackUnsubscribed {
                track_id,
                participant_identity,
            }) => {
                self.sinks.detach(track_id.as_deref(), &participant_identity);
                self.publish_state();
            }

            Some(SfuEvent::Disconnected { reason, detail }) => {
                warn!(target: "voice.connection", reason = ?reason, detail = %detail, "SFU session ended");
                if let Some(mut session) = self.session.take() {
                    tokio::spawn(async move { session.disconnect().await });
                }
                self.session_events = None;
                self.sinks.clear();

                if reason == DisconnectReason::DuplicateIdentity {
                    // Reconnecting would evict whichever client replaced us
                    self.attempts = self.config.max_reconnect_attempts;
                    self.error = Some(VoiceError::new(
                        VoiceErrorCode::ConnectionFailed,
                        format!("evicted by a newer connection: {detail}"),
                    ));
                    self.set_state(ConnectionState::Failed(VoiceErrorCode::ConnectionFailed));
                } else if self.should_connect() {
                    // Fresh recovery cycle: counter restarts, first retry is
                    // immediate
                    self.attempts = 0;
                    self.set_state(ConnectionState::Reconnecting);
                    self.begin_attempt();
                } else {
                    self.set_state(ConnectionState::Idle);
                }
            }

            None => {
                // Event stream closed without a disconnect notice
                self.session_events = None;
            }
        }
    }

    /// Unconditional teardown to Idle. Idempotent; safe when nothing is
    /// connected.
    async fn teardown(&mut self, reason: &str) {
        self.epoch += 1;
        self.attempt_cancel.cancel();
        self.in_flight = false;
        self.retry_at = None;
        self.attempts = 0;
        self.session_events = None;
        if let Some(mut session) = self.session.take() {
            session.disconnect().await;
        }
        self.sinks.clear();
        self.error = None;
        self.set_state(ConnectionState::Idle);
        debug!(target: "voice.connection", reason = %reason, "Connection torn down");
    }

    fn set_state(&mut self, state: ConnectionState) {
        self.state = state;
        self.publish_state();
    }

    fn publish_state(&self) {
        let _ = self.state_tx.send_replace(ConnectionSnapshot {
            state: self.state,
            error: self.error.clone(),
            audio_blocked: self.sinks.audio_blocked(),
        });
    }
}

/// One full connection attempt: handshake, derive local track, publish.
///
/// Checks the cancellation token between suspension points; anything created
/// after teardown began is released, not applied.
async fn run_attempt(
    connector: Arc<dyn SfuConnector>,
    credential: SessionCredential,
    capture: Arc<dyn CaptureSource>,
    options: AudioTrackOptions,
    cancel: CancellationToken,
) -> AttemptOutcome {
    let mut session = match connector.connect(&credential).await {
        Ok(session) => session,
        Err(raw) => return AttemptOutcome::Failed(raw),
    };

    if cancel.is_cancelled() {
        session.disconnect().await;
        return AttemptOutcome::Aborted;
    }

    let mut track = match capture.create_audio_track(options).await {
        Ok(track) => track,
        Err(raw) => {
            session.disconnect().await;
            return AttemptOutcome::Failed(raw);
        }
    };

    if cancel.is_cancelled() {
        // Torn down before publication: stop the track, never publish it
        track.stop().await;
        session.disconnect().await;
        return AttemptOutcome::Aborted;
    }

    if let Err(raw) = session.publish(track).await {
        session.disconnect().await;
        return AttemptOutcome::Failed(raw);
    }

    let events = session.take_events();
    AttemptOutcome::Established { session, events }
}

/// Await the next session event, pending forever when no session is live.
async fn recv_session_event(events: &mut Option<mpsc::Receiver<SfuEvent>>) -> Option<SfuEvent> {
    match events {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

/// Exponential backoff: `base * 2^attempt`, capped.
fn backoff_delay(base: Duration, cap: Duration, attempt: u32) -> Duration {
    let factor = 1u32 << attempt.min(16);
    base.saturating_mul(factor).min(cap)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_and_caps() {
        let base = Duration::from_millis(500);
        let cap = Duration::from_secs(8);

        assert_eq!(backoff_delay(base, cap, 0), Duration::from_millis(500));
        assert_eq!(backoff_delay(base, cap, 1), Duration::from_secs(1));
        assert_eq!(backoff_delay(base, cap, 2), Duration::from_secs(2));
        assert_eq!(backoff_delay(base, cap, 4), Duration::from_secs(8));
        // Far past the cap stays at the cap
        assert_eq!(backoff_delay(base, cap, 30), cap);
    }
}
