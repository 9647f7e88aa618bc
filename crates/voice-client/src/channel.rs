//! `VoiceChannel` - the public facade over the two voice actors.
//!
//! Spawning a channel starts the signaling and connection actors plus a small
//! merge task that folds their two state streams into one [`VoiceSnapshot`]
//! watch channel. The handle is the only surface the surrounding application
//! touches; it is cheap to clone and every method is a thin message send.
//!
//! A disabled configuration produces a null-object handle: every intent is an
//! accepted no-op and the snapshot stays at its default forever.

use crate::actors::{ConnectionActor, ConnectionActorHandle, SignalingActor, SignalingActorHandle};
use crate::config::VoiceConfig;
use crate::errors::ActorError;
use crate::protocol::ServerEvent;
use crate::state::{merge_snapshots, VoiceSnapshot};
use crate::transport::{AudioSinkFactory, CaptureSource, SfuConnector, SignalingEmitter};

use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Handle to a spawned voice channel.
#[derive(Clone)]
pub struct VoiceChannelHandle {
    inner: Inner,
}

#[derive(Clone)]
enum Inner {
    Active {
        signaling: SignalingActorHandle,
        connection: ConnectionActorHandle,
        cancel_token: CancellationToken,
        state_rx: watch::Receiver<VoiceSnapshot>,
    },
    Disabled {
        state_rx: watch::Receiver<VoiceSnapshot>,
        // Keeps the watch channel open for the lifetime of the handle
        _state_tx: Arc<watch::Sender<VoiceSnapshot>>,
    },
}

/// Spawner for the voice channel actor pair.
pub struct VoiceChannel;

impl VoiceChannel {
    /// Spawn the voice channel actors and return the application handle.
    ///
    /// `inbound` carries decoded server events from the signaling transport.
    /// With `config.enabled == false` no actors are spawned and the returned
    /// handle accepts every intent as a no-op.
    #[must_use]
    pub fn spawn(
        config: VoiceConfig,
        emitter: Arc<dyn SignalingEmitter>,
        connector: Arc<dyn SfuConnector>,
        sink_factory: Arc<dyn AudioSinkFactory>,
        inbound: mpsc::Receiver<ServerEvent>,
    ) -> VoiceChannelHandle {
        if !config.enabled {
            info!(target: "voice.channel", "Voice disabled, using inert handle");
            let (state_tx, state_rx) = watch::channel(VoiceSnapshot::default());
            return VoiceChannelHandle {
                inner: Inner::Disabled {
                    state_rx,
                    _state_tx: Arc::new(state_tx),
                },
            };
        }

        let cancel_token = CancellationToken::new();

        let (connection, _connection_task) = ConnectionActor::spawn(
            config.clone(),
            connector,
            sink_factory,
            cancel_token.child_token(),
        );

        let (signaling, _signaling_task) = SignalingActor::spawn(
            config.clone(),
            emitter,
            inbound,
            connection.clone(),
            cancel_token.child_token(),
        );

        let state_rx = spawn_merge_task(&signaling, &connection, cancel_token.child_token());

        info!(
            target: "voice.channel",
            channel_id = %config.channel_id,
            "Voice channel spawned"
        );

        VoiceChannelHandle {
            inner: Inner::Active {
                signaling,
                connection,
                cancel_token,
                state_rx,
            },
        }
    }
}

impl VoiceChannelHandle {
    /// Current merged snapshot.
    #[must_use]
    pub fn snapshot(&self) -> VoiceSnapshot {
        match &self.inner {
            Inner::Active { state_rx, .. } | Inner::Disabled { state_rx, .. } => {
                state_rx.borrow().clone()
            }
        }
    }

    /// Watch the merged snapshot for changes.
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<VoiceSnapshot> {
        match &self.inner {
            Inner::Active { state_rx, .. } | Inner::Disabled { state_rx, .. } => state_rx.clone(),
        }
    }

    /// Request to join the voice channel.
    pub async fn join(&self) -> Result<(), ActorError> {
        match &self.inner {
            Inner::Active { signaling, .. } => signaling.request_join().await,
            Inner::Disabled { .. } => Ok(()),
        }
    }

    /// Request to leave the voice channel.
    pub async fn leave(&self) -> Result<(), ActorError> {
        match &self.inner {
            Inner::Active { signaling, .. } => signaling.request_leave().await,
            Inner::Disabled { .. } => Ok(()),
        }
    }

    /// Toggle the local mute flag.
    pub async fn toggle_mute(&self) -> Result<(), ActorError> {
        match &self.inner {
            Inner::Active { signaling, .. } => signaling.toggle_mute().await,
            Inner::Disabled { .. } => Ok(()),
        }
    }

    /// Host: apply a server-enforced mute to a participant.
    pub async fn host_mute(&self, target_identity: String) -> Result<(), ActorError> {
        match &self.inner {
            Inner::Active { signaling, .. } => signaling.host_mute(target_identity).await,
            Inner::Disabled { .. } => Ok(()),
        }
    }

    /// Host: lift a server-enforced mute.
    pub async fn host_unmute(&self, target_identity: String) -> Result<(), ActorError> {
        match &self.inner {
            Inner::Active { signaling, .. } => signaling.host_unmute(target_identity).await,
            Inner::Disabled { .. } => Ok(()),
        }
    }

    /// Host: remove a participant from the channel.
    pub async fn host_kick(&self, target_identity: String) -> Result<(), ActorError> {
        match &self.inner {
            Inner::Active { signaling, .. } => signaling.host_kick(target_identity).await,
            Inner::Disabled { .. } => Ok(()),
        }
    }

    /// Clear the active signaling-layer error.
    pub async fn clear_error(&self) -> Result<(), ActorError> {
        match &self.inner {
            Inner::Active { signaling, .. } => signaling.clear_error().await,
            Inner::Disabled { .. } => Ok(()),
        }
    }

    /// Supply or revoke the local capture stream.
    pub async fn set_capture(
        &self,
        capture: Option<Arc<dyn CaptureSource>>,
    ) -> Result<(), ActorError> {
        match &self.inner {
            Inner::Active { connection, .. } => connection.set_capture(capture).await,
            Inner::Disabled { .. } => Ok(()),
        }
    }

    /// Manually retry the media connection after automatic retries gave up.
    pub async fn retry_connection(&self) -> Result<(), ActorError> {
        match &self.inner {
            Inner::Active { connection, .. } => connection.retry().await,
            Inner::Disabled { .. } => Ok(()),
        }
    }

    /// Resume playback blocked by the autoplay policy (from a user gesture).
    ///
    /// Returns true when no sink remains blocked afterwards.
    pub async fn start_audio(&self) -> Result<bool, ActorError> {
        match &self.inner {
            Inner::Active { connection, .. } => connection.start_audio().await,
            Inner::Disabled { .. } => Ok(true),
        }
    }

    /// Stop both actors and release every transport resource.
    ///
    /// Idempotent; further intents on this handle fail with a closed mailbox.
    pub fn shutdown(&self) {
        if let Inner::Active { cancel_token, .. } = &self.inner {
            debug!(target: "voice.channel", "Voice channel shutdown requested");
            cancel_token.cancel();
        }
    }

    /// Whether this handle drives real actors.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        matches!(self.inner, Inner::Active { .. })
    }
}

/// Fold the two actor state streams into one merged watch channel.
fn spawn_merge_task(
    signaling: &SignalingActorHandle,
    connection: &ConnectionActorHandle,
    cancel_token: CancellationToken,
) -> watch::Receiver<VoiceSnapshot> {
    let mut sig_rx = signaling.watch();
    let mut conn_rx = connection.watch();

    let initial = {
        let sig = sig_rx.borrow().clone();
        let conn = conn_rx.borrow().clone();
        merge_snapshots(&sig, &conn)
    };
    let (out_tx, out_rx) = watch::channel(initial);

    tokio::spawn(async move {
        loop {
            tokio::select! {
                () = cancel_token.cancelled() => break,
                changed = sig_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                changed = conn_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }

            let sig = sig_rx.borrow_and_update().clone();
            let conn = conn_rx.borrow_and_update().clone();
            let _ = out_tx.send_replace(merge_snapshots(&sig, &conn));
        }
        debug!(target: "voice.channel", "Snapshot merge task stopped");
    });

    out_rx
}
