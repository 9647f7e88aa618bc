//! `SignalingActor` - voice channel membership state machine.
//!
//! Tracks who is in the voice channel, the local participant's mute and role
//! state, and moderation actions. User intents (join/leave/mute) are emitted
//! optimistically; the server's `voice:state` broadcasts are authoritative
//! and replace local participant state wholesale on every arrival.
//!
//! The actor also supervises the connection lifecycle manager: it enables the
//! media connection once membership is confirmed, forwards channel-matched
//! session credentials, and disables it on leave, kick, or membership loss.

use crate::classify::classify_signaling_error;
use crate::config::VoiceConfig;
use crate::errors::{ActorError, VoiceError, VoiceErrorCode};
use crate::protocol::{
    ClientEvent, ModerationKind, ModerationNotice, Role, ServerEvent, SessionGrant, StateBroadcast,
};
use crate::state::{Participant, SignalingPhase, SignalingSnapshot};
use crate::transport::SignalingEmitter;

use super::connection::ConnectionActorHandle;
use super::messages::SignalingCommand;

use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Handle to a `SignalingActor`.
#[derive(Clone)]
pub struct SignalingActorHandle {
    sender: mpsc::Sender<SignalingCommand>,
    cancel_token: CancellationToken,
    state_rx: watch::Receiver<SignalingSnapshot>,
}

impl SignalingActorHandle {
    /// Current signaling snapshot.
    #[must_use]
    pub fn state(&self) -> SignalingSnapshot {
        self.state_rx.borrow().clone()
    }

    /// Watch the signaling snapshot for changes.
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<SignalingSnapshot> {
        self.state_rx.clone()
    }

    /// Request to join the voice channel.
    pub async fn request_join(&self) -> Result<(), ActorError> {
        self.send(SignalingCommand::RequestJoin, "signaling.request_join")
            .await
    }

    /// Request to leave the voice channel.
    pub async fn request_leave(&self) -> Result<(), ActorError> {
        self.send(SignalingCommand::RequestLeave, "signaling.request_leave")
            .await
    }

    /// Toggle the local mute flag.
    pub async fn toggle_mute(&self) -> Result<(), ActorError> {
        self.send(SignalingCommand::ToggleMute, "signaling.toggle_mute")
            .await
    }

    /// Host: apply a server-enforced mute.
    pub async fn host_mute(&self, target_identity: String) -> Result<(), ActorError> {
        self.send(
            SignalingCommand::HostMute { target_identity },
            "signaling.host_mute",
        )
        .await
    }

    /// Host: lift a server-enforced mute.
    pub async fn host_unmute(&self, target_identity: String) -> Result<(), ActorError> {
        self.send(
            SignalingCommand::HostUnmute { target_identity },
            "signaling.host_unmute",
        )
        .await
    }

    /// Host: remove a participant from the channel.
    pub async fn host_kick(&self, target_identity: String) -> Result<(), ActorError> {
        self.send(
            SignalingCommand::HostKick { target_identity },
            "signaling.host_kick",
        )
        .await
    }

    /// Clear the active signaling-layer error.
    pub async fn clear_error(&self) -> Result<(), ActorError> {
        self.send(SignalingCommand::ClearError, "signaling.clear_error")
            .await
    }

    /// Cancel the signaling actor.
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    /// Check if the actor is cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    async fn send(&self, command: SignalingCommand, label: &'static str) -> Result<(), ActorError> {
        self.sender
            .send(command)
            .await
            .map_err(|_| ActorError::MailboxClosed(label))
    }
}

/// The `SignalingActor` implementation.
pub struct SignalingActor {
    /// Voice configuration.
    config: VoiceConfig,
    /// Outbound half of the signaling transport.
    emitter: Arc<dyn SignalingEmitter>,
    /// Command receiver.
    receiver: mpsc::Receiver<SignalingCommand>,
    /// Inbound server event stream.
    inbound: Option<mpsc::Receiver<ServerEvent>>,
    /// Cancellation token (child of the channel's token).
    cancel_token: CancellationToken,
    /// Snapshot publisher.
    state_tx: watch::Sender<SignalingSnapshot>,
    /// Supervised connection lifecycle manager.
    connection: ConnectionActorHandle,
    /// State machine phase.
    phase: SignalingPhase,
    /// Latest authoritative participant list (empty while NotJoined).
    participants: Vec<Participant>,
    /// Local self-mute flag (optimistic until the next broadcast).
    local_muted: bool,
    /// Server-enforced mute on the local participant.
    server_muted: bool,
    /// Local participant role.
    role: Role,
    /// Active signaling-layer error.
    error: Option<VoiceError>,
    /// Deadline of the bounded join wait, when Joining.
    join_deadline: Option<Instant>,
}

impl SignalingActor {
    /// Spawn a new signaling actor.
    ///
    /// Returns a handle and the task join handle.
    pub fn spawn(
        config: VoiceConfig,
        emitter: Arc<dyn SignalingEmitter>,
        inbound: mpsc::Receiver<ServerEvent>,
        connection: ConnectionActorHandle,
        cancel_token: CancellationToken,
    ) -> (SignalingActorHandle, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(config.mailbox_buffer);
        let (state_tx, state_rx) = watch::channel(SignalingSnapshot::default());

        let actor = Self {
            config,
            emitter,
            receiver,
            inbound: Some(inbound),
            cancel_token: cancel_token.clone(),
            state_tx,
            connection,
            phase: SignalingPhase::NotJoined,
            participants: Vec::new(),
            local_muted: false,
            server_muted: false,
            role: Role::Listener,
            error: None,
            join_deadline: None,
        };

        let task_handle = tokio::spawn(actor.run());

        let handle = SignalingActorHandle {
            sender,
            cancel_token,
            state_rx,
        };

        (handle, task_handle)
    }

    /// Run the actor message loop.
    #[instrument(skip_all, name = "voice.signaling", fields(channel_id = %self.config.channel_id))]
    async fn run(mut self) {
        debug!(target: "voice.signaling", "SignalingActor started");

        loop {
            let join_deadline = self.join_deadline;

            tokio::select! {
                () = self.cancel_token.cancelled() => {
                    debug!(target: "voice.signaling", "SignalingActor received cancellation signal");
                    break;
                }

                () = async {
                    match join_deadline {
                        Some(at) => tokio::time::sleep_until(at).await,
                        None => std::future::pending().await,
                    }
                }, if join_deadline.is_some() => {
                    self.handle_join_timeout().await;
                }

                event = recv_inbound(&mut self.inbound) => {
                    match event {
                        Some(event) => self.handle_server_event(event).await,
                        None => {
                            warn!(target: "voice.signaling", "Inbound event stream closed");
                            self.inbound = None;
                        }
                    }
                }

                cmd = self.receiver.recv() => {
                    match cmd {
                        Some(command) => self.handle_command(command).await,
                        None => {
                            debug!(target: "voice.signaling", "SignalingActor channel closed, exiting");
                            break;
                        }
                    }
                }
            }
        }

        info!(target: "voice.signaling", "SignalingActor stopped");
    }

    /// Handle a user-triggered command.
    async fn handle_command(&mut self, command: SignalingCommand) {
        match command {
            SignalingCommand::RequestJoin => self.handle_request_join().await,
            SignalingCommand::RequestLeave => self.handle_request_leave().await,
            SignalingCommand::ToggleMute => self.handle_toggle_mute().await,
            SignalingCommand::HostMute { target_identity } => {
                self.emit_moderation(
                    ClientEvent::HostMute {
                        channel_id: self.config.channel_id.clone(),
                        target_identity,
                    },
                    "host-mute",
                )
                .await;
            }
            SignalingCommand::HostUnmute { target_identity } => {
                self.emit_moderation(
                    ClientEvent::HostUnmute {
                        channel_id: self.config.channel_id.clone(),
                        target_identity,
                    },
                    "host-unmute",
                )
                .await;
            }
            SignalingCommand::HostKick { target_identity } => {
                self.emit_moderation(
                    ClientEvent::HostKick {
                        channel_id: self.config.channel_id.clone(),
                        target_identity,
                    },
                    "host-kick",
                )
                .await;
            }
            SignalingCommand::ClearError => {
                self.error = None;
                self.publish();
            }
        }
    }

    /// Handle an inbound server event.
    async fn handle_server_event(&mut self, event: ServerEvent) {
        match event {
            ServerEvent::State(broadcast) => self.handle_state_broadcast(broadcast).await,
            ServerEvent::Moderation(notice) => self.handle_moderation(notice).await,
            ServerEvent::Session(grant) => self.handle_session_grant(grant).await,
            ServerEvent::Error(notice) => {
                if matches!(self.phase, SignalingPhase::Joining | SignalingPhase::Joined) {
                    let error = classify_signaling_error(&notice.message, notice.code.as_deref());
                    warn!(
                        target: "voice.signaling",
                        code = ?error.code,
                        error = %error.technical_message,
                        "Signaling server reported an error"
                    );
                    self.error = Some(error);
                    self.publish();
                } else {
                    debug!(
                        target: "voice.signaling",
                        message = %notice.message,
                        "Ignoring server error while not joined"
                    );
                }
            }
        }
    }

    /// `request_join`: valid only from NotJoined; idempotent against rapid
    /// repeated calls.
    async fn handle_request_join(&mut self) {
        if self.phase != SignalingPhase::NotJoined {
            debug!(target: "voice.signaling", phase = ?self.phase, "Join ignored, already joining or joined");
            return;
        }

        if !self.emitter.is_connected() {
            self.error = Some(VoiceError::new(
                VoiceErrorCode::Unavailable,
                "signaling transport not connected",
            ));
            self.publish();
            return;
        }

        if self.config.identity.is_none() {
            self.error = Some(VoiceError::new(
                VoiceErrorCode::InvalidIdentity,
                "local identity unknown",
            ));
            self.publish();
            return;
        }

        let join = ClientEvent::Join {
            channel_id: self.config.channel_id.clone(),
        };
        match self.emitter.emit(join).await {
            Ok(()) => {
                info!(target: "voice.signaling", "Join intent emitted");
                self.phase = SignalingPhase::Joining;
                self.error = None;
                self.join_deadline = Some(Instant::now() + self.config.join_timeout);
                self.publish();
            }
            Err(raw) => {
                warn!(target: "voice.signaling", error = %raw, "Join intent failed to send");
                self.error = Some(classify_signaling_error(&raw.message, raw.code.as_deref()));
                self.publish();
            }
        }
    }

    /// The bounded join wait elapsed without authoritative confirmation.
    async fn handle_join_timeout(&mut self) {
        self.join_deadline = None;
        if self.phase != SignalingPhase::Joining {
            return;
        }
        warn!(target: "voice.signaling", "Join not confirmed in time");
        // Drop anything accumulated during the pending join, including a
        // participant list from a broadcast that never named us
        self.force_leave(Some(VoiceError::new(
            VoiceErrorCode::JoinTimeout,
            "no authoritative state named the local identity before the join timer fired",
        )))
        .await;
    }

    /// `request_leave`: valid only from Joined; optimistic.
    async fn handle_request_leave(&mut self) {
        if self.phase != SignalingPhase::Joined {
            debug!(target: "voice.signaling", phase = ?self.phase, "Leave ignored, not joined");
            return;
        }

        let leave = ClientEvent::Leave {
            channel_id: self.config.channel_id.clone(),
        };
        if let Err(raw) = self.emitter.emit(leave).await {
            // Still leave locally; the server will drop us on disconnect
            warn!(target: "voice.signaling", error = %raw, "Leave intent failed to send");
        }
        info!(target: "voice.signaling", "Left voice channel");
        self.force_leave(None).await;
    }

    /// `toggle_mute`: valid only from Joined and never while server-muted.
    async fn handle_toggle_mute(&mut self) {
        if self.phase != SignalingPhase::Joined {
            debug!(target: "voice.signaling", "Mute toggle ignored, not joined");
            return;
        }
        if self.server_muted {
            // A server-muted participant's toggle never reaches the transport
            debug!(target: "voice.signaling", "Mute toggle ignored, server-muted");
            return;
        }

        self.local_muted = !self.local_muted;
        self.update_self_entry();
        self.publish();

        let mute = ClientEvent::Mute {
            channel_id: self.config.channel_id.clone(),
            muted: self.local_muted,
        };
        if let Err(raw) = self.emitter.emit(mute).await {
            // The next authoritative broadcast reconciles the mismatch
            warn!(target: "voice.signaling", error = %raw, "Mute intent failed to send");
        }
    }

    /// Emit a host moderation intent, gated on the local role.
    async fn emit_moderation(&mut self, event: ClientEvent, label: &str) {
        if self.phase != SignalingPhase::Joined || !self.role.can_moderate() {
            warn!(
                target: "voice.signaling",
                role = ?self.role,
                action = label,
                "Moderation intent ignored, not a host"
            );
            return;
        }
        if let Err(raw) = self.emitter.emit(event).await {
            warn!(target: "voice.signaling", action = label, error = %raw, "Moderation intent failed to send");
        }
    }

    /// Reconcile with an authoritative state broadcast.
    async fn handle_state_broadcast(&mut self, broadcast: StateBroadcast) {
        if self.phase == SignalingPhase::NotJoined {
            debug!(target: "voice.signaling", "Ignoring state broadcast while not joined");
            return;
        }

        let identity = self.config.identity.as_deref();
        let mut found_self = false;

        // Replaced wholesale on every broadcast; never patched incrementally
        let participants: Vec<Participant> = broadcast
            .participants
            .iter()
            .map(|wire| {
                let is_self = identity == Some(wire.identity.as_str());
                found_self |= is_self;
                let display_name = wire
                    .display_name
                    .clone()
                    .or_else(|| is_self.then(|| self.config.display_name.clone()).flatten())
                    .unwrap_or_else(|| wire.identity.clone());
                Participant {
                    identity: wire.identity.clone(),
                    display_name,
                    local_muted: wire.muted,
                    server_muted: wire.server_muted,
                    role: Role::from_wire(wire.role.as_deref()),
                    is_self,
                }
            })
            .collect();

        if found_self {
            let was_joining = self.phase == SignalingPhase::Joining;
            if let Some(me) = participants.iter().find(|p| p.is_self) {
                // Server is the source of truth for mute and role
                self.local_muted = me.local_muted;
                self.server_muted = me.server_muted;
                self.role = me.role;
            }
            self.participants = participants;
            self.phase = SignalingPhase::Joined;
            if was_joining {
                info!(target: "voice.signaling", "Join confirmed by authoritative state");
                self.join_deadline = None;
                self.error = None;
                if let Err(err) = self.connection.set_joined(true).await {
                    warn!(target: "voice.signaling", error = %err, "Failed to enable connection");
                }
            }
            self.publish();
        } else if self.phase == SignalingPhase::Joined {
            // The server unilaterally dropped us; same cleanup as a kick
            warn!(target: "voice.signaling", "Authoritative state no longer names the local identity");
            self.force_leave(None).await;
        } else {
            // Still waiting for the join to land
            self.participants = participants;
            self.publish();
        }
    }

    /// Apply a server-initiated moderation action.
    async fn handle_moderation(&mut self, notice: ModerationNotice) {
        if notice.channel_id != self.config.channel_id {
            debug!(target: "voice.signaling", "Ignoring moderation for another channel");
            return;
        }
        if let Some(target) = &notice.target_identity {
            if self.config.identity.as_deref() != Some(target.as_str()) {
                // About someone else; the next state broadcast reflects it
                debug!(
                    target: "voice.signaling",
                    target_identity = %target,
                    "Moderation targets another participant"
                );
                return;
            }
        }

        match notice.kind {
            ModerationKind::ServerMute => {
                info!(target: "voice.signaling", "Server-enforced mute applied");
                self.server_muted = true;
                self.update_self_entry();
                self.error = Some(VoiceError::new(
                    VoiceErrorCode::ServerMuted,
                    "muted by a moderator",
                ));
                self.publish();
            }
            ModerationKind::ServerUnmute => {
                info!(target: "voice.signaling", "Server-enforced mute lifted");
                self.server_muted = false;
                self.update_self_entry();
                if self
                    .error
                    .as_ref()
                    .is_some_and(|e| e.code == VoiceErrorCode::ServerMuted)
                {
                    self.error = None;
                }
                self.publish();
            }
            ModerationKind::Kick => {
                warn!(target: "voice.signaling", reason = ?notice.reason, "Kicked from voice channel");
                self.force_leave(Some(VoiceError::kicked(notice.reason))).await;
            }
        }
    }

    /// Forward a channel-matched session credential to the lifecycle manager.
    async fn handle_session_grant(&mut self, grant: SessionGrant) {
        if grant.channel_id != self.config.channel_id {
            debug!(
                target: "voice.signaling",
                grant_channel_id = %grant.channel_id,
                "Ignoring session grant for another channel"
            );
            return;
        }
        if let Err(err) = self.connection.set_credential(grant.into()).await {
            warn!(target: "voice.signaling", error = %err, "Failed to forward session credential");
        }
    }

    /// Local leave transition. No leave intent is emitted here.
    async fn force_leave(&mut self, error: Option<VoiceError>) {
        self.phase = SignalingPhase::NotJoined;
        self.participants.clear();
        self.local_muted = false;
        self.server_muted = false;
        self.role = Role::Listener;
        self.join_deadline = None;
        self.error = error;
        if let Err(err) = self.connection.set_joined(false).await {
            warn!(target: "voice.signaling", error = %err, "Failed to disable connection");
        }
        self.publish();
    }

    /// Mirror the local flags into our own participant list entry.
    fn update_self_entry(&mut self) {
        for participant in &mut self.participants {
            if participant.is_self {
                participant.local_muted = self.local_muted;
                participant.server_muted = self.server_muted;
            }
        }
    }

    fn publish(&self) {
        let _ = self.state_tx.send_replace(SignalingSnapshot {
            phase: self.phase,
            participants: self.participants.clone(),
            local_muted: self.local_muted,
            server_muted: self.server_muted,
            role: self.role,
            error: self.error.clone(),
        });
    }
}

/// Await the next inbound event, pending forever once the stream is gone.
async fn recv_inbound(
    inbound: &mut Option<mpsc::Receiver<ServerEvent>>,
) -> Option<ServerEvent> {
    match inbound {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}
