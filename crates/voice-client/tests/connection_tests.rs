//! Integration tests for the SFU connection lifecycle.
//!
//! Covers the derived connect signal, credential handling, bounded reconnect
//! backoff, the auth-failure fast path, sink bookkeeping, and teardown
//! staleness under paused time.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::time::Duration;

use voice_client::errors::VoiceErrorCode;
use voice_client::protocol::ModerationKind;
use voice_client::transport::{DisconnectReason, RemoteTrack, SfuEvent, TrackKind, TransportError};
use voice_test_utils::harness::{TEST_CHANNEL, TEST_IDENTITY};
use voice_test_utils::{
    moderation_event, participant, session_event, MockCapture, VoiceHarness,
};

fn audio_track(track_id: &str, identity: &str) -> RemoteTrack {
    RemoteTrack {
        track_id: Some(track_id.to_string()),
        participant_identity: identity.to_string(),
        kind: TrackKind::Audio,
        is_local: false,
    }
}

/// Spawn a harness, join, supply capture and credential, and wait until the
/// media connection is live.
async fn connected_harness() -> (VoiceHarness, Arc<MockCapture>) {
    let harness = VoiceHarness::spawn_default();
    let capture = Arc::new(MockCapture::new());
    harness
        .handle
        .set_capture(Some(Arc::clone(&capture) as _))
        .await
        .unwrap();
    harness.join_confirmed(&[participant("bob")]).await;
    harness
        .send(session_event(TEST_CHANNEL, TEST_IDENTITY))
        .await;
    harness.wait_for(|s| s.connected).await.unwrap();
    (harness, capture)
}

// ============================================================================
// Connect preconditions
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_connects_once_all_preconditions_hold() {
    let harness = VoiceHarness::spawn_default();
    let capture = Arc::new(MockCapture::new());

    // Joined and credentialed, but no capture yet
    harness.join_confirmed(&[]).await;
    harness
        .send(session_event(TEST_CHANNEL, TEST_IDENTITY))
        .await;
    harness.settle().await;
    assert_eq!(harness.connector.connect_count(), 0);

    harness
        .handle
        .set_capture(Some(Arc::clone(&capture) as _))
        .await
        .unwrap();
    harness.wait_for(|s| s.connected).await.unwrap();

    assert_eq!(harness.connector.connect_count(), 1);
    assert_eq!(harness.connector.session(0).publish_count(), 1);
    assert_eq!(capture.tracks_created(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_credential_before_join_is_held_until_needed() {
    let harness = VoiceHarness::spawn_default();
    let capture = Arc::new(MockCapture::new());
    harness
        .handle
        .set_capture(Some(Arc::clone(&capture) as _))
        .await
        .unwrap();

    // Credential arrives before the join is even requested
    harness
        .send(session_event(TEST_CHANNEL, TEST_IDENTITY))
        .await;
    harness.settle().await;
    assert_eq!(harness.connector.connect_count(), 0);

    // Joining later connects without a fresh credential
    harness.join_confirmed(&[]).await;
    harness.wait_for(|s| s.connected).await.unwrap();
    assert_eq!(harness.connector.connect_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_credential_for_other_channel_is_ignored() {
    let harness = VoiceHarness::spawn_default();
    let capture = Arc::new(MockCapture::new());
    harness
        .handle
        .set_capture(Some(Arc::clone(&capture) as _))
        .await
        .unwrap();
    harness.join_confirmed(&[]).await;

    harness
        .send(session_event("some-other-room", TEST_IDENTITY))
        .await;
    harness.settle().await;

    assert_eq!(harness.connector.connect_count(), 0);
    assert!(!harness.handle.snapshot().connected);
}

// ============================================================================
// Teardown paths
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_leave_disconnects_and_invalidates_credential() {
    let (harness, _capture) = connected_harness().await;

    harness.handle.leave().await.unwrap();
    harness.wait_for(|s| !s.connected && !s.joined).await.unwrap();
    assert_eq!(harness.connector.session(0).disconnect_count(), 1);

    // Rejoining must wait for a fresh credential
    harness.join_confirmed(&[]).await;
    harness.settle().await;
    assert_eq!(harness.connector.connect_count(), 1);

    harness
        .send(session_event(TEST_CHANNEL, TEST_IDENTITY))
        .await;
    harness.wait_for(|s| s.connected).await.unwrap();
    assert_eq!(harness.connector.connect_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_kick_while_connected_tears_down_media() {
    let (harness, _capture) = connected_harness().await;

    harness
        .send(moderation_event(
            ModerationKind::Kick,
            TEST_CHANNEL,
            Some(TEST_IDENTITY),
            Some("spam"),
        ))
        .await;

    let snapshot = harness.wait_for(|s| !s.connected && !s.joined).await.unwrap();
    assert_eq!(harness.connector.session(0).disconnect_count(), 1);
    assert_eq!(snapshot.error.unwrap().code, VoiceErrorCode::Kicked);
}

#[tokio::test(start_paused = true)]
async fn test_capture_revocation_tears_down_and_restore_reconnects() {
    let (harness, capture) = connected_harness().await;

    harness.handle.set_capture(None).await.unwrap();
    harness.wait_for(|s| !s.connected).await.unwrap();
    assert_eq!(harness.connector.session(0).disconnect_count(), 1);

    // Still joined; restoring capture reconnects with the held credential
    harness
        .handle
        .set_capture(Some(Arc::clone(&capture) as _))
        .await
        .unwrap();
    harness.wait_for(|s| s.connected).await.unwrap();
    assert_eq!(harness.connector.connect_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_mid_attempt_releases_late_session() {
    let harness = VoiceHarness::spawn_default();
    let capture = Arc::new(MockCapture::new());
    harness.connector.push_hanging();
    harness
        .handle
        .set_capture(Some(Arc::clone(&capture) as _))
        .await
        .unwrap();
    harness.join_confirmed(&[]).await;
    harness
        .send(session_event(TEST_CHANNEL, TEST_IDENTITY))
        .await;
    harness.settle().await;
    assert_eq!(harness.connector.connect_count(), 1);

    // Dispose while the handshake is parked, then let it complete late
    harness.handle.shutdown();
    harness.settle().await;
    harness.connector.release_hanging();
    harness.settle().await;

    // The late session is released, never published to
    assert_eq!(harness.connector.session(0).disconnect_count(), 1);
    assert_eq!(harness.connector.session(0).publish_count(), 0);
}

// ============================================================================
// Reconnect policy
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_bounded_backoff_then_terminal_failure_then_manual_retry() {
    let harness = VoiceHarness::spawn_default();
    let capture = Arc::new(MockCapture::new());
    for _ in 0..3 {
        harness
            .connector
            .push_err(TransportError::new("network is unreachable"));
    }
    harness
        .handle
        .set_capture(Some(Arc::clone(&capture) as _))
        .await
        .unwrap();
    harness.join_confirmed(&[]).await;
    harness
        .send(session_event(TEST_CHANNEL, TEST_IDENTITY))
        .await;

    harness.wait_for(|s| s.reconnecting).await.unwrap();
    assert_eq!(harness.connector.connect_count(), 1);

    // First backoff is 500ms
    tokio::time::sleep(Duration::from_millis(450)).await;
    harness.settle().await;
    assert_eq!(harness.connector.connect_count(), 1);
    tokio::time::sleep(Duration::from_millis(100)).await;
    harness.settle().await;
    assert_eq!(harness.connector.connect_count(), 2);

    // Second backoff doubles to 1s
    tokio::time::sleep(Duration::from_millis(850)).await;
    harness.settle().await;
    assert_eq!(harness.connector.connect_count(), 2);
    tokio::time::sleep(Duration::from_millis(100)).await;
    harness.settle().await;
    assert_eq!(harness.connector.connect_count(), 3);

    // Third failure exhausts the budget
    let snapshot = harness
        .wait_for(|s| !s.reconnecting && s.error.is_some())
        .await
        .unwrap();
    let error = snapshot.error.unwrap();
    assert_eq!(error.code, VoiceErrorCode::ServiceUnavailable);
    assert!(error.retryable);

    // No further automatic attempts, ever
    tokio::time::sleep(Duration::from_secs(120)).await;
    harness.settle().await;
    assert_eq!(harness.connector.connect_count(), 3);

    // Manual retry starts a fresh cycle (script exhausted, so it succeeds)
    harness.handle.retry_connection().await.unwrap();
    harness.wait_for(|s| s.connected).await.unwrap();
    assert_eq!(harness.connector.connect_count(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_auth_failure_is_never_auto_retried() {
    let harness = VoiceHarness::spawn_default();
    let capture = Arc::new(MockCapture::new());
    harness
        .connector
        .push_err(TransportError::with_code("token rejected", "401"));
    harness
        .handle
        .set_capture(Some(Arc::clone(&capture) as _))
        .await
        .unwrap();
    harness.join_confirmed(&[]).await;
    harness
        .send(session_event(TEST_CHANNEL, TEST_IDENTITY))
        .await;

    let snapshot = harness
        .wait_for(|s| s.error.as_ref().is_some_and(|e| e.code == VoiceErrorCode::AuthFailed))
        .await
        .unwrap();
    assert!(!snapshot.reconnecting);
    assert!(!snapshot.error.unwrap().retryable);

    tokio::time::sleep(Duration::from_secs(120)).await;
    harness.settle().await;
    assert_eq!(harness.connector.connect_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_manual_retry_is_noop_while_connected() {
    let (harness, _capture) = connected_harness().await;

    harness.handle.retry_connection().await.unwrap();
    harness.settle().await;

    assert_eq!(harness.connector.connect_count(), 1);
    assert!(harness.handle.snapshot().connected);
}

#[tokio::test(start_paused = true)]
async fn test_unexpected_disconnect_reconnects_immediately() {
    let (harness, _capture) = connected_harness().await;

    harness
        .connector
        .session(0)
        .send_event(SfuEvent::Disconnected {
            reason: DisconnectReason::Unexpected,
            detail: "transport closed".to_string(),
        })
        .await;

    // A fresh cycle starts without waiting for a backoff timer
    harness.settle().await;
    assert_eq!(harness.connector.connect_count(), 2);
    assert_eq!(harness.connector.session(1).publish_count(), 1);
    assert!(harness.handle.snapshot().connected);
}

#[tokio::test(start_paused = true)]
async fn test_duplicate_identity_disconnect_never_reconnects() {
    let (harness, _capture) = connected_harness().await;

    harness
        .connector
        .session(0)
        .send_event(SfuEvent::Disconnected {
            reason: DisconnectReason::DuplicateIdentity,
            detail: "identity already connected".to_string(),
        })
        .await;

    let snapshot = harness.wait_for(|s| !s.connected).await.unwrap();
    assert!(!snapshot.reconnecting);
    assert_eq!(
        snapshot.error.unwrap().code,
        VoiceErrorCode::ConnectionFailed
    );

    // Reconnecting would evict whichever client replaced this one
    tokio::time::sleep(Duration::from_secs(120)).await;
    harness.settle().await;
    assert_eq!(harness.connector.connect_count(), 1);

    // An explicit retry is still allowed
    harness.handle.retry_connection().await.unwrap();
    harness.wait_for(|s| s.connected).await.unwrap();
    assert_eq!(harness.connector.connect_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_publish_failure_counts_as_failed_attempt() {
    let harness = VoiceHarness::spawn_default();
    let capture = Arc::new(MockCapture::new());
    harness
        .connector
        .fail_next_publish(TransportError::new("publish rejected"));
    harness
        .handle
        .set_capture(Some(Arc::clone(&capture) as _))
        .await
        .unwrap();
    harness.join_confirmed(&[]).await;
    harness
        .send(session_event(TEST_CHANNEL, TEST_IDENTITY))
        .await;

    harness.wait_for(|s| s.reconnecting).await.unwrap();
    // The failed attempt stopped its track and released its session
    assert_eq!(capture.track_stop_count(), 1);
    assert_eq!(harness.connector.session(0).disconnect_count(), 1);

    harness.wait_for(|s| s.connected).await.unwrap();
    assert_eq!(harness.connector.connect_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_track_creation_failure_counts_as_failed_attempt() {
    let harness = VoiceHarness::spawn_default();
    let capture = Arc::new(MockCapture::new());
    capture.fail_next_track(TransportError::new("device lost: timed out"));
    harness
        .handle
        .set_capture(Some(Arc::clone(&capture) as _))
        .await
        .unwrap();
    harness.join_confirmed(&[]).await;
    harness
        .send(session_event(TEST_CHANNEL, TEST_IDENTITY))
        .await;

    harness.wait_for(|s| s.reconnecting).await.unwrap();
    // The half-established session from the failed attempt was released
    assert_eq!(harness.connector.session(0).disconnect_count(), 1);

    harness.wait_for(|s| s.connected).await.unwrap();
    assert_eq!(harness.connector.connect_count(), 2);
    assert_eq!(capture.tracks_created(), 1);
}

// ============================================================================
// Playback sinks
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_track_events_drive_sink_registry() {
    let (harness, _capture) = connected_harness().await;
    let session = harness.connector.session(0);

    session
        .send_event(SfuEvent::TrackSubscribed(audio_track("t-bob", "bob")))
        .await;
    harness.settle().await;
    assert_eq!(harness.sinks.attach_count(), 1);
    assert_eq!(harness.sinks.attached_keys(), vec!["t-bob".to_string()]);
    assert_eq!(
        harness.sinks.probe(0).plays.load(std::sync::atomic::Ordering::SeqCst),
        1
    );

    session
        .send_event(SfuEvent::TrackUnsubscribed {
            track_id: Some("t-bob".to_string()),
            participant_identity: "bob".to_string(),
        })
        .await;
    harness.settle().await;
    assert_eq!(harness.sinks.total_detaches(), 1);

    // A duplicate unsubscribe is harmless
    session
        .send_event(SfuEvent::TrackUnsubscribed {
            track_id: Some("t-bob".to_string()),
            participant_identity: "bob".to_string(),
        })
        .await;
    harness.settle().await;
    assert_eq!(harness.sinks.total_detaches(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_teardown_detaches_every_sink() {
    let (harness, _capture) = connected_harness().await;
    let session = harness.connector.session(0);

    session
        .send_event(SfuEvent::TrackSubscribed(audio_track("t-bob", "bob")))
        .await;
    session
        .send_event(SfuEvent::TrackSubscribed(audio_track("t-carol", "carol")))
        .await;
    harness.settle().await;
    assert_eq!(harness.sinks.attach_count(), 2);

    harness.handle.leave().await.unwrap();
    harness.wait_for(|s| !s.connected).await.unwrap();
    harness.settle().await;
    assert_eq!(harness.sinks.total_detaches(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_blocked_playback_resumed_by_user_gesture() {
    let (harness, _capture) = connected_harness().await;
    let session = harness.connector.session(0);

    harness.sinks.block_next();
    session
        .send_event(SfuEvent::TrackSubscribed(audio_track("t-bob", "bob")))
        .await;
    let snapshot = harness.wait_for(|s| s.audio_blocked).await.unwrap();
    // Blocked playback is not an error
    assert!(snapshot.error.is_none());

    // Simulate the user gesture unblocking the platform
    harness
        .sinks
        .probe(0)
        .block
        .store(false, std::sync::atomic::Ordering::SeqCst);
    assert!(harness.handle.start_audio().await.unwrap());
    harness.wait_for(|s| !s.audio_blocked).await.unwrap();
}
