//! Playback sink registry.
//!
//! Maps each subscribed remote audio track to exactly one playback sink,
//! keyed by track id with the participant identity as a deterministic
//! fallback. Sinks are created on subscription and destroyed exactly once on
//! unsubscription or full teardown; double-detach is a no-op. A playback
//! rejection by the platform's autoplay policy marks the sink as blocked
//! rather than erroring; blocked sinks can be resumed from a user gesture.

use crate::transport::{AudioSink, AudioSinkFactory, RemoteTrack, TrackKind};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

struct SinkEntry {
    sink: Box<dyn AudioSink>,
    participant_identity: String,
    blocked: bool,
}

/// Registry of live playback sinks for one connection session.
pub struct PlaybackSinkRegistry {
    factory: Arc<dyn AudioSinkFactory>,
    sinks: HashMap<String, SinkEntry>,
}

impl PlaybackSinkRegistry {
    /// Create an empty registry backed by the given sink factory.
    #[must_use]
    pub fn new(factory: Arc<dyn AudioSinkFactory>) -> Self {
        Self {
            factory,
            sinks: HashMap::new(),
        }
    }

    /// Attach a sink for a subscribed remote track and attempt playback.
    ///
    /// Video tracks and the local participant's own tracks are ignored
    /// entirely. Re-attaching an already-known key replaces the old sink
    /// after detaching it.
    pub async fn attach(&mut self, track: &RemoteTrack) {
        if track.kind != TrackKind::Audio || track.is_local {
            debug!(
                target: "voice.sinks",
                participant_identity = %track.participant_identity,
                kind = ?track.kind,
                is_local = track.is_local,
                "Ignoring non-playable track"
            );
            return;
        }

        let key = track.sink_key();
        if let Some(mut stale) = self.sinks.remove(&key) {
            warn!(
                target: "voice.sinks",
                key = %key,
                "Replacing existing sink for re-subscribed track"
            );
            stale.sink.detach();
        }

        let mut sink = self.factory.attach(track);
        let blocked = match sink.play().await {
            Ok(()) => {
                debug!(
                    target: "voice.sinks",
                    key = %key,
                    participant_identity = %track.participant_identity,
                    "Playback started"
                );
                false
            }
            Err(rejection) => {
                // Autoplay policy rejection: kept attached, resumable later
                warn!(
                    target: "voice.sinks",
                    key = %key,
                    participant_identity = %track.participant_identity,
                    error = %rejection,
                    "Audio blocked, waiting for user gesture"
                );
                true
            }
        };

        self.sinks.insert(
            key,
            SinkEntry {
                sink,
                participant_identity: track.participant_identity.clone(),
                blocked,
            },
        );
    }

    /// Detach the sink matching an unsubscribed track. No-op when the key is
    /// unknown (including a second detach for the same track).
    pub fn detach(&mut self, track_id: Option<&str>, participant_identity: &str) {
        let key = track_id.unwrap_or(participant_identity);
        match self.sinks.remove(key) {
            Some(mut entry) => {
                entry.sink.detach();
                debug!(
                    target: "voice.sinks",
                    key = %key,
                    participant_identity = %entry.participant_identity,
                    "Sink detached"
                );
            }
            None => {
                debug!(target: "voice.sinks", key = %key, "Detach for unknown sink ignored");
            }
        }
    }

    /// Re-attempt playback on every blocked sink (from a user gesture).
    ///
    /// Returns true when no sink remains blocked afterwards.
    pub async fn resume_all(&mut self) -> bool {
        for (key, entry) in &mut self.sinks {
            if !entry.blocked {
                continue;
            }
            match entry.sink.play().await {
                Ok(()) => {
                    entry.blocked = false;
                    debug!(target: "voice.sinks", key = %key, "Blocked sink resumed");
                }
                Err(rejection) => {
                    warn!(
                        target: "voice.sinks",
                        key = %key,
                        error = %rejection,
                        "Sink still blocked after resume attempt"
                    );
                }
            }
        }
        !self.audio_blocked()
    }

    /// Detach and drop every sink (session teardown, disposal). Idempotent.
    pub fn clear(&mut self) {
        for (key, mut entry) in self.sinks.drain() {
            entry.sink.detach();
            debug!(target: "voice.sinks", key = %key, "Sink detached on teardown");
        }
    }

    /// Whether any sink is waiting on a user gesture to start playback.
    #[must_use]
    pub fn audio_blocked(&self) -> bool {
        self.sinks.values().any(|entry| entry.blocked)
    }

    /// Number of live sinks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    /// Whether the registry holds no sinks.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::transport::PlaybackBlocked;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct SinkProbe {
        plays: AtomicUsize,
        detaches: AtomicUsize,
        block: AtomicBool,
    }

    struct ProbeSink(Arc<SinkProbe>);

    #[async_trait::async_trait]
    impl AudioSink for ProbeSink {
        async fn play(&mut self) -> Result<(), PlaybackBlocked> {
            self.0.plays.fetch_add(1, Ordering::SeqCst);
            if self.0.block.load(Ordering::SeqCst) {
                Err(PlaybackBlocked)
            } else {
                Ok(())
            }
        }

        fn detach(&mut self) {
            self.0.detaches.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[derive(Default)]
    struct ProbeFactory {
        probes: Mutex<Vec<Arc<SinkProbe>>>,
        block_next: AtomicBool,
    }

    impl ProbeFactory {
        fn probe(&self, index: usize) -> Arc<SinkProbe> {
            Arc::clone(&self.probes.lock().unwrap()[index])
        }
    }

    impl AudioSinkFactory for ProbeFactory {
        fn attach(&self, _track: &RemoteTrack) -> Box<dyn AudioSink> {
            let probe = Arc::new(SinkProbe::default());
            if self.block_next.swap(false, Ordering::SeqCst) {
                probe.block.store(true, Ordering::SeqCst);
            }
            self.probes.lock().unwrap().push(Arc::clone(&probe));
            Box::new(ProbeSink(probe))
        }
    }

    fn audio_track(track_id: Option<&str>, identity: &str) -> RemoteTrack {
        RemoteTrack {
            track_id: track_id.map(ToString::to_string),
            participant_identity: identity.to_string(),
            kind: TrackKind::Audio,
            is_local: false,
        }
    }

    #[tokio::test]
    async fn test_attach_plays_and_detach_removes_exactly_one() {
        let factory = Arc::new(ProbeFactory::default());
        let mut registry = PlaybackSinkRegistry::new(Arc::clone(&factory) as _);

        registry.attach(&audio_track(Some("t1"), "alice")).await;
        registry.attach(&audio_track(Some("t2"), "bob")).await;
        assert_eq!(registry.len(), 2);
        assert_eq!(factory.probe(0).plays.load(Ordering::SeqCst), 1);

        registry.detach(Some("t1"), "alice");
        assert_eq!(registry.len(), 1);
        assert_eq!(factory.probe(0).detaches.load(Ordering::SeqCst), 1);
        // The other participant's sink is untouched
        assert_eq!(factory.probe(1).detaches.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_double_detach_is_noop() {
        let factory = Arc::new(ProbeFactory::default());
        let mut registry = PlaybackSinkRegistry::new(Arc::clone(&factory) as _);

        registry.attach(&audio_track(Some("t1"), "alice")).await;
        registry.detach(Some("t1"), "alice");
        registry.detach(Some("t1"), "alice");
        assert_eq!(factory.probe(0).detaches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_identity_fallback_key() {
        let factory = Arc::new(ProbeFactory::default());
        let mut registry = PlaybackSinkRegistry::new(Arc::clone(&factory) as _);

        registry.attach(&audio_track(None, "alice")).await;
        assert_eq!(registry.len(), 1);

        registry.detach(None, "alice");
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_video_and_local_tracks_ignored() {
        let factory = Arc::new(ProbeFactory::default());
        let mut registry = PlaybackSinkRegistry::new(Arc::clone(&factory) as _);

        let mut video = audio_track(Some("v1"), "alice");
        video.kind = TrackKind::Video;
        registry.attach(&video).await;

        let mut own = audio_track(Some("t1"), "me");
        own.is_local = true;
        registry.attach(&own).await;

        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_blocked_playback_then_resume() {
        let factory = Arc::new(ProbeFactory::default());
        let mut registry = PlaybackSinkRegistry::new(Arc::clone(&factory) as _);

        factory.block_next.store(true, Ordering::SeqCst);
        registry.attach(&audio_track(Some("t1"), "alice")).await;
        assert!(registry.audio_blocked());

        // User gesture: unblock and resume
        factory.probe(0).block.store(false, Ordering::SeqCst);
        assert!(registry.resume_all().await);
        assert!(!registry.audio_blocked());
        assert_eq!(factory.probe(0).plays.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_reattach_replaces_existing_sink() {
        let factory = Arc::new(ProbeFactory::default());
        let mut registry = PlaybackSinkRegistry::new(Arc::clone(&factory) as _);

        registry.attach(&audio_track(Some("t1"), "alice")).await;
        registry.attach(&audio_track(Some("t1"), "alice")).await;

        assert_eq!(registry.len(), 1);
        assert_eq!(factory.probe(0).detaches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_clear_detaches_everything() {
        let factory = Arc::new(ProbeFactory::default());
        let mut registry = PlaybackSinkRegistry::new(Arc::clone(&factory) as _);

        registry.attach(&audio_track(Some("t1"), "alice")).await;
        registry.attach(&audio_track(Some("t2"), "bob")).await;
        registry.clear();

        assert!(registry.is_empty());
        assert_eq!(factory.probe(0).detaches.load(Ordering::SeqCst), 1);
        assert_eq!(factory.probe(1).detaches.load(Ordering::SeqCst), 1);
        // clear again is harmless
        registry.clear();
    }
}
