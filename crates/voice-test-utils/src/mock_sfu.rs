//! Scriptable SFU connector, session, and capture source mocks.
//!
//! The connector consumes a script of connect outcomes (success, failure, or
//! hang-until-released) and exposes every established session's state so
//! tests can inject track events, force disconnects, and count teardowns.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, Notify};
use voice_client::protocol::SessionCredential;
use voice_client::transport::{
    AudioTrackOptions, CaptureSource, LocalAudioTrack, SfuConnector, SfuEvent, SfuSession,
    TransportError,
};

/// One scripted outcome for a `connect` call.
enum ConnectOutcome {
    /// Establish a session immediately.
    Ok,
    /// Fail with the given raw error.
    Err(TransportError),
    /// Park the call until [`MockConnector::release_hanging`] is invoked,
    /// then establish a session.
    Hang,
}

/// Observable state of one established mock session.
pub struct MockSessionState {
    events_tx: mpsc::Sender<SfuEvent>,
    /// Number of `publish` calls on this session.
    pub publishes: AtomicUsize,
    /// Number of `disconnect` calls on this session.
    pub disconnects: AtomicUsize,
    publish_fail: Mutex<Option<TransportError>>,
}

impl MockSessionState {
    fn new(events_tx: mpsc::Sender<SfuEvent>) -> Self {
        Self {
            events_tx,
            publishes: AtomicUsize::new(0),
            disconnects: AtomicUsize::new(0),
            publish_fail: Mutex::new(None),
        }
    }

    /// Inject a session event (track subscribed, disconnect notice, ...).
    ///
    /// # Panics
    ///
    /// Panics if the session's event stream was dropped.
    pub async fn send_event(&self, event: SfuEvent) {
        self.events_tx
            .send(event)
            .await
            .expect("session event stream dropped");
    }

    /// Make the session's `publish` call fail with the given error.
    pub fn fail_publish(&self, error: TransportError) {
        *self.publish_fail.lock().unwrap() = Some(error);
    }

    /// Number of `disconnect` calls observed so far.
    #[must_use]
    pub fn disconnect_count(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }

    /// Number of `publish` calls observed so far.
    #[must_use]
    pub fn publish_count(&self) -> usize {
        self.publishes.load(Ordering::SeqCst)
    }
}

struct MockSession {
    state: Arc<MockSessionState>,
    events_rx: Option<mpsc::Receiver<SfuEvent>>,
}

#[async_trait::async_trait]
impl SfuSession for MockSession {
    async fn publish(&mut self, mut track: Box<dyn LocalAudioTrack>) -> Result<(), TransportError> {
        self.state.publishes.fetch_add(1, Ordering::SeqCst);
        // Take the scripted failure before awaiting; the guard must not live
        // across the suspension point
        let fail = self.state.publish_fail.lock().unwrap().take();
        if let Some(error) = fail {
            track.stop().await;
            return Err(error);
        }
        Ok(())
    }

    fn take_events(&mut self) -> Option<mpsc::Receiver<SfuEvent>> {
        self.events_rx.take()
    }

    async fn disconnect(&mut self) {
        self.state.disconnects.fetch_add(1, Ordering::SeqCst);
    }
}

/// Scriptable mock SFU connector.
///
/// With an empty script every `connect` call succeeds.
#[derive(Default)]
pub struct MockConnector {
    script: Mutex<VecDeque<ConnectOutcome>>,
    sessions: Mutex<Vec<Arc<MockSessionState>>>,
    connects: AtomicUsize,
    release: Notify,
    publish_fail_next: Mutex<Option<TransportError>>,
}

impl MockConnector {
    /// Create a connector that accepts every connect call.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the next connect call to succeed.
    pub fn push_ok(&self) {
        self.script.lock().unwrap().push_back(ConnectOutcome::Ok);
    }

    /// Script the next connect call to fail.
    pub fn push_err(&self, error: TransportError) {
        self.script
            .lock()
            .unwrap()
            .push_back(ConnectOutcome::Err(error));
    }

    /// Script the next connect call to hang until released.
    pub fn push_hanging(&self) {
        self.script.lock().unwrap().push_back(ConnectOutcome::Hang);
    }

    /// Release one hanging connect call; it then establishes a session.
    pub fn release_hanging(&self) {
        self.release.notify_one();
    }

    /// Make the next established session's `publish` call fail.
    pub fn fail_next_publish(&self, error: TransportError) {
        *self.publish_fail_next.lock().unwrap() = Some(error);
    }

    /// Number of `connect` calls observed so far.
    #[must_use]
    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    /// Number of sessions established so far.
    #[must_use]
    pub fn session_count(&self) -> usize {
        self.sessions.lock().unwrap().len()
    }

    /// State of the nth established session.
    ///
    /// # Panics
    ///
    /// Panics if fewer than `index + 1` sessions were established.
    #[must_use]
    pub fn session(&self, index: usize) -> Arc<MockSessionState> {
        Arc::clone(&self.sessions.lock().unwrap()[index])
    }

    fn establish(&self) -> Box<dyn SfuSession> {
        let (events_tx, events_rx) = mpsc::channel(16);
        let state = Arc::new(MockSessionState::new(events_tx));
        if let Some(error) = self.publish_fail_next.lock().unwrap().take() {
            state.fail_publish(error);
        }
        self.sessions.lock().unwrap().push(Arc::clone(&state));
        Box::new(MockSession {
            state,
            events_rx: Some(events_rx),
        })
    }
}

#[async_trait::async_trait]
impl SfuConnector for MockConnector {
    async fn connect(
        &self,
        _credential: &SessionCredential,
    ) -> Result<Box<dyn SfuSession>, TransportError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let outcome = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(ConnectOutcome::Ok);
        match outcome {
            ConnectOutcome::Ok => Ok(self.establish()),
            ConnectOutcome::Err(error) => Err(error),
            ConnectOutcome::Hang => {
                self.release.notified().await;
                Ok(self.establish())
            }
        }
    }
}

/// Mock local audio track counting `stop` calls.
pub struct MockTrack {
    stops: Arc<AtomicUsize>,
}

#[async_trait::async_trait]
impl LocalAudioTrack for MockTrack {
    async fn stop(&mut self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
    }
}

/// Mock capture source.
#[derive(Default)]
pub struct MockCapture {
    device_id: Option<String>,
    /// `stop` calls across every track derived from this source.
    pub track_stops: Arc<AtomicUsize>,
    tracks_created: AtomicUsize,
    fail_next: Mutex<Option<TransportError>>,
}

impl MockCapture {
    /// Create a capture source with no device id.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a capture source reporting the given device id.
    #[must_use]
    pub fn with_device(device_id: impl Into<String>) -> Self {
        Self {
            device_id: Some(device_id.into()),
            ..Self::default()
        }
    }

    /// Make the next track derivation fail.
    pub fn fail_next_track(&self, error: TransportError) {
        *self.fail_next.lock().unwrap() = Some(error);
    }

    /// Number of tracks derived so far.
    #[must_use]
    pub fn tracks_created(&self) -> usize {
        self.tracks_created.load(Ordering::SeqCst)
    }

    /// Number of track `stop` calls observed so far.
    #[must_use]
    pub fn track_stop_count(&self) -> usize {
        self.track_stops.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl CaptureSource for MockCapture {
    fn device_id(&self) -> Option<String> {
        self.device_id.clone()
    }

    async fn create_audio_track(
        &self,
        _options: AudioTrackOptions,
    ) -> Result<Box<dyn LocalAudioTrack>, TransportError> {
        if let Some(error) = self.fail_next.lock().unwrap().take() {
            return Err(error);
        }
        self.tracks_created.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockTrack {
            stops: Arc::clone(&self.track_stops),
        }))
    }
}
