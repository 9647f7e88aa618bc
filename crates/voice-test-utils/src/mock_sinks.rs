//! Playback sink factory mock with per-sink probes.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use voice_client::transport::{AudioSink, AudioSinkFactory, PlaybackBlocked, RemoteTrack};

/// Counters and switches for one attached sink.
#[derive(Default)]
pub struct SinkProbe {
    /// Number of `play` calls.
    pub plays: AtomicUsize,
    /// Number of `detach` calls.
    pub detaches: AtomicUsize,
    /// When set, `play` fails with [`PlaybackBlocked`].
    pub block: AtomicBool,
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

/// Mock sink factory recording every attachment.
#[derive(Default)]
pub struct MockSinkFactory {
    attached: Mutex<Vec<(String, Arc<SinkProbe>)>>,
    block_next: AtomicBool,
}

impl MockSinkFactory {
    /// Create an empty factory; every sink plays successfully by default.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next attached sink report blocked playback until its probe's
    /// `block` flag is cleared.
    pub fn block_next(&self) {
        self.block_next.store(true, Ordering::SeqCst);
    }

    /// Number of sinks attached so far.
    #[must_use]
    pub fn attach_count(&self) -> usize {
        self.attached.lock().unwrap().len()
    }

    /// Sink keys attached so far, in order.
    #[must_use]
    pub fn attached_keys(&self) -> Vec<String> {
        self.attached
            .lock()
            .unwrap()
            .iter()
            .map(|(key, _)| key.clone())
            .collect()
    }

    /// Probe of the nth attached sink.
    ///
    /// # Panics
    ///
    /// Panics if fewer than `index + 1` sinks were attached.
    #[must_use]
    pub fn probe(&self, index: usize) -> Arc<SinkProbe> {
        Arc::clone(&self.attached.lock().unwrap()[index].1)
    }

    /// Total `detach` calls across every sink ever attached.
    #[must_use]
    pub fn total_detaches(&self) -> usize {
        self.attached
            .lock()
            .unwrap()
            .iter()
            .map(|(_, probe)| probe.detaches.load(Ordering::SeqCst))
            .sum()
    }
}

impl AudioSinkFactory for MockSinkFactory {
    fn attach(&self, track: &RemoteTrack) -> Box<dyn AudioSink> {
        let probe = Arc::new(SinkProbe::default());
        if self.block_next.swap(false, Ordering::SeqCst) {
            probe.block.store(true, Ordering::SeqCst);
        }
        self.attached
            .lock()
            .unwrap()
            .push((track.sink_key(), Arc::clone(&probe)));
        Box::new(ProbeSink(probe))
    }
}
