//! Mock signaling emitter.
//!
//! Records every outbound intent for later assertion and can be configured
//! to report a down transport or to fail the next emit.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use voice_client::protocol::ClientEvent;
use voice_client::transport::{SignalingEmitter, TransportError};

/// Mock signaling transport (outbound half).
#[derive(Default)]
pub struct MockEmitter {
    connected: AtomicBool,
    emitted: Mutex<Vec<ClientEvent>>,
    fail_next: Mutex<Option<TransportError>>,
}

impl MockEmitter {
    /// Create a connected mock emitter.
    #[must_use]
    pub fn new() -> Self {
        let emitter = Self::default();
        emitter.connected.store(true, Ordering::SeqCst);
        emitter
    }

    /// Flip the reported transport connectivity.
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// Make the next `emit` call fail with the given error.
    pub fn fail_next_emit(&self, error: TransportError) {
        *self.fail_next.lock().unwrap() = Some(error);
    }

    /// All intents emitted so far, in order.
    #[must_use]
    pub fn emitted(&self) -> Vec<ClientEvent> {
        self.emitted.lock().unwrap().clone()
    }

    /// Number of intents emitted so far.
    #[must_use]
    pub fn emitted_count(&self) -> usize {
        self.emitted.lock().unwrap().len()
    }

    /// Drain and return the recorded intents.
    #[must_use]
    pub fn take_emitted(&self) -> Vec<ClientEvent> {
        std::mem::take(&mut *self.emitted.lock().unwrap())
    }
}

#[async_trait::async_trait]
impl SignalingEmitter for MockEmitter {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn emit(&self, event: ClientEvent) -> Result<(), TransportError> {
        if let Some(error) = self.fail_next.lock().unwrap().take() {
            return Err(error);
        }
        self.emitted.lock().unwrap().push(event);
        Ok(())
    }
}
