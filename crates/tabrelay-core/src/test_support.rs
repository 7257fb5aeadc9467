//! Helpers shared by unit tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use serde_json::Value;
use tabrelay_protocols::{ExtensionHello, TransportError, TransportHandle};

/// Transport that records every frame instead of writing to a socket.
#[derive(Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<String>>,
    closed: AtomicBool,
    refuse: AtomicBool,
}

impl RecordingTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make every later send fail as if the socket were gone.
    pub fn refuse_sends(&self) {
        self.refuse.store(true, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().clone()
    }

    pub fn sent_json(&self) -> Vec<Value> {
        self.sent()
            .iter()
            .map(|text| serde_json::from_str(text).expect("frames are JSON"))
            .collect()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl TransportHandle for RecordingTransport {
    fn send(&self, text: String) -> Result<(), TransportError> {
        if self.refuse.load(Ordering::SeqCst) || self.is_closed() {
            return Err(TransportError::Closed);
        }
        self.sent.lock().push(text);
        Ok(())
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

pub fn hello(extension_id: &str) -> ExtensionHello {
    ExtensionHello {
        extension_id: extension_id.to_string(),
        version: Some("1.0.0".to_string()),
        tab_url: None,
    }
}
