//! Transport seam
//!
//! The console never talks to the acoustic modem directly: it hands encoded
//! frames to a transport that forwards them to a named gateway. A `true`
//! return only means the transport accepted the bytes locally, not that the
//! target received them.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::time::Duration;

/// Outbound link to gateway relays
#[async_trait]
pub trait AcousticTransport: Send + Sync {
    /// Hand `bytes` to the relay named `gateway`.
    async fn send_raw(&self, bytes: &[u8], gateway: &str) -> bool;
}

/// A frame accepted or refused by [`RecordingTransport`]
#[derive(Debug, Clone, PartialEq)]
pub struct SentFrame {
    pub gateway: String,
    pub bytes: Vec<u8>,
    pub accepted: bool,
    /// Tokio clock reading when the send happened
    pub at: tokio::time::Instant,
}

/// In-memory transport that records every send.
///
/// Accepts everything except gateways listed with
/// [`reject_gateway`](Self::reject_gateway). An optional per-send latency
/// models a slow local link.
#[derive(Debug, Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<SentFrame>>,
    rejected: Mutex<HashSet<String>>,
    /// Refuse sends after this many have been accepted
    accept_limit: Mutex<Option<usize>>,
    latency: Duration,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency,
            ..Self::default()
        }
    }

    pub fn reject_gateway(&self, gateway: &str) {
        self.rejected.lock().insert(gateway.to_string());
    }

    pub fn accept_gateway(&self, gateway: &str) {
        self.rejected.lock().remove(gateway);
    }

    /// Accept at most `limit` further sends, refusing the rest
    pub fn accept_only(&self, limit: usize) {
        *self.accept_limit.lock() = Some(limit);
    }

    pub fn sent(&self) -> Vec<SentFrame> {
        self.sent.lock().clone()
    }

    pub fn accepted_count(&self) -> usize {
        self.sent.lock().iter().filter(|f| f.accepted).count()
    }

    pub fn sent_to(&self, gateway: &str) -> Vec<SentFrame> {
        self.sent
            .lock()
            .iter()
            .filter(|f| f.gateway == gateway)
            .cloned()
            .collect()
    }

    pub fn clear(&self) {
        self.sent.lock().clear();
    }
}

#[async_trait]
impl AcousticTransport for RecordingTransport {
    async fn send_raw(&self, bytes: &[u8], gateway: &str) -> bool {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let mut accepted = !self.rejected.lock().contains(gateway);
        if accepted {
            let mut limit = self.accept_limit.lock();
            if let Some(remaining) = limit.as_mut() {
                if *remaining == 0 {
                    accepted = false;
                } else {
                    *remaining -= 1;
                }
            }
        }

        self.sent.lock().push(SentFrame {
            gateway: gateway.to_string(),
            bytes: bytes.to_vec(),
            accepted,
            at: tokio::time::Instant::now(),
        });
        accepted
    }
}
