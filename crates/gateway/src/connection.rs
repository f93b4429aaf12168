use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use {serde::Serialize, tokio::sync::mpsc, tracing::debug};

use crate::error::SendError;

// ── Outbound frames ──────────────────────────────────────────────────────────

/// What a connection's write loop should do next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// A serialized JSON text frame. Shared so a broadcast serializes once.
    Frame(Arc<str>),
    /// Send a close frame and stop writing.
    Close { code: u16, reason: String },
}

// ── Connection handle ────────────────────────────────────────────────────────

/// Handle to one live WebSocket connection (observer or participant).
///
/// Frames are queued on a bounded channel drained by the connection's write
/// loop; the handle never touches the socket itself.
#[derive(Debug)]
pub struct Connection {
    pub conn_id: String,
    sender: mpsc::Sender<Outbound>,
    pub connected_at: Instant,
}

impl Connection {
    pub fn new(sender: mpsc::Sender<Outbound>) -> Self {
        Self {
            conn_id: uuid::Uuid::new_v4().to_string(),
            sender,
            connected_at: Instant::now(),
        }
    }

    /// Create a connection together with the receiving end its write loop
    /// drains.
    pub fn channel(capacity: usize) -> (Arc<Self>, mpsc::Receiver<Outbound>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Arc::new(Self::new(tx)), rx)
    }

    /// Queue a pre-serialized frame, waiting at most `timeout` for room.
    pub async fn send(&self, frame: Arc<str>, timeout: Duration) -> Result<(), SendError> {
        self.sender
            .send_timeout(Outbound::Frame(frame), timeout)
            .await
            .map_err(|e| match e {
                mpsc::error::SendTimeoutError::Timeout(_) => SendError::TimedOut,
                mpsc::error::SendTimeoutError::Closed(_) => SendError::Closed,
            })
    }

    /// Serialize `value` and queue it.
    pub async fn send_json<T: Serialize>(
        &self,
        value: &T,
        timeout: Duration,
    ) -> Result<(), SendError> {
        let json = serde_json::to_string(value).map_err(|_| SendError::Serialize)?;
        self.send(Arc::from(json), timeout).await
    }

    /// Ask the write loop to close the socket. Returns `false` if the
    /// connection is already gone or its queue is full.
    pub fn close(&self, code: u16, reason: &str) -> bool {
        let queued = self
            .sender
            .try_send(Outbound::Close {
                code,
                reason: reason.to_string(),
            })
            .is_ok();
        if !queued {
            debug!(conn_id = %self.conn_id, "close frame not queued");
        }
        queued
    }
}
