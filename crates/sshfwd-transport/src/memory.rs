//! In-memory session transport for tests
//!
//! Every opened channel is one end of a [`tokio::io::duplex`] pipe; the other
//! end is handed to the test through an unbounded receiver, standing in for
//! the SSH client.

use super::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::io::DuplexStream;
use tokio::sync::mpsc;

/// Default per-direction buffer of the in-memory pipes
const DEFAULT_PIPE_CAPACITY: usize = 64 * 1024;

/// Client side of a channel opened through [`MemoryTransport`]
#[derive(Debug)]
pub struct OpenedChannel {
    pub payload: ForwardedTcpIpPayload,
    pub stream: DuplexStream,
}

/// Mock session transport
#[derive(Debug)]
pub struct MemoryTransport {
    remote_addr: String,
    opened_tx: mpsc::UnboundedSender<OpenedChannel>,
    pending_failures: AtomicUsize,
    open_attempts: AtomicUsize,
    pipe_capacity: usize,
}

impl MemoryTransport {
    pub fn new(remote_addr: impl Into<String>) -> (Self, mpsc::UnboundedReceiver<OpenedChannel>) {
        let (opened_tx, opened_rx) = mpsc::unbounded_channel();
        let transport = Self {
            remote_addr: remote_addr.into(),
            opened_tx,
            pending_failures: AtomicUsize::new(0),
            open_attempts: AtomicUsize::new(0),
            pipe_capacity: DEFAULT_PIPE_CAPACITY,
        };
        (transport, opened_rx)
    }

    /// Reject the next `count` channel opens
    pub fn fail_next_opens(&self, count: usize) {
        self.pending_failures.store(count, Ordering::SeqCst);
    }

    /// Number of channel opens attempted so far, successful or not
    pub fn open_attempts(&self) -> usize {
        self.open_attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SessionTransport for MemoryTransport {
    type Channel = DuplexStream;

    async fn open_forwarded_tcpip(
        &self,
        payload: &ForwardedTcpIpPayload,
    ) -> TransportResult<Self::Channel> {
        self.open_attempts.fetch_add(1, Ordering::SeqCst);

        let should_fail = self
            .pending_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if should_fail {
            return Err(TransportError::Rejected {
                reason: "connect failed (mock)".to_string(),
            });
        }

        let (server_end, client_end) = tokio::io::duplex(self.pipe_capacity);
        self.opened_tx
            .send(OpenedChannel {
                payload: payload.clone(),
                stream: client_end,
            })
            .map_err(|_| TransportError::SessionClosed)?;

        Ok(server_end)
    }

    fn remote_address(&self) -> String {
        self.remote_addr.clone()
    }
}
