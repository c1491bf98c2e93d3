//! Per-session state shared by all tunnels of one SSH connection

use sshfwd_router::ListenerRegistry;
use sshfwd_transport::SessionTransport;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// One authenticated, multiplexed client session
///
/// Created by the session layer when a client connects. Tunnels opened on
/// the session register their listeners in [`Session::listeners`] and stop
/// once [`Session::close`] is called.
pub struct Session<T: SessionTransport> {
    id: String,
    transport: Arc<T>,
    messages: mpsc::Sender<String>,
    closed: CancellationToken,
    listeners: ListenerRegistry,
}

impl<T: SessionTransport> Session<T> {
    /// Create a session and the receiving end of its status message stream
    pub fn new(transport: T, message_capacity: usize) -> (Self, mpsc::Receiver<String>) {
        let (messages, messages_rx) = mpsc::channel(message_capacity.max(1));
        let session = Self {
            id: transport.remote_address(),
            transport: Arc::new(transport),
            messages,
            closed: CancellationToken::new(),
            listeners: ListenerRegistry::new(),
        };
        (session, messages_rx)
    }

    /// Remote address of the client
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn transport(&self) -> &Arc<T> {
        &self.transport
    }

    /// Listeners currently owned by this session
    pub fn listeners(&self) -> &ListenerRegistry {
        &self.listeners
    }

    /// Queue a status line for the client
    ///
    /// Never waits: if the buffer is full the message is dropped. Returns
    /// whether the message was queued.
    pub fn send_message(&self, message: impl Into<String>) -> bool {
        match self.messages.try_send(message.into()) {
            Ok(()) => true,
            Err(TrySendError::Full(message)) => {
                warn!(
                    "Message buffer full for session {}, dropping: {}",
                    self.id, message
                );
                false
            }
            Err(TrySendError::Closed(_)) => {
                debug!("Message stream for session {} is gone", self.id);
                false
            }
        }
    }

    /// Signal that the session has ended
    pub fn close(&self) {
        if !self.closed.is_cancelled() {
            debug!("Session {} closed", self.id);
        }
        self.closed.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Resolves once the session has ended
    pub async fn closed(&self) {
        self.closed.cancelled().await
    }

    /// Owned copy of the closure signal for spawned watchers
    pub fn close_signal(&self) -> CancellationToken {
        self.closed.clone()
    }

    /// Close every listener this session owns
    pub fn close_listeners(&self) -> usize {
        self.listeners.close_all()
    }
}
