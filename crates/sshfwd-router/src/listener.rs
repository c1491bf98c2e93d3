//! Listener identity and close handle

use crate::registry::Registry;
use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Resolved address of a tunnel listener
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ListenerAddr {
    /// TCP listener bound to an IP and port
    Tcp(SocketAddr),
    /// Unix domain socket used as rendezvous point for HTTP(S) routes
    Unix(PathBuf),
}

impl ListenerAddr {
    pub fn is_unix(&self) -> bool {
        matches!(self, ListenerAddr::Unix(_))
    }
}

impl fmt::Display for ListenerAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ListenerAddr::Tcp(addr) => write!(f, "{}", addr),
            ListenerAddr::Unix(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Shared handle onto a live tunnel listener
///
/// Held by the process-wide registry and by the owning session's registry.
/// Either side may close it; closing more than once has no further effect.
/// The accept loop owning the socket watches [`ListenerHandle::closed`] and
/// drops the socket once it fires.
#[derive(Debug)]
pub struct ListenerHandle {
    addr: ListenerAddr,
    session_id: String,
    shutdown: CancellationToken,
}

impl ListenerHandle {
    pub fn new(addr: ListenerAddr, session_id: impl Into<String>) -> Self {
        Self {
            addr,
            session_id: session_id.into(),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn addr(&self) -> &ListenerAddr {
        &self.addr
    }

    /// Remote address of the session that owns this listener
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Close the listener
    pub fn close(&self) {
        if !self.shutdown.is_cancelled() {
            debug!("Closing listener {} (session {})", self.addr, self.session_id);
        }
        self.shutdown.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Resolves once the listener has been closed
    pub async fn closed(&self) {
        self.shutdown.cancelled().await
    }
}

impl Registry<ListenerAddr, Arc<ListenerHandle>> {
    /// Close every listener in this registry
    ///
    /// Entries are not removed; each tunnel unregisters itself as it winds
    /// down.
    pub fn close_all(&self) -> usize {
        let listeners = self.entries();
        for (_, handle) in &listeners {
            handle.close();
        }
        listeners.len()
    }
}
