//! A live remote forward: listener, registrations and accept loop

use crate::provision::{ForwardListener, SocketPath};
use crate::publisher::SubdomainPublisher;
use crate::relay::relay;
use crate::session::Session;
use sshfwd_proto::{ForwardRequest, ForwardedTcpIpPayload};
use sshfwd_router::{ListenerAddr, ListenerHandle, ListenerRegistry, ProxyHolder};
use sshfwd_transport::SessionTransport;
use std::io;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Lifecycle of a tunnel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TunnelState {
    Provisioning,
    Active,
    Closing,
    Closed,
}

/// Everything a tunnel has published about itself
///
/// Teardown withdraws all of it exactly once, either explicitly or when the
/// registration is dropped.
pub(crate) struct TunnelRegistration {
    handle: Arc<ListenerHandle>,
    global: ListenerRegistry,
    session: ListenerRegistry,
    publisher: Arc<SubdomainPublisher>,
    route: Option<ProxyHolder>,
    socket_path: Option<SocketPath>,
    torn_down: bool,
}

impl TunnelRegistration {
    /// Insert the listener into the process-wide and session registries
    pub(crate) fn register(
        handle: Arc<ListenerHandle>,
        global: ListenerRegistry,
        session: ListenerRegistry,
        publisher: Arc<SubdomainPublisher>,
        socket_path: Option<SocketPath>,
    ) -> Self {
        let addr = handle.addr().clone();
        global.insert(addr.clone(), handle.clone());
        session.insert(addr, handle.clone());
        Self {
            handle,
            global,
            session,
            publisher,
            route: None,
            socket_path,
            torn_down: false,
        }
    }

    pub(crate) fn set_route(&mut self, route: ProxyHolder) {
        self.route = Some(route);
    }

    pub(crate) fn route(&self) -> Option<&ProxyHolder> {
        self.route.as_ref()
    }

    pub(crate) fn handle(&self) -> &Arc<ListenerHandle> {
        &self.handle
    }

    pub(crate) fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;

        self.handle.close();

        // Only remove entries that still belong to this tunnel
        let addr = self.handle.addr();
        let ours = |current: &Arc<ListenerHandle>| Arc::ptr_eq(current, &self.handle);
        self.global.remove_if(addr, ours);
        self.session.remove_if(addr, ours);

        if let Some(route) = self.route.take() {
            self.publisher.unpublish(&route);
        }
        if let Some(socket_path) = self.socket_path.as_mut() {
            socket_path.remove();
        }

        debug!("Tunnel {} torn down", addr);
    }
}

impl Drop for TunnelRegistration {
    fn drop(&mut self) {
        self.teardown();
    }
}

/// A forwarded listener bound to one session
///
/// Returned by [`crate::ForwardHandler::open`] in the `Active` state. Call
/// [`Tunnel::run`] to serve connections until the listener or the session is
/// closed.
pub struct Tunnel<T: SessionTransport> {
    session: Arc<Session<T>>,
    request: ForwardRequest,
    listener: ForwardListener,
    registration: TunnelRegistration,
    state: TunnelState,
}

impl<T: SessionTransport> Tunnel<T> {
    pub(crate) fn new(
        session: Arc<Session<T>>,
        request: ForwardRequest,
        listener: ForwardListener,
        registration: TunnelRegistration,
    ) -> Self {
        Self {
            session,
            request,
            listener,
            registration,
            state: TunnelState::Active,
        }
    }

    /// Resolved listener address
    pub fn addr(&self) -> &ListenerAddr {
        self.registration.handle().addr()
    }

    /// Published hostname, for HTTP(S) tunnels
    pub fn hostname(&self) -> Option<&str> {
        self.registration.route().map(|r| r.proxy_host.as_str())
    }

    pub fn request(&self) -> &ForwardRequest {
        &self.request
    }

    pub fn state(&self) -> TunnelState {
        self.state
    }

    /// Close handle for this tunnel's listener
    pub fn handle(&self) -> Arc<ListenerHandle> {
        self.registration.handle().clone()
    }

    /// Serve connections until the listener or the session closes
    ///
    /// Connections already being relayed keep running after the tunnel stops.
    pub async fn run(mut self) -> TunnelState {
        let handle = self.handle();
        let session_closed = self.session.close_signal();

        let watcher = {
            let handle = handle.clone();
            tokio::spawn(async move {
                tokio::select! {
                    _ = session_closed.cancelled() => handle.close(),
                    _ = handle.closed() => {}
                }
            })
        };

        info!("Tunnel {} accepting connections", self.addr());
        self.accept_loop(&handle).await;

        self.state = TunnelState::Closing;
        debug!("Tunnel {} closing", handle.addr());
        self.registration.teardown();
        if let Err(e) = watcher.await {
            warn!("Tunnel watcher failed: {}", e);
        }
        self.state = TunnelState::Closed;

        info!("Tunnel {} closed", handle.addr());
        self.state
    }

    async fn accept_loop(&self, handle: &ListenerHandle) {
        loop {
            let accepted = tokio::select! {
                biased;
                _ = handle.closed() => break,
                accepted = self.listener.accept() => accepted,
            };

            let (stream, peer) = match accepted {
                Ok(accepted) => accepted,
                Err(e) if is_transient(&e) => {
                    debug!("Transient accept error on {}: {}", handle.addr(), e);
                    continue;
                }
                Err(e) => {
                    error!("Accept failed on {}: {}", handle.addr(), e);
                    break;
                }
            };

            debug!("Accepted connection from {} on {}", peer, handle.addr());

            let payload = ForwardedTcpIpPayload::for_request(&self.request);
            let channel = match self.session.transport().open_forwarded_tcpip(&payload).await {
                Ok(channel) => channel,
                Err(e) => {
                    warn!(
                        "Failed to open forwarded-tcpip channel for {} on {}: {}",
                        peer,
                        handle.addr(),
                        e
                    );
                    self.session.send_message(e.to_string());
                    // Dropping the stream closes the accepted connection
                    continue;
                }
            };

            tokio::spawn(async move {
                let stats = relay(stream, channel).await;
                debug!(
                    "Connection from {} finished ({} bytes out, {} bytes in)",
                    peer, stats.to_channel, stats.to_connection
                );
            });
        }
    }
}

fn is_transient(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock
    )
}
