//! Handling of `tcpip-forward` requests

use crate::config::ForwardConfig;
use crate::error::ForwardError;
use crate::provision::provision;
use crate::publisher::{RandomSubdomainGenerator, SubdomainGenerator, SubdomainPublisher};
use crate::session::Session;
use crate::tunnel::{Tunnel, TunnelRegistration};
use sshfwd_proto::ForwardRequest;
use sshfwd_router::{ListenerHandle, ListenerRegistry, ProxyRegistry};
use sshfwd_transport::{ForwardReply, SessionTransport};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Entry point for remote forward requests
///
/// Cheap to clone; all clones share the same registries.
#[derive(Clone)]
pub struct ForwardHandler {
    config: Arc<ForwardConfig>,
    listeners: ListenerRegistry,
    proxies: ProxyRegistry,
    publisher: Arc<SubdomainPublisher>,
}

impl ForwardHandler {
    pub fn new(config: ForwardConfig, listeners: ListenerRegistry, proxies: ProxyRegistry) -> Self {
        let publisher = Arc::new(SubdomainPublisher::new(
            proxies.clone(),
            Arc::new(RandomSubdomainGenerator),
            &config,
        ));
        Self {
            config: Arc::new(config),
            listeners,
            proxies,
            publisher,
        }
    }

    /// Replace the source of subdomain labels
    pub fn with_subdomain_generator(mut self, generator: Arc<dyn SubdomainGenerator>) -> Self {
        self.publisher = Arc::new(SubdomainPublisher::new(
            self.proxies.clone(),
            generator,
            &self.config,
        ));
        self
    }

    pub fn config(&self) -> &ForwardConfig {
        &self.config
    }

    /// Process-wide listener registry
    pub fn listeners(&self) -> &ListenerRegistry {
        &self.listeners
    }

    /// Process-wide HTTP(S) route table
    pub fn proxies(&self) -> &ProxyRegistry {
        &self.proxies
    }

    /// Wrap a freshly authenticated transport in a session
    pub fn session<T: SessionTransport>(
        &self,
        transport: T,
    ) -> (Arc<Session<T>>, mpsc::Receiver<String>) {
        let (session, messages) = Session::new(transport, self.config.message_buffer);
        (Arc::new(session), messages)
    }

    /// Provision, register and announce a tunnel for `request`
    ///
    /// On error nothing is left behind: no registry entries, no route and no
    /// socket file.
    pub async fn open<T: SessionTransport>(
        &self,
        session: &Arc<Session<T>>,
        request: ForwardRequest,
    ) -> Result<Tunnel<T>, ForwardError> {
        let provisioned = provision(&request, session.id(), &self.config).await?;

        let handle = Arc::new(ListenerHandle::new(provisioned.addr.clone(), session.id()));
        let mut registration = TunnelRegistration::register(
            handle,
            self.listeners.clone(),
            session.listeners().clone(),
            self.publisher.clone(),
            provisioned.socket_path,
        );

        let message = match request.scheme() {
            Some(scheme) => {
                // On failure the registration is dropped, undoing the above
                let route = self.publisher.publish(&provisioned.addr, scheme)?;
                let message = format!(
                    "HTTP requests for 80 and 443 can be reached on host: {}",
                    route.proxy_host
                );
                registration.set_route(route);
                message
            }
            None => format!("Connections being forwarded to {}", provisioned.addr),
        };

        info!(
            "✅ Remote forward {}:{} for session {} -> {}",
            request.addr,
            request.rport,
            session.id(),
            provisioned.addr
        );
        session.send_message(message);

        Ok(Tunnel::new(
            session.clone(),
            request,
            provisioned.listener,
            registration,
        ))
    }

    /// Handle a raw `tcpip-forward` global request
    ///
    /// Failures are answered negatively right away. A successful request is
    /// only answered when acknowledgements are enabled; the tunnel then runs
    /// until it is closed.
    pub async fn handle_remote_forward<T, R>(
        &self,
        session: Arc<Session<T>>,
        payload: &[u8],
        reply: R,
    ) where
        T: SessionTransport,
        R: ForwardReply,
    {
        let request = match ForwardRequest::decode(payload) {
            Ok(request) => request,
            Err(e) => {
                warn!("Malformed tcpip-forward from {}: {}", session.id(), e);
                reply.reply(false);
                return;
            }
        };

        let tunnel = match self.open(&session, request).await {
            Ok(tunnel) => tunnel,
            Err(e) => {
                warn!("Remote forward for session {} failed: {}", session.id(), e);
                reply.reply(false);
                return;
            }
        };

        if self.config.ack_success {
            reply.reply(true);
        }

        tunnel.run().await;
    }
}
