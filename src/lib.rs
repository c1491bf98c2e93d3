//! sshfwd: remote port forwarding core for an SSH reverse-tunnel server
//!
//! The session layer hands every `tcpip-forward` request to a
//! [`ForwardHandler`], which binds a listener on the server, relays each
//! accepted connection over a `forwarded-tcpip` channel back to the client,
//! and publishes a hostname route for HTTP(S) ports.
//!
//! ```no_run
//! use sshfwd::{ForwardConfig, ForwardHandler, ListenerRegistry, ProxyRegistry};
//!
//! sshfwd::init_logging("info").ok();
//! let handler = ForwardHandler::new(
//!     ForwardConfig::default(),
//!     ListenerRegistry::new(),
//!     ProxyRegistry::new(),
//! );
//! assert!(handler.listeners().is_empty());
//! ```

pub mod logging;

pub use logging::init_logging;

pub use sshfwd_control::{
    ForwardConfig, ForwardError, ForwardHandler, RandomSubdomainGenerator, RelayStats, Session,
    SubdomainGenerator, Tunnel, TunnelState,
};
pub use sshfwd_proto::{ForwardRequest, ForwardedTcpIpPayload, Scheme};
pub use sshfwd_router::{
    ListenerAddr, ListenerHandle, ListenerRegistry, ProxyHolder, ProxyRegistry,
};
pub use sshfwd_transport::{ForwardReply, SessionTransport, TransportError};
