//! Remote port forwarding core
//!
//! Turns `tcpip-forward` requests into live tunnels: a listener is bound on
//! the server (TCP, or a Unix socket for HTTP/HTTPS), every accepted
//! connection is relayed over a fresh `forwarded-tcpip` channel, and all
//! state is withdrawn when the listener or its session closes.

pub mod config;
pub mod error;
pub mod handler;
pub mod provision;
pub mod publisher;
pub mod relay;
pub mod session;
pub mod tunnel;

pub use config::ForwardConfig;
pub use error::ForwardError;
pub use handler::ForwardHandler;
pub use provision::{provision, ForwardListener, ForwardedStream, ProvisionedListener, SocketPath};
pub use publisher::{RandomSubdomainGenerator, SubdomainGenerator, SubdomainPublisher};
pub use relay::{relay, RelayStats};
pub use session::Session;
pub use tunnel::{Tunnel, TunnelState};
