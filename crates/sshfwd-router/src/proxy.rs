//! HTTP route published for web-port tunnels

use serde::Serialize;
use sshfwd_proto::Scheme;

/// Route from a generated hostname to a tunnel's rendezvous socket
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProxyHolder {
    /// Generated public hostname, e.g. `abc.example.com`
    pub proxy_host: String,
    /// Listener address the reverse proxy forwards to
    pub proxy_to: String,
    /// Scheme the tunnel was requested for
    pub scheme: Scheme,
}
