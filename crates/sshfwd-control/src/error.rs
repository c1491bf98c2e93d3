use sshfwd_proto::CodecError;
use thiserror::Error;

/// Errors that fail a remote forward request before its tunnel goes live
///
/// Every variant is answered with a negative acknowledgement; none of them
/// leaves registry entries or socket files behind.
#[derive(Debug, Error)]
pub enum ForwardError {
    #[error("Invalid forward request: {0}")]
    InvalidRequest(#[from] CodecError),

    #[error("Requested port {0} is out of range")]
    InvalidPort(u32),

    #[error("Failed to reserve socket name in {dir}: {source}")]
    SocketName {
        dir: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to bind to {address}: {reason}")]
    BindError { address: String, reason: String },

    #[error("No free hostname under {root_domain} after {attempts} attempts")]
    HostnameExhausted { root_domain: String, attempts: usize },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}
