//! Seam between the forwarding core and the secure session layer
//!
//! The SSH transport itself (key exchange, authentication, channel
//! multiplexing) lives outside this workspace. The forwarding core only needs
//! two things from it:
//!
//! 1. a way to open a `forwarded-tcpip` logical channel for every accepted
//!    connection ([`SessionTransport`]), and
//! 2. a way to answer the originating `tcpip-forward` request
//!    ([`ForwardReply`]).

use async_trait::async_trait;
use sshfwd_proto::ForwardedTcpIpPayload;
use std::fmt::Debug;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::oneshot;

#[cfg(any(test, feature = "mock"))]
pub mod memory;

/// Transport-level errors
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("ssh: rejected: {reason}")]
    Rejected { reason: String },

    #[error("ssh: session closed")]
    SessionClosed,
}

/// Result type for transport operations
pub type TransportResult<T> = Result<T, TransportError>;

/// An authenticated, multiplexed session able to carry many logical channels
#[async_trait]
pub trait SessionTransport: Send + Sync + Debug + 'static {
    /// The logical channel type opened by this session
    type Channel: AsyncRead + AsyncWrite + Send + Unpin + 'static;

    /// Open a new `forwarded-tcpip` channel towards the client
    async fn open_forwarded_tcpip(
        &self,
        payload: &ForwardedTcpIpPayload,
    ) -> TransportResult<Self::Channel>;

    /// Remote address of the client, as reported by the session layer
    fn remote_address(&self) -> String;
}

/// Acknowledgement of the originating `tcpip-forward` request
pub trait ForwardReply: Send {
    fn reply(self, success: bool);
}

impl ForwardReply for oneshot::Sender<bool> {
    fn reply(self, success: bool) {
        // The requester may have gone away already
        let _ = self.send(success);
    }
}

/// Reply sink for requests that did not ask for an answer
impl ForwardReply for () {
    fn reply(self, _success: bool) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejected_error_text() {
        let err = TransportError::Rejected {
            reason: "administratively prohibited".to_string(),
        };
        assert_eq!(err.to_string(), "ssh: rejected: administratively prohibited");
    }

    #[tokio::test]
    async fn test_oneshot_reply() {
        let (tx, rx) = oneshot::channel();
        tx.reply(false);
        assert!(!rx.await.unwrap());
    }

    #[test]
    fn test_reply_after_receiver_dropped() {
        let (tx, rx) = oneshot::channel::<bool>();
        drop(rx);
        tx.reply(true);
    }
}
