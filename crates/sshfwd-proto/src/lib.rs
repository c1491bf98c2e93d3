//! Remote forwarding protocol definitions
//!
//! Payload types exchanged with the SSH session layer for `tcpip-forward`
//! global requests and `forwarded-tcpip` channel opens, plus the wire codec
//! used to (de)serialize them.

pub mod codec;
pub mod messages;

pub use codec::CodecError;
pub use messages::*;

/// Port that is published as a plain HTTP route
pub const HTTP_PORT: u32 = 80;

/// Port that is published as an HTTPS route
pub const HTTPS_PORT: u32 = 443;

/// Channel type opened for every forwarded connection
pub const FORWARDED_TCPIP: &str = "forwarded-tcpip";

/// Global request type carrying a [`ForwardRequest`]
pub const TCPIP_FORWARD: &str = "tcpip-forward";
