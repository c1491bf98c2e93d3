//! Forwarding payloads

use crate::codec::{put_string, CodecError, WireReader};
use crate::{HTTPS_PORT, HTTP_PORT};
use bytes::{BufMut, Bytes, BytesMut};
use serde::Serialize;
use std::fmt;

/// Parsed `tcpip-forward` request: the client asks the server to listen on
/// `addr:rport` on its behalf
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardRequest {
    /// Bind address; empty means "any"
    pub addr: String,
    /// Requested port; 0 lets the OS pick one
    pub rport: u32,
}

impl ForwardRequest {
    pub fn new(addr: impl Into<String>, rport: u32) -> Self {
        Self {
            addr: addr.into(),
            rport,
        }
    }

    /// Decode a request from its wire payload
    pub fn decode(payload: &[u8]) -> Result<Self, CodecError> {
        let mut reader = WireReader::new(payload);
        let addr = reader.read_string("addr")?;
        let rport = reader.read_u32("rport")?;
        reader.finish()?;
        Ok(Self { addr, rport })
    }

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(8 + self.addr.len());
        put_string(&mut buf, &self.addr);
        buf.put_u32(self.rport);
        buf.freeze()
    }

    /// Whether this request targets one of the web ports (80/443)
    pub fn is_web_port(&self) -> bool {
        self.scheme().is_some()
    }

    /// Scheme of the published route for web ports
    pub fn scheme(&self) -> Option<Scheme> {
        match self.rport {
            HTTP_PORT => Some(Scheme::Http),
            HTTPS_PORT => Some(Scheme::Https),
            _ => None,
        }
    }
}

/// Scheme a published HTTP route is served under
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Scheme {
    Http,
    Https,
}

impl Scheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::Http => "http",
            Scheme::Https => "https",
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload of a `forwarded-tcpip` channel open, one per accepted connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardedTcpIpPayload {
    pub addr: String,
    pub port: u32,
    pub origin_addr: String,
    pub origin_port: u32,
}

impl ForwardedTcpIpPayload {
    /// Build the channel-open payload for a connection accepted on behalf of
    /// `request`.
    ///
    /// The origin fields carry the requested bind address and port, not the
    /// peer of the accepted connection. Existing clients key on these values.
    pub fn for_request(request: &ForwardRequest) -> Self {
        Self {
            addr: request.addr.clone(),
            port: request.rport,
            origin_addr: request.addr.clone(),
            origin_port: request.rport,
        }
    }

    pub fn decode(payload: &[u8]) -> Result<Self, CodecError> {
        let mut reader = WireReader::new(payload);
        let addr = reader.read_string("addr")?;
        let port = reader.read_u32("port")?;
        let origin_addr = reader.read_string("origin_addr")?;
        let origin_port = reader.read_u32("origin_port")?;
        reader.finish()?;
        Ok(Self {
            addr,
            port,
            origin_addr,
            origin_port,
        })
    }

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(16 + self.addr.len() + self.origin_addr.len());
        put_string(&mut buf, &self.addr);
        buf.put_u32(self.port);
        put_string(&mut buf, &self.origin_addr);
        buf.put_u32(self.origin_port);
        buf.freeze()
    }
}
