//! Listener provisioning
//!
//! Web ports (80/443) get a Unix domain socket that the HTTP reverse proxy
//! dials; every other port gets a plain TCP listener.

use crate::config::ForwardConfig;
use crate::error::ForwardError;
use sshfwd_proto::ForwardRequest;
use sshfwd_router::ListenerAddr;
use std::io;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::{TcpListener, TcpStream, UnixListener, UnixStream};
use tracing::{debug, warn};

/// Bind address used when the request leaves it empty
const ANY_ADDR: &str = "0.0.0.0";

/// Filesystem path of a rendezvous socket
///
/// The path is removed when [`SocketPath::remove`] is called or the guard is
/// dropped, whichever comes first.
#[derive(Debug)]
pub struct SocketPath {
    path: PathBuf,
    removed: bool,
}

impl SocketPath {
    /// Reserve a unique name in `dir`
    ///
    /// A temp file is created to claim the name and removed right away so a
    /// socket can be bound in its place.
    pub fn reserve(dir: &Path, prefix: &str) -> io::Result<Self> {
        let file = tempfile::Builder::new().prefix(prefix).tempfile_in(dir)?;
        let path = file.path().to_path_buf();
        file.close()?;
        Ok(Self {
            path,
            removed: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_removed(&self) -> bool {
        self.removed
    }

    pub fn remove(&mut self) {
        if self.removed {
            return;
        }
        self.removed = true;
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!("Removed socket {}", self.path.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove socket {}: {}", self.path.display(), e),
        }
    }
}

impl Drop for SocketPath {
    fn drop(&mut self) {
        self.remove();
    }
}

/// Listening endpoint of a tunnel
#[derive(Debug)]
pub enum ForwardListener {
    Tcp(TcpListener),
    Unix(UnixListener),
}

impl ForwardListener {
    /// Accept one connection, returning it with a printable peer address
    pub async fn accept(&self) -> io::Result<(ForwardedStream, String)> {
        match self {
            ForwardListener::Tcp(listener) => {
                let (stream, peer) = listener.accept().await?;
                Ok((ForwardedStream::Tcp(stream), peer.to_string()))
            }
            ForwardListener::Unix(listener) => {
                let (stream, peer) = listener.accept().await?;
                let peer = peer
                    .as_pathname()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| "unix:unnamed".to_string());
                Ok((ForwardedStream::Unix(stream), peer))
            }
        }
    }
}

/// Connection accepted on a tunnel listener
#[derive(Debug)]
pub enum ForwardedStream {
    Tcp(TcpStream),
    Unix(UnixStream),
}

impl AsyncRead for ForwardedStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            ForwardedStream::Tcp(stream) => Pin::new(stream).poll_read(cx, buf),
            ForwardedStream::Unix(stream) => Pin::new(stream).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for ForwardedStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            ForwardedStream::Tcp(stream) => Pin::new(stream).poll_write(cx, buf),
            ForwardedStream::Unix(stream) => Pin::new(stream).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            ForwardedStream::Tcp(stream) => Pin::new(stream).poll_flush(cx),
            ForwardedStream::Unix(stream) => Pin::new(stream).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            ForwardedStream::Tcp(stream) => Pin::new(stream).poll_shutdown(cx),
            ForwardedStream::Unix(stream) => Pin::new(stream).poll_shutdown(cx),
        }
    }
}

/// A bound listener together with the address reported to the client
#[derive(Debug)]
pub struct ProvisionedListener {
    pub listener: ForwardListener,
    pub addr: ListenerAddr,
    /// Set for Unix listeners; owns the socket file
    pub socket_path: Option<SocketPath>,
}

/// Create the listening endpoint for a forward request
pub async fn provision(
    request: &ForwardRequest,
    session_id: &str,
    config: &ForwardConfig,
) -> Result<ProvisionedListener, ForwardError> {
    if request.is_web_port() {
        provision_unix(request, session_id, &config.socket_dir())
    } else {
        provision_tcp(request).await
    }
}

async fn provision_tcp(request: &ForwardRequest) -> Result<ProvisionedListener, ForwardError> {
    let port = u16::try_from(request.rport).map_err(|_| ForwardError::InvalidPort(request.rport))?;
    let host = if request.addr.is_empty() {
        ANY_ADDR
    } else {
        request.addr.as_str()
    };

    let listener = TcpListener::bind((host, port))
        .await
        .map_err(|e| ForwardError::BindError {
            address: format!("{}:{}", host, port),
            reason: e.to_string(),
        })?;
    let local_addr = listener.local_addr()?;

    debug!("Bound TCP listener {} for {}:{}", local_addr, host, port);

    Ok(ProvisionedListener {
        listener: ForwardListener::Tcp(listener),
        addr: ListenerAddr::Tcp(local_addr),
        socket_path: None,
    })
}

fn provision_unix(
    request: &ForwardRequest,
    session_id: &str,
    dir: &Path,
) -> Result<ProvisionedListener, ForwardError> {
    let prefix = format!("{}:{}", session_id, request.rport).replace('/', "_");
    let socket_path = SocketPath::reserve(dir, &prefix).map_err(|source| ForwardError::SocketName {
        dir: dir.display().to_string(),
        source,
    })?;
    let path = socket_path.path().to_path_buf();

    // On failure socket_path is dropped here, which removes the reserved name
    let listener = UnixListener::bind(&path).map_err(|e| ForwardError::BindError {
        address: path.display().to_string(),
        reason: e.to_string(),
    })?;

    debug!("Bound Unix listener {} for port {}", path.display(), request.rport);

    Ok(ProvisionedListener {
        listener: ForwardListener::Unix(listener),
        addr: ListenerAddr::Unix(path),
        socket_path: Some(socket_path),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    fn config_in(dir: &Path) -> ForwardConfig {
        ForwardConfig {
            socket_dir: Some(dir.to_path_buf()),
            ..ForwardConfig::default()
        }
    }

    #[tokio::test]
    async fn test_tcp_port_zero_reports_assigned_port() {
        let request = ForwardRequest::new("127.0.0.1", 0);
        let provisioned = provision(&request, "s", &ForwardConfig::default())
            .await
            .unwrap();

        match provisioned.addr {
            ListenerAddr::Tcp(addr) => {
                assert_eq!(addr.ip().to_string(), "127.0.0.1");
                assert_ne!(addr.port(), 0);
            }
            other => panic!("expected TCP listener, got {:?}", other),
        }
        assert!(provisioned.socket_path.is_none());
    }

    #[tokio::test]
    async fn test_empty_addr_binds_any() {
        let request = ForwardRequest::new("", 0);
        let provisioned = provision(&request, "s", &ForwardConfig::default())
            .await
            .unwrap();
        assert!(provisioned.addr.to_string().starts_with("0.0.0.0:"));
    }

    #[tokio::test]
    async fn test_port_out_of_range() {
        let request = ForwardRequest::new("127.0.0.1", 70_000);
        let result = provision(&request, "s", &ForwardConfig::default()).await;
        assert!(matches!(result, Err(ForwardError::InvalidPort(70_000))));
    }

    #[tokio::test]
    async fn test_port_in_use() {
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = taken.local_addr().unwrap().port();

        let request = ForwardRequest::new("127.0.0.1", port as u32);
        let result = provision(&request, "s", &ForwardConfig::default()).await;
        assert!(matches!(result, Err(ForwardError::BindError { .. })));
    }

    #[tokio::test]
    async fn test_web_port_gets_unix_socket() {
        let dir = tempfile::tempdir().unwrap();
        let request = ForwardRequest::new("", 443);
        let provisioned = provision(&request, "10.0.0.1:5000", &config_in(dir.path()))
            .await
            .unwrap();

        let path = match &provisioned.addr {
            ListenerAddr::Unix(path) => path.clone(),
            other => panic!("expected Unix listener, got {:?}", other),
        };
        assert!(path.starts_with(dir.path()));
        assert!(path
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("10.0.0.1:5000:443"));
        assert!(path.exists());

        // Rendezvous works end to end
        let accept = async { provisioned.listener.accept().await.unwrap() };
        let connect = async { UnixStream::connect(&path).await.unwrap() };
        let ((mut server, _peer), mut client) = tokio::join!(accept, connect);
        client.write_all(b"GET / HTTP/1.1\r\n").await.unwrap();
        let mut buf = [0u8; 5];
        server.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"GET /");

        drop(provisioned);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_unique_socket_names() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        let request = ForwardRequest::new("", 80);

        let first = provision(&request, "s", &config).await.unwrap();
        let second = provision(&request, "s", &config).await.unwrap();
        assert_ne!(first.addr, second.addr);
    }

    #[tokio::test]
    async fn test_missing_socket_dir_fails_cleanly() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("does-not-exist");
        let request = ForwardRequest::new("", 80);

        let result = provision(&request, "s", &config_in(&missing)).await;
        assert!(matches!(result, Err(ForwardError::SocketName { .. })));
    }

    #[test]
    fn test_socket_path_remove_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let mut socket_path = SocketPath::reserve(dir.path(), "probe").unwrap();
        let path = socket_path.path().to_path_buf();

        // The reserved name is free until something binds it
        assert!(!path.exists());
        std::fs::write(&path, b"").unwrap();

        socket_path.remove();
        socket_path.remove();
        assert!(!path.exists());
        assert!(socket_path.is_removed());
    }
}
