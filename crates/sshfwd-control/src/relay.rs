//! Bidirectional byte relay between an accepted connection and its channel

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::task::JoinSet;
use tracing::debug;

/// Bytes moved by one relay
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RelayStats {
    /// Connection -> channel
    pub to_channel: u64,
    /// Channel -> connection
    pub to_connection: u64,
}

enum Direction {
    ToChannel,
    ToConnection,
}

/// Pump bytes in both directions until either side is done
///
/// When one direction hits EOF or an error, the other direction is stopped
/// and both endpoints are dropped, which closes them.
pub async fn relay<A, B>(connection: A, channel: B) -> RelayStats
where
    A: AsyncRead + AsyncWrite + Send + 'static,
    B: AsyncRead + AsyncWrite + Send + 'static,
{
    let (mut conn_read, mut conn_write) = tokio::io::split(connection);
    let (mut chan_read, mut chan_write) = tokio::io::split(channel);

    let mut tasks = JoinSet::new();

    tasks.spawn(async move {
        let copied = tokio::io::copy(&mut conn_read, &mut chan_write).await;
        let _ = chan_write.shutdown().await;
        (Direction::ToChannel, copied)
    });

    tasks.spawn(async move {
        let copied = tokio::io::copy(&mut chan_read, &mut conn_write).await;
        let _ = conn_write.shutdown().await;
        (Direction::ToConnection, copied)
    });

    let mut stats = RelayStats::default();

    // First finisher wins; the other direction is cut short
    if let Some(Ok((direction, copied))) = tasks.join_next().await {
        stats.record(direction, copied);
    }
    tasks.abort_all();
    while let Some(joined) = tasks.join_next().await {
        if let Ok((direction, copied)) = joined {
            stats.record(direction, copied);
        }
    }

    stats
}

impl RelayStats {
    fn record(&mut self, direction: Direction, copied: std::io::Result<u64>) {
        match (direction, copied) {
            (Direction::ToChannel, Ok(n)) => self.to_channel = n,
            (Direction::ToConnection, Ok(n)) => self.to_connection = n,
            (_, Err(e)) => debug!("Relay direction ended with error: {}", e),
        }
    }
}
