//! File transfer drivers for the two roles.
//!
//! The client streams a file through an active-open connection; the server
//! accepts one connection, collects the byte stream until the peer's FIN and
//! then writes it to disk together with an MD5 digest for verification.

use std::net::SocketAddr;
use std::path::Path;

use md5::{Digest, Md5};

use crate::config::Config;
use crate::connection::{ConnError, Connection, ReceiveStats};
use crate::event_log::EventLog;
use crate::sender::SenderStats;
use crate::socket::Socket;

/// Outcome of a completed server-side transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiveReport {
    /// Bytes received in order.
    pub bytes: usize,
    /// Hex MD5 of the received bytes; `None` when nothing arrived and no
    /// file was written.
    pub digest: Option<String>,
    pub stats: ReceiveStats,
}

/// Lower-case hex MD5 of `bytes`.
pub fn md5_hex(bytes: &[u8]) -> String {
    hex::encode(Md5::digest(bytes))
}

/// Connect to `server`, send the contents of `path`, and close.
pub async fn send_file(
    socket: Socket,
    server: SocketAddr,
    path: &Path,
    config: Config,
    events: EventLog,
) -> Result<SenderStats, ConnError> {
    let file = tokio::fs::File::open(path).await?;
    let mut conn = Connection::connect(socket, server, config, events).await?;
    log::info!("connection established with {server}");

    let stats = conn.send_stream(file).await?;
    conn.close().await?;
    log::info!(
        "sent {} bytes in {} segments ({} retransmissions)",
        stats.bytes_sent,
        stats.segments_sent,
        stats.retransmissions
    );
    Ok(stats)
}

/// Accept one connection, receive its byte stream and write it to `output`.
///
/// The output file is only created when at least one byte was received.
pub async fn receive_file(
    socket: Socket,
    output: &Path,
    config: Config,
    events: EventLog,
) -> Result<ReceiveReport, ConnError> {
    let mut conn = Connection::accept(socket, config, events).await?;
    log::info!("connection established with {}", conn.peer());

    conn.receive_stream().await?;
    let stats = conn.receive_stats();
    let bytes = conn.into_received();

    let digest = if bytes.is_empty() {
        None
    } else {
        tokio::fs::write(output, &bytes).await?;
        Some(md5_hex(&bytes))
    };
    log::info!(
        "received {} bytes ({} accepted, {} discarded, {} dropped)",
        bytes.len(),
        stats.segments_accepted,
        stats.segments_discarded,
        stats.segments_dropped
    );
    Ok(ReceiveReport {
        bytes: bytes.len(),
        digest,
        stats,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn md5_of_known_inputs() {
        assert_eq!(md5_hex(b""), "d41d8cd98f00b204e9800998ecf8427e");
        assert_eq!(md5_hex(b"abc"), "900150983cd24fb0d6963f7d28e17f72");
    }
}
