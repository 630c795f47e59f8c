//! Interactive line-based chat over an established connection.
//!
//! Chat bypasses the sliding window: each line is sent once as a bare data
//! segment and never acknowledged or retransmitted.  The loop waits on the
//! line source and the socket at the same time with `tokio::select!`.
//!
//! Typing `/quit` (or closing the input) starts the four-way teardown as the
//! closer; a FIN from the peer is answered and ends the session.

use std::time::Duration;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::Instant;

use crate::connection::{ConnError, Connection};
use crate::packet::Flags;

/// Line that ends the session from the local side.
pub const QUIT_COMMAND: &str = "/quit";

/// How long one wait for input lasts before the loop goes round again.
pub const IDLE_TICK: Duration = Duration::from_secs(1);

/// Why a chat session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatEnd {
    /// The local user typed [`QUIT_COMMAND`].
    LocalQuit,
    /// The line source reached end of input.
    InputClosed,
    /// The peer sent FIN.
    PeerClosed,
}

/// Run a chat session until either side quits.
///
/// Lines from `input` go to the peer with their trailing newline; messages
/// from the peer are written to `output` as `Peer: <text>`.
pub async fn run_chat<I, O>(
    conn: &mut Connection,
    input: I,
    mut output: O,
) -> Result<ChatEnd, ConnError>
where
    I: AsyncBufRead + Unpin,
    O: AsyncWrite + Unpin,
{
    let mut lines = input.lines();
    let max_payload = conn.config().max_payload;

    loop {
        let tick = Instant::now() + IDLE_TICK;
        tokio::select! {
            line = lines.next_line() => {
                let end = match line? {
                    None => ChatEnd::InputClosed,
                    Some(line) if line.starts_with(QUIT_COMMAND) => ChatEnd::LocalQuit,
                    Some(mut line) => {
                        line.push('\n');
                        for chunk in line.as_bytes().chunks(max_payload) {
                            conn.send_unreliable(chunk).await?;
                        }
                        continue;
                    }
                };
                log::debug!("[chat] {end:?}; closing");
                conn.close().await?;
                return Ok(end);
            }
            received = conn.recv_from_peer(tick) => {
                let Some(seg) = received? else {
                    continue;
                };
                if seg.header.flags.contains(Flags::FIN) {
                    conn.events_mut()
                        .record(format_args!("RCV FIN SEQ={}", seg.header.seq_num));
                    conn.respond_to_fin(seg.header.seq_num).await?;
                    return Ok(ChatEnd::PeerClosed);
                }
                if seg.is_data() {
                    output.write_all(b"Peer: ").await?;
                    output.write_all(&seg.payload).await?;
                    output.flush().await?;
                }
            }
        }
    }
}
