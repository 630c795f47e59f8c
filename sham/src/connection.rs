//! Per-connection lifecycle manager.
//!
//! A [`Connection`] owns the complete state for one peer-to-peer session:
//! the socket, the FSM state, the [`Sender`] and [`Receiver`] halves, the
//! protocol [`EventLog`] and the receive-side [`LossSimulator`].  Nothing is
//! process-global, so several connections can coexist in one process.
//!
//! # Lifecycle
//!
//! ```ignore
//! // active opener
//! let mut conn = Connection::connect(socket, server, config, EventLog::disabled()).await?;
//! conn.send_stream(file).await?;
//! conn.close().await?;
//!
//! // passive opener
//! let mut conn = Connection::accept(socket, config, EventLog::disabled()).await?;
//! conn.receive_stream().await?;      // returns after the peer's FIN is answered
//! let bytes = conn.into_received();
//! ```
//!
//! Each connection runs on a single task.  The send loop interleaves
//! window filling, a bounded wait for ACKs and a retransmission scan; the
//! receive loop blocks with a timeout and re-enters the wait.

use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::time::Instant;

use crate::config::{Config, ConfigError};
use crate::event_log::EventLog;
use crate::packet::{Flags, Segment};
use crate::receiver::Receiver;
use crate::sender::{Sender, SenderStats};
use crate::simulator::LossSimulator;
use crate::socket::{Socket, SocketError};
use crate::state::ConnectionState;
use crate::timer::next_wakeup;

/// Errors that abort a connection.
#[derive(Debug, Error)]
pub enum ConnError {
    /// The active opener saw no SYN-ACK in time.
    #[error("no SYN-ACK received within {0:?}")]
    HandshakeTimeout(Duration),
    /// A handshake segment had the wrong flags or numbers.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),
    /// A segment was retransmitted `max_retries` times without being acknowledged.
    #[error("segment seq={seq} unacknowledged after {retries} retransmissions")]
    RetriesExhausted { seq: u32, retries: u32 },
    /// The 32-bit byte counter would overflow.
    #[error("sequence space exhausted at offset {next_seq}")]
    SequenceSpaceExhausted { next_seq: u32 },
    /// The operation is not valid in the current FSM state.
    #[error("operation not valid in state {0}")]
    BadState(ConnectionState),
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Socket(#[from] SocketError),
    /// Reading the outbound stream or writing received data failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Counters for the receiving half of a transfer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReceiveStats {
    /// In-order data segments appended to the buffer.
    pub segments_accepted: u64,
    /// Data segments rejected because their offset was not the expected one.
    pub segments_discarded: u64,
    /// Data segments thrown away by the loss simulator.
    pub segments_dropped: u64,
}

/// A handle to a single reliable connection over UDP.
#[derive(Debug)]
pub struct Connection {
    /// Current FSM state.
    pub state: ConnectionState,
    /// Outbound byte stream.
    pub sender: Sender,
    /// Inbound byte stream.
    pub receiver: Receiver,
    socket: Socket,
    peer: SocketAddr,
    config: Config,
    events: EventLog,
    loss: LossSimulator,
    receive_stats: ReceiveStats,
}

impl Connection {
    fn new(
        socket: Socket,
        peer: SocketAddr,
        config: Config,
        events: EventLog,
        loss: LossSimulator,
        local_isn: u32,
    ) -> Self {
        // The SYN consumes one sequence number on each side.
        let sender = Sender::new(local_isn + 1, &config);
        let receiver = Receiver::new(0, config.advertised_window);
        Self {
            state: ConnectionState::Closed,
            sender,
            receiver,
            socket,
            peer,
            config,
            events,
            loss,
            receive_stats: ReceiveStats::default(),
        }
    }

    // -----------------------------------------------------------------------
    // Handshake
    // -----------------------------------------------------------------------

    /// Active open: SYN → SYN-ACK → ACK.
    ///
    /// Fails with [`ConnError::HandshakeTimeout`] when no SYN-ACK arrives
    /// within `config.handshake_timeout`; the SYN is never retransmitted.
    pub async fn connect(
        socket: Socket,
        peer: SocketAddr,
        config: Config,
        events: EventLog,
    ) -> Result<Self, ConnError> {
        config.validate()?;
        let isn = config.client_isn;
        let mut conn = Self::new(socket, peer, config, events, LossSimulator::disabled(), isn);

        let syn = Segment::control(isn, 0, Flags::SYN, conn.config.advertised_window);
        conn.events.record(format_args!("SND SYN SEQ={isn}"));
        conn.socket.send_to(&syn, peer).await?;
        conn.state = ConnectionState::SynSent;
        log::debug!("[conn] → SYN seq={isn}; {}", conn.state);

        let deadline = Instant::now() + conn.config.handshake_timeout;
        let syn_ack = loop {
            match conn.socket.recv_until(deadline).await? {
                None => {
                    conn.state = ConnectionState::Closed;
                    return Err(ConnError::HandshakeTimeout(conn.config.handshake_timeout));
                }
                Some((seg, addr)) if addr == peer => break seg,
                Some((_, addr)) => log::debug!("[conn] ignoring segment from {addr}"),
            }
        };

        let h = syn_ack.header;
        if !syn_ack.has_exact_flags(Flags::SYN | Flags::ACK) {
            conn.state = ConnectionState::Closed;
            return Err(ConnError::ProtocolViolation(format!(
                "expected SYN-ACK, got {}",
                h.flags
            )));
        }
        if h.ack_num != isn + 1 {
            conn.state = ConnectionState::Closed;
            return Err(ConnError::ProtocolViolation(format!(
                "SYN-ACK acknowledges {}, expected {}",
                h.ack_num,
                isn + 1
            )));
        }
        conn.events
            .record(format_args!("RCV SYN-ACK SEQ={} ACK={}", h.seq_num, h.ack_num));
        conn.sender.peer_window = h.window_size;

        let peer_next = h.seq_num.wrapping_add(1);
        let ack = Segment::control(isn + 1, peer_next, Flags::ACK, conn.config.advertised_window);
        conn.events
            .record(format_args!("SND ACK SEQ={} ACK={peer_next}", isn + 1));
        conn.socket.send_to(&ack, peer).await?;

        conn.receiver = Receiver::new(peer_next, conn.config.advertised_window);
        conn.state = ConnectionState::Established;
        log::debug!(
            "[conn] handshake complete: next_seq_num={} peer_next={peer_next}",
            conn.sender.next_seq_num
        );
        Ok(conn)
    }

    /// Passive open with the loss simulator built from `config.loss_rate`.
    pub async fn accept(socket: Socket, config: Config, events: EventLog) -> Result<Self, ConnError> {
        let loss = LossSimulator::new(config.loss_rate)?;
        Self::accept_with_loss(socket, config, events, loss).await
    }

    /// Passive open: wait for SYN → SYN-ACK → wait for ACK.
    ///
    /// Blocks until a SYN arrives, re-entering the wait every
    /// `config.idle_poll`.
    pub async fn accept_with_loss(
        socket: Socket,
        config: Config,
        events: EventLog,
        loss: LossSimulator,
    ) -> Result<Self, ConnError> {
        config.validate()?;
        let isn = config.server_isn;
        log::debug!("[conn] accepting with loss_rate={}", loss.loss_rate());

        let (syn, peer) = loop {
            match socket.recv_timeout(config.idle_poll).await? {
                None => log::trace!("[conn] waiting for SYN"),
                Some(received) => break received,
            }
        };
        let mut conn = Self::new(socket, peer, config, events, loss, isn);

        if !syn.has_exact_flags(Flags::SYN) {
            return Err(ConnError::ProtocolViolation(format!(
                "expected SYN, got {}",
                syn.header.flags
            )));
        }
        let client_isn = syn.header.seq_num;
        conn.events.record(format_args!("RCV SYN SEQ={client_isn}"));
        conn.sender.peer_window = syn.header.window_size;

        let peer_next = client_isn.wrapping_add(1);
        let syn_ack = Segment::control(
            isn,
            peer_next,
            Flags::SYN | Flags::ACK,
            conn.config.advertised_window,
        );
        conn.events
            .record(format_args!("SND SYN-ACK SEQ={isn} ACK={peer_next}"));
        conn.socket.send_to(&syn_ack, peer).await?;
        conn.state = ConnectionState::SynReceived;
        log::debug!("[conn] ← SYN from {peer}; → SYN-ACK; {}", conn.state);

        let ack = loop {
            match conn.socket.recv_timeout(conn.config.idle_poll).await? {
                None => log::trace!("[conn] waiting for handshake ACK"),
                Some((seg, addr)) if addr == peer => break seg,
                Some((_, addr)) => log::debug!("[conn] ignoring segment from {addr}"),
            }
        };
        if !ack.has_exact_flags(Flags::ACK) {
            conn.state = ConnectionState::Closed;
            return Err(ConnError::ProtocolViolation(format!(
                "expected ACK, got {}",
                ack.header.flags
            )));
        }
        if ack.header.ack_num != isn + 1 {
            conn.state = ConnectionState::Closed;
            return Err(ConnError::ProtocolViolation(format!(
                "ACK acknowledges {}, expected {}",
                ack.header.ack_num,
                isn + 1
            )));
        }
        conn.events.record("RCV ACK FOR SYN");

        conn.receiver = Receiver::new(peer_next, conn.config.advertised_window);
        conn.state = ConnectionState::Established;
        log::debug!("[conn] handshake complete: next_expected_seq={peer_next}");
        Ok(conn)
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    /// Remote peer address.
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Local socket address.
    pub fn local_addr(&self) -> SocketAddr {
        self.socket.local_addr
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn send_stats(&self) -> SenderStats {
        self.sender.stats()
    }

    pub fn receive_stats(&self) -> ReceiveStats {
        self.receive_stats
    }

    /// Bytes received in order so far.
    pub fn received(&self) -> &[u8] {
        self.receiver.bytes()
    }

    /// Consume the connection, returning the received byte stream.
    pub fn into_received(self) -> Vec<u8> {
        self.receiver.into_bytes()
    }

    pub(crate) fn events_mut(&mut self) -> &mut EventLog {
        &mut self.events
    }

    // -----------------------------------------------------------------------
    // Sliding-window send
    // -----------------------------------------------------------------------

    /// Stream everything `input` yields to the peer and wait until it is
    /// all cumulatively acknowledged.
    ///
    /// Each round fills the window, waits for an ACK until the earlier of
    /// the poll interval and the next retransmission deadline, then resends
    /// every expired segment.  Exhausting the retries of any segment
    /// abandons the connection: it moves to `Closed` and sends nothing more.
    pub async fn send_stream<R>(&mut self, mut input: R) -> Result<SenderStats, ConnError>
    where
        R: AsyncRead + Unpin,
    {
        if !self.state.is_established() {
            return Err(ConnError::BadState(self.state));
        }

        let mut eof = false;
        loop {
            while !eof && self.sender.can_fill() {
                let chunk = read_chunk(&mut input, self.config.max_payload).await?;
                if chunk.is_empty() {
                    eof = true;
                    break;
                }
                let len = chunk.len();
                let seg = self.sender.queue(chunk, Instant::now())?;
                self.events
                    .record(format_args!("SND DATA SEQ={} LEN={len}", seg.header.seq_num));
                self.socket.send_to(&seg, self.peer).await?;
                log::debug!(
                    "[conn] → DATA seq={} len={len} in_flight={}",
                    seg.header.seq_num,
                    self.sender.in_flight()
                );
            }

            if eof && self.sender.is_drained() {
                break;
            }

            let wake = next_wakeup(
                Instant::now(),
                self.config.poll_interval,
                self.sender.next_retransmit_due(),
            );
            if let Some((seg, addr)) = self.socket.recv_until(wake).await? {
                if addr == self.peer {
                    self.on_sender_segment(&seg);
                }
            }

            let due = match self.sender.due_retransmits(Instant::now()) {
                Ok(due) => due,
                Err(e) => {
                    log::warn!("[conn] giving up: {e}");
                    self.state = ConnectionState::Closed;
                    return Err(e);
                }
            };
            for seg in due {
                let seq = seg.header.seq_num;
                self.events.record(format_args!("TIMEOUT SEQ={seq}"));
                self.events
                    .record(format_args!("RETX DATA SEQ={seq} LEN={}", seg.payload.len()));
                self.socket.send_to(&seg, self.peer).await?;
                log::debug!(
                    "[conn] timeout, retransmitted seq={seq} retries={}",
                    self.sender.retries_of(seq).unwrap_or_default()
                );
            }
        }

        let stats = self.sender.stats();
        log::debug!(
            "[conn] stream acknowledged: {} bytes, {} segments, {} retransmissions",
            stats.bytes_sent,
            stats.segments_sent,
            stats.retransmissions
        );
        Ok(stats)
    }

    /// Apply an inbound segment seen while sending.
    fn on_sender_segment(&mut self, seg: &Segment) {
        let h = seg.header;
        if !h.flags.contains(Flags::ACK) {
            log::debug!("[conn] ignoring {} while sending", h.flags);
            return;
        }
        self.events.record(format_args!("RCV ACK={}", h.ack_num));
        if self.sender.on_ack(h.ack_num, h.window_size) {
            log::debug!(
                "[conn] ← ACK ack={} window_base={} in_flight={}",
                h.ack_num,
                self.sender.window_base,
                self.sender.in_flight()
            );
        }
        self.events
            .record(format_args!("FLOW WIN UPDATE={}", self.sender.peer_window));
    }

    // -----------------------------------------------------------------------
    // In-order receive
    // -----------------------------------------------------------------------

    /// Receive data segments until the peer sends FIN, then answer the FIN.
    ///
    /// Only the next expected offset is accepted and acknowledged; everything
    /// else is discarded without an ACK.  Returns the number of bytes held
    /// in the receive buffer once the connection is closed.
    pub async fn receive_stream(&mut self) -> Result<usize, ConnError> {
        if !self.state.is_established() {
            return Err(ConnError::BadState(self.state));
        }

        loop {
            let Some((seg, addr)) = self.socket.recv_timeout(self.config.idle_poll).await? else {
                continue;
            };
            if addr != self.peer {
                log::debug!("[conn] ignoring segment from {addr}");
                continue;
            }

            if seg.header.flags.contains(Flags::FIN) {
                self.events
                    .record(format_args!("RCV FIN SEQ={}", seg.header.seq_num));
                self.respond_to_fin(seg.header.seq_num).await?;
                break;
            }
            if seg.is_data() {
                self.on_data_segment(&seg).await?;
            }
        }

        log::debug!(
            "[conn] stream complete: {} bytes, {:?}",
            self.receiver.len(),
            self.receive_stats
        );
        Ok(self.receiver.len())
    }

    async fn on_data_segment(&mut self, seg: &Segment) -> Result<(), ConnError> {
        let seq = seg.header.seq_num;
        let len = seg.payload.len();

        if self.loss.should_drop() {
            self.receive_stats.segments_dropped += 1;
            self.events.record(format_args!("DROP DATA SEQ={seq}"));
            log::debug!("[conn] simulated loss of seq={seq}");
            return Ok(());
        }

        self.events.record(format_args!("RCV DATA SEQ={seq} LEN={len}"));
        if !self.receiver.on_segment(seq, &seg.payload) {
            self.receive_stats.segments_discarded += 1;
            log::debug!(
                "[conn] discarding seq={seq}; expected {}",
                self.receiver.next_expected_seq
            );
            return Ok(());
        }

        self.receive_stats.segments_accepted += 1;
        let ack = self.receiver.ack_segment();
        self.events.record(format_args!(
            "SND ACK={} WIN={}",
            ack.header.ack_num, ack.header.window_size
        ));
        self.socket.send_to(&ack, self.peer).await?;
        log::debug!("[conn] ← DATA seq={seq} len={len}; → ACK ack={}", ack.header.ack_num);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Teardown
    // -----------------------------------------------------------------------

    /// Closer side of the four-way teardown.
    ///
    /// FIN → wait for its ACK → wait for the peer's FIN → final ACK.  Each
    /// wait is bounded by `config.teardown_timeout`; a missing step is logged
    /// and skipped, and the connection ends `Closed` either way.
    pub async fn close(&mut self) -> Result<(), ConnError> {
        match self.state {
            ConnectionState::Closed => return Ok(()),
            ConnectionState::Established => {}
            other => return Err(ConnError::BadState(other)),
        }

        let fin_seq = self.sender.next_seq_num;
        let fin = Segment::control(fin_seq, 0, Flags::FIN, self.config.advertised_window);
        self.events.record(format_args!("SND FIN SEQ={fin_seq}"));
        self.socket.send_to(&fin, self.peer).await?;
        self.state = ConnectionState::FinWait1;
        log::debug!("[conn] → FIN seq={fin_seq}; {}", self.state);

        let mut peer_fin: Option<u32> = None;

        // Wait for the ACK of our FIN.  A FIN crossing ours moves us to CLOSING.
        let deadline = Instant::now() + self.config.teardown_timeout;
        while matches!(
            self.state,
            ConnectionState::FinWait1 | ConnectionState::Closing
        ) {
            let Some((seg, addr)) = self.socket.recv_until(deadline).await? else {
                log::debug!("[conn] no ACK for FIN seq={fin_seq}; continuing");
                break;
            };
            if addr != self.peer {
                continue;
            }
            let h = seg.header;
            if h.flags.contains(Flags::FIN) && peer_fin.is_none() {
                self.events.record(format_args!("RCV FIN SEQ={}", h.seq_num));
                self.send_fin_ack(h.seq_num).await?;
                peer_fin = Some(h.seq_num);
                self.state = ConnectionState::Closing;
            }
            if h.flags.contains(Flags::ACK) && h.ack_num == fin_seq.wrapping_add(1) {
                self.events.record("RCV ACK FOR FIN");
                self.state = if peer_fin.is_some() {
                    ConnectionState::TimeWait
                } else {
                    ConnectionState::FinWait2
                };
            }
        }
        if self.state == ConnectionState::FinWait1 {
            self.state = ConnectionState::FinWait2;
        }

        if peer_fin.is_none() {
            let deadline = Instant::now() + self.config.teardown_timeout;
            loop {
                let Some((seg, addr)) = self.socket.recv_until(deadline).await? else {
                    log::warn!("[conn] peer FIN not received; closing anyway");
                    break;
                };
                if addr == self.peer && seg.header.flags.contains(Flags::FIN) {
                    let seq = seg.header.seq_num;
                    self.events.record(format_args!("RCV FIN SEQ={seq}"));
                    self.send_fin_ack(seq).await?;
                    self.state = ConnectionState::TimeWait;
                    break;
                }
            }
        }

        self.state = ConnectionState::Closed;
        log::debug!("[conn] closed");
        Ok(())
    }

    async fn send_fin_ack(&mut self, fin_seq: u32) -> Result<(), ConnError> {
        let ack_num = fin_seq.wrapping_add(1);
        let ack = Segment::control(0, ack_num, Flags::ACK, self.config.advertised_window);
        self.events.record(format_args!("SND ACK={ack_num}"));
        self.socket.send_to(&ack, self.peer).await?;
        Ok(())
    }

    /// Peer side of the four-way teardown, after the closer's FIN arrived.
    ///
    /// ACK the FIN, send our own FIN, then wait (bounded) for the final ACK.
    pub async fn respond_to_fin(&mut self, fin_seq: u32) -> Result<(), ConnError> {
        let ack_num = fin_seq.wrapping_add(1);
        let ack = Segment::control(0, ack_num, Flags::ACK, self.config.advertised_window);
        self.events.record("SND ACK FOR FIN");
        self.socket.send_to(&ack, self.peer).await?;
        self.state = ConnectionState::CloseWait;

        let our_fin = self.sender.next_seq_num;
        let fin = Segment::control(our_fin, 0, Flags::FIN, self.config.advertised_window);
        self.events.record(format_args!("SND FIN SEQ={our_fin}"));
        self.socket.send_to(&fin, self.peer).await?;
        self.state = ConnectionState::LastAck;
        log::debug!("[conn] ← FIN seq={fin_seq}; → ACK, FIN seq={our_fin}; {}", self.state);

        let deadline = Instant::now() + self.config.teardown_timeout;
        loop {
            let Some((seg, addr)) = self.socket.recv_until(deadline).await? else {
                log::debug!("[conn] final ACK not received; closing anyway");
                break;
            };
            if addr != self.peer || !seg.has_exact_flags(Flags::ACK) {
                continue;
            }
            if seg.header.ack_num != our_fin.wrapping_add(1) {
                log::debug!(
                    "[conn] ignoring ACK {} while waiting for {}",
                    seg.header.ack_num,
                    our_fin.wrapping_add(1)
                );
                continue;
            }
            self.events
                .record(format_args!("RCV ACK={}", seg.header.ack_num));
            break;
        }

        self.state = ConnectionState::Closed;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Unacknowledged messages (chat mode)
    // -----------------------------------------------------------------------

    /// Send `payload` as a bare data segment outside the sliding window.
    ///
    /// No slot is reserved, no ACK is expected and nothing is retransmitted.
    pub async fn send_unreliable(&mut self, payload: &[u8]) -> Result<(), ConnError> {
        if !self.state.is_established() {
            return Err(ConnError::BadState(self.state));
        }
        let seg = self.sender.send_unreliable(payload.to_vec())?;
        self.socket.send_to(&seg, self.peer).await?;
        Ok(())
    }

    /// Wait until `deadline` for the next segment from the peer.
    pub async fn recv_from_peer(&mut self, deadline: Instant) -> Result<Option<Segment>, ConnError> {
        loop {
            match self.socket.recv_until(deadline).await? {
                None => return Ok(None),
                Some((seg, addr)) if addr == self.peer => return Ok(Some(seg)),
                Some(_) => continue,
            }
        }
    }
}

/// Read up to `max` bytes, stopping early only at end of input.
///
/// Every segment but the last must be full so that slot indices stay aligned.
async fn read_chunk<R>(input: &mut R, max: usize) -> std::io::Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; max];
    let mut filled = 0;
    while filled < max {
        let n = input.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    buf.truncate(filled);
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn read_chunk_fills_across_short_reads() {
        let (mut tx, mut rx) = tokio::io::duplex(8);
        let writer = tokio::spawn(async move {
            use tokio::io::AsyncWriteExt;
            tx.write_all(&[3u8; 20]).await.unwrap();
        });
        let chunk = read_chunk(&mut rx, 16).await.unwrap();
        assert_eq!(chunk.len(), 16);
        let rest = read_chunk(&mut rx, 16).await.unwrap();
        assert_eq!(rest.len(), 4);
        writer.await.unwrap();
        assert!(read_chunk(&mut rx, 16).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn read_chunk_empty_input() {
        let mut input: &[u8] = &[];
        assert!(read_chunk(&mut input, 1024).await.unwrap().is_empty());
    }
}
