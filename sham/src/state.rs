//! Connection finite-state machine (FSM) types.
//!
//! This module defines every state a [`crate::connection::Connection`] can
//! occupy.  Transitions are driven by [`crate::connection`]; the legal ones
//! are listed on each variant.

/// All possible states of the connection FSM.
///
/// ```text
///  active open                         passive open
///  CLOSED ──SYN──▶ SYN_SENT           CLOSED ──SYN rcvd──▶ SYN_RECEIVED
///                     │ SYN-ACK rcvd                            │ ACK rcvd
///                     ▼                                         ▼
///                ESTABLISHED ◀───────────────────────────── ESTABLISHED
///  closer:  ESTABLISHED ─FIN─▶ FIN_WAIT_1 ─ACK─▶ FIN_WAIT_2 ─FIN─▶ TIME_WAIT ─▶ CLOSED
///  peer:    ESTABLISHED ─FIN rcvd─▶ CLOSE_WAIT ─FIN─▶ LAST_ACK ─ACK─▶ CLOSED
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    /// No connection exists; initial and final state.
    #[default]
    Closed,
    /// SYN sent; waiting for SYN-ACK.  Goes to `Established` or fails.
    SynSent,
    /// SYN received and SYN-ACK sent; waiting for the ACK.
    SynReceived,
    /// Handshake complete; data may flow.
    Established,
    /// Local FIN sent; waiting for its ACK.
    FinWait1,
    /// Local FIN acknowledged; waiting for the peer's FIN.
    FinWait2,
    /// Peer's FIN received and acknowledged; local FIN not yet sent.
    CloseWait,
    /// Local FIN sent after the peer's; waiting for the final ACK.
    LastAck,
    /// Peer's FIN acknowledged by the closer; socket about to be released.
    TimeWait,
    /// Both sides sent FIN simultaneously.
    Closing,
}

impl ConnectionState {
    /// `true` once the handshake has completed and before teardown begins.
    pub fn is_established(self) -> bool {
        self == Self::Established
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Closed => "CLOSED",
            Self::SynSent => "SYN_SENT",
            Self::SynReceived => "SYN_RECEIVED",
            Self::Established => "ESTABLISHED",
            Self::FinWait1 => "FIN_WAIT_1",
            Self::FinWait2 => "FIN_WAIT_2",
            Self::CloseWait => "CLOSE_WAIT",
            Self::LastAck => "LAST_ACK",
            Self::TimeWait => "TIME_WAIT",
            Self::Closing => "CLOSING",
        };
        f.write_str(name)
    }
}
