//! `sham` - reliable, ordered byte-stream delivery over UDP.
//!
//! # Architecture
//!
//! ```text
//!  ┌──────────┐  data segments  ┌──────────┐
//!  │  Sender  │────────────────▶│ Receiver │◀── LossSimulator (optional)
//!  └────┬─────┘                 └─────┬────┘
//!       │                             │
//!       │     cumulative ACKs         │
//!       │◀────────────────────────────┘
//!       │
//!  ┌────▼──────────────────────────────┐
//!  │           Connection              │
//!  │ (handshake, send/receive loops,   │
//!  │  teardown, event log)             │
//!  └────┬──────────────────────────────┘
//!       │ raw UDP datagrams
//!  ┌────▼──────┐
//!  │  Socket   │  (thin async wrapper around tokio UdpSocket)
//!  └───────────┘
//! ```
//!
//! Each module has a single responsibility:
//! - [`packet`]     : wire format (serialise / deserialise)
//! - [`state`]      : finite-state-machine types
//! - [`config`]     : protocol constants and tunables
//! - [`timer`]      : retransmission deadlines and retry policy
//! - [`window`]     : fixed-capacity ring of in-flight segments
//! - [`sender`]     : sliding-window outbound state machine
//! - [`receiver`]   : in-order inbound state machine
//! - [`simulator`]  : synthetic loss of inbound data segments
//! - [`socket`]     : async UDP socket abstraction
//! - [`event_log`]  : protocol event trace
//! - [`connection`] : per-connection lifecycle
//! - [`chat`]       : unacknowledged line-based chat mode
//! - [`transfer`]   : file-level client and server drivers

pub mod chat;
pub mod config;
pub mod connection;
pub mod event_log;
pub mod packet;
pub mod receiver;
pub mod sender;
pub mod simulator;
pub mod socket;
pub mod state;
pub mod timer;
pub mod transfer;
pub mod window;

pub use config::Config;
pub use connection::{ConnError, Connection};
pub use packet::{Flags, Segment};
