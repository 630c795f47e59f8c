//! Wire-format definitions for protocol segments.
//!
//! Every datagram exchanged between peers is a [`Segment`].  This module is
//! responsible for:
//! - Defining the on-wire binary layout (header fields, flags, payload).
//! - Serialising a [`Segment`] into a byte buffer ready for transmission.
//! - Deserialising a raw byte slice back into a [`Segment`].
//!
//! No I/O happens here; this is pure data transformation.
//!
//! # Wire format
//!
//! Multi-byte integers are written in the **host's native** byte order.
//! Peers on machines of different endianness will not interoperate.
//!
//! ```text
//!  0               1               2               3
//!  0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                        Sequence Number                        |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                    Acknowledgment Number                      |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |             Flags             |          Window Size          |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                  Payload (0..=1024 bytes) ...                 |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! Total header size: [`HEADER_LEN`] = 12 bytes.  There is no length field
//! and no checksum: the payload is whatever follows the header inside the
//! datagram.

use bitflags::bitflags;
use thiserror::Error;

bitflags! {
    /// Control flags carried in the `flags` header field.
    ///
    /// SYN and ACK combine during the second handshake step; a bare data
    /// segment carries no flags at all.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Flags: u16 {
        /// Synchronise sequence numbers (handshake initiation).
        const SYN = 0x1;
        /// Acknowledgement field is valid.
        const ACK = 0x2;
        /// Finish: the sender has no more data to send.
        const FIN = 0x4;
    }
}

impl std::fmt::Display for Flags {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_empty() {
            return write!(f, "DATA");
        }
        let mut first = true;
        for (name, _) in self.iter_names() {
            if !first {
                write!(f, "-")?;
            }
            write!(f, "{name}")?;
            first = false;
        }
        // Bits with no name survive decode; surface them rather than hide them.
        let unknown = self.bits() & !Flags::all().bits();
        if unknown != 0 {
            if !first {
                write!(f, "-")?;
            }
            write!(f, "{unknown:#06x}")?;
        }
        Ok(())
    }
}

/// Byte length of the fixed-size header on the wire.
pub const HEADER_LEN: usize = 12;

/// Largest payload a single segment may carry.
pub const MAX_PAYLOAD: usize = 1024;

/// Largest datagram either peer will ever send.
pub const MAX_SEGMENT_LEN: usize = HEADER_LEN + MAX_PAYLOAD;

// Byte offsets of each field within the serialised header.
const OFF_SEQ: usize = 0;
const OFF_ACK: usize = 4;
const OFF_FLAGS: usize = 8;
const OFF_WINDOW: usize = 10;

/// Fixed-size protocol header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Header {
    /// Byte offset of the first payload byte, or the control sequence number.
    pub seq_num: u32,
    /// Next byte offset the sender of this segment expects (cumulative).
    pub ack_num: u32,
    /// Control flags.
    pub flags: Flags,
    /// Advertised receive window of the sender of this segment, in bytes.
    pub window_size: u16,
}

/// A complete protocol datagram: header + payload bytes.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Segment {
    pub header: Header,
    pub payload: Vec<u8>,
}

impl Segment {
    /// A payload-free control segment (SYN, SYN-ACK, ACK, FIN).
    pub fn control(seq_num: u32, ack_num: u32, flags: Flags, window_size: u16) -> Self {
        Self {
            header: Header {
                seq_num,
                ack_num,
                flags,
                window_size,
            },
            payload: Vec::new(),
        }
    }

    /// A bare data segment: no flags, no acknowledgement.
    pub fn data(seq_num: u32, window_size: u16, payload: Vec<u8>) -> Self {
        debug_assert!(
            payload.len() <= MAX_PAYLOAD,
            "payload of {} bytes exceeds MAX_PAYLOAD",
            payload.len()
        );
        Self {
            header: Header {
                seq_num,
                ack_num: 0,
                flags: Flags::empty(),
                window_size,
            },
            payload,
        }
    }

    /// `true` when the segment carries payload bytes.
    pub fn is_data(&self) -> bool {
        !self.payload.is_empty()
    }

    /// `true` when the flags are exactly `flags` (no more, no fewer).
    pub fn has_exact_flags(&self, flags: Flags) -> bool {
        self.header.flags == flags
    }

    /// Number of bytes this segment occupies on the wire.
    pub fn wire_len(&self) -> usize {
        HEADER_LEN + self.payload.len()
    }

    /// Serialise this segment into a newly allocated byte vector of exactly
    /// [`HEADER_LEN`] + payload length bytes.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = vec![0u8; self.wire_len()];

        buf[OFF_SEQ..OFF_SEQ + 4].copy_from_slice(&self.header.seq_num.to_ne_bytes());
        buf[OFF_ACK..OFF_ACK + 4].copy_from_slice(&self.header.ack_num.to_ne_bytes());
        buf[OFF_FLAGS..OFF_FLAGS + 2].copy_from_slice(&self.header.flags.bits().to_ne_bytes());
        buf[OFF_WINDOW..OFF_WINDOW + 2].copy_from_slice(&self.header.window_size.to_ne_bytes());
        buf[HEADER_LEN..].copy_from_slice(&self.payload);

        buf
    }

    /// Parse a [`Segment`] from a raw datagram.
    ///
    /// Everything after the header is payload; the datagram boundary is the
    /// only length information.
    pub fn decode(buf: &[u8]) -> Result<Self, SegmentError> {
        if buf.len() < HEADER_LEN {
            return Err(SegmentError::Malformed { len: buf.len() });
        }

        let seq_num = u32::from_ne_bytes([buf[OFF_SEQ], buf[OFF_SEQ + 1], buf[OFF_SEQ + 2], buf[OFF_SEQ + 3]]);
        let ack_num = u32::from_ne_bytes([buf[OFF_ACK], buf[OFF_ACK + 1], buf[OFF_ACK + 2], buf[OFF_ACK + 3]]);
        let flags = u16::from_ne_bytes([buf[OFF_FLAGS], buf[OFF_FLAGS + 1]]);
        let window_size = u16::from_ne_bytes([buf[OFF_WINDOW], buf[OFF_WINDOW + 1]]);

        Ok(Segment {
            header: Header {
                seq_num,
                ack_num,
                flags: Flags::from_bits_retain(flags),
                window_size,
            },
            payload: buf[HEADER_LEN..].to_vec(),
        })
    }
}

/// Errors that can arise when parsing a raw datagram.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SegmentError {
    /// Datagram shorter than the fixed header.
    #[error("malformed segment: {len} bytes is shorter than the fixed header")]
    Malformed { len: usize },
}
