use bytes::{Bytes, BytesMut};

use crate::constants::{HEADER_LEN, MAX_PAYLOAD};
use crate::error::CoreError;

/// Protocol flag bits carried in the 2-byte `flags` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SegmentFlags(pub u16);

impl SegmentFlags {
    pub const SYN: u16 = 0x1;
    pub const ACK: u16 = 0x2;
    pub const EOF: u16 = 0x4;

    pub fn empty() -> Self {
        Self(0)
    }

    pub fn with(flag: u16) -> Self {
        Self(flag)
    }

    pub fn set(mut self, flag: u16) -> Self {
        self.0 |= flag;
        self
    }

    pub fn has(&self, flag: u16) -> bool {
        self.0 & flag != 0
    }
}

/// The wire unit shared by both endpoints: a 20-byte fixed header plus up
/// to `MAX_PAYLOAD` bytes of payload.
///
/// `seq` addresses bytes, not segments: a data segment with sequence `s`
/// and payload length `L` covers byte range `[s, s+L)`. On ACK packets
/// `seq` is unused (emitted as 0) and `ack` carries the cumulative
/// acknowledgment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub seq: u32,
    pub ack: u32,
    pub flags: SegmentFlags,
    /// Left edge of one SACK block; `0` means "no SACK block present".
    pub sack_start: u32,
    /// Right edge (exclusive) of the SACK block.
    pub sack_end: u32,
    pub payload: Bytes,
}

impl Segment {
    pub fn data(seq: u32, payload: Bytes) -> Self {
        Self {
            seq,
            ack: 0,
            flags: SegmentFlags::empty(),
            sack_start: 0,
            sack_end: 0,
            payload,
        }
    }

    pub fn eof(seq: u32, sentinel: Bytes) -> Self {
        Self {
            seq,
            ack: 0,
            flags: SegmentFlags::with(SegmentFlags::EOF),
            sack_start: 0,
            sack_end: 0,
            payload: sentinel,
        }
    }

    pub fn ack(cum_ack: u32, sack: Option<(u32, u32)>) -> Self {
        let (sack_start, sack_end) = sack.unwrap_or((0, 0));
        Self {
            seq: 0,
            ack: cum_ack,
            flags: SegmentFlags::with(SegmentFlags::ACK),
            sack_start,
            sack_end,
            payload: Bytes::new(),
        }
    }

    pub fn eof_ack(final_offset_plus_one: u32, sack: Option<(u32, u32)>) -> Self {
        let (sack_start, sack_end) = sack.unwrap_or((0, 0));
        Self {
            seq: 0,
            ack: final_offset_plus_one,
            flags: SegmentFlags::with(SegmentFlags::ACK).set(SegmentFlags::EOF),
            sack_start,
            sack_end,
            payload: Bytes::new(),
        }
    }

    pub fn sack_block(&self) -> Option<(u32, u32)> {
        if self.sack_start == 0 {
            None
        } else {
            Some((self.sack_start, self.sack_end))
        }
    }

    pub fn is_ack(&self) -> bool {
        self.flags.has(SegmentFlags::ACK)
    }

    pub fn is_eof(&self) -> bool {
        self.flags.has(SegmentFlags::EOF)
    }

    /// Encode header + payload into a single contiguous buffer, ready to hand
    /// to the socket. Reserved bytes are always emitted as zero.
    pub fn encode(&self) -> Result<Bytes, CoreError> {
        if self.payload.len() > MAX_PAYLOAD {
            return Err(CoreError::PayloadTooLarge {
                len: self.payload.len(),
                max: MAX_PAYLOAD,
            });
        }
        if self.sack_start > 0 && self.sack_end <= self.sack_start {
            return Err(CoreError::InvalidSack {
                start: self.sack_start,
                end: self.sack_end,
            });
        }

        let mut buf = BytesMut::with_capacity(HEADER_LEN + self.payload.len());
        buf.extend_from_slice(&self.seq.to_be_bytes());
        buf.extend_from_slice(&self.ack.to_be_bytes());
        buf.extend_from_slice(&self.flags.0.to_be_bytes());
        buf.extend_from_slice(&self.sack_start.to_be_bytes());
        buf.extend_from_slice(&self.sack_end.to_be_bytes());
        buf.extend_from_slice(&0u16.to_be_bytes()); // reserved
        buf.extend_from_slice(&self.payload);
        Ok(buf.freeze())
    }

    /// Parse a received datagram. Rejects datagrams shorter than the fixed
    /// header, and SACK blocks with a non-zero start but a non-positive
    /// width. Reserved bytes are ignored, not validated.
    pub fn decode(bytes: &[u8]) -> Result<Self, CoreError> {
        if bytes.len() < HEADER_LEN {
            return Err(CoreError::ShortHeader {
                len: bytes.len(),
                needed: HEADER_LEN,
            });
        }

        let seq = u32::from_be_bytes(bytes[0..4].try_into().unwrap());
        let ack = u32::from_be_bytes(bytes[4..8].try_into().unwrap());
        let flags = u16::from_be_bytes(bytes[8..10].try_into().unwrap());
        let sack_start = u32::from_be_bytes(bytes[10..14].try_into().unwrap());
        let sack_end = u32::from_be_bytes(bytes[14..18].try_into().unwrap());
        // bytes[18..20] reserved, ignored.

        if sack_start > 0 && sack_end <= sack_start {
            return Err(CoreError::InvalidSack {
                start: sack_start,
                end: sack_end,
            });
        }

        Ok(Self {
            seq,
            ack,
            flags: SegmentFlags(flags),
            sack_start,
            sack_end,
            payload: Bytes::copy_from_slice(&bytes[HEADER_LEN..]),
        })
    }
}
