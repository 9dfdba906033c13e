//! LCS binary frame codec.
//!
//! # Wire format
//!
//! ```text
//! [1   STX = 0x02]
//! [2   Length, big-endian: total frame bytes]
//! [5   DestAddr: device type, master, CU, 0, 0]
//! [5   SrcAddr:  device type, master, CU, 0, 0]
//! [1   OP1]
//! [1   OP2]
//! [N   Data, N = Length - 18]
//! [2   BCC, little-endian]
//! [1   ETX = 0x03]
//! ```
//!
//! The BCC covers `[3, 15+N)` (both address blocks, the opcode pair and
//! all data bytes) as a 16-bit one's-complement word sum. Length is
//! big-endian while the BCC is little-endian; the asymmetry is part of
//! the protocol.

use bytes::{BufMut, BytesMut};

use crate::constants::{ADDR_OFFSET, DATA_OFFSET, ETX, HOST_ADDR, MIN_FRAME_LEN, STX};

/// A parsed LCS frame.
///
/// Address blocks are kept as raw 5-byte arrays so a decoded frame
/// re-encodes to the exact bytes it came from; the last two bytes of each
/// block are reserved and zero on every frame the gateway builds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub dest: [u8; 5],
    pub src: [u8; 5],
    pub op1: u8,
    pub op2: u8,
    pub data: Vec<u8>,
}

impl Frame {
    /// Builds a request frame addressed from the gateway host.
    pub fn request(dest_type: u8, master: u8, cu: u8, op1: u8, op2: u8, data: Vec<u8>) -> Self {
        Self {
            dest: [dest_type, master, cu, 0x00, 0x00],
            src: HOST_ADDR,
            op1,
            op2,
            data,
        }
    }

    /// Combined opcode, `(OP1 << 8) | OP2`.
    pub fn opcode(&self) -> u16 {
        (u16::from(self.op1) << 8) | u16::from(self.op2)
    }

    /// Total on-wire length of this frame.
    pub fn wire_len(&self) -> usize {
        MIN_FRAME_LEN + self.data.len()
    }

    /// Encodes the frame into its wire representation.
    pub fn encode(&self) -> Vec<u8> {
        let n = self.data.len();
        let total = MIN_FRAME_LEN + n;
        debug_assert!(total <= usize::from(u16::MAX), "frame data too large");

        let mut buf = BytesMut::with_capacity(total);
        buf.put_u8(STX);
        buf.put_u16(total as u16);
        buf.put_slice(&self.dest);
        buf.put_slice(&self.src);
        buf.put_u8(self.op1);
        buf.put_u8(self.op2);
        buf.put_slice(&self.data);
        let checksum = bcc(&buf[ADDR_OFFSET..DATA_OFFSET + n]);
        buf.put_u16_le(checksum);
        buf.put_u8(ETX);
        buf.to_vec()
    }
}

/// Result of attempting to decode one frame from a receive buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeResult {
    /// A complete, checksum-valid frame. The `usize` is the number of
    /// bytes consumed; the caller drains them and calls again.
    Frame(Frame, usize),

    /// The buffer does not yet hold a complete frame.
    Incomplete,

    /// Framing loss at the head of the buffer. The caller drops `skip`
    /// bytes and retries from the next byte (resynchronization).
    Corrupt {
        skip: usize,
        reason: &'static str,
    },
}

/// Attempts to decode one frame from the head of `buf`.
///
/// Only `buf[0..3]` is inspected before the full frame has arrived, so a
/// partial header never causes a false corrupt verdict. All corruption is
/// answered with a one-byte skip: the decoder walks forward until it
/// re-locks onto an STX that checks out.
pub fn try_decode(buf: &[u8]) -> DecodeResult {
    if buf.len() < 3 {
        return DecodeResult::Incomplete;
    }
    if buf[0] != STX {
        return DecodeResult::Corrupt {
            skip: 1,
            reason: "missing STX",
        };
    }

    let total = usize::from(u16::from_be_bytes([buf[1], buf[2]]));
    if total < MIN_FRAME_LEN {
        return DecodeResult::Corrupt {
            skip: 1,
            reason: "length below minimum",
        };
    }
    if buf.len() < total {
        return DecodeResult::Incomplete;
    }
    if buf[total - 1] != ETX {
        return DecodeResult::Corrupt {
            skip: 1,
            reason: "missing ETX",
        };
    }

    let n = total - MIN_FRAME_LEN;
    let expected = bcc(&buf[ADDR_OFFSET..DATA_OFFSET + n]);
    let stored = u16::from_le_bytes([buf[DATA_OFFSET + n], buf[DATA_OFFSET + n + 1]]);
    if stored != expected {
        return DecodeResult::Corrupt {
            skip: 1,
            reason: "BCC mismatch",
        };
    }

    let mut dest = [0u8; 5];
    dest.copy_from_slice(&buf[3..8]);
    let mut src = [0u8; 5];
    src.copy_from_slice(&buf[8..13]);

    let frame = Frame {
        dest,
        src,
        op1: buf[13],
        op2: buf[14],
        data: buf[DATA_OFFSET..DATA_OFFSET + n].to_vec(),
    };
    DecodeResult::Frame(frame, total)
}

/// 16-bit one's-complement checksum over a byte range.
///
/// The range is read as big-endian 16-bit words; an odd trailing byte
/// forms a final word with a zero low byte. Words are summed mod 2³²,
/// the high half is folded into the low half (end-around carry), and the
/// one's complement of the result is returned.
pub fn bcc(range: &[u8]) -> u16 {
    let mut sum: u32 = 0;
    let mut words = range.chunks_exact(2);
    for word in &mut words {
        sum = sum.wrapping_add(u32::from(u16::from_be_bytes([word[0], word[1]])));
    }
    if let [last] = words.remainder() {
        sum = sum.wrapping_add(u32::from(u16::from_be_bytes([*last, 0x00])));
    }
    while sum > 0xFFFF {
        sum = (sum & 0xFFFF) + (sum >> 16);
    }
    !(sum as u16)
}
