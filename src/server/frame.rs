//! WebSocket text-frame codec (server to client)
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-------+-+-------------+-------------------------------+
//! |F|R|R|R| opcode|M| Payload len |    Extended payload length    |
//! |I|S|S|S|  (4)  |A|     (7)     |            (16/64)            |
//! |N|V|V|V|       |S|             |   (if payload len==126/127)   |
//! +-+-+-+-+-------+-+-------------+ - - - - - - - - - - - - - - - +
//! ```
//!
//! Outbound frames are always FIN=1, opcode 0x1, unmasked, and never
//! fragmented.

use bytes::{BufMut, Bytes, BytesMut};

/// FIN bit plus text opcode
pub const TEXT_FRAME_HEAD: u8 = 0x81;

pub const OPCODE_TEXT: u8 = 0x1;

/// Largest length that fits the 7-bit field
pub const MAX_SHORT_PAYLOAD: usize = 125;

/// Largest length that fits the 16-bit extended field
pub const MAX_MEDIUM_PAYLOAD: usize = u16::MAX as usize;

const LEN_16: u8 = 126;
const LEN_64: u8 = 127;

/// Header size for a payload of `len` bytes.
pub fn header_len(len: usize) -> usize {
    if len <= MAX_SHORT_PAYLOAD {
        2
    } else if len <= MAX_MEDIUM_PAYLOAD {
        4
    } else {
        10
    }
}

/// Encode `payload` as a single text frame: header ++ UTF-8 bytes.
pub fn encode_text_frame(payload: &str) -> Bytes {
    let body = payload.as_bytes();
    let len = body.len();
    let mut frame = BytesMut::with_capacity(header_len(len) + len);

    frame.put_u8(TEXT_FRAME_HEAD);
    if len <= MAX_SHORT_PAYLOAD {
        frame.put_u8(len as u8);
    } else if len <= MAX_MEDIUM_PAYLOAD {
        frame.put_u8(LEN_16);
        frame.put_u16(len as u16);
    } else {
        frame.put_u8(LEN_64);
        frame.put_u64(len as u64);
    }
    frame.put_slice(body);

    frame.freeze()
}

/// Decoded frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub fin: bool,
    pub opcode: u8,
    pub masked: bool,
    pub payload_len: u64,
    /// Bytes occupied by the header, masking key included
    pub header_len: usize,
}

impl FrameHeader {
    /// Parse a header from the start of `buf`; `None` if `buf` is too short.
    pub fn parse(buf: &[u8]) -> Option<Self> {
        let (&b0, rest) = buf.split_first()?;
        let (&b1, rest) = rest.split_first()?;

        let masked = b1 & 0x80 != 0;
        let (payload_len, mut header_len) = match b1 & 0x7f {
            LEN_16 => {
                let ext: [u8; 2] = rest.get(..2)?.try_into().ok()?;
                (u16::from_be_bytes(ext) as u64, 4)
            }
            LEN_64 => {
                let ext: [u8; 8] = rest.get(..8)?.try_into().ok()?;
                (u64::from_be_bytes(ext), 10)
            }
            short => (short as u64, 2),
        };

        if masked {
            header_len += 4;
            if buf.len() < header_len {
                return None;
            }
        }

        Some(Self {
            fin: b0 & 0x80 != 0,
            opcode: b0 & 0x0f,
            masked,
            payload_len,
            header_len,
        })
    }
}
