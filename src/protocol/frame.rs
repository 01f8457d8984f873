//! WebSocket frame parsing and serialization (RFC 6455 Section 5).

use bytes::{BufMut, BytesMut};

use crate::config::Limits;
use crate::connection::Role;
use crate::error::{Error, Result};
use crate::protocol::OpCode;

/// Maximum payload size for control frames (RFC 6455).
pub const MAX_CONTROL_FRAME_PAYLOAD: usize = 125;

/// XOR `data` with the 4-byte masking key, in place.
///
/// Masking is an involution: applying the same key twice restores the input.
#[inline]
pub fn apply_mask(data: &mut [u8], mask: [u8; 4]) {
    for (i, byte) in data.iter_mut().enumerate() {
        *byte ^= mask[i & 3];
    }
}

/// Decoded frame header.
///
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-------+-+-------------+-------------------------------+
/// |F|R|R|R| opcode|M| Payload len |    Extended payload length    |
/// |I|S|S|S|  (4)  |A|     (7)     |             (16/64)           |
/// |N|V|V|V|       |S|             |   (if payload len==126/127)   |
/// +-+-+-+-+-------+-+-------------+-------------------------------+
/// |                 Masking key (if MASK set)                     |
/// +---------------------------------------------------------------+
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub fin: bool,
    pub rsv1: bool,
    pub rsv2: bool,
    pub rsv3: bool,
    pub opcode: OpCode,
    pub mask: Option<[u8; 4]>,
    pub payload_len: usize,
    /// Header length in bytes, masking key included.
    pub header_len: usize,
}

impl FrameHeader {
    /// Decode a header from the front of `buf`.
    ///
    /// # Errors
    ///
    /// - `Error::IncompleteFrame` if `buf` does not yet hold the whole header
    /// - `Error::ReservedOpcode` for reserved opcodes
    /// - `Error::FrameTooLarge` if the 64-bit length does not fit in `usize`
    pub fn parse(buf: &[u8]) -> Result<Self> {
        let need = |n: usize| -> Result<()> {
            if buf.len() < n {
                Err(Error::IncompleteFrame {
                    needed: n - buf.len(),
                })
            } else {
                Ok(())
            }
        };

        need(2)?;
        let (b0, b1) = (buf[0], buf[1]);
        let opcode = OpCode::from_u8(b0 & 0x0F)?;
        let masked = b1 & 0x80 != 0;

        let (payload_len, mut header_len) = match b1 & 0x7F {
            126 => {
                need(4)?;
                (u16::from_be_bytes([buf[2], buf[3]]) as usize, 4)
            }
            127 => {
                need(10)?;
                let mut raw = [0u8; 8];
                raw.copy_from_slice(&buf[2..10]);
                let len = u64::from_be_bytes(raw);
                let len = usize::try_from(len).map_err(|_| Error::FrameTooLarge {
                    size: usize::MAX,
                    max: usize::MAX,
                })?;
                (len, 10)
            }
            short => (short as usize, 2),
        };

        let mask = if masked {
            need(header_len + 4)?;
            let key = [
                buf[header_len],
                buf[header_len + 1],
                buf[header_len + 2],
                buf[header_len + 3],
            ];
            header_len += 4;
            Some(key)
        } else {
            None
        };

        Ok(Self {
            fin: b0 & 0x80 != 0,
            rsv1: b0 & 0x40 != 0,
            rsv2: b0 & 0x20 != 0,
            rsv3: b0 & 0x10 != 0,
            opcode,
            mask,
            payload_len,
            header_len,
        })
    }

    /// Check an incoming header against the receiving role and limits.
    ///
    /// # Errors
    ///
    /// - `Error::MaskedServerFrame` / `Error::UnmaskedClientFrame` on masking violations
    /// - `Error::ReservedBitsSet` when any RSV bit is set
    /// - `Error::FragmentedControlFrame` / `Error::ControlFrameTooLarge` for bad control frames
    /// - `Error::FrameTooLarge` when the payload exceeds `limits.max_frame_size`
    pub fn validate(&self, role: Role, limits: &Limits) -> Result<()> {
        match (role.expects_masked(), self.mask.is_some()) {
            (false, true) => return Err(Error::MaskedServerFrame),
            (true, false) => return Err(Error::UnmaskedClientFrame),
            _ => {}
        }

        if self.rsv1 || self.rsv2 || self.rsv3 {
            return Err(Error::ReservedBitsSet);
        }

        if self.opcode.is_control() {
            if !self.fin {
                return Err(Error::FragmentedControlFrame);
            }
            if self.payload_len > MAX_CONTROL_FRAME_PAYLOAD {
                return Err(Error::ControlFrameTooLarge(self.payload_len));
            }
        }

        limits.check_frame_size(self.payload_len)
    }
}

/// A single WebSocket frame with its payload unmasked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Final fragment flag.
    pub fin: bool,
    /// Frame opcode.
    pub opcode: OpCode,
    payload: Vec<u8>,
}

impl Frame {
    #[must_use]
    pub fn new(fin: bool, opcode: OpCode, payload: Vec<u8>) -> Self {
        Self {
            fin,
            opcode,
            payload,
        }
    }

    #[must_use]
    pub fn text(data: impl Into<Vec<u8>>) -> Self {
        Self::new(true, OpCode::Text, data.into())
    }

    #[must_use]
    pub fn binary(data: impl Into<Vec<u8>>) -> Self {
        Self::new(true, OpCode::Binary, data.into())
    }

    /// Close frame. `None` sends no status code at all.
    #[must_use]
    pub fn close(code: Option<u16>, reason: &str) -> Self {
        let payload = match code {
            Some(code) => {
                let mut data = code.to_be_bytes().to_vec();
                data.extend_from_slice(reason.as_bytes());
                data
            }
            None => Vec::new(),
        };
        Self::new(true, OpCode::Close, payload)
    }

    #[must_use]
    pub fn ping(data: impl Into<Vec<u8>>) -> Self {
        Self::new(true, OpCode::Ping, data.into())
    }

    #[must_use]
    pub fn pong(data: impl Into<Vec<u8>>) -> Self {
        Self::new(true, OpCode::Pong, data.into())
    }

    #[inline]
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    #[must_use]
    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }

    /// Parse one frame from the front of `buf`, unmasking its payload.
    ///
    /// Returns the frame and the number of bytes consumed.
    ///
    /// # Errors
    ///
    /// Same as [`FrameHeader::parse`], plus `Error::IncompleteFrame` when the
    /// payload has not fully arrived.
    pub fn parse(buf: &[u8]) -> Result<(Self, usize)> {
        let header = FrameHeader::parse(buf)?;
        Self::from_header(header, buf)
    }

    pub(crate) fn from_header(header: FrameHeader, buf: &[u8]) -> Result<(Self, usize)> {
        let total = header
            .header_len
            .checked_add(header.payload_len)
            .ok_or(Error::FrameTooLarge {
                size: header.payload_len,
                max: usize::MAX - header.header_len,
            })?;
        if buf.len() < total {
            return Err(Error::IncompleteFrame {
                needed: total - buf.len(),
            });
        }

        let mut payload = buf[header.header_len..total].to_vec();
        if let Some(mask) = header.mask {
            apply_mask(&mut payload, mask);
        }
        Ok((Self::new(header.fin, header.opcode, payload), total))
    }

    /// Append the wire form of this frame to `dst`.
    pub fn encode(&self, dst: &mut BytesMut, mask: Option<[u8; 4]>) {
        dst.reserve(self.wire_size(mask.is_some()));

        let mut b0 = self.opcode.as_u8();
        if self.fin {
            b0 |= 0x80;
        }
        dst.put_u8(b0);

        let mask_bit = if mask.is_some() { 0x80 } else { 0 };
        let len = self.payload.len();
        if len <= MAX_CONTROL_FRAME_PAYLOAD {
            dst.put_u8(mask_bit | len as u8);
        } else if len <= u16::MAX as usize {
            dst.put_u8(mask_bit | 126);
            dst.put_u16(len as u16);
        } else {
            dst.put_u8(mask_bit | 127);
            dst.put_u64(len as u64);
        }

        match mask {
            Some(key) => {
                dst.put_slice(&key);
                let start = dst.len();
                dst.put_slice(&self.payload);
                apply_mask(&mut dst[start..], key);
            }
            None => dst.put_slice(&self.payload),
        }
    }

    /// Number of bytes [`Frame::encode`] will append.
    #[must_use]
    pub fn wire_size(&self, masked: bool) -> usize {
        let len = self.payload.len();
        let extended = if len <= MAX_CONTROL_FRAME_PAYLOAD {
            0
        } else if len <= u16::MAX as usize {
            2
        } else {
            8
        };
        2 + extended + if masked { 4 } else { 0 } + len
    }
}
