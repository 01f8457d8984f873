use bytes::{Buf, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::config::Limits;
use crate::connection::Role;
use crate::error::{Error, Result};
use crate::message::{CloseFrame, Message};
use crate::protocol::frame::FrameHeader;
use crate::protocol::{Frame, MessageAssembler, OpCode};

/// Generate a random seed for mask generation.
/// Falls back to system time if getrandom fails.
fn random_mask_seed() -> u32 {
    let mut buf = [0u8; 4];
    if getrandom::getrandom(&mut buf).is_ok() {
        u32::from_le_bytes(buf)
    } else {
        use std::time::{SystemTime, UNIX_EPOCH};
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u32)
            .unwrap_or(0x5EED_5EED)
    }
}

/// What the reader produced: a complete data message or a control frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Incoming {
    /// A complete (possibly reassembled) data message.
    Message(Message),
    /// Ping with its application data; the receiver owes a pong.
    Ping(Vec<u8>),
    /// Unsolicited or answering pong.
    Pong,
    /// Close frame; `None` when the peer sent no status code.
    Close(Option<CloseFrame>),
}

/// Read half of a framed connection.
pub struct FrameReader<R> {
    io: R,
    read_buf: BytesMut,
    role: Role,
    limits: Limits,
    assembler: MessageAssembler,
}

impl<R> FrameReader<R> {
    #[must_use]
    pub fn new(io: R, role: Role, limits: Limits, capacity: usize) -> Self {
        Self {
            io,
            read_buf: BytesMut::with_capacity(capacity),
            role,
            assembler: MessageAssembler::new(limits.clone()),
            limits,
        }
    }

    /// Seed the buffer with bytes that arrived together with the upgrade
    /// response.
    #[must_use]
    pub fn with_buffered(mut self, buffered: &[u8]) -> Self {
        self.read_buf.extend_from_slice(buffered);
        self
    }

    #[must_use]
    pub fn role(&self) -> Role {
        self.role
    }
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    /// Read the next frame, validated against the role and limits.
    ///
    /// # Errors
    ///
    /// - `Error::Io` on EOF without a close frame
    /// - any validation error from [`FrameHeader::validate`]
    /// - `Error::Io` on transport failure
    pub async fn read_frame(&mut self) -> Result<Frame> {
        loop {
            match FrameHeader::parse(&self.read_buf) {
                Ok(header) => {
                    header.validate(self.role, &self.limits)?;
                    match Frame::from_header(header, &self.read_buf) {
                        Ok((frame, consumed)) => {
                            self.read_buf.advance(consumed);
                            return Ok(frame);
                        }
                        Err(Error::IncompleteFrame { needed }) => self.read_buf.reserve(needed),
                        Err(e) => return Err(e),
                    }
                }
                Err(Error::IncompleteFrame { .. }) => {}
                Err(e) => return Err(e),
            }

            let n = self.io.read_buf(&mut self.read_buf).await?;
            if n == 0 {
                return Err(std::io::Error::from(std::io::ErrorKind::UnexpectedEof).into());
            }
        }
    }

    /// Read until a complete data message or a control frame is available.
    ///
    /// Control frames may arrive between the fragments of a data message;
    /// they are returned immediately and reassembly resumes on the next call.
    ///
    /// # Errors
    ///
    /// Same as [`FrameReader::read_frame`], plus reassembly errors.
    pub async fn read_incoming(&mut self) -> Result<Incoming> {
        loop {
            let frame = self.read_frame().await?;
            match frame.opcode {
                OpCode::Ping => return Ok(Incoming::Ping(frame.into_payload())),
                OpCode::Pong => return Ok(Incoming::Pong),
                OpCode::Close => {
                    return Ok(Incoming::Close(CloseFrame::from_payload(frame.payload())));
                }
                OpCode::Text | OpCode::Binary | OpCode::Continuation => {
                    if let Some(message) = self.assembler.push(frame)? {
                        return Ok(Incoming::Message(message));
                    }
                }
            }
        }
    }
}

/// Write half of a framed connection.
pub struct FrameWriter<W> {
    io: W,
    write_buf: BytesMut,
    role: Role,
    mask_counter: u32,
}

impl<W> FrameWriter<W> {
    #[must_use]
    pub fn new(io: W, role: Role, capacity: usize) -> Self {
        Self {
            io,
            write_buf: BytesMut::with_capacity(capacity),
            role,
            mask_counter: random_mask_seed(),
        }
    }

    fn generate_mask(&mut self) -> [u8; 4] {
        self.mask_counter = self.mask_counter.wrapping_add(0x9E37_79B9);
        let a = self.mask_counter;
        let b = a.wrapping_mul(0x85EB_CA6B);
        let c = b ^ (b >> 13);
        let d = c.wrapping_mul(0xC2B2_AE35);
        d.to_le_bytes()
    }
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    /// Encode and write one frame. Does not flush.
    ///
    /// # Errors
    ///
    /// Returns `Error::Io` if the transport write fails.
    pub async fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        let mask = self.role.must_mask().then(|| self.generate_mask());
        self.write_buf.clear();
        frame.encode(&mut self.write_buf, mask);
        self.io.write_all(&self.write_buf).await?;
        Ok(())
    }

    /// Write a data message as a single final frame and flush.
    ///
    /// Returns the number of payload bytes sent.
    ///
    /// # Errors
    ///
    /// Returns `Error::Io` if the transport write or flush fails.
    pub async fn send_message(&mut self, message: &Message) -> Result<usize> {
        let frame = match message {
            Message::Text(text) => Frame::text(text.as_bytes()),
            Message::Binary(data) => Frame::binary(data.as_slice()),
        };
        self.write_frame(&frame).await?;
        self.flush().await?;
        Ok(message.len())
    }

    pub async fn flush(&mut self) -> Result<()> {
        self.io.flush().await?;
        Ok(())
    }

    pub async fn shutdown(&mut self) -> Result<()> {
        self.io.shutdown().await?;
        Ok(())
    }
}
