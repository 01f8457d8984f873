//! Reassembly of fragmented data messages.

use crate::config::Limits;
use crate::error::{Error, Result};
use crate::message::Message;
use crate::protocol::{Frame, OpCode};

/// Collects data frames until a FIN frame completes the message.
#[derive(Debug, Default)]
pub struct MessageAssembler {
    opcode: Option<OpCode>,
    buffer: Vec<u8>,
    fragment_count: usize,
    limits: Limits,
}

impl MessageAssembler {
    pub fn new(limits: Limits) -> Self {
        Self {
            limits,
            ..Self::default()
        }
    }

    /// Feed a data frame. Returns the message once its final fragment arrives.
    ///
    /// # Errors
    ///
    /// - `Error::ProtocolViolation` on an unexpected or missing continuation,
    ///   or when too many fragments arrive
    /// - `Error::MessageTooLarge` when the reassembled size exceeds the limit
    /// - `Error::InvalidUtf8` when a completed text message is not UTF-8
    pub fn push(&mut self, frame: Frame) -> Result<Option<Message>> {
        match (frame.opcode, self.opcode) {
            (OpCode::Continuation, None) => {
                return Err(Error::ProtocolViolation(
                    "Unexpected continuation frame".into(),
                ));
            }
            (OpCode::Continuation, Some(_)) => {}
            (OpCode::Text | OpCode::Binary, None) => self.opcode = Some(frame.opcode),
            (OpCode::Text | OpCode::Binary, Some(_)) => {
                return Err(Error::ProtocolViolation(
                    "Expected continuation frame".into(),
                ));
            }
            (control, _) => {
                return Err(Error::ProtocolViolation(format!(
                    "{control} frame passed to message assembler"
                )));
            }
        }

        self.fragment_count += 1;
        self.limits.check_fragment_count(self.fragment_count)?;
        self.limits
            .check_message_size(self.buffer.len() + frame.payload().len())?;

        let fin = frame.fin;
        self.buffer.extend_from_slice(frame.payload());
        if !fin {
            return Ok(None);
        }

        let payload = std::mem::take(&mut self.buffer);
        let opcode = self.opcode.take();
        self.fragment_count = 0;
        match opcode {
            Some(OpCode::Text) => String::from_utf8(payload)
                .map(|text| Some(Message::Text(text)))
                .map_err(|_| Error::InvalidUtf8),
            _ => Ok(Some(Message::Binary(payload))),
        }
    }

    /// Returns `true` while a fragmented message is partially received.
    pub fn is_assembling(&self) -> bool {
        self.opcode.is_some()
    }
}
