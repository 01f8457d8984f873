//! WebSocket protocol core (RFC 6455), independent of any I/O.

pub mod assembler;
pub mod frame;
pub mod handshake;
pub mod opcode;

pub use assembler::MessageAssembler;
pub use frame::{Frame, apply_mask};
pub use handshake::{
    HandshakeRequest, HandshakeResponse, RequestDecorator, WS_GUID, compute_accept_key,
    generate_key,
};
pub use opcode::OpCode;
