//! Async framing over tokio I/O: the client upgrade exchange and the split
//! frame reader/writer used once the connection is open.

mod framed;
mod upgrade;

pub use framed::{FrameReader, FrameWriter, Incoming};
pub use upgrade::client_handshake;
