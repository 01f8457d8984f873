//! Client connection lifecycle: the state machine and the stream that drives it.
//!
//! ## Lifecycle
//!
//! 1. **Idle** - created, or the last attempt failed
//! 2. **Resolving / TcpConnecting / SecureHandshaking / ProtocolHandshaking** -
//!    a connect attempt is in flight
//! 3. **Open** - reads and writes are proxied to the transport
//! 4. **Closed** - closed locally or by the peer; `connect` may start over

mod role;
mod state;
mod stream;

pub use role::Role;
pub use state::ConnectionState;
pub use stream::WebSocketStream;
