//! # wsstream - callback-driven client WebSocket streams
//!
//! `wsstream` establishes client WebSocket connections over plain TCP
//! (`ws://`) or TLS (`wss://`) and proxies reads and writes once the
//! connection is open. It is meant as a signaling transport inside a larger
//! networking stack, so every outcome is delivered through a completion
//! callback run on a tokio runtime.
//!
//! ## Connection sequence
//!
//! `connect` walks the stream through
//! `Resolving -> TcpConnecting -> [SecureHandshaking ->] ProtocolHandshaking -> Open`.
//! Resolved addresses are tried one at a time, last address first. The
//! connect callback runs exactly once, either with `Ok(())` or the error of
//! the first stage that failed. Closing the stream mid-attempt makes the
//! attempt finish with [`Error::Aborted`].
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use wsstream::{Config, GaiResolver, Message, WebSocketStream, tls};
//!
//! let connector = tls::TlsConnector::new(tls::client_config_with_webpki_roots());
//! let stream = WebSocketStream::new(
//!     tokio::runtime::Handle::current(),
//!     Arc::new(GaiResolver::new()),
//!     Some(connector),
//!     Config::new().with_user_agent("peer/1.0"),
//! );
//!
//! let writer = Arc::clone(&stream);
//! stream.connect("wss://tracker.example.com/announce", move |result| {
//!     if result.is_ok() {
//!         writer.write(Message::text("hello"), |sent| println!("sent {sent:?}"));
//!     }
//! });
//! ```

pub mod codec;
pub mod config;
pub mod connection;
pub mod error;
pub mod message;
pub mod protocol;
pub mod resolver;
pub mod target;
pub mod transport;

#[cfg(feature = "tls-rustls")]
pub mod tls;

pub use config::{Config, Limits};
pub use connection::{ConnectionState, Role, WebSocketStream};
pub use error::{Error, Result};
pub use message::{CloseCode, CloseFrame, Message};
pub use protocol::{HandshakeRequest, HandshakeResponse, OpCode, compute_accept_key};
pub use resolver::{AbortPolicy, GaiResolver, Resolver};
pub use target::{HandshakeTarget, Scheme};
pub use transport::{TlsConnector, TransportVariant};
