//! Error types for WebSocket connection establishment and I/O.
//!
//! Connect-sequence failures are reported once, through the connect handler.
//! Post-open failures reach the handler of the read or write that hit them.

use thiserror::Error;

/// Result type alias for WebSocket operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while connecting or exchanging WebSocket frames.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// The URL could not be parsed or has no host.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// The URL scheme is not `ws`/`wss`, or `wss` was requested without TLS.
    #[error("Unsupported protocol: {0}")]
    UnsupportedProtocol(String),

    /// `connect` was called on an open connection.
    #[error("Already connected")]
    AlreadyConnected,

    /// `connect` was called while another attempt is in flight.
    #[error("Connection attempt already started")]
    AlreadyStarted,

    /// Hostname resolution failed.
    #[error("Resolution failure: {0}")]
    ResolutionFailure(String),

    /// Every resolved endpoint refused or failed the TCP connect.
    #[error("Connect failure: {0}")]
    ConnectFailure(String),

    /// Server name indication could not be configured for the hostname.
    #[error("TLS setup failure: {0}")]
    TlsSetupFailure(String),

    /// The attempt was superseded by `close()`, or the TLS handshake failed.
    #[error("Operation aborted")]
    Aborted,

    /// The HTTP upgrade exchange failed.
    #[error("Protocol handshake failure: {0}")]
    ProtocolHandshakeFailure(String),

    /// The peer closed the connection cleanly.
    #[error("Connection closed: {0:?}")]
    ConnectionClosed(Option<u16>),

    /// I/O error occurred.
    #[error("I/O error: {0}")]
    Io(String),

    /// Invalid frame structure or header.
    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    /// Protocol violation detected.
    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    /// Invalid UTF-8 in text message.
    #[error("Invalid UTF-8 in text message")]
    InvalidUtf8,

    /// Frame size exceeds configured maximum.
    #[error("Frame too large: {size} bytes (max: {max})")]
    FrameTooLarge {
        /// Actual frame size.
        size: usize,
        /// Maximum allowed size.
        max: usize,
    },

    /// Message size exceeds configured maximum.
    #[error("Message too large: {size} bytes (max: {max})")]
    MessageTooLarge {
        /// Actual message size.
        size: usize,
        /// Maximum allowed size.
        max: usize,
    },

    /// Handshake response exceeds configured maximum.
    #[error("Handshake too large: {size} bytes (max: {max})")]
    HandshakeTooLarge {
        /// Bytes received so far.
        size: usize,
        /// Maximum allowed size.
        max: usize,
    },

    /// Header value would break the request framing.
    #[error("Invalid value for header {header}: {reason}")]
    InvalidHeaderValue {
        /// Header name.
        header: String,
        /// Why the value was rejected.
        reason: String,
    },

    /// Masked frame received from the server.
    #[error("Server frame must not be masked")]
    MaskedServerFrame,

    /// Unmasked frame received by a server-role codec.
    #[error("Client frame must be masked")]
    UnmaskedClientFrame,

    /// Reserved bits set without a negotiated extension.
    #[error("Reserved bits set without negotiated extension")]
    ReservedBitsSet,

    /// Reserved opcode used.
    #[error("Reserved opcode: {0:#x}")]
    ReservedOpcode(u8),

    /// Control frame fragmented.
    #[error("Control frames cannot be fragmented")]
    FragmentedControlFrame,

    /// Control frame payload too large (>125 bytes).
    #[error("Control frame payload too large: {0} bytes (max: 125)")]
    ControlFrameTooLarge(usize),

    /// Incomplete frame data.
    #[error("Incomplete frame: need {needed} more bytes")]
    IncompleteFrame {
        /// Number of additional bytes needed.
        needed: usize,
    },
}

impl Error {
    /// Returns `true` for the clean remote-close sentinel.
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        matches!(self, Error::ConnectionClosed(_))
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}
