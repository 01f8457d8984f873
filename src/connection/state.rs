//! Lifecycle states of a client WebSocket stream.

/// Connection state.
///
/// ```text
/// Idle -> Resolving -> TcpConnecting -> SecureHandshaking -> ProtocolHandshaking -> Open
///                                    \_______(plain)_______/
/// ```
///
/// Any connecting state may fall back to `Idle` on failure, any non-idle
/// state may move to `Closed`, and a new attempt starts from `Idle` or
/// `Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    /// No attempt in flight and no open connection.
    #[default]
    Idle,
    /// Waiting for the resolver.
    Resolving,
    /// Trying resolved endpoints.
    TcpConnecting,
    /// TLS handshake in progress.
    SecureHandshaking,
    /// HTTP upgrade in progress.
    ProtocolHandshaking,
    /// Upgrade completed; reads and writes are allowed.
    Open,
    /// Closed locally or by the peer.
    Closed,
}

impl ConnectionState {
    /// `Resolving` through `ProtocolHandshaking`.
    #[must_use]
    #[inline]
    pub const fn is_connecting(&self) -> bool {
        matches!(
            self,
            ConnectionState::Resolving
                | ConnectionState::TcpConnecting
                | ConnectionState::SecureHandshaking
                | ConnectionState::ProtocolHandshaking
        )
    }

    /// Whether a new `connect` may start from this state.
    #[must_use]
    #[inline]
    pub const fn can_start(&self) -> bool {
        matches!(self, ConnectionState::Idle | ConnectionState::Closed)
    }

    /// Whether the transition `self -> next` is allowed.
    #[must_use]
    pub const fn can_transition_to(&self, next: ConnectionState) -> bool {
        use ConnectionState::*;

        match (*self, next) {
            (Idle | Closed, Resolving) => true,
            (Resolving, TcpConnecting) => true,
            (TcpConnecting, SecureHandshaking | ProtocolHandshaking) => true,
            (SecureHandshaking, ProtocolHandshaking) => true,
            (ProtocolHandshaking, Open) => true,
            (from, Idle) => from.is_connecting(),
            (from, Closed) => !matches!(from, Idle | Closed),
            _ => false,
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ConnectionState::Idle => "Idle",
            ConnectionState::Resolving => "Resolving",
            ConnectionState::TcpConnecting => "TcpConnecting",
            ConnectionState::SecureHandshaking => "SecureHandshaking",
            ConnectionState::ProtocolHandshaking => "ProtocolHandshaking",
            ConnectionState::Open => "Open",
            ConnectionState::Closed => "Closed",
        };
        f.write_str(name)
    }
}
