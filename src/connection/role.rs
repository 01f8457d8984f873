//! Endpoint role (client or server), which decides frame masking.

/// Which side of the connection a codec speaks for.
///
/// The stream itself is always [`Role::Client`]; [`Role::Server`] exists so a
/// loopback peer can reuse the same codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Masks outgoing frames, rejects masked incoming frames.
    Client,
    /// Sends unmasked frames, requires masked incoming frames.
    Server,
}

impl Role {
    /// Whether outgoing frames carry a masking key.
    #[inline]
    #[must_use]
    pub const fn must_mask(&self) -> bool {
        matches!(self, Role::Client)
    }

    /// Whether incoming frames must carry a masking key.
    #[inline]
    #[must_use]
    pub const fn expects_masked(&self) -> bool {
        matches!(self, Role::Server)
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Client => write!(f, "Client"),
            Role::Server => write!(f, "Server"),
        }
    }
}
