//! Where a connect attempt goes: scheme, host, port and request path.

use std::fmt;

use http::Uri;

use crate::error::{Error, Result};

/// Port used when the URL names none (or names port 0), for both schemes.
pub const DEFAULT_PORT: u16 = 443;

/// URL scheme of a connect attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scheme {
    /// `ws://`, plain TCP.
    Ws,
    /// `wss://`, TLS over TCP.
    Wss,
}

impl Scheme {
    #[must_use]
    pub const fn is_secure(&self) -> bool {
        matches!(self, Scheme::Wss)
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scheme::Ws => f.write_str("ws"),
            Scheme::Wss => f.write_str("wss"),
        }
    }
}

/// Host, port and path the upgrade request is addressed to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeTarget {
    pub scheme: Scheme,
    /// Hostname or IP literal, without IPv6 brackets.
    pub hostname: String,
    pub port: u16,
    /// Request target including any query string; never empty.
    pub path: String,
}

impl HandshakeTarget {
    /// Parse a `ws://` or `wss://` URL.
    ///
    /// ```
    /// use wsstream::target::{HandshakeTarget, Scheme};
    ///
    /// let target = HandshakeTarget::parse("ws://tracker.example.com").unwrap();
    /// assert_eq!(target.scheme, Scheme::Ws);
    /// assert_eq!(target.port, 443);
    /// assert_eq!(target.path, "/");
    /// ```
    ///
    /// # Errors
    ///
    /// - `Error::InvalidUrl` if the URL does not parse, has no host, or names
    ///   a port above 65535
    /// - `Error::UnsupportedProtocol` if the scheme is neither `ws` nor `wss`
    pub fn parse(url: &str) -> Result<Self> {
        let uri: Uri = url
            .parse()
            .map_err(|e: http::uri::InvalidUri| Error::InvalidUrl(format!("{url}: {e}")))?;

        let scheme = match uri.scheme_str() {
            Some(s) if s.eq_ignore_ascii_case("ws") => Scheme::Ws,
            Some(s) if s.eq_ignore_ascii_case("wss") => Scheme::Wss,
            Some(other) => return Err(Error::UnsupportedProtocol(other.to_string())),
            None => return Err(Error::InvalidUrl(format!("{url}: missing scheme"))),
        };

        let host = uri
            .host()
            .filter(|host| !host.is_empty())
            .ok_or_else(|| Error::InvalidUrl(format!("{url}: missing host")))?;
        let hostname = host
            .strip_prefix('[')
            .and_then(|h| h.strip_suffix(']'))
            .unwrap_or(host)
            .to_string();

        let port = match uri.authority().and_then(|a| raw_port(a.as_str())) {
            None | Some("") => DEFAULT_PORT,
            Some(raw) => match raw.parse::<u16>() {
                Ok(0) => DEFAULT_PORT,
                Ok(port) => port,
                Err(_) => return Err(Error::InvalidUrl(format!("{url}: invalid port {raw}"))),
            },
        };

        let path = match uri.path_and_query().map(|pq| pq.as_str()) {
            None | Some("") => "/".to_string(),
            Some(pq) if pq.starts_with('?') => format!("/{pq}"),
            Some(pq) => pq.to_string(),
        };

        Ok(Self {
            scheme,
            hostname,
            port,
            path,
        })
    }
}

/// Port text of an authority, as written. `Uri::port` hides ports that do
/// not fit in a `u16`.
fn raw_port(authority: &str) -> Option<&str> {
    let host_port = authority.rsplit_once('@').map_or(authority, |(_, rest)| rest);
    match host_port.strip_prefix('[') {
        Some(v6) => v6.split_once(']').and_then(|(_, rest)| rest.strip_prefix(':')),
        None => host_port.split_once(':').map(|(_, port)| port),
    }
}

impl fmt::Display for HandshakeTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.hostname.contains(':') {
            write!(f, "{}://[{}]:{}{}", self.scheme, self.hostname, self.port, self.path)
        } else {
            write!(f, "{}://{}:{}{}", self.scheme, self.hostname, self.port, self.path)
        }
    }
}
