//! HTTP Upgrade handshake messages (RFC 6455 Section 4).
//!
//! The client side builds and serializes a [`HandshakeRequest`] and checks the
//! server's [`HandshakeResponse`]. Parsing requests and writing responses is
//! kept for peers that play the server role (test harnesses, loopback tools).

use std::collections::HashMap;
use std::sync::Arc;

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use sha1::{Digest, Sha1};

use crate::error::{Error, Result};

/// The WebSocket GUID used in the Sec-WebSocket-Accept calculation (RFC 6455).
pub const WS_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// The only protocol version this crate speaks.
pub const WS_VERSION: u8 = 13;

/// Hook invoked on the outgoing request immediately before it is serialized.
pub type RequestDecorator = Arc<dyn Fn(&mut HandshakeRequest) + Send + Sync>;

/// Headers the request writes itself; decorators may not override them.
const RESERVED_HEADERS: [&str; 5] = [
    "host",
    "upgrade",
    "connection",
    "sec-websocket-key",
    "sec-websocket-version",
];

/// Parse header lines into a map keyed by lowercase name.
///
/// With `reject_duplicates`, a repeated reserved header is an error.
fn parse_headers<'a, I>(lines: I, reject_duplicates: bool) -> Result<HashMap<String, String>>
where
    I: Iterator<Item = &'a str>,
{
    let mut headers: HashMap<String, String> = HashMap::new();

    for line in lines {
        if line.is_empty() {
            break;
        }
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        let name = name.trim().to_ascii_lowercase();
        if reject_duplicates
            && RESERVED_HEADERS.contains(&name.as_str())
            && headers.contains_key(&name)
        {
            return Err(Error::ProtocolHandshakeFailure(format!(
                "Duplicate header: {name}"
            )));
        }
        headers.insert(name, value.trim().to_string());
    }

    Ok(headers)
}

fn require<'h>(headers: &'h HashMap<String, String>, name: &str) -> Result<&'h str> {
    headers
        .get(name)
        .map(String::as_str)
        .ok_or_else(|| Error::ProtocolHandshakeFailure(format!("Missing {name} header")))
}

fn check_upgrade_headers(headers: &HashMap<String, String>) -> Result<()> {
    let upgrade = require(headers, "upgrade")?;
    if !upgrade.eq_ignore_ascii_case("websocket") {
        return Err(Error::ProtocolHandshakeFailure(format!(
            "Invalid Upgrade header: {upgrade}"
        )));
    }
    let connection = require(headers, "connection")?;
    if !connection.to_ascii_lowercase().contains("upgrade") {
        return Err(Error::ProtocolHandshakeFailure(format!(
            "Invalid Connection header: {connection}"
        )));
    }
    Ok(())
}

fn validate_header_value(header: &str, value: &str) -> Result<()> {
    if value.contains('\r') || value.contains('\n') {
        return Err(Error::InvalidHeaderValue {
            header: header.to_string(),
            reason: "contains CR or LF characters".to_string(),
        });
    }
    Ok(())
}

/// Generate a fresh random `Sec-WebSocket-Key`.
///
/// # Errors
///
/// Returns `Error::Io` if the system random source fails.
pub fn generate_key() -> Result<String> {
    let mut nonce = [0u8; 16];
    getrandom::getrandom(&mut nonce).map_err(|e| Error::Io(e.to_string()))?;
    Ok(BASE64.encode(nonce))
}

/// Computes the Sec-WebSocket-Accept value from the client's Sec-WebSocket-Key.
///
/// ```
/// use wsstream::protocol::handshake::compute_accept_key;
///
/// let accept = compute_accept_key("dGhlIHNhbXBsZSBub25jZQ==");
/// assert_eq!(accept, "s3pPLMBiTxaQ9kYGzzhZRbK+xOo=");
/// ```
pub fn compute_accept_key(key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(key.as_bytes());
    hasher.update(WS_GUID.as_bytes());
    BASE64.encode(hasher.finalize())
}

/// Client upgrade request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeRequest {
    /// Request target, e.g. `/announce?info_hash=...`.
    pub path: String,
    /// Host header value.
    pub host: String,
    /// Sec-WebSocket-Key value.
    pub key: String,
    /// Sec-WebSocket-Version value.
    pub version: u8,
    /// Additional headers in insertion order.
    pub headers: Vec<(String, String)>,
}

impl HandshakeRequest {
    /// A version-13 request for `path` on `host` with the given key.
    pub fn new(host: impl Into<String>, path: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            host: host.into(),
            key: key.into(),
            version: WS_VERSION,
            headers: Vec::new(),
        }
    }

    /// Set an additional header, replacing any previous value (case-insensitive).
    ///
    /// Reserved upgrade headers are ignored.
    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        if RESERVED_HEADERS.contains(&name.to_ascii_lowercase().as_str()) {
            return;
        }
        let value = value.into();
        match self
            .headers
            .iter_mut()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(&name))
        {
            Some(entry) => entry.1 = value,
            None => self.headers.push((name, value)),
        }
    }

    /// Look up an additional header by name (case-insensitive).
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Serialize the request into `buf`.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidHeaderValue` if any value contains CR or LF.
    pub fn write(&self, buf: &mut Vec<u8>) -> Result<()> {
        validate_header_value("Request-Target", &self.path)?;
        validate_header_value("Host", &self.host)?;

        buf.extend_from_slice(format!("GET {} HTTP/1.1\r\n", self.path).as_bytes());
        buf.extend_from_slice(format!("Host: {}\r\n", self.host).as_bytes());
        buf.extend_from_slice(b"Upgrade: websocket\r\n");
        buf.extend_from_slice(b"Connection: Upgrade\r\n");
        buf.extend_from_slice(format!("Sec-WebSocket-Key: {}\r\n", self.key).as_bytes());
        buf.extend_from_slice(format!("Sec-WebSocket-Version: {}\r\n", self.version).as_bytes());
        for (name, value) in &self.headers {
            validate_header_value(name, name)?;
            validate_header_value(name, value)?;
            buf.extend_from_slice(format!("{name}: {value}\r\n").as_bytes());
        }
        buf.extend_from_slice(b"\r\n");
        Ok(())
    }

    /// Parse a request, as received by the server role.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ProtocolHandshakeFailure`] if the request line is not
    /// `GET <path> HTTP/1.1`, a required header is missing or duplicated, or
    /// the version is not a number.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(data)
            .map_err(|_| Error::ProtocolHandshakeFailure("Invalid UTF-8".into()))?;
        let mut lines = text.lines();

        let request_line = lines
            .next()
            .ok_or_else(|| Error::ProtocolHandshakeFailure("Empty request".into()))?;
        let parts: Vec<&str> = request_line.split_whitespace().collect();
        let [method, path, version] = parts.as_slice() else {
            return Err(Error::ProtocolHandshakeFailure("Invalid request line".into()));
        };
        if *method != "GET" {
            return Err(Error::ProtocolHandshakeFailure(format!(
                "Expected GET method, got {method}"
            )));
        }
        if !version.starts_with("HTTP/1.1") {
            return Err(Error::ProtocolHandshakeFailure(format!(
                "Expected HTTP/1.1, got {version}"
            )));
        }

        let headers = parse_headers(lines, true)?;
        check_upgrade_headers(&headers)?;
        let host = require(&headers, "host")?.to_string();
        let key = require(&headers, "sec-websocket-key")?.to_string();
        let version_str = require(&headers, "sec-websocket-version")?;
        let version = version_str.parse().map_err(|_| {
            Error::ProtocolHandshakeFailure(format!("Invalid version: {version_str}"))
        })?;

        let mut extra: Vec<(String, String)> = headers
            .into_iter()
            .filter(|(name, _)| !RESERVED_HEADERS.contains(&name.as_str()))
            .collect();
        extra.sort();

        Ok(Self {
            path: path.to_string(),
            host,
            key,
            version,
            headers: extra,
        })
    }
}

/// Server upgrade response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeResponse {
    /// The Sec-WebSocket-Accept value.
    pub accept: String,
    /// The selected Sec-WebSocket-Protocol (optional).
    pub protocol: Option<String>,
}

impl HandshakeResponse {
    /// The accepting response for a parsed request.
    pub fn from_request(req: &HandshakeRequest) -> Self {
        Self {
            accept: compute_accept_key(&req.key),
            protocol: None,
        }
    }

    /// Serialize a `101 Switching Protocols` response into `buf`.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidHeaderValue` if the protocol contains CR/LF.
    pub fn write(&self, buf: &mut Vec<u8>) -> Result<()> {
        buf.extend_from_slice(b"HTTP/1.1 101 Switching Protocols\r\n");
        buf.extend_from_slice(b"Upgrade: websocket\r\n");
        buf.extend_from_slice(b"Connection: Upgrade\r\n");
        buf.extend_from_slice(format!("Sec-WebSocket-Accept: {}\r\n", self.accept).as_bytes());
        if let Some(ref proto) = self.protocol {
            validate_header_value("Sec-WebSocket-Protocol", proto)?;
            buf.extend_from_slice(format!("Sec-WebSocket-Protocol: {proto}\r\n").as_bytes());
        }
        buf.extend_from_slice(b"\r\n");
        Ok(())
    }

    /// Parse the server's response.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ProtocolHandshakeFailure`] if the status is not 101 or
    /// the upgrade headers are missing or wrong.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(data)
            .map_err(|_| Error::ProtocolHandshakeFailure("Invalid UTF-8".into()))?;
        let mut lines = text.lines();

        let status_line = lines
            .next()
            .ok_or_else(|| Error::ProtocolHandshakeFailure("Empty response".into()))?;
        if !status_line.starts_with("HTTP/1.1 101") {
            return Err(Error::ProtocolHandshakeFailure(format!(
                "Expected 101 status, got: {status_line}"
            )));
        }

        let headers = parse_headers(lines, false)?;
        check_upgrade_headers(&headers)?;
        let accept = require(&headers, "sec-websocket-accept")?.to_string();

        Ok(Self {
            accept,
            protocol: headers.get("sec-websocket-protocol").cloned(),
        })
    }

    /// Check the accept value against the key the client sent.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ProtocolHandshakeFailure`] on mismatch.
    pub fn verify(&self, key: &str) -> Result<()> {
        if self.accept == compute_accept_key(key) {
            Ok(())
        } else {
            Err(Error::ProtocolHandshakeFailure(
                "Invalid Sec-WebSocket-Accept".into(),
            ))
        }
    }
}
