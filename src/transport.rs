//! Byte transports under the WebSocket framing: plain TCP or TLS over TCP.

use std::io;
use std::net::{IpAddr, SocketAddr};
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tracing::Instrument as _;

#[cfg(feature = "tls-rustls")]
use crate::tls::TlsStream;

#[cfg(feature = "tls-rustls")]
pub use crate::tls::TlsConnector;

/// Without the `tls-rustls` feature no connector can exist, so `wss://` URLs
/// are always rejected.
#[cfg(not(feature = "tls-rustls"))]
#[derive(Debug, Clone)]
pub enum TlsConnector {}

/// Transport chosen from the URL scheme for one connect attempt.
#[derive(Debug, Clone)]
pub enum TransportVariant {
    /// `ws://`
    Plain,
    /// `wss://`, with the connector that will run the handshake.
    Secure(TlsConnector),
}

impl TransportVariant {
    #[must_use]
    pub const fn is_secure(&self) -> bool {
        match self {
            TransportVariant::Plain => false,
            TransportVariant::Secure(_) => true,
        }
    }
}

/// A connected byte stream, encrypted or not.
#[derive(Debug)]
pub enum MaybeTlsStream {
    Plain(TcpStream),
    #[cfg(feature = "tls-rustls")]
    Tls(Box<TlsStream<TcpStream>>),
}

impl AsyncRead for MaybeTlsStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            MaybeTlsStream::Plain(s) => Pin::new(s).poll_read(cx, buf),
            #[cfg(feature = "tls-rustls")]
            MaybeTlsStream::Tls(s) => Pin::new(s.as_mut()).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for MaybeTlsStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            MaybeTlsStream::Plain(s) => Pin::new(s).poll_write(cx, buf),
            #[cfg(feature = "tls-rustls")]
            MaybeTlsStream::Tls(s) => Pin::new(s.as_mut()).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            MaybeTlsStream::Plain(s) => Pin::new(s).poll_flush(cx),
            #[cfg(feature = "tls-rustls")]
            MaybeTlsStream::Tls(s) => Pin::new(s.as_mut()).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            MaybeTlsStream::Plain(s) => Pin::new(s).poll_shutdown(cx),
            #[cfg(feature = "tls-rustls")]
            MaybeTlsStream::Tls(s) => Pin::new(s.as_mut()).poll_shutdown(cx),
        }
    }
}

/// Resolved addresses paired with the target port.
///
/// Candidates are handed out last-first: the final address the resolver
/// returned is tried before the first one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointCandidates {
    addrs: Vec<SocketAddr>,
}

impl EndpointCandidates {
    pub fn new(ips: impl IntoIterator<Item = IpAddr>, port: u16) -> Self {
        Self {
            addrs: ips.into_iter().map(|ip| SocketAddr::new(ip, port)).collect(),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.addrs.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.addrs.is_empty()
    }

    /// Next address to try.
    pub fn pop(&mut self) -> Option<SocketAddr> {
        self.addrs.pop()
    }

    /// Connect to each candidate in turn until one accepts.
    ///
    /// # Errors
    ///
    /// Returns the error of the last attempt when every candidate fails, or
    /// [`io::ErrorKind::AddrNotAvailable`] when there are no candidates.
    pub async fn connect(mut self) -> io::Result<TcpStream> {
        let mut last_error = None;

        while let Some(address) = self.pop() {
            let span = tracing::trace_span!("tcp_connect", %address);
            match TcpStream::connect(address).instrument(span).await {
                Ok(stream) => {
                    tracing::trace!(%address, "tcp connected");
                    return Ok(stream);
                }
                Err(error) => {
                    tracing::trace!(%address, %error, "tcp connect failed");
                    last_error = Some(error);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            io::Error::new(io::ErrorKind::AddrNotAvailable, "no endpoints to connect to")
        }))
    }
}
