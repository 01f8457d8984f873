use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use rustls::pki_types::{CertificateDer, ServerName};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_rustls::rustls::ClientConfig;

/// Client-side TLS stream over `S`.
pub type TlsStream<S> = tokio_rustls::client::TlsStream<S>;

#[derive(Debug)]
pub enum TlsError {
    Io(std::io::Error),
    Configuration(String),
    NoCertificatesFound,
    InvalidDnsName(String),
}

impl std::fmt::Display for TlsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TlsError::Io(e) => write!(f, "TLS I/O error: {}", e),
            TlsError::Configuration(msg) => write!(f, "TLS configuration error: {}", msg),
            TlsError::NoCertificatesFound => write!(f, "no certificates found"),
            TlsError::InvalidDnsName(name) => write!(f, "invalid DNS name: {}", name),
        }
    }
}

impl std::error::Error for TlsError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TlsError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for TlsError {
    fn from(err: std::io::Error) -> Self {
        TlsError::Io(err)
    }
}

/// Runs client TLS handshakes with a shared rustls configuration.
#[derive(Clone)]
pub struct TlsConnector {
    inner: tokio_rustls::TlsConnector,
}

impl std::fmt::Debug for TlsConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsConnector").finish_non_exhaustive()
    }
}

impl TlsConnector {
    pub fn new(config: Arc<ClientConfig>) -> Self {
        Self {
            inner: tokio_rustls::TlsConnector::from(config),
        }
    }

    /// Server name indication for `hostname`.
    ///
    /// IP literals are accepted and sent without SNI, as rustls does.
    ///
    /// # Errors
    ///
    /// Returns [`TlsError::InvalidDnsName`] if `hostname` is neither a valid
    /// DNS name nor an IP address.
    pub fn server_name(&self, hostname: &str) -> Result<ServerName<'static>, TlsError> {
        ServerName::try_from(hostname.to_string())
            .map_err(|_| TlsError::InvalidDnsName(hostname.to_string()))
    }

    /// Run the client handshake over an established transport.
    ///
    /// # Errors
    ///
    /// Returns [`TlsError::Io`] if the handshake fails, including certificate
    /// validation failures reported by rustls.
    pub async fn handshake<S>(
        &self,
        server_name: ServerName<'static>,
        stream: S,
    ) -> Result<TlsStream<S>, TlsError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        self.inner
            .connect(server_name, stream)
            .await
            .map_err(TlsError::Io)
    }
}

/// Load every PEM certificate in `path`, e.g. a private trust root.
///
/// # Errors
///
/// Returns [`TlsError::Io`] if the file cannot be read, or
/// [`TlsError::NoCertificatesFound`] if it holds no certificate.
pub fn load_certs_from_file(path: &Path) -> Result<Vec<CertificateDer<'static>>, TlsError> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);

    let certs: Vec<CertificateDer<'static>> =
        rustls_pemfile::certs(&mut reader).collect::<Result<Vec<_>, _>>()?;

    if certs.is_empty() {
        return Err(TlsError::NoCertificatesFound);
    }

    Ok(certs)
}
