//! TLS for `wss://` streams, backed by rustls.
//!
//! Certificate validation is entirely rustls' business; this module only
//! builds client configurations, sets up server name indication, and runs the
//! client handshake.

mod rustls_impl;

pub use rustls_impl::{TlsConnector, TlsError, TlsStream, load_certs_from_file};

use std::sync::Arc;

use rustls::RootCertStore;
use rustls::pki_types::CertificateDer;
use tokio_rustls::rustls::ClientConfig;

/// Client configuration trusting the Mozilla root set from `webpki-roots`.
#[must_use]
pub fn client_config_with_webpki_roots() -> Arc<ClientConfig> {
    let root_store = RootCertStore::from_iter(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

    let config = ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth();

    Arc::new(config)
}

/// Client configuration trusting exactly `certs`.
///
/// # Errors
///
/// Returns [`TlsError::Configuration`] if a certificate cannot be used as a
/// trust anchor, or [`TlsError::NoCertificatesFound`] if `certs` is empty.
pub fn client_config_with_roots(
    certs: Vec<CertificateDer<'static>>,
) -> Result<Arc<ClientConfig>, TlsError> {
    if certs.is_empty() {
        return Err(TlsError::NoCertificatesFound);
    }

    let mut root_store = RootCertStore::empty();
    for cert in certs {
        root_store
            .add(cert)
            .map_err(|e| TlsError::Configuration(e.to_string()))?;
    }

    let config = ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth();

    Ok(Arc::new(config))
}
