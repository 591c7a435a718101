//! TLS setup for the listener and for `https` backends.

use anyhow::Context;
use rustls::pki_types::CertificateDer;
use std::path::Path;
use std::sync::Arc;
use tokio_rustls::{TlsAcceptor, TlsConnector};

/// Create a TLS acceptor from PEM certificate chain and key files.
pub fn create_tls_acceptor(cert_path: &Path, key_path: &Path) -> anyhow::Result<TlsAcceptor> {
    let cert_file = std::fs::File::open(cert_path)
        .with_context(|| format!("Failed to open certificate file '{}'", cert_path.display()))?;
    let mut cert_reader = std::io::BufReader::new(cert_file);
    let certs: Vec<CertificateDer<'static>> = rustls_pemfile::certs(&mut cert_reader)
        .collect::<Result<_, _>>()
        .context("Failed to parse certificate file")?;

    if certs.is_empty() {
        anyhow::bail!("No certificates found in certificate file: {}", cert_path.display());
    }

    let key_file = std::fs::File::open(key_path)
        .with_context(|| format!("Failed to open private key file '{}'", key_path.display()))?;
    let mut key_reader = std::io::BufReader::new(key_file);

    // PKCS8, RSA or SEC1, whichever comes first
    let key = rustls_pemfile::private_key(&mut key_reader)
        .context("Failed to parse private key file")?
        .with_context(|| format!("No private key found in key file: {}", key_path.display()))?;

    let mut config = rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .context("Failed to build TLS configuration")?;
    config.alpn_protocols = vec![b"http/1.1".to_vec()];

    Ok(TlsAcceptor::from(Arc::new(config)))
}

/// Create a connector for `https` backends trusting the platform root store.
pub fn create_tls_connector() -> anyhow::Result<TlsConnector> {
    let native = rustls_native_certs::load_native_certs()
        .context("Failed to load platform root certificates")?;

    let mut roots = rustls::RootCertStore::empty();
    let (added, ignored) = roots.add_parsable_certificates(native);
    tracing::debug!(added, ignored, "Loaded platform root certificates");

    if roots.is_empty() {
        anyhow::bail!("No usable platform root certificates");
    }

    let config = rustls::ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth();

    Ok(TlsConnector::from(Arc::new(config)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_certificate_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = create_tls_acceptor(&dir.path().join("cert.pem"), &dir.path().join("key.pem"))
            .err()
            .unwrap();
        assert!(err.to_string().contains("certificate file"));
    }

    #[test]
    fn certificate_file_without_certs_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let cert = dir.path().join("cert.pem");
        std::fs::write(&cert, "not a pem file\n").unwrap();

        let err = create_tls_acceptor(&cert, &dir.path().join("key.pem"))
            .err()
            .unwrap();
        assert!(err.to_string().contains("No certificates found"));
    }
}
