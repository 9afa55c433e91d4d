//! TLS setup for the public HTTPS listener.

use std::fs::File;
use std::io::BufReader;
use std::sync::Arc;

use anyhow::{Context, Result};
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls_pemfile::{certs, private_key};
use tokio_rustls::TlsAcceptor;
use tracing::info;

/// Build the accept-side TLS context from PEM certificate and key files.
pub fn tls_acceptor(cert_path: &str, key_path: &str) -> Result<TlsAcceptor> {
    let chain = load_certs(cert_path)?;
    let key = load_private_key(key_path)?;

    let config = rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(chain, key)?;

    info!("TLS configuration loaded from {cert_path}");
    Ok(TlsAcceptor::from(Arc::new(config)))
}

fn load_certs(path: &str) -> Result<Vec<CertificateDer<'static>>> {
    let file = File::open(path).with_context(|| format!("opening certificate file {path}"))?;
    let mut reader = BufReader::new(file);

    let chain = certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("reading certificates from {path}"))?;
    if chain.is_empty() {
        anyhow::bail!("No certificates found in {path}");
    }
    Ok(chain)
}

fn load_private_key(path: &str) -> Result<PrivateKeyDer<'static>> {
    let file = File::open(path).with_context(|| format!("opening key file {path}"))?;
    let mut reader = BufReader::new(file);

    private_key(&mut reader)
        .with_context(|| format!("reading private key from {path}"))?
        .ok_or_else(|| anyhow::anyhow!("No private key found in {path}"))
}
