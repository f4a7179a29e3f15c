//! Server identity loading and the TLS acceptor.
//!
//! The identity (certificate chain + private key) is loaded at most once,
//! on the first handshake that needs it, and the resulting acceptor is
//! shared read-only by all subsequent handshakes. A load failure surfaces
//! through that handshake's error path, not at listener construction, so
//! the listener can start listening before the identity is verified
//! loadable.

use crate::config::{TlsConfig, TlsVersion};
use crate::error::ServerError;
use rustls::pki_types::{CertificateDer, CertificateRevocationListDer, PrivateKeyDer};
use rustls::server::WebPkiClientVerifier;
use rustls::RootCertStore;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tokio_rustls::TlsAcceptor;

/// Lazily loaded, process-wide server identity.
pub struct IdentityProvider {
    tls: TlsConfig,
    acceptor: OnceCell<TlsAcceptor>,
}

impl IdentityProvider {
    /// Creates a provider; nothing is loaded until [`Self::acceptor`] is
    /// first called.
    pub fn new(tls: TlsConfig) -> Self {
        Self {
            tls,
            acceptor: OnceCell::new(),
        }
    }

    /// Returns the shared TLS acceptor, loading the identity on first use.
    ///
    /// Idempotent and thread-safe: concurrent first callers race on a
    /// single initialization, later callers get the cached acceptor.
    pub async fn acceptor(&self) -> Result<&TlsAcceptor, ServerError> {
        self.acceptor
            .get_or_try_init(|| async { build_acceptor(&self.tls) })
            .await
    }

    /// Returns whether the identity has been loaded.
    pub fn is_loaded(&self) -> bool {
        self.acceptor.initialized()
    }
}

/// Builds a TLS acceptor from the configured identity material.
fn build_acceptor(tls: &TlsConfig) -> Result<TlsAcceptor, ServerError> {
    let cert_path = tls
        .cert_path
        .as_ref()
        .ok_or_else(|| ServerError::IdentityLoad("cert_path not set".into()))?;
    let key_path = tls
        .key_path
        .as_ref()
        .ok_or_else(|| ServerError::IdentityLoad("key_path not set".into()))?;

    let certs = load_certs(cert_path)?;
    let key = load_private_key(key_path)?;
    let versions = protocol_versions(&tls.protocol_versions);
    // builder_with_protocol_versions panics on an empty version list.
    if versions.is_empty() {
        return Err(ServerError::IdentityLoad(
            "no TLS protocol versions configured".into(),
        ));
    }

    let builder = rustls::ServerConfig::builder_with_protocol_versions(&versions);

    let server_config = if tls.require_client_cert {
        let client_ca_path = tls.client_ca_path.as_ref().ok_or_else(|| {
            ServerError::IdentityLoad("client_ca_path not set for client certificate verification".into())
        })?;

        let mut root_store = RootCertStore::empty();
        for cert in load_certs(client_ca_path)? {
            root_store
                .add(cert)
                .map_err(|e| ServerError::IdentityLoad(format!("invalid client CA cert: {}", e)))?;
        }

        let mut verifier_builder = WebPkiClientVerifier::builder(Arc::new(root_store));
        if tls.check_revocation {
            let crl_path = tls.crl_path.as_ref().ok_or_else(|| {
                ServerError::IdentityLoad("crl_path not set for revocation checking".into())
            })?;
            verifier_builder = verifier_builder.with_crls(load_crls(crl_path)?);
        }
        let client_verifier = verifier_builder.build().map_err(|e| {
            ServerError::IdentityLoad(format!("failed to build client verifier: {}", e))
        })?;

        builder
            .with_client_cert_verifier(client_verifier)
            .with_single_cert(certs, key)
            .map_err(|e| ServerError::IdentityLoad(format!("invalid server cert/key: {}", e)))?
    } else {
        builder
            .with_no_client_auth()
            .with_single_cert(certs, key)
            .map_err(|e| ServerError::IdentityLoad(format!("invalid server cert/key: {}", e)))?
    };

    Ok(TlsAcceptor::from(Arc::new(server_config)))
}

fn protocol_versions(
    versions: &[TlsVersion],
) -> Vec<&'static rustls::SupportedProtocolVersion> {
    versions
        .iter()
        .map(|v| match v {
            TlsVersion::Tls12 => &rustls::version::TLS12,
            TlsVersion::Tls13 => &rustls::version::TLS13,
        })
        .collect()
}

fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, ServerError> {
    let file = File::open(path).map_err(|e| {
        ServerError::IdentityLoad(format!("cannot open cert file {:?}: {}", path, e))
    })?;
    let mut reader = BufReader::new(file);

    rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| ServerError::IdentityLoad(format!("invalid cert file {:?}: {}", path, e)))
}

fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>, ServerError> {
    let file = File::open(path)
        .map_err(|e| ServerError::IdentityLoad(format!("cannot open key file {:?}: {}", path, e)))?;
    let mut reader = BufReader::new(file);

    loop {
        match rustls_pemfile::read_one(&mut reader)
            .map_err(|e| ServerError::IdentityLoad(format!("invalid key file {:?}: {}", path, e)))?
        {
            Some(rustls_pemfile::Item::Pkcs1Key(key)) => return Ok(key.into()),
            Some(rustls_pemfile::Item::Pkcs8Key(key)) => return Ok(key.into()),
            Some(rustls_pemfile::Item::Sec1Key(key)) => return Ok(key.into()),
            None => {
                return Err(ServerError::IdentityLoad(format!(
                    "no private key found in {:?}",
                    path
                )))
            }
            _ => continue, // Skip other PEM items (certs, etc.)
        }
    }
}

fn load_crls(path: &Path) -> Result<Vec<CertificateRevocationListDer<'static>>, ServerError> {
    let file = File::open(path)
        .map_err(|e| ServerError::IdentityLoad(format!("cannot open CRL file {:?}: {}", path, e)))?;
    let mut reader = BufReader::new(file);

    rustls_pemfile::crls(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| ServerError::IdentityLoad(format!("invalid CRL file {:?}: {}", path, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::{NamedTempFile, TempDir};

    fn write_self_signed(dir: &TempDir) -> TlsConfig {
        let certified =
            rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
        let cert_path = dir.path().join("cert.pem");
        let key_path = dir.path().join("key.pem");
        std::fs::write(&cert_path, certified.cert.pem()).unwrap();
        std::fs::write(&key_path, certified.key_pair.serialize_pem()).unwrap();

        TlsConfig {
            cert_path: Some(cert_path),
            key_path: Some(key_path),
            ..TlsConfig::default()
        }
    }

    #[test]
    fn test_load_invalid_cert_path() {
        let result = load_certs(Path::new("/nonexistent/cert.pem"));
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("cannot open"));
    }

    #[test]
    fn test_load_invalid_key_path() {
        let result = load_private_key(Path::new("/nonexistent/key.pem"));
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("cannot open"));
    }

    #[test]
    fn test_load_empty_key_file() {
        let mut key_file = NamedTempFile::new().unwrap();
        key_file.write_all(b"not a valid key").unwrap();

        let result = load_private_key(key_file.path());
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("no private key"));
    }

    #[tokio::test]
    async fn test_acceptor_missing_cert_path() {
        let provider = IdentityProvider::new(TlsConfig::default());
        let err = provider.acceptor().await.err().unwrap();
        assert!(err.to_string().contains("cert_path not set"));
        assert!(!provider.is_loaded());
    }

    #[tokio::test]
    async fn test_acceptor_empty_protocol_versions() {
        let dir = TempDir::new().unwrap();
        let mut tls = write_self_signed(&dir);
        tls.protocol_versions = Vec::new();

        let provider = IdentityProvider::new(tls);
        let err = provider.acceptor().await.err().unwrap();
        assert!(err.to_string().contains("no TLS protocol versions"));
    }

    #[tokio::test]
    async fn test_acceptor_missing_ca_for_mtls() {
        let dir = TempDir::new().unwrap();
        let mut tls = write_self_signed(&dir);
        tls.require_client_cert = true;

        let provider = IdentityProvider::new(tls);
        let err = provider.acceptor().await.err().unwrap();
        assert!(err.to_string().contains("client_ca_path not set"));
    }

    #[tokio::test]
    async fn test_acceptor_missing_crls_for_revocation() {
        let dir = TempDir::new().unwrap();
        let mut tls = write_self_signed(&dir);
        tls.require_client_cert = true;
        tls.client_ca_path = tls.cert_path.clone();
        tls.check_revocation = true;

        let provider = IdentityProvider::new(tls);
        let err = provider.acceptor().await.err().unwrap();
        assert!(err.to_string().contains("crl_path not set"));
    }

    #[tokio::test]
    async fn test_acceptor_loads_once_and_caches() {
        let dir = TempDir::new().unwrap();
        let tls = write_self_signed(&dir);
        let cert_path = tls.cert_path.clone().unwrap();
        let key_path = tls.key_path.clone().unwrap();

        let provider = IdentityProvider::new(tls);
        assert!(!provider.is_loaded());
        provider.acceptor().await.unwrap();
        assert!(provider.is_loaded());

        // Deleting the files proves later calls hit the cache, not the disk.
        std::fs::remove_file(cert_path).unwrap();
        std::fs::remove_file(key_path).unwrap();
        provider.acceptor().await.unwrap();
    }

    #[tokio::test]
    async fn test_load_failure_is_not_cached() {
        let dir = TempDir::new().unwrap();
        let certified =
            rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
        let cert_path = dir.path().join("cert.pem");
        let key_path = dir.path().join("key.pem");

        let tls = TlsConfig {
            cert_path: Some(cert_path.clone()),
            key_path: Some(key_path.clone()),
            ..TlsConfig::default()
        };
        let provider = IdentityProvider::new(tls);

        // First handshake fails because the files do not exist yet.
        assert!(provider.acceptor().await.is_err());

        std::fs::write(&cert_path, certified.cert.pem()).unwrap();
        std::fs::write(&key_path, certified.key_pair.serialize_pem()).unwrap();
        provider.acceptor().await.unwrap();
    }
}
