//! TLS listener configuration loaded from PEM files

use crate::error::{Error, Result};
use rustls::ServerConfig;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls_pemfile::{certs, private_key};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::Arc;
use tokio_rustls::TlsAcceptor;

/// Certificate chain and key ready to accept TLS connections
#[derive(Clone, Debug)]
pub struct TlsConfig {
    server_config: Arc<ServerConfig>,
}

impl TlsConfig {
    pub fn from_pem_files(cert_path: impl AsRef<Path>, key_path: impl AsRef<Path>) -> Result<Self> {
        let cert_path = cert_path.as_ref();
        let key_path = key_path.as_ref();

        let cert_file = File::open(cert_path).map_err(|err| {
            Error::Tls(format!("cannot open certificate {}: {}", cert_path.display(), err))
        })?;
        let key_file = File::open(key_path)
            .map_err(|err| Error::Tls(format!("cannot open key {}: {}", key_path.display(), err)))?;

        Self::from_readers(&mut BufReader::new(cert_file), &mut BufReader::new(key_file))
    }

    pub fn from_pem_bytes(cert_pem: &[u8], key_pem: &[u8]) -> Result<Self> {
        Self::from_readers(&mut BufReader::new(cert_pem), &mut BufReader::new(key_pem))
    }

    fn from_readers(cert_reader: &mut dyn BufRead, key_reader: &mut dyn BufRead) -> Result<Self> {
        let chain = certs(cert_reader)
            .collect::<std::result::Result<Vec<CertificateDer<'static>>, _>>()
            .map_err(|err| Error::Tls(format!("invalid certificate PEM: {}", err)))?;
        if chain.is_empty() {
            return Err(Error::Tls("no certificates found".to_string()));
        }

        let key: PrivateKeyDer<'static> = private_key(key_reader)
            .map_err(|err| Error::Tls(format!("invalid key PEM: {}", err)))?
            .ok_or_else(|| Error::Tls("no private key found".to_string()))?;

        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let mut config = ServerConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()
            .map_err(|err| Error::Tls(err.to_string()))?
            .with_no_client_auth()
            .with_single_cert(chain, key)
            .map_err(|err| Error::Tls(format!("certificate rejected: {}", err)))?;
        config.alpn_protocols = vec![b"http/1.1".to_vec()];

        Ok(Self {
            server_config: Arc::new(config),
        })
    }

    pub fn server_config(&self) -> &Arc<ServerConfig> {
        &self.server_config
    }

    pub fn acceptor(&self) -> TlsAcceptor {
        TlsAcceptor::from(Arc::clone(&self.server_config))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_pem_is_rejected() {
        let err = TlsConfig::from_pem_bytes(b"", b"").unwrap_err();
        assert!(matches!(err, Error::Tls(message) if message.contains("no certificates")));
    }

    #[test]
    fn test_missing_files() {
        let err = TlsConfig::from_pem_files("/nonexistent/cert.pem", "/nonexistent/key.pem").unwrap_err();
        assert!(matches!(err, Error::Tls(_)));
    }
}
