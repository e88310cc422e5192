//! TLS configuration and certificate loading.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rustls::crypto::{verify_tls12_signature, verify_tls13_signature, CryptoProvider};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, UnixTime};
use rustls::server::danger::{ClientCertVerified, ClientCertVerifier};
use rustls::{DigitallySignedStruct, DistinguishedName, RootCertStore, ServerConfig, SignatureScheme};
use thiserror::Error;

use crate::config::{keys, RuntimeConfig};

#[derive(Debug, Error)]
pub enum TlsError {
    #[error("missing configuration key {0}")]
    MissingKey(&'static str),

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("no usable PEM material in {path}")]
    EmptyPem { path: PathBuf },

    #[error("TLS setup failed: {0}")]
    Rustls(#[from] rustls::Error),

    #[error("client verifier setup failed: {0}")]
    Verifier(#[from] rustls::server::VerifierBuilderError),
}

/// Paths of the server's certificate, key, and trusted CA set, taken
/// from the `server.*` configuration keys.
#[derive(Debug, Clone)]
pub struct TlsMaterial {
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
    pub ca_path: PathBuf,
}

impl TlsMaterial {
    pub fn from_config(config: &RuntimeConfig) -> Result<Self, TlsError> {
        let cert_path = config
            .get_str(keys::SERVER_CERTIFICATE)
            .ok_or(TlsError::MissingKey(keys::SERVER_CERTIFICATE))?;
        let key_path = config
            .get_str(keys::SERVER_KEY)
            .ok_or(TlsError::MissingKey(keys::SERVER_KEY))?;
        let ca_path = config
            .get_str(keys::SERVER_CA)
            .ok_or(TlsError::MissingKey(keys::SERVER_CA))?;
        Ok(Self {
            cert_path: cert_path.into(),
            key_path: key_path.into(),
            ca_path: ca_path.into(),
        })
    }
}

/// Load the PEM certificate chain at `path`.
pub fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, TlsError> {
    let file = File::open(path).map_err(|source| TlsError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let certs: Vec<_> = rustls_pemfile::certs(&mut BufReader::new(file))
        .collect::<Result<_, _>>()
        .map_err(|source| TlsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
    if certs.is_empty() {
        return Err(TlsError::EmptyPem {
            path: path.to_path_buf(),
        });
    }
    Ok(certs)
}

/// Load the first PEM private key at `path`.
pub fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>, TlsError> {
    let file = File::open(path).map_err(|source| TlsError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    rustls_pemfile::private_key(&mut BufReader::new(file))
        .map_err(|source| TlsError::Io {
            path: path.to_path_buf(),
            source,
        })?
        .ok_or_else(|| TlsError::EmptyPem {
            path: path.to_path_buf(),
        })
}

/// Build the trusted CA set used to validate offered client certificates.
pub fn load_root_store(path: &Path) -> Result<RootCertStore, TlsError> {
    let mut roots = RootCertStore::empty();
    for cert in load_certs(path)? {
        roots.add(cert)?;
    }
    Ok(roots)
}

/// Server TLS config that requests a client certificate but never fails
/// the handshake over it. Chain validation is deferred to the
/// certificate gate, which can answer 400/401/403 per request.
pub fn build_server_config(material: &TlsMaterial) -> Result<Arc<ServerConfig>, TlsError> {
    let certs = load_certs(&material.cert_path)?;
    let key = load_private_key(&material.key_path)?;

    let config = ServerConfig::builder()
        .with_client_cert_verifier(Arc::new(CaptureAnyClientCert::new()))
        .with_single_cert(certs, key)?;

    tracing::info!(
        cert = %material.cert_path.display(),
        ca = %material.ca_path.display(),
        "TLS listener material loaded"
    );
    Ok(Arc::new(config))
}

/// A verifier that accepts whatever certificate the client offers.
///
/// Signature checks still run (the client must prove possession of the
/// key); only chain validation is skipped here and performed later by
/// the gate.
#[derive(Debug)]
struct CaptureAnyClientCert {
    provider: Arc<CryptoProvider>,
}

impl CaptureAnyClientCert {
    fn new() -> Self {
        let provider = CryptoProvider::get_default()
            .cloned()
            .unwrap_or_else(|| Arc::new(rustls::crypto::aws_lc_rs::default_provider()));
        Self { provider }
    }
}

impl ClientCertVerifier for CaptureAnyClientCert {
    fn offer_client_auth(&self) -> bool {
        true
    }

    fn client_auth_mandatory(&self) -> bool {
        false
    }

    fn root_hint_subjects(&self) -> &[DistinguishedName] {
        &[]
    }

    fn verify_client_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _now: UnixTime,
    ) -> Result<ClientCertVerified, rustls::Error> {
        Ok(ClientCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider
            .signature_verification_algorithms
            .supported_schemes()
    }
}
