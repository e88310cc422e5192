//! Client certificate validation.
//!
//! The TLS listener requests but never requires a client certificate;
//! whatever the peer offered is inspected here once per connection, and
//! the verdict is attached to every request on that connection. This is
//! what lets the gate answer 400/401/403 instead of a handshake alert.

use std::sync::Arc;

use rustls::server::danger::ClientCertVerifier;
use rustls::server::{VerifierBuilderError, WebPkiClientVerifier};
use rustls::RootCertStore;
use rustls_pki_types::{CertificateDer, UnixTime};
use x509_parser::prelude::*;

/// Identity derived from a chain-validated client certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerIdentity {
    pub common_name: String,
    pub subject: String,
}

/// Per-connection verdict on the offered client certificate.
#[derive(Debug, Clone)]
pub enum ClientCertState {
    /// No certificate was offered during the handshake.
    Missing,
    /// A certificate was offered but failed chain validation against the
    /// registry CA set. The offered CN, when parseable, is kept for logs.
    Invalid { common_name: Option<String> },
    /// Chain-validated, but the subject carries no Common Name.
    NoCommonName { subject: String },
    /// Chain-validated with a Common Name.
    Valid(PeerIdentity),
}

/// Validates offered client certificates against the registry's CA set.
pub struct CertificateGate {
    verifier: Arc<dyn ClientCertVerifier>,
}

impl CertificateGate {
    pub fn new(roots: RootCertStore) -> Result<Self, VerifierBuilderError> {
        let verifier = WebPkiClientVerifier::builder(Arc::new(roots)).build()?;
        Ok(Self { verifier })
    }

    /// Inspect the certificate chain captured from one TLS handshake.
    pub fn inspect(&self, chain: Option<&[CertificateDer<'static>]>) -> ClientCertState {
        let (end_entity, intermediates) = match chain.and_then(|c| c.split_first()) {
            Some(parts) => parts,
            None => return ClientCertState::Missing,
        };

        match self
            .verifier
            .verify_client_cert(end_entity, intermediates, UnixTime::now())
        {
            Ok(_) => match parse_subject(end_entity) {
                Some((Some(common_name), subject)) => {
                    ClientCertState::Valid(PeerIdentity { common_name, subject })
                }
                Some((None, subject)) => ClientCertState::NoCommonName { subject },
                None => ClientCertState::Invalid { common_name: None },
            },
            Err(_) => ClientCertState::Invalid {
                common_name: parse_subject(end_entity).and_then(|(cn, _)| cn),
            },
        }
    }
}

/// Extract (CN, raw subject) from a DER certificate. `None` when the
/// certificate does not parse at all.
fn parse_subject(cert: &CertificateDer<'_>) -> Option<(Option<String>, String)> {
    let (_, parsed) = X509Certificate::from_der(cert.as_ref()).ok()?;
    let subject = parsed.subject();
    let common_name = subject
        .iter_common_name()
        .next()
        .and_then(|cn| cn.as_str().ok())
        .map(str::to_string)
        .filter(|cn| !cn.is_empty());
    Some((common_name, subject.to_string()))
}
