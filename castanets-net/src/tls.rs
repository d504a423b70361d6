//! TLS policy for the service dispatch channel (spec.md §4.1).
//!
//! The server generates a fresh RSA-2048 key and self-signed X.509
//! certificate once per process, held in memory only — there is no
//! persistent PKI. The client does not validate the peer certificate at
//! all: authentication is the application-level token handshake
//! (`castanets-core::service`), not the TLS layer. This is a deliberate,
//! documented trade-off (spec.md §9), not an oversight.

use std::sync::Arc;
use std::time::Duration;

use rama_error::{ErrorContext, OpaqueError};
use rsa::pkcs8::EncodePrivateKey;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName, UnixTime};
use rustls::server::ServerConfig as RustlsServerConfig;
use rustls::{ClientConfig as RustlsClientConfig, DigitallySignedStruct, SignatureScheme};
use tokio_rustls::{TlsAcceptor, TlsConnector};

const RSA_KEY_BITS: usize = 2048;

/// The process-lifetime TLS identity a `ServiceServer` presents to every
/// connecting client. Shared read-only across all accepted connections
/// (spec.md §5 "Shared resources").
pub struct ServerIdentity {
    cert_der: CertificateDer<'static>,
    key_der: PrivateKeyDer<'static>,
}

impl ServerIdentity {
    /// Generates a fresh RSA-2048 key pair and a self-signed certificate for
    /// it. Called once at server startup; never persisted to disk.
    pub fn generate() -> Result<Self, OpaqueError> {
        let mut rng = rand_core_adapter::OsRng;
        let rsa_key = rsa::RsaPrivateKey::new(&mut rng, RSA_KEY_BITS)
            .context("generate RSA-2048 private key")?;
        let pkcs8_der = rsa_key
            .to_pkcs8_der()
            .context("encode RSA private key as PKCS#8 DER")?;

        let key_pair = rcgen::KeyPair::from_der(pkcs8_der.as_bytes())
            .context("load generated RSA key into rcgen")?;
        let params = rcgen::CertificateParams::new(vec!["castanets.local".to_string()])
            .context("build self-signed certificate parameters")?;
        let cert = params
            .self_signed(&key_pair)
            .context("self-sign service TLS certificate")?;

        Ok(Self {
            cert_der: cert.der().clone(),
            key_der: PrivateKeyDer::Pkcs8(pkcs8_der.as_bytes().to_vec().into()),
        })
    }

    /// Builds a `TlsAcceptor` that presents this identity to every peer.
    pub fn acceptor(&self) -> Result<TlsAcceptor, OpaqueError> {
        let config = RustlsServerConfig::builder()
            .with_no_client_auth()
            .with_single_cert(vec![self.cert_der.clone()], self.key_der.clone_key())
            .context("build rustls server config from self-signed identity")?;
        Ok(TlsAcceptor::from(Arc::new(config)))
    }
}

/// Builds a `TlsConnector` that accepts any certificate chain the server
/// presents without inspecting it. Trust is established afterward by the
/// `verify-token://` handshake, not by the TLS layer.
#[must_use]
pub fn no_verify_connector() -> TlsConnector {
    let config = RustlsClientConfig::builder()
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(AcceptAnyServerCert))
        .with_no_client_auth();
    TlsConnector::from(Arc::new(config))
}

#[derive(Debug)]
struct AcceptAnyServerCert;

impl ServerCertVerifier for AcceptAnyServerCert {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        vec![
            SignatureScheme::RSA_PKCS1_SHA256,
            SignatureScheme::RSA_PKCS1_SHA384,
            SignatureScheme::RSA_PKCS1_SHA512,
            SignatureScheme::RSA_PSS_SHA256,
            SignatureScheme::RSA_PSS_SHA384,
            SignatureScheme::RSA_PSS_SHA512,
            SignatureScheme::ECDSA_NISTP256_SHA256,
            SignatureScheme::ED25519,
        ]
    }
}

/// How long a TCP close / loop shutdown is allowed to drag on before the
/// caller gives up waiting (spec.md §5 Cancellation: "join with timeout (3s);
/// on timeout the thread is abandoned").
pub const SHUTDOWN_JOIN_TIMEOUT: Duration = Duration::from_secs(3);

/// `rsa` 0.9 wants an `rsa::rand_core::CryptoRngCore`, which is `rand_core`
/// 0.6's trait, not the `rand_core` 0.9 that `rand` 0.10 (used elsewhere in
/// this workspace for unrelated token generation) pulls in — those are two
/// different crate versions and neither `OsRng` satisfies the other's
/// trait. This module pins a direct `rand_core = "0.6"` dependency so the
/// `OsRng` handed to `RsaPrivateKey::new` comes from the same crate version
/// that defines the bound.
mod rand_core_adapter {
    pub use rand_core::OsRng;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generates_a_usable_identity() {
        let identity = ServerIdentity::generate().expect("identity generation");
        identity.acceptor().expect("acceptor from identity");
    }
}
