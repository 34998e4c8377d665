//! TLS configuration for both ends of the channel.
//!
//! The server always demands a client certificate. By default any
//! certificate is accepted and only proof of key possession is checked,
//! so self-issued identities work without a shared authority. Stricter
//! deployments verify client and server certificates against a trust pool.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use lodge_identity::CredentialPaths;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{CryptoProvider, WebPkiSupportedAlgorithms};
use rustls::pki_types::pem::PemObject;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName, UnixTime};
use rustls::server::WebPkiClientVerifier;
use rustls::server::danger::{ClientCertVerified, ClientCertVerifier};
use rustls::{
    ClientConfig, DigitallySignedStruct, DistinguishedName, RootCertStore, ServerConfig,
    SignatureScheme,
};
use tokio_rustls::{TlsAcceptor, TlsConnector};

use crate::ChannelError;

/// How the server treats client certificates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ClientAuthPolicy {
    /// A certificate is required but not checked against any authority.
    #[default]
    RequireAny,
    /// A certificate is required and must chain to the given PEM pool.
    RequireAndVerify(PathBuf),
}

/// How the client treats the server's certificate.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ServerVerification {
    /// Accept any certificate the server proves it holds the key for.
    #[default]
    Insecure,
    /// The certificate must chain to the given PEM pool and name the host.
    TrustPool(PathBuf),
}

/// Server-side TLS state, shared by every accepted connection.
#[derive(Debug, Clone)]
pub struct ServerTls {
    config: Arc<ServerConfig>,
}

impl ServerTls {
    pub fn new(
        chain: Vec<CertificateDer<'static>>,
        key: PrivateKeyDer<'static>,
        policy: &ClientAuthPolicy,
    ) -> Result<Self, ChannelError> {
        let provider = provider();
        let verifier: Arc<dyn ClientCertVerifier> = match policy {
            ClientAuthPolicy::RequireAny => Arc::new(AnyClientCert::new(&provider)),
            ClientAuthPolicy::RequireAndVerify(pool) => {
                WebPkiClientVerifier::builder_with_provider(
                    Arc::new(load_roots(pool)?),
                    provider.clone(),
                )
                .build()
                .map_err(|e| ChannelError::Credentials(format!("client verifier: {e}")))?
            }
        };

        let config = ServerConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()?
            .with_client_cert_verifier(verifier)
            .with_single_cert(chain, key)?;

        Ok(Self {
            config: Arc::new(config),
        })
    }

    /// Loads the identity stored in `paths`.
    pub fn load(paths: &CredentialPaths, policy: &ClientAuthPolicy) -> Result<Self, ChannelError> {
        let (chain, key) = load_credentials(paths)?;
        Self::new(chain, key, policy)
    }

    pub(crate) fn acceptor(&self) -> TlsAcceptor {
        TlsAcceptor::from(Arc::clone(&self.config))
    }
}

/// Client-side TLS state.
#[derive(Debug, Clone)]
pub struct ClientTls {
    config: Arc<ClientConfig>,
}

impl ClientTls {
    pub fn new(
        chain: Vec<CertificateDer<'static>>,
        key: PrivateKeyDer<'static>,
        verification: &ServerVerification,
    ) -> Result<Self, ChannelError> {
        let provider = provider();
        let builder =
            ClientConfig::builder_with_provider(provider.clone()).with_safe_default_protocol_versions()?;

        let builder = match verification {
            ServerVerification::Insecure => builder
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(AnyServerCert::new(&provider))),
            ServerVerification::TrustPool(pool) => builder.with_root_certificates(load_roots(pool)?),
        };

        let config = builder.with_client_auth_cert(chain, key)?;
        Ok(Self {
            config: Arc::new(config),
        })
    }

    /// Loads the identity stored in `paths`.
    pub fn load(
        paths: &CredentialPaths,
        verification: &ServerVerification,
    ) -> Result<Self, ChannelError> {
        let (chain, key) = load_credentials(paths)?;
        Self::new(chain, key, verification)
    }

    pub(crate) fn connector(&self) -> TlsConnector {
        TlsConnector::from(Arc::clone(&self.config))
    }
}

fn provider() -> Arc<CryptoProvider> {
    Arc::new(rustls::crypto::ring::default_provider())
}

fn load_credentials(
    paths: &CredentialPaths,
) -> Result<(Vec<CertificateDer<'static>>, PrivateKeyDer<'static>), ChannelError> {
    let chain = load_certs(&paths.cert)?;
    let key = PrivateKeyDer::from_pem_file(&paths.key)
        .map_err(|e| ChannelError::Credentials(format!("{}: {e}", paths.key.display())))?;
    Ok((chain, key))
}

fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, ChannelError> {
    let certs = CertificateDer::pem_file_iter(path)
        .and_then(|iter| iter.collect::<Result<Vec<_>, _>>())
        .map_err(|e| ChannelError::Credentials(format!("{}: {e}", path.display())))?;
    if certs.is_empty() {
        return Err(ChannelError::Credentials(format!(
            "{}: no certificates found",
            path.display()
        )));
    }
    Ok(certs)
}

fn load_roots(path: &Path) -> Result<RootCertStore, ChannelError> {
    let mut roots = RootCertStore::empty();
    for cert in load_certs(path)? {
        roots.add(cert).map_err(|e| {
            ChannelError::Credentials(format!("{}: bad trust anchor: {e}", path.display()))
        })?;
    }
    Ok(roots)
}

/// Requires a client certificate and checks only the handshake signature.
#[derive(Debug)]
struct AnyClientCert {
    algorithms: WebPkiSupportedAlgorithms,
}

impl AnyClientCert {
    fn new(provider: &CryptoProvider) -> Self {
        Self {
            algorithms: provider.signature_verification_algorithms,
        }
    }
}

impl ClientCertVerifier for AnyClientCert {
    fn client_auth_mandatory(&self) -> bool {
        true
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
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(message, cert, dss, &self.algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(message, cert, dss, &self.algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.algorithms.supported_schemes()
    }
}

/// Accepts any server certificate, still checking the handshake signature.
#[derive(Debug)]
struct AnyServerCert {
    algorithms: WebPkiSupportedAlgorithms,
}

impl AnyServerCert {
    fn new(provider: &CryptoProvider) -> Self {
        Self {
            algorithms: provider.signature_verification_algorithms,
        }
    }
}

impl ServerCertVerifier for AnyServerCert {
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
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(message, cert, dss, &self.algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(message, cert, dss, &self.algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.algorithms.supported_schemes()
    }
}
