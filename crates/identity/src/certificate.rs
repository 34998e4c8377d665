use std::fmt;
use std::path::Path;

use lodge_protocol::PeerIdentity;
use rustls::pki_types::CertificateDer;
use rustls::pki_types::pem::PemObject;
use time::OffsetDateTime;
use tracing::{debug, warn};
use x509_parser::certificate::X509Certificate;

use crate::{CredentialPaths, IdentityError};

/// The parts of a certificate that identify a submitter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// Decimal serial number.
    pub serial: String,
    pub common_name: String,
    pub organisation: Option<String>,
    pub not_before: OffsetDateTime,
    pub not_after: OffsetDateTime,
    pub is_ca: bool,
}

impl Identity {
    /// Parses a DER certificate.
    pub fn from_der(der: &[u8]) -> Result<Self, IdentityError> {
        let cert = parse(der)?;
        let subject = cert.subject();

        let common_name = subject
            .iter_common_name()
            .find_map(|attr| attr.as_str().ok())
            .unwrap_or_default()
            .to_string();
        let organisation = subject
            .iter_organization()
            .find_map(|attr| attr.as_str().ok())
            .map(str::to_string);

        Ok(Self {
            serial: cert.serial.to_string(),
            common_name,
            organisation,
            not_before: cert.validity().not_before.to_datetime(),
            not_after: cert.validity().not_after.to_datetime(),
            is_ca: cert.is_ca(),
        })
    }

    /// Loads the certificate of the identity stored in `dir`.
    pub fn load(dir: impl AsRef<Path>) -> Result<Self, IdentityError> {
        let paths = CredentialPaths::in_dir(dir);
        let der = CertificateDer::from_pem_file(&paths.cert)
            .map_err(|e| IdentityError::Parse(format!("{}: {e}", paths.cert.display())))?;
        Self::from_der(&der)
    }

    pub fn peer(&self) -> PeerIdentity {
        PeerIdentity {
            serial: self.serial.clone(),
            common_name: self.common_name.clone(),
        }
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (serial {})", self.common_name, self.serial)
    }
}

/// Checks that a DER certificate is signed by its own key.
pub(crate) fn verify_self_signed(der: &[u8]) -> Result<(), IdentityError> {
    parse(der)?
        .verify_signature(None)
        .map_err(|e| IdentityError::Certificate(format!("self-signature does not verify: {e}")))
}

fn parse(der: &[u8]) -> Result<X509Certificate<'_>, IdentityError> {
    let (_, cert) =
        x509_parser::parse_x509_certificate(der).map_err(|e| IdentityError::Parse(e.to_string()))?;
    Ok(cert)
}

/// Extracts the submitter identity from a handshake's peer certificates.
///
/// Only a chain of exactly one certificate identifies a peer. An empty or
/// longer chain, or a certificate that cannot be parsed, yields `None`; it
/// is never an error for the connection.
pub fn verify_peer(certs: Option<&[CertificateDer<'_>]>) -> Option<PeerIdentity> {
    match certs {
        Some([only]) => match Identity::from_der(only) {
            Ok(identity) => Some(identity.peer()),
            Err(e) => {
                warn!(error = %e, "unparsable peer certificate");
                None
            }
        },
        Some(chain) => {
            debug!(len = chain.len(), "peer chain is not a single certificate");
            None
        }
        None => None,
    }
}
