use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use rcgen::{
    BasicConstraints, CertificateParams, DnType, ExtendedKeyUsagePurpose, IsCa, KeyPair,
    KeyUsagePurpose, PKCS_ECDSA_P256_SHA256, SerialNumber,
};
use time::{Duration, OffsetDateTime};
use tracing::info;

use crate::certificate::verify_self_signed;
use crate::{CredentialPaths, Identity, IdentityError};

/// Lifetime of an issued certificate.
pub const VALIDITY_DAYS: i64 = 365;

/// Parameters for [`issue`].
#[derive(Debug, Clone)]
pub struct IssueRequest {
    /// Common name; the user name submissions are attributed to.
    pub subject: String,
    pub organisation: Option<String>,
    pub is_ca: bool,
    /// Host names or addresses the certificate is valid for. Only needed
    /// when peers verify it against a trust pool.
    pub hosts: Vec<String>,
    pub out_dir: PathBuf,
    pub overwrite: bool,
}

impl IssueRequest {
    pub fn new(subject: impl Into<String>, out_dir: impl Into<PathBuf>) -> Self {
        Self {
            subject: subject.into(),
            organisation: None,
            is_ca: false,
            hosts: Vec::new(),
            out_dir: out_dir.into(),
            overwrite: false,
        }
    }
}

/// Generates a key pair and self-signed certificate and writes both to
/// `request.out_dir`.
///
/// Nothing is written unless the directory is usable and, without
/// `overwrite`, neither credential file exists yet.
pub fn issue(request: &IssueRequest) -> Result<Identity, IdentityError> {
    let paths = CredentialPaths::in_dir(&request.out_dir);
    prepare_dir(&paths.dir)?;

    if !request.overwrite {
        for path in [&paths.key, &paths.cert] {
            if path.exists() {
                return Err(IdentityError::AlreadyExists(path.clone()));
            }
        }
    }

    let key = KeyPair::generate_for(&PKCS_ECDSA_P256_SHA256).map_err(IdentityError::KeyGeneration)?;
    let params = certificate_params(request, OffsetDateTime::now_utc())?;
    let cert = params
        .self_signed(&key)
        .map_err(|e| IdentityError::Certificate(e.to_string()))?;

    verify_self_signed(cert.der())?;
    let identity = Identity::from_der(cert.der())?;

    write_private(&paths.key, key.serialize_pem().as_bytes())?;
    fs::write(&paths.cert, cert.pem())?;

    info!(
        subject = %identity.common_name,
        serial = %identity.serial,
        dir = %paths.dir.display(),
        "identity issued"
    );
    Ok(identity)
}

fn certificate_params(
    request: &IssueRequest,
    now: OffsetDateTime,
) -> Result<CertificateParams, IdentityError> {
    let mut params = CertificateParams::new(request.hosts.clone())
        .map_err(|e| IdentityError::Certificate(e.to_string()))?;

    params
        .distinguished_name
        .push(DnType::CommonName, request.subject.as_str());
    if let Some(org) = &request.organisation {
        params
            .distinguished_name
            .push(DnType::OrganizationName, org.as_str());
    }

    params.serial_number = Some(serial_number(now));
    params.not_before = now;
    params.not_after = now + Duration::days(VALIDITY_DAYS);

    params.key_usages = vec![KeyUsagePurpose::DigitalSignature];
    params.extended_key_usages = vec![
        ExtendedKeyUsagePurpose::ServerAuth,
        ExtendedKeyUsagePurpose::ClientAuth,
    ];
    if request.is_ca {
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        params.key_usages.push(KeyUsagePurpose::KeyCertSign);
    } else {
        params.is_ca = IsCa::ExplicitNoCa;
    }

    Ok(params)
}

/// Issue time in the high bits, 63 random bits below.
fn serial_number(now: OffsetDateTime) -> SerialNumber {
    SerialNumber::from(serial_bytes(now.unix_timestamp(), rand::random::<u64>()))
}

fn serial_bytes(unix_secs: i64, entropy: u64) -> Vec<u8> {
    let value = (u128::from(unix_secs.max(0) as u64) << 63) | u128::from(entropy >> 1);
    let bytes = value.to_be_bytes();
    let first = bytes
        .iter()
        .position(|b| *b != 0)
        .unwrap_or(bytes.len() - 1);
    bytes[first..].to_vec()
}

fn prepare_dir(dir: &Path) -> Result<(), IdentityError> {
    match fs::metadata(dir) {
        Ok(meta) if meta.is_dir() => Ok(()),
        Ok(_) => Err(IdentityError::NotADirectory(dir.to_path_buf())),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            let mut builder = fs::DirBuilder::new();
            builder.recursive(true);
            #[cfg(unix)]
            {
                use std::os::unix::fs::DirBuilderExt;
                builder.mode(0o700);
            }
            builder.create(dir)?;
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

fn write_private(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(path)?;
    file.write_all(contents)?;

    // The mode above only applies when the file is created.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
    }
    Ok(())
}
