use std::path::{Path, PathBuf};

/// Private key file name.
pub const KEY_FILE: &str = "identity.key";
/// Certificate file name.
pub const CERT_FILE: &str = "identity.pem";
/// Optional pool of trusted peer certificates.
pub const TRUST_POOL_FILE: &str = "authority.pem";

/// Locations of the credential files inside a credential directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialPaths {
    pub dir: PathBuf,
    pub key: PathBuf,
    pub cert: PathBuf,
    pub trust_pool: PathBuf,
}

impl CredentialPaths {
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            dir: dir.to_path_buf(),
            key: dir.join(KEY_FILE),
            cert: dir.join(CERT_FILE),
            trust_pool: dir.join(TRUST_POOL_FILE),
        }
    }
}
