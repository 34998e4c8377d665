use std::path::PathBuf;

/// Errors produced while issuing or loading an identity.
#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("{0} already exists (use --force to overwrite)")]
    AlreadyExists(PathBuf),

    #[error("{0} already exists and is not a directory")]
    NotADirectory(PathBuf),

    #[error("key generation failed: {0}")]
    KeyGeneration(#[source] rcgen::Error),

    #[error("certificate error: {0}")]
    Certificate(String),

    #[error("cannot parse certificate: {0}")]
    Parse(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
