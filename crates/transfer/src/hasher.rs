use std::fmt;
use std::fs::File;
use std::io::{ErrorKind, Read, Seek, SeekFrom};
use std::path::Path;
use std::str::FromStr;

use md5::Md5;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use sha2::digest::DynDigest;

use crate::TransferError;

/// Read size used when streaming a file through the digest.
pub const BLOCK_SIZE: usize = 4096;

/// Digest used for content addresses.
///
/// Client and server must agree: an address produced with one algorithm
/// never matches a file hashed with the other.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DigestAlgorithm {
    Md5,
    #[default]
    Sha256,
}

impl DigestAlgorithm {
    /// Length of a hex-encoded digest.
    pub fn hex_len(self) -> usize {
        match self {
            DigestAlgorithm::Md5 => 32,
            DigestAlgorithm::Sha256 => 64,
        }
    }

    fn instance(self) -> Box<dyn DynDigest + Send> {
        match self {
            DigestAlgorithm::Md5 => Box::new(Md5::default()),
            DigestAlgorithm::Sha256 => Box::new(Sha256::default()),
        }
    }
}

impl fmt::Display for DigestAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DigestAlgorithm::Md5 => f.write_str("md5"),
            DigestAlgorithm::Sha256 => f.write_str("sha256"),
        }
    }
}

impl FromStr for DigestAlgorithm {
    type Err = TransferError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "md5" => Ok(DigestAlgorithm::Md5),
            "sha256" | "sha-256" => Ok(DigestAlgorithm::Sha256),
            other => Err(TransferError::UnknownAlgorithm(other.to_string())),
        }
    }
}

/// Streams files through a digest, one file at a time.
///
/// The digest state is reset after every file so an instance can be
/// reused, but it is mutable state: give each task its own `Hasher`.
pub struct Hasher {
    algorithm: DigestAlgorithm,
    digest: Box<dyn DynDigest + Send>,
    buf: Vec<u8>,
}

impl Hasher {
    pub fn new(algorithm: DigestAlgorithm) -> Self {
        Self {
            algorithm,
            digest: algorithm.instance(),
            buf: vec![0u8; BLOCK_SIZE],
        }
    }

    pub fn algorithm(&self) -> DigestAlgorithm {
        self.algorithm
    }

    /// Hashes the whole of `file`, starting from offset 0 whatever the
    /// current cursor position.
    pub fn digest(&mut self, file: &mut File) -> Result<String, TransferError> {
        if file.metadata()?.is_dir() {
            return Err(TransferError::IsADirectory);
        }
        file.seek(SeekFrom::Start(0))?;

        loop {
            match file.read(&mut self.buf) {
                Ok(0) => break,
                Ok(n) => self.digest.update(&self.buf[..n]),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.digest.reset();
                    return Err(e.into());
                }
            }
        }

        Ok(hex::encode(self.digest.finalize_reset()))
    }

    /// Opens and hashes `path`, returning the digest and the file size.
    pub fn hash_path(&mut self, path: &Path) -> Result<(String, u64), TransferError> {
        let mut file = File::open(path)?;
        let hash = self.digest(&mut file)?;
        let size = file.metadata()?.len();
        Ok((hash, size))
    }
}

impl fmt::Debug for Hasher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hasher")
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}
