use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use lodge_protocol::Resolution;
use tracing::warn;

use crate::{DigestAlgorithm, Hasher, TransferError, validate_content_address};

/// Classifies what is stored at `candidate`, a path whose file name is the
/// expected content address.
///
/// A directory, a file whose bytes no longer hash to its name, or a file
/// of the wrong size all count as [`Resolution::Colliding`]: the address is
/// taken by something that is not this content.
pub fn resolve(
    candidate: &Path,
    expected_size: u64,
    hasher: &mut Hasher,
) -> Result<Resolution, TransferError> {
    let metadata = match std::fs::metadata(candidate) {
        Ok(m) => m,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Resolution::Absent),
        Err(e) => return Err(e.into()),
    };

    if metadata.is_dir() {
        warn!(path = %candidate.display(), "content address is a directory");
        return Ok(Resolution::Colliding);
    }

    let (actual, size) = hasher.hash_path(candidate)?;
    let expected = candidate
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();

    if actual != expected {
        warn!(
            path = %candidate.display(),
            %actual,
            "stored file does not hash to its address"
        );
        return Ok(Resolution::Colliding);
    }

    if size != expected_size {
        warn!(
            path = %candidate.display(),
            size,
            expected_size,
            "stored file has the right hash but the wrong size"
        );
        return Ok(Resolution::Colliding);
    }

    Ok(Resolution::Identical)
}

/// A receiving directory holding files named by their content hash.
#[derive(Debug, Clone)]
pub struct ContentStore {
    root: PathBuf,
    algorithm: DigestAlgorithm,
}

impl ContentStore {
    pub fn new(root: impl Into<PathBuf>, algorithm: DigestAlgorithm) -> Self {
        Self {
            root: root.into(),
            algorithm,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn algorithm(&self) -> DigestAlgorithm {
        self.algorithm
    }

    /// Path under which content with address `hash` is stored.
    pub fn path_for(&self, hash: &str) -> Result<PathBuf, TransferError> {
        validate_content_address(hash, self.algorithm)?;
        Ok(self.root.join(hash))
    }

    /// Runs [`resolve`] for one address with a fresh hasher.
    pub fn resolve(&self, hash: &str, expected_size: u64) -> Result<Resolution, TransferError> {
        let path = self.path_for(hash)?;
        resolve(&path, expected_size, &mut Hasher::new(self.algorithm))
    }

    /// Re-hashes the stored copy of `hash`.
    ///
    /// Returns `None` when nothing is stored under the address.
    pub fn rehash(&self, hash: &str) -> Result<Option<String>, TransferError> {
        let path = self.path_for(hash)?;
        match Hasher::new(self.algorithm).hash_path(&path) {
            Ok((actual, _)) => Ok(Some(actual)),
            Err(TransferError::Io(e)) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    /// Stores `data` under its own address and returns (hash, size).
    fn store_file(store: &ContentStore, data: &[u8]) -> (String, u64) {
        let scratch = store.root().join("scratch");
        std::fs::write(&scratch, data).unwrap();
        let (hash, size) = Hasher::new(store.algorithm()).hash_path(&scratch).unwrap();
        std::fs::rename(&scratch, store.root().join(&hash)).unwrap();
        (hash, size)
    }

    #[test]
    fn absent_when_missing() {
        let dir = TempDir::new().unwrap();
        let store = ContentStore::new(dir.path(), DigestAlgorithm::Md5);
        let hash = "900150983cd24fb0d6963f7d28e17f72";
        assert_eq!(store.resolve(hash, 3).unwrap(), Resolution::Absent);
        assert_eq!(store.rehash(hash).unwrap(), None);
    }

    #[test]
    fn identical_is_idempotent_then_absent_after_delete() {
        let dir = TempDir::new().unwrap();
        let store = ContentStore::new(dir.path(), DigestAlgorithm::Sha256);
        let (hash, size) = store_file(&store, b"lane,reads\n1,1000\n");

        assert_eq!(store.resolve(&hash, size).unwrap(), Resolution::Identical);
        assert_eq!(store.resolve(&hash, size).unwrap(), Resolution::Identical);

        std::fs::remove_file(store.path_for(&hash).unwrap()).unwrap();
        assert_eq!(store.resolve(&hash, size).unwrap(), Resolution::Absent);
    }

    #[test]
    fn wrong_size_is_colliding_never_identical() {
        let dir = TempDir::new().unwrap();
        let store = ContentStore::new(dir.path(), DigestAlgorithm::Sha256);
        let (hash, size) = store_file(&store, b"payload");
        assert_eq!(
            store.resolve(&hash, size + 1).unwrap(),
            Resolution::Colliding
        );
    }

    #[test]
    fn corrupt_content_is_colliding() {
        let dir = TempDir::new().unwrap();
        let store = ContentStore::new(dir.path(), DigestAlgorithm::Md5);
        let (hash, size) = store_file(&store, b"original");

        // Simulate a partial overwrite of the same length.
        let mut f = std::fs::OpenOptions::new()
            .write(true)
            .open(store.path_for(&hash).unwrap())
            .unwrap();
        f.write_all(b"ORIG").unwrap();
        drop(f);

        assert_eq!(store.resolve(&hash, size).unwrap(), Resolution::Colliding);
    }

    #[test]
    fn directory_is_colliding() {
        let dir = TempDir::new().unwrap();
        let store = ContentStore::new(dir.path(), DigestAlgorithm::Md5);
        let hash = "900150983cd24fb0d6963f7d28e17f72";
        std::fs::create_dir(dir.path().join(hash)).unwrap();
        assert_eq!(store.resolve(hash, 0).unwrap(), Resolution::Colliding);
    }

    #[test]
    fn invalid_address_is_rejected() {
        let dir = TempDir::new().unwrap();
        let store = ContentStore::new(dir.path(), DigestAlgorithm::Md5);
        assert!(matches!(
            store.resolve("../escape", 1),
            Err(TransferError::InvalidAddress(_))
        ));
    }
}
