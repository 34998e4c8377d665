use crate::{DigestAlgorithm, TransferError};

/// Validates that `hash` can safely name a file in the receiving directory.
///
/// A content address must be the lowercase hex digest of `algorithm`:
/// anything else (path separators, `..`, uppercase, wrong length) is
/// rejected before it is ever joined onto a directory.
pub fn validate_content_address(
    hash: &str,
    algorithm: DigestAlgorithm,
) -> Result<(), TransferError> {
    if hash.is_empty() {
        return Err(TransferError::InvalidAddress("empty address".into()));
    }

    if hash.len() != algorithm.hex_len() {
        return Err(TransferError::InvalidAddress(format!(
            "{hash:?} is not a {algorithm} digest ({} hex chars expected)",
            algorithm.hex_len()
        )));
    }

    if !hash.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f')) {
        return Err(TransferError::InvalidAddress(format!(
            "{hash:?} is not lowercase hex"
        )));
    }

    Ok(())
}
