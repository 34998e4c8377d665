//! Content addressing for lodge submissions.
//!
//! Files are identified by the hex digest of their bytes. The same digest
//! names the file in the server's receiving directory, so hashing doubles
//! as the dedup key and as the integrity check.

mod hasher;
mod linker;
mod resolve;
mod validation;

pub use hasher::{BLOCK_SIZE, DigestAlgorithm, Hasher};
pub use linker::{LinkError, Links};
pub use resolve::{ContentStore, resolve};
pub use validation::validate_content_address;

pub use lodge_protocol::Resolution;

/// Errors produced by the transfer crate.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("refusing to hash a directory")]
    IsADirectory,

    #[error("invalid content address: {0}")]
    InvalidAddress(String),

    #[error("unknown digest algorithm: {0}")]
    UnknownAlgorithm(String),
}
