//! Error types for the dialog channel.

/// Errors produced by the mutual-TLS channel.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TLS error: {0}")]
    Tls(#[from] rustls::Error),

    #[error("connection timed out")]
    Timeout,

    #[error("message length mismatch: wrote {written} of {expected} bytes")]
    LengthMismatch { expected: usize, written: usize },

    #[error("frame exceeds {0} bytes")]
    FrameTooLong(usize),

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("credentials: {0}")]
    Credentials(String),
}
