//! Server side of a lodge submission.
//!
//! A [`SubmissionService`] answers the three dialog requests: it hands out
//! the upload target, classifies content addresses for dedup, and checks
//! every output a notification claims was sent before appending the
//! attributed manifest to the [`LogSink`]. [`ReceiverServer`] runs the
//! accept loop around it.

mod server;
mod service;
mod sink;
mod verify;

pub use server::{ReceiverConfig, ReceiverServer};
pub use service::SubmissionService;
pub use sink::LogSink;
pub use verify::{Verification, verify_output};

/// Errors produced by the receiver.
#[derive(Debug, thiserror::Error)]
pub enum ReceiverError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("cannot encode manifest: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("channel error: {0}")]
    Channel(#[from] lodge_channel::ChannelError),
}
