//! Wire and log data model for lodge submissions.
//!
//! A submission is described by a [`Manifest`]: who produced a set of
//! result files, with which tool, and the content hash of every input and
//! output. The same JSON shape travels over the mutual-TLS dialog and is
//! appended, one object per line, to the server's manifest log.

pub mod manifest;
pub mod peer;
pub mod wire;

pub use manifest::{Input, Manifest, Output, SentState, Tool};
pub use peer::PeerIdentity;
pub use wire::{Request, Resolution, ResolveItem, ResolveQuery, ResolveReply};

/// Errors produced while building or parsing protocol values.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("no output files specified")]
    NoOutputs,

    #[error("unexpected reply: {0}")]
    UnexpectedReply(String),
}
