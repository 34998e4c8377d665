//! Submission error types.

use lodge_channel::ChannelError;
use lodge_protocol::ProtocolError;

use crate::SubmissionState;

/// A structural failure that stopped a submission.
///
/// Every variant records the state the workflow was in, so the caller can
/// tell whether anything reached the server.
#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error("{state}: channel error: {source}")]
    Channel {
        state: SubmissionState,
        #[source]
        source: ChannelError,
    },

    #[error("{state}: {source}")]
    Protocol {
        state: SubmissionState,
        #[source]
        source: ProtocolError,
    },

    #[error("{state}: cannot encode request: {source}")]
    Encode {
        state: SubmissionState,
        #[source]
        source: serde_json::Error,
    },
}

impl SubmitError {
    /// State in which the workflow failed.
    pub fn state(&self) -> SubmissionState {
        match self {
            SubmitError::Channel { state, .. }
            | SubmitError::Protocol { state, .. }
            | SubmitError::Encode { state, .. } => *state,
        }
    }
}
