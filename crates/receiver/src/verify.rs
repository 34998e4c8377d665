use lodge_protocol::Output;
use lodge_transfer::ContentStore;

/// Outcome of checking one output the client claims is on the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verification {
    NotPresent,
    Mismatch { actual: String },
    Verified,
    /// The check itself failed, e.g. an unusable address or a read error.
    Fault(String),
}

/// Re-hashes the stored copy of `output` and compares it to the claim.
///
/// Blocking: reads the whole stored file.
pub fn verify_output(store: &ContentStore, output: &Output) -> Verification {
    match store.rehash(&output.hash) {
        Ok(None) => Verification::NotPresent,
        Ok(Some(actual)) if actual == output.hash => Verification::Verified,
        Ok(Some(actual)) => Verification::Mismatch { actual },
        Err(e) => Verification::Fault(e.to_string()),
    }
}

impl Verification {
    /// The reply line reported to the client for `output`.
    pub fn render(&self, output: &Output) -> String {
        let name = &output.original_name;
        match self {
            // The receiving directory is not disclosed.
            Verification::NotPresent => {
                format!("{name:?} is not on the server at {:?}.", format!(".../{}", output.hash))
            }
            Verification::Mismatch { actual } => format!(
                "{name:?} did not verify correctly: {actual} != {}.",
                output.hash
            ),
            Verification::Verified => format!("{name:?} verified correctly."),
            Verification::Fault(reason) => format!("Server fault: {reason}."),
        }
    }

    pub fn is_verified(&self) -> bool {
        matches!(self, Verification::Verified)
    }
}
