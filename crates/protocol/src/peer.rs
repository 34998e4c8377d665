use std::fmt;

use serde::{Deserialize, Serialize};

/// Identity of the remote party, read from its TLS certificate.
///
/// Only ever constructed from a completed handshake; values that arrive
/// inside a JSON payload are never turned into a `PeerIdentity`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerIdentity {
    /// Certificate serial number in decimal.
    pub serial: String,
    /// Subject common name.
    pub common_name: String,
}

impl fmt::Display for PeerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (serial {})", self.common_name, self.serial)
    }
}
