//! Send, verify and collision policies.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Three-level policy used for both sending and verifying outputs.
///
/// For `send`: `Never` skips all transfers, `WhenRequired` transfers only
/// outputs the server does not already hold, `Always` transfers everything.
/// For `verify`: `Never` never marks an output sent, `WhenRequired` marks it
/// sent only after a confirmed copy, `Always` marks it sent unconditionally.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "PolicyRepr", into = "String")]
pub enum Policy {
    Never,
    #[default]
    WhenRequired,
    Always,
}

/// What to do when the server holds something else under an output's
/// content address.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CollisionPolicy {
    /// Leave the stored file alone and report the collision.
    #[default]
    Refuse,
    /// Copy over the stored file.
    Overwrite,
}

/// An unrecognised policy value.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid policy {0:?} (expected 0|1|2 or never|when-required|always)")]
pub struct PolicyError(pub String);

impl fmt::Display for Policy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Policy::Never => "never",
            Policy::WhenRequired => "when-required",
            Policy::Always => "always",
        })
    }
}

impl FromStr for Policy {
    type Err = PolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "0" | "never" => Ok(Policy::Never),
            "1" | "when-required" | "when_required" => Ok(Policy::WhenRequired),
            "2" | "always" => Ok(Policy::Always),
            _ => Err(PolicyError(s.to_string())),
        }
    }
}

impl TryFrom<u8> for Policy {
    type Error = PolicyError;

    fn try_from(level: u8) -> Result<Self, Self::Error> {
        match level {
            0 => Ok(Policy::Never),
            1 => Ok(Policy::WhenRequired),
            2 => Ok(Policy::Always),
            other => Err(PolicyError(other.to_string())),
        }
    }
}

impl From<Policy> for String {
    fn from(policy: Policy) -> Self {
        policy.to_string()
    }
}

/// Config files may give a policy as a level or as a name.
#[derive(Deserialize)]
#[serde(untagged)]
enum PolicyRepr {
    Level(u8),
    Name(String),
}

impl TryFrom<PolicyRepr> for Policy {
    type Error = PolicyError;

    fn try_from(repr: PolicyRepr) -> Result<Self, Self::Error> {
        match repr {
            PolicyRepr::Level(level) => Policy::try_from(level),
            PolicyRepr::Name(name) => name.parse(),
        }
    }
}

impl fmt::Display for CollisionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CollisionPolicy::Refuse => "refuse",
            CollisionPolicy::Overwrite => "overwrite",
        })
    }
}

impl FromStr for CollisionPolicy {
    type Err = PolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "refuse" => Ok(CollisionPolicy::Refuse),
            "overwrite" => Ok(CollisionPolicy::Overwrite),
            _ => Err(PolicyError(s.to_string())),
        }
    }
}

/// Per-submission client policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClientSettings {
    pub send: Policy,
    pub verify: Policy,
    pub collision: CollisionPolicy,
}
