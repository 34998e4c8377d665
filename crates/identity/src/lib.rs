//! Submitter identities.
//!
//! An identity is a self-signed ECDSA P-256 certificate plus its private
//! key, kept in a per-role credential directory. The certificate's serial
//! number and common name are what the server attributes a submission to.

mod certificate;
mod error;
mod issue;
mod paths;

pub use certificate::{Identity, verify_peer};
pub use error::IdentityError;
pub use issue::{IssueRequest, VALIDITY_DAYS, issue};
pub use paths::CredentialPaths;

pub use lodge_protocol::PeerIdentity;
