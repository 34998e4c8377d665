//! Client side of a lodge submission.
//!
//! # Pipeline
//!
//! 1. **Target**: ask the server where files are uploaded
//! 2. **Resolve**: learn which outputs the server already holds
//! 3. **Copy**: push outputs that must travel with the external copier
//! 4. **Notify**: send the manifest and collect the server's report
//!
//! The workflow talks to the server through a [`Dialer`] and copies files
//! through a [`SecureCopy`], so both can be replaced in tests.

pub mod copy;
pub mod dialer;
pub mod error;
pub mod policy;
pub mod submission;

pub use copy::{CopyError, CopyFuture, ScpCopier, SecureCopy};
pub use dialer::{DialFuture, Dialer, TlsDialer};
pub use error::SubmitError;
pub use policy::{ClientSettings, CollisionPolicy, Policy, PolicyError};
pub use submission::{ManualCopyRequired, Submission, SubmissionOutcome, SubmissionState};
