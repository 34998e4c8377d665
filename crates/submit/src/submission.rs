//! The client submission state machine.

use std::fmt;

use lodge_protocol::wire::{ACK_SENTINEL, TARGET_CHALLENGE, target_from_reply, text_line};
use lodge_protocol::{
    Manifest, ProtocolError, Resolution, ResolveItem, ResolveQuery, ResolveReply, SentState,
};
use tracing::{debug, info, warn};

use crate::{ClientSettings, CollisionPolicy, Dialer, Policy, SecureCopy, SubmitError};

/// Where a submission is in its lifecycle.
///
/// `Built → TargetRequested → TransferDecided → Copying → Notifying →
/// Acknowledged`, or `Failed` from any of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionState {
    Built,
    TargetRequested,
    TransferDecided,
    Copying,
    Notifying,
    Acknowledged,
    Failed,
}

impl fmt::Display for SubmissionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SubmissionState::Built => "built",
            SubmissionState::TargetRequested => "target requested",
            SubmissionState::TransferDecided => "transfer decided",
            SubmissionState::Copying => "copying",
            SubmissionState::Notifying => "notifying",
            SubmissionState::Acknowledged => "acknowledged",
            SubmissionState::Failed => "failed",
        })
    }
}

/// Copies that failed and must be repeated by hand.
///
/// Returned alongside a successful outcome: the server has the manifest,
/// but not every file it names.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{} file(s) must be copied manually:\n{}", .commands.len(), .commands.join("\n"))]
pub struct ManualCopyRequired {
    pub commands: Vec<String>,
}

/// Result of an acknowledged submission.
#[derive(Debug, Clone)]
pub struct SubmissionOutcome {
    /// Server reply lines, verbatim, ending with the acknowledgement.
    pub acknowledgement: Vec<String>,
    /// Manual copy commands for every failed copy.
    pub instructions: Vec<String>,
    pub copies_attempted: usize,
    /// The manifest as sent, with sent states filled in.
    pub manifest: Manifest,
}

impl SubmissionOutcome {
    pub fn manual_followup(&self) -> Option<ManualCopyRequired> {
        if self.instructions.is_empty() {
            return None;
        }
        Some(ManualCopyRequired {
            commands: self.instructions.clone(),
        })
    }
}

/// What happens to one output before the manifest is sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Plan {
    Copy,
    Skip { sent: bool },
}

fn plan(settings: &ClientSettings, resolution: Option<Resolution>) -> Plan {
    let asserted = settings.verify == Policy::Always;
    match (settings.send, resolution) {
        (Policy::Never, _) => Plan::Skip { sent: asserted },
        (Policy::WhenRequired, Some(Resolution::Colliding))
            if settings.collision == CollisionPolicy::Refuse =>
        {
            Plan::Skip { sent: asserted }
        }
        (Policy::Always, _) => Plan::Copy,
        (_, Some(Resolution::Identical)) => Plan::Skip { sent: asserted },
        _ => Plan::Copy,
    }
}

/// Upload location of one output under the server's target.
fn destination(target: &str, hash: &str) -> String {
    if target.ends_with('/') || target.ends_with(':') {
        format!("{target}{hash}")
    } else {
        format!("{target}/{hash}")
    }
}

/// One submission, driven from `Built` to `Acknowledged`.
///
/// The target exchange always completes before any transfer decision, and
/// every copy finishes before the manifest is sent.
pub struct Submission<'a> {
    manifest: Manifest,
    settings: ClientSettings,
    dialer: &'a dyn Dialer,
    copier: &'a dyn SecureCopy,
    state: SubmissionState,
}

impl<'a> Submission<'a> {
    pub fn new(
        manifest: Manifest,
        settings: &ClientSettings,
        dialer: &'a dyn Dialer,
        copier: &'a dyn SecureCopy,
    ) -> Self {
        Self {
            manifest,
            settings: *settings,
            dialer,
            copier,
            state: SubmissionState::Built,
        }
    }

    pub fn state(&self) -> SubmissionState {
        self.state
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    /// Runs the whole workflow.
    ///
    /// Copy failures do not stop the submission; they come back as
    /// [`SubmissionOutcome::instructions`]. Transport and protocol failures
    /// leave the submission `Failed`.
    pub async fn run(&mut self) -> Result<SubmissionOutcome, SubmitError> {
        let result = self.drive().await;
        if let Err(e) = &result {
            warn!(state = %e.state(), name = %self.manifest.name, "submission failed: {e}");
            self.state = SubmissionState::Failed;
        }
        result
    }

    async fn drive(&mut self) -> Result<SubmissionOutcome, SubmitError> {
        self.manifest.ensure_outputs().map_err(|source| SubmitError::Protocol {
            state: self.state,
            source,
        })?;

        self.advance(SubmissionState::TargetRequested);
        let target = self.request_target().await?;

        self.advance(SubmissionState::TransferDecided);
        let resolutions = self.resolve().await?;
        let plans: Vec<Plan> = resolutions
            .iter()
            .zip(&self.manifest.output)
            .map(|(resolution, output)| {
                let decision = plan(&self.settings, *resolution);
                if *resolution == Some(Resolution::Colliding) {
                    match decision {
                        Plan::Copy => warn!(
                            file = %output.original_name,
                            hash = %output.hash,
                            "server holds different content under this hash, overwriting"
                        ),
                        Plan::Skip { .. } => warn!(
                            file = %output.original_name,
                            hash = %output.hash,
                            "server holds different content under this hash, not copying"
                        ),
                    }
                }
                decision
            })
            .collect();

        self.advance(SubmissionState::Copying);
        let (instructions, copies_attempted) = self.copy_outputs(&target, &plans).await;

        self.advance(SubmissionState::Notifying);
        let acknowledgement = self.notify().await?;

        self.advance(SubmissionState::Acknowledged);
        info!(
            name = %self.manifest.name,
            outputs = self.manifest.output.len(),
            copies_attempted,
            failed = instructions.len(),
            "submission acknowledged"
        );
        Ok(SubmissionOutcome {
            acknowledgement,
            instructions,
            copies_attempted,
            manifest: self.manifest.clone(),
        })
    }

    fn advance(&mut self, next: SubmissionState) {
        debug!(from = %self.state, to = %next, "submission state");
        self.state = next;
    }

    fn protocol_error(&self, source: ProtocolError) -> SubmitError {
        SubmitError::Protocol {
            state: self.state,
            source,
        }
    }

    async fn request_target(&self) -> Result<String, SubmitError> {
        let exchange = self
            .dialer
            .dial(&text_line(TARGET_CHALLENGE), None)
            .await
            .map_err(|source| SubmitError::Channel {
                state: self.state,
                source,
            })?;
        let target = target_from_reply(&exchange.received).map_err(|e| self.protocol_error(e))?;
        info!(
            %target,
            server = exchange.peer.as_ref().map(|p| p.common_name.as_str()).unwrap_or("-"),
            "upload target resolved"
        );
        Ok(target)
    }

    /// Asks the server to classify every output. Without sending there is
    /// nothing to decide, so no exchange takes place.
    async fn resolve(&self) -> Result<Vec<Option<Resolution>>, SubmitError> {
        let outputs = &self.manifest.output;
        if self.settings.send == Policy::Never {
            return Ok(vec![None; outputs.len()]);
        }

        let query = ResolveQuery {
            resolve: outputs
                .iter()
                .map(|o| ResolveItem {
                    hash: o.hash.clone(),
                    size: o.size.unwrap_or(0),
                })
                .collect(),
        };
        let line = query.to_line().map_err(|source| SubmitError::Encode {
            state: self.state,
            source,
        })?;
        let exchange =
            self.dialer
                .dial(&line, None)
                .await
                .map_err(|source| SubmitError::Channel {
                    state: self.state,
                    source,
                })?;
        let reply = ResolveReply::from_line(&exchange.received, outputs.len())
            .map_err(|e| self.protocol_error(e))?;

        for (output, resolution) in outputs.iter().zip(&reply.resolutions) {
            debug!(file = %output.original_name, hash = %output.hash, ?resolution, "resolved");
        }
        Ok(reply.resolutions.into_iter().map(Some).collect())
    }

    async fn copy_outputs(&mut self, target: &str, plans: &[Plan]) -> (Vec<String>, usize) {
        let verify = self.settings.verify;
        let mut instructions = Vec::new();
        let mut attempted = 0;

        for (output, plan) in self.manifest.output.iter_mut().zip(plans) {
            let sent = match *plan {
                Plan::Skip { sent } => sent,
                Plan::Copy => {
                    attempted += 1;
                    let dest = destination(target, &output.hash);
                    match self.copier.copy(&output.full_path, &dest).await {
                        Ok(()) => {
                            info!(file = %output.original_name, destination = %dest, "copied");
                            verify != Policy::Never
                        }
                        Err(e) => {
                            warn!(file = %output.original_name, "copy failed, manual copy required: {e}");
                            instructions.push(self.copier.manual_command(&output.full_path, &dest));
                            verify == Policy::Always
                        }
                    }
                }
            };
            output.sent = SentState::from(sent);
        }

        (instructions, attempted)
    }

    async fn notify(&self) -> Result<Vec<String>, SubmitError> {
        let line = self.manifest.to_line().map_err(|source| SubmitError::Encode {
            state: self.state,
            source,
        })?;
        let exchange = self
            .dialer
            .dial(&line, Some(ACK_SENTINEL))
            .await
            .map_err(|source| SubmitError::Channel {
                state: self.state,
                source,
            })?;

        let lines = exchange.received_lines();
        if lines.last().map(String::as_str) != Some(ACK_SENTINEL) {
            let reply = if lines.is_empty() {
                "connection closed before acknowledgement".to_string()
            } else {
                lines.join(" / ")
            };
            return Err(self.protocol_error(ProtocolError::UnexpectedReply(reply)));
        }
        Ok(lines)
    }
}
