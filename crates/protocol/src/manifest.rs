use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::{PeerIdentity, ProtocolError};

/// Producer of a submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tool {
    pub name: String,
    pub version: String,
}

/// A provenance-only input: recorded by hash, never transferred.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Input {
    pub hash: String,
}

/// Whether an output is known to be on the server.
///
/// On the wire this is an optional boolean: absent (or `null`) is
/// [`Unknown`](SentState::Unknown), `false` is
/// [`Pending`](SentState::Pending), `true` is [`Sent`](SentState::Sent).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Option<bool>", into = "Option<bool>")]
pub enum SentState {
    /// Never evaluated against the server.
    #[default]
    Unknown,
    /// Evaluated and not confirmed as sent.
    Pending,
    /// Confirmed (or asserted by policy) as present on the server.
    Sent,
}

impl SentState {
    pub fn is_unknown(&self) -> bool {
        matches!(self, SentState::Unknown)
    }

    pub fn is_sent(&self) -> bool {
        matches!(self, SentState::Sent)
    }
}

impl From<bool> for SentState {
    fn from(sent: bool) -> Self {
        if sent {
            SentState::Sent
        } else {
            SentState::Pending
        }
    }
}

impl From<Option<bool>> for SentState {
    fn from(value: Option<bool>) -> Self {
        value.map(SentState::from).unwrap_or_default()
    }
}

impl From<SentState> for Option<bool> {
    fn from(state: SentState) -> Self {
        match state {
            SentState::Unknown => None,
            SentState::Pending => Some(false),
            SentState::Sent => Some(true),
        }
    }
}

/// A result file offered for submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Output {
    /// Base name of the file on the submitting host.
    pub original_name: String,
    /// Local path; never serialized.
    #[serde(skip)]
    pub full_path: PathBuf,
    /// Hex content hash, computed once when the manifest is built.
    pub hash: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "SentState::is_unknown")]
    pub sent: SentState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

/// The notification describing one submission.
///
/// `username`, `serial` and `unverified` are only meaningful once the
/// server has filled them in from the TLS handshake via
/// [`attribute`](Manifest::attribute).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serial: Option<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub unverified: bool,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    pub category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    pub tool: Tool,
    /// Wall time of the producing run, in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime_secs: Option<u64>,
    /// Free-form key/value annotations.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub input: Vec<Input>,
    pub output: Vec<Output>,
}

fn is_false(v: &bool) -> bool {
    !*v
}

impl Manifest {
    /// Creates a manifest with no files and no identity.
    pub fn new(name: impl Into<String>, category: impl Into<String>, tool: Tool) -> Self {
        Self {
            username: None,
            serial: None,
            unverified: false,
            name: name.into(),
            project: None,
            category: category.into(),
            comment: None,
            tool,
            runtime_secs: None,
            extra: BTreeMap::new(),
            input: Vec::new(),
            output: Vec::new(),
        }
    }

    /// Fails with [`ProtocolError::NoOutputs`] when there is nothing to submit.
    pub fn ensure_outputs(&self) -> Result<(), ProtocolError> {
        if self.output.is_empty() {
            return Err(ProtocolError::NoOutputs);
        }
        Ok(())
    }

    /// Serializes the manifest as a single newline-terminated JSON frame.
    pub fn to_line(&self) -> Result<Vec<u8>, serde_json::Error> {
        let mut line = serde_json::to_vec(self)?;
        line.push(b'\n');
        Ok(line)
    }

    /// Parses a manifest from one frame, tolerating the trailing newline.
    pub fn from_line(line: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(line.trim_ascii_end())
    }

    /// Overwrites the identity fields from the handshake.
    ///
    /// Whatever the payload claimed is discarded. Without a peer identity
    /// the manifest is marked unverified.
    pub fn attribute(&mut self, peer: Option<&PeerIdentity>) {
        match peer {
            Some(peer) => {
                self.serial = Some(peer.serial.clone());
                self.username = Some(peer.common_name.clone());
                self.unverified = false;
            }
            None => {
                self.serial = None;
                self.username = None;
                self.unverified = true;
            }
        }
    }

    /// Outputs the client asserts are already on the server.
    pub fn claimed_sent(&self) -> impl Iterator<Item = &Output> {
        self.output.iter().filter(|o| o.sent.is_sent())
    }

    /// Drops per-transfer state before the manifest is logged.
    pub fn clear_sent(&mut self) {
        for output in &mut self.output {
            output.sent = SentState::Unknown;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Manifest {
        let mut m = Manifest::new(
            "alignment run",
            "mapping",
            Tool {
                name: "bwa".into(),
                version: "0.7.17".into(),
            },
        );
        m.input.push(Input {
            hash: "a3f1".into(),
        });
        m.output.push(Output {
            original_name: "report.csv".into(),
            full_path: PathBuf::new(),
            hash: "9b2c".into(),
            kind: "csv".into(),
            sent: SentState::Sent,
            size: Some(42),
        });
        m
    }

    #[test]
    fn sent_state_wire_shape() {
        let mut out = sample().output.remove(0);

        out.sent = SentState::Unknown;
        let json = serde_json::to_value(&out).unwrap();
        assert!(json.get("sent").is_none());

        out.sent = SentState::Pending;
        let json = serde_json::to_value(&out).unwrap();
        assert_eq!(json["sent"], serde_json::json!(false));

        out.sent = SentState::Sent;
        let json = serde_json::to_value(&out).unwrap();
        assert_eq!(json["sent"], serde_json::json!(true));
    }

    #[test]
    fn null_sent_reads_as_unknown() {
        let json = r#"{"originalName":"a","hash":"00","type":"txt","sent":null}"#;
        let out: Output = serde_json::from_str(json).unwrap();
        assert_eq!(out.sent, SentState::Unknown);
    }

    #[test]
    fn full_path_never_serialized() {
        let mut m = sample();
        m.output[0].full_path = PathBuf::from("/home/me/results/report.csv");
        let line = String::from_utf8(m.to_line().unwrap()).unwrap();
        assert!(!line.contains("/home/me"));
        assert!(line.ends_with('\n'));
    }

    #[test]
    fn empty_optionals_are_omitted() {
        let mut m = sample();
        m.input.clear();
        let json = serde_json::to_value(&m).unwrap();
        let obj = json.as_object().unwrap();
        for key in [
            "username",
            "serial",
            "unverified",
            "project",
            "comment",
            "runtimeSecs",
            "extra",
            "input",
        ] {
            assert!(!obj.contains_key(key), "{key} should be omitted");
        }
        assert_eq!(json["output"][0]["originalName"], "report.csv");
        assert_eq!(json["tool"]["version"], "0.7.17");
    }

    #[test]
    fn line_roundtrip_preserves_structure() {
        let mut m = sample();
        m.project = Some("cohort-7".into());
        m.comment = Some("rerun after fix".into());
        m.runtime_secs = Some(3600);
        m.extra.insert("lane".into(), "3".into());

        let parsed = Manifest::from_line(&m.to_line().unwrap()).unwrap();
        assert_eq!(parsed, m);
    }

    #[test]
    fn attribute_overrides_payload_identity() {
        let json = r#"{"username":"mallory","serial":"1","name":"n","category":"c",
            "tool":{"name":"t","version":"1"},"output":[]}"#;
        let mut m: Manifest = serde_json::from_str(json).unwrap();

        let peer = PeerIdentity {
            serial: "987654321".into(),
            common_name: "alice".into(),
        };
        m.attribute(Some(&peer));
        assert_eq!(m.username.as_deref(), Some("alice"));
        assert_eq!(m.serial.as_deref(), Some("987654321"));
        assert!(!m.unverified);

        m.attribute(None);
        assert!(m.username.is_none());
        assert!(m.serial.is_none());
        assert!(m.unverified);
    }

    #[test]
    fn ensure_outputs_rejects_empty() {
        let mut m = sample();
        assert!(m.ensure_outputs().is_ok());
        m.output.clear();
        assert!(matches!(m.ensure_outputs(), Err(ProtocolError::NoOutputs)));
    }

    #[test]
    fn clear_sent_resets_every_output() {
        let mut m = sample();
        assert_eq!(m.claimed_sent().count(), 1);
        m.clear_sent();
        assert_eq!(m.claimed_sent().count(), 0);
        assert!(m.output[0].sent.is_unknown());
    }
}
