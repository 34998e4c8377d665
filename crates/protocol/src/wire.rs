//! Dialog frames exchanged over the mutual-TLS channel.
//!
//! Every frame is one line of UTF-8 text terminated by `\n`. A connection
//! carries a single request and its reply:
//!
//! ```text
//! target   client: TARGET_CHALLENGE          server: user@host:path/
//! resolve  client: {"resolve":[...]}         server: {"resolutions":[...]}
//! notify   client: <Manifest JSON>           server: <report lines>... ACK_SENTINEL
//! ```

use serde::{Deserialize, Serialize};

use crate::{Manifest, ProtocolError};

/// Literal request for the upload target.
pub const TARGET_CHALLENGE: &str = "LODGE TARGET?";

/// Final line of every notify reply.
pub const ACK_SENTINEL: &str = "Thank you.";

/// Reply to a request that is neither the challenge nor valid JSON.
pub const PARSE_FAILURE: &str = "bad message - could not parse";

/// Reply line sent when the client certificate yielded no identity.
pub const UNVERIFIED_NOTICE: &str = "identity unverified - notification logged as unverified";

/// Server-side classification of a content address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resolution {
    /// Nothing stored under the address.
    Absent,
    /// Stored bytes hash to the address and have the expected size.
    Identical,
    /// Something is stored under the address but it is not this content.
    Colliding,
}

/// One output the client wants classified.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolveItem {
    pub hash: String,
    pub size: u64,
}

/// Dedup request: classify each content address on the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolveQuery {
    pub resolve: Vec<ResolveItem>,
}

/// Dedup reply, positionally matching the query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolveReply {
    pub resolutions: Vec<Resolution>,
}

impl ResolveQuery {
    pub fn to_line(&self) -> Result<Vec<u8>, serde_json::Error> {
        json_line(self)
    }
}

impl ResolveReply {
    pub fn to_line(&self) -> Result<Vec<u8>, serde_json::Error> {
        json_line(self)
    }

    /// Parses a reply and checks it answers every queried item.
    pub fn from_line(line: &[u8], expected: usize) -> Result<Self, ProtocolError> {
        let reply: ResolveReply = serde_json::from_slice(line.trim_ascii_end())
            .map_err(|_| ProtocolError::UnexpectedReply(lossy(line)))?;
        if reply.resolutions.len() != expected {
            return Err(ProtocolError::UnexpectedReply(format!(
                "expected {expected} resolutions, got {}",
                reply.resolutions.len()
            )));
        }
        Ok(reply)
    }
}

/// A classified inbound request line.
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    Target,
    Resolve(ResolveQuery),
    Notify(Box<Manifest>),
    Malformed(String),
}

impl Request {
    pub fn classify(line: &[u8]) -> Request {
        let line = line.trim_ascii();
        if line == TARGET_CHALLENGE.as_bytes() {
            return Request::Target;
        }

        let value: serde_json::Value = match serde_json::from_slice(line) {
            Ok(v) => v,
            Err(e) => return Request::Malformed(e.to_string()),
        };

        if value.get("resolve").is_some() {
            return match serde_json::from_value(value) {
                Ok(q) => Request::Resolve(q),
                Err(e) => Request::Malformed(e.to_string()),
            };
        }

        match serde_json::from_value(value) {
            Ok(m) => Request::Notify(Box::new(m)),
            Err(e) => Request::Malformed(e.to_string()),
        }
    }
}

/// Appends the frame terminator to a text reply.
pub fn text_line(text: &str) -> Vec<u8> {
    let mut line = Vec::with_capacity(text.len() + 1);
    line.extend_from_slice(text.as_bytes());
    line.push(b'\n');
    line
}

/// Extracts the upload target from the reply to [`TARGET_CHALLENGE`].
///
/// An empty reply or one the server uses to signal failure is rejected:
/// no manifest may be sent without a trusted target.
pub fn target_from_reply(reply: &[u8]) -> Result<String, ProtocolError> {
    let target = std::str::from_utf8(reply.trim_ascii())
        .map_err(|_| ProtocolError::UnexpectedReply(lossy(reply)))?;
    if target.is_empty()
        || target == PARSE_FAILURE
        || target == ACK_SENTINEL
        || !target.contains(':')
    {
        return Err(ProtocolError::UnexpectedReply(target.to_string()));
    }
    Ok(target.to_string())
}

fn json_line<T: Serialize>(value: &T) -> Result<Vec<u8>, serde_json::Error> {
    let mut line = serde_json::to_vec(value)?;
    line.push(b'\n');
    Ok(line)
}

fn lossy(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes.trim_ascii()).into_owned()
}
