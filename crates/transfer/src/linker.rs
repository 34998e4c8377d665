use std::path::{Path, PathBuf};

use lodge_protocol::{Input, Manifest, Output, SentState};
use tracing::{debug, warn};

use crate::{Hasher, TransferError};

/// A problem with one token of a submission's file list.
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    #[error("illegal flag {0:?} (only -i and -o are accepted)")]
    IllegalFlag(String),

    #[error("output {0:?} must be <path>,<type>")]
    MalformedOutput(String),

    #[error("input {0:?} must be a bare path")]
    MalformedInput(String),

    #[error("cannot hash {path}: {source}")]
    Hash {
        path: PathBuf,
        #[source]
        source: TransferError,
    },

    #[error("no output files given")]
    NoOutputs,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mode {
    Input,
    Output,
}

/// Hashed inputs and outputs of one submission.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Links {
    pub inputs: Vec<Input>,
    pub outputs: Vec<Output>,
}

impl Links {
    /// Turns a token list into hashed links.
    ///
    /// Tokens are outputs (`<path>,<type>`) until `-i` switches to inputs
    /// (bare paths); `-o` switches back. Every bad token is reported: the
    /// first error is returned, the rest are logged.
    pub fn build<S: AsRef<str>>(tokens: &[S], hasher: &mut Hasher) -> Result<Links, LinkError> {
        let mut links = Links::default();
        let mut errors = Vec::new();
        let mut mode = Mode::Output;

        for token in tokens.iter().map(AsRef::as_ref) {
            match token {
                "-i" => mode = Mode::Input,
                "-o" => mode = Mode::Output,
                flag if flag.starts_with('-') => {
                    errors.push(LinkError::IllegalFlag(flag.to_string()));
                }
                _ => match mode {
                    Mode::Input => match link_input(token, hasher) {
                        Ok(input) => links.inputs.push(input),
                        Err(e) => errors.push(e),
                    },
                    Mode::Output => match link_output(token, hasher) {
                        Ok(output) => links.outputs.push(output),
                        Err(e) => errors.push(e),
                    },
                },
            }
        }

        let mut errors = errors.into_iter();
        if let Some(first) = errors.next() {
            for rest in errors {
                warn!(error = %rest, "additional link error");
            }
            return Err(first);
        }

        if links.outputs.is_empty() {
            return Err(LinkError::NoOutputs);
        }

        debug!(
            inputs = links.inputs.len(),
            outputs = links.outputs.len(),
            "links built"
        );
        Ok(links)
    }

    /// Moves the links into `manifest`, replacing any it already had.
    pub fn apply(self, manifest: &mut Manifest) {
        manifest.input = self.inputs;
        manifest.output = self.outputs;
    }
}

fn link_input(token: &str, hasher: &mut Hasher) -> Result<Input, LinkError> {
    if token.contains(',') {
        return Err(LinkError::MalformedInput(token.to_string()));
    }
    let path = Path::new(token);
    let (hash, _) = hash(path, hasher)?;
    Ok(Input { hash })
}

fn link_output(token: &str, hasher: &mut Hasher) -> Result<Output, LinkError> {
    let mut parts = token.split(',');
    let (path, kind) = match (parts.next(), parts.next(), parts.next()) {
        (Some(path), Some(kind), None) if !path.is_empty() && !kind.is_empty() => (path, kind),
        _ => return Err(LinkError::MalformedOutput(token.to_string())),
    };

    let full_path = PathBuf::from(path);
    let original_name = full_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| LinkError::MalformedOutput(token.to_string()))?;
    let (hash, size) = hash(&full_path, hasher)?;

    Ok(Output {
        original_name,
        full_path,
        hash,
        kind: kind.to_string(),
        sent: SentState::Unknown,
        size: Some(size),
    })
}

fn hash(path: &Path, hasher: &mut Hasher) -> Result<(String, u64), LinkError> {
    hasher.hash_path(path).map_err(|source| LinkError::Hash {
        path: path.to_path_buf(),
        source,
    })
}
