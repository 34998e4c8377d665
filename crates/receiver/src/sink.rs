//! Append-only manifest log.

use std::fmt;
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::Path;
use std::sync::{Mutex, PoisonError};

use lodge_protocol::Manifest;

use crate::ReceiverError;

/// Destination for accepted manifests, one JSON object per line.
///
/// Shared by every connection; each line is written and flushed while the
/// lock is held, so concurrent appends never interleave.
pub struct LogSink {
    writer: Mutex<Box<dyn Write + Send>>,
    label: String,
}

impl LogSink {
    /// Logs to standard output, for the operator to redirect.
    pub fn stdout() -> Self {
        Self::from_writer(io::stdout(), "stdout")
    }

    /// Opens `path` for appending, creating it if needed.
    pub fn append_to(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self::from_writer(file, path.display().to_string()))
    }

    pub fn from_writer(writer: impl Write + Send + 'static, label: impl Into<String>) -> Self {
        Self {
            writer: Mutex::new(Box::new(writer)),
            label: label.into(),
        }
    }

    /// Appends one manifest line.
    pub fn append(&self, manifest: &Manifest) -> Result<(), ReceiverError> {
        let line = manifest.to_line()?;
        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        writer.write_all(&line)?;
        writer.flush()?;
        Ok(())
    }
}

impl fmt::Debug for LogSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogSink").field("label", &self.label).finish()
    }
}
