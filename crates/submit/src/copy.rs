//! External secure-copy transfer of output files.

use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::process::Stdio;

use tokio::process::Command;
use tracing::{debug, warn};

/// A boxed future returned by [`SecureCopy::copy`].
pub type CopyFuture<'a> = Pin<Box<dyn Future<Output = Result<(), CopyError>> + Send + 'a>>;

/// Copies one local file to a remote destination.
pub trait SecureCopy: Send + Sync {
    /// Copies `source` to `destination` (`user@host:path`).
    fn copy<'a>(&'a self, source: &'a Path, destination: &'a str) -> CopyFuture<'a>;

    /// The shell command a user can run to perform the same copy by hand.
    fn manual_command(&self, source: &Path, destination: &str) -> String;
}

#[derive(Debug, thiserror::Error)]
pub enum CopyError {
    #[error("cannot run {program}: {source}")]
    Launch {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("copy failed ({}): {stderr}", exit_label(.code))]
    Failed { code: Option<i32>, stderr: String },
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit {code}"),
        None => "killed by signal".to_string(),
    }
}

/// Runs `scp` with password authentication disabled, so a missing key
/// fails instead of prompting.
#[derive(Debug, Clone)]
pub struct ScpCopier {
    program: PathBuf,
}

impl Default for ScpCopier {
    fn default() -> Self {
        Self {
            program: PathBuf::from("scp"),
        }
    }
}

impl ScpCopier {
    /// Uses `program` in place of `scp` from `PATH`.
    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    async fn run(&self, source: &Path, destination: &str) -> Result<(), CopyError> {
        debug!(
            program = %self.program.display(),
            source = %source.display(),
            %destination,
            "starting copy"
        );
        let output = Command::new(&self.program)
            .arg("-o")
            .arg("PasswordAuthentication=no")
            .arg(source)
            .arg(destination)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| CopyError::Launch {
                program: self.program.display().to_string(),
                source,
            })?;

        if output.status.success() {
            return Ok(());
        }
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        warn!(
            source = %source.display(),
            %destination,
            code = ?output.status.code(),
            "copy failed: {stderr}"
        );
        Err(CopyError::Failed {
            code: output.status.code(),
            stderr,
        })
    }
}

impl SecureCopy for ScpCopier {
    fn copy<'a>(&'a self, source: &'a Path, destination: &'a str) -> CopyFuture<'a> {
        Box::pin(self.run(source, destination))
    }

    fn manual_command(&self, source: &Path, destination: &str) -> String {
        format!("scp {} {}", shell_quote(&source.display().to_string()), destination)
    }
}

/// Quotes `arg` for a POSIX shell when it contains anything beyond a safe
/// set of characters.
fn shell_quote(arg: &str) -> String {
    let safe = |c: char| c.is_ascii_alphanumeric() || "/._-+,:@%=".contains(c);
    if !arg.is_empty() && arg.chars().all(safe) {
        return arg.to_string();
    }
    format!("'{}'", arg.replace('\'', r"'\''"))
}
