//! Command-line interface.

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::bail;
use clap::{Args, Parser, Subcommand};
use lodge_protocol::{Manifest, Tool};
use lodge_submit::{CollisionPolicy, Policy};
use lodge_transfer::{Hasher, Links};

use crate::config::ClientConfig;

#[derive(Debug, Parser)]
#[command(name = "lodge", version, about = "Submit result files and their manifest to a lodge server")]
pub struct Cli {
    /// Configuration file (default: ~/.config/lodge/client.toml).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Notification and file server.
    #[arg(long, global = true)]
    pub host: Option<String>,

    #[arg(long, global = true)]
    pub port: Option<u16>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Generate a key pair and certificate for a user.
    Keygen(KeygenArgs),
    /// Submit one set of files.
    Submit(SubmitArgs),
    /// Submit every line of a batch file.
    Batch(BatchArgs),
}

#[derive(Debug, Args)]
pub struct KeygenArgs {
    /// User identity; becomes the certificate common name.
    #[arg(short = 'u', long = "user")]
    pub user: String,

    #[arg(long)]
    pub org: Option<String>,

    /// Replace an existing key pair.
    #[arg(short = 'f', long)]
    pub force: bool,
}

#[derive(Debug, Args)]
pub struct SubmitArgs {
    #[command(flatten)]
    pub manifest: ManifestArgs,

    #[command(flatten)]
    pub policy: PolicyArgs,
}

#[derive(Debug, Args)]
pub struct BatchArgs {
    /// One submission per line, in `submit` flag syntax.
    pub file: PathBuf,

    /// Wait until this file is removed before submitting.
    #[arg(long)]
    pub lock: Option<PathBuf>,

    #[command(flatten)]
    pub policy: PolicyArgs,
}

/// Flags shared by `submit` and `batch` that override the configuration.
#[derive(Debug, Clone, Default, Args)]
pub struct PolicyArgs {
    /// When to copy outputs: 0|never, 1|when-required, 2|always.
    #[arg(long)]
    pub send: Option<Policy>,

    /// When to mark outputs sent: 0|never, 1|when-required, 2|always.
    #[arg(long)]
    pub verify: Option<Policy>,

    /// Copy over a different file already stored under an output's hash.
    #[arg(long)]
    pub overwrite: bool,
}

impl PolicyArgs {
    pub fn apply(&self, config: &mut ClientConfig) {
        if let Some(send) = self.send {
            config.send = send;
        }
        if let Some(verify) = self.verify {
            config.verify = verify;
        }
        if self.overwrite {
            config.collision = CollisionPolicy::Overwrite;
        }
    }
}

/// Describes one submission.
///
/// File tokens follow `--`: outputs as `<path>,<type>`, then `-i` and
/// bare input paths, `-o` to switch back.
#[derive(Debug, Clone, Default, Args)]
pub struct ManifestArgs {
    /// Meaningful name of the process being submitted.
    #[arg(short = 'n', long)]
    pub name: Option<String>,

    /// Project being submitted to.
    #[arg(short = 'p', long)]
    pub project: Option<String>,

    /// Agreed process category.
    #[arg(long = "cat")]
    pub category: Option<String>,

    #[arg(long)]
    pub comment: Option<String>,

    /// Process executable name.
    #[arg(long)]
    pub tool: Option<String>,

    /// Process executable version.
    #[arg(short = 'v', long = "tool-version")]
    pub version: Option<String>,

    /// Wall time of the run: seconds, or e.g. `1h30m`, `90s`.
    #[arg(long = "time", value_parser = parse_duration)]
    pub runtime_secs: Option<u64>,

    /// Extra `key=value` pairs separated by spaces.
    #[arg(long = "kv")]
    pub extra: Option<String>,

    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub files: Vec<String>,
}

/// One line of a batch file.
#[derive(Debug, Parser)]
#[command(name = "batch line", no_binary_name = true, disable_help_flag = true)]
pub struct BatchLine {
    #[command(flatten)]
    pub manifest: ManifestArgs,
}

impl ManifestArgs {
    /// Required fields that were not given, by flag.
    pub fn missing(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if is_blank(&self.name) {
            missing.push("-n");
        }
        if is_blank(&self.category) {
            missing.push("--cat");
        }
        if is_blank(&self.tool) {
            missing.push("--tool");
        }
        if is_blank(&self.version) {
            missing.push("-v");
        }
        missing
    }

    /// Hashes the listed files and builds the manifest.
    pub fn build(&self, hasher: &mut Hasher) -> anyhow::Result<Manifest> {
        let missing = self.missing();
        if !missing.is_empty() {
            bail!("missing required flags: {}", missing.join(", "));
        }
        let extra = match &self.extra {
            Some(pairs) => parse_kv(pairs)?,
            None => BTreeMap::new(),
        };

        let links = Links::build(&self.files, hasher)?;

        let mut manifest = Manifest::new(
            self.name.clone().unwrap_or_default(),
            self.category.clone().unwrap_or_default(),
            Tool {
                name: self.tool.clone().unwrap_or_default(),
                version: self.version.clone().unwrap_or_default(),
            },
        );
        manifest.project = self.project.clone();
        manifest.comment = self.comment.clone();
        manifest.runtime_secs = self.runtime_secs;
        manifest.extra = extra;
        links.apply(&mut manifest);
        Ok(manifest)
    }
}

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().is_none_or(|v| v.trim().is_empty())
}

/// Parses `k=v k2=v2`.
pub fn parse_kv(pairs: &str) -> anyhow::Result<BTreeMap<String, String>> {
    let mut map = BTreeMap::new();
    for pair in pairs.split_whitespace() {
        match pair.split_once('=') {
            Some((key, value)) if !key.is_empty() => {
                map.insert(key.to_string(), value.to_string());
            }
            _ => bail!("malformed key=value pair {pair:?}"),
        }
    }
    Ok(map)
}

/// Parses `90`, `90s`, `2m`, `1h30m` or `1h2m3s` into seconds.
pub fn parse_duration(text: &str) -> Result<u64, String> {
    let text = text.trim();
    if let Ok(secs) = text.parse::<u64>() {
        return Ok(secs);
    }

    let mut total: u64 = 0;
    let mut digits = String::new();
    for c in text.chars() {
        if c.is_ascii_digit() {
            digits.push(c);
            continue;
        }
        let unit = match c {
            'h' => 3600,
            'm' => 60,
            's' => 1,
            _ => return Err(format!("invalid duration {text:?}")),
        };
        let value: u64 = digits
            .parse()
            .map_err(|_| format!("invalid duration {text:?}"))?;
        total = value
            .checked_mul(unit)
            .and_then(|v| total.checked_add(v))
            .ok_or_else(|| format!("duration {text:?} is too long"))?;
        digits.clear();
    }
    if !digits.is_empty() || text.is_empty() {
        return Err(format!("invalid duration {text:?}"));
    }
    Ok(total)
}
