//! Client configuration.
//!
//! Stored as TOML at `~/.config/lodge/client.toml`. Every key is optional;
//! command-line flags override the file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use lodge_channel::ServerVerification;
use lodge_identity::CredentialPaths;
use lodge_submit::{ClientSettings, CollisionPolicy, Policy};
use lodge_transfer::DigestAlgorithm;
use serde::{Deserialize, Serialize};

/// Client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Notification and file server.
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Directory holding this user's key and certificate.
    #[serde(default = "default_credentials_dir")]
    pub credentials_dir: PathBuf,

    /// When to copy outputs: never, when-required or always (or 0/1/2).
    #[serde(default)]
    pub send: Policy,

    /// When to mark outputs sent: never, when-required or always (or 0/1/2).
    #[serde(default)]
    pub verify: Policy,

    #[serde(default)]
    pub collision: CollisionPolicy,

    #[serde(default)]
    pub algorithm: DigestAlgorithm,

    /// Check the server certificate against `authority.pem` in the
    /// credential directory.
    #[serde(default)]
    pub verify_server: bool,

    /// Connect and handshake budget, in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_scp_program")]
    pub scp_program: PathBuf,
}

fn default_host() -> String {
    "localhost".into()
}

fn default_port() -> u16 {
    9001
}

fn default_credentials_dir() -> PathBuf {
    config_dir().join("client")
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_scp_program() -> PathBuf {
    PathBuf::from("scp")
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            credentials_dir: default_credentials_dir(),
            send: Policy::default(),
            verify: Policy::default(),
            collision: CollisionPolicy::default(),
            algorithm: DigestAlgorithm::default(),
            verify_server: false,
            timeout_secs: default_timeout_secs(),
            scp_program: default_scp_program(),
        }
    }
}

impl ClientConfig {
    /// Loads `path`, or the default location when `path` is `None`.
    ///
    /// An explicit path must exist; a missing default file yields the
    /// built-in defaults.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let (path, required) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => (config_dir().join("client.toml"), false),
        };

        if !required && !path.exists() {
            tracing::debug!(path = %path.display(), "no configuration file, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("reading {}", path.display()))?;
        let config: ClientConfig =
            toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))?;
        tracing::debug!(path = %path.display(), "configuration loaded");
        Ok(config)
    }

    /// `host:port`, bracketing bare IPv6 hosts.
    pub fn addr(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    pub fn credentials(&self) -> CredentialPaths {
        CredentialPaths::in_dir(&self.credentials_dir)
    }

    pub fn settings(&self) -> ClientSettings {
        ClientSettings {
            send: self.send,
            verify: self.verify,
            collision: self.collision,
        }
    }

    pub fn server_verification(&self) -> ServerVerification {
        if self.verify_server {
            ServerVerification::TrustPool(self.credentials().trust_pool)
        } else {
            ServerVerification::Insecure
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// `~/.config/lodge`.
fn config_dir() -> PathBuf {
    let home = std::env::var_os("HOME").unwrap_or_else(|| "/tmp".into());
    PathBuf::from(home).join(".config").join("lodge")
}
