//! Server configuration.
//!
//! Stored as TOML at `~/.config/lodge/server.toml`; flags override it.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, bail};
use lodge_channel::ClientAuthPolicy;
use lodge_identity::CredentialPaths;
use lodge_transfer::DigestAlgorithm;
use serde::{Deserialize, Serialize};

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address to listen on.
    #[serde(default = "default_listen")]
    pub listen: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_credentials_dir")]
    pub credentials_dir: PathBuf,

    /// Host clients copy files to.
    #[serde(default)]
    pub fhost: Option<String>,

    /// Receiving user on `fhost`.
    #[serde(default)]
    pub fuser: Option<String>,

    /// Path in the receiving user's home directory.
    #[serde(default)]
    pub fpath: String,

    /// Local view of the receiving directory. Defaults to `fpath` under
    /// this process's home, for a server running as the receiving user.
    #[serde(default)]
    pub store_dir: Option<PathBuf>,

    /// Require client certificates that chain to `authority.pem`.
    #[serde(default)]
    pub strict: bool,

    /// Manifest log; stdout when unset.
    #[serde(default)]
    pub log_path: Option<PathBuf>,

    #[serde(default)]
    pub algorithm: DigestAlgorithm,

    /// Handshake and request read budget, in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_listen() -> String {
    "0.0.0.0".into()
}

fn default_port() -> u16 {
    9001
}

fn default_credentials_dir() -> PathBuf {
    home_dir().join(".config").join("lodge").join("server")
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            port: default_port(),
            credentials_dir: default_credentials_dir(),
            fhost: None,
            fuser: None,
            fpath: String::new(),
            store_dir: None,
            strict: false,
            log_path: None,
            algorithm: DigestAlgorithm::default(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl ServerConfig {
    /// Loads `path`, or the default location when `path` is `None`.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let (path, required) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => (
                home_dir().join(".config").join("lodge").join("server.toml"),
                false,
            ),
        };

        if !required && !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("reading {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn credentials(&self) -> CredentialPaths {
        CredentialPaths::in_dir(&self.credentials_dir)
    }

    /// The `user@host:path/` clients copy outputs to.
    pub fn target(&self) -> anyhow::Result<String> {
        let host = self.fhost.as_deref().filter(|h| !h.is_empty());
        let user = self.fuser.as_deref().filter(|u| !u.is_empty());
        let (Some(host), Some(user)) = (host, user) else {
            let mut missing = Vec::new();
            if host.is_none() {
                missing.push("--fhost");
            }
            if user.is_none() {
                missing.push("--fuser");
            }
            bail!("missing required flags: {}", missing.join(", "));
        };

        let path = self.fpath.trim_matches('/');
        Ok(if path.is_empty() {
            format!("{user}@{host}:~{user}/")
        } else {
            format!("{user}@{host}:~{user}/{path}/")
        })
    }

    pub fn store_dir(&self) -> PathBuf {
        match &self.store_dir {
            Some(dir) => dir.clone(),
            None => home_dir().join(self.fpath.trim_start_matches('/')),
        }
    }

    pub fn client_auth(&self) -> ClientAuthPolicy {
        if self.strict {
            ClientAuthPolicy::RequireAndVerify(self.credentials().trust_pool)
        } else {
            ClientAuthPolicy::RequireAny
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn home_dir() -> PathBuf {
    PathBuf::from(std::env::var_os("HOME").unwrap_or_else(|| "/tmp".into()))
}
