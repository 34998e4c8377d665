//! Command-line interface.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::config::ServerConfig;

#[derive(Debug, Parser)]
#[command(name = "lodge-server", version, about = "Receive and log lodge submissions")]
pub struct Cli {
    /// Configuration file (default: ~/.config/lodge/server.toml).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Generate the server's key pair and certificate.
    Keygen(KeygenArgs),
    /// Accept submissions.
    Serve(ServeArgs),
}

#[derive(Debug, Args)]
pub struct KeygenArgs {
    #[arg(short = 'u', long = "user")]
    pub user: String,

    #[arg(long)]
    pub org: Option<String>,

    /// Host names the certificate is valid for, for clients that verify it.
    #[arg(long = "host")]
    pub hosts: Vec<String>,

    /// Issue a certificate authority instead of a server identity.
    #[arg(long)]
    pub ca: bool,

    /// Replace an existing key pair.
    #[arg(short = 'f', long)]
    pub force: bool,
}

#[derive(Debug, Default, Args)]
pub struct ServeArgs {
    /// File server clients copy to.
    #[arg(long)]
    pub fhost: Option<String>,

    /// Receiving user on the file server.
    #[arg(long)]
    pub fuser: Option<String>,

    /// Path in the receiving user's home directory.
    #[arg(long)]
    pub fpath: Option<String>,

    /// Local path of the receiving directory.
    #[arg(long = "store")]
    pub store_dir: Option<PathBuf>,

    /// Address to listen on.
    #[arg(long)]
    pub listen: Option<String>,

    #[arg(long)]
    pub port: Option<u16>,

    /// Only accept client certificates signed by a trusted authority.
    #[arg(long)]
    pub strict: bool,

    /// Append manifests to this file instead of stdout.
    #[arg(long = "log")]
    pub log_path: Option<PathBuf>,
}

impl ServeArgs {
    pub fn apply(self, config: &mut ServerConfig) {
        if let Some(fhost) = self.fhost {
            config.fhost = Some(fhost);
        }
        if let Some(fuser) = self.fuser {
            config.fuser = Some(fuser);
        }
        if let Some(fpath) = self.fpath {
            config.fpath = fpath;
        }
        if let Some(store_dir) = self.store_dir {
            config.store_dir = Some(store_dir);
        }
        if let Some(listen) = self.listen {
            config.listen = listen;
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if self.strict {
            config.strict = true;
        }
        if let Some(log_path) = self.log_path {
            config.log_path = Some(log_path);
        }
    }
}
