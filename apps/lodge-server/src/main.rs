//! lodge server entry point.

mod app;
mod cli;
mod config;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Command};
use config::ServerConfig;

fn main() -> anyhow::Result<()> {
    // stdout is reserved for the manifest log.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let mut config = ServerConfig::load(cli.config.as_deref())?;

    match cli.command {
        Command::Keygen(args) => app::keygen(&config, &args),
        Command::Serve(args) => {
            args.apply(&mut config);
            tracing::info!(version = env!("CARGO_PKG_VERSION"), "starting lodge server");
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(app::serve(config))?;
            tracing::info!("server shut down cleanly");
            Ok(())
        }
    }
}
