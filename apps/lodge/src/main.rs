//! lodge client entry point.

mod app;
mod batch;
mod cli;
mod config;
mod lock;

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Command};
use config::ClientConfig;

/// Exit status when the manifest was acknowledged but some files must be
/// copied by hand.
const EXIT_MANUAL_COPY: u8 = 3;

fn main() -> ExitCode {
    // Diagnostics go to stderr; stdout carries the server's replies.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn,lodge=info")),
        )
        .init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("lodge: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let mut config = ClientConfig::load(cli.config.as_deref())?;
    if let Some(host) = cli.host {
        config.host = host;
    }
    if let Some(port) = cli.port {
        config.port = port;
    }

    let rt = tokio::runtime::Runtime::new()?;
    let (instructions, failed_lines) = match cli.command {
        Command::Keygen(args) => {
            app::keygen(&config, &args)?;
            return Ok(ExitCode::SUCCESS);
        }
        Command::Submit(args) => {
            args.policy.apply(&mut config);
            let client = app::Client::new(config)?;
            let outcome = rt.block_on(client.submit(&args.manifest))?;
            (outcome.instructions, 0)
        }
        Command::Batch(args) => {
            args.policy.apply(&mut config);
            if let Some(lock) = &args.lock {
                if !lock.exists() {
                    anyhow::bail!("lock file {} specified, but does not exist", lock.display());
                }
            }
            let client = app::Client::new(config)?;
            let report = rt.block_on(async {
                if let Some(lock) = &args.lock {
                    lock::wait_for_removal(lock).await?;
                }
                batch::run(&client, &args.file).await
            })?;
            (report.instructions, report.failed)
        }
    };

    app::print_instructions(&instructions);
    if failed_lines > 0 {
        eprintln!("lodge: {failed_lines} batch line(s) were not submitted");
        Ok(ExitCode::FAILURE)
    } else if !instructions.is_empty() {
        Ok(ExitCode::from(EXIT_MANUAL_COPY))
    } else {
        Ok(ExitCode::SUCCESS)
    }
}
