//! Server wiring.

use std::sync::Arc;

use anyhow::Context;
use lodge_channel::{Listener, ServerTls};
use lodge_identity::{IssueRequest, issue};
use lodge_receiver::{LogSink, ReceiverConfig, ReceiverServer, SubmissionService};
use lodge_transfer::ContentStore;

use crate::cli::KeygenArgs;
use crate::config::ServerConfig;

pub fn keygen(config: &ServerConfig, args: &KeygenArgs) -> anyhow::Result<()> {
    let mut request = IssueRequest::new(args.user.clone(), &config.credentials_dir);
    request.organisation = args.org.clone();
    request.hosts = args.hosts.clone();
    request.is_ca = args.ca;
    request.overwrite = args.force;

    let identity = issue(&request)?;
    println!("Serial: {}", identity.serial);
    println!("Username: {}", identity.common_name);
    Ok(())
}

/// Serves until interrupted.
pub async fn serve(config: ServerConfig) -> anyhow::Result<()> {
    let target = config.target()?;
    let store_dir = config.store_dir();
    if !store_dir.is_dir() {
        anyhow::bail!("receiving directory {} does not exist", store_dir.display());
    }

    let paths = config.credentials();
    let tls = ServerTls::load(&paths, &config.client_auth()).with_context(|| {
        format!(
            "loading credentials from {} (run `lodge-server keygen` first?)",
            paths.dir.display()
        )
    })?;

    let sink = match &config.log_path {
        Some(path) => LogSink::append_to(path)
            .with_context(|| format!("opening manifest log {}", path.display()))?,
        None => LogSink::stdout(),
    };
    let store = ContentStore::new(&store_dir, config.algorithm);
    tracing::info!(
        store = %store_dir.display(),
        algorithm = %config.algorithm,
        strict = config.strict,
        "receiving directory ready"
    );

    let server = ReceiverServer::new(
        ReceiverConfig {
            dialog_timeout: config.timeout(),
        },
        SubmissionService::new(target, store, sink),
    );
    let listener = Listener::bind((config.listen.as_str(), config.port), &tls).await?;

    let stopper = Arc::clone(&server);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received");
            stopper.shutdown();
        }
    });

    server.run(listener).await?;
    Ok(())
}
