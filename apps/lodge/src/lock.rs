//! Waiting on a lock file.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, bail};
use notify::{RecursiveMode, Watcher};
use tokio::sync::mpsc;

/// Re-check interval in case a removal event is missed.
const POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Blocks until `lock` is removed. The lock must exist when called.
pub async fn wait_for_removal(lock: &Path) -> anyhow::Result<()> {
    if !lock.exists() {
        bail!("lock file {} does not exist", lock.display());
    }
    let dir = match lock.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };

    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut watcher = notify::recommended_watcher(move |event: notify::Result<notify::Event>| {
        let _ = tx.send(event);
    })
    .context("creating file watcher")?;
    watcher
        .watch(dir, RecursiveMode::NonRecursive)
        .with_context(|| format!("watching {}", dir.display()))?;

    tracing::info!(lock = %lock.display(), "waiting for lock to be released");
    while lock.exists() {
        tokio::select! {
            event = rx.recv() => match event {
                Some(Ok(event)) => tracing::trace!(?event, "lock directory changed"),
                Some(Err(e)) => tracing::warn!("file watcher error: {e}"),
                None => break,
            },
            _ = tokio::time::sleep(POLL_INTERVAL) => {}
        }
    }
    tracing::info!(lock = %lock.display(), "lock released");
    Ok(())
}
