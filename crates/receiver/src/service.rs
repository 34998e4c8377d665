//! Per-request handling for the three dialog requests.

use lodge_channel::{Responder, ResponderFuture};
use lodge_protocol::wire::{ACK_SENTINEL, PARSE_FAILURE, UNVERIFIED_NOTICE, text_line};
use lodge_protocol::{
    Manifest, Output, PeerIdentity, Request, Resolution, ResolveQuery, ResolveReply,
};
use lodge_transfer::ContentStore;
use tracing::{error, info, warn};

use crate::{LogSink, verify_output};

/// Answers target, resolve and notify requests for one receiving directory.
#[derive(Debug)]
pub struct SubmissionService {
    target: String,
    store: ContentStore,
    sink: LogSink,
}

impl SubmissionService {
    /// `target` is the `user@host:path/` clients copy outputs to; `store`
    /// is the same directory as seen from this host.
    pub fn new(target: impl Into<String>, store: ContentStore, sink: LogSink) -> Self {
        Self {
            target: target.into(),
            store,
            sink,
        }
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn store(&self) -> &ContentStore {
        &self.store
    }

    async fn answer(&self, peer: Option<&PeerIdentity>, request: &[u8]) -> Vec<u8> {
        match Request::classify(request) {
            Request::Target => text_line(&self.target),
            Request::Resolve(query) => self.resolve(query).await,
            Request::Notify(manifest) => self.notify(peer, *manifest).await,
            Request::Malformed(reason) => {
                warn!(
                    client = peer.map(|p| p.common_name.as_str()).unwrap_or("-"),
                    "unparseable request: {reason}"
                );
                lines([PARSE_FAILURE.to_string(), ACK_SENTINEL.to_string()])
            }
        }
    }

    async fn resolve(&self, query: ResolveQuery) -> Vec<u8> {
        let store = self.store.clone();
        let hashed = tokio::task::spawn_blocking(move || {
            query
                .resolve
                .iter()
                .map(|item| match store.resolve(&item.hash, item.size) {
                    Ok(resolution) => resolution,
                    Err(e) => {
                        warn!(hash = %item.hash, "cannot resolve: {e}");
                        Resolution::Colliding
                    }
                })
                .collect::<Vec<_>>()
        })
        .await;

        let reply = match hashed {
            Ok(resolutions) => ResolveReply { resolutions }.to_line(),
            Err(e) => return text_line(&format!("Server fault: {e}.")),
        };
        reply.unwrap_or_else(|e| text_line(&format!("Server fault: {e}.")))
    }

    async fn notify(&self, peer: Option<&PeerIdentity>, mut manifest: Manifest) -> Vec<u8> {
        let mut report = Vec::new();
        if peer.is_none() {
            report.push(UNVERIFIED_NOTICE.to_string());
        }

        let store = self.store.clone();
        let claimed: Vec<Output> = manifest.claimed_sent().cloned().collect();
        let verified = tokio::task::spawn_blocking(move || {
            claimed
                .iter()
                .map(|output| verify_output(&store, output).render(output))
                .collect::<Vec<_>>()
        })
        .await;
        match verified {
            Ok(results) => report.extend(results),
            Err(e) => report.push(format!("Server fault: {e}.")),
        }

        manifest.attribute(peer);
        manifest.clear_sent();
        match self.sink.append(&manifest) {
            Ok(()) => info!(
                user = manifest.username.as_deref().unwrap_or("-"),
                serial = manifest.serial.as_deref().unwrap_or("-"),
                unverified = manifest.unverified,
                name = %manifest.name,
                outputs = manifest.output.len(),
                "manifest logged"
            ),
            Err(e) => {
                error!(name = %manifest.name, "manifest not logged: {e}");
                report.push(format!(
                    "Notification not logged due to internal error, please notify admin: {e}"
                ));
            }
        }

        report.push(ACK_SENTINEL.to_string());
        lines(report)
    }
}

impl Responder for SubmissionService {
    fn respond<'a>(
        &'a self,
        peer: Option<&'a PeerIdentity>,
        request: &'a [u8],
    ) -> ResponderFuture<'a> {
        Box::pin(self.answer(peer, request))
    }
}

fn lines(report: impl IntoIterator<Item = String>) -> Vec<u8> {
    report
        .into_iter()
        .flat_map(|line| text_line(&line))
        .collect()
}
