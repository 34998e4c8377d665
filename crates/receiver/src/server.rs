//! Accept loop.
//!
//! One task per connection; the only state tasks share is the service's
//! log sink.

use std::sync::Arc;
use std::time::Duration;

use lodge_channel::{CONNECT_TIMEOUT, ChannelError, Listener, Pending};
use tokio_util::sync::CancellationToken;

use crate::{ReceiverError, SubmissionService};

/// Receiver configuration.
#[derive(Debug, Clone)]
pub struct ReceiverConfig {
    /// Budget for the TLS handshake and for reading the request line.
    pub dialog_timeout: Duration,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            dialog_timeout: CONNECT_TIMEOUT,
        }
    }
}

/// Serves a [`SubmissionService`] until cancelled.
pub struct ReceiverServer {
    config: ReceiverConfig,
    service: Arc<SubmissionService>,
    cancel: CancellationToken,
}

impl ReceiverServer {
    pub fn new(config: ReceiverConfig, service: SubmissionService) -> Arc<Self> {
        Arc::new(Self {
            config,
            service: Arc::new(service),
            cancel: CancellationToken::new(),
        })
    }

    pub fn service(&self) -> &SubmissionService {
        &self.service
    }

    /// Stops the accept loop. Dialogs already in progress run to completion.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Accepts connections on `listener` until [`shutdown`](Self::shutdown).
    pub async fn run(self: &Arc<Self>, listener: Listener) -> Result<(), ReceiverError> {
        tracing::info!(
            addr = %listener.local_addr()?,
            target = %self.service.target(),
            "receiver listening"
        );

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    tracing::info!("receiver shutting down");
                    break Ok(());
                }

                result = listener.accept() => {
                    match result {
                        Ok(pending) => {
                            let server = Arc::clone(self);
                            let remote = pending.remote();
                            tokio::spawn(async move {
                                if let Err(e) = server.handle_connection(pending).await {
                                    tracing::error!(%remote, "connection error: {e}");
                                }
                            });
                        }
                        Err(e) => {
                            tracing::error!("accept error: {e}");
                        }
                    }
                }
            }
        }
    }

    async fn handle_connection(&self, pending: Pending) -> Result<(), ChannelError> {
        let connection = pending.handshake(self.config.dialog_timeout).await?;
        let remote = connection.remote();
        let exchange = connection.receive_send(self.service.as_ref()).await?;
        tracing::debug!(
            %remote,
            client = exchange.peer.as_ref().map(|p| p.common_name.as_str()).unwrap_or("-"),
            request = exchange.received.len(),
            reply = exchange.sent.len(),
            "dialog complete"
        );
        Ok(())
    }
}
