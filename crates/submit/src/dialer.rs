//! Opening one dialog per request.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use lodge_channel::{CONNECT_TIMEOUT, Channel, ChannelError, ClientTls, Exchange};

/// A boxed future returned by [`Dialer::dial`].
pub type DialFuture<'a> = Pin<Box<dyn Future<Output = Result<Exchange, ChannelError>> + Send + 'a>>;

/// Runs one request/reply dialog with the server.
///
/// With a `sentinel` the reply is read until a line equal to it; without
/// one, a single line is read.
pub trait Dialer: Send + Sync {
    fn dial<'a>(&'a self, payload: &'a [u8], sentinel: Option<&'a str>) -> DialFuture<'a>;
}

/// Dials a lodge server over mutual TLS, one connection per dialog.
#[derive(Debug, Clone)]
pub struct TlsDialer {
    addr: String,
    timeout: Duration,
    tls: ClientTls,
}

impl TlsDialer {
    pub fn new(addr: impl Into<String>, tls: ClientTls) -> Self {
        Self {
            addr: addr.into(),
            timeout: CONNECT_TIMEOUT,
            tls,
        }
    }

    /// Overrides the connect and handshake budget.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }
}

impl Dialer for TlsDialer {
    fn dial<'a>(&'a self, payload: &'a [u8], sentinel: Option<&'a str>) -> DialFuture<'a> {
        Box::pin(async move {
            let channel = Channel::connect(&self.addr, self.timeout, &self.tls).await?;
            match sentinel {
                Some(sentinel) => channel.send_receive_until(payload, sentinel).await,
                None => channel.send_receive(payload).await,
            }
        })
    }
}
