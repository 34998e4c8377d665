//! Dialog client.
//!
//! Connects to the server, completes the mutual-TLS handshake, writes one
//! request line and reads the reply.

use std::time::Duration;

use lodge_identity::verify_peer;
use lodge_protocol::PeerIdentity;
use rustls::pki_types::ServerName;
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tracing::{debug, info};

use crate::frame::{read_line, write_frame};
use crate::{ChannelError, ClientTls, Exchange};

/// An established client connection, good for a single dialog.
pub struct Channel {
    stream: BufReader<TlsStream<TcpStream>>,
    peer: Option<PeerIdentity>,
    addr: String,
}

impl Channel {
    /// Connects to `addr` (`host:port`) and completes the handshake.
    ///
    /// `timeout` bounds the TCP connect and the handshake together.
    pub async fn connect(
        addr: &str,
        timeout: Duration,
        tls: &ClientTls,
    ) -> Result<Self, ChannelError> {
        let server_name = server_name(addr)?;
        let connector = tls.connector();

        let handshake = async {
            let tcp = TcpStream::connect(addr).await?;
            let stream = connector.connect(server_name, tcp).await?;
            Ok::<_, ChannelError>(stream)
        };
        let stream = tokio::time::timeout(timeout, handshake)
            .await
            .map_err(|_| ChannelError::Timeout)??;

        let peer = verify_peer(stream.get_ref().1.peer_certificates());
        info!(
            %addr,
            server = peer.as_ref().map(|p| p.common_name.as_str()).unwrap_or("-"),
            "channel connected"
        );

        Ok(Self {
            stream: BufReader::new(stream),
            peer,
            addr: addr.to_string(),
        })
    }

    /// Identity presented by the server.
    pub fn peer(&self) -> Option<&PeerIdentity> {
        self.peer.as_ref()
    }

    /// Sends one request and reads one reply line.
    pub async fn send_receive(self, payload: &[u8]) -> Result<Exchange, ChannelError> {
        self.dialog(payload, None).await
    }

    /// Sends one request and reads reply lines until one equals
    /// `sentinel` or the server closes the connection.
    pub async fn send_receive_until(
        self,
        payload: &[u8],
        sentinel: &str,
    ) -> Result<Exchange, ChannelError> {
        self.dialog(payload, Some(sentinel)).await
    }

    async fn dialog(
        mut self,
        payload: &[u8],
        sentinel: Option<&str>,
    ) -> Result<Exchange, ChannelError> {
        write_frame(self.stream.get_mut(), payload).await?;

        let mut received = Vec::new();
        while let Some(line) = read_line(&mut self.stream).await? {
            received.extend_from_slice(&line);
            match sentinel {
                None => break,
                Some(sentinel) if line.trim_ascii_end() == sentinel.as_bytes() => break,
                Some(_) => {}
            }
        }

        // Best effort: the reply is complete whether or not close_notify
        // reaches the server.
        let _ = self.stream.get_mut().shutdown().await;

        debug!(
            addr = %self.addr,
            sent = payload.len(),
            received = received.len(),
            "dialog complete"
        );
        Ok(Exchange {
            peer: self.peer,
            sent: payload.to_vec(),
            received,
        })
    }
}

/// Derives the TLS server name from a `host:port` address.
fn server_name(addr: &str) -> Result<ServerName<'static>, ChannelError> {
    let host = match addr.rsplit_once(':') {
        Some((host, port)) if !host.is_empty() && port.parse::<u16>().is_ok() => host,
        _ => return Err(ChannelError::InvalidAddress(addr.to_string())),
    };
    let host = host.trim_start_matches('[').trim_end_matches(']');
    ServerName::try_from(host.to_string())
        .map_err(|_| ChannelError::InvalidAddress(addr.to_string()))
}
