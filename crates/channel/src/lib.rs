//! Mutual-TLS dialog channel.
//!
//! Each connection carries one request line from the client and one reply
//! from the server, after which the server closes its side. Both peers
//! present certificates; the server refuses clients that present none.
//!
//! The client side is [`Channel`]; the server side is a [`Listener`]
//! yielding [`Pending`] sockets that complete their handshake into a
//! [`Connection`], which answers through a [`Responder`].

pub mod client;
pub mod error;
pub mod frame;
pub mod server;
pub mod tls;

pub use client::Channel;
pub use error::ChannelError;
pub use frame::MAX_FRAME_LEN;
pub use server::{Connection, Listener, Pending, Responder, ResponderFuture};
pub use tls::{ClientAuthPolicy, ClientTls, ServerTls, ServerVerification};

use std::time::Duration;

use lodge_protocol::PeerIdentity;

/// Default budget for TCP connect plus TLS handshake.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Result of one request/reply dialog, from the local side's view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exchange {
    /// Identity the remote certificate yielded, if any.
    pub peer: Option<PeerIdentity>,
    pub sent: Vec<u8>,
    pub received: Vec<u8>,
}

impl Exchange {
    /// Received bytes split into lines, without terminators or blank lines.
    pub fn received_lines(&self) -> Vec<String> {
        String::from_utf8_lossy(&self.received)
            .lines()
            .map(str::trim_end)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect()
    }
}
