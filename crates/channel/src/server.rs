//! Dialog server.
//!
//! [`Listener::accept`] only accepts the TCP socket; the TLS handshake runs
//! in [`Pending::handshake`] so a slow or silent client never holds up the
//! accept loop.

use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::time::Duration;

use lodge_identity::verify_peer;
use lodge_protocol::PeerIdentity;
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio_rustls::TlsAcceptor;
use tokio_rustls::server::TlsStream;
use tracing::{debug, info};

use crate::frame::{read_line, write_frame};
use crate::{ChannelError, Exchange, ServerTls};

/// A boxed future returned by [`Responder::respond`].
pub type ResponderFuture<'a> = Pin<Box<dyn Future<Output = Vec<u8>> + Send + 'a>>;

/// Produces the reply to one request line.
///
/// `peer` is the identity from the client's certificate, `None` when the
/// certificate did not yield one. The reply is written verbatim.
pub trait Responder: Send + Sync {
    fn respond<'a>(
        &'a self,
        peer: Option<&'a PeerIdentity>,
        request: &'a [u8],
    ) -> ResponderFuture<'a>;
}

impl<F> Responder for F
where
    F: Fn(Option<&PeerIdentity>, &[u8]) -> Vec<u8> + Send + Sync,
{
    fn respond<'a>(
        &'a self,
        peer: Option<&'a PeerIdentity>,
        request: &'a [u8],
    ) -> ResponderFuture<'a> {
        let reply = self(peer, request);
        Box::pin(async move { reply })
    }
}

/// A bound TLS listener.
pub struct Listener {
    inner: TcpListener,
    acceptor: TlsAcceptor,
}

impl Listener {
    pub async fn bind(addr: impl ToSocketAddrs, tls: &ServerTls) -> Result<Self, ChannelError> {
        let inner = TcpListener::bind(addr).await?;
        info!(addr = %inner.local_addr()?, "channel listening");
        Ok(Self {
            inner,
            acceptor: tls.acceptor(),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ChannelError> {
        Ok(self.inner.local_addr()?)
    }

    /// Waits for the next TCP connection.
    pub async fn accept(&self) -> Result<Pending, ChannelError> {
        let (tcp, remote) = self.inner.accept().await?;
        debug!(%remote, "connection accepted");
        Ok(Pending {
            tcp,
            remote,
            acceptor: self.acceptor.clone(),
        })
    }
}

/// An accepted socket whose TLS handshake has not run yet.
pub struct Pending {
    tcp: TcpStream,
    remote: SocketAddr,
    acceptor: TlsAcceptor,
}

impl Pending {
    pub fn remote(&self) -> SocketAddr {
        self.remote
    }

    /// Completes the handshake. `timeout` bounds the handshake here and
    /// every later read on the connection.
    pub async fn handshake(self, timeout: Duration) -> Result<Connection, ChannelError> {
        let stream = tokio::time::timeout(timeout, self.acceptor.accept(self.tcp))
            .await
            .map_err(|_| ChannelError::Timeout)??;

        let peer = verify_peer(stream.get_ref().1.peer_certificates());
        debug!(
            remote = %self.remote,
            serial = peer.as_ref().map(|p| p.serial.as_str()).unwrap_or("-"),
            "handshake complete"
        );

        Ok(Connection {
            stream: BufReader::new(stream),
            peer,
            remote: self.remote,
            read_timeout: timeout,
        })
    }
}

/// A handshaken server connection, good for a single dialog.
pub struct Connection {
    stream: BufReader<TlsStream<TcpStream>>,
    peer: Option<PeerIdentity>,
    remote: SocketAddr,
    read_timeout: Duration,
}

impl Connection {
    pub fn peer(&self) -> Option<&PeerIdentity> {
        self.peer.as_ref()
    }

    pub fn remote(&self) -> SocketAddr {
        self.remote
    }

    /// Reads one request line, writes the responder's reply and closes.
    ///
    /// A client that disconnects without sending anything ends the dialog
    /// with an empty exchange and no reply.
    pub async fn receive_send(
        mut self,
        responder: &dyn Responder,
    ) -> Result<Exchange, ChannelError> {
        let request = tokio::time::timeout(self.read_timeout, read_line(&mut self.stream))
            .await
            .map_err(|_| ChannelError::Timeout)??;

        let Some(request) = request else {
            debug!(remote = %self.remote, "client closed before sending");
            return Ok(Exchange {
                peer: self.peer,
                sent: Vec::new(),
                received: Vec::new(),
            });
        };

        let reply = responder.respond(self.peer.as_ref(), &request).await;
        write_frame(self.stream.get_mut(), &reply).await?;
        let _ = self.stream.get_mut().shutdown().await;

        Ok(Exchange {
            peer: self.peer,
            sent: reply,
            received: request,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::Channel;
    use crate::tls::{ClientAuthPolicy, ClientTls, ServerVerification};
    use crate::CONNECT_TIMEOUT;
    use lodge_identity::{CredentialPaths, IssueRequest, issue};
    use rcgen::{BasicConstraints, CertificateParams, DnType, IsCa, Issuer, KeyPair};
    use rustls::pki_types::PrivatePkcs8KeyDer;
    use std::sync::Arc;
    use tempfile::TempDir;

    const TIMEOUT: Duration = Duration::from_secs(5);

    fn credentials(dir: &TempDir, name: &str) -> CredentialPaths {
        let out = dir.path().join(name);
        issue(&IssueRequest::new(name, &out)).unwrap();
        CredentialPaths::in_dir(out)
    }

    fn echo(peer: Option<&PeerIdentity>, request: &[u8]) -> Vec<u8> {
        let who = peer.map(|p| p.common_name.as_str()).unwrap_or("nobody");
        let mut reply = format!("{who}:").into_bytes();
        reply.extend_from_slice(request);
        reply
    }

    async fn serve_once(
        listener: Listener,
        responder: impl Responder + 'static,
    ) -> tokio::task::JoinHandle<Result<Exchange, ChannelError>> {
        tokio::spawn(async move {
            let conn = listener.accept().await?.handshake(TIMEOUT).await?;
            conn.receive_send(&responder).await
        })
    }

    #[tokio::test]
    async fn round_trip_with_identities() {
        let tmp = TempDir::new().unwrap();
        let server_paths = credentials(&tmp, "server");
        let client_paths = credentials(&tmp, "alice");

        let server_tls = ServerTls::load(&server_paths, &ClientAuthPolicy::RequireAny).unwrap();
        let listener = Listener::bind("127.0.0.1:0", &server_tls).await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let server = serve_once(listener, echo).await;

        let client_tls = ClientTls::load(&client_paths, &ServerVerification::Insecure).unwrap();
        let channel = Channel::connect(&addr, CONNECT_TIMEOUT, &client_tls)
            .await
            .unwrap();
        assert_eq!(channel.peer().unwrap().common_name, "server");

        let exchange = channel.send_receive(b"ping\n").await.unwrap();
        assert_eq!(exchange.received, b"alice:ping\n");
        assert_eq!(exchange.sent, b"ping\n");

        let server_side = server.await.unwrap().unwrap();
        assert_eq!(server_side.peer.unwrap().common_name, "alice");
        assert_eq!(server_side.received, b"ping\n");
    }

    #[tokio::test]
    async fn reads_until_sentinel() {
        let tmp = TempDir::new().unwrap();
        let server_paths = credentials(&tmp, "server");
        let client_paths = credentials(&tmp, "bob");

        let server_tls = ServerTls::load(&server_paths, &ClientAuthPolicy::RequireAny).unwrap();
        let listener = Listener::bind("127.0.0.1:0", &server_tls).await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let server = serve_once(listener, |_: Option<&PeerIdentity>, _: &[u8]| {
            b"line one\nline two\nDONE\n".to_vec()
        })
        .await;

        let client_tls = ClientTls::load(&client_paths, &ServerVerification::Insecure).unwrap();
        let exchange = Channel::connect(&addr, CONNECT_TIMEOUT, &client_tls)
            .await
            .unwrap()
            .send_receive_until(b"go", "DONE")
            .await
            .unwrap();

        assert_eq!(exchange.received_lines(), ["line one", "line two", "DONE"]);
        server.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn silent_client_times_out() {
        let tmp = TempDir::new().unwrap();
        let server_paths = credentials(&tmp, "server");
        let server_tls = ServerTls::load(&server_paths, &ClientAuthPolicy::RequireAny).unwrap();
        let listener = Listener::bind("127.0.0.1:0", &server_tls).await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            listener
                .accept()
                .await?
                .handshake(Duration::from_millis(200))
                .await
        });

        // Plain TCP, never starts TLS.
        let _tcp = TcpStream::connect(addr).await.unwrap();
        let result = server.await.unwrap();
        assert!(matches!(result, Err(ChannelError::Timeout)));
    }

    #[tokio::test]
    async fn strict_policy_accepts_chained_client() {
        let tmp = TempDir::new().unwrap();

        let ca_key = KeyPair::generate().unwrap();
        let mut ca_params = CertificateParams::default();
        ca_params
            .distinguished_name
            .push(DnType::CommonName, "Lodge Test CA");
        ca_params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        let ca_cert = ca_params.self_signed(&ca_key).unwrap();
        let issuer = Issuer::new(ca_params, ca_key);

        let client_key = KeyPair::generate().unwrap();
        let mut client_params = CertificateParams::default();
        client_params
            .distinguished_name
            .push(DnType::CommonName, "carol");
        client_params.is_ca = IsCa::NoCa;
        let client_cert = client_params.signed_by(&client_key, &issuer).unwrap();

        let pool = tmp.path().join("authority.pem");
        std::fs::write(&pool, ca_cert.pem()).unwrap();

        let server_paths = credentials(&tmp, "server");
        let server_tls =
            ServerTls::load(&server_paths, &ClientAuthPolicy::RequireAndVerify(pool)).unwrap();
        let listener = Listener::bind("127.0.0.1:0", &server_tls).await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let server = serve_once(listener, echo).await;

        let client_tls = ClientTls::new(
            vec![client_cert.der().clone()],
            PrivatePkcs8KeyDer::from(client_key.serialize_der()).into(),
            &ServerVerification::Insecure,
        )
        .unwrap();
        let exchange = Channel::connect(&addr, CONNECT_TIMEOUT, &client_tls)
            .await
            .unwrap()
            .send_receive(b"hi")
            .await
            .unwrap();
        assert_eq!(exchange.received, b"carol:hi\n");
        server.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn strict_policy_rejects_unknown_client() {
        let tmp = TempDir::new().unwrap();
        let server_paths = credentials(&tmp, "server");
        let client_paths = credentials(&tmp, "mallory");

        // Trust pool holds only the server's own certificate.
        let server_tls = ServerTls::load(
            &server_paths,
            &ClientAuthPolicy::RequireAndVerify(server_paths.cert.clone()),
        )
        .unwrap();
        let listener = Listener::bind("127.0.0.1:0", &server_tls).await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let server = serve_once(listener, echo).await;

        let client_tls = ClientTls::load(&client_paths, &ServerVerification::Insecure).unwrap();
        let outcome = match Channel::connect(&addr, CONNECT_TIMEOUT, &client_tls).await {
            Ok(channel) => channel.send_receive(b"hi").await,
            Err(e) => Err(e),
        };
        // TLS 1.3 may report the rejection only once the client reads.
        match outcome {
            Err(_) => {}
            Ok(exchange) => assert!(exchange.received.is_empty()),
        }
        assert!(server.await.unwrap().is_err());
    }

    #[tokio::test]
    async fn closure_responder_is_shareable() {
        let responder: Arc<dyn Responder> =
            Arc::new(|_: Option<&PeerIdentity>, req: &[u8]| req.to_ascii_uppercase());
        let reply = responder.respond(None, b"abc").await;
        assert_eq!(reply, b"ABC");
    }
}
