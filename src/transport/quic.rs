//! [Connection] on top of a direct QUIC connection. Establishing the connection (TLS, ALPN,
//!  certificates) is up to the application, this only wraps the result.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use quinn::VarInt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{MoqtError, TerminationCode};
use crate::model::reason_phrase::ReasonPhrase;
use crate::transport::{BiStream, Connection, Listener, RecvStream, SendStream};

/// The session uses a single bidirectional stream, the control stream. Opening a second one is
///  refused with a protocol violation instead of waiting for the peer's stream limit.
pub struct QuicConnection {
    conn: quinn::Connection,
    control_stream_opened: AtomicBool,
    cancel: CancellationToken,
}

impl QuicConnection {
    /// Must be called from within a tokio runtime: the connection's lifetime is tracked by a
    ///  background task that cancels [Connection::cancellation] when the connection closes.
    pub fn new(conn: quinn::Connection) -> QuicConnection {
        let cancel = CancellationToken::new();

        let watched = conn.clone();
        let on_close = cancel.clone();
        tokio::spawn(async move {
            let reason = watched.closed().await;
            debug!("connection to {} closed: {}", watched.remote_address(), reason);
            on_close.cancel();
        });

        QuicConnection {
            conn,
            control_stream_opened: AtomicBool::new(false),
            cancel,
        }
    }
}

#[async_trait]
impl Connection for QuicConnection {
    async fn open_bi(&self) -> anyhow::Result<BiStream> {
        if self.control_stream_opened.swap(true, Ordering::AcqRel) {
            return Err(MoqtError::protocol_violation(format!(
                "a control stream to {} is already open", self.conn.remote_address())).into());
        }

        let (send, recv) = match self.conn.open_bi().await {
            Ok(stream) => stream,
            Err(e) => {
                self.control_stream_opened.store(false, Ordering::Release);
                return Err(e).context("opening bidirectional stream");
            }
        };
        debug!("opened bidirectional stream to {}", self.conn.remote_address());
        Ok(BiStream {
            send: Box::new(send),
            recv: Box::new(recv),
        })
    }

    async fn accept_bi(&self) -> anyhow::Result<BiStream> {
        let (send, recv) = self.conn.accept_bi().await
            .context("accepting bidirectional stream")?;
        Ok(BiStream {
            send: Box::new(send),
            recv: Box::new(recv),
        })
    }

    async fn open_uni(&self) -> anyhow::Result<SendStream> {
        let send = self.conn.open_uni().await
            .context("opening unidirectional stream")?;
        Ok(Box::new(send))
    }

    async fn accept_uni(&self) -> anyhow::Result<RecvStream> {
        let recv = self.conn.accept_uni().await
            .context("accepting unidirectional stream")?;
        Ok(Box::new(recv))
    }

    fn is_overlay(&self) -> bool {
        false
    }

    fn close_with_error(&self, code: TerminationCode, reason: &ReasonPhrase) {
        // termination codes are far below the varint limit
        let code = VarInt::from_u32(u64::from(code) as u32);
        self.conn.close(code, reason.as_str().as_bytes());
        self.cancel.cancel();
    }

    fn remote_host(&self) -> String {
        self.conn.remote_address().ip().to_string()
    }

    fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

pub struct QuicListener {
    endpoint: quinn::Endpoint,
}

impl QuicListener {
    pub fn new(endpoint: quinn::Endpoint) -> QuicListener {
        QuicListener { endpoint }
    }
}

#[async_trait]
impl Listener for QuicListener {
    async fn accept(&self) -> anyhow::Result<Option<Arc<dyn Connection>>> {
        let Some(incoming) = self.endpoint.accept().await else {
            return Ok(None);
        };

        let remote = incoming.remote_address();
        match incoming.await {
            Ok(conn) => Ok(Some(Arc::new(QuicConnection::new(conn)))),
            Err(e) => {
                warn!("handshake with {} failed: {}", remote, e);
                Err(e).with_context(|| format!("accepting connection from {}", remote))
            }
        }
    }
}

#[cfg(test)]
mod test {
    use std::net::SocketAddr;

    use rustls::pki_types::{CertificateDer, PrivatePkcs8KeyDer};
    use rustls::RootCertStore;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    use super::*;

    /// a server endpoint with a self-signed certificate on the loopback interface, and a client
    ///  endpoint trusting it
    fn loopback_endpoints() -> (quinn::Endpoint, quinn::Endpoint) {
        let cert = rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
        let cert_der = CertificateDer::from(cert.cert);
        let key = PrivatePkcs8KeyDer::from(cert.key_pair.serialize_der());

        let server_config = quinn::ServerConfig::with_single_cert(vec![cert_der.clone()], key.into()).unwrap();
        let server = quinn::Endpoint::server(server_config, SocketAddr::from(([127, 0, 0, 1], 0))).unwrap();

        let mut roots = RootCertStore::empty();
        roots.add(cert_der).unwrap();
        let mut client = quinn::Endpoint::client(SocketAddr::from(([127, 0, 0, 1], 0))).unwrap();
        client.set_default_client_config(quinn::ClientConfig::with_root_certificates(Arc::new(roots)).unwrap());

        (server, client)
    }

    async fn connect(server: &quinn::Endpoint, client: &quinn::Endpoint) -> (quinn::Connection, quinn::Connection) {
        let server_addr = server.local_addr().unwrap();
        let (client_conn, server_conn) = tokio::join!(
            async { client.connect(server_addr, "localhost").unwrap().await.unwrap() },
            async { server.accept().await.unwrap().await.unwrap() },
        );
        (client_conn, server_conn)
    }

    #[tokio::test]
    async fn test_control_stream_over_listener() {
        let (server, client) = loopback_endpoints();
        let server_addr = server.local_addr().unwrap();
        let listener = QuicListener::new(server);

        let (client_conn, accepted) = tokio::join!(
            async { client.connect(server_addr, "localhost").unwrap().await.unwrap() },
            listener.accept(),
        );
        let client_conn = QuicConnection::new(client_conn);
        let server_conn = accepted.unwrap().unwrap();
        assert!(!server_conn.is_overlay());
        assert_eq!(server_conn.remote_host(), "127.0.0.1");

        let mut stream = client_conn.open_bi().await.unwrap();
        stream.send.write_all(b"hello").await.unwrap();
        stream.send.flush().await.unwrap();

        let mut accepted = server_conn.accept_bi().await.unwrap();
        let mut buf = [0u8; 5];
        accepted.recv.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"hello");
    }

    #[tokio::test]
    async fn test_second_control_stream_is_refused() {
        let (server, client) = loopback_endpoints();
        let (client_conn, _server_conn) = connect(&server, &client).await;
        let conn = QuicConnection::new(client_conn);

        let _control = conn.open_bi().await.unwrap();
        let err = conn.open_bi().await.err().unwrap();
        let err = err.downcast_ref::<MoqtError>().unwrap();
        assert!(err.is_protocol_violation());
        assert_eq!(err.code(), TerminationCode::ProtocolViolation);
    }

    #[tokio::test]
    async fn test_close_with_error_reaches_peer() {
        let (server, client) = loopback_endpoints();
        let (client_conn, server_conn) = connect(&server, &client).await;
        let client_conn = QuicConnection::new(client_conn);
        let peer = QuicConnection::new(server_conn.clone());

        client_conn.close_with_error(TerminationCode::ControlMessageTimeout, &ReasonPhrase::new("too slow").unwrap());
        assert!(client_conn.cancellation().is_cancelled());

        match server_conn.closed().await {
            quinn::ConnectionError::ApplicationClosed(close) => {
                assert_eq!(close.error_code, VarInt::from_u32(0x11));
                assert_eq!(close.reason.as_ref(), b"too slow");
            }
            other => panic!("unexpected {:?}", other),
        }
        peer.cancellation().cancelled().await;
    }
}
