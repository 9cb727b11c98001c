//! In-process transport: a pair of connected [MemoryConnection]s backed by
//!  [tokio::io::duplex] pipes. Useful for tests and for embedding client and server in one process.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::anyhow;
use async_trait::async_trait;
use tokio::io::{duplex, split};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{MoqtError, TerminationCode};
use crate::model::reason_phrase::ReasonPhrase;
use crate::transport::{BiStream, Connection, Listener, RecvStream, SendStream};

const PIPE_BUFFER_SIZE: usize = 64 * 1024;
const STREAM_QUEUE_SIZE: usize = 16;

type CloseReason = Arc<Mutex<Option<(TerminationCode, ReasonPhrase)>>>;

pub struct MemoryConnection {
    remote_host: String,
    overlay: bool,
    max_bidi_streams: usize,
    num_opened_bidi: AtomicUsize,
    bidi_to_peer: mpsc::Sender<BiStream>,
    bidi_from_peer: tokio::sync::Mutex<mpsc::Receiver<BiStream>>,
    uni_to_peer: mpsc::Sender<RecvStream>,
    uni_from_peer: tokio::sync::Mutex<mpsc::Receiver<RecvStream>>,
    close_reason: CloseReason,
    cancel: CancellationToken,
}

impl MemoryConnection {
    /// Creates two connected endpoints, the first one for the client side and the second one for
    ///  the server side. Each side may open at most `max_bidi_streams` bidirectional streams.
    pub fn pair(overlay: bool, max_bidi_streams: usize) -> (Arc<MemoryConnection>, Arc<MemoryConnection>) {
        let (bidi_c2s_tx, bidi_c2s_rx) = mpsc::channel(STREAM_QUEUE_SIZE);
        let (bidi_s2c_tx, bidi_s2c_rx) = mpsc::channel(STREAM_QUEUE_SIZE);
        let (uni_c2s_tx, uni_c2s_rx) = mpsc::channel(STREAM_QUEUE_SIZE);
        let (uni_s2c_tx, uni_s2c_rx) = mpsc::channel(STREAM_QUEUE_SIZE);
        let close_reason: CloseReason = Default::default();
        let cancel = CancellationToken::new();

        let client = MemoryConnection {
            remote_host: "server.memory".to_string(),
            overlay,
            max_bidi_streams,
            num_opened_bidi: AtomicUsize::new(0),
            bidi_to_peer: bidi_c2s_tx,
            bidi_from_peer: tokio::sync::Mutex::new(bidi_s2c_rx),
            uni_to_peer: uni_c2s_tx,
            uni_from_peer: tokio::sync::Mutex::new(uni_s2c_rx),
            close_reason: close_reason.clone(),
            cancel: cancel.clone(),
        };
        let server = MemoryConnection {
            remote_host: "client.memory".to_string(),
            overlay,
            max_bidi_streams,
            num_opened_bidi: AtomicUsize::new(0),
            bidi_to_peer: bidi_s2c_tx,
            bidi_from_peer: tokio::sync::Mutex::new(bidi_c2s_rx),
            uni_to_peer: uni_s2c_tx,
            uni_from_peer: tokio::sync::Mutex::new(uni_c2s_rx),
            close_reason,
            cancel,
        };
        (Arc::new(client), Arc::new(server))
    }

    /// The code and reason the connection was closed with, if it was closed with an error
    pub fn close_reason(&self) -> Option<(TerminationCode, ReasonPhrase)> {
        self.close_reason.lock()
            .ok()
            .and_then(|r| r.clone())
    }

    fn check_open(&self) -> anyhow::Result<()> {
        if self.cancel.is_cancelled() {
            return Err(anyhow!("connection to {} is closed", self.remote_host));
        }
        Ok(())
    }
}

#[async_trait]
impl Connection for MemoryConnection {
    async fn open_bi(&self) -> anyhow::Result<BiStream> {
        self.check_open()?;
        if self.num_opened_bidi.fetch_add(1, Ordering::AcqRel) >= self.max_bidi_streams {
            self.num_opened_bidi.fetch_sub(1, Ordering::AcqRel);
            return Err(MoqtError::protocol_violation(format!("no more than {} bidirectional streams allowed", self.max_bidi_streams)).into());
        }

        let (local, remote) = duplex(PIPE_BUFFER_SIZE);
        let (local_recv, local_send) = split(local);
        let (remote_recv, remote_send) = split(remote);
        self.bidi_to_peer.send(BiStream {
            send: Box::new(remote_send),
            recv: Box::new(remote_recv),
        }).await
            .map_err(|_| anyhow!("peer {} is gone", self.remote_host))?;

        debug!("opened bidirectional stream to {}", self.remote_host);
        Ok(BiStream {
            send: Box::new(local_send),
            recv: Box::new(local_recv),
        })
    }

    async fn accept_bi(&self) -> anyhow::Result<BiStream> {
        self.check_open()?;
        let mut incoming = self.bidi_from_peer.lock().await;
        tokio::select! {
            stream = incoming.recv() => stream.ok_or_else(|| anyhow!("peer {} is gone", self.remote_host)),
            _ = self.cancel.cancelled() => Err(anyhow!("connection to {} was closed", self.remote_host)),
        }
    }

    async fn open_uni(&self) -> anyhow::Result<SendStream> {
        self.check_open()?;
        let (local, remote) = duplex(PIPE_BUFFER_SIZE);
        let (_, local_send) = split(local);
        let (remote_recv, _) = split(remote);
        self.uni_to_peer.send(Box::new(remote_recv)).await
            .map_err(|_| anyhow!("peer {} is gone", self.remote_host))?;
        Ok(Box::new(local_send))
    }

    async fn accept_uni(&self) -> anyhow::Result<RecvStream> {
        self.check_open()?;
        let mut incoming = self.uni_from_peer.lock().await;
        tokio::select! {
            stream = incoming.recv() => stream.ok_or_else(|| anyhow!("peer {} is gone", self.remote_host)),
            _ = self.cancel.cancelled() => Err(anyhow!("connection to {} was closed", self.remote_host)),
        }
    }

    fn is_overlay(&self) -> bool {
        self.overlay
    }

    fn close_with_error(&self, code: TerminationCode, reason: &ReasonPhrase) {
        debug!("closing connection to {} with {:?}: {}", self.remote_host, code, reason);
        if let Ok(mut close_reason) = self.close_reason.lock() {
            if close_reason.is_none() {
                *close_reason = Some((code, reason.clone()));
            }
        }
        self.cancel.cancel();
    }

    fn remote_host(&self) -> String {
        self.remote_host.clone()
    }

    fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

/// Hands out server-side [MemoryConnection]s that were registered through [MemoryListener::connect]
pub struct MemoryListener {
    overlay: bool,
    max_bidi_streams: usize,
    incoming_tx: mpsc::Sender<Arc<dyn Connection>>,
    incoming_rx: tokio::sync::Mutex<mpsc::Receiver<Arc<dyn Connection>>>,
}

impl MemoryListener {
    pub fn new(overlay: bool, max_bidi_streams: usize) -> MemoryListener {
        let (incoming_tx, incoming_rx) = mpsc::channel(STREAM_QUEUE_SIZE);
        MemoryListener {
            overlay,
            max_bidi_streams,
            incoming_tx,
            incoming_rx: tokio::sync::Mutex::new(incoming_rx),
        }
    }

    /// Creates a connection pair, queues the server side for [Listener::accept] and returns the
    ///  client side
    pub async fn connect(&self) -> anyhow::Result<Arc<MemoryConnection>> {
        let (client, server) = MemoryConnection::pair(self.overlay, self.max_bidi_streams);
        let server: Arc<dyn Connection> = server;
        self.incoming_tx.send(server).await
            .map_err(|_| anyhow!("listener was shut down"))?;
        Ok(client)
    }
}

#[async_trait]
impl Listener for MemoryListener {
    async fn accept(&self) -> anyhow::Result<Option<Arc<dyn Connection>>> {
        Ok(self.incoming_rx.lock().await.recv().await)
    }
}
