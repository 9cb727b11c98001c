//! The session only talks to the network through the [Connection] capability set, so it works
//!  the same on a direct QUIC connection and on an overlay transport like WebTransport.

pub mod endpoint;
pub mod memory;
pub mod quic;

use std::sync::Arc;

use async_trait::async_trait;
#[cfg(test)] use mockall::automock;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::sync::CancellationToken;

use crate::error::TerminationCode;
use crate::model::reason_phrase::ReasonPhrase;

pub type SendStream = Box<dyn AsyncWrite + Send + Unpin>;
pub type RecvStream = Box<dyn AsyncRead + Send + Unpin>;

pub struct BiStream {
    pub send: SendStream,
    pub recv: RecvStream,
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait Connection: Send + Sync + 'static {
    async fn open_bi(&self) -> anyhow::Result<BiStream>;
    async fn accept_bi(&self) -> anyhow::Result<BiStream>;
    async fn open_uni(&self) -> anyhow::Result<SendStream>;
    async fn accept_uni(&self) -> anyhow::Result<RecvStream>;

    /// true for transports layered on top of another protocol (e.g. WebTransport), where path and
    ///  authority are part of the outer protocol and must not be sent as setup parameters
    fn is_overlay(&self) -> bool;

    fn close_with_error(&self, code: TerminationCode, reason: &ReasonPhrase);

    fn remote_host(&self) -> String;

    /// cancelled when the connection is closed, by either side
    fn cancellation(&self) -> CancellationToken;
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait Listener: Send + Sync + 'static {
    /// Waits for the next incoming connection, `None` if the listener was shut down
    async fn accept(&self) -> anyhow::Result<Option<Arc<dyn Connection>>>;
}
