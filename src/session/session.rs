use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::control::control_message::ControlMessage;
use crate::control::control_stream::ControlStream;
use crate::control::request_id::RequestsBlocked;
use crate::error::{termination_of, MoqtError, Result, TerminationCode};
use crate::model::reason_phrase::ReasonPhrase;
use crate::session::session_config::SessionConfig;
use crate::session::session_state::SessionState;
use crate::transport::Connection;

/// An established session: the transport connection, its control stream and the negotiated state
pub struct Session {
    connection: Arc<dyn Connection>,
    control_stream: ControlStream,
    state: SessionState,
    config: Arc<SessionConfig>,
}

impl Session {
    pub(crate) fn new(connection: Arc<dyn Connection>, control_stream: ControlStream, state: SessionState, config: Arc<SessionConfig>) -> Session {
        Session {
            connection,
            control_stream,
            state,
            config,
        }
    }

    pub fn connection(&self) -> &Arc<dyn Connection> {
        &self.connection
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Sends a control message. If it can not be written within the configured timeout, the
    ///  control stream may hold a partial frame, so the session is closed with
    ///  CONTROL_MESSAGE_TIMEOUT.
    pub async fn send_control_message(&self, msg: &ControlMessage) -> Result<()> {
        let timeout = self.config.control_message_timeout;
        match tokio::time::timeout(timeout, self.control_stream.write_control_message(msg)).await {
            Ok(result) => result,
            Err(_) => {
                let err = anyhow::Error::from(MoqtError::Timeout(timeout))
                    .context(format!("sending {:?}", msg.message_type()));
                self.close_with_error(&err);
                Err(MoqtError::Timeout(timeout))
            }
        }
    }

    /// Waits for the next control message. Fails if the connection is closed while waiting.
    pub async fn recv_control_message(&self) -> anyhow::Result<ControlMessage> {
        let cancel = self.connection.cancellation();
        tokio::select! {
            msg = self.control_stream.read_control_message() => Ok(msg?),
            _ = cancel.cancelled() => Err(anyhow::anyhow!("connection to {} was closed", self.connection.remote_host())),
        }
    }

    /// Applies a control message received after the handshake
    pub async fn handle_control_message(&self, msg: ControlMessage) -> Result<()> {
        match &msg {
            ControlMessage::MaxRequestId(m) => {
                debug!("peer raised request id limit to {}", m.request_id);
                self.state.on_max_request_id(m.request_id).await
            }
            ControlMessage::RequestsBlocked(m) => {
                info!("peer {} is blocked on request id limit {}", self.connection.remote_host(), m.maximum_request_id);
                Ok(())
            }
            ControlMessage::ClientSetup(_) | ControlMessage::ServerSetup(_) => {
                Err(MoqtError::protocol_violation(format!("unexpected {:?} after the handshake", msg.message_type())))
            }
        }
    }

    /// Reads and applies control messages until the connection is closed or a message violates
    ///  the protocol. In the latter case, the connection is closed with the corresponding error.
    pub async fn process_control_messages(&self) -> anyhow::Result<()> {
        let cancel = self.connection.cancellation();
        loop {
            let msg = tokio::select! {
                msg = self.control_stream.read_control_message() => msg,
                _ = cancel.cancelled() => {
                    debug!("connection to {} closed, stopping control message processing", self.connection.remote_host());
                    return Ok(());
                }
            };

            let result = match msg {
                Ok(msg) => self.handle_control_message(msg).await,
                Err(e) => Err(e),
            };
            if let Err(e) = result {
                let err = anyhow::Error::from(e).context("processing control messages");
                self.close_with_error(&err);
                return Err(err);
            }
        }
    }

    /// Returns a new request id. If the peer's limit is reached, REQUESTS_BLOCKED is sent and
    ///  `None` is returned.
    pub async fn new_request_id(&self) -> Result<Option<u64>> {
        if let Some(id) = self.state.allocate_request_id().await {
            return Ok(Some(id));
        }

        let maximum_request_id = self.state.max_outgoing_request_id().await;
        debug!("blocked on peer's request id limit {}", maximum_request_id);
        self.send_control_message(&RequestsBlocked { maximum_request_id }.into()).await?;
        Ok(None)
    }

    /// Raises the limit for request ids the peer may use, notifying the peer
    pub async fn grant_request_ids(&self, max_request_id: u64) -> Result<()> {
        if let Some(msg) = self.state.grant_incoming_request_ids(max_request_id).await {
            self.send_control_message(&msg.into()).await?;
        }
        Ok(())
    }

    /// Terminates the session with the code corresponding to `err`
    pub fn close_with_error(&self, err: &anyhow::Error) {
        let (code, reason) = termination_of(err);
        warn!("closing session with {} with {:?}: {}", self.connection.remote_host(), code, reason);
        self.connection.close_with_error(code, &reason);
    }

    pub fn close(&self) {
        self.connection.close_with_error(TerminationCode::NoError, &ReasonPhrase::default());
    }
}
