use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use tracing::{debug, info, instrument, warn};

use crate::control::control_message::ControlMessage;
use crate::control::control_stream::ControlStream;
use crate::control::setup::{ClientSetup, ServerSetup, SetupParameter};
use crate::error::{MoqtError, Result, TerminationCode};
use crate::model::key_value_pair::KeyValuePair;
use crate::session::session::Session;
use crate::session::session_config::SessionConfig;
use crate::session::session_state::{Role, SessionState};
use crate::transport::Connection;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum HandshakeState {
    Idle,
    StreamOpening,
    AwaitingPeerSetup,
    Established,
    Failed,
}

/// Drives the setup message exchange for one side of a connection. The client opens the control
///  stream and sends CLIENT_SETUP, the server accepts the stream and answers with SERVER_SETUP.
///
/// There are no retries: any failure is final, and it is up to the caller to close the connection
///  (see [crate::error::termination_of]).
pub struct Handshake {
    role: Role,
    connection: Arc<dyn Connection>,
    config: Arc<SessionConfig>,
    state: HandshakeState,
}

impl Handshake {
    pub fn new(role: Role, connection: Arc<dyn Connection>, config: Arc<SessionConfig>) -> Handshake {
        Handshake {
            role,
            connection,
            config,
            state: HandshakeState::Idle,
        }
    }

    pub fn state(&self) -> HandshakeState {
        self.state
    }

    #[instrument(name = "handshake", skip_all, fields(role = ?self.role, remote = %self.connection.remote_host()))]
    pub async fn run(&mut self, params: Vec<KeyValuePair>) -> anyhow::Result<Session> {
        if self.state != HandshakeState::Idle {
            bail!("handshake was already started, state is {:?}", self.state);
        }

        let result = match self.role {
            Role::Client => self.run_client(params).await,
            Role::Server => self.run_server(params).await,
        };

        match &result {
            Ok(_) => {
                self.transition(HandshakeState::Established);
                info!("session with {} established", self.connection.remote_host());
            }
            Err(e) => {
                self.transition(HandshakeState::Failed);
                warn!("handshake with {} failed: {:#}", self.connection.remote_host(), e);
            }
        }
        result
    }

    async fn run_client(&mut self, params: Vec<KeyValuePair>) -> anyhow::Result<Session> {
        self.check_overlay_params(&params)
            .context("validating CLIENT_SETUP parameters")?;
        let params = self.with_configured_limits(params)?;

        self.transition(HandshakeState::StreamOpening);
        let stream = with_timeout_anyhow(self.config.open_stream_timeout, self.connection.open_bi()).await
            .context("opening control stream")?;
        debug!("opened control stream");
        let control_stream = ControlStream::new(stream, self.config.max_control_message_len);

        let state = SessionState::new(Role::Client, self.config.max_incoming_request_id, self.config.local_token_cache_size);
        state.apply_local_params(&params).await;

        let setup: ControlMessage = ClientSetup::new(params).into();
        with_timeout(self.config.control_message_timeout, control_stream.write_control_message(&setup)).await
            .context("sending CLIENT_SETUP")?;

        self.transition(HandshakeState::AwaitingPeerSetup);
        let server_setup = match with_timeout(self.config.control_message_timeout, control_stream.read_control_message()).await
            .context("reading SERVER_SETUP")?
        {
            ControlMessage::ServerSetup(server_setup) => server_setup,
            other => {
                return Err(MoqtError::protocol_violation(format!("expected SERVER_SETUP, got {:?}", other.message_type())))
                    .context("reading SERVER_SETUP");
            }
        };
        debug!("received SERVER_SETUP with {} parameters", server_setup.parameters.len());

        if SetupParameter::Path.is_present(&server_setup.parameters) {
            return Err(MoqtError::violation(TerminationCode::InvalidPath, "server sent PATH in SERVER_SETUP"))
                .context("validating SERVER_SETUP");
        }
        if SetupParameter::Authority.is_present(&server_setup.parameters) {
            return Err(MoqtError::violation(TerminationCode::InvalidAuthority, "server sent AUTHORITY in SERVER_SETUP"))
                .context("validating SERVER_SETUP");
        }
        state.apply_peer_params(&server_setup.parameters).await;

        Ok(Session::new(self.connection.clone(), control_stream, state, self.config.clone()))
    }

    async fn run_server(&mut self, params: Vec<KeyValuePair>) -> anyhow::Result<Session> {
        self.check_overlay_params(&params)
            .context("validating SERVER_SETUP parameters")?;
        if SetupParameter::Path.is_present(&params) || SetupParameter::Authority.is_present(&params) {
            return Err(MoqtError::protocol_violation("PATH and AUTHORITY must not be sent in SERVER_SETUP"))
                .context("validating SERVER_SETUP parameters");
        }
        let params = self.with_configured_limits(params)?;

        self.transition(HandshakeState::StreamOpening);
        let stream = with_timeout_anyhow(self.config.control_stream_timeout, self.connection.accept_bi()).await
            .context("accepting control stream")?;
        debug!("accepted control stream");
        let control_stream = ControlStream::new(stream, self.config.max_control_message_len);

        self.transition(HandshakeState::AwaitingPeerSetup);
        let client_setup = match with_timeout(self.config.control_message_timeout, control_stream.read_control_message()).await
            .context("reading CLIENT_SETUP")?
        {
            ControlMessage::ClientSetup(client_setup) => client_setup,
            other => {
                return Err(MoqtError::protocol_violation(format!("expected CLIENT_SETUP, got {:?}", other.message_type())))
                    .context("reading CLIENT_SETUP");
            }
        };
        debug!("received CLIENT_SETUP with {} parameters", client_setup.parameters.len());

        if self.connection.is_overlay() {
            check_no_path_or_authority(&client_setup.parameters)
                .context("validating CLIENT_SETUP")?;
        }

        let state = SessionState::new(Role::Server, self.config.max_incoming_request_id, self.config.local_token_cache_size);
        state.apply_peer_params(&client_setup.parameters).await;

        let setup: ControlMessage = ServerSetup::new(params.clone()).into();
        with_timeout(self.config.control_message_timeout, control_stream.write_control_message(&setup)).await
            .context("sending SERVER_SETUP")?;
        state.apply_local_params(&params).await;

        Ok(Session::new(self.connection.clone(), control_stream, state, self.config.clone()))
    }

    fn check_overlay_params(&self, params: &[KeyValuePair]) -> Result<()> {
        if self.connection.is_overlay() {
            check_no_path_or_authority(params)?;
        }
        Ok(())
    }

    /// Adds MAX_REQUEST_ID and MAX_AUTH_TOKEN_CACHE_SIZE from the configuration unless the
    ///  parameters contain them already, so the peer sees the limits our session state enforces
    fn with_configured_limits(&self, mut params: Vec<KeyValuePair>) -> Result<Vec<KeyValuePair>> {
        if !SetupParameter::MaxRequestId.is_present(&params) && self.config.max_incoming_request_id > 0 {
            params.push(SetupParameter::MaxRequestId.int(self.config.max_incoming_request_id)?);
        }
        if !SetupParameter::MaxAuthTokenCacheSize.is_present(&params) && self.config.local_token_cache_size > 0 {
            params.push(SetupParameter::MaxAuthTokenCacheSize.int(self.config.local_token_cache_size)?);
        }
        Ok(params)
    }

    fn transition(&mut self, to: HandshakeState) {
        debug!("handshake state {:?} -> {:?}", self.state, to);
        self.state = to;
    }
}

/// PATH and AUTHORITY are part of the outer protocol on overlay transports
fn check_no_path_or_authority(params: &[KeyValuePair]) -> Result<()> {
    if SetupParameter::Path.is_present(params) || SetupParameter::Authority.is_present(params) {
        return Err(MoqtError::protocol_violation("PATH and AUTHORITY must be omitted on an overlay transport"));
    }
    Ok(())
}

async fn with_timeout<T>(timeout: Duration, f: impl Future<Output = Result<T>>) -> Result<T> {
    tokio::time::timeout(timeout, f).await
        .map_err(|_| MoqtError::Timeout(timeout))?
}

async fn with_timeout_anyhow<T>(timeout: Duration, f: impl Future<Output = anyhow::Result<T>>) -> anyhow::Result<T> {
    match tokio::time::timeout(timeout, f).await {
        Ok(result) => result,
        Err(_) => Err(MoqtError::Timeout(timeout).into()),
    }
}
