use std::sync::Arc;

use tracing::info;

use crate::model::key_value_pair::KeyValuePair;
use crate::session::handshake::Handshake;
use crate::session::session::Session;
use crate::session::session_config::SessionConfig;
use crate::session::session_state::Role;
use crate::transport::Connection;

pub struct Client {
    config: Arc<SessionConfig>,
}

impl Client {
    pub fn new(config: Arc<SessionConfig>) -> anyhow::Result<Client> {
        config.validate()?;
        Ok(Client { config })
    }

    /// Opens the control stream on an established transport connection and performs the
    ///  handshake. On failure the caller is responsible for closing the connection, see
    ///  [crate::error::termination_of].
    pub async fn initiate_session(&self, connection: Arc<dyn Connection>, setup_params: Vec<KeyValuePair>) -> anyhow::Result<Session> {
        info!("initiating session with {}", connection.remote_host());
        Handshake::new(Role::Client, connection, self.config.clone())
            .run(setup_params)
            .await
    }
}
