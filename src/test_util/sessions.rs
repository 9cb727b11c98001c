use std::sync::Arc;

use crate::client::Client;
use crate::model::key_value_pair::KeyValuePair;
use crate::server::Server;
use crate::session::session::Session;
use crate::session::session_config::SessionConfig;
use crate::transport::memory::MemoryConnection;

/// Both ends of an established session over an in-memory transport
pub struct SessionPair {
    pub client: Session,
    pub server: Session,
    pub client_connection: Arc<MemoryConnection>,
    pub server_connection: Arc<MemoryConnection>,
}

pub async fn connected_sessions(config: Arc<SessionConfig>, client_params: Vec<KeyValuePair>, server_params: Vec<KeyValuePair>) -> anyhow::Result<SessionPair> {
    let (client_connection, server_connection) = MemoryConnection::pair(false, 1);

    let client = Client::new(config.clone())?;
    let server = Server::new(config)?;
    let (client_session, server_session) = tokio::join!(
        client.initiate_session(client_connection.clone(), client_params),
        server.initiate_session(server_connection.clone(), server_params),
    );

    Ok(SessionPair {
        client: client_session?,
        server: server_session?,
        client_connection,
        server_connection,
    })
}
