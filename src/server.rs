use std::sync::Arc;

use anyhow::anyhow;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::termination_of;
use crate::model::key_value_pair::KeyValuePair;
use crate::session::handshake::Handshake;
use crate::session::session::Session;
use crate::session::session_config::SessionConfig;
use crate::session::session_state::Role;
use crate::transport::{Connection, Listener};

pub struct Server {
    config: Arc<SessionConfig>,
}

impl Server {
    pub fn new(config: Arc<SessionConfig>) -> anyhow::Result<Server> {
        config.validate()?;
        Ok(Server { config })
    }

    pub fn config(&self) -> &Arc<SessionConfig> {
        &self.config
    }

    /// Creates the bounded queue that [Server::run] hands accepted connections off to
    pub fn connection_queue(&self) -> (mpsc::Sender<Arc<dyn Connection>>, mpsc::Receiver<Arc<dyn Connection>>) {
        mpsc::channel(self.config.connection_queue_size)
    }

    /// Accepts connections and hands them off through `connections` until `cancel` is triggered or
    ///  the listener shuts down. Blocks while the queue is full, so slow handlers throttle
    ///  admission of new connections. Failed accepts are logged and skipped.
    pub async fn run(&self, listener: Arc<dyn Listener>, connections: mpsc::Sender<Arc<dyn Connection>>, cancel: CancellationToken) -> anyhow::Result<()> {
        info!("accepting connections");
        loop {
            let accepted = tokio::select! {
                accepted = listener.accept() => accepted,
                _ = cancel.cancelled() => {
                    info!("shutting down accept loop");
                    return Ok(());
                }
            };

            let connection = match accepted {
                Ok(Some(connection)) => connection,
                Ok(None) => {
                    info!("listener was shut down");
                    return Ok(());
                }
                Err(e) => {
                    warn!("accepting connection failed: {:#}", e);
                    continue;
                }
            };

            debug!("accepted connection from {}", connection.remote_host());
            tokio::select! {
                sent = connections.send(connection) => {
                    sent.map_err(|_| anyhow!("connection handler is gone"))?;
                }
                _ = cancel.cancelled() => {
                    info!("shutting down accept loop");
                    return Ok(());
                }
            }
        }
    }

    /// Waits for the client's control stream and performs the server side of the handshake.
    ///  On failure the caller is responsible for closing the connection.
    pub async fn initiate_session(&self, connection: Arc<dyn Connection>, setup_params: Vec<KeyValuePair>) -> anyhow::Result<Session> {
        Handshake::new(Role::Server, connection, self.config.clone())
            .run(setup_params)
            .await
    }

    /// Runs the handshake for every connection from `connections` in a task of its own, passing
    ///  established sessions on to `sessions`. Connections whose handshake fails are closed with
    ///  the corresponding error code.
    pub async fn handle_connections(self: Arc<Self>, mut connections: mpsc::Receiver<Arc<dyn Connection>>, setup_params: Vec<KeyValuePair>, sessions: mpsc::Sender<Session>) {
        while let Some(connection) = connections.recv().await {
            let server = self.clone();
            let setup_params = setup_params.clone();
            let sessions = sessions.clone();

            tokio::spawn(async move {
                match server.initiate_session(connection.clone(), setup_params).await {
                    Ok(session) => {
                        if sessions.send(session).await.is_err() {
                            error!("no receiver for established session with {}", connection.remote_host());
                        }
                    }
                    Err(e) => {
                        let (code, reason) = termination_of(&e);
                        warn!("closing connection to {} with {:?}: {}", connection.remote_host(), code, reason);
                        connection.close_with_error(code, &reason);
                    }
                }
            });
        }
        debug!("connection queue closed");
    }
}
