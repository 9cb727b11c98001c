use tokio::sync::{Mutex, RwLock};
use tracing::debug;

use crate::control::request_id::MaxRequestId;
use crate::control::setup::SetupParameter;
use crate::error::{MoqtError, Result, TerminationCode};
use crate::model::key_value_pair::KeyValuePair;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Role {
    Client,
    Server,
}

impl Role {
    /// Clients use even request ids, servers odd ones
    pub fn first_request_id(self) -> u64 {
        match self {
            Role::Client => 0,
            Role::Server => 1,
        }
    }

    pub fn peer(self) -> Role {
        match self {
            Role::Client => Role::Server,
            Role::Server => Role::Client,
        }
    }
}

#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct SessionMetadata {
    pub peer_implementation: String,
    /// as sent by the client, i.e. our own for a client session and the peer's for a server
    pub path: String,
    pub authority: String,
}

#[derive(Debug)]
struct RequestIds {
    next_outgoing: u64,
    /// limit imposed on us by the peer
    max_outgoing: u64,
    /// limit we impose on the peer
    max_incoming: u64,
    next_incoming: u64,
}

#[derive(Debug)]
struct TokenCache {
    peer_max_size: u64,
    local_size: u64,
    used_at_peer: u64,
}

/// Negotiated per-session state. Request ids are numbered with a role-specific parity and always
///  advance by two, and both directions are limited by the respective MAX_REQUEST_ID.
#[derive(Debug)]
pub struct SessionState {
    local_role: Role,
    metadata: RwLock<SessionMetadata>,
    request_ids: Mutex<RequestIds>,
    token_cache: Mutex<TokenCache>,
}

impl SessionState {
    pub fn new(local_role: Role, max_incoming_request_id: u64, local_token_cache_size: u64) -> SessionState {
        SessionState {
            local_role,
            metadata: Default::default(),
            request_ids: Mutex::new(RequestIds {
                next_outgoing: local_role.first_request_id(),
                max_outgoing: 0,
                max_incoming: max_incoming_request_id,
                next_incoming: local_role.peer().first_request_id(),
            }),
            token_cache: Mutex::new(TokenCache {
                peer_max_size: 0,
                local_size: local_token_cache_size,
                used_at_peer: 0,
            }),
        }
    }

    pub fn local_role(&self) -> Role {
        self.local_role
    }

    /// Takes over the values from the setup parameters we send to the peer
    pub async fn apply_local_params(&self, params: &[KeyValuePair]) {
        for param in params {
            match SetupParameter::try_from(param.type_id()) {
                Ok(SetupParameter::Path) => self.metadata.write().await.path = bytes_to_string(param),
                Ok(SetupParameter::Authority) => self.metadata.write().await.authority = bytes_to_string(param),
                Ok(SetupParameter::MaxRequestId) => if let Some(v) = param.as_int() {
                    self.request_ids.lock().await.max_incoming = v;
                },
                Ok(SetupParameter::MaxAuthTokenCacheSize) => if let Some(v) = param.as_int() {
                    self.token_cache.lock().await.local_size = v;
                },
                _ => {}
            }
        }
    }

    /// Takes over the values from the setup parameters received from the peer. Unknown parameters
    ///  are ignored.
    pub async fn apply_peer_params(&self, params: &[KeyValuePair]) {
        for param in params {
            match SetupParameter::try_from(param.type_id()) {
                Ok(SetupParameter::Implementation) => self.metadata.write().await.peer_implementation = bytes_to_string(param),
                Ok(SetupParameter::Path) => self.metadata.write().await.path = bytes_to_string(param),
                Ok(SetupParameter::Authority) => self.metadata.write().await.authority = bytes_to_string(param),
                Ok(SetupParameter::MaxRequestId) => if let Some(v) = param.as_int() {
                    self.request_ids.lock().await.max_outgoing = v;
                },
                Ok(SetupParameter::MaxAuthTokenCacheSize) => if let Some(v) = param.as_int() {
                    self.token_cache.lock().await.peer_max_size = v;
                },
                Ok(SetupParameter::AuthToken) => {
                    debug!("ignoring AUTH_TOKEN setup parameter");
                }
                Err(_) => {
                    debug!("ignoring unknown setup parameter {:#x}", param.type_id());
                }
            }
        }
    }

    pub async fn metadata(&self) -> SessionMetadata {
        self.metadata.read().await.clone()
    }

    pub async fn next_outgoing_request_id(&self) -> u64 {
        self.request_ids.lock().await.next_outgoing
    }

    pub async fn max_outgoing_request_id(&self) -> u64 {
        self.request_ids.lock().await.max_outgoing
    }

    pub async fn max_incoming_request_id(&self) -> u64 {
        self.request_ids.lock().await.max_incoming
    }

    /// Returns the id for a new outgoing request, or `None` if the peer's limit is reached
    pub async fn allocate_request_id(&self) -> Option<u64> {
        let mut ids = self.request_ids.lock().await;
        if ids.next_outgoing >= ids.max_outgoing {
            return None;
        }
        let result = ids.next_outgoing;
        ids.next_outgoing += 2;
        Some(result)
    }

    /// Applies a MAX_REQUEST_ID received from the peer, which must raise the limit
    pub async fn on_max_request_id(&self, max_request_id: u64) -> Result<()> {
        let mut ids = self.request_ids.lock().await;
        if max_request_id <= ids.max_outgoing {
            return Err(MoqtError::protocol_violation(format!(
                "MAX_REQUEST_ID {} does not increase the current limit {}", max_request_id, ids.max_outgoing)));
        }
        ids.max_outgoing = max_request_id;
        Ok(())
    }

    /// Checks the request id of a request received from the peer and registers it as used
    pub async fn check_incoming_request_id(&self, request_id: u64) -> Result<()> {
        let mut ids = self.request_ids.lock().await;
        if request_id != ids.next_incoming {
            return Err(MoqtError::violation(TerminationCode::InvalidRequestId, format!(
                "expected request id {}, got {}", ids.next_incoming, request_id)));
        }
        if request_id >= ids.max_incoming {
            return Err(MoqtError::violation(TerminationCode::TooManyRequests, format!(
                "request id {} exceeds the limit {}", request_id, ids.max_incoming)));
        }
        ids.next_incoming += 2;
        Ok(())
    }

    /// Raises the limit for the peer's request ids, returning the MAX_REQUEST_ID message to send
    ///  if the limit actually changed
    pub async fn grant_incoming_request_ids(&self, max_request_id: u64) -> Option<MaxRequestId> {
        let mut ids = self.request_ids.lock().await;
        if max_request_id <= ids.max_incoming {
            return None;
        }
        ids.max_incoming = max_request_id;
        Some(MaxRequestId { request_id: max_request_id })
    }

    pub async fn peer_max_token_cache_size(&self) -> u64 {
        self.token_cache.lock().await.peer_max_size
    }

    pub async fn local_token_cache_size(&self) -> u64 {
        self.token_cache.lock().await.local_size
    }

    /// Accounts for `size` bytes of token data we ask the peer to cache
    pub async fn reserve_token_cache(&self, size: u64) -> Result<()> {
        let mut cache = self.token_cache.lock().await;
        let new_used = cache.used_at_peer.saturating_add(size);
        if new_used > cache.peer_max_size {
            return Err(MoqtError::violation(TerminationCode::AuthTokenCacheOverflow, format!(
                "caching {} more token bytes exceeds the peer's limit of {} ({} in use)", size, cache.peer_max_size, cache.used_at_peer)));
        }
        cache.used_at_peer = new_used;
        Ok(())
    }

    pub async fn release_token_cache(&self, size: u64) {
        let mut cache = self.token_cache.lock().await;
        cache.used_at_peer = cache.used_at_peer.saturating_sub(size);
    }
}

fn bytes_to_string(param: &KeyValuePair) -> String {
    param.as_bytes()
        .map(|b| String::from_utf8_lossy(b).into_owned())
        .unwrap_or_default()
}

#[cfg(test)]
mod test {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case::client(Role::Client, vec![0, 2, 4])]
    #[case::server(Role::Server, vec![1, 3, 5])]
    #[tokio::test]
    async fn test_request_id_parity(#[case] role: Role, #[case] expected: Vec<u64>) {
        let state = SessionState::new(role, 100, 0);
        assert_eq!(state.next_outgoing_request_id().await, expected[0]);

        state.apply_peer_params(&[SetupParameter::MaxRequestId.int(100).unwrap()]).await;
        let mut allocated = Vec::new();
        for _ in 0..3 {
            allocated.push(state.allocate_request_id().await.unwrap());
        }
        assert_eq!(allocated, expected);
    }

    #[tokio::test]
    async fn test_allocate_respects_peer_limit() {
        let state = SessionState::new(Role::Client, 100, 0);
        assert_eq!(state.allocate_request_id().await, None);

        state.apply_peer_params(&[SetupParameter::MaxRequestId.int(3).unwrap()]).await;
        assert_eq!(state.allocate_request_id().await, Some(0));
        assert_eq!(state.allocate_request_id().await, Some(2));
        assert_eq!(state.allocate_request_id().await, None);

        state.on_max_request_id(5).await.unwrap();
        assert_eq!(state.allocate_request_id().await, Some(4));
    }

    #[tokio::test]
    async fn test_max_request_id_must_increase() {
        let state = SessionState::new(Role::Server, 100, 0);
        state.on_max_request_id(10).await.unwrap();
        assert!(state.on_max_request_id(10).await.unwrap_err().is_protocol_violation());
        assert!(state.on_max_request_id(4).await.is_err());
        assert_eq!(state.max_outgoing_request_id().await, 10);
    }

    #[tokio::test]
    async fn test_incoming_request_ids() {
        let state = SessionState::new(Role::Server, 4, 0);
        state.check_incoming_request_id(0).await.unwrap();
        state.check_incoming_request_id(2).await.unwrap();

        assert_eq!(state.check_incoming_request_id(3).await.unwrap_err().code(), TerminationCode::InvalidRequestId);
        assert_eq!(state.check_incoming_request_id(4).await.unwrap_err().code(), TerminationCode::TooManyRequests);

        assert_eq!(state.grant_incoming_request_ids(4).await, None);
        assert_eq!(state.grant_incoming_request_ids(10).await, Some(MaxRequestId { request_id: 10 }));
        state.check_incoming_request_id(4).await.unwrap();
    }

    #[tokio::test]
    async fn test_client_expects_odd_incoming_ids() {
        let state = SessionState::new(Role::Client, 10, 0);
        assert_eq!(state.check_incoming_request_id(0).await.unwrap_err().code(), TerminationCode::InvalidRequestId);
        state.check_incoming_request_id(1).await.unwrap();
    }

    #[tokio::test]
    async fn test_peer_params() {
        let state = SessionState::new(Role::Server, 100, 0);
        state.apply_peer_params(&[
            SetupParameter::Path.bytes("/live").unwrap(),
            SetupParameter::Authority.bytes("relay.example.com").unwrap(),
            SetupParameter::Implementation.bytes("test-client/1.0").unwrap(),
            SetupParameter::MaxRequestId.int(20).unwrap(),
            SetupParameter::MaxAuthTokenCacheSize.int(512).unwrap(),
            KeyValuePair::int(0x40, 5).unwrap(),
            KeyValuePair::bytes(0x41, "unknown").unwrap(),
        ]).await;

        let metadata = state.metadata().await;
        assert_eq!(metadata.path, "/live");
        assert_eq!(metadata.authority, "relay.example.com");
        assert_eq!(metadata.peer_implementation, "test-client/1.0");
        assert_eq!(state.max_outgoing_request_id().await, 20);
        assert_eq!(state.peer_max_token_cache_size().await, 512);
        assert_eq!(state.max_incoming_request_id().await, 100);
    }

    #[tokio::test]
    async fn test_local_params() {
        let state = SessionState::new(Role::Client, 100, 0);
        state.apply_local_params(&[
            SetupParameter::Path.bytes("/x").unwrap(),
            SetupParameter::MaxRequestId.int(50).unwrap(),
            SetupParameter::MaxAuthTokenCacheSize.int(64).unwrap(),
        ]).await;

        assert_eq!(state.metadata().await.path, "/x");
        assert_eq!(state.max_incoming_request_id().await, 50);
        assert_eq!(state.local_token_cache_size().await, 64);
        assert_eq!(state.max_outgoing_request_id().await, 0);
    }

    #[tokio::test]
    async fn test_token_cache() {
        let state = SessionState::new(Role::Client, 100, 0);
        assert_eq!(state.reserve_token_cache(1).await.unwrap_err().code(), TerminationCode::AuthTokenCacheOverflow);

        state.apply_peer_params(&[SetupParameter::MaxAuthTokenCacheSize.int(100).unwrap()]).await;
        state.reserve_token_cache(60).await.unwrap();
        assert!(state.reserve_token_cache(41).await.is_err());
        state.reserve_token_cache(40).await.unwrap();

        state.release_token_cache(50).await;
        state.reserve_token_cache(50).await.unwrap();
    }
}
