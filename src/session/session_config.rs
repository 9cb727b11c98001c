use std::time::Duration;

use anyhow::bail;

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// the limit for request ids the peer may use, advertised as MAX_REQUEST_ID setup parameter
    ///  unless the setup parameters contain one explicitly
    pub max_incoming_request_id: u64,
    /// number of bytes of auth tokens we are willing to cache for the peer
    pub local_token_cache_size: u64,

    pub open_stream_timeout: Duration,
    /// how long a server waits for the client to open the control stream
    pub control_stream_timeout: Duration,
    /// how long to wait for the peer's setup message
    pub control_message_timeout: Duration,
    pub max_control_message_len: usize,

    /// number of accepted connections that can wait for a handler before the accept loop blocks
    pub connection_queue_size: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionConfig {
    pub fn new() -> SessionConfig {
        SessionConfig {
            max_incoming_request_id: 1000,
            local_token_cache_size: 0,
            open_stream_timeout: Duration::from_secs(10),
            control_stream_timeout: Duration::from_secs(10),
            control_message_timeout: Duration::from_secs(10),
            max_control_message_len: 65535,
            connection_queue_size: 100,
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.max_control_message_len > 65535 {
            bail!("control messages can not be longer than 65535 bytes");
        }
        if self.max_control_message_len == 0 {
            bail!("max control message length must be positive");
        }
        if self.connection_queue_size == 0 {
            bail!("connection queue size must be positive");
        }
        if self.open_stream_timeout.is_zero() || self.control_stream_timeout.is_zero() || self.control_message_timeout.is_zero() {
            bail!("timeouts must be positive");
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(SessionConfig::new().validate().is_ok());
    }

    #[test]
    fn test_validate() {
        let mut config = SessionConfig::new();
        config.max_control_message_len = 70000;
        assert!(config.validate().is_err());

        let mut config = SessionConfig::new();
        config.control_message_timeout = Duration::ZERO;
        assert!(config.validate().is_err());

        let mut config = SessionConfig::new();
        config.connection_queue_size = 0;
        assert!(config.validate().is_err());
    }
}
