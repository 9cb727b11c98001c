pub mod handshake;
pub mod session;
pub mod session_config;
pub mod session_state;
