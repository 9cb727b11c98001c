//! Wire core of Media over QUIC Transport (draft 15): codecs for the protocol's data types and
//!  object datagrams, control message framing, and the setup handshake with the per-session
//!  state it negotiates.

pub mod client;
pub mod control;
pub mod error;
pub mod message;
pub mod model;
pub mod server;
pub mod session;
pub mod transport;
pub mod util;
pub mod test_util;


#[cfg(test)]
mod test {
    use tracing::Level;

    #[ctor::ctor]
    fn init_test_logging() {
        tracing_subscriber::fmt()
            .with_test_writer()
            .with_max_level(Level::TRACE)
            .try_init()
            .ok();
    }
}
