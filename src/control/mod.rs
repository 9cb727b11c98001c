pub mod control_message;
pub mod control_stream;
pub mod request_id;
pub mod setup;
