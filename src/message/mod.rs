pub mod object_datagram;
pub mod object_datagram_type;
