use bytes::{Buf, BytesMut};

use crate::control::control_message::{ControlMessageType, ControlPayload};
use crate::error::Result;
use crate::util::buf_ext::{BufExt, BufMutExt};

/// Raises the limit for request ids the receiver may use
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct MaxRequestId {
    pub request_id: u64,
}

impl ControlPayload for MaxRequestId {
    const TYPE: ControlMessageType = ControlMessageType::MaxRequestId;

    fn ser_payload(&self, buf: &mut BytesMut) -> Result<()> {
        buf.try_put_varint(self.request_id)
    }

    fn try_deser_payload(buf: &mut impl Buf) -> Result<Self> {
        Ok(MaxRequestId { request_id: buf.try_get_varint()? })
    }
}

/// Sent when the sender wants to start a request but has run into the peer's limit
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct RequestsBlocked {
    pub maximum_request_id: u64,
}

impl ControlPayload for RequestsBlocked {
    const TYPE: ControlMessageType = ControlMessageType::RequestsBlocked;

    fn ser_payload(&self, buf: &mut BytesMut) -> Result<()> {
        buf.try_put_varint(self.maximum_request_id)
    }

    fn try_deser_payload(buf: &mut impl Buf) -> Result<Self> {
        Ok(RequestsBlocked { maximum_request_id: buf.try_get_varint()? })
    }
}
