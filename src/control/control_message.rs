use bytes::{Buf, BytesMut};
use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::control::request_id::{MaxRequestId, RequestsBlocked};
use crate::control::setup::{ClientSetup, ServerSetup};
use crate::error::{MoqtError, Result};

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, IntoPrimitive, TryFromPrimitive)]
#[repr(u64)]
pub enum ControlMessageType {
    ClientSetup = 0x20,
    ServerSetup = 0x21,
    Goaway = 0x10,
    MaxRequestId = 0x15,
    RequestsBlocked = 0x1A,
    RequestOk = 0x7,
    RequestError = 0x5,
    Subscribe = 0x3,
    SubscribeOk = 0x4,
    RequestUpdate = 0x2,
    Unsubscribe = 0xA,
    Publish = 0x1D,
    PublishOk = 0x1E,
    PublishDone = 0xB,
    Fetch = 0x16,
    FetchOk = 0x18,
    FetchCancel = 0x17,
    TrackStatus = 0xD,
    PublishNamespace = 0x6,
    Namespace = 0x8,
    PublishNamespaceDone = 0x9,
    NamespaceDone = 0xE,
    PublishNamespaceCancel = 0xC,
    SubscribeNamespace = 0x11,
}

/// The payload of a specific control message, i.e. everything after the frame's type and length
pub trait ControlPayload: Sized {
    const TYPE: ControlMessageType;

    fn ser_payload(&self, buf: &mut BytesMut) -> Result<()>;

    fn try_deser_payload(buf: &mut impl Buf) -> Result<Self>;
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum ControlMessage {
    ClientSetup(ClientSetup),
    ServerSetup(ServerSetup),
    MaxRequestId(MaxRequestId),
    RequestsBlocked(RequestsBlocked),
}

impl ControlMessage {
    pub fn message_type(&self) -> ControlMessageType {
        match self {
            ControlMessage::ClientSetup(_) => ClientSetup::TYPE,
            ControlMessage::ServerSetup(_) => ServerSetup::TYPE,
            ControlMessage::MaxRequestId(_) => MaxRequestId::TYPE,
            ControlMessage::RequestsBlocked(_) => RequestsBlocked::TYPE,
        }
    }

    pub fn ser_payload(&self, buf: &mut BytesMut) -> Result<()> {
        match self {
            ControlMessage::ClientSetup(m) => m.ser_payload(buf),
            ControlMessage::ServerSetup(m) => m.ser_payload(buf),
            ControlMessage::MaxRequestId(m) => m.ser_payload(buf),
            ControlMessage::RequestsBlocked(m) => m.ser_payload(buf),
        }
    }

    /// Decodes the payload of a frame with the given type. The payload must be consumed exactly,
    ///  leftover bytes mean that the frame's declared length did not match its content.
    pub fn try_deser(type_id: u64, payload: &[u8]) -> Result<ControlMessage> {
        let message_type = ControlMessageType::try_from(type_id)
            .map_err(|_| MoqtError::protocol_violation(format!("unknown control message type {:#x}", type_id)))?;

        let mut buf = payload;
        let msg = match message_type {
            ControlMessageType::ClientSetup => ControlMessage::ClientSetup(ClientSetup::try_deser_payload(&mut buf)?),
            ControlMessageType::ServerSetup => ControlMessage::ServerSetup(ServerSetup::try_deser_payload(&mut buf)?),
            ControlMessageType::MaxRequestId => ControlMessage::MaxRequestId(MaxRequestId::try_deser_payload(&mut buf)?),
            ControlMessageType::RequestsBlocked => ControlMessage::RequestsBlocked(RequestsBlocked::try_deser_payload(&mut buf)?),
            ControlMessageType::Goaway
            | ControlMessageType::RequestOk
            | ControlMessageType::RequestError
            | ControlMessageType::Subscribe
            | ControlMessageType::SubscribeOk
            | ControlMessageType::RequestUpdate
            | ControlMessageType::Unsubscribe
            | ControlMessageType::Publish
            | ControlMessageType::PublishOk
            | ControlMessageType::PublishDone
            | ControlMessageType::Fetch
            | ControlMessageType::FetchOk
            | ControlMessageType::FetchCancel
            | ControlMessageType::TrackStatus
            | ControlMessageType::PublishNamespace
            | ControlMessageType::Namespace
            | ControlMessageType::PublishNamespaceDone
            | ControlMessageType::NamespaceDone
            | ControlMessageType::PublishNamespaceCancel
            | ControlMessageType::SubscribeNamespace => {
                return Err(MoqtError::protocol_violation(format!("unsupported control message type {:?}", message_type)));
            }
        };

        if buf.has_remaining() {
            return Err(MoqtError::protocol_violation(format!(
                "control message length mismatch for {:?}: declared {}, decoded {}",
                message_type, payload.len(), payload.len() - buf.remaining())));
        }
        Ok(msg)
    }
}

impl From<ClientSetup> for ControlMessage {
    fn from(value: ClientSetup) -> Self {
        ControlMessage::ClientSetup(value)
    }
}
impl From<ServerSetup> for ControlMessage {
    fn from(value: ServerSetup) -> Self {
        ControlMessage::ServerSetup(value)
    }
}
impl From<MaxRequestId> for ControlMessage {
    fn from(value: MaxRequestId) -> Self {
        ControlMessage::MaxRequestId(value)
    }
}
impl From<RequestsBlocked> for ControlMessage {
    fn from(value: RequestsBlocked) -> Self {
        ControlMessage::RequestsBlocked(value)
    }
}
