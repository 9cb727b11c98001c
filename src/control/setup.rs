use bytes::{Buf, Bytes, BytesMut};
use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::control::control_message::{ControlMessageType, ControlPayload};
use crate::error::Result;
use crate::model::key_value_pair::{ser_extensions, try_deser_extensions, KeyValuePair};

/// Known setup parameters. Receivers ignore parameters they do not know.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, IntoPrimitive, TryFromPrimitive)]
#[repr(u64)]
pub enum SetupParameter {
    Path = 0x01,
    MaxRequestId = 0x02,
    AuthToken = 0x03,
    MaxAuthTokenCacheSize = 0x04,
    Authority = 0x05,
    Implementation = 0x07,
}

impl SetupParameter {
    pub fn id(self) -> u64 {
        self.into()
    }

    pub fn int(self, value: u64) -> Result<KeyValuePair> {
        KeyValuePair::int(self.id(), value)
    }

    pub fn bytes(self, value: impl Into<Bytes>) -> Result<KeyValuePair> {
        KeyValuePair::bytes(self.id(), value)
    }

    /// the first occurrence of this parameter in `params`
    pub fn find(self, params: &[KeyValuePair]) -> Option<&KeyValuePair> {
        params.iter()
            .find(|p| p.type_id() == self.id())
    }

    pub fn is_present(self, params: &[KeyValuePair]) -> bool {
        self.find(params).is_some()
    }
}

#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct ClientSetup {
    pub parameters: Vec<KeyValuePair>,
}

impl ClientSetup {
    pub fn new(parameters: Vec<KeyValuePair>) -> ClientSetup {
        ClientSetup { parameters }
    }
}

impl ControlPayload for ClientSetup {
    const TYPE: ControlMessageType = ControlMessageType::ClientSetup;

    fn ser_payload(&self, buf: &mut BytesMut) -> Result<()> {
        ser_extensions(buf, &self.parameters)
    }

    fn try_deser_payload(buf: &mut impl Buf) -> Result<Self> {
        Ok(ClientSetup { parameters: try_deser_extensions(buf)? })
    }
}

#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct ServerSetup {
    pub parameters: Vec<KeyValuePair>,
}

impl ServerSetup {
    pub fn new(parameters: Vec<KeyValuePair>) -> ServerSetup {
        ServerSetup { parameters }
    }
}

impl ControlPayload for ServerSetup {
    const TYPE: ControlMessageType = ControlMessageType::ServerSetup;

    fn ser_payload(&self, buf: &mut BytesMut) -> Result<()> {
        ser_extensions(buf, &self.parameters)
    }

    fn try_deser_payload(buf: &mut impl Buf) -> Result<Self> {
        Ok(ServerSetup { parameters: try_deser_extensions(buf)? })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_client_setup_wire() {
        let setup = ClientSetup::new(vec![
            SetupParameter::Path.bytes("/a").unwrap(),
            SetupParameter::MaxRequestId.int(5).unwrap(),
        ]);
        let mut buf = BytesMut::new();
        setup.ser_payload(&mut buf).unwrap();
        assert_eq!(buf.as_ref(), b"\x02\x01\x02/a\x02\x05");

        let mut b: &[u8] = &buf;
        assert_eq!(ClientSetup::try_deser_payload(&mut b).unwrap(), setup);
    }

    #[test]
    fn test_unknown_parameter_is_kept() {
        let mut b: &[u8] = b"\x02\x3f\x01x\x02\x05";
        let setup = ServerSetup::try_deser_payload(&mut b).unwrap();
        assert_eq!(setup.parameters.len(), 2);
        assert_eq!(SetupParameter::MaxRequestId.find(&setup.parameters).unwrap().as_int(), Some(5));
        assert!(!SetupParameter::Path.is_present(&setup.parameters));
    }

    #[test]
    fn test_parameter_kind_must_match() {
        assert!(SetupParameter::Path.int(1).is_err());
        assert!(SetupParameter::MaxRequestId.bytes("x").is_err());
    }
}
