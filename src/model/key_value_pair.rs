use bytes::{Buf, BufMut, Bytes};

use crate::error::{MoqtError, Result};
use crate::util::buf_ext::{BufExt, BufMutExt, MAX_VARINT};

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum KeyValue {
    Int(u64),
    Bytes(Bytes),
}

/// A type-tagged value: even types carry a varint, odd types a length-prefixed byte string.
///
/// Construction checks that the value kind matches the type's parity, so a `KeyValuePair` is
///  always encodable.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct KeyValuePair {
    type_id: u64,
    value: KeyValue,
}

impl KeyValuePair {
    pub const MAX_BYTES_LEN: usize = 65535;

    pub fn new(type_id: u64, value: KeyValue) -> Result<KeyValuePair> {
        if type_id > MAX_VARINT {
            return Err(MoqtError::VarIntBoundsExceeded(type_id));
        }
        match &value {
            KeyValue::Int(v) => {
                if type_id % 2 != 0 {
                    return Err(MoqtError::key_value_formatting(format!("odd type {:#x} with an integer value", type_id)));
                }
                if *v > MAX_VARINT {
                    return Err(MoqtError::VarIntBoundsExceeded(*v));
                }
            }
            KeyValue::Bytes(b) => {
                if type_id % 2 == 0 {
                    return Err(MoqtError::key_value_formatting(format!("even type {:#x} with a byte string value", type_id)));
                }
                if b.len() > Self::MAX_BYTES_LEN {
                    return Err(MoqtError::key_value_formatting(format!("value of type {:#x} is {} bytes long", type_id, b.len())));
                }
            }
        }
        Ok(KeyValuePair { type_id, value })
    }

    pub fn int(type_id: u64, value: u64) -> Result<KeyValuePair> {
        Self::new(type_id, KeyValue::Int(value))
    }

    pub fn bytes(type_id: u64, value: impl Into<Bytes>) -> Result<KeyValuePair> {
        Self::new(type_id, KeyValue::Bytes(value.into()))
    }

    pub fn type_id(&self) -> u64 {
        self.type_id
    }

    pub fn value(&self) -> &KeyValue {
        &self.value
    }

    pub fn as_int(&self) -> Option<u64> {
        match &self.value {
            KeyValue::Int(v) => Some(*v),
            KeyValue::Bytes(_) => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&Bytes> {
        match &self.value {
            KeyValue::Int(_) => None,
            KeyValue::Bytes(b) => Some(b),
        }
    }

    pub fn ser(&self, buf: &mut impl BufMut) -> Result<()> {
        buf.try_put_varint(self.type_id)?;
        match &self.value {
            KeyValue::Int(v) => buf.try_put_varint(*v)?,
            KeyValue::Bytes(b) => {
                buf.try_put_usize_varint(b.len())?;
                buf.put_slice(b);
            }
        }
        Ok(())
    }

    pub fn try_deser(buf: &mut impl Buf) -> Result<KeyValuePair> {
        let type_id = buf.try_get_varint()?;
        if type_id % 2 == 0 {
            let value = buf.try_get_varint()?;
            return Ok(KeyValuePair { type_id, value: KeyValue::Int(value) });
        }

        let len = buf.try_get_varint()?;
        if len > Self::MAX_BYTES_LEN as u64 {
            return Err(MoqtError::key_value_formatting(format!("value of type {:#x} declares {} bytes", type_id, len)));
        }
        let value = buf.try_get_bytes(len as usize)?;
        Ok(KeyValuePair { type_id, value: KeyValue::Bytes(value) })
    }
}

/// writes a count followed by that many key-value pairs
pub fn ser_extensions(buf: &mut impl BufMut, pairs: &[KeyValuePair]) -> Result<()> {
    buf.try_put_usize_varint(pairs.len())?;
    for kvp in pairs {
        kvp.ser(buf)?;
    }
    Ok(())
}

pub fn try_deser_extensions(buf: &mut impl Buf) -> Result<Vec<KeyValuePair>> {
    let count = buf.try_get_varint()?;

    // every pair takes at least two bytes, so a huge count can not make us allocate
    let mut result = Vec::with_capacity(std::cmp::min(count, buf.remaining() as u64 / 2) as usize);
    for _ in 0..count {
        result.push(KeyValuePair::try_deser(buf)?);
    }
    Ok(result)
}
