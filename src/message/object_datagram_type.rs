use std::fmt::{Debug, Formatter};

use bitflags::bitflags;

use crate::error::{MoqtError, Result};

bitflags! {
    #[derive(PartialEq, Eq, Copy, Clone, Hash)]
    struct TypeBits: u8 {
        const EXTENSIONS = 0b0000_0001;
        const END_OF_GROUP = 0b0000_0010;
        const OBJECT_ID_OMITTED = 0b0000_0100;
        const PRIORITY_OMITTED = 0b0000_1000;
        const RESERVED = 0b0001_0000;
        const STATUS = 0b0010_0000;
    }
}

/// The type identifier of an object datagram. Every bit is an independent facet, the facets are
///  derived from the bits so they can not get out of sync with the identifier.
///
/// Valid identifiers are all values up to 0x3F that do not set the reserved bit 0x10, and that
///  do not combine status with end-of-group.
#[derive(Clone, Copy, Eq, PartialEq, Hash)]
pub struct ObjectDatagramType {
    bits: TypeBits,
}

impl Debug for ObjectDatagramType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "DatagramType{{{:#04x}}}", self.bits.bits())
    }
}

impl Default for ObjectDatagramType {
    /// payload only: no extensions, object id and priority omitted
    fn default() -> Self {
        ObjectDatagramType {
            bits: TypeBits::OBJECT_ID_OMITTED | TypeBits::PRIORITY_OMITTED,
        }
    }
}

impl ObjectDatagramType {
    pub const MAX_TYPE_ID: u64 = 0x3F;

    pub fn try_from_id(type_id: u64) -> Result<ObjectDatagramType> {
        if type_id > Self::MAX_TYPE_ID {
            return Err(MoqtError::protocol_violation(format!("object datagram type {:#x} is out of range", type_id)));
        }
        let bits = TypeBits::from_bits_retain(type_id as u8);
        if bits.contains(TypeBits::RESERVED) {
            return Err(MoqtError::protocol_violation(format!("object datagram type {:#x} sets the reserved bit", type_id)));
        }

        let result = ObjectDatagramType { bits };
        if result.is_status() && result.end_of_group() {
            return Err(MoqtError::protocol_violation(format!("object datagram type {:#x} combines status and end of group", type_id)));
        }
        Ok(result)
    }

    pub fn type_id(&self) -> u64 {
        self.bits.bits() as u64
    }

    pub fn extensions_present(&self) -> bool {
        self.bits.contains(TypeBits::EXTENSIONS)
    }

    pub fn end_of_group(&self) -> bool {
        self.bits.contains(TypeBits::END_OF_GROUP)
    }

    pub fn object_id_present(&self) -> bool {
        !self.bits.contains(TypeBits::OBJECT_ID_OMITTED)
    }

    pub fn priority_present(&self) -> bool {
        !self.bits.contains(TypeBits::PRIORITY_OMITTED)
    }

    pub fn is_status(&self) -> bool {
        self.bits.contains(TypeBits::STATUS)
    }

    pub(crate) fn set_extensions_present(&mut self, value: bool) {
        self.bits.set(TypeBits::EXTENSIONS, value);
    }

    pub(crate) fn set_end_of_group(&mut self, value: bool) {
        self.bits.set(TypeBits::END_OF_GROUP, value);
    }

    pub(crate) fn set_object_id_present(&mut self, value: bool) {
        self.bits.set(TypeBits::OBJECT_ID_OMITTED, !value);
    }

    pub(crate) fn set_priority_present(&mut self, value: bool) {
        self.bits.set(TypeBits::PRIORITY_OMITTED, !value);
    }

    pub(crate) fn set_status(&mut self, value: bool) {
        self.bits.set(TypeBits::STATUS, value);
    }
}
