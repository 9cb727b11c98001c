use bytes::Bytes;
use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::error::{MoqtError, Result};
use crate::model::key_value_pair::KeyValuePair;
use crate::model::location::Location;
use crate::model::track::FullTrackName;

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, IntoPrimitive, TryFromPrimitive)]
#[repr(u64)]
pub enum ObjectStatus {
    Normal = 0x0,
    DoesNotExist = 0x1,
    EndOfGroup = 0x3,
    EndOfTrack = 0x4,
}

impl ObjectStatus {
    /// Unknown status values are a protocol violation
    pub fn try_from_wire(value: u64) -> Result<ObjectStatus> {
        ObjectStatus::try_from(value)
            .map_err(|_| MoqtError::protocol_violation(format!("invalid object status {:#x}", value)))
    }
}

#[derive(Debug, Clone, Copy, Default, Eq, PartialEq, Hash)]
pub enum ForwardingPreference {
    Datagram,
    #[default]
    Subgroup,
}

/// An object as seen by the application, independent of how it is sent
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Object {
    pub location: Location,
    pub subgroup_id: u64,
    pub full_track_name: FullTrackName,
    pub publisher_priority: u8,
    pub forwarding_preference: ForwardingPreference,
    pub status: ObjectStatus,
    pub extension_headers: Vec<KeyValuePair>,
    pub payload: Bytes,
}

impl Object {
    pub fn builder(full_track_name: FullTrackName, location: Location) -> ObjectBuilder {
        ObjectBuilder {
            object: Object {
                location,
                subgroup_id: 0,
                full_track_name,
                publisher_priority: 128,
                forwarding_preference: ForwardingPreference::default(),
                status: ObjectStatus::Normal,
                extension_headers: Vec::new(),
                payload: Bytes::new(),
            }
        }
    }
}

pub struct ObjectBuilder {
    object: Object,
}

impl ObjectBuilder {
    pub fn with_subgroup_id(mut self, subgroup_id: u64) -> Self {
        self.object.subgroup_id = subgroup_id;
        self
    }

    pub fn with_publisher_priority(mut self, priority: u8) -> Self {
        self.object.publisher_priority = priority;
        self
    }

    pub fn with_forwarding_preference(mut self, preference: ForwardingPreference) -> Self {
        self.object.forwarding_preference = preference;
        self
    }

    pub fn with_status(mut self, status: ObjectStatus) -> Self {
        self.object.status = status;
        self
    }

    pub fn with_extension_headers(mut self, extension_headers: Vec<KeyValuePair>) -> Self {
        self.object.extension_headers = extension_headers;
        self
    }

    pub fn with_payload(mut self, payload: impl Into<Bytes>) -> Self {
        self.object.payload = payload.into();
        self
    }

    /// Objects with a status other than [ObjectStatus::Normal] must have neither payload nor
    ///  extension headers.
    pub fn build(self) -> Result<Object> {
        let object = self.object;
        if object.status != ObjectStatus::Normal {
            if !object.payload.is_empty() {
                return Err(MoqtError::protocol_violation(format!("object with status {:?} must have an empty payload", object.status)));
            }
            if !object.extension_headers.is_empty() {
                return Err(MoqtError::protocol_violation(format!("object with status {:?} must not have extension headers", object.status)));
            }
        }
        Ok(object)
    }
}

#[cfg(test)]
mod test {
    use std::str::FromStr;

    use rstest::rstest;

    use super::*;

    fn track() -> FullTrackName {
        FullTrackName::from_str("live/video").unwrap()
    }

    #[test]
    fn test_build_normal() {
        let object = Object::builder(track(), Location::new(3, 4))
            .with_subgroup_id(1)
            .with_publisher_priority(7)
            .with_forwarding_preference(ForwardingPreference::Datagram)
            .with_extension_headers(vec![KeyValuePair::int(2, 1).unwrap()])
            .with_payload(b"frame".to_vec())
            .build()
            .unwrap();

        assert_eq!(object.location, Location::new(3, 4));
        assert_eq!(object.subgroup_id, 1);
        assert_eq!(object.publisher_priority, 7);
        assert_eq!(object.forwarding_preference, ForwardingPreference::Datagram);
        assert_eq!(object.payload.as_ref(), b"frame");
        assert_eq!(object.extension_headers.len(), 1);
    }

    #[rstest]
    #[case::payload(Object::builder(track(), Location::default()).with_status(ObjectStatus::EndOfGroup).with_payload(b"x".to_vec()))]
    #[case::extensions(Object::builder(track(), Location::default()).with_status(ObjectStatus::DoesNotExist).with_extension_headers(vec![KeyValuePair::int(2, 1).unwrap()]))]
    fn test_build_non_normal_invalid(#[case] builder: ObjectBuilder) {
        assert!(builder.build().unwrap_err().is_protocol_violation());
    }

    #[test]
    fn test_build_end_of_track() {
        let object = Object::builder(track(), Location::new(9, 0))
            .with_status(ObjectStatus::EndOfTrack)
            .build()
            .unwrap();
        assert_eq!(object.status, ObjectStatus::EndOfTrack);
    }

    #[rstest]
    #[case(0, ObjectStatus::Normal)]
    #[case(1, ObjectStatus::DoesNotExist)]
    #[case(3, ObjectStatus::EndOfGroup)]
    #[case(4, ObjectStatus::EndOfTrack)]
    fn test_status_from_wire(#[case] value: u64, #[case] expected: ObjectStatus) {
        assert_eq!(ObjectStatus::try_from_wire(value).unwrap(), expected);
        assert_eq!(u64::from(expected), value);
    }

    #[test]
    fn test_status_from_wire_unknown() {
        assert!(ObjectStatus::try_from_wire(2).unwrap_err().is_protocol_violation());
    }
}
