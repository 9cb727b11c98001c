use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{MoqtError, Result};
use crate::message::object_datagram_type::ObjectDatagramType;
use crate::model::key_value_pair::{ser_extensions, try_deser_extensions, KeyValuePair};
use crate::model::location::Location;
use crate::model::object::{Object, ObjectStatus};
use crate::util::buf_ext::{BufExt, BufMutExt};

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum DatagramBody {
    Status(ObjectStatus),
    Payload(Bytes),
}

/// A complete object sent in a single datagram:
///
/// ```ascii
/// type (i)
/// track alias (i)
/// group id (i)
/// object id (i)
/// [publisher priority (8)]
/// [extensions: count (i), key-value-pair...]
/// status (i) | payload (..)
/// ```
///
/// Which of the optional fields are present is determined by the [ObjectDatagramType]. The
///  object id is always on the wire; if the type marks it as omitted, it is written as 0 and
///  ignored when reading. The payload has no length prefix, it extends to the end of the
///  datagram.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ObjectDatagram {
    dtype: ObjectDatagramType,
    track_alias: u64,
    location: Location,
    publisher_priority: Option<u8>,
    extensions: Option<Vec<KeyValuePair>>,
    body: DatagramBody,
}

impl ObjectDatagram {
    pub fn builder(track_alias: u64, group_id: u64) -> ObjectDatagramBuilder {
        ObjectDatagramBuilder {
            dtype: ObjectDatagramType::default(),
            track_alias,
            location: Location::new(group_id, 0),
            publisher_priority: None,
            extensions: None,
            status: None,
            payload: None,
        }
    }

    /// Datagram representation of an application-level object
    pub fn for_object(track_alias: u64, object: &Object) -> Result<ObjectDatagram> {
        let mut builder = Self::builder(track_alias, object.location.group_id)
            .with_object_id(object.location.object_id)
            .with_publisher_priority(object.publisher_priority);
        if !object.extension_headers.is_empty() {
            builder = builder.with_extensions(object.extension_headers.clone());
        }
        builder = match object.status {
            ObjectStatus::Normal => builder.with_payload(object.payload.clone()),
            status => builder.with_status(status),
        };
        builder.build()
    }

    pub fn datagram_type(&self) -> ObjectDatagramType {
        self.dtype
    }

    pub fn track_alias(&self) -> u64 {
        self.track_alias
    }

    /// The object id is 0 if the datagram type marks it as omitted
    pub fn location(&self) -> Location {
        self.location
    }

    pub fn publisher_priority(&self) -> Option<u8> {
        self.publisher_priority
    }

    pub fn extensions(&self) -> Option<&[KeyValuePair]> {
        self.extensions.as_deref()
    }

    pub fn body(&self) -> &DatagramBody {
        &self.body
    }

    pub fn status(&self) -> Option<ObjectStatus> {
        match &self.body {
            DatagramBody::Status(s) => Some(*s),
            DatagramBody::Payload(_) => None,
        }
    }

    pub fn payload(&self) -> Option<&Bytes> {
        match &self.body {
            DatagramBody::Status(_) => None,
            DatagramBody::Payload(p) => Some(p),
        }
    }

    pub fn ser(&self, buf: &mut impl BufMut) -> Result<()> {
        buf.try_put_varint(self.dtype.type_id())?;
        buf.try_put_varint(self.track_alias)?;
        self.location.ser(buf)?;
        if let Some(priority) = self.publisher_priority {
            buf.put_u8(priority);
        }
        if let Some(extensions) = &self.extensions {
            ser_extensions(buf, extensions)?;
        }
        match &self.body {
            DatagramBody::Status(status) => buf.try_put_varint((*status).into())?,
            DatagramBody::Payload(payload) => buf.put_slice(payload),
        }
        Ok(())
    }

    pub fn to_bytes(&self) -> Result<Bytes> {
        let mut buf = BytesMut::new();
        self.ser(&mut buf)?;
        Ok(buf.freeze())
    }

    /// Decodes a complete datagram, treating everything after the header as payload
    pub fn try_deser(buf: &mut impl Buf) -> Result<ObjectDatagram> {
        let dtype = ObjectDatagramType::try_from_id(buf.try_get_varint()?)?;
        let track_alias = buf.try_get_varint()?;
        let mut location = Location::try_deser(buf)?;
        if !dtype.object_id_present() {
            location.object_id = 0;
        }
        let publisher_priority = if dtype.priority_present() {
            Some(buf.try_get_u8_checked()?)
        }
        else {
            None
        };
        let extensions = if dtype.extensions_present() {
            Some(try_deser_extensions(buf)?)
        }
        else {
            None
        };
        let body = if dtype.is_status() {
            DatagramBody::Status(ObjectStatus::try_from_wire(buf.try_get_varint()?)?)
        }
        else {
            DatagramBody::Payload(buf.copy_to_bytes(buf.remaining()))
        };

        Ok(ObjectDatagram {
            dtype,
            track_alias,
            location,
            publisher_priority,
            extensions,
            body,
        })
    }
}

/// Collects the fields of an [ObjectDatagram]. Every option sets the corresponding facet of the
///  datagram type, and [ObjectDatagramBuilder::build] checks the combination before the type
///  identifier is fixed.
#[derive(Debug, Clone)]
pub struct ObjectDatagramBuilder {
    dtype: ObjectDatagramType,
    track_alias: u64,
    location: Location,
    publisher_priority: Option<u8>,
    extensions: Option<Vec<KeyValuePair>>,
    status: Option<ObjectStatus>,
    payload: Option<Bytes>,
}

impl ObjectDatagramBuilder {
    pub fn with_object_id(mut self, object_id: u64) -> Self {
        self.location.object_id = object_id;
        self.dtype.set_object_id_present(true);
        self
    }

    pub fn with_publisher_priority(mut self, priority: u8) -> Self {
        self.publisher_priority = Some(priority);
        self.dtype.set_priority_present(true);
        self
    }

    pub fn with_extensions(mut self, extensions: Vec<KeyValuePair>) -> Self {
        self.extensions = Some(extensions);
        self.dtype.set_extensions_present(true);
        self
    }

    pub fn with_end_of_group(mut self) -> Self {
        self.dtype.set_end_of_group(true);
        self
    }

    pub fn with_status(mut self, status: ObjectStatus) -> Self {
        self.status = Some(status);
        self.dtype.set_status(true);
        self
    }

    pub fn with_payload(mut self, payload: impl Into<Bytes>) -> Self {
        self.payload = Some(payload.into());
        self
    }

    pub fn build(self) -> Result<ObjectDatagram> {
        let body = match (self.status, self.payload) {
            (Some(status), None) => DatagramBody::Status(status),
            (None, Some(payload)) => DatagramBody::Payload(payload),
            (Some(_), Some(_)) => return Err(MoqtError::protocol_violation("object datagram has both status and payload")),
            (None, None) => return Err(MoqtError::protocol_violation("object datagram has neither status nor payload")),
        };
        if self.dtype.extensions_present() && self.dtype.end_of_group() {
            return Err(MoqtError::protocol_violation("object datagram can not have both extensions and end of group"));
        }
        if self.dtype.is_status() && self.dtype.end_of_group() {
            return Err(MoqtError::protocol_violation("object datagram can not have both status and end of group"));
        }

        Ok(ObjectDatagram {
            dtype: self.dtype,
            track_alias: self.track_alias,
            location: self.location,
            publisher_priority: self.publisher_priority,
            extensions: self.extensions,
            body,
        })
    }
}
