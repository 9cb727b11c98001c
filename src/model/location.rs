use bytes::{Buf, BufMut};

use crate::error::Result;
use crate::util::buf_ext::{BufExt, BufMutExt};

/// Position of an object in a track. Ordered by group first, then by object.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Location {
    pub group_id: u64,
    pub object_id: u64,
}

impl Location {
    pub fn new(group_id: u64, object_id: u64) -> Location {
        Location { group_id, object_id }
    }

    pub fn ser(&self, buf: &mut impl BufMut) -> Result<()> {
        buf.try_put_varint(self.group_id)?;
        buf.try_put_varint(self.object_id)
    }

    pub fn try_deser(buf: &mut impl Buf) -> Result<Location> {
        let group_id = buf.try_get_varint()?;
        let object_id = buf.try_get_varint()?;
        Ok(Location { group_id, object_id })
    }
}
