use bytes::{Buf, BufMut, Bytes};
use quinn::VarInt;

use crate::error::{MoqtError, Result};

/// The largest value that fits into a varint
pub const MAX_VARINT: u64 = VarInt::MAX.into_inner();

fn checked_varint(v: u64) -> Result<VarInt> {
    VarInt::from_u64(v).map_err(|_| MoqtError::VarIntBoundsExceeded(v))
}

/// Number of bytes needed for the wire representation of `v`
pub fn varint_len(v: u64) -> Result<usize> {
    // VarInt's own size() is crate private
    Ok(match checked_varint(v)?.into_inner() {
        0..=0x3f => 1,
        0x40..=0x3fff => 2,
        0x4000..=0x3fff_ffff => 4,
        _ => 8,
    })
}

/// Wire length of a varint given its first byte
pub fn varint_len_from_first_byte(first: u8) -> usize {
    1 << (first >> 6)
}

/// Parses a single varint from the start of `bytes`, returning the value and the number of bytes
///  it occupied.
pub fn parse_varint(bytes: &[u8]) -> Result<(u64, usize)> {
    let mut buf = bytes;
    let v = buf.try_get_varint()?;
    Ok((v, bytes.len() - buf.len()))
}

pub fn append_varint(buf: &mut Vec<u8>, v: u64) -> Result<()> {
    buf.try_put_varint(v)
}

macro_rules! get_try_impl {
    ($try_getter: ident, $ty:ty, $getter: ident) => {
        fn $try_getter(&mut self) -> Result<$ty> {
            if self.remaining() < std::mem::size_of::<$ty>() {
                return Err(MoqtError::unexpected_end(std::mem::size_of::<$ty>(), self.remaining()));
            }
            Ok(self.$getter())
        }
    }
}

pub trait BufExt: Buf {
    fn try_get_varint(&mut self) -> Result<u64> {
        if !self.has_remaining() {
            return Err(MoqtError::unexpected_end(1, 0));
        }
        let len = varint_len_from_first_byte(self.chunk()[0]);
        if self.remaining() < len {
            return Err(MoqtError::unexpected_end(len, self.remaining()));
        }

        let first = (self.get_u8() & 0x3f) as u64;
        let mut v = first;
        for _ in 1..len {
            v = (v << 8) | self.get_u8() as u64;
        }
        Ok(v)
    }

    fn try_get_usize_varint(&mut self) -> Result<usize> {
        let v = self.try_get_varint()?;
        usize::try_from(v)
            .map_err(|_| MoqtError::protocol_violation(format!("length {} does not fit into memory", v)))
    }

    get_try_impl!(try_get_u8_checked, u8, get_u8);

    /// Takes exactly `len` bytes, failing without consuming anything if fewer are available
    fn try_get_bytes(&mut self, len: usize) -> Result<Bytes> {
        if self.remaining() < len {
            return Err(MoqtError::unexpected_end(len, self.remaining()));
        }
        Ok(self.copy_to_bytes(len))
    }
}

pub trait BufMutExt: BufMut {
    /// writes the minimal-length wire form of `v`
    fn try_put_varint(&mut self, v: u64) -> Result<()> {
        match varint_len(v)? {
            1 => self.put_u8(v as u8),
            2 => self.put_u16(0x4000 | v as u16),
            4 => self.put_u32(0x8000_0000 | v as u32),
            _ => self.put_u64(0xc000_0000_0000_0000 | v),
        }
        Ok(())
    }

    fn try_put_usize_varint(&mut self, v: usize) -> Result<()> {
        self.try_put_varint(v as u64)
    }
}

impl <T: Buf> BufExt for T {
}

impl <T: BufMut> BufMutExt for T {
}
