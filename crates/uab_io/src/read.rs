//! Bounded, endian aware reading
//!

use bytemuck::Pod;
use std::io::{Read, Seek, SeekFrom};
use tracing::trace;

use crate::{
    error::{Error, Result},
    types::{f16_to_f32, Decimal, Endian, Primitive},
};

/// Longest string accepted by [`EndianReader::read_cstring`]
pub const MAX_CSTRING_LENGTH: usize = 32767;

/// A cursor over a seekable source with a runtime selectable byte order
///
/// The byte order only affects scalars and string length prefixes. Raw byte and
/// record arrays are copied verbatim. The end of the source is captured when the
/// reader is created and every read is checked against it, so running off the end
/// reports [`Error::Truncated`] rather than a bare I/O error.
///
/// ```
/// use std::io::Cursor;
/// use uab_io::{Endian, EndianReader};
///
/// # fn main() -> uab_io::error::Result<()> {
/// let mut reader = EndianReader::new(Cursor::new(vec![0x00, 0x00, 0x00, 0x2A, 0x01]), Endian::Big)?;
/// assert_eq!(reader.read_u32()?, 42);
/// assert!(reader.read_bool()?);
/// # Ok(())
/// # }
/// ```
pub struct EndianReader<R> {
    inner: R,
    endian: Endian,
    position: u64,
    len: u64,
}

macro_rules! read_scalar {
    ($(#[$meta:meta])* $name:ident, $ty:ty) => {
        $(#[$meta])*
        pub fn $name(&mut self) -> Result<$ty> {
            self.read::<$ty>()
        }
    };
}

impl<R: Read + Seek> EndianReader<R> {
    /// Wrap a source, starting at its current position
    pub fn new(mut inner: R, endian: Endian) -> Result<Self> {
        let position = inner.stream_position()?;
        let len = inner.seek(SeekFrom::End(0))?;
        inner.seek(SeekFrom::Start(position))?;

        Ok(EndianReader {
            inner,
            endian,
            position,
            len,
        })
    }

    pub fn endian(&self) -> Endian {
        self.endian
    }

    pub fn set_endian(&mut self, endian: Endian) {
        self.endian = endian;
    }

    pub fn is_big_endian(&self) -> bool {
        self.endian.is_big()
    }

    pub fn position(&self) -> u64 {
        self.position
    }

    /// Total length of the underlying source
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn remaining(&self) -> u64 {
        self.len.saturating_sub(self.position)
    }

    /// Move to an absolute position, which may be the end but not past it
    pub fn seek_to(&mut self, position: u64) -> Result<()> {
        if position > self.len {
            return Err(Error::OutOfRange {
                position,
                start: 0,
                end: self.len,
            });
        }
        self.inner.seek(SeekFrom::Start(position))?;
        self.position = position;
        Ok(())
    }

    /// Skip `count` bytes forward
    pub fn skip(&mut self, count: u64) -> Result<()> {
        self.ensure(count)?;
        self.seek_to(self.position + count)
    }

    /// Advance to the next multiple of `alignment`
    ///
    /// Does nothing when already aligned or when the padding would run past the end.
    pub fn align(&mut self, alignment: u64) -> Result<()> {
        let padding = padding_for(self.position, alignment);
        if padding == 0 || self.position + padding > self.len {
            return Ok(());
        }
        trace!(position = self.position, padding, "aligning reader");
        self.seek_to(self.position + padding)
    }

    fn ensure(&self, requested: u64) -> Result<()> {
        if requested > self.remaining() {
            return Err(Error::Truncated {
                position: self.position,
                requested,
                available: self.remaining(),
            });
        }
        Ok(())
    }

    /// Read one scalar in the current byte order
    pub fn read<T: Primitive>(&mut self) -> Result<T> {
        self.ensure(T::SIZE)?;
        let value = T::read_with(&mut self.inner, self.endian)?;
        self.position += T::SIZE;
        Ok(value)
    }

    read_scalar!(read_u8, u8);
    read_scalar!(read_i8, i8);
    read_scalar!(read_u16, u16);
    read_scalar!(read_i16, i16);
    read_scalar!(read_u32, u32);
    read_scalar!(read_i32, i32);
    read_scalar!(read_u64, u64);
    read_scalar!(read_i64, i64);
    read_scalar!(read_f32, f32);
    read_scalar!(read_f64, f64);

    /// Read one byte as a boolean, where any non zero value is true
    pub fn read_bool(&mut self) -> Result<bool> {
        Ok(self.read_u8()? != 0)
    }

    /// Read an IEEE 754 binary16 value widened to `f32`
    pub fn read_f16(&mut self) -> Result<f32> {
        Ok(f16_to_f32(self.read_u16()?))
    }

    pub fn read_decimal(&mut self) -> Result<Decimal> {
        Ok(Decimal {
            lo: self.read_u32()?,
            mid: self.read_u32()?,
            hi: self.read_u32()?,
            flags: self.read_u32()?,
        })
    }

    /// Read `count` raw bytes
    pub fn read_bytes(&mut self, count: usize) -> Result<Vec<u8>> {
        self.ensure(count as u64)?;
        let mut buffer = vec![0u8; count];
        self.inner.read_exact(&mut buffer)?;
        self.position += count as u64;
        Ok(buffer)
    }

    /// Read a fixed size byte array, such as a GUID or hash
    pub fn read_array_bytes<const N: usize>(&mut self) -> Result<[u8; N]> {
        self.ensure(N as u64)?;
        let mut buffer = [0u8; N];
        self.inner.read_exact(&mut buffer)?;
        self.position += N as u64;
        Ok(buffer)
    }

    /// Read `count` scalars, each in the current byte order
    pub fn read_array<T: Primitive>(&mut self, count: usize) -> Result<Vec<T>> {
        self.ensure(T::SIZE.saturating_mul(count as u64))?;
        (0..count).map(|_| self.read::<T>()).collect()
    }

    /// Read an `i32` element count followed by that many scalars
    pub fn read_prefixed_array<T: Primitive>(&mut self) -> Result<Vec<T>> {
        let count = self.read_length()?;
        self.read_array(count)
    }

    /// Read `count` plain-old-data records by copying their bytes verbatim
    ///
    /// Records are laid out little endian. Swapping every field of a multi byte record
    /// is not something that can be done correctly without knowing its fields, so a
    /// big endian reader refuses rather than handing back corrupted values.
    pub fn read_records<T: Pod>(&mut self, count: usize) -> Result<Vec<T>> {
        let size = std::mem::size_of::<T>();
        if self.endian.is_big() && size > 1 {
            return Err(Error::Unsupported(format!(
                "reversing the byte order of a {size} byte record array"
            )));
        }
        let bytes = self.read_bytes(size.saturating_mul(count))?;
        Ok(bytemuck::pod_collect_to_vec(&bytes))
    }

    /// Read an `i32` length, rejecting negative values
    pub fn read_length(&mut self) -> Result<usize> {
        let position = self.position;
        let length = self.read_i32()?;
        usize::try_from(length).map_err(|_| {
            Error::CustomError(format!("negative length {length} at {position}"))
        })
    }

    /// Read a string of exactly `count` bytes
    pub fn read_string(&mut self, count: usize) -> Result<String> {
        let bytes = self.read_bytes(count)?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Read bytes up to a null terminator, consuming the terminator
    pub fn read_cstring(&mut self) -> Result<String> {
        let start = self.position;
        let mut bytes = Vec::new();
        loop {
            if self.remaining() == 0 {
                return Err(Error::Truncated {
                    position: start,
                    requested: bytes.len() as u64 + 1,
                    available: bytes.len() as u64,
                });
            }
            let byte = self.read_u8()?;
            if byte == 0 {
                break;
            }
            if bytes.len() >= MAX_CSTRING_LENGTH {
                return Err(Error::CustomError(format!(
                    "unterminated string starting at {start}"
                )));
            }
            bytes.push(byte);
        }
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Read an `i32` length prefixed string and realign to four bytes
    pub fn read_aligned_string(&mut self) -> Result<String> {
        let length = self.read_length()?;
        let value = self.read_string(length)?;
        self.align(4)?;
        Ok(value)
    }

    pub fn get_ref(&self) -> &R {
        &self.inner
    }

    /// Unwrap and return the inner reader
    pub fn into_inner(self) -> R {
        self.inner
    }
}

/// Bytes needed to move `position` up to a multiple of `alignment`
pub fn padding_for(position: u64, alignment: u64) -> u64 {
    if alignment == 0 {
        return 0;
    }
    match position % alignment {
        0 => 0,
        rem => alignment - rem,
    }
}
