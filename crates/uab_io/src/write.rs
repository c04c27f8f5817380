//! Endian aware writing
//!

use bytemuck::Pod;
use std::io::{Seek, SeekFrom, Write};

use crate::{
    error::{Error, Result},
    read::padding_for,
    types::{f32_to_f16, Decimal, Endian, Primitive},
};

/// The writing counterpart of [`crate::EndianReader`]
///
/// Writes are only bounded by the capacity of the sink. The position is tracked so
/// that callers can reserve space for a header and come back to it with [`EndianWriter::seek_to`].
pub struct EndianWriter<W> {
    inner: W,
    endian: Endian,
    position: u64,
}

macro_rules! write_scalar {
    ($name:ident, $ty:ty) => {
        pub fn $name(&mut self, value: $ty) -> Result<()> {
            self.write_value(value)
        }
    };
}

impl<W: Write + Seek> EndianWriter<W> {
    pub fn new(mut inner: W, endian: Endian) -> Result<Self> {
        let position = inner.stream_position()?;
        Ok(EndianWriter {
            inner,
            endian,
            position,
        })
    }

    pub fn endian(&self) -> Endian {
        self.endian
    }

    pub fn set_endian(&mut self, endian: Endian) {
        self.endian = endian;
    }

    pub fn position(&self) -> u64 {
        self.position
    }

    /// Move to an absolute position, typically to backpatch a length field
    pub fn seek_to(&mut self, position: u64) -> Result<()> {
        self.inner.seek(SeekFrom::Start(position))?;
        self.position = position;
        Ok(())
    }

    /// Move to the end of the written data
    pub fn seek_end(&mut self) -> Result<u64> {
        self.position = self.inner.seek(SeekFrom::End(0))?;
        Ok(self.position)
    }

    /// Write zero padding up to the next multiple of `alignment`
    pub fn align(&mut self, alignment: u64) -> Result<()> {
        let padding = padding_for(self.position, alignment);
        if padding > 0 {
            self.write_bytes(&vec![0u8; padding as usize])?;
        }
        Ok(())
    }

    /// Write one scalar in the current byte order
    pub fn write_value<T: Primitive>(&mut self, value: T) -> Result<()> {
        value.write_with(&mut self.inner, self.endian)?;
        self.position += T::SIZE;
        Ok(())
    }

    write_scalar!(write_u8, u8);
    write_scalar!(write_i8, i8);
    write_scalar!(write_u16, u16);
    write_scalar!(write_i16, i16);
    write_scalar!(write_u32, u32);
    write_scalar!(write_i32, i32);
    write_scalar!(write_u64, u64);
    write_scalar!(write_i64, i64);
    write_scalar!(write_f32, f32);
    write_scalar!(write_f64, f64);

    pub fn write_bool(&mut self, value: bool) -> Result<()> {
        self.write_u8(value as u8)
    }

    pub fn write_f16(&mut self, value: f32) -> Result<()> {
        self.write_u16(f32_to_f16(value))
    }

    pub fn write_decimal(&mut self, value: Decimal) -> Result<()> {
        self.write_u32(value.lo)?;
        self.write_u32(value.mid)?;
        self.write_u32(value.hi)?;
        self.write_u32(value.flags)
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.inner.write_all(bytes)?;
        self.position += bytes.len() as u64;
        Ok(())
    }

    /// Write each scalar in the current byte order, without a count
    pub fn write_array<T: Primitive>(&mut self, values: &[T]) -> Result<()> {
        values.iter().try_for_each(|value| self.write_value(*value))
    }

    /// Write an `i32` element count followed by the scalars
    pub fn write_prefixed_array<T: Primitive>(&mut self, values: &[T]) -> Result<()> {
        self.write_length(values.len())?;
        self.write_array(values)
    }

    /// Write plain-old-data records verbatim, refusing to do so for a big endian writer
    pub fn write_records<T: Pod>(&mut self, records: &[T]) -> Result<()> {
        let size = std::mem::size_of::<T>();
        if self.endian.is_big() && size > 1 {
            return Err(Error::Unsupported(format!(
                "reversing the byte order of a {size} byte record array"
            )));
        }
        self.write_bytes(bytemuck::cast_slice(records))
    }

    pub fn write_length(&mut self, length: usize) -> Result<()> {
        let length = i32::try_from(length)
            .map_err(|_| Error::CustomError(format!("length {length} does not fit in an i32")))?;
        self.write_i32(length)
    }

    /// Write the string bytes followed by a null terminator
    pub fn write_cstring(&mut self, value: &str) -> Result<()> {
        self.write_bytes(value.as_bytes())?;
        self.write_u8(0)
    }

    /// Write an `i32` length, the string bytes, and zero padding to four bytes
    pub fn write_aligned_string(&mut self, value: &str) -> Result<()> {
        self.write_length(value.len())?;
        self.write_bytes(value.as_bytes())?;
        self.align(4)
    }

    pub fn get_mut(&mut self) -> &mut W {
        &mut self.inner
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write + Seek> Write for EndianWriter<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let written = self.inner.write(buf)?;
        self.position += written as u64;
        Ok(written)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}
