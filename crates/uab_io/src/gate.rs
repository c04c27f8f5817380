//! Version gated field tables
//!
//! Formats that grew fields over many revisions are described as an ordered list of
//! [`GatedField`] steps. Each step names the first version that carries the field and,
//! optionally, the first version that dropped it. [`apply_gated`] runs the steps
//! that are live for a version against one cursor, in order.
//!
//! ```
//! use std::io::Cursor;
//! use uab_io::{apply_gated, Endian, EndianReader, GatedField};
//!
//! #[derive(Default)]
//! struct Header {
//!     size: u32,
//!     crc: u32,
//! }
//!
//! type Reader = EndianReader<Cursor<Vec<u8>>>;
//!
//! fn fields() -> [GatedField<u32, Reader, Header>; 2] {
//!     [
//!         GatedField::since("size", 1, |r: &mut Reader, h: &mut Header| {
//!             h.size = r.read_u32()?;
//!             Ok(())
//!         }),
//!         GatedField::since("crc", 4, |r: &mut Reader, h: &mut Header| {
//!             h.crc = r.read_u32()?;
//!             Ok(())
//!         }),
//!     ]
//! }
//!
//! # fn main() -> uab_io::error::Result<()> {
//! let mut reader = EndianReader::new(Cursor::new(vec![0, 0, 0, 9]), Endian::Big)?;
//! let mut header = Header::default();
//! assert_eq!(apply_gated(&fields(), &3, &mut reader, &mut header)?, 1);
//! assert_eq!(header.size, 9);
//! # Ok(())
//! # }
//! ```

use std::fmt::Debug;
use tracing::trace;

/// Reads or writes one field of `T` through the cursor `C`
pub type FieldFn<C, T, E> = fn(&mut C, &mut T) -> Result<(), E>;

/// One step of a version gated layout
pub struct GatedField<V, C, T, E = crate::error::Error> {
    /// Field name, reported in traces
    pub name: &'static str,
    /// First version carrying the field
    pub since: V,
    /// First version no longer carrying the field
    pub until: Option<V>,
    pub apply: FieldFn<C, T, E>,
}

impl<V: PartialOrd, C, T, E> GatedField<V, C, T, E> {
    pub const fn since(name: &'static str, since: V, apply: FieldFn<C, T, E>) -> Self {
        GatedField {
            name,
            since,
            until: None,
            apply,
        }
    }

    pub const fn between(name: &'static str, since: V, until: V, apply: FieldFn<C, T, E>) -> Self {
        GatedField {
            name,
            since,
            until: Some(until),
            apply,
        }
    }

    /// Whether the field is present at `version`
    pub fn is_live(&self, version: &V) -> bool {
        *version >= self.since && self.until.as_ref().map_or(true, |until| version < until)
    }
}

/// Apply every live step in order, returning how many were applied
pub fn apply_gated<V, C, T, E>(
    fields: &[GatedField<V, C, T, E>],
    version: &V,
    cursor: &mut C,
    target: &mut T,
) -> Result<usize, E>
where
    V: PartialOrd + Debug,
{
    let mut applied = 0;
    for field in fields.iter().filter(|field| field.is_live(version)) {
        trace!(field = field.name, ?version, "applying gated field");
        (field.apply)(cursor, target)?;
        applied += 1;
    }
    Ok(applied)
}

#[cfg(test)]
mod test {
    use std::io::Cursor;

    use pretty_assertions::assert_eq;

    use super::{apply_gated, GatedField};
    use crate::{error::Result, read::EndianReader, types::Endian};

    type Reader = EndianReader<Cursor<Vec<u8>>>;

    #[derive(Debug, Default, PartialEq)]
    struct Sample {
        a: u8,
        b: u16,
        c: u32,
    }

    fn fields() -> [GatedField<u32, Reader, Sample>; 3] {
        [
            GatedField::since("a", 0, |r: &mut Reader, s: &mut Sample| {
                s.a = r.read_u8()?;
                Ok(())
            }),
            GatedField::between("b", 2, 5, |r: &mut Reader, s: &mut Sample| {
                s.b = r.read_u16()?;
                Ok(())
            }),
            GatedField::since("c", 4, |r: &mut Reader, s: &mut Sample| {
                s.c = r.read_u32()?;
                Ok(())
            }),
        ]
    }

    fn consumed(version: u32) -> Result<u64> {
        let mut reader = EndianReader::new(Cursor::new(vec![1u8; 16]), Endian::Little)?;
        let mut sample = Sample::default();
        apply_gated(&fields(), &version, &mut reader, &mut sample)?;
        Ok(reader.position())
    }

    #[test]
    fn thresholds() -> Result<()> {
        assert_eq!(consumed(1)?, 1);
        assert_eq!(consumed(2)?, 3);
        assert_eq!(consumed(3)?, 3);
        assert_eq!(consumed(4)?, 7);
        assert_eq!(consumed(5)?, 5);

        Ok(())
    }
}
