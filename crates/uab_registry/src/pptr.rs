//! Typed references between objects

use std::{
    fmt,
    hash::{Hash, Hasher},
    io::{Read, Seek},
    marker::PhantomData,
};
use uab_io::EndianReader;
use uab_serialized::SerializedVersion;

/// A reference to an object of type `T`, possibly in another file
///
/// `file_index` zero means the file holding the pointer, any other value is one plus
/// an index into that file's external table. An identifier of zero is a null pointer.
pub struct PPtr<T> {
    pub file_index: i32,
    pub path_id: i64,
    marker: PhantomData<fn() -> T>,
}

impl<T> PPtr<T> {
    pub fn new(file_index: i32, path_id: i64) -> Self {
        PPtr {
            file_index,
            path_id,
            marker: PhantomData,
        }
    }

    pub fn null() -> Self {
        PPtr::new(0, 0)
    }

    pub fn is_null(&self) -> bool {
        self.path_id == 0
    }

    /// Reinterpret the target type
    pub fn cast<U>(self) -> PPtr<U> {
        PPtr::new(self.file_index, self.path_id)
    }

    /// Read a pointer; the identifier widens to 64 bits with the object table
    pub fn read<R: Read + Seek>(
        reader: &mut EndianReader<R>,
        version: SerializedVersion,
    ) -> uab_io::error::Result<Self> {
        let file_index = reader.read_i32()?;
        let path_id = if version < SerializedVersion::HAS_64BIT_PATH_ID {
            reader.read_i32()? as i64
        } else {
            reader.read_i64()?
        };
        Ok(PPtr::new(file_index, path_id))
    }
}

impl<T> Clone for PPtr<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for PPtr<T> {}

impl<T> Default for PPtr<T> {
    fn default() -> Self {
        PPtr::null()
    }
}

impl<T> PartialEq for PPtr<T> {
    fn eq(&self, other: &Self) -> bool {
        self.file_index == other.file_index && self.path_id == other.path_id
    }
}

impl<T> Eq for PPtr<T> {}

impl<T> Hash for PPtr<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.file_index.hash(state);
        self.path_id.hash(state);
    }
}

impl<T> fmt::Debug for PPtr<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PPtr")
            .field("file_index", &self.file_index)
            .field("path_id", &self.path_id)
            .finish()
    }
}

#[cfg(test)]
mod test {
    use std::io::Cursor;

    use pretty_assertions::assert_eq;
    use uab_io::{Endian, EndianReader};
    use uab_serialized::SerializedVersion;

    use super::PPtr;

    struct Texture;

    #[test]
    fn identifier_width_follows_version() -> uab_io::error::Result<()> {
        #[rustfmt::skip]
        let input = vec![
            0x01, 0x00, 0x00, 0x00,
            0x2A, 0x00, 0x00, 0x00,
            0x02, 0x00, 0x00, 0x00,
            0x00, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00,
        ];
        let mut reader = EndianReader::new(Cursor::new(input), Endian::Little)?;

        let old = PPtr::<Texture>::read(&mut reader, SerializedVersion(13))?;
        assert_eq!(old, PPtr::new(1, 42));
        let new = PPtr::<Texture>::read(&mut reader, SerializedVersion(17))?;
        assert_eq!(new, PPtr::new(2, 1 << 32));
        assert_eq!(reader.remaining(), 0);

        Ok(())
    }

    #[test]
    fn null_regardless_of_file() {
        assert!(PPtr::<Texture>::new(3, 0).is_null());
        assert!(!PPtr::<Texture>::new(0, -1).is_null());
        assert_eq!(PPtr::<Texture>::new(1, 9).cast::<u8>(), PPtr::new(1, 9));
    }
}
