//! Base types for the structure of a serialized file.

use binrw::binrw;
use std::io::{Read, Seek, Write};
use uab_io::{Endian, EndianReader, EndianWriter, GatedField};

use crate::{
    error::{Error, Result},
    type_tree::TypeTree,
    version::SerializedVersion,
};

/// The four big endian words every serialized file starts with
#[binrw]
#[brw(big)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeaderWords {
    pub metadata_size: u32,
    pub file_size: u32,
    pub version: u32,
    pub data_offset: u32,
}

/// Header of a serialized file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SerializedHeader {
    /// Size of the metadata, excluding this header
    pub metadata_size: u32,
    pub file_size: u64,
    pub version: SerializedVersion,
    /// Start of the object data, objects are addressed relative to it
    pub data_offset: u64,
    /// Byte order of everything after the header
    pub endian: Endian,
    pub reserved: [u8; 3],
    /// Trailing word of the large file header
    pub unknown: u64,
}

/// Class id of `MonoBehaviour`, whose types carry a script id
pub const MONO_BEHAVIOUR: i32 = 114;

/// One row of the type table
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SerializedType {
    pub class_id: i32,
    pub is_stripped: bool,
    /// Index into the script table, -1 for native classes
    pub script_type_index: i16,
    pub script_id: Option<[u8; 16]>,
    pub old_type_hash: Option<[u8; 16]>,
    pub tree: Option<TypeTree>,
    /// Class name, namespace and assembly of a reference type
    pub class_name: Option<String>,
    pub namespace: Option<String>,
    pub assembly: Option<String>,
    pub dependencies: Vec<i32>,
}

impl SerializedType {
    pub fn new(class_id: i32) -> Self {
        SerializedType {
            class_id,
            script_type_index: -1,
            ..Default::default()
        }
    }

    /// Whether a type row carries a 16 byte script id
    pub fn has_script_id(&self, version: SerializedVersion, is_ref_type: bool) -> bool {
        if version < SerializedVersion::HAS_TYPE_TREE_HASHES {
            return false;
        }
        (is_ref_type && self.script_type_index >= 0)
            || (version < SerializedVersion::REFACTORED_CLASS_ID && self.class_id < 0)
            || (version >= SerializedVersion::REFACTORED_CLASS_ID && self.class_id == MONO_BEHAVIOUR)
    }
}

/// One row of the object table
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectInfo {
    /// Identifier, unique within the file
    pub path_id: i64,
    /// Start of the object relative to [`SerializedHeader::data_offset`]
    pub byte_start: u64,
    pub byte_size: u32,
    /// Type index from [`SerializedVersion::REFACTORED_CLASS_ID`], class id or script type before it
    pub type_id: i32,
    /// Resolved index into [`SerializedFile::types`]
    pub type_index: usize,
    pub class_id: i32,
    pub is_destroyed: u16,
    pub script_type_index: i16,
    pub stripped: u8,
}

/// One row of the script table
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScriptInfo {
    pub file_index: i32,
    pub path_id: i64,
}

/// A file referenced by pointers with a non zero file index
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExternalInfo {
    pub temp_empty: String,
    pub guid: [u8; 16],
    pub kind: i32,
    pub path: String,
}

impl ExternalInfo {
    pub fn new(path: impl ToString) -> Self {
        ExternalInfo {
            path: path.to_string(),
            ..Default::default()
        }
    }

    /// Last path segment, which is how referenced files are matched
    pub fn file_name(&self) -> &str {
        self.path
            .rsplit(|c: char| c == '/' || c == '\\')
            .next()
            .unwrap_or(&self.path)
    }
}

/// Header, metadata and tables of one serialized file
///
/// Object payloads are not part of the model, they are read on demand from the
/// ranges described by [`ObjectInfo`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerializedFile {
    pub header: SerializedHeader,
    pub unity_version: String,
    pub target_platform: i32,
    pub enable_type_tree: bool,
    pub types: Vec<SerializedType>,
    /// Marker for 64-bit identifiers, stored only between two revisions
    pub big_id_enabled: i32,
    pub objects: Vec<ObjectInfo>,
    pub scripts: Vec<ScriptInfo>,
    pub externals: Vec<ExternalInfo>,
    pub ref_types: Vec<SerializedType>,
    pub user_information: String,
}

impl Default for SerializedFile {
    fn default() -> Self {
        SerializedFile {
            header: SerializedHeader {
                version: SerializedVersion::LATEST,
                ..Default::default()
            },
            unity_version: "2019.4.40f1".to_string(),
            target_platform: 0,
            enable_type_tree: true,
            types: Vec::new(),
            big_id_enabled: 0,
            objects: Vec::new(),
            scripts: Vec::new(),
            externals: Vec::new(),
            ref_types: Vec::new(),
            user_information: String::new(),
        }
    }
}

impl SerializedFile {
    pub fn version(&self) -> SerializedVersion {
        self.header.version
    }

    pub fn endian(&self) -> Endian {
        self.header.endian
    }

    /// Linear lookup of an object by identifier
    pub fn object(&self, path_id: i64) -> Option<&ObjectInfo> {
        self.objects.iter().find(|object| object.path_id == path_id)
    }

    pub fn type_of(&self, object: &ObjectInfo) -> Option<&SerializedType> {
        self.types.get(object.type_index)
    }

    /// Absolute range of an object's bytes in the file
    pub fn object_range(&self, object: &ObjectInfo) -> (u64, u64) {
        (self.header.data_offset + object.byte_start, object.byte_size as u64)
    }

    /// Read the bytes of one object from the stream holding the file
    pub fn read_object<R: Read + Seek>(
        &self,
        reader: &mut EndianReader<R>,
        object: &ObjectInfo,
    ) -> Result<Vec<u8>> {
        let (start, size) = self.object_range(object);
        reader.seek_to(start)?;
        Ok(reader.read_bytes(size as usize)?)
    }
}

/// Step of a gated layout over the file's cursor
pub type ReadStep<R, T> = GatedField<SerializedVersion, EndianReader<R>, T, Error>;
pub type WriteStep<W, T> = GatedField<SerializedVersion, EndianWriter<W>, T, Error>;

/// Fields of the metadata preceding the type table
pub fn metadata_readers<R: Read + Seek>() -> [ReadStep<R, SerializedFile>; 3] {
    [
        GatedField::since(
            "unity_version",
            SerializedVersion::HAS_UNITY_VERSION,
            |r: &mut EndianReader<R>, f: &mut SerializedFile| {
                f.unity_version = r.read_cstring()?;
                Ok(())
            },
        ),
        GatedField::since(
            "target_platform",
            SerializedVersion::HAS_TARGET_PLATFORM,
            |r: &mut EndianReader<R>, f: &mut SerializedFile| {
                f.target_platform = r.read_i32()?;
                Ok(())
            },
        ),
        GatedField::since(
            "enable_type_tree",
            SerializedVersion::HAS_TYPE_TREE_HASHES,
            |r: &mut EndianReader<R>, f: &mut SerializedFile| {
                f.enable_type_tree = r.read_bool()?;
                Ok(())
            },
        ),
    ]
}

pub fn metadata_writers<W: Write + Seek>() -> [WriteStep<W, SerializedFile>; 3] {
    [
        GatedField::since(
            "unity_version",
            SerializedVersion::HAS_UNITY_VERSION,
            |w: &mut EndianWriter<W>, f: &mut SerializedFile| {
                w.write_cstring(&f.unity_version)?;
                Ok(())
            },
        ),
        GatedField::since(
            "target_platform",
            SerializedVersion::HAS_TARGET_PLATFORM,
            |w: &mut EndianWriter<W>, f: &mut SerializedFile| {
                w.write_i32(f.target_platform)?;
                Ok(())
            },
        ),
        GatedField::since(
            "enable_type_tree",
            SerializedVersion::HAS_TYPE_TREE_HASHES,
            |w: &mut EndianWriter<W>, f: &mut SerializedFile| {
                w.write_bool(f.enable_type_tree)?;
                Ok(())
            },
        ),
    ]
}

/// An object row while it is read or written, with the context its layout depends on
#[derive(Debug, Clone, Default)]
pub struct ObjectRow {
    pub version: SerializedVersion,
    pub big_id: bool,
    pub info: ObjectInfo,
}

/// Fields of one object row, in storage order
pub fn object_readers<R: Read + Seek>() -> [ReadStep<R, ObjectRow>; 9] {
    use SerializedVersion as V;
    [
        GatedField::since("path_id", V::INITIAL, |r: &mut EndianReader<R>, o: &mut ObjectRow| {
            o.info.path_id = if o.big_id {
                r.read_i64()?
            } else if o.version < V::HAS_64BIT_PATH_ID {
                r.read_i32()? as i64
            } else {
                r.align(4)?;
                r.read_i64()?
            };
            Ok(())
        }),
        GatedField::between(
            "byte_start",
            V::INITIAL,
            V::LARGE_FILES_SUPPORT,
            |r: &mut EndianReader<R>, o: &mut ObjectRow| {
                o.info.byte_start = r.read_u32()? as u64;
                Ok(())
            },
        ),
        GatedField::since(
            "byte_start",
            V::LARGE_FILES_SUPPORT,
            |r: &mut EndianReader<R>, o: &mut ObjectRow| {
                o.info.byte_start = r.read_i64()? as u64;
                Ok(())
            },
        ),
        GatedField::since("byte_size", V::INITIAL, |r: &mut EndianReader<R>, o: &mut ObjectRow| {
            o.info.byte_size = r.read_u32()?;
            Ok(())
        }),
        GatedField::since("type_id", V::INITIAL, |r: &mut EndianReader<R>, o: &mut ObjectRow| {
            o.info.type_id = r.read_i32()?;
            Ok(())
        }),
        GatedField::between(
            "class_id",
            V::INITIAL,
            V::REFACTORED_CLASS_ID,
            |r: &mut EndianReader<R>, o: &mut ObjectRow| {
                o.info.class_id = r.read_u16()? as i32;
                Ok(())
            },
        ),
        GatedField::between(
            "is_destroyed",
            V::INITIAL,
            V::HAS_SCRIPT_TYPE_INDEX,
            |r: &mut EndianReader<R>, o: &mut ObjectRow| {
                o.info.is_destroyed = r.read_u16()?;
                Ok(())
            },
        ),
        GatedField::between(
            "script_type_index",
            V::HAS_SCRIPT_TYPE_INDEX,
            V::REFACTOR_TYPE_DATA,
            |r: &mut EndianReader<R>, o: &mut ObjectRow| {
                o.info.script_type_index = r.read_i16()?;
                Ok(())
            },
        ),
        GatedField::between(
            "stripped",
            V::SUPPORTS_STRIPPED_OBJECT,
            V::REFACTOR_TYPE_DATA,
            |r: &mut EndianReader<R>, o: &mut ObjectRow| {
                o.info.stripped = r.read_u8()?;
                Ok(())
            },
        ),
    ]
}

/// Mirror of [`object_readers`]
pub fn object_writers<W: Write + Seek>() -> [WriteStep<W, ObjectRow>; 9] {
    use SerializedVersion as V;
    [
        GatedField::since("path_id", V::INITIAL, |w: &mut EndianWriter<W>, o: &mut ObjectRow| {
            if o.big_id {
                w.write_i64(o.info.path_id)?;
            } else if o.version < V::HAS_64BIT_PATH_ID {
                w.write_i32(narrow_i32(o.info.path_id, "path id")?)?;
            } else {
                w.align(4)?;
                w.write_i64(o.info.path_id)?;
            }
            Ok(())
        }),
        GatedField::between(
            "byte_start",
            V::INITIAL,
            V::LARGE_FILES_SUPPORT,
            |w: &mut EndianWriter<W>, o: &mut ObjectRow| {
                let start = u32::try_from(o.info.byte_start).map_err(|_| {
                    Error::Unsupported(format!(
                        "object start {} needs the large file layout",
                        o.info.byte_start
                    ))
                })?;
                w.write_u32(start)?;
                Ok(())
            },
        ),
        GatedField::since(
            "byte_start",
            V::LARGE_FILES_SUPPORT,
            |w: &mut EndianWriter<W>, o: &mut ObjectRow| {
                w.write_i64(o.info.byte_start as i64)?;
                Ok(())
            },
        ),
        GatedField::since("byte_size", V::INITIAL, |w: &mut EndianWriter<W>, o: &mut ObjectRow| {
            w.write_u32(o.info.byte_size)?;
            Ok(())
        }),
        GatedField::since("type_id", V::INITIAL, |w: &mut EndianWriter<W>, o: &mut ObjectRow| {
            w.write_i32(o.info.type_id)?;
            Ok(())
        }),
        GatedField::between(
            "class_id",
            V::INITIAL,
            V::REFACTORED_CLASS_ID,
            |w: &mut EndianWriter<W>, o: &mut ObjectRow| {
                w.write_u16(o.info.class_id as u16)?;
                Ok(())
            },
        ),
        GatedField::between(
            "is_destroyed",
            V::INITIAL,
            V::HAS_SCRIPT_TYPE_INDEX,
            |w: &mut EndianWriter<W>, o: &mut ObjectRow| {
                w.write_u16(o.info.is_destroyed)?;
                Ok(())
            },
        ),
        GatedField::between(
            "script_type_index",
            V::HAS_SCRIPT_TYPE_INDEX,
            V::REFACTOR_TYPE_DATA,
            |w: &mut EndianWriter<W>, o: &mut ObjectRow| {
                w.write_i16(o.info.script_type_index)?;
                Ok(())
            },
        ),
        GatedField::between(
            "stripped",
            V::SUPPORTS_STRIPPED_OBJECT,
            V::REFACTOR_TYPE_DATA,
            |w: &mut EndianWriter<W>, o: &mut ObjectRow| {
                w.write_u8(o.info.stripped)?;
                Ok(())
            },
        ),
    ]
}

/// Script rows keep their own identifier width switch
pub fn script_readers<R: Read + Seek>() -> [ReadStep<R, ScriptInfo>; 3] {
    use SerializedVersion as V;
    [
        GatedField::since("file_index", V::INITIAL, |r: &mut EndianReader<R>, s: &mut ScriptInfo| {
            s.file_index = r.read_i32()?;
            Ok(())
        }),
        GatedField::between(
            "path_id",
            V::INITIAL,
            V::HAS_64BIT_PATH_ID,
            |r: &mut EndianReader<R>, s: &mut ScriptInfo| {
                s.path_id = r.read_i32()? as i64;
                Ok(())
            },
        ),
        GatedField::since(
            "path_id",
            V::HAS_64BIT_PATH_ID,
            |r: &mut EndianReader<R>, s: &mut ScriptInfo| {
                r.align(4)?;
                s.path_id = r.read_i64()?;
                Ok(())
            },
        ),
    ]
}

pub fn script_writers<W: Write + Seek>() -> [WriteStep<W, ScriptInfo>; 3] {
    use SerializedVersion as V;
    [
        GatedField::since("file_index", V::INITIAL, |w: &mut EndianWriter<W>, s: &mut ScriptInfo| {
            w.write_i32(s.file_index)?;
            Ok(())
        }),
        GatedField::between(
            "path_id",
            V::INITIAL,
            V::HAS_64BIT_PATH_ID,
            |w: &mut EndianWriter<W>, s: &mut ScriptInfo| {
                w.write_i32(narrow_i32(s.path_id, "script path id")?)?;
                Ok(())
            },
        ),
        GatedField::since(
            "path_id",
            V::HAS_64BIT_PATH_ID,
            |w: &mut EndianWriter<W>, s: &mut ScriptInfo| {
                w.align(4)?;
                w.write_i64(s.path_id)?;
                Ok(())
            },
        ),
    ]
}

pub fn external_readers<R: Read + Seek>() -> [ReadStep<R, ExternalInfo>; 4] {
    use SerializedVersion as V;
    [
        GatedField::since(
            "temp_empty",
            V::HAS_EXTERNAL_TEMP_EMPTY,
            |r: &mut EndianReader<R>, e: &mut ExternalInfo| {
                e.temp_empty = r.read_cstring()?;
                Ok(())
            },
        ),
        GatedField::since("guid", V::HAS_EXTERNAL_GUID, |r: &mut EndianReader<R>, e: &mut ExternalInfo| {
            e.guid = r.read_array_bytes()?;
            Ok(())
        }),
        GatedField::since("kind", V::HAS_EXTERNAL_GUID, |r: &mut EndianReader<R>, e: &mut ExternalInfo| {
            e.kind = r.read_i32()?;
            Ok(())
        }),
        GatedField::since("path", V::INITIAL, |r: &mut EndianReader<R>, e: &mut ExternalInfo| {
            e.path = r.read_cstring()?;
            Ok(())
        }),
    ]
}

pub fn external_writers<W: Write + Seek>() -> [WriteStep<W, ExternalInfo>; 4] {
    use SerializedVersion as V;
    [
        GatedField::since(
            "temp_empty",
            V::HAS_EXTERNAL_TEMP_EMPTY,
            |w: &mut EndianWriter<W>, e: &mut ExternalInfo| {
                w.write_cstring(&e.temp_empty)?;
                Ok(())
            },
        ),
        GatedField::since("guid", V::HAS_EXTERNAL_GUID, |w: &mut EndianWriter<W>, e: &mut ExternalInfo| {
            w.write_bytes(&e.guid)?;
            Ok(())
        }),
        GatedField::since("kind", V::HAS_EXTERNAL_GUID, |w: &mut EndianWriter<W>, e: &mut ExternalInfo| {
            w.write_i32(e.kind)?;
            Ok(())
        }),
        GatedField::since("path", V::INITIAL, |w: &mut EndianWriter<W>, e: &mut ExternalInfo| {
            w.write_cstring(&e.path)?;
            Ok(())
        }),
    ]
}

fn narrow_i32(value: i64, what: &str) -> Result<i32> {
    i32::try_from(value)
        .map_err(|_| Error::Unsupported(format!("{what} {value} does not fit in 32 bits")))
}

#[cfg(test)]
mod test {
    use std::io::Cursor;

    use pretty_assertions::assert_eq;
    use uab_io::{apply_gated, Endian, EndianReader};

    use super::{external_readers, object_readers, ExternalInfo, ObjectRow, SerializedType};
    use crate::error::Result;
    use crate::version::SerializedVersion;

    fn object_row_len(version: u32, big_id: bool) -> Result<u64> {
        let mut reader = EndianReader::new(Cursor::new(vec![0u8; 64]), Endian::Little)?;
        let mut row = ObjectRow {
            version: SerializedVersion(version),
            big_id,
            ..Default::default()
        };
        let version = row.version;
        apply_gated(&object_readers(), &version, &mut reader, &mut row)?;
        Ok(reader.position())
    }

    #[test]
    fn object_row_widths() -> Result<()> {
        // id, start, size, type id, class id, destroyed
        assert_eq!(object_row_len(10, false)?, 4 + 4 + 4 + 4 + 2 + 2);
        assert_eq!(object_row_len(10, true)?, 8 + 4 + 4 + 4 + 2 + 2);
        // destroyed replaced by the script type index
        assert_eq!(object_row_len(11, false)?, 4 + 4 + 4 + 4 + 2 + 2);
        assert_eq!(object_row_len(14, false)?, 8 + 4 + 4 + 4 + 2 + 2);
        assert_eq!(object_row_len(15, false)?, 8 + 4 + 4 + 4 + 2 + 2 + 1);
        assert_eq!(object_row_len(16, false)?, 8 + 4 + 4 + 4 + 2 + 1);
        assert_eq!(object_row_len(17, false)?, 8 + 4 + 4 + 4);
        assert_eq!(object_row_len(21, false)?, 8 + 4 + 4 + 4);
        assert_eq!(object_row_len(22, false)?, 8 + 8 + 4 + 4);

        Ok(())
    }

    #[test]
    fn external_row() -> Result<()> {
        #[rustfmt::skip]
        let mut input = vec![
            0x00,
            0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08,
            0x09, 0x0A, 0x0B, 0x0C, 0x0D, 0x0E, 0x0F, 0x10,
            0x03, 0x00, 0x00, 0x00,
        ];
        input.extend_from_slice(b"archive:/CAB-abc/CAB-abc\0");

        let mut reader = EndianReader::new(Cursor::new(input), Endian::Little)?;
        let mut external = ExternalInfo::default();
        assert_eq!(
            apply_gated(&external_readers(), &SerializedVersion(17), &mut reader, &mut external)?,
            4
        );
        assert_eq!(external.kind, 3);
        assert_eq!(external.guid[15], 0x10);
        assert_eq!(external.file_name(), "CAB-abc");

        let mut reader = EndianReader::new(Cursor::new(b"library/x.asset\0".to_vec()), Endian::Little)?;
        let mut old = ExternalInfo::default();
        apply_gated(&external_readers(), &SerializedVersion(4), &mut reader, &mut old)?;
        assert_eq!(old.file_name(), "x.asset");

        Ok(())
    }

    #[test]
    fn script_id_condition() {
        let script = SerializedType::new(114);
        assert!(script.has_script_id(SerializedVersion(17), false));
        assert!(!script.has_script_id(SerializedVersion(12), false));

        let old_script = SerializedType::new(-3);
        assert!(old_script.has_script_id(SerializedVersion(15), false));
        assert!(!old_script.has_script_id(SerializedVersion(16), false));

        let mut referenced = SerializedType::new(0);
        assert!(!referenced.has_script_id(SerializedVersion(20), true));
        referenced.script_type_index = 2;
        assert!(referenced.has_script_id(SerializedVersion(20), true));
    }
}
