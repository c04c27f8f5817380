//! Parsing of serialized files

use binrw::BinRead;
use std::{
    collections::HashSet,
    io::{Cursor, Read, Seek, SeekFrom},
};
use tracing::{debug, info, instrument, warn};
use uab_io::{apply_gated, Endian, EndianReader};

use crate::{
    error::{Error, Result},
    type_tree::TypeTree,
    types::{
        external_readers, metadata_readers, object_readers, script_readers, ExternalInfo,
        HeaderWords, ObjectInfo, ObjectRow, ScriptInfo, SerializedFile, SerializedHeader,
        SerializedType,
    },
    version::SerializedVersion,
};

/// Cheap check of whether `bytes` hold a serialized file
///
/// Resource blobs stored next to serialized files in a bundle fail this check, so it
/// is used to decide which bundle entries to parse.
pub fn looks_like_serialized(bytes: &[u8]) -> bool {
    let total = bytes.len() as u64;
    let mut cursor = Cursor::new(bytes);
    let Ok(words) = HeaderWords::read(&mut cursor) else {
        return false;
    };
    let version = SerializedVersion(words.version);
    if !version.is_plausible() {
        return false;
    }

    let (file_size, data_offset) = if version >= SerializedVersion::LARGE_FILES_SUPPORT {
        if total < version.header_len() || cursor.seek(SeekFrom::Start(24)).is_err() {
            return false;
        }
        let mut reader = match EndianReader::new(cursor, Endian::Big) {
            Ok(reader) => reader,
            Err(_) => return false,
        };
        match (reader.read_i64(), reader.read_i64()) {
            (Ok(file_size), Ok(data_offset)) => (file_size as u64, data_offset as u64),
            _ => return false,
        }
    } else {
        (words.file_size as u64, words.data_offset as u64)
    };

    file_size == total && data_offset <= total
}

/// Run `parse`, wrapping any error with the section name and start position
fn section<R: Read + Seek, T>(
    name: &'static str,
    reader: &mut EndianReader<R>,
    parse: impl FnOnce(&mut EndianReader<R>) -> Result<T>,
) -> Result<T> {
    let position = reader.position();
    let value = parse(reader).map_err(|source| Error::Section {
        section: name,
        position,
        source: Box::new(source),
    })?;
    debug!(section = name, start = position, end = reader.position(), "parsed section");
    Ok(value)
}

impl SerializedFile {
    /// Parse a serialized file held in memory
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        SerializedFile::read(Cursor::new(bytes))
    }

    /// Parse the header and metadata of a serialized file
    ///
    /// The file must start at position zero of `reader`; wrap it in a
    /// [`uab_io::RangeReader`] when it is embedded in a larger stream. Object data is
    /// not read, see [`SerializedFile::read_object`].
    #[instrument(skip(reader), err)]
    pub fn read<R: Read + Seek>(mut reader: R) -> Result<Self> {
        reader.seek(SeekFrom::Start(0))?;
        let words = HeaderWords::read(&mut reader).map_err(|source| Error::Section {
            section: "header",
            position: 0,
            source: Box::new(Error::from(source)),
        })?;
        let mut reader = EndianReader::new(reader, Endian::Big)?;
        let header = section("header", &mut reader, |r| read_header(r, words))?;
        let version = header.version;
        reader.set_endian(header.endian);

        let mut file = SerializedFile {
            header,
            unity_version: String::new(),
            target_platform: 0,
            enable_type_tree: true,
            types: Vec::new(),
            big_id_enabled: 0,
            objects: Vec::new(),
            scripts: Vec::new(),
            externals: Vec::new(),
            ref_types: Vec::new(),
            user_information: String::new(),
        };

        section("metadata", &mut reader, |r| {
            apply_gated(&metadata_readers(), &version, r, &mut file).map(|_| ())
        })?;
        let enable_type_tree = file.enable_type_tree;
        file.types = section("types", &mut reader, |r| {
            read_types(r, version, enable_type_tree, false)
        })?;

        if version >= SerializedVersion::HAS_UNITY_VERSION
            && version < SerializedVersion::HAS_64BIT_PATH_ID
        {
            file.big_id_enabled = reader.read_i32()?;
        }
        let big_id = file.big_id_enabled != 0;
        file.objects = section("objects", &mut reader, |r| {
            read_objects(r, version, big_id, &file.types)
        })?;

        if version >= SerializedVersion::HAS_SCRIPT_TYPE_INDEX {
            file.scripts = section("scripts", &mut reader, |r| read_scripts(r, version))?;
        }
        file.externals = section("externals", &mut reader, |r| read_externals(r, version))?;
        if version >= SerializedVersion::SUPPORTS_REF_OBJECT {
            file.ref_types = section("ref_types", &mut reader, |r| {
                read_types(r, version, enable_type_tree, true)
            })?;
        }
        if version >= SerializedVersion::HAS_EXTERNAL_GUID {
            file.user_information =
                section("user_information", &mut reader, |r| Ok(r.read_cstring()?))?;
        }

        info!(
            version = %version,
            unity = file.unity_version.as_str(),
            types = file.types.len(),
            objects = file.objects.len(),
            externals = file.externals.len(),
            "read serialized file"
        );
        Ok(file)
    }
}

fn read_header<R: Read + Seek>(
    reader: &mut EndianReader<R>,
    words: HeaderWords,
) -> Result<SerializedHeader> {
    let version = SerializedVersion(words.version);
    if !version.is_plausible() {
        return Err(Error::InvalidHeader(format!("format version {version}")));
    }
    if version > SerializedVersion::LATEST {
        warn!(version = %version, "format version is newer than any known layout");
    }

    let mut header = SerializedHeader {
        metadata_size: words.metadata_size,
        file_size: words.file_size as u64,
        version,
        data_offset: words.data_offset as u64,
        ..Default::default()
    };

    if version >= SerializedVersion::HAS_HEADER_ENDIAN {
        header.endian = Endian::from_flag(reader.read_u8()?);
        header.reserved = reader.read_array_bytes()?;
    } else {
        // the byte order opens the metadata block at the end of the file
        let metadata_start = header
            .file_size
            .checked_sub(header.metadata_size as u64)
            .ok_or_else(|| {
                Error::InvalidHeader(format!(
                    "metadata of {} bytes is larger than the {} byte file",
                    header.metadata_size, header.file_size
                ))
            })?;
        reader.seek_to(metadata_start)?;
        header.endian = Endian::from_flag(reader.read_u8()?);
    }

    if version >= SerializedVersion::LARGE_FILES_SUPPORT {
        header.metadata_size = reader.read_u32()?;
        header.file_size = reader.read_i64()? as u64;
        header.data_offset = reader.read_i64()? as u64;
        header.unknown = reader.read_i64()? as u64;
    }

    Ok(header)
}

fn read_types<R: Read + Seek>(
    reader: &mut EndianReader<R>,
    version: SerializedVersion,
    enable_type_tree: bool,
    is_ref_type: bool,
) -> Result<Vec<SerializedType>> {
    let count = reader.read_length()?;
    (0..count)
        .map(|_| read_type(reader, version, enable_type_tree, is_ref_type))
        .collect()
}

fn read_type<R: Read + Seek>(
    reader: &mut EndianReader<R>,
    version: SerializedVersion,
    enable_type_tree: bool,
    is_ref_type: bool,
) -> Result<SerializedType> {
    let mut ty = SerializedType::new(reader.read_i32()?);
    if version >= SerializedVersion::REFACTORED_CLASS_ID {
        ty.is_stripped = reader.read_bool()?;
    }
    if version >= SerializedVersion::REFACTOR_TYPE_DATA {
        ty.script_type_index = reader.read_i16()?;
    }
    if version >= SerializedVersion::HAS_TYPE_TREE_HASHES {
        if ty.has_script_id(version, is_ref_type) {
            ty.script_id = Some(reader.read_array_bytes()?);
        }
        ty.old_type_hash = Some(reader.read_array_bytes()?);
    }

    if enable_type_tree {
        ty.tree = Some(if version.uses_blob_type_tree() {
            TypeTree::read_blob(reader, version)?
        } else {
            TypeTree::read_legacy(reader, version)?
        });

        if version >= SerializedVersion::STORES_TYPE_DEPENDENCIES {
            if is_ref_type {
                ty.class_name = Some(reader.read_cstring()?);
                ty.namespace = Some(reader.read_cstring()?);
                ty.assembly = Some(reader.read_cstring()?);
            } else {
                ty.dependencies = reader.read_prefixed_array()?;
            }
        }
    }
    Ok(ty)
}

fn read_objects<R: Read + Seek>(
    reader: &mut EndianReader<R>,
    version: SerializedVersion,
    big_id: bool,
    types: &[SerializedType],
) -> Result<Vec<ObjectInfo>> {
    let count = reader.read_length()?;
    let mut objects = Vec::with_capacity(count.min(1 << 16));
    let mut seen = HashSet::with_capacity(count.min(1 << 16));

    for _ in 0..count {
        let mut row = ObjectRow {
            version,
            big_id,
            info: ObjectInfo::default(),
        };
        apply_gated(&object_readers(), &version, reader, &mut row)?;
        let mut info = row.info;

        let (path_id, type_id) = (info.path_id, info.type_id);
        let unresolved = || Error::UnresolvedType { path_id, type_id };
        if version < SerializedVersion::REFACTORED_CLASS_ID {
            // objects name their class, the type row has to be searched for
            info.type_index = types
                .iter()
                .position(|ty| ty.class_id == type_id)
                .ok_or_else(unresolved)?;
        } else {
            let index = usize::try_from(type_id).map_err(|_| unresolved())?;
            let ty = types.get(index).ok_or_else(unresolved)?;
            info.type_index = index;
            info.class_id = ty.class_id;
        }

        if !seen.insert(info.path_id) {
            return Err(Error::DuplicatePathId(info.path_id));
        }
        objects.push(info);
    }
    Ok(objects)
}

fn read_scripts<R: Read + Seek>(
    reader: &mut EndianReader<R>,
    version: SerializedVersion,
) -> Result<Vec<ScriptInfo>> {
    let count = reader.read_length()?;
    (0..count)
        .map(|_| {
            let mut script = ScriptInfo::default();
            apply_gated(&script_readers(), &version, reader, &mut script)?;
            Ok(script)
        })
        .collect()
}

fn read_externals<R: Read + Seek>(
    reader: &mut EndianReader<R>,
    version: SerializedVersion,
) -> Result<Vec<ExternalInfo>> {
    let count = reader.read_length()?;
    (0..count)
        .map(|_| {
            let mut external = ExternalInfo::default();
            apply_gated(&external_readers(), &version, reader, &mut external)?;
            Ok(external)
        })
        .collect()
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::looks_like_serialized;
    use crate::error::Error;
    use crate::types::SerializedFile;

    #[rustfmt::skip]
    fn version_nine_file() -> Vec<u8> {
        let mut bytes = vec![
            // metadata size, file size, version, data offset
            0x00, 0x00, 0x00, 0x1D,
            0x00, 0x00, 0x00, 0x38,
            0x00, 0x00, 0x00, 0x09,
            0x00, 0x00, 0x00, 0x30,
            // little endian, reserved
            0x00, 0x00, 0x00, 0x00,
        ];
        bytes.extend_from_slice(b"3.5.7f6\0");
        bytes.extend_from_slice(&[
            // platform
            0x05, 0x00, 0x00, 0x00,
            // no types
            0x00, 0x00, 0x00, 0x00,
            // big id marker
            0x00, 0x00, 0x00, 0x00,
            // no objects
            0x00, 0x00, 0x00, 0x00,
            // no externals
            0x00, 0x00, 0x00, 0x00,
            // user information
            0x00,
        ]);
        bytes.extend_from_slice(&[0u8; 7]);
        bytes
    }

    #[test]
    fn read_minimal_version_nine() -> crate::error::Result<()> {
        let bytes = version_nine_file();
        assert_eq!(bytes.len(), 0x38);
        assert!(looks_like_serialized(&bytes));

        let file = SerializedFile::from_bytes(&bytes)?;
        assert_eq!(file.version().0, 9);
        assert_eq!(file.unity_version, "3.5.7f6");
        assert_eq!(file.target_platform, 5);
        assert!(file.enable_type_tree);
        assert!(file.objects.is_empty());

        Ok(())
    }

    #[test]
    fn truncation_reports_section() {
        let bytes = version_nine_file();
        let error = SerializedFile::from_bytes(&bytes[..30]).unwrap_err();
        assert!(matches!(error, Error::Section { section: "metadata", .. }));
        assert!(matches!(
            error.root(),
            Error::Stream(uab_io::error::Error::Truncated { .. })
        ));
    }

    #[test]
    fn resource_blobs_are_not_serialized() {
        assert!(!looks_like_serialized(&[0u8; 8]));
        assert!(!looks_like_serialized(&[0xFFu8; 64]));

        let mut wrong_size = version_nine_file();
        wrong_size.push(0);
        assert!(!looks_like_serialized(&wrong_size));
    }
}
