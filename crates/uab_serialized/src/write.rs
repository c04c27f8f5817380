//! Writing serialized files

use bon::Builder;
use std::{
    collections::HashSet,
    io::{Cursor, Write},
};
use tracing::{debug, info, instrument};
use uab_io::{apply_gated, read::padding_for, Endian, EndianWriter};

use crate::{
    error::{Error, Result},
    type_tree::TypeTree,
    types::{
        external_writers, metadata_writers, object_writers, script_writers, ObjectRow,
        SerializedFile, SerializedHeader, SerializedType,
    },
    version::SerializedVersion,
};

/// Options for laying out the object data
#[derive(Debug, Clone, Builder)]
pub struct WriteOptions {
    /// Every object starts on a multiple of this, relative to the data offset
    #[builder(default = 8)]
    pub object_alignment: u64,

    /// The data offset is a multiple of this
    #[builder(default = 16)]
    pub data_alignment: u64,
}

impl Default for WriteOptions {
    fn default() -> Self {
        WriteOptions::builder().build()
    }
}

type Cursorized = EndianWriter<Cursor<Vec<u8>>>;

impl SerializedFile {
    /// Write the file with `payloads[i]` as the data of `objects[i]`
    ///
    /// Object offsets, sizes, the data offset and the header sizes are recomputed.
    /// Fields the version does not store are reset. The returned model is the one a
    /// reader produces for the written bytes.
    ///
    /// Only files whose metadata follows the header can be written, and only with blob
    /// type trees; legacy type trees are refused.
    #[instrument(skip_all, fields(version = %self.header.version, objects = self.objects.len()), err)]
    pub fn write<W: Write, P: AsRef<[u8]>>(
        &self,
        payloads: &[P],
        output: &mut W,
        options: &WriteOptions,
    ) -> Result<SerializedFile> {
        let version = self.header.version;
        if version.has_metadata_at_end() {
            return Err(Error::Unsupported(format!(
                "writing version {version}, which stores its metadata at the end of the file"
            )));
        }
        if payloads.len() != self.objects.len() {
            return Err(Error::CustomError(format!(
                "{} payloads for {} objects",
                payloads.len(),
                self.objects.len()
            )));
        }

        let mut file = self.normalized()?;
        let mut cursor = 0u64;
        for (object, payload) in file.objects.iter_mut().zip(payloads) {
            let payload = payload.as_ref();
            let start = cursor + padding_for(cursor, options.object_alignment);
            object.byte_start = start;
            object.byte_size = u32::try_from(payload.len()).map_err(|_| {
                Error::Unsupported(format!("object of {} bytes", payload.len()))
            })?;
            cursor = start + payload.len() as u64;
        }

        let mut writer = EndianWriter::new(Cursor::new(Vec::new()), Endian::Big)?;
        write_header(&mut writer, &file.header)?;
        let metadata_start = writer.position();

        writer.set_endian(file.header.endian);
        write_metadata(&mut writer, &mut file)?;
        let metadata_end = writer.position();

        let data_offset = metadata_end + padding_for(metadata_end, options.data_alignment);
        writer.write_bytes(&vec![0u8; (data_offset - metadata_end) as usize])?;
        for (object, payload) in file.objects.iter().zip(payloads) {
            let start = data_offset + object.byte_start;
            writer.write_bytes(&vec![0u8; (start - writer.position()) as usize])?;
            writer.write_bytes(payload.as_ref())?;
        }
        let file_size = writer.position();

        file.header.metadata_size = u32::try_from(metadata_end - metadata_start)
            .map_err(|_| Error::Unsupported("metadata larger than 4 GiB".to_string()))?;
        file.header.file_size = file_size;
        file.header.data_offset = data_offset;
        writer.seek_to(0)?;
        write_header(&mut writer, &file.header)?;

        let bytes = writer.into_inner().into_inner();
        output.write_all(&bytes)?;
        info!(size = file_size, data_offset, "wrote serialized file");
        Ok(file)
    }

    /// A copy holding only what the version stores, with resolved type indices
    fn normalized(&self) -> Result<SerializedFile> {
        let version = self.header.version;
        let mut file = self.clone();

        if !(SerializedVersion::HAS_UNITY_VERSION..SerializedVersion::HAS_64BIT_PATH_ID)
            .contains(&version)
        {
            file.big_id_enabled = 0;
        }
        if version < SerializedVersion::HAS_UNITY_VERSION {
            file.unity_version.clear();
        }
        if version < SerializedVersion::HAS_TARGET_PLATFORM {
            file.target_platform = 0;
        }
        if version < SerializedVersion::HAS_TYPE_TREE_HASHES {
            file.enable_type_tree = true;
        }
        if version < SerializedVersion::HAS_SCRIPT_TYPE_INDEX {
            file.scripts.clear();
        }
        if version < SerializedVersion::SUPPORTS_REF_OBJECT {
            file.ref_types.clear();
        }
        if version < SerializedVersion::HAS_EXTERNAL_GUID {
            file.user_information.clear();
        }
        if version < SerializedVersion::LARGE_FILES_SUPPORT {
            file.header.unknown = 0;
        }
        if version < SerializedVersion::HAS_HEADER_ENDIAN {
            file.header.reserved = [0; 3];
        }
        for external in file.externals.iter_mut() {
            if version < SerializedVersion::HAS_EXTERNAL_TEMP_EMPTY {
                external.temp_empty.clear();
            }
            if version < SerializedVersion::HAS_EXTERNAL_GUID {
                external.guid = [0; 16];
                external.kind = 0;
            }
        }

        let enable_type_tree = file.enable_type_tree;
        for ty in file.types.iter_mut() {
            normalize_type(ty, version, enable_type_tree, false)?;
        }
        for ty in file.ref_types.iter_mut() {
            normalize_type(ty, version, enable_type_tree, true)?;
        }

        let mut seen = HashSet::new();
        for object in file.objects.iter_mut() {
            if !seen.insert(object.path_id) {
                return Err(Error::DuplicatePathId(object.path_id));
            }
            let unresolved = Error::UnresolvedType {
                path_id: object.path_id,
                type_id: object.type_id,
            };
            if version < SerializedVersion::REFACTORED_CLASS_ID {
                object.type_index = file
                    .types
                    .iter()
                    .position(|ty| ty.class_id == object.type_id)
                    .ok_or(unresolved)?;
            } else {
                let ty = file.types.get(object.type_index).ok_or(unresolved)?;
                object.type_id = object.type_index as i32;
                object.class_id = ty.class_id;
            }
            if version >= SerializedVersion::HAS_SCRIPT_TYPE_INDEX {
                object.is_destroyed = 0;
            }
            if !(SerializedVersion::HAS_SCRIPT_TYPE_INDEX..SerializedVersion::REFACTOR_TYPE_DATA)
                .contains(&version)
            {
                object.script_type_index = 0;
            }
            if !(SerializedVersion::SUPPORTS_STRIPPED_OBJECT..SerializedVersion::REFACTOR_TYPE_DATA)
                .contains(&version)
            {
                object.stripped = 0;
            }
        }
        Ok(file)
    }
}

fn normalize_type(
    ty: &mut SerializedType,
    version: SerializedVersion,
    enable_type_tree: bool,
    is_ref_type: bool,
) -> Result<()> {
    if version < SerializedVersion::REFACTORED_CLASS_ID {
        ty.is_stripped = false;
    }
    if version < SerializedVersion::REFACTOR_TYPE_DATA {
        ty.script_type_index = -1;
    }
    if version >= SerializedVersion::HAS_TYPE_TREE_HASHES {
        ty.script_id = ty
            .has_script_id(version, is_ref_type)
            .then(|| ty.script_id.unwrap_or_default());
        ty.old_type_hash = Some(ty.old_type_hash.unwrap_or_default());
    } else {
        ty.script_id = None;
        ty.old_type_hash = None;
    }

    if !enable_type_tree {
        ty.tree = None;
    } else if !version.uses_blob_type_tree() {
        return Err(Error::Unsupported(format!(
            "writing legacy type trees (version {version})"
        )));
    } else {
        ty.tree = Some(ty.tree.take().unwrap_or_default());
    }

    let stores_names = enable_type_tree && version >= SerializedVersion::STORES_TYPE_DEPENDENCIES;
    if stores_names && is_ref_type {
        ty.class_name = Some(ty.class_name.take().unwrap_or_default());
        ty.namespace = Some(ty.namespace.take().unwrap_or_default());
        ty.assembly = Some(ty.assembly.take().unwrap_or_default());
    } else {
        ty.class_name = None;
        ty.namespace = None;
        ty.assembly = None;
    }
    if !stores_names || is_ref_type {
        ty.dependencies.clear();
    }
    Ok(())
}

fn write_header(writer: &mut Cursorized, header: &SerializedHeader) -> Result<()> {
    let endian = writer.endian();
    writer.set_endian(Endian::Big);
    let version = header.version;

    if version >= SerializedVersion::LARGE_FILES_SUPPORT {
        writer.write_u32(0)?;
        writer.write_u32(0)?;
        writer.write_u32(version.0)?;
        writer.write_u32(0)?;
    } else {
        let narrow = |value: u64| {
            u32::try_from(value).map_err(|_| {
                Error::Unsupported(format!(
                    "size {value} needs version {}",
                    SerializedVersion::LARGE_FILES_SUPPORT
                ))
            })
        };
        writer.write_u32(header.metadata_size)?;
        writer.write_u32(narrow(header.file_size)?)?;
        writer.write_u32(version.0)?;
        writer.write_u32(narrow(header.data_offset)?)?;
    }
    writer.write_u8(header.endian.as_flag())?;
    writer.write_bytes(&header.reserved)?;

    if version >= SerializedVersion::LARGE_FILES_SUPPORT {
        writer.write_u32(header.metadata_size)?;
        writer.write_i64(header.file_size as i64)?;
        writer.write_i64(header.data_offset as i64)?;
        writer.write_i64(header.unknown as i64)?;
    }
    writer.set_endian(endian);
    Ok(())
}

fn write_metadata(writer: &mut Cursorized, file: &mut SerializedFile) -> Result<()> {
    let version = file.header.version;
    apply_gated(&metadata_writers(), &version, writer, file)?;

    write_types(writer, version, file.enable_type_tree, &file.types, false)?;
    if version >= SerializedVersion::HAS_UNITY_VERSION && version < SerializedVersion::HAS_64BIT_PATH_ID
    {
        writer.write_i32(file.big_id_enabled)?;
    }

    writer.write_length(file.objects.len())?;
    for object in file.objects.iter() {
        let mut row = ObjectRow {
            version,
            big_id: file.big_id_enabled != 0,
            info: object.clone(),
        };
        apply_gated(&object_writers(), &version, writer, &mut row)?;
    }

    if version >= SerializedVersion::HAS_SCRIPT_TYPE_INDEX {
        writer.write_length(file.scripts.len())?;
        for script in file.scripts.iter_mut() {
            apply_gated(&script_writers(), &version, writer, script)?;
        }
    }

    writer.write_length(file.externals.len())?;
    for external in file.externals.iter_mut() {
        apply_gated(&external_writers(), &version, writer, external)?;
    }

    if version >= SerializedVersion::SUPPORTS_REF_OBJECT {
        write_types(writer, version, file.enable_type_tree, &file.ref_types, true)?;
    }
    if version >= SerializedVersion::HAS_EXTERNAL_GUID {
        writer.write_cstring(&file.user_information)?;
    }
    debug!(
        types = file.types.len(),
        objects = file.objects.len(),
        end = writer.position(),
        "wrote metadata"
    );
    Ok(())
}

fn write_types(
    writer: &mut Cursorized,
    version: SerializedVersion,
    enable_type_tree: bool,
    types: &[SerializedType],
    is_ref_type: bool,
) -> Result<()> {
    writer.write_length(types.len())?;
    for ty in types {
        writer.write_i32(ty.class_id)?;
        if version >= SerializedVersion::REFACTORED_CLASS_ID {
            writer.write_bool(ty.is_stripped)?;
        }
        if version >= SerializedVersion::REFACTOR_TYPE_DATA {
            writer.write_i16(ty.script_type_index)?;
        }
        if version >= SerializedVersion::HAS_TYPE_TREE_HASHES {
            if ty.has_script_id(version, is_ref_type) {
                writer.write_bytes(&ty.script_id.unwrap_or_default())?;
            }
            writer.write_bytes(&ty.old_type_hash.unwrap_or_default())?;
        }

        if enable_type_tree {
            match &ty.tree {
                Some(tree) => tree.write_blob(writer, version)?,
                None => TypeTree::default().write_blob(writer, version)?,
            }
            if version >= SerializedVersion::STORES_TYPE_DEPENDENCIES {
                if is_ref_type {
                    writer.write_cstring(ty.class_name.as_deref().unwrap_or_default())?;
                    writer.write_cstring(ty.namespace.as_deref().unwrap_or_default())?;
                    writer.write_cstring(ty.assembly.as_deref().unwrap_or_default())?;
                } else {
                    writer.write_prefixed_array(&ty.dependencies)?;
                }
            }
        }
    }
    Ok(())
}
