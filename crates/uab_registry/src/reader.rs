//! The cursor handed to object decoders

use std::{
    io::Cursor,
    ops::{Deref, DerefMut},
};
use uab_io::{Endian, EndianReader};
use uab_serialized::{SerializedVersion, TypeTree};

use crate::{class_id::ClassId, decoder::GameVariant, pptr::PPtr};

/// A cursor over exactly one object's bytes, with the context needed to decode them
///
/// Reads past the object fail with a truncation error instead of running into the
/// next object.
pub struct ObjectReader<'a> {
    reader: EndianReader<Cursor<&'a [u8]>>,
    pub path_id: i64,
    pub class_id: ClassId,
    pub version: SerializedVersion,
    pub unity_version: &'a str,
    pub type_tree: Option<&'a TypeTree>,
    pub game_variant: &'a GameVariant,
}

impl<'a> ObjectReader<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        bytes: &'a [u8],
        endian: Endian,
        path_id: i64,
        class_id: ClassId,
        version: SerializedVersion,
        unity_version: &'a str,
        type_tree: Option<&'a TypeTree>,
        game_variant: &'a GameVariant,
    ) -> uab_io::error::Result<Self> {
        Ok(ObjectReader {
            reader: EndianReader::new(Cursor::new(bytes), endian)?,
            path_id,
            class_id,
            version,
            unity_version,
            type_tree,
            game_variant,
        })
    }

    pub fn read_pptr<T>(&mut self) -> uab_io::error::Result<PPtr<T>> {
        PPtr::read(&mut self.reader, self.version)
    }

    /// The object's bytes, regardless of the cursor position
    pub fn bytes(&self) -> &'a [u8] {
        *self.reader.get_ref().get_ref()
    }
}

impl<'a> Deref for ObjectReader<'a> {
    type Target = EndianReader<Cursor<&'a [u8]>>;

    fn deref(&self) -> &Self::Target {
        &self.reader
    }
}

impl DerefMut for ObjectReader<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.reader
    }
}
