#![allow(dead_code)]

use std::{
    io::Cursor,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};
use uab_bundle::{BundleWriter, BundleWriterOptions};
use uab_registry::{ClassId, DecodeError, ObjectReader, Payload};
use uab_serialized::{
    ExternalInfo, ObjectInfo, SerializedFile, SerializedType, TypeTree, WriteOptions,
};

/// One object of a fixture file: identifier, class and payload
pub type Object = (i64, ClassId, Vec<u8>);

/// Write a serialized file holding `objects` and referencing `externals`
pub fn serialized(objects: &[Object], externals: &[&str]) -> Vec<u8> {
    with_trees(objects, externals, &[])
}

/// Like [`serialized`], storing a type tree for some classes
pub fn with_trees(objects: &[Object], externals: &[&str], trees: &[(ClassId, TypeTree)]) -> Vec<u8> {
    let mut file = SerializedFile::default();
    file.enable_type_tree = !trees.is_empty();

    let mut classes: Vec<ClassId> = Vec::new();
    for (_, class_id, _) in objects {
        if !classes.contains(class_id) {
            classes.push(*class_id);
        }
    }
    file.types = classes
        .iter()
        .map(|class_id| {
            let mut ty = SerializedType::new(class_id.0);
            ty.tree = trees
                .iter()
                .find(|(id, _)| id == class_id)
                .map(|(_, tree)| tree.clone());
            ty
        })
        .collect();
    file.objects = objects
        .iter()
        .map(|(path_id, class_id, _)| ObjectInfo {
            path_id: *path_id,
            type_index: classes.iter().position(|id| id == class_id).unwrap_or(0),
            ..Default::default()
        })
        .collect();
    file.externals = externals.iter().map(|path| ExternalInfo::new(path)).collect();

    let payloads: Vec<&[u8]> = objects.iter().map(|(_, _, payload)| payload.as_slice()).collect();
    let mut bytes: Vec<u8> = Vec::new();
    file.write(&payloads, &mut bytes, &WriteOptions::default())
        .expect("fixture file");
    bytes
}

/// A bundle with the given entries
pub fn bundle(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = BundleWriter::new(Cursor::new(Vec::new()), BundleWriterOptions::default());
    for (name, bytes) in entries {
        writer.add_entry(*name, 4, bytes).expect("fixture entry");
    }
    writer.finish().expect("fixture bundle").into_inner()
}

/// Decoder reading one `u32`, counting its calls
pub fn counting_u32(
    counter: Arc<AtomicUsize>,
) -> impl Fn(&mut ObjectReader<'_>) -> Result<Payload, DecodeError> + Send + Sync {
    move |reader: &mut ObjectReader<'_>| {
        counter.fetch_add(1, Ordering::SeqCst);
        let value = reader.read_u32()?;
        Ok(Arc::new(value) as Payload)
    }
}
