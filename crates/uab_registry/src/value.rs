//! Decoding objects generically from their type tree
//!
//! Every node of the tree is read according to its type name. Primitive names map to
//! scalars, `string` and `TypelessData` to length prefixed data, nodes flagged as
//! arrays read an `i32` count and repeat their element subtree, `map` reads its
//! `pair` elements into key/value lists, and every other node reads its children in
//! order. A node with the `0x4000` meta flag aligns the stream to four bytes after it.

use indexmap::IndexMap;
use std::{
    io::{Read, Seek},
    sync::Arc,
};
use uab_io::EndianReader;
use uab_serialized::{TypeTree, TypeTreeNode};

#[cfg(feature = "serde")]
use serde::Serialize;

use crate::{
    decoder::{ObjectDecoder, Payload},
    error::DecodeError,
    reader::ObjectReader,
};

/// A field value read through a type tree
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize), serde(untagged))]
pub enum Value {
    Bool(bool),
    I8(i8),
    U8(u8),
    I16(i16),
    U16(u16),
    I32(i32),
    U32(u32),
    I64(i64),
    U64(u64),
    F32(f32),
    F64(f64),
    String(String),
    Bytes(Vec<u8>),
    Array(Vec<Value>),
    Map(Vec<(Value, Value)>),
    Object(IndexMap<String, Value>),
}

impl Value {
    /// A field of an object value
    pub fn get(&self, name: &str) -> Option<&Value> {
        match self {
            Value::Object(fields) => fields.get(name),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        Some(match *self {
            Value::I8(v) => v as i64,
            Value::U8(v) => v as i64,
            Value::I16(v) => v as i64,
            Value::U16(v) => v as i64,
            Value::I32(v) => v as i64,
            Value::U32(v) => v as i64,
            Value::I64(v) => v,
            Value::U64(v) => i64::try_from(v).ok()?,
            _ => return None,
        })
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }
}

/// Read the value described by `tree` from the reader's position
pub fn read_value<R: Read + Seek>(
    tree: &TypeTree,
    reader: &mut EndianReader<R>,
) -> Result<Value, DecodeError> {
    if tree.nodes.is_empty() {
        return Err(DecodeError::Invalid("empty type tree".to_string()));
    }
    let (value, _) = read_node(&tree.nodes, 0, reader)?;
    Ok(value)
}

/// Decoder producing a [`Value`] for any object whose file carries type trees
#[derive(Debug, Clone, Copy, Default)]
pub struct TypeTreeDecoder;

impl ObjectDecoder for TypeTreeDecoder {
    fn decode(&self, reader: &mut ObjectReader<'_>) -> Result<Payload, DecodeError> {
        let tree = reader
            .type_tree
            .ok_or(DecodeError::MissingTypeTree(reader.class_id))?;
        let value = read_value(tree, &mut **reader)?;
        Ok(Arc::new(value))
    }
}

/// Children of `index` as (start, end) node ranges
fn children(nodes: &[TypeTreeNode], index: usize) -> Vec<(usize, usize)> {
    let end = subtree_end(nodes, index);
    let mut result = Vec::new();
    let mut child = index + 1;
    while child < end {
        let child_end = subtree_end(nodes, child);
        result.push((child, child_end));
        child = child_end;
    }
    result
}

fn subtree_end(nodes: &[TypeTreeNode], index: usize) -> usize {
    let level = nodes[index].level;
    nodes[index + 1..]
        .iter()
        .position(|node| node.level <= level)
        .map_or(nodes.len(), |offset| index + 1 + offset)
}

/// Read the node at `index`, returning its value and the index following its subtree
fn read_node<R: Read + Seek>(
    nodes: &[TypeTreeNode],
    index: usize,
    reader: &mut EndianReader<R>,
) -> Result<(Value, usize), DecodeError> {
    let node = &nodes[index];
    let end = subtree_end(nodes, index);
    let kids = children(nodes, index);
    let mut align = node.is_aligned();

    let value = match node.type_name.as_str() {
        "string" => {
            // the character array child carries the alignment flag
            align |= kids.first().is_some_and(|(child, _)| nodes[*child].is_aligned());
            let length = reader.read_length()?;
            let bytes = reader.read_bytes(length)?;
            Value::String(String::from_utf8_lossy(&bytes).into_owned())
        }
        "TypelessData" => {
            let length = reader.read_length()?;
            Value::Bytes(reader.read_bytes(length)?)
        }
        "map" => {
            let (array, _) = kids
                .first()
                .copied()
                .ok_or_else(|| DecodeError::Invalid(format!("map {} has no array", node.name)))?;
            align |= nodes[array].is_aligned();
            let pair = children(nodes, array)
                .get(1)
                .copied()
                .ok_or_else(|| DecodeError::Invalid(format!("map {} has no pair", node.name)))?;
            let (first, second) = match children(nodes, pair.0).as_slice() {
                [first, second] => (first.0, second.0),
                _ => return Err(DecodeError::Invalid(format!("malformed pair in {}", node.name))),
            };
            let count = reader.read_length()?;
            let mut entries = Vec::with_capacity(count.min(4096));
            for _ in 0..count {
                let start = reader.position();
                let (key, _) = read_node(nodes, first, reader)?;
                let (value, _) = read_node(nodes, second, reader)?;
                check_progress(&node.name, count, start, reader)?;
                entries.push((key, value));
            }
            Value::Map(entries)
        }
        _ if node.is_array() || node.type_name == "Array" => read_array(nodes, index, &kids, reader)?,
        name => match read_primitive(name, reader)? {
            Some(value) => value,
            None => read_fields(nodes, &kids, reader)?,
        },
    };

    if align {
        reader.align(4)?;
    }
    Ok((value, end))
}

fn read_fields<R: Read + Seek>(
    nodes: &[TypeTreeNode],
    kids: &[(usize, usize)],
    reader: &mut EndianReader<R>,
) -> Result<Value, DecodeError> {
    // vectors wrap their array in a single field
    if let [(only, _)] = kids {
        let child = &nodes[*only];
        if child.is_array() || child.type_name == "Array" {
            let (value, _) = read_node(nodes, *only, reader)?;
            return Ok(value);
        }
    }

    let mut fields = IndexMap::with_capacity(kids.len());
    for (child, _) in kids {
        let (value, _) = read_node(nodes, *child, reader)?;
        fields.insert(nodes[*child].name.clone(), value);
    }
    Ok(Value::Object(fields))
}

fn read_array<R: Read + Seek>(
    nodes: &[TypeTreeNode],
    index: usize,
    kids: &[(usize, usize)],
    reader: &mut EndianReader<R>,
) -> Result<Value, DecodeError> {
    let (element, element_end) = kids.get(1).copied().ok_or_else(|| {
        DecodeError::Invalid(format!("array {} has no element type", nodes[index].name))
    })?;
    let count = reader.read_length()?;

    let element_node = &nodes[element];
    let leaf = element_end == element + 1;
    if leaf && matches!(element_node.type_name.as_str(), "UInt8" | "char" | "SInt8") {
        let bytes = reader.read_bytes(count)?;
        if element_node.is_aligned() {
            reader.align(4)?;
        }
        return Ok(Value::Bytes(bytes));
    }

    let mut items = Vec::with_capacity(count.min(4096));
    for _ in 0..count {
        let start = reader.position();
        let (item, _) = read_node(nodes, element, reader)?;
        check_progress(&nodes[index].name, count, start, reader)?;
        items.push(item);
    }
    Ok(Value::Array(items))
}

/// Elements that read nothing may only repeat as often as there are bytes left
fn check_progress<R: Read + Seek>(
    name: &str,
    count: usize,
    start: u64,
    reader: &EndianReader<R>,
) -> Result<(), DecodeError> {
    if reader.position() == start && count as u64 > reader.remaining() {
        return Err(DecodeError::Invalid(format!(
            "{name} declares {count} elements that take no space"
        )));
    }
    Ok(())
}

fn read_primitive<R: Read + Seek>(
    type_name: &str,
    reader: &mut EndianReader<R>,
) -> Result<Option<Value>, DecodeError> {
    Ok(Some(match type_name {
        "bool" => Value::Bool(reader.read_bool()?),
        "SInt8" => Value::I8(reader.read_i8()?),
        "UInt8" | "char" => Value::U8(reader.read_u8()?),
        "SInt16" | "short" => Value::I16(reader.read_i16()?),
        "UInt16" | "unsigned short" => Value::U16(reader.read_u16()?),
        "SInt32" | "int" | "Type*" => Value::I32(reader.read_i32()?),
        "UInt32" | "unsigned int" => Value::U32(reader.read_u32()?),
        "SInt64" | "long long" => Value::I64(reader.read_i64()?),
        "UInt64" | "unsigned long long" | "FileSize" => Value::U64(reader.read_u64()?),
        "float" => Value::F32(reader.read_f32()?),
        "double" => Value::F64(reader.read_f64()?),
        _ => return Ok(None),
    }))
}

#[cfg(test)]
mod test {
    use std::io::Cursor;

    use indexmap::IndexMap;
    use pretty_assertions::assert_eq;
    use uab_io::{Endian, EndianReader};
    use uab_serialized::{TypeTree, TypeTreeNode};

    use super::{read_value, Value};
    use crate::error::DecodeError;

    fn aligned(mut node: TypeTreeNode) -> TypeTreeNode {
        node.meta_flag |= TypeTreeNode::ALIGN_BYTES;
        node
    }

    fn array(level: u8) -> TypeTreeNode {
        let mut node = TypeTreeNode::new(level, "Array", "Array", -1);
        node.type_flags = 1;
        node
    }

    fn game_object_tree() -> TypeTree {
        TypeTree::new(vec![
            TypeTreeNode::new(0, "GameObject", "Base", -1),
            TypeTreeNode::new(1, "vector", "m_Component", -1),
            array(2),
            TypeTreeNode::new(3, "int", "size", 4),
            TypeTreeNode::new(3, "PPtr<Component>", "data", 12),
            TypeTreeNode::new(4, "int", "m_FileID", 4),
            TypeTreeNode::new(4, "SInt64", "m_PathID", 8),
            TypeTreeNode::new(1, "unsigned int", "m_Layer", 4),
            TypeTreeNode::new(1, "string", "m_Name", -1),
            aligned(array(2)),
            TypeTreeNode::new(3, "int", "size", 4),
            TypeTreeNode::new(3, "char", "data", 1),
            aligned(TypeTreeNode::new(1, "bool", "m_IsActive", 1)),
            TypeTreeNode::new(1, "float", "m_Weight", 4),
        ])
    }

    #[test]
    fn read_game_object() -> Result<(), DecodeError> {
        #[rustfmt::skip]
        let input = vec![
            // one component pointer
            0x01, 0x00, 0x00, 0x00,
            0x00, 0x00, 0x00, 0x00,
            0x07, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
            // layer
            0x05, 0x00, 0x00, 0x00,
            // name, padded to four bytes
            0x03, 0x00, 0x00, 0x00,
            b'C', b'a', b'm', 0x00,
            // active, padded
            0x01, 0x00, 0x00, 0x00,
            // weight
            0x00, 0x00, 0x80, 0x3F,
        ];
        let mut reader = EndianReader::new(Cursor::new(input), Endian::Little)?;
        let value = read_value(&game_object_tree(), &mut reader)?;
        assert_eq!(reader.remaining(), 0);

        let mut pointer = IndexMap::new();
        pointer.insert("m_FileID".to_string(), Value::I32(0));
        pointer.insert("m_PathID".to_string(), Value::I64(7));
        assert_eq!(
            value.get("m_Component"),
            Some(&Value::Array(vec![Value::Object(pointer)]))
        );
        assert_eq!(value.get("m_Layer").and_then(Value::as_i64), Some(5));
        assert_eq!(value.get("m_Name").and_then(Value::as_str), Some("Cam"));
        assert_eq!(value.get("m_IsActive"), Some(&Value::Bool(true)));
        assert_eq!(value.get("m_Weight"), Some(&Value::F32(1.0)));

        Ok(())
    }

    #[test]
    fn read_map_and_bytes() -> Result<(), DecodeError> {
        let tree = TypeTree::new(vec![
            TypeTreeNode::new(0, "Thing", "Base", -1),
            TypeTreeNode::new(1, "map", "m_Table", -1),
            array(2),
            TypeTreeNode::new(3, "int", "size", 4),
            TypeTreeNode::new(3, "pair", "data", -1),
            TypeTreeNode::new(4, "int", "first", 4),
            TypeTreeNode::new(4, "float", "second", 4),
            TypeTreeNode::new(1, "TypelessData", "m_Blob", -1),
            TypeTreeNode::new(1, "vector", "m_Raw", -1),
            aligned(array(2)),
            TypeTreeNode::new(3, "int", "size", 4),
            TypeTreeNode::new(3, "UInt8", "data", 1),
        ]);
        #[rustfmt::skip]
        let input = vec![
            0x00, 0x00, 0x00, 0x02,
            0x00, 0x00, 0x00, 0x01, 0x3F, 0x80, 0x00, 0x00,
            0x00, 0x00, 0x00, 0x02, 0x40, 0x00, 0x00, 0x00,
            0x00, 0x00, 0x00, 0x02, 0xAA, 0xBB,
            0x00, 0x00, 0x00, 0x01, 0xCC,
        ];
        let mut reader = EndianReader::new(Cursor::new(input), Endian::Big)?;
        let value = read_value(&tree, &mut reader)?;

        assert_eq!(
            value.get("m_Table"),
            Some(&Value::Map(vec![
                (Value::I32(1), Value::F32(1.0)),
                (Value::I32(2), Value::F32(2.0)),
            ]))
        );
        assert_eq!(value.get("m_Blob"), Some(&Value::Bytes(vec![0xAA, 0xBB])));
        assert_eq!(value.get("m_Raw"), Some(&Value::Bytes(vec![0xCC])));

        Ok(())
    }

    #[test]
    fn empty_elements_with_huge_count() -> Result<(), DecodeError> {
        let tree = TypeTree::new(vec![
            TypeTreeNode::new(0, "Thing", "Base", -1),
            TypeTreeNode::new(1, "vector", "m_List", -1),
            array(2),
            TypeTreeNode::new(3, "int", "size", 4),
            TypeTreeNode::new(3, "Empty", "data", 0),
        ]);
        let mut reader =
            EndianReader::new(Cursor::new(0x7FFF_FFFFi32.to_le_bytes().to_vec()), Endian::Little)?;
        assert!(matches!(
            read_value(&tree, &mut reader),
            Err(DecodeError::Invalid(_))
        ));

        // a short run of empty elements is still fine
        let input = vec![3, 0, 0, 0, 0xAA, 0xBB, 0xCC, 0xDD];
        let mut reader = EndianReader::new(Cursor::new(input), Endian::Little)?;
        let value = read_value(&tree, &mut reader)?;
        assert_eq!(
            value.get("m_List"),
            Some(&Value::Array(vec![Value::Object(IndexMap::new()); 3]))
        );

        Ok(())
    }

    #[test]
    fn truncated_object() {
        let mut reader = EndianReader::new(Cursor::new(vec![0x01, 0x00]), Endian::Little)
            .unwrap();
        assert!(matches!(
            read_value(&game_object_tree(), &mut reader),
            Err(DecodeError::Stream(uab_io::error::Error::Truncated { .. }))
        ));
    }
}
