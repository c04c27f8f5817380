//! Type trees describe the field layout of one class.
//!
//! On disk a tree is a flat list of nodes in depth-first order where each node records
//! its nesting level. Two encodings exist: the legacy one writes every node inline with
//! its own strings and child count, the blob one writes fixed size nodes followed by a
//! string buffer.

use indexmap::IndexMap;
use std::io::{Read, Seek, Write};
use tracing::trace;
use uab_io::{EndianReader, EndianWriter};

use crate::{
    error::{Error, Result},
    strings::{self, common_offset},
    version::SerializedVersion,
};

/// One field of a type tree
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TypeTreeNode {
    pub version: i32,
    /// Nesting depth, zero for the root
    pub level: u8,
    /// Bit 0 marks arrays
    pub type_flags: i32,
    pub type_name: String,
    pub name: String,
    /// Size in bytes, or -1 when variable
    pub byte_size: i32,
    pub index: i32,
    pub meta_flag: u32,
    /// Only stored by the oldest legacy revision
    pub variable_count: i32,
    /// Only stored by blob trees from [`SerializedVersion::TYPE_TREE_NODE_WITH_TYPE_FLAGS`]
    pub ref_type_hash: u64,
}

impl TypeTreeNode {
    /// Meta flag asking for the stream to be aligned to four bytes after this field
    pub const ALIGN_BYTES: u32 = 0x4000;

    pub fn new(level: u8, type_name: &str, name: &str, byte_size: i32) -> Self {
        TypeTreeNode {
            version: 1,
            level,
            type_name: type_name.to_string(),
            name: name.to_string(),
            byte_size,
            ..Default::default()
        }
    }

    pub fn is_array(&self) -> bool {
        self.type_flags & 1 != 0
    }

    pub fn is_aligned(&self) -> bool {
        self.meta_flag & Self::ALIGN_BYTES != 0
    }
}

/// A node of the reconstructed hierarchy, pointing back into [`TypeTree::nodes`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TreeNode {
    pub index: usize,
    pub children: Vec<TreeNode>,
}

impl TreeNode {
    pub fn child_indices(&self) -> Vec<usize> {
        self.children.iter().map(|child| child.index).collect()
    }
}

/// Flat, depth-first list of fields
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TypeTree {
    pub nodes: Vec<TypeTreeNode>,
}

impl TypeTree {
    pub fn new(nodes: Vec<TypeTreeNode>) -> Self {
        TypeTree { nodes }
    }

    pub fn root(&self) -> Option<&TypeTreeNode> {
        self.nodes.first()
    }

    /// Rebuild the hierarchy implied by the node levels
    ///
    /// A node is a child of the nearest preceding node one level up. Nodes are kept
    /// on a stack while their subtree is open and attached to their parent once a
    /// node at the same or a lower level shows up.
    pub fn outline(&self) -> Vec<TreeNode> {
        let mut roots = Vec::new();
        let mut open: Vec<(u8, TreeNode)> = Vec::new();

        for (index, node) in self.nodes.iter().enumerate() {
            while open.last().is_some_and(|(level, _)| *level >= node.level) {
                close_subtree(&mut open, &mut roots);
            }
            open.push((
                node.level,
                TreeNode {
                    index,
                    children: Vec::new(),
                },
            ));
        }
        while !open.is_empty() {
            close_subtree(&mut open, &mut roots);
        }
        roots
    }

    /// Index one past the last node of the subtree starting at `index`
    pub fn subtree_end(&self, index: usize) -> usize {
        let Some(level) = self.nodes.get(index).map(|node| node.level) else {
            return index;
        };
        self.nodes[index + 1..]
            .iter()
            .position(|node| node.level <= level)
            .map_or(self.nodes.len(), |offset| index + 1 + offset)
    }

    /// Read a blob encoded tree: node count, buffer size, nodes, then the buffer
    pub fn read_blob<R: Read + Seek>(
        reader: &mut EndianReader<R>,
        version: SerializedVersion,
    ) -> Result<Self> {
        let count = reader.read_length()?;
        let buffer_len = reader.read_length()?;

        let mut raw = Vec::with_capacity(count.min(1 << 16));
        for _ in 0..count {
            let mut node = TypeTreeNode {
                version: reader.read_u16()? as i32,
                level: reader.read_u8()?,
                type_flags: reader.read_u8()? as i32,
                ..Default::default()
            };
            let type_offset = reader.read_u32()?;
            let name_offset = reader.read_u32()?;
            node.byte_size = reader.read_i32()?;
            node.index = reader.read_i32()?;
            node.meta_flag = reader.read_u32()?;
            if version >= SerializedVersion::TYPE_TREE_NODE_WITH_TYPE_FLAGS {
                node.ref_type_hash = reader.read_u64()?;
            }
            raw.push((node, type_offset, name_offset));
        }

        let buffer = reader.read_bytes(buffer_len)?;
        let nodes = raw
            .into_iter()
            .map(|(mut node, type_offset, name_offset)| {
                node.type_name = strings::resolve(&buffer, type_offset).to_string();
                node.name = strings::resolve(&buffer, name_offset).to_string();
                node
            })
            .collect::<Vec<_>>();
        trace!(nodes = nodes.len(), buffer = buffer_len, "read blob type tree");
        Ok(TypeTree { nodes })
    }

    /// Read a legacy tree where every node is followed by its child count
    pub fn read_legacy<R: Read + Seek>(
        reader: &mut EndianReader<R>,
        version: SerializedVersion,
    ) -> Result<Self> {
        let mut nodes = Vec::new();
        let mut pending: Vec<usize> = vec![1];

        while let Some(left) = pending.last_mut() {
            if *left == 0 {
                pending.pop();
                continue;
            }
            *left -= 1;

            let level = u8::try_from(pending.len() - 1)
                .map_err(|_| Error::CustomError("type tree nested too deep".to_string()))?;
            let mut node = TypeTreeNode {
                level,
                type_name: reader.read_cstring()?,
                name: reader.read_cstring()?,
                byte_size: reader.read_i32()?,
                ..Default::default()
            };
            if version == SerializedVersion::LEGACY_VARIABLE_COUNT {
                node.variable_count = reader.read_i32()?;
            }
            if version != SerializedVersion::LEGACY_WITHOUT_INDEX {
                node.index = reader.read_i32()?;
            }
            node.type_flags = reader.read_i32()?;
            node.version = reader.read_i32()?;
            if version != SerializedVersion::LEGACY_WITHOUT_INDEX {
                node.meta_flag = reader.read_u32()?;
            }
            let children = reader.read_length()?;

            nodes.push(node);
            pending.push(children);
        }
        trace!(nodes = nodes.len(), "read legacy type tree");
        Ok(TypeTree { nodes })
    }

    /// Write the blob encoding, sharing names with the common table where possible
    pub fn write_blob<W: Write + Seek>(
        &self,
        writer: &mut EndianWriter<W>,
        version: SerializedVersion,
    ) -> Result<()> {
        let mut buffer = StringBuffer::default();
        let offsets = self
            .nodes
            .iter()
            .map(|node| (buffer.offset(&node.type_name), buffer.offset(&node.name)))
            .collect::<Vec<_>>();

        writer.write_length(self.nodes.len())?;
        writer.write_length(buffer.bytes.len())?;
        for (node, (type_offset, name_offset)) in self.nodes.iter().zip(offsets) {
            writer.write_u16(narrow(node.version, "node version")?)?;
            writer.write_u8(node.level)?;
            writer.write_u8(narrow(node.type_flags, "node type flags")?)?;
            writer.write_u32(type_offset)?;
            writer.write_u32(name_offset)?;
            writer.write_i32(node.byte_size)?;
            writer.write_i32(node.index)?;
            writer.write_u32(node.meta_flag)?;
            if version >= SerializedVersion::TYPE_TREE_NODE_WITH_TYPE_FLAGS {
                writer.write_u64(node.ref_type_hash)?;
            }
        }
        writer.write_bytes(&buffer.bytes)?;
        Ok(())
    }
}

fn close_subtree(open: &mut Vec<(u8, TreeNode)>, roots: &mut Vec<TreeNode>) {
    if let Some((_, done)) = open.pop() {
        match open.last_mut() {
            Some((_, parent)) => parent.children.push(done),
            None => roots.push(done),
        }
    }
}

fn narrow<T: TryFrom<i32>>(value: i32, what: &str) -> Result<T> {
    T::try_from(value).map_err(|_| {
        Error::Unsupported(format!("{what} {value} does not fit the blob encoding"))
    })
}

/// Local string buffer of a blob tree
#[derive(Default)]
struct StringBuffer {
    offsets: IndexMap<String, u32>,
    bytes: Vec<u8>,
}

impl StringBuffer {
    fn offset(&mut self, value: &str) -> u32 {
        if let Some(common) = common_offset(value) {
            return common;
        }
        if let Some(offset) = self.offsets.get(value) {
            return *offset;
        }
        let offset = self.bytes.len() as u32;
        self.bytes.extend_from_slice(value.as_bytes());
        self.bytes.push(0);
        self.offsets.insert(value.to_string(), offset);
        offset
    }
}

#[cfg(test)]
mod test {
    use std::io::Cursor;

    use pretty_assertions::assert_eq;
    use uab_io::{Endian, EndianReader, EndianWriter};

    use super::{TypeTree, TypeTreeNode};
    use crate::error::Result;
    use crate::version::SerializedVersion;

    fn tree_with_levels(levels: &[u8]) -> TypeTree {
        TypeTree::new(
            levels
                .iter()
                .enumerate()
                .map(|(i, level)| TypeTreeNode::new(*level, "int", &format!("f{i}"), 4))
                .collect(),
        )
    }

    #[test]
    fn outline_from_levels() {
        let tree = tree_with_levels(&[0, 1, 1, 2, 1]);
        let roots = tree.outline();
        assert_eq!(roots.len(), 1);

        let root = &roots[0];
        assert_eq!(root.index, 0);
        assert_eq!(root.child_indices(), vec![1, 2, 4]);
        assert!(root.children[0].children.is_empty());
        assert_eq!(root.children[1].child_indices(), vec![3]);
    }

    #[test]
    fn outline_of_deep_tree() {
        let levels: Vec<u8> = (0..=200).collect();
        let roots = tree_with_levels(&levels).outline();
        let mut depth = 0;
        let mut node = &roots[0];
        while let Some(child) = node.children.first() {
            node = child;
            depth += 1;
        }
        assert_eq!(depth, 200);
    }

    #[test]
    fn subtree_bounds() {
        let tree = tree_with_levels(&[0, 1, 1, 2, 1]);
        assert_eq!(tree.subtree_end(0), 5);
        assert_eq!(tree.subtree_end(2), 4);
        assert_eq!(tree.subtree_end(4), 5);
    }

    #[test]
    fn read_legacy_tree() -> Result<()> {
        #[rustfmt::skip]
        let input = vec![
            b'B', b'a', b's', b'e', 0x00, b'B', 0x00,
            0xFF, 0xFF, 0xFF, 0xFF,
            0x00, 0x00, 0x00, 0x00,
            0x00, 0x00, 0x00, 0x00,
            0x01, 0x00, 0x00, 0x00,
            0x00, 0x00, 0x00, 0x00,
            0x01, 0x00, 0x00, 0x00,
            b'i', b'n', b't', 0x00, b'x', 0x00,
            0x04, 0x00, 0x00, 0x00,
            0x01, 0x00, 0x00, 0x00,
            0x00, 0x00, 0x00, 0x00,
            0x01, 0x00, 0x00, 0x00,
            0x00, 0x40, 0x00, 0x00,
            0x00, 0x00, 0x00, 0x00,
        ];
        let mut reader = EndianReader::new(Cursor::new(input), Endian::Little)?;
        let tree = TypeTree::read_legacy(&mut reader, SerializedVersion(9))?;

        assert_eq!(tree.nodes.len(), 2);
        assert_eq!(tree.nodes[0].type_name, "Base");
        assert_eq!(tree.nodes[0].byte_size, -1);
        assert_eq!(tree.nodes[1].level, 1);
        assert_eq!(tree.nodes[1].name, "x");
        assert!(tree.nodes[1].is_aligned());
        assert_eq!(reader.remaining(), 0);

        Ok(())
    }

    #[test]
    fn blob_uses_common_and_local_strings() -> Result<()> {
        let tree = TypeTree::new(vec![
            TypeTreeNode::new(0, "Base", "Base", -1),
            TypeTreeNode::new(1, "int", "m_Speed", 4),
            TypeTreeNode::new(1, "int", "m_Speed", 4),
        ]);

        let mut writer = EndianWriter::new(Cursor::new(Vec::new()), Endian::Little)?;
        tree.write_blob(&mut writer, SerializedVersion(17))?;
        let bytes = writer.into_inner().into_inner();

        // counts, three 24 byte nodes, one local string
        assert_eq!(bytes.len(), 8 + 3 * 24 + 8);
        assert_eq!(&bytes[4..8], &[8, 0, 0, 0]);
        assert_eq!(&bytes[bytes.len() - 8..], b"m_Speed\0");

        let mut reader = EndianReader::new(Cursor::new(bytes), Endian::Little)?;
        assert_eq!(TypeTree::read_blob(&mut reader, SerializedVersion(17))?, tree);

        Ok(())
    }
}
