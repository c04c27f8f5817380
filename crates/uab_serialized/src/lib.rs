//! This library handles reading and writing **serialized files**, the object
//! containers found inside asset bundles and next to game executables.
//!
//! # Serialized File Format Documentation
//!
//! A serialized file has a header, a metadata block describing types and objects, and
//! a data section holding the objects themselves. The layout changed over the format
//! versions 1 to 22 and every field below is gated on the version.
//!
//! ## Header
//!
//! The first four words are always **big endian**.
//!
//! | Field           | Type      | Present       | Description                             |
//! |-----------------|-----------|---------------|-----------------------------------------|
//! | Metadata size   | u32       | always        | zero from version 22                    |
//! | File size       | u32       | always        | zero from version 22                    |
//! | Version         | u32       | always        | format version                          |
//! | Data offset     | u32       | always        | zero from version 22                    |
//! | Endianness      | u8        | version >= 9  | `1` when the rest of the file is big    |
//! | Reserved        | [u8; 3]   | version >= 9  |                                         |
//! | Metadata size   | u32       | version >= 22 |                                         |
//! | File size       | i64       | version >= 22 |                                         |
//! | Data offset     | i64       | version >= 22 |                                         |
//! | Unknown         | i64       | version >= 22 |                                         |
//!
//! Before version 9 the metadata block sits at the end of the file and opens with the
//! endianness byte.
//!
//! ## Metadata
//!
//! | Field              | Type                    | Present               |
//! |--------------------|-------------------------|-----------------------|
//! | Engine version     | null terminated         | version >= 7          |
//! | Target platform    | i32                     | version >= 8          |
//! | Type trees enabled | bool                    | version >= 13         |
//! | Types              | i32 count, then types   | always                |
//! | Big id enabled     | i32                     | versions 7 to 13      |
//! | Objects            | i32 count, then objects | always                |
//! | Script types       | i32 count, then scripts | version >= 11         |
//! | Externals          | i32 count, then files   | always                |
//! | Reference types    | i32 count, then types   | version >= 20         |
//! | User information   | null terminated         | version >= 5          |
//!
//! A type row holds the class id, a stripped flag (16+), a script type index (17+),
//! the script id and old type hash (13+), the type tree when enabled, and from 21 the
//! type dependencies or, for reference types, the class, namespace and assembly names.
//!
//! ## Type trees
//!
//! Versions 10 and 12+ store a flat node table followed by a string buffer. Each node
//! is `u16` version, `u8` level, `u8` flags, `u32` type name offset, `u32` name offset,
//! `i32` byte size, `i32` index, `u32` meta flags and from version 19 a `u64` reference
//! type hash. Offsets with the high bit set index the engine's common string table.
//! Older versions store the tree depth first with inline strings.
//!
//! ## Object rows
//!
//! | Version | Path id       | Start | Size | Type | Class | Destroyed | Script index | Stripped |
//! |---------|---------------|-------|------|------|-------|-----------|--------------|----------|
//! | < 11    | i32 / i64 [1] | u32   | u32  | i32  | u16   | u16       |              |          |
//! | 11..14  | i32 / i64 [1] | u32   | u32  | i32  | u16   |           | i16          |          |
//! | 14      | i64 aligned   | u32   | u32  | i32  | u16   |           | i16          |          |
//! | 15      | i64 aligned   | u32   | u32  | i32  | u16   |           | i16          | u8       |
//! | 16      | i64 aligned   | u32   | u32  | i32  |       |           | i16          | u8       |
//! | 17..22  | i64 aligned   | u32   | u32  | i32  |       |           |              |          |
//! | 22      | i64 aligned   | i64   | u32  | i32  |       |           |              |          |
//!
//! \[1\] 64 bit when the big id flag is set. From version 16 the type column is an
//! index into the type table instead of a class id.
//!

pub mod error;
pub mod read;
pub mod strings;
pub mod type_tree;
pub mod types;
pub mod version;
pub mod write;

pub use read::looks_like_serialized;
pub use type_tree::{TreeNode, TypeTree, TypeTreeNode};
pub use types::{
    ExternalInfo, ObjectInfo, ScriptInfo, SerializedFile, SerializedHeader, SerializedType,
    MONO_BEHAVIOUR,
};
pub use version::{SerializedVersion, UnityVersion};
pub use write::WriteOptions;
