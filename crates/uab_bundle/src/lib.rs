//! This library handles reading from, creating and rebuilding **asset bundles**.
//!
//! # Asset Bundle Format Documentation
//!
//! An asset bundle wraps one or more named entries (serialized files, resource blobs)
//! in a compressed container. Three layouts are handled, selected by the signature.
//! Every header field is **big endian**; the entries keep whatever byte order they
//! were written with.
//!
//! ## Preamble
//!
//! | Field           | Type            | Description                                      |
//! |-----------------|-----------------|--------------------------------------------------|
//! | Signature       | null terminated | `UnityFS`, `UnityRaw`, `UnityWeb`                |
//! | Format version  | u32             | 6 to 8 for `UnityFS`, 1 to 5 for the others      |
//! | Player version  | null terminated | minimum player, usually `5.x.x`                  |
//! | Engine version  | null terminated | engine that built the bundle, e.g. `2019.4.40f1` |
//!
//! The signature does not have to be at offset zero: the first kilobyte is searched
//! for the `Unity` marker, and aliases can map custom signatures onto a layout.
//! `UnityArchive` is recognised and rejected.
//!
//! ## UnityFS
//!
//! | Field                  | Type | Description                                          |
//! |------------------------|------|------------------------------------------------------|
//! | Size                   | i64  | total size of the bundle                             |
//! | Compressed info size   | u32  | block info section as stored                         |
//! | Uncompressed info size | u32  | block info section once decompressed                 |
//! | Flags                  | u32  | see below                                            |
//!
//! From version 7 the header is padded to 16 bytes. The flags word holds:
//!
//! - `0x3F`: compression of the block info section
//! - `0x40`: block info and directory are combined
//! - `0x80`: the block info section is at the end of the stream rather than after the header
//! - `0x200`: the data section starts on a 16 byte boundary
//!
//! The decompressed block info section holds a 16 byte hash, an `i32` count of chunks,
//! each chunk as `u32` decompressed size, `u32` compressed size, `u16` flags (`0x3F`
//! compression, `0x40` streamed, `0x100` encrypted), an `i32` count of entries and
//! each entry as `i64` offset, `i64` size, `u32` flags, null terminated path. Entry
//! offsets address the concatenation of all decompressed chunks.
//!
//! ## UnityRaw and UnityWeb
//!
//! | Field                   | Type     | Present       |
//! |-------------------------|----------|---------------|
//! | Hash                    | [u8; 16] | version >= 4  |
//! | CRC                     | u32      | version >= 4  |
//! | Minimum streamed bytes  | u32      | always        |
//! | Header size             | u32      | always        |
//! | Levels before streaming | u32      | always        |
//! | Levels                  | i32 count, then `(u32, u32)` pairs | always |
//! | Complete file size      | u32      | version >= 2  |
//! | File info header size   | u32      | version >= 3  |
//!
//! The payload starts at the header size and is a single chunk, stored as is for
//! `UnityRaw` and as an LZMA-alone stream for `UnityWeb`. The directory is not in the
//! header: it is the start of the decompressed payload (`i32` count, then null
//! terminated path, `u32` offset, `u32` size per entry).
//!
//! ## Compression
//!
//! - `0`: none
//! - `1`: LZMA, five property bytes followed by the raw stream
//! - `2`, `3`: LZ4 and LZ4HC, both read with the LZ4 block decoder
//! - `4`: LZHAM, recognised but unsupported
//!

pub mod compression;
pub mod error;
pub mod read;
pub mod source;
pub mod types;
pub mod write;

pub use compression::{BuiltinCodec, Codec, CompressionKind};
pub use read::{BundleEntry, BundleFile, BundleOptions};
pub use source::{BundleEntries, BundleOpener};
pub use types::{Block, BlockInfo, BundleHeader, BundleVariant};
pub use write::{rebuild, BundleWriter, BundleWriterOptions, RebuildEntry, RebuildSource};
