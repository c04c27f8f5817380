//! Shared plumbing for the asset bundle crates.
//!
//! # Cursors
//!
//! Every format handled by this workspace mixes byte orders: bundle headers are always
//! big endian, serialized files carry a flag that decides the order of everything after
//! their header, and object payloads follow the file they live in. [`EndianReader`] and
//! [`EndianWriter`] carry the byte order as runtime state next to the position.
//!
//! | Operation                       | Byte order applied | Notes                                   |
//! |---------------------------------|--------------------|-----------------------------------------|
//! | scalars, half floats, decimals  | yes                |                                         |
//! | string length prefixes          | yes                | `i32`, negative lengths are rejected    |
//! | null terminated strings         | n/a                |                                         |
//! | raw bytes                       | no                 | copied verbatim                         |
//! | record arrays (`bytemuck::Pod`) | no                 | refused on big endian cursors           |
//! | `align(n)`                      | n/a                | no-op when aligned or at the very end   |
//!
//! # Tags
//!
//! A [`Tag`] names a byte range without opening it: a file, a named entry inside a
//! container, a byte range of another tag, or a numbered split set. A
//! [`ResourceResolver`] turns tags into independent [`Stream`]s. Containers plug in
//! through [`ContainerOpener`] and [`EntrySource`].
//!
//! # Version gates
//!
//! [`GatedField`] tables describe layouts whose fields come and go with the format
//! version; see [`gate`].

pub mod cancel;
pub mod error;
pub mod gate;
pub mod range;
pub mod read;
pub mod resolve;
pub mod split;
pub mod tag;
pub mod types;
pub mod write;

pub use cancel::CancellationToken;
pub use gate::{apply_gated, GatedField};
pub use range::RangeReader;
pub use read::EndianReader;
pub use resolve::{ContainerOpener, EntrySource, ResolverOptions, ResourceResolver, Stream};
pub use split::SplitReader;
pub use tag::{LazyLength, Tag};
pub use types::{Decimal, Endian, Primitive};
pub use write::EndianWriter;
