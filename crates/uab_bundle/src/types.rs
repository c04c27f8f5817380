//! Base types for the structure of a bundle.

use binrw::{binrw, NullString};
use std::io::{Read, Seek, Write};
use uab_io::{EndianReader, EndianWriter, GatedField};

use crate::{
    compression::CompressionKind,
    error::{Error, Result},
};

/// Low bits of a flags word holding a [`CompressionKind`]
pub const COMPRESSION_MASK: u32 = 0x3F;

/// Container layout selected by the signature
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum BundleVariant {
    /// Chunked container with a separate, possibly compressed, block info section
    #[default]
    Fs,

    /// Legacy container, stored uncompressed
    Raw,

    /// Legacy container, LZMA compressed with a 13 byte header
    Web,

    /// Legacy streamed archive, never supported
    Archive,
}

/// Known signatures and the variant each one selects
pub const SIGNATURES: &[(&str, BundleVariant)] = &[
    ("UnityFS", BundleVariant::Fs),
    ("UnityRaw", BundleVariant::Raw),
    ("UnityWeb", BundleVariant::Web),
    ("UnityArchive", BundleVariant::Archive),
];

impl BundleVariant {
    /// Look up an exact signature in [`SIGNATURES`]
    pub fn from_signature(signature: &str) -> Option<Self> {
        SIGNATURES
            .iter()
            .find(|(known, _)| *known == signature)
            .map(|(_, variant)| *variant)
    }

    pub fn signature(self) -> &'static str {
        match self {
            BundleVariant::Fs => "UnityFS",
            BundleVariant::Raw => "UnityRaw",
            BundleVariant::Web => "UnityWeb",
            BundleVariant::Archive => "UnityArchive",
        }
    }
}

/// Signature, format version and the two version strings opening every bundle
#[binrw]
#[brw(big)]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Preamble {
    #[br(map = |value: NullString| String::from_utf8_lossy(&value.0).into_owned())]
    #[bw(map = |value: &String| NullString::from(value.as_str()))]
    pub signature: String,

    pub version: u32,

    /// Minimum player version, usually `5.x.x`
    #[br(map = |value: NullString| String::from_utf8_lossy(&value.0).into_owned())]
    #[bw(map = |value: &String| NullString::from(value.as_str()))]
    pub player_version: String,

    /// Version of the engine that built the bundle
    #[br(map = |value: NullString| String::from_utf8_lossy(&value.0).into_owned())]
    #[bw(map = |value: &String| NullString::from(value.as_str()))]
    pub engine_version: String,
}

/// Flags word of the UnityFS header
#[binrw]
#[brw(big)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ArchiveFlags(pub u32);

impl ArchiveFlags {
    /// Block info and directory share one section
    pub const BLOCKS_AND_DIRECTORY_COMBINED: u32 = 0x40;
    /// Block info section is stored after the data
    pub const BLOCKS_INFO_AT_END: u32 = 0x80;
    /// Old web plugin compatibility marker
    pub const OLD_WEB_PLUGIN_COMPATIBILITY: u32 = 0x100;
    /// Data section starts on a 16 byte boundary
    pub const BLOCK_INFO_NEEDS_PADDING: u32 = 0x200;

    pub fn compression(self) -> Result<CompressionKind> {
        CompressionKind::try_from(self.0 & COMPRESSION_MASK)
    }

    pub fn info_at_end(self) -> bool {
        self.0 & Self::BLOCKS_INFO_AT_END != 0
    }

    pub fn needs_padding(self) -> bool {
        self.0 & Self::BLOCK_INFO_NEEDS_PADDING != 0
    }

    pub fn with_compression(self, kind: CompressionKind) -> Self {
        ArchiveFlags((self.0 & !COMPRESSION_MASK) | u32::from(kind))
    }
}

/// Flags of one chunk
#[binrw]
#[brw(big)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BlockFlags(pub u16);

impl BlockFlags {
    pub const STREAMED: u16 = 0x40;
    pub const ENCRYPTED: u16 = 0x100;

    pub fn from_kind(kind: CompressionKind) -> Self {
        BlockFlags(u32::from(kind) as u16)
    }

    pub fn compression(self) -> Result<CompressionKind> {
        CompressionKind::try_from(u32::from(self.0) & COMPRESSION_MASK)
    }

    pub fn is_streamed(self) -> bool {
        self.0 & Self::STREAMED != 0
    }

    pub fn is_encrypted(self) -> bool {
        self.0 & Self::ENCRYPTED != 0
    }
}

/// Fixed part of the UnityFS header following the version strings
#[binrw]
#[brw(big)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FsHeader {
    /// Total size of the bundle, header included
    pub size: i64,

    /// Size of the block info section as stored
    pub compressed_info_size: u32,

    /// Size of the block info section once decompressed
    pub uncompressed_info_size: u32,

    pub flags: ArchiveFlags,
}

/// Physical description of one chunk of the data section
#[binrw]
#[brw(big)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BlockInfo {
    pub decompressed_size: u32,
    pub compressed_size: u32,
    pub flags: BlockFlags,
}

/// A named logical byte range of the decompressed data
#[binrw]
#[brw(big)]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Block {
    #[br(map = |value: i64| value as u64)]
    #[bw(map = |value: &u64| *value as i64)]
    pub offset: u64,

    #[br(map = |value: i64| value as u64)]
    #[bw(map = |value: &u64| *value as i64)]
    pub size: u64,

    pub flags: u32,

    #[br(map = |name: NullString| String::from_utf8_lossy(&name.0).into_owned())]
    #[bw(map = |name: &String| NullString::from(name.as_str()))]
    pub path: String,
}

impl Block {
    /// Entry holds a serialized file
    pub const SERIALIZED_FILE: u32 = 0x04;

    pub fn end(&self) -> u64 {
        self.offset + self.size
    }

    pub fn is_serialized_file(&self) -> bool {
        self.flags & Self::SERIALIZED_FILE != 0
    }
}

/// The decompressed block info section of a UnityFS bundle
#[binrw]
#[brw(big)]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlocksInfo {
    pub hash: [u8; 16],

    #[br(temp, assert(block_info_count >= 0, "negative chunk count"))]
    #[bw(calc = block_infos.len() as i32)]
    block_info_count: i32,

    #[br(count = block_info_count)]
    pub block_infos: Vec<BlockInfo>,

    #[br(temp, assert(block_count >= 0, "negative entry count"))]
    #[bw(calc = blocks.len() as i32)]
    block_count: i32,

    #[br(count = block_count)]
    pub blocks: Vec<Block>,
}

impl BlocksInfo {
    pub fn decompressed_size(&self) -> u64 {
        self.block_infos
            .iter()
            .map(|info| info.decompressed_size as u64)
            .sum()
    }

    /// Check that every entry lies inside the decompressed data, in order
    pub fn validate(&self) -> Result<()> {
        let total = self.decompressed_size();
        let mut previous_end = 0;
        for block in self.blocks.iter() {
            if block.end() > total {
                return Err(Error::InvalidArchive(format!(
                    "entry {} ends at {} past the data end {total}",
                    block.path,
                    block.end()
                )));
            }
            if block.offset < previous_end {
                return Err(Error::InvalidArchive(format!(
                    "entry {} overlaps the previous entry",
                    block.path
                )));
            }
            previous_end = block.end();
        }
        Ok(())
    }
}

/// The directory of a legacy bundle, stored inside its first decompressed level
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawDirectory {
    pub blocks: Vec<Block>,
}

impl RawDirectory {
    pub fn read<R: Read + Seek>(reader: &mut EndianReader<R>) -> Result<Self> {
        let count = reader.read_length()?;
        let mut blocks = Vec::with_capacity(count.min(4096));
        for _ in 0..count {
            let path = reader.read_cstring()?;
            let offset = reader.read_u32()? as u64;
            let size = reader.read_u32()? as u64;
            blocks.push(Block {
                offset,
                size,
                flags: 0,
                path,
            });
        }
        Ok(RawDirectory { blocks })
    }

    pub fn write<W: Write + Seek>(&self, writer: &mut EndianWriter<W>) -> Result<()> {
        writer.write_length(self.blocks.len())?;
        for block in self.blocks.iter() {
            writer.write_cstring(&block.path)?;
            writer.write_u32(narrow(block.offset, "entry offset")?)?;
            writer.write_u32(narrow(block.size, "entry size")?)?;
        }
        Ok(())
    }

    /// Bytes taken by the directory for the given paths
    pub fn encoded_len<'a>(paths: impl Iterator<Item = &'a str>) -> u64 {
        4 + paths.map(|path| path.len() as u64 + 1 + 8).sum::<u64>()
    }
}

/// Header of the legacy UnityRaw and UnityWeb variants, after the version strings
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawHeader {
    /// Present from version 4
    pub hash: [u8; 16],
    /// Present from version 4
    pub crc: u32,
    pub minimum_streamed_bytes: u32,
    /// Absolute offset of the first level from the start of the bundle
    pub header_size: u32,
    pub levels_before_streaming: u32,
    /// `(compressed, uncompressed)` cumulative sizes per level
    pub levels: Vec<(u32, u32)>,
    /// Present from version 2
    pub complete_file_size: u32,
    /// Present from version 3
    pub file_info_header_size: u32,
}

type RawReadStep<R> = GatedField<u32, EndianReader<R>, RawHeader, Error>;
type RawWriteStep<W> = GatedField<u32, EndianWriter<W>, RawHeader, Error>;

/// Reading steps of [`RawHeader`], in storage order
pub fn raw_header_readers<R: Read + Seek>() -> [RawReadStep<R>; 8] {
    [
        GatedField::since("hash", 4, |r: &mut EndianReader<R>, h: &mut RawHeader| {
            h.hash = r.read_array_bytes()?;
            Ok(())
        }),
        GatedField::since("crc", 4, |r: &mut EndianReader<R>, h: &mut RawHeader| {
            h.crc = r.read_u32()?;
            Ok(())
        }),
        GatedField::since(
            "minimum_streamed_bytes",
            0,
            |r: &mut EndianReader<R>, h: &mut RawHeader| {
                h.minimum_streamed_bytes = r.read_u32()?;
                Ok(())
            },
        ),
        GatedField::since("header_size", 0, |r: &mut EndianReader<R>, h: &mut RawHeader| {
            h.header_size = r.read_u32()?;
            Ok(())
        }),
        GatedField::since(
            "levels_before_streaming",
            0,
            |r: &mut EndianReader<R>, h: &mut RawHeader| {
                h.levels_before_streaming = r.read_u32()?;
                Ok(())
            },
        ),
        GatedField::since("levels", 0, |r: &mut EndianReader<R>, h: &mut RawHeader| {
            let count = r.read_length()?;
            h.levels = (0..count)
                .map(|_| Ok((r.read_u32()?, r.read_u32()?)))
                .collect::<Result<_>>()?;
            Ok(())
        }),
        GatedField::since(
            "complete_file_size",
            2,
            |r: &mut EndianReader<R>, h: &mut RawHeader| {
                h.complete_file_size = r.read_u32()?;
                Ok(())
            },
        ),
        GatedField::since(
            "file_info_header_size",
            3,
            |r: &mut EndianReader<R>, h: &mut RawHeader| {
                h.file_info_header_size = r.read_u32()?;
                Ok(())
            },
        ),
    ]
}

/// Writing steps of [`RawHeader`], mirroring [`raw_header_readers`]
pub fn raw_header_writers<W: Write + Seek>() -> [RawWriteStep<W>; 8] {
    [
        GatedField::since("hash", 4, |w: &mut EndianWriter<W>, h: &mut RawHeader| {
            w.write_bytes(&h.hash)?;
            Ok(())
        }),
        GatedField::since("crc", 4, |w: &mut EndianWriter<W>, h: &mut RawHeader| {
            w.write_u32(h.crc)?;
            Ok(())
        }),
        GatedField::since(
            "minimum_streamed_bytes",
            0,
            |w: &mut EndianWriter<W>, h: &mut RawHeader| {
                w.write_u32(h.minimum_streamed_bytes)?;
                Ok(())
            },
        ),
        GatedField::since("header_size", 0, |w: &mut EndianWriter<W>, h: &mut RawHeader| {
            w.write_u32(h.header_size)?;
            Ok(())
        }),
        GatedField::since(
            "levels_before_streaming",
            0,
            |w: &mut EndianWriter<W>, h: &mut RawHeader| {
                w.write_u32(h.levels_before_streaming)?;
                Ok(())
            },
        ),
        GatedField::since("levels", 0, |w: &mut EndianWriter<W>, h: &mut RawHeader| {
            w.write_length(h.levels.len())?;
            for (compressed, uncompressed) in h.levels.iter() {
                w.write_u32(*compressed)?;
                w.write_u32(*uncompressed)?;
            }
            Ok(())
        }),
        GatedField::since(
            "complete_file_size",
            2,
            |w: &mut EndianWriter<W>, h: &mut RawHeader| {
                w.write_u32(h.complete_file_size)?;
                Ok(())
            },
        ),
        GatedField::since(
            "file_info_header_size",
            3,
            |w: &mut EndianWriter<W>, h: &mut RawHeader| {
                w.write_u32(h.file_info_header_size)?;
                Ok(())
            },
        ),
    ]
}

/// Convert a 64-bit size to the 32-bit field of a legacy header
pub(crate) fn narrow(value: u64, what: &str) -> Result<u32> {
    u32::try_from(value)
        .map_err(|_| Error::InvalidArchive(format!("{what} {value} does not fit in 32 bits")))
}

/// Everything read before the entry table
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BundleHeader {
    pub variant: BundleVariant,
    /// Signature as stored, which may be an alias
    pub signature: String,
    pub version: u32,
    pub player_version: String,
    pub engine_version: String,
    /// Position of the signature in the stream
    pub base_offset: u64,
    /// Set for [`BundleVariant::Fs`]
    pub fs: Option<FsHeader>,
    /// Set for [`BundleVariant::Raw`] and [`BundleVariant::Web`]
    pub raw: Option<RawHeader>,
    /// Content hash from the block info or the legacy header
    pub hash: [u8; 16],
}

#[cfg(test)]
mod test {
    use std::io::Cursor;

    use binrw::{BinRead, BinWrite};
    use pretty_assertions::assert_eq;
    use uab_io::{apply_gated, Endian, EndianReader};

    use super::{
        raw_header_readers, ArchiveFlags, Block, BlockFlags, BlockInfo, BlocksInfo, FsHeader,
        RawHeader,
    };
    use crate::compression::CompressionKind;
    use crate::error::Result;

    #[test]
    fn read_fs_header() -> Result<()> {
        #[rustfmt::skip]
        let mut input = Cursor::new(vec![
            0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x01, 0x00,
            0x00, 0x00, 0x00, 0x20,
            0x00, 0x00, 0x00, 0x40,
            0x00, 0x00, 0x02, 0x43,
        ]);

        let header = FsHeader::read(&mut input)?;
        assert_eq!(
            header,
            FsHeader {
                size: 256,
                compressed_info_size: 32,
                uncompressed_info_size: 64,
                flags: ArchiveFlags(0x243),
            }
        );
        assert_eq!(header.flags.compression()?, CompressionKind::Lz4Hc);
        assert!(header.flags.needs_padding());
        assert!(!header.flags.info_at_end());

        Ok(())
    }

    #[test]
    fn blocks_info_layout() -> Result<()> {
        let info = BlocksInfo {
            hash: [0xAA; 16],
            block_infos: vec![BlockInfo {
                decompressed_size: 5,
                compressed_size: 5,
                flags: BlockFlags(0x40),
            }],
            blocks: vec![Block {
                offset: 0,
                size: 5,
                flags: 4,
                path: "CAB".to_string(),
            }],
        };

        let mut output = Cursor::new(Vec::new());
        info.write(&mut output)?;

        #[rustfmt::skip]
        let expected = [vec![0xAA; 16], vec![
            0x00, 0x00, 0x00, 0x01,
            0x00, 0x00, 0x00, 0x05, 0x00, 0x00, 0x00, 0x05, 0x00, 0x40,
            0x00, 0x00, 0x00, 0x01,
            0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
            0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x05,
            0x00, 0x00, 0x00, 0x04,
            b'C', b'A', b'B', 0x00,
        ]].concat();
        assert_eq!(output.get_ref(), &expected);

        output.set_position(0);
        assert_eq!(BlocksInfo::read(&mut output)?, info);
        assert!(info.block_infos[0].flags.is_streamed());
        info.validate()?;

        Ok(())
    }

    #[test]
    fn overlapping_entries_rejected() {
        let info = BlocksInfo {
            hash: [0; 16],
            block_infos: vec![BlockInfo {
                decompressed_size: 10,
                compressed_size: 10,
                flags: BlockFlags(0),
            }],
            blocks: vec![
                Block {
                    offset: 0,
                    size: 6,
                    ..Default::default()
                },
                Block {
                    offset: 5,
                    size: 5,
                    ..Default::default()
                },
            ],
        };
        assert!(info.validate().is_err());
    }

    fn raw_header_bytes(version: u32) -> Result<u64> {
        let mut reader = EndianReader::new(Cursor::new(vec![0u8; 64]), Endian::Big)?;
        let mut header = RawHeader::default();
        apply_gated(&raw_header_readers(), &version, &mut reader, &mut header)?;
        Ok(reader.position())
    }

    #[test]
    fn raw_header_version_gates() -> Result<()> {
        // four fixed u32 fields plus an empty level list
        assert_eq!(raw_header_bytes(1)?, 16);
        assert_eq!(raw_header_bytes(2)?, 20);
        assert_eq!(raw_header_bytes(3)?, 24);
        assert_eq!(raw_header_bytes(4)?, 24 + 20);

        Ok(())
    }
}
