//! Types for writing and rebuilding bundles
//!

use binrw::BinWrite;
use bon::Builder;
use std::{
    io::{self, Cursor, Read, Seek, SeekFrom, Write},
    mem,
    sync::Arc,
};
use tracing::{debug, info, instrument};
use uab_io::{apply_gated, read::padding_for, CancellationToken, Endian, EndianWriter};

use crate::{
    compression::{compress_or_store, BuiltinCodec, Codec, CompressionKind},
    error::{Error, Result},
    read::BundleFile,
    types::{
        narrow, raw_header_writers, ArchiveFlags, Block, BlockFlags, BlockInfo, BlocksInfo,
        BundleHeader, BundleVariant, FsHeader, Preamble, RawDirectory, RawHeader,
    },
};

/// Decompressed size of each chunk written by default
pub const DEFAULT_CHUNK_SIZE: u32 = 0x20000;

/// Options for how the bundle should be written
#[derive(Debug, Clone, Builder)]
pub struct BundleWriterOptions {
    /// Container layout, which decides the signature
    #[builder(default)]
    pub variant: BundleVariant,

    /// Format version, defaults to 7 for UnityFS and 3 for the legacy variants
    pub version: Option<u32>,

    #[builder(into, default = "5.x.x".to_string())]
    pub player_version: String,

    #[builder(into, default = "2019.4.40f1".to_string())]
    pub engine_version: String,

    /// Compression for data chunks; LZMA always produces a single chunk
    #[builder(default)]
    pub block_compression: CompressionKind,

    /// Compression for the block info section
    #[builder(default)]
    pub info_compression: CompressionKind,

    /// Decompressed size of each chunk
    #[builder(default = DEFAULT_CHUNK_SIZE)]
    pub chunk_size: u32,

    /// Store the block info section after the data
    #[builder(default)]
    pub info_at_end: bool,

    /// Start the data section on a 16 byte boundary
    #[builder(default)]
    pub info_padding: bool,

    #[builder(default)]
    pub hash: [u8; 16],

    #[builder(default = Arc::new(BuiltinCodec) as Arc<dyn Codec>)]
    pub codec: Arc<dyn Codec>,
}

impl Default for BundleWriterOptions {
    fn default() -> Self {
        BundleWriterOptions::builder().build()
    }
}

impl BundleWriterOptions {
    /// Options reproducing the layout of an existing bundle with new data compression
    pub fn matching(header: &BundleHeader, block_compression: CompressionKind) -> Self {
        let flags = header.fs.map(|fs| fs.flags).unwrap_or_default();
        BundleWriterOptions::builder()
            .variant(header.variant)
            .version(header.version)
            .player_version(header.player_version.clone())
            .engine_version(header.engine_version.clone())
            .block_compression(block_compression)
            .info_compression(flags.compression().unwrap_or_default())
            .info_at_end(flags.info_at_end())
            .info_padding(flags.needs_padding())
            .hash(header.hash)
            .build()
    }

    pub fn effective_version(&self) -> u32 {
        self.version.unwrap_or(match self.variant {
            BundleVariant::Fs => 7,
            _ => 3,
        })
    }
}

/// Bundle generator
///
/// Entry data is buffered until [`BundleWriter::finish`], which chunks, compresses
/// and writes everything in one pass before going back to fill in the total size.
///
/// ```
/// # fn doit() -> uab_bundle::error::Result<()>
/// # {
/// use std::io::Write;
/// use uab_bundle::{BundleWriter, BundleWriterOptions, CompressionKind};
///
/// let mut bundle = BundleWriter::new(
///     std::io::Cursor::new(Vec::new()),
///     BundleWriterOptions::builder()
///         .block_compression(CompressionKind::Lz4Hc)
///         .build(),
/// );
///
/// bundle.start_entry("CAB-hello", 4)?;
/// bundle.write_all(b"Hello, World!")?;
///
/// let bytes = bundle.finish()?.into_inner();
/// assert!(bytes.starts_with(b"UnityFS\0"));
/// # Ok(())
/// # }
/// # doit().unwrap();
/// ```
pub struct BundleWriter<W: Write + Seek> {
    inner: W,
    options: BundleWriterOptions,
    data: Vec<u8>,
    blocks: Vec<Block>,
    current: Option<Block>,
}

impl<W: Write + Seek> BundleWriter<W> {
    pub fn new(inner: W, options: BundleWriterOptions) -> BundleWriter<W> {
        BundleWriter {
            inner,
            options,
            data: Vec::new(),
            blocks: Vec::new(),
            current: None,
        }
    }

    /// Returns true if an entry is currently open for writing.
    pub const fn is_writing_entry(&self) -> bool {
        self.current.is_some()
    }

    /// Start a new entry; bytes written afterwards belong to it
    #[instrument(skip(self, path), err)]
    pub fn start_entry(&mut self, path: impl ToString, flags: u32) -> Result<()> {
        if self.current.is_some() {
            self.finish_entry();
        }
        self.current = Some(Block {
            offset: self.data.len() as u64,
            size: 0,
            flags,
            path: path.to_string(),
        });
        Ok(())
    }

    fn finish_entry(&mut self) {
        if let Some(mut block) = self.current.take() {
            block.size = self.data.len() as u64 - block.offset;
            self.blocks.push(block);
        }
    }

    /// Add a whole entry at once
    pub fn add_entry(&mut self, path: impl ToString, flags: u32, bytes: &[u8]) -> Result<()> {
        self.start_entry(path, flags)?;
        self.data.extend_from_slice(bytes);
        self.finish_entry();
        Ok(())
    }

    /// Finish the last entry and write the bundle
    #[instrument(skip(self), err)]
    pub fn finish(mut self) -> Result<W> {
        self.finish_entry();
        match self.options.variant {
            BundleVariant::Fs => self.write_fs()?,
            BundleVariant::Raw | BundleVariant::Web => self.write_legacy()?,
            BundleVariant::Archive => {
                return Err(Error::UnsupportedVariant(
                    BundleVariant::Archive.signature().to_string(),
                ))
            }
        }
        info!(
            variant = ?self.options.variant,
            entries = self.blocks.len(),
            size = self.data.len(),
            "wrote bundle"
        );
        Ok(self.inner)
    }

    fn preamble(&self) -> Preamble {
        Preamble {
            signature: self.options.variant.signature().to_string(),
            version: self.options.effective_version(),
            player_version: self.options.player_version.clone(),
            engine_version: self.options.engine_version.clone(),
        }
    }

    /// Split the data into chunks and compress each of them
    fn chunks(&self) -> Result<(Vec<BlockInfo>, Vec<Vec<u8>>)> {
        let codec = self.options.codec.as_ref();
        let kind = self.options.block_compression;
        let pieces: Vec<&[u8]> = if self.data.is_empty() {
            Vec::new()
        } else if kind == CompressionKind::Lzma {
            vec![&self.data[..]]
        } else {
            self.data
                .chunks(self.options.chunk_size.max(1) as usize)
                .collect()
        };

        let mut infos = Vec::with_capacity(pieces.len());
        let mut stored = Vec::with_capacity(pieces.len());
        for piece in pieces {
            let (used, bytes) = compress_or_store(codec, kind, piece)?;
            infos.push(BlockInfo {
                decompressed_size: narrow(piece.len() as u64, "chunk size")?,
                compressed_size: narrow(bytes.len() as u64, "compressed chunk size")?,
                flags: BlockFlags::from_kind(used),
            });
            stored.push(bytes);
        }
        debug!(chunks = infos.len(), ?kind, "compressed data");
        Ok((infos, stored))
    }

    fn write_fs(&mut self) -> Result<()> {
        let (block_infos, chunks) = self.chunks()?;
        let info = BlocksInfo {
            hash: self.options.hash,
            block_infos,
            blocks: mem::take(&mut self.blocks),
        };
        let mut raw_info = Cursor::new(Vec::new());
        info.write_be(&mut raw_info)?;
        let raw_info = raw_info.into_inner();
        let (info_kind, stored_info) = compress_or_store(
            self.options.codec.as_ref(),
            self.options.info_compression,
            &raw_info,
        )?;
        self.blocks = info.blocks;

        let mut flags = ArchiveFlags(ArchiveFlags::BLOCKS_AND_DIRECTORY_COMBINED)
            .with_compression(info_kind);
        if self.options.info_at_end {
            flags.0 |= ArchiveFlags::BLOCKS_INFO_AT_END;
        }
        if self.options.info_padding {
            flags.0 |= ArchiveFlags::BLOCK_INFO_NEEDS_PADDING;
        }

        let base = self.inner.stream_position()?;
        let preamble = self.preamble();
        preamble.write_be(&mut self.inner)?;
        let header_position = self.inner.stream_position()?;
        let mut header = FsHeader {
            size: 0,
            compressed_info_size: narrow(stored_info.len() as u64, "block info size")?,
            uncompressed_info_size: narrow(raw_info.len() as u64, "block info size")?,
            flags,
        };
        header.write_be(&mut self.inner)?;

        if preamble.version >= 7 {
            write_padding(&mut self.inner, base, 16)?;
        }
        if !self.options.info_at_end {
            self.inner.write_all(&stored_info)?;
        }
        if self.options.info_padding {
            write_padding(&mut self.inner, base, 16)?;
        }
        for chunk in chunks.iter() {
            self.inner.write_all(chunk)?;
        }
        if self.options.info_at_end {
            self.inner.write_all(&stored_info)?;
        }

        let end = self.inner.stream_position()?;
        header.size = (end - base) as i64;
        self.inner.seek(SeekFrom::Start(header_position))?;
        header.write_be(&mut self.inner)?;
        self.inner.seek(SeekFrom::Start(end))?;
        Ok(())
    }

    /// Legacy bundles keep their directory at the start of the payload
    fn write_legacy(&mut self) -> Result<()> {
        let directory_len = RawDirectory::encoded_len(self.blocks.iter().map(|b| b.path.as_str()));
        let directory = RawDirectory {
            blocks: self
                .blocks
                .iter()
                .map(|block| Block {
                    offset: block.offset + directory_len,
                    ..block.clone()
                })
                .collect(),
        };

        let mut payload = EndianWriter::new(Cursor::new(Vec::new()), Endian::Big)?;
        directory.write(&mut payload)?;
        payload.write_bytes(&self.data)?;
        let payload = payload.into_inner().into_inner();

        let stored = match self.options.variant {
            BundleVariant::Web => {
                let compressed = self
                    .options
                    .codec
                    .compress(CompressionKind::Lzma, &payload)?;
                if compressed.len() < 5 {
                    return Err(Error::InvalidArchive("LZMA output too short".to_string()));
                }
                [
                    &compressed[..5],
                    &(payload.len() as u64).to_le_bytes()[..],
                    &compressed[5..],
                ]
                .concat()
            }
            _ => payload.clone(),
        };

        let stored_len = narrow(stored.len() as u64, "level size")?;
        let mut header = RawHeader {
            hash: self.options.hash,
            crc: 0,
            minimum_streamed_bytes: stored_len,
            header_size: 0,
            levels_before_streaming: 1,
            levels: vec![(stored_len, narrow(payload.len() as u64, "level size")?)],
            complete_file_size: 0,
            file_info_header_size: narrow(directory_len, "directory size")?,
        };

        // the header size is only known once the header has been laid out
        let header_len = self.legacy_header(&mut header)?.len() as u32;
        header.header_size = header_len;
        header.complete_file_size = header_len + stored_len;
        let header_bytes = self.legacy_header(&mut header)?;

        self.inner.write_all(&header_bytes)?;
        self.inner.write_all(&stored)?;
        self.blocks = directory.blocks;
        Ok(())
    }

    fn legacy_header(&self, header: &mut RawHeader) -> Result<Vec<u8>> {
        let preamble = self.preamble();
        let mut preamble_bytes = Cursor::new(Vec::new());
        preamble.write_be(&mut preamble_bytes)?;

        let mut writer = EndianWriter::new(preamble_bytes, Endian::Big)?;
        writer.seek_end()?;
        apply_gated(&raw_header_writers(), &preamble.version, &mut writer, header)?;
        Ok(writer.into_inner().into_inner())
    }
}

impl<W: Write + Seek> Write for BundleWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.current.is_none() {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                "no entry started, call start_entry first",
            ));
        }
        self.data.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn write_padding<W: Write + Seek>(writer: &mut W, base: u64, alignment: u64) -> Result<()> {
    let position = writer.stream_position()?;
    let padding = padding_for(position - base, alignment);
    writer.write_all(&vec![0u8; padding as usize])?;
    Ok(())
}

/// Where the bytes of a rebuilt entry come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RebuildSource {
    /// The entry at this index of the bundle being rebuilt
    Original(usize),

    /// New contents
    Bytes(Vec<u8>),
}

/// One entry of a rebuilt bundle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RebuildEntry {
    pub path: String,
    pub flags: u32,
    pub source: RebuildSource,
}

impl RebuildEntry {
    /// Keep every entry of `bundle` as it is
    pub fn keep_all<R>(bundle: &BundleFile<R>) -> Vec<RebuildEntry> {
        bundle
            .blocks()
            .iter()
            .enumerate()
            .map(|(index, block)| RebuildEntry {
                path: block.path.clone(),
                flags: block.flags,
                source: RebuildSource::Original(index),
            })
            .collect()
    }
}

/// Write the entries of `old`, replaced or reordered by `entries`, as a new bundle
///
/// Cancellation is checked between entries. When it is observed nothing has been
/// written to `output` and `Ok(false)` is returned; `old` is never modified.
#[instrument(skip_all, fields(entries = entries.len()), err)]
pub fn rebuild<R, W>(
    old: &mut BundleFile<R>,
    entries: Vec<RebuildEntry>,
    options: BundleWriterOptions,
    output: &mut W,
    cancel: &CancellationToken,
) -> Result<bool>
where
    R: Read + Seek,
    W: Write + Seek,
{
    let mut writer = BundleWriter::new(output, options);
    for entry in entries {
        if cancel.is_cancelled() {
            info!("rebuild cancelled");
            return Ok(false);
        }
        let bytes = match entry.source {
            RebuildSource::Original(index) => old.read_entry(index)?,
            RebuildSource::Bytes(bytes) => bytes,
        };
        writer.add_entry(entry.path, entry.flags, &bytes)?;
    }
    old.clear_cache();

    if cancel.is_cancelled() {
        info!("rebuild cancelled");
        return Ok(false);
    }
    writer.finish()?;
    Ok(true)
}

#[cfg(test)]
mod test {
    use std::io::{Cursor, Write};

    use pretty_assertions::assert_eq;
    use tracing_test::traced_test;
    use uab_io::CancellationToken;

    use super::{rebuild, BundleWriter, BundleWriterOptions, RebuildEntry, RebuildSource};
    use crate::compression::CompressionKind;
    use crate::error::Result;
    use crate::read::BundleFile;
    use crate::types::BundleVariant;

    fn options(kind: CompressionKind) -> BundleWriterOptions {
        BundleWriterOptions::builder()
            .block_compression(kind)
            .info_compression(CompressionKind::None)
            .build()
    }

    #[test]
    fn write_empty_bundle() -> Result<()> {
        let writer = BundleWriter::new(Cursor::new(Vec::new()), options(CompressionKind::None));
        let bytes = writer.finish()?.into_inner();

        let bundle = BundleFile::new(Cursor::new(bytes))?;
        assert!(bundle.is_empty());
        assert_eq!(bundle.decompressed_size(), 0);
        assert_eq!(bundle.header().version, 7);

        Ok(())
    }

    #[test]
    fn total_size_is_backpatched() -> Result<()> {
        let mut writer = BundleWriter::new(Cursor::new(Vec::new()), options(CompressionKind::Lz4));
        writer.add_entry("a", 0, &[7u8; 1000])?;
        let bytes = writer.finish()?.into_inner();

        let bundle = BundleFile::new(Cursor::new(bytes.clone()))?;
        let header = bundle.header().fs.as_ref().map(|fs| fs.size);
        assert_eq!(header, Some(bytes.len() as i64));

        Ok(())
    }

    #[test]
    fn write_without_entry_fails() {
        let mut writer = BundleWriter::new(Cursor::new(Vec::new()), options(CompressionKind::None));
        assert!(writer.write_all(b"orphan").is_err());
    }

    #[traced_test]
    #[test]
    fn rebuild_replaces_entries() -> Result<()> {
        let mut writer = BundleWriter::new(Cursor::new(Vec::new()), options(CompressionKind::Lz4));
        writer.add_entry("first", 4, b"one")?;
        writer.add_entry("second", 0, b"two")?;
        let mut old = BundleFile::new(Cursor::new(writer.finish()?.into_inner()))?;

        let mut entries = RebuildEntry::keep_all(&old);
        entries[1].source = RebuildSource::Bytes(b"zwei".to_vec());
        entries.push(RebuildEntry {
            path: "third".to_string(),
            flags: 0,
            source: RebuildSource::Bytes(b"drei".to_vec()),
        });

        let mut output = Cursor::new(Vec::new());
        let options = BundleWriterOptions::builder()
            .variant(BundleVariant::Raw)
            .build();
        assert!(rebuild(&mut old, entries, options, &mut output, &CancellationToken::new())?);

        let mut rebuilt = BundleFile::new(Cursor::new(output.into_inner()))?;
        assert_eq!(rebuilt.variant(), BundleVariant::Raw);
        assert_eq!(rebuilt.by_name("first")?.into_bytes(), b"one");
        assert_eq!(rebuilt.by_name("second")?.into_bytes(), b"zwei");
        assert_eq!(rebuilt.by_name("third")?.into_bytes(), b"drei");

        Ok(())
    }

    #[test]
    fn matching_keeps_layout_and_hash() -> Result<()> {
        // legacy headers carry a hash from version 4
        for (variant, version) in [(BundleVariant::Fs, 7), (BundleVariant::Raw, 5)] {
            let source = BundleWriterOptions::builder()
                .variant(variant)
                .version(version)
                .info_at_end(true)
                .hash([7; 16])
                .build();
            let mut writer = BundleWriter::new(Cursor::new(Vec::new()), source);
            writer.add_entry("kept", 4, b"payload")?;
            let mut old = BundleFile::new(Cursor::new(writer.finish()?.into_inner()))?;
            assert_eq!(old.header().hash, [7; 16]);

            let options = BundleWriterOptions::matching(old.header(), CompressionKind::Lz4);
            assert_eq!(options.hash, [7; 16]);
            assert_eq!(options.variant, variant);

            let mut output = Cursor::new(Vec::new());
            let entries = RebuildEntry::keep_all(&old);
            assert!(rebuild(&mut old, entries, options, &mut output, &CancellationToken::new())?);

            let rebuilt = BundleFile::new(Cursor::new(output.into_inner()))?;
            assert_eq!(rebuilt.hash(), [7; 16]);
            assert_eq!(rebuilt.header().hash, [7; 16]);
        }

        Ok(())
    }

    #[test]
    fn cancelled_rebuild_writes_nothing() -> Result<()> {
        let mut writer = BundleWriter::new(Cursor::new(Vec::new()), options(CompressionKind::None));
        writer.add_entry("only", 0, b"data")?;
        let mut old = BundleFile::new(Cursor::new(writer.finish()?.into_inner()))?;

        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut output = Cursor::new(Vec::new());
        let entries = RebuildEntry::keep_all(&old);
        assert!(!rebuild(&mut old, entries, options(CompressionKind::None), &mut output, &cancel)?);
        assert!(output.into_inner().is_empty());

        // the source bundle is still usable
        assert_eq!(old.read_entry(0)?, b"data");

        Ok(())
    }
}
