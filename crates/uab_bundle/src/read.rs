//! Types for reading bundles
//!

use binrw::BinRead;
use bon::Builder;
use indexmap::IndexMap;
use std::{
    fmt::{self, Debug},
    io::{self, Cursor, Read, Seek, SeekFrom},
    sync::Arc,
};
use tracing::{debug, info, instrument, warn};
use uab_io::{apply_gated, read::padding_for, Endian, EndianReader};

use crate::{
    compression::{BuiltinCodec, Codec, CompressionKind},
    error::{Error, FileNotFoundError, Result},
    types::{
        raw_header_readers, Block, BlockFlags, BlockInfo, BlocksInfo, BundleHeader, BundleVariant,
        FsHeader, Preamble, RawDirectory, RawHeader,
    },
};

/// How far from the start of a stream the signature is searched for
pub const DEFAULT_SCAN_WINDOW: u64 = 1024;

/// The marker every known signature starts with
const SIGNATURE_MARKER: &[u8] = b"Unity";

/// Options for opening a bundle
#[derive(Debug, Clone, Builder)]
pub struct BundleOptions {
    /// Non standard signatures, matched exactly at the start of the stream
    #[builder(default)]
    pub aliases: Vec<(String, BundleVariant)>,

    /// Number of leading bytes searched for the signature marker
    #[builder(default = DEFAULT_SCAN_WINDOW)]
    pub scan_window: u64,

    /// Codec used for every chunk and the block info section
    #[builder(default = Arc::new(BuiltinCodec) as Arc<dyn Codec>)]
    pub codec: Arc<dyn Codec>,
}

impl Default for BundleOptions {
    fn default() -> Self {
        BundleOptions::builder().build()
    }
}

struct CachedChunk {
    index: usize,
    data: Arc<[u8]>,
}

/// One entry read out of a bundle
#[derive(Debug, Clone)]
pub struct BundleEntry {
    block: Block,
    data: Cursor<Vec<u8>>,
}

impl BundleEntry {
    /// Path of the entry inside the bundle
    ///
    /// # Warnings
    ///
    /// It is dangerous to use this name directly when extracting a bundle. It may
    /// contain an absolute path or break out of the current directory with `..`.
    pub fn name(&self) -> &str {
        &self.block.path
    }

    pub fn size(&self) -> u64 {
        self.block.size
    }

    pub fn flags(&self) -> u32 {
        self.block.flags
    }

    pub fn block(&self) -> &Block {
        &self.block
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data.into_inner()
    }
}

impl Read for BundleEntry {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.data.read(buf)
    }
}

impl Seek for BundleEntry {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.data.seek(pos)
    }
}

/// Bundle reader
///
/// ```no_run
/// use std::io::prelude::*;
///
/// fn list_bundle_contents(reader: impl Read + Seek) -> uab_bundle::error::Result<()> {
///     let mut bundle = uab_bundle::BundleFile::new(reader)?;
///
///     for i in 0..bundle.len() {
///         let mut entry = bundle.by_index(i)?;
///         println!("Entry: {} ({} bytes)", entry.name(), entry.size());
///         std::io::copy(&mut entry, &mut std::io::sink())?;
///     }
///
///     Ok(())
/// }
/// ```
pub struct BundleFile<R> {
    reader: R,
    codec: Arc<dyn Codec>,
    header: BundleHeader,
    info: BlocksInfo,
    /// Logical and physical start of every chunk
    chunk_offsets: Vec<(u64, u64)>,
    /// Length of the underlying stream
    stream_end: u64,
    names: IndexMap<String, usize>,
    cache: Option<CachedChunk>,
}

impl<R> Debug for BundleFile<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BundleFile")
            .field("header", &self.header)
            .field("chunks", &self.info.block_infos.len())
            .field("entries", &self.info.blocks.len())
            .finish()
    }
}

impl<R> BundleFile<R> {
    /// Number of entries
    pub fn len(&self) -> usize {
        self.info.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.info.blocks.is_empty()
    }

    pub fn header(&self) -> &BundleHeader {
        &self.header
    }

    pub fn variant(&self) -> BundleVariant {
        self.header.variant
    }

    /// Entries in storage order
    pub fn blocks(&self) -> &[Block] {
        &self.info.blocks
    }

    /// Chunks in storage order
    pub fn block_infos(&self) -> &[BlockInfo] {
        &self.info.block_infos
    }

    pub fn hash(&self) -> [u8; 16] {
        self.info.hash
    }

    /// Total size of the data once every chunk is decompressed
    pub fn decompressed_size(&self) -> u64 {
        self.info.decompressed_size()
    }

    /// Names of every entry, in storage order
    pub fn entry_names(&self) -> impl Iterator<Item = &str> {
        self.info.blocks.iter().map(|block| block.path.as_str())
    }

    pub fn index_for_name(&self, name: &str) -> Option<usize> {
        self.names.get(name).copied()
    }

    /// Release the cached decompressed chunk
    pub fn clear_cache(&mut self) {
        self.cache = None;
    }

    /// Unwrap and return the inner reader
    pub fn into_inner(self) -> R {
        self.reader
    }
}

impl<R: Read + Seek> BundleFile<R> {
    /// Read a bundle with the default options
    pub fn new(reader: R) -> Result<Self> {
        BundleFile::with_options(reader, BundleOptions::default())
    }

    /// Read the headers and the entry table of a bundle
    #[instrument(skip(reader, options), err)]
    pub fn with_options(mut reader: R, options: BundleOptions) -> Result<Self> {
        let (variant, base_offset) = detect_signature(&mut reader, &options)?;
        reader.seek(SeekFrom::Start(base_offset))?;
        let preamble = Preamble::read_be(&mut reader)?;

        let mut header = BundleHeader {
            variant,
            signature: preamble.signature,
            version: preamble.version,
            player_version: preamble.player_version,
            engine_version: preamble.engine_version,
            base_offset,
            fs: None,
            raw: None,
            hash: [0; 16],
        };
        debug!(?variant, version = header.version, "read bundle preamble");

        let (info, data_offset) = match variant {
            BundleVariant::Fs => {
                let fs = FsHeader::read_be(&mut reader)?;
                let read = read_fs_info(&mut reader, &header, &fs, options.codec.as_ref())?;
                header.fs = Some(fs);
                read
            }
            BundleVariant::Raw | BundleVariant::Web => {
                let raw = read_raw_header(&mut reader, header.version)?;
                let read = legacy_info(&header, &raw)?;
                header.raw = Some(raw);
                read
            }
            BundleVariant::Archive => {
                return Err(Error::UnsupportedVariant(header.signature));
            }
        };

        header.hash = info.hash;
        let stream_end = reader.seek(SeekFrom::End(0))?;
        let mut bundle = BundleFile {
            reader,
            codec: options.codec,
            header,
            chunk_offsets: chunk_offsets(&info.block_infos, data_offset),
            stream_end,
            info,
            names: IndexMap::new(),
            cache: None,
        };

        if bundle.header.raw.is_some() {
            bundle.read_legacy_directory()?;
        }
        bundle.info.validate()?;
        bundle.check_data_fits()?;

        for (index, block) in bundle.info.blocks.iter().enumerate() {
            if bundle.names.contains_key(&block.path) {
                warn!(path = block.path.as_str(), "duplicate entry name, keeping the first");
                continue;
            }
            bundle.names.insert(block.path.clone(), index);
        }

        info!(
            signature = bundle.header.signature.as_str(),
            entries = bundle.len(),
            chunks = bundle.info.block_infos.len(),
            "opened bundle"
        );
        Ok(bundle)
    }

    /// The directory of a legacy bundle lives at the start of its first chunk
    fn read_legacy_directory(&mut self) -> Result<()> {
        if self.info.block_infos.is_empty() {
            return Err(Error::InvalidArchive("legacy bundle without levels".to_string()));
        }
        let first = self.chunk(0)?;
        let mut cursor = EndianReader::new(Cursor::new(&first[..]), Endian::Big)?;
        self.info.blocks = RawDirectory::read(&mut cursor)?.blocks;
        debug!(entries = self.info.blocks.len(), "read legacy directory");
        Ok(())
    }

    fn check_data_fits(&self) -> Result<()> {
        let end = self.stream_end;
        let physical_end = match (self.chunk_offsets.last(), self.info.block_infos.last()) {
            (Some((_, start)), Some(info)) => start + info.compressed_size as u64,
            _ => return Ok(()),
        };
        if physical_end > end {
            return Err(Error::InvalidArchive(format!(
                "chunk data runs to {physical_end} but the stream ends at {end}"
            )));
        }
        Ok(())
    }

    /// Decompress one chunk, reusing the last one when asked for it again
    fn chunk(&mut self, index: usize) -> Result<Arc<[u8]>> {
        if let Some(cached) = self.cache.as_ref().filter(|cached| cached.index == index) {
            return Ok(cached.data.clone());
        }

        let info = self.info.block_infos[index];
        if info.flags.is_encrypted() {
            return Err(Error::EncryptedBlock { index });
        }
        let kind = info.flags.compression()?;

        let (_, physical) = self.chunk_offsets[index];
        let physical_end = physical + info.compressed_size as u64;
        if physical_end > self.stream_end {
            return Err(Error::InvalidArchive(format!(
                "chunk {index} runs to {physical_end} but the stream ends at {}",
                self.stream_end
            )));
        }
        self.reader.seek(SeekFrom::Start(physical))?;
        let mut stored = vec![0u8; info.compressed_size as usize];
        self.reader.read_exact(&mut stored)?;

        if self.header.variant == BundleVariant::Web && kind == CompressionKind::Lzma {
            stored = strip_lzma_size(&stored)?;
        }
        let data: Arc<[u8]> = self
            .codec
            .decompress(kind, &stored, info.decompressed_size as usize)?
            .into();
        debug!(index, ?kind, size = data.len(), "decompressed chunk");

        self.cache = Some(CachedChunk {
            index,
            data: data.clone(),
        });
        Ok(data)
    }

    /// Read the full contents of an entry
    #[instrument(skip(self), err)]
    pub fn read_entry(&mut self, index: usize) -> Result<Vec<u8>> {
        let block = self
            .info
            .blocks
            .get(index)
            .cloned()
            .ok_or(FileNotFoundError::Index(index))?;

        let mut output = Vec::with_capacity(block.size as usize);
        for chunk_index in 0..self.info.block_infos.len() {
            let (logical, _) = self.chunk_offsets[chunk_index];
            let chunk_end = logical + self.info.block_infos[chunk_index].decompressed_size as u64;
            if chunk_end <= block.offset {
                continue;
            }
            if logical >= block.end() {
                break;
            }

            let chunk = self.chunk(chunk_index)?;
            let from = (block.offset.max(logical) - logical) as usize;
            let to = (block.end().min(chunk_end) - logical) as usize;
            output.extend_from_slice(&chunk[from..to]);
        }

        if output.len() as u64 != block.size {
            return Err(Error::InvalidArchive(format!(
                "entry {} produced {} of {} bytes",
                block.path,
                output.len(),
                block.size
            )));
        }
        Ok(output)
    }

    /// Get a contained entry by index
    pub fn by_index(&mut self, index: usize) -> Result<BundleEntry> {
        let data = self.read_entry(index)?;
        Ok(BundleEntry {
            block: self.info.blocks[index].clone(),
            data: Cursor::new(data),
        })
    }

    /// Search for an entry by name
    pub fn by_name(&mut self, name: &str) -> Result<BundleEntry> {
        let index = self
            .index_for_name(name)
            .ok_or_else(|| FileNotFoundError::Name(name.to_string()))?;
        self.by_index(index)
    }
}

/// Find the signature and return the variant with the offset it starts at
fn detect_signature<R: Read + Seek>(
    reader: &mut R,
    options: &BundleOptions,
) -> Result<(BundleVariant, u64)> {
    let start = reader.stream_position()?;
    let mut window = Vec::new();
    reader
        .by_ref()
        .take(options.scan_window)
        .read_to_end(&mut window)?;

    let leading = null_terminated(&window);
    if let Some((_, variant)) = options
        .aliases
        .iter()
        .find(|(alias, _)| alias.as_bytes() == leading)
    {
        debug!(alias = %String::from_utf8_lossy(leading), "matched signature alias");
        return Ok((*variant, start));
    }

    let marker = window
        .windows(SIGNATURE_MARKER.len())
        .position(|candidate| candidate == SIGNATURE_MARKER)
        .ok_or_else(|| Error::InvalidSignature(String::from_utf8_lossy(leading).into_owned()))?;
    let signature = String::from_utf8_lossy(null_terminated(&window[marker..])).into_owned();

    match BundleVariant::from_signature(&signature) {
        Some(BundleVariant::Archive) => Err(Error::UnsupportedVariant(signature)),
        Some(variant) => {
            if marker > 0 {
                debug!(prefix = marker, "bundle signature found after a prefix");
            }
            Ok((variant, start + marker as u64))
        }
        None => Err(Error::InvalidSignature(signature)),
    }
}

fn null_terminated(bytes: &[u8]) -> &[u8] {
    match bytes.iter().position(|byte| *byte == 0) {
        Some(end) => &bytes[..end],
        None => bytes,
    }
}

/// Locate, decompress and parse the block info section of a UnityFS bundle
///
/// Returns the section and the absolute position of the first chunk.
fn read_fs_info<R: Read + Seek>(
    reader: &mut R,
    header: &BundleHeader,
    fs: &FsHeader,
    codec: &dyn Codec,
) -> Result<(BlocksInfo, u64)> {
    let base = header.base_offset;
    if header.version >= 7 {
        skip_padding(reader, base, 16)?;
    }
    let header_end = reader.stream_position()?;
    let compressed_size = fs.compressed_info_size as u64;
    let stream_end = reader.seek(SeekFrom::End(0))?;
    let does_not_fit = || {
        Error::InvalidArchive(format!(
            "block info of {compressed_size} bytes does not fit in a {stream_end} byte stream"
        ))
    };

    let info_start = if fs.flags.info_at_end() {
        stream_end.checked_sub(compressed_size).ok_or_else(does_not_fit)?
    } else {
        header_end
    };
    if info_start + compressed_size > stream_end {
        return Err(does_not_fit());
    }

    reader.seek(SeekFrom::Start(info_start))?;
    let mut stored = vec![0u8; compressed_size as usize];
    reader.read_exact(&mut stored)?;
    let kind = fs.flags.compression()?;
    let raw = codec.decompress(kind, &stored, fs.uncompressed_info_size as usize)?;
    let info = BlocksInfo::read_be(&mut Cursor::new(raw))?;
    debug!(
        ?kind,
        at_end = fs.flags.info_at_end(),
        chunks = info.block_infos.len(),
        entries = info.blocks.len(),
        "read block info"
    );

    let mut data_offset = if fs.flags.info_at_end() {
        header_end
    } else {
        header_end + compressed_size
    };
    if fs.flags.needs_padding() {
        data_offset += padding_for(data_offset - base, 16);
    }
    Ok((info, data_offset))
}

fn read_raw_header<R: Read + Seek>(reader: &mut R, version: u32) -> Result<RawHeader> {
    let mut cursor = EndianReader::new(reader, Endian::Big)?;
    let mut raw = RawHeader::default();
    apply_gated(&raw_header_readers(), &version, &mut cursor, &mut raw)?;
    Ok(raw)
}

/// A legacy bundle is a single chunk sized by its last level
fn legacy_info(header: &BundleHeader, raw: &RawHeader) -> Result<(BlocksInfo, u64)> {
    let &(compressed, uncompressed) = raw
        .levels
        .last()
        .ok_or_else(|| Error::InvalidArchive("legacy bundle without levels".to_string()))?;
    let kind = match header.variant {
        BundleVariant::Web => CompressionKind::Lzma,
        _ => CompressionKind::None,
    };
    let info = BlocksInfo {
        hash: raw.hash,
        block_infos: vec![BlockInfo {
            decompressed_size: uncompressed,
            compressed_size: compressed,
            flags: BlockFlags::from_kind(kind),
        }],
        blocks: Vec::new(),
    };
    Ok((info, header.base_offset + raw.header_size as u64))
}

/// LZMA-alone streams carry an eight byte size after the properties
fn strip_lzma_size(stored: &[u8]) -> Result<Vec<u8>> {
    if stored.len() < 13 {
        return Err(Error::InvalidArchive("truncated LZMA header".to_string()));
    }
    Ok([&stored[..5], &stored[13..]].concat())
}

fn skip_padding<R: Seek>(reader: &mut R, base: u64, alignment: u64) -> Result<()> {
    let position = reader.stream_position()?;
    let padding = padding_for(position - base, alignment);
    if padding > 0 {
        reader.seek(SeekFrom::Start(position + padding))?;
    }
    Ok(())
}

fn chunk_offsets(block_infos: &[BlockInfo], data_offset: u64) -> Vec<(u64, u64)> {
    block_infos
        .iter()
        .scan((0u64, data_offset), |(logical, physical), info| {
            let start = (*logical, *physical);
            *logical += info.decompressed_size as u64;
            *physical += info.compressed_size as u64;
            Some(start)
        })
        .collect()
}

#[cfg(test)]
mod test {
    use std::io::Cursor;

    use pretty_assertions::assert_eq;

    use super::{chunk_offsets, detect_signature, BundleOptions, BundleVariant};
    use crate::error::{Error, Result};
    use crate::types::{BlockFlags, BlockInfo};

    #[test]
    fn signature_after_prefix() -> Result<()> {
        let mut input = Cursor::new(b"\x00\x01junkUnityFS\x00\x00\x00\x00\x07".to_vec());
        let (variant, offset) = detect_signature(&mut input, &BundleOptions::default())?;
        assert_eq!(variant, BundleVariant::Fs);
        assert_eq!(offset, 6);

        Ok(())
    }

    #[test]
    fn signature_alias() -> Result<()> {
        let options = BundleOptions::builder()
            .aliases(vec![("GameFS".to_string(), BundleVariant::Fs)])
            .build();
        let mut input = Cursor::new(b"GameFS\x00rest".to_vec());
        assert_eq!(
            detect_signature(&mut input, &options)?,
            (BundleVariant::Fs, 0)
        );

        Ok(())
    }

    #[test]
    fn unknown_and_unsupported_signatures() {
        let mut unknown = Cursor::new(b"UnityXYZ\x00".to_vec());
        assert!(matches!(
            detect_signature(&mut unknown, &BundleOptions::default()),
            Err(Error::InvalidSignature(signature)) if signature == "UnityXYZ"
        ));

        let mut archive = Cursor::new(b"UnityArchive\x00".to_vec());
        assert!(matches!(
            detect_signature(&mut archive, &BundleOptions::default()),
            Err(Error::UnsupportedVariant(_))
        ));

        let mut nothing = Cursor::new(vec![0u8; 32]);
        assert!(matches!(
            detect_signature(&mut nothing, &BundleOptions::default()),
            Err(Error::InvalidSignature(_))
        ));
    }

    #[test]
    fn marker_outside_window() {
        let mut input = vec![b'x'; 64];
        input.extend_from_slice(b"UnityFS\x00");
        let options = BundleOptions::builder().scan_window(32).build();
        assert!(detect_signature(&mut Cursor::new(input), &options).is_err());
    }

    #[test]
    fn offsets_accumulate() {
        let infos = [
            BlockInfo {
                decompressed_size: 100,
                compressed_size: 40,
                flags: BlockFlags(2),
            },
            BlockInfo {
                decompressed_size: 100,
                compressed_size: 100,
                flags: BlockFlags(0),
            },
            BlockInfo {
                decompressed_size: 50,
                compressed_size: 10,
                flags: BlockFlags(2),
            },
        ];
        assert_eq!(
            chunk_offsets(&infos, 64),
            vec![(0, 64), (100, 104), (200, 204)]
        );
    }
}
