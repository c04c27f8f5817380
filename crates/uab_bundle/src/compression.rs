//! Chunk compression and decompression handling.

use std::{fmt::Debug, io::Cursor};

use lzma_rs::{compress, decompress};
use tracing::{instrument, trace};

use crate::error::{Error, Result};

/// Identifies the storage format of a chunk or of the block info section
///
/// Stored in the low six bits of [`crate::types::ArchiveFlags`] and [`crate::types::BlockFlags`].
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum CompressionKind {
    /// Stores the data as it is
    None = 0,

    /// Raw LZMA: five property bytes followed by the stream
    Lzma = 1,

    /// LZ4 block format without a size prefix
    Lz4 = 2,

    /// LZ4 high compression, decoded exactly like [`CompressionKind::Lz4`]
    #[default]
    Lz4Hc = 3,

    /// Recognised but no codec is available
    Lzham = 4,
}

impl TryFrom<u32> for CompressionKind {
    type Error = Error;

    fn try_from(value: u32) -> Result<Self> {
        match value {
            0 => Ok(CompressionKind::None),
            1 => Ok(CompressionKind::Lzma),
            2 => Ok(CompressionKind::Lz4),
            3 => Ok(CompressionKind::Lz4Hc),
            4 => Ok(CompressionKind::Lzham),
            other => Err(Error::Unsupported(format!("compression kind {other}"))),
        }
    }
}

impl From<CompressionKind> for u32 {
    fn from(kind: CompressionKind) -> Self {
        kind as u32
    }
}

/// The boundary to the compression libraries
pub trait Codec: Debug + Send + Sync {
    /// Decompress `input`, which must expand to exactly `expected` bytes
    fn decompress(&self, kind: CompressionKind, input: &[u8], expected: usize) -> Result<Vec<u8>>;

    fn compress(&self, kind: CompressionKind, input: &[u8]) -> Result<Vec<u8>>;
}

/// Largest expansion a single LZ4 block can reach
const LZ4_MAX_RATIO: usize = 255;

/// Codec backed by `lz4_flex` and `lzma-rs`
///
/// There is no pure Rust LZ4 high compression encoder, so [`CompressionKind::Lz4Hc`]
/// output is plain LZ4. Both decode with the same block decoder.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinCodec;

fn codec_error(kind: CompressionKind, message: impl ToString) -> Error {
    Error::Compression {
        kind,
        message: message.to_string(),
    }
}

impl Codec for BuiltinCodec {
    #[instrument(skip(self, input), fields(input = input.len()), err)]
    fn decompress(&self, kind: CompressionKind, input: &[u8], expected: usize) -> Result<Vec<u8>> {
        let output = match kind {
            CompressionKind::None if input.len() != expected => {
                return Err(codec_error(
                    kind,
                    format!("expected {expected} bytes, stored {}", input.len()),
                ))
            }
            CompressionKind::None => input.to_vec(),
            CompressionKind::Lz4 | CompressionKind::Lz4Hc => {
                if expected > input.len().saturating_mul(LZ4_MAX_RATIO).saturating_add(16) {
                    return Err(codec_error(
                        kind,
                        format!("{} bytes cannot expand to {expected}", input.len()),
                    ));
                }
                lz4_flex::block::decompress(input, expected).map_err(|e| codec_error(kind, e))?
            }
            CompressionKind::Lzma => {
                // the declared size only sizes the first allocation up to a bound
                let mut output = Vec::with_capacity(expected.min(input.len().saturating_mul(16)));
                let options = decompress::Options {
                    unpacked_size: decompress::UnpackedSize::UseProvided(Some(expected as u64)),
                    ..Default::default()
                };
                lzma_rs::lzma_decompress_with_options(
                    &mut Cursor::new(input),
                    &mut output,
                    &options,
                )
                .map_err(|e| codec_error(kind, e))?;
                output
            }
            CompressionKind::Lzham => {
                return Err(Error::Unsupported("LZHAM decompression".to_string()))
            }
        };

        if output.len() != expected {
            return Err(codec_error(
                kind,
                format!("expected {expected} bytes, produced {}", output.len()),
            ));
        }
        trace!(?kind, expected, "decompressed");
        Ok(output)
    }

    #[instrument(skip(self, input), fields(input = input.len()), err)]
    fn compress(&self, kind: CompressionKind, input: &[u8]) -> Result<Vec<u8>> {
        match kind {
            CompressionKind::None => Ok(input.to_vec()),
            CompressionKind::Lz4 | CompressionKind::Lz4Hc => Ok(lz4_flex::block::compress(input)),
            CompressionKind::Lzma => {
                let mut output = Vec::new();
                let options = compress::Options {
                    unpacked_size: compress::UnpackedSize::SkipWritingToHeader,
                };
                lzma_rs::lzma_compress_with_options(
                    &mut Cursor::new(input),
                    &mut output,
                    &options,
                )
                .map_err(|e| codec_error(kind, e))?;
                Ok(output)
            }
            CompressionKind::Lzham => Err(Error::Unsupported("LZHAM compression".to_string())),
        }
    }
}

/// Compress with `kind`, falling back to storing the data when that is not smaller
pub(crate) fn compress_or_store(
    codec: &dyn Codec,
    kind: CompressionKind,
    input: &[u8],
) -> Result<(CompressionKind, Vec<u8>)> {
    if kind == CompressionKind::None || input.is_empty() {
        return Ok((CompressionKind::None, input.to_vec()));
    }
    let compressed = codec.compress(kind, input)?;
    if compressed.len() >= input.len() {
        trace!(?kind, size = input.len(), "compression did not help, storing");
        return Ok((CompressionKind::None, input.to_vec()));
    }
    Ok((kind, compressed))
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::{compress_or_store, BuiltinCodec, Codec, CompressionKind};
    use crate::error::{Error, Result};

    #[test]
    fn kinds_from_flags() -> Result<()> {
        assert_eq!(CompressionKind::try_from(0)?, CompressionKind::None);
        assert_eq!(CompressionKind::try_from(3)?, CompressionKind::Lz4Hc);
        assert!(CompressionKind::try_from(9).is_err());
        assert_eq!(u32::from(CompressionKind::Lz4), 2);

        Ok(())
    }

    #[test]
    fn lz4_round_trip() -> Result<()> {
        let input = b"a block of text, a block of text, a block of text".repeat(8);
        let compressed = BuiltinCodec.compress(CompressionKind::Lz4Hc, &input)?;
        assert!(compressed.len() < input.len());

        // high compression output decodes with the plain decoder
        let output = BuiltinCodec.decompress(CompressionKind::Lz4, &compressed, input.len())?;
        assert_eq!(output, input);

        Ok(())
    }

    #[test]
    fn size_mismatch_is_an_error() -> Result<()> {
        assert!(matches!(
            BuiltinCodec.decompress(CompressionKind::None, b"abc", 4),
            Err(Error::Compression { .. })
        ));

        Ok(())
    }

    #[test]
    fn implausible_sizes_fail_before_allocating() {
        assert!(matches!(
            BuiltinCodec.decompress(CompressionKind::Lz4, &[0x10, b'a'], u32::MAX as usize),
            Err(Error::Compression { .. })
        ));
        assert!(matches!(
            BuiltinCodec.decompress(CompressionKind::None, b"abc", u32::MAX as usize),
            Err(Error::Compression { .. })
        ));
    }

    #[test]
    fn lzma_round_trip() -> Result<()> {
        let input = b"aaaaaaaabbbbbbbb".repeat(320);
        let compressed = BuiltinCodec.compress(CompressionKind::Lzma, &input)?;
        assert!(compressed.len() < input.len());

        let output = BuiltinCodec.decompress(CompressionKind::Lzma, &compressed, input.len())?;
        assert_eq!(output, input);

        // a stream that ends early is reported, not padded
        let cut = &compressed[..compressed.len() / 2];
        assert!(BuiltinCodec
            .decompress(CompressionKind::Lzma, cut, input.len())
            .is_err());

        Ok(())
    }

    #[test]
    fn lzham_unsupported() {
        assert!(matches!(
            BuiltinCodec.decompress(CompressionKind::Lzham, b"", 0),
            Err(Error::Unsupported(_))
        ));
    }

    #[test]
    fn store_when_not_smaller() -> Result<()> {
        let (kind, data) = compress_or_store(&BuiltinCodec, CompressionKind::Lz4, b"xyz")?;
        assert_eq!(kind, CompressionKind::None);
        assert_eq!(data, b"xyz");

        Ok(())
    }
}
