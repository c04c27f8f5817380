use std::io::{Cursor, Read};

use pretty_assertions::assert_eq;
use tracing_test::traced_test;
use uab_bundle::{
    error::{Error, Result},
    BundleFile, BundleVariant, BundleWriter, BundleWriterOptions, CompressionKind,
};

fn pattern(len: usize, seed: u8) -> Vec<u8> {
    (0..len).map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed)).collect()
}

fn write_bundle(options: BundleWriterOptions, entries: &[(&str, &[u8])]) -> Result<Vec<u8>> {
    let mut writer = BundleWriter::new(Cursor::new(Vec::new()), options);
    for (name, bytes) in entries {
        writer.add_entry(*name, 4, bytes)?;
    }
    Ok(writer.finish()?.into_inner())
}

/// Three 100 byte chunks with an entry covering bytes 90..130
fn three_chunks(kind: CompressionKind) -> Result<(Vec<u8>, Vec<u8>)> {
    let data = pattern(300, 7);
    let options = BundleWriterOptions::builder()
        .chunk_size(100)
        .block_compression(kind)
        .info_compression(CompressionKind::None)
        .build();
    let bytes = write_bundle(
        options,
        &[("head", &data[..90]), ("span", &data[90..130]), ("tail", &data[130..])],
    )?;
    Ok((bytes, data))
}

#[traced_test]
#[test]
fn entry_spanning_two_chunks() -> Result<()> {
    for kind in [CompressionKind::None, CompressionKind::Lz4] {
        let (bytes, data) = three_chunks(kind)?;
        let mut bundle = BundleFile::new(Cursor::new(bytes))?;

        let sizes: Vec<u32> = bundle
            .block_infos()
            .iter()
            .map(|info| info.decompressed_size)
            .collect();
        assert_eq!(sizes, vec![100, 100, 100]);

        let span = &bundle.blocks()[1];
        assert_eq!((span.offset, span.size), (90, 40));

        assert_eq!(bundle.read_entry(1)?, data[90..130].to_vec());
        assert_eq!(bundle.by_name("tail")?.into_bytes(), data[130..].to_vec());
        assert_eq!(bundle.read_entry(0)?, data[..90].to_vec());
    }

    Ok(())
}

#[test]
fn info_at_end_and_padding() -> Result<()> {
    let first = pattern(5000, 1);
    let second = pattern(70, 2);
    let options = BundleWriterOptions::builder()
        .info_at_end(true)
        .info_padding(true)
        .chunk_size(1024)
        .block_compression(CompressionKind::Lz4Hc)
        .info_compression(CompressionKind::Lz4)
        .build();
    let bytes = write_bundle(options, &[("a", &first), ("b", &second)])?;

    let mut bundle = BundleFile::new(Cursor::new(bytes))?;
    let flags = bundle.header().fs.map(|fs| fs.flags).unwrap_or_default();
    assert!(flags.info_at_end());
    assert!(flags.needs_padding());
    assert_eq!(bundle.decompressed_size(), 5070);

    let mut entry = bundle.by_index(0)?;
    let mut read = Vec::new();
    entry.read_to_end(&mut read)?;
    assert_eq!(read, first);
    assert_eq!(bundle.read_entry(1)?, second);

    Ok(())
}

#[test]
fn bundle_after_prefix() -> Result<()> {
    let payload = pattern(256, 3);
    let options = BundleWriterOptions::builder()
        .block_compression(CompressionKind::Lz4)
        .build();
    let bundle_bytes = write_bundle(options, &[("CAB-prefixed", &payload)])?;

    let mut bytes = b"\x00\x00\x00\x10header!".to_vec();
    bytes.extend_from_slice(&bundle_bytes);

    let mut bundle = BundleFile::new(Cursor::new(bytes))?;
    assert_eq!(bundle.header().base_offset, 11);
    assert_eq!(bundle.read_entry(0)?, payload);

    Ok(())
}

#[test]
fn version_six_has_no_header_padding() -> Result<()> {
    let options = BundleWriterOptions::builder()
        .version(6)
        .block_compression(CompressionKind::None)
        .info_compression(CompressionKind::None)
        .build();
    let bytes = write_bundle(options, &[("x", b"abc")])?;

    let mut bundle = BundleFile::new(Cursor::new(bytes.clone()))?;
    assert_eq!(bundle.header().version, 6);
    assert_eq!(bundle.read_entry(0)?, b"abc");

    // preamble (30) + header (20) + info (16 + 4 + 10 + 4 + 22) + data (3)
    assert_eq!(bytes.len(), 30 + 20 + 56 + 3);

    Ok(())
}

#[test]
fn legacy_raw_round_trip() -> Result<()> {
    let first = pattern(64, 4);
    let options = BundleWriterOptions::builder()
        .variant(BundleVariant::Raw)
        .version(5)
        .build();
    let bytes = write_bundle(options, &[("CAB-a", &first), ("CAB-a.resS", b"")])?;

    let mut bundle = BundleFile::new(Cursor::new(bytes))?;
    assert_eq!(bundle.variant(), BundleVariant::Raw);
    assert_eq!(bundle.block_infos().len(), 1);

    // the directory sits in front of the entry data inside the payload
    let directory_len = 4 + (5 + 1 + 8) + (10 + 1 + 8);
    assert_eq!(bundle.blocks()[0].offset, directory_len);
    assert_eq!(bundle.read_entry(0)?, first);
    assert_eq!(bundle.read_entry(1)?, Vec::<u8>::new());

    let raw = bundle.header().raw.clone().unwrap_or_default();
    assert_eq!(raw.levels.len(), 1);
    assert_eq!(raw.file_info_header_size as u64, directory_len);

    Ok(())
}

#[test]
fn encrypted_chunk_is_rejected() -> Result<()> {
    let (mut bytes, _) = three_chunks(CompressionKind::None)?;

    // flags of the first chunk sit right after the hash, count and two sizes
    let info_start = bytes
        .windows(4)
        .position(|window| window == [0, 0, 0, 3])
        .map(|count| count + 4)
        .ok_or_else(|| Error::CustomError("no chunk table".into()))?;
    bytes[info_start + 8] |= 0x01;

    let mut bundle = BundleFile::new(Cursor::new(bytes))?;
    assert!(matches!(
        bundle.read_entry(0),
        Err(Error::EncryptedBlock { index: 0 })
    ));
    // chunks after the encrypted one remain readable
    assert!(bundle.read_entry(2).is_ok());

    Ok(())
}

#[test]
fn truncated_bundle() -> Result<()> {
    let (bytes, _) = three_chunks(CompressionKind::None)?;
    let cut = bytes[..bytes.len() - 10].to_vec();
    assert!(BundleFile::new(Cursor::new(cut)).is_err());

    Ok(())
}

#[test]
fn missing_entry() -> Result<()> {
    let (bytes, _) = three_chunks(CompressionKind::None)?;
    let mut bundle = BundleFile::new(Cursor::new(bytes))?;
    assert!(matches!(bundle.by_name("nope"), Err(Error::FileNotFound(_))));
    assert!(matches!(bundle.read_entry(9), Err(Error::FileNotFound(_))));

    Ok(())
}

#[test]
fn clear_cache_keeps_reads_working() -> Result<()> {
    let (bytes, data) = three_chunks(CompressionKind::Lz4)?;
    let mut bundle = BundleFile::new(Cursor::new(bytes))?;
    assert_eq!(bundle.read_entry(2)?, data[130..].to_vec());
    bundle.clear_cache();
    assert_eq!(bundle.read_entry(2)?, data[130..].to_vec());

    Ok(())
}

fn compressible(len: usize) -> Vec<u8> {
    b"aaaaaaaabbbbbbbb".iter().copied().cycle().take(len).collect()
}

#[traced_test]
#[test]
fn lzma_blocks_and_info() -> Result<()> {
    let data = compressible(5000);
    let names: Vec<String> = (0..40).map(|index| format!("CAB-{index:032}")).collect();
    let entries: Vec<(&str, &[u8])> = names
        .iter()
        .enumerate()
        .map(|(index, name)| (name.as_str(), if index == 0 { &data[..] } else { &b""[..] }))
        .collect();
    let options = BundleWriterOptions::builder()
        .block_compression(CompressionKind::Lzma)
        .info_compression(CompressionKind::Lzma)
        .build();
    let bytes = write_bundle(options, &entries)?;
    assert!(bytes.len() < data.len());

    let mut bundle = BundleFile::new(Cursor::new(bytes))?;
    let info_kind = bundle.header().fs.map(|fs| fs.flags.compression()).transpose()?;
    assert_eq!(info_kind, Some(CompressionKind::Lzma));
    let block_kinds = bundle
        .block_infos()
        .iter()
        .map(|info| info.flags.compression())
        .collect::<Result<Vec<_>>>()?;
    assert_eq!(block_kinds, vec![CompressionKind::Lzma]);

    assert_eq!(bundle.len(), 40);
    assert_eq!(bundle.by_name(&names[0])?.into_bytes(), data);
    assert_eq!(bundle.read_entry(39)?, Vec::<u8>::new());

    Ok(())
}

#[traced_test]
#[test]
fn web_round_trip() -> Result<()> {
    let data = pattern(5000, 9);
    let options = BundleWriterOptions::builder()
        .variant(BundleVariant::Web)
        .build();
    let bytes = write_bundle(options, &[("CAB-web", &data)])?;

    let mut bundle = BundleFile::new(Cursor::new(bytes))?;
    assert_eq!(bundle.variant(), BundleVariant::Web);
    let kind = bundle.block_infos()[0].flags.compression()?;
    assert_eq!(kind, CompressionKind::Lzma);
    assert_eq!(bundle.read_entry(0)?, data);

    Ok(())
}

#[test]
fn oversized_info_is_rejected() -> Result<()> {
    let options = BundleWriterOptions::builder()
        .version(6)
        .block_compression(CompressionKind::None)
        .info_compression(CompressionKind::None)
        .build();
    let mut bytes = write_bundle(options, &[("x", b"abc")])?;

    // the stored info size follows the eight byte total size of the header
    let header_start = bytes.len() - 3 - 56 - 20;
    let at = header_start + 8;
    bytes[at..at + 4].copy_from_slice(&0xFFFF_FF00u32.to_be_bytes());

    assert!(matches!(
        BundleFile::new(Cursor::new(bytes)),
        Err(Error::InvalidArchive(_))
    ));

    Ok(())
}

#[test]
fn oversized_chunk_is_rejected() -> Result<()> {
    let options = BundleWriterOptions::builder()
        .variant(BundleVariant::Raw)
        .version(5)
        .build();
    let mut bytes = write_bundle(options, &[("CAB-a", &pattern(64, 5))])?;

    let stored = {
        let bundle = BundleFile::new(Cursor::new(bytes.clone()))?;
        bundle.block_infos()[0].compressed_size
    };
    // one level whose stored and unpacked sizes are equal
    let level: Vec<u8> = [1u32.to_be_bytes(), stored.to_be_bytes(), stored.to_be_bytes()].concat();
    let at = bytes
        .windows(12)
        .position(|window| window == level.as_slice())
        .map(|count| count + 4)
        .ok_or_else(|| Error::CustomError("no level table".into()))?;
    bytes[at..at + 4].copy_from_slice(&0x7FFF_FFF0u32.to_be_bytes());

    assert!(matches!(
        BundleFile::new(Cursor::new(bytes)),
        Err(Error::InvalidArchive(_))
    ));

    Ok(())
}
