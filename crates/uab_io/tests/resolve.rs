use std::io::{Read, Seek, SeekFrom};

use pretty_assertions::assert_eq;
use tracing_test::traced_test;
use uab_io::{
    error::{Error, Result},
    Endian, EndianReader, EndianWriter, ResourceResolver, Tag,
};

fn write_parts(directory: &std::path::Path, base: &str, parts: &[&[u8]]) -> Result<()> {
    for (index, part) in parts.iter().enumerate() {
        std::fs::write(directory.join(format!("{base}.split{index}")), part)?;
    }
    Ok(())
}

#[traced_test]
#[test]
fn record_spanning_split_boundary() -> Result<()> {
    let directory = tempfile::tempdir()?;

    // a big endian header followed by a little endian body, cut mid-record
    let mut writer = EndianWriter::new(std::io::Cursor::new(Vec::new()), Endian::Big)?;
    writer.write_u32(0xCAFE_BABE)?;
    writer.set_endian(Endian::Little);
    writer.write_aligned_string("level0")?;
    writer.write_u64(0x0102_0304_0506_0708)?;
    let bytes = writer.into_inner().into_inner();

    write_parts(directory.path(), "data.unity3d", &[&bytes[..6], &bytes[6..13], &bytes[13..]])?;

    let base = directory.path().join("data.unity3d");
    let stream = ResourceResolver::default().open(&Tag::split_set(&base).range(4, None))?;
    let mut reader = EndianReader::new(stream, Endian::Little)?;
    assert_eq!(reader.len(), bytes.len() as u64 - 4);
    assert_eq!(reader.read_aligned_string()?, "level0");
    assert_eq!(reader.read_u64()?, 0x0102_0304_0506_0708);
    assert!(matches!(reader.read_u8(), Err(Error::Truncated { .. })));

    Ok(())
}

#[test]
fn independent_streams_per_open() -> Result<()> {
    let directory = tempfile::tempdir()?;
    let path = directory.path().join("blob.bin");
    std::fs::write(&path, (0u8..32).collect::<Vec<_>>())?;

    let tag = Tag::path(&path).range(8, Some(16));
    let resolver = ResourceResolver::default();

    let mut first = resolver.open(&tag)?;
    let mut second = resolver.open(&tag)?;
    first.seek(SeekFrom::Start(10))?;

    let mut byte = [0u8; 1];
    second.read_exact(&mut byte)?;
    assert_eq!(byte, [8]);
    first.read_exact(&mut byte)?;
    assert_eq!(byte, [18]);

    Ok(())
}

#[test]
fn missing_split_set() -> Result<()> {
    let directory = tempfile::tempdir()?;
    let tag = Tag::split_set(directory.path().join("nothing"));
    assert!(matches!(
        ResourceResolver::default().open(&tag),
        Err(Error::SplitSetEmpty(_))
    ));

    Ok(())
}
