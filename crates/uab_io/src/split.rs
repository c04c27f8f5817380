//! Numbered file sets presented as one stream
//!
//! Large archives are sometimes shipped as `name.split0`, `name.split1`, ... next to
//! each other. [`SplitReader`] stitches them back together.

use std::{
    fs::{self, File},
    io::{self, Read, Seek, SeekFrom},
    path::{Path, PathBuf},
};
use tracing::{debug, instrument};

use crate::error::{Error, Result};

const SPLIT_MARKER: &str = ".split";

/// Concatenation of several seekable parts
#[derive(Debug)]
pub struct SplitReader<R> {
    parts: Vec<R>,
    /// Start offset of every part, plus the total length as the last element
    bounds: Vec<u64>,
    position: u64,
}

impl<R: Read + Seek> SplitReader<R> {
    /// Stitch the parts together in the given order
    pub fn new(mut parts: Vec<R>) -> Result<Self> {
        let mut bounds = Vec::with_capacity(parts.len() + 1);
        let mut total = 0u64;
        for part in parts.iter_mut() {
            bounds.push(total);
            total += part.seek(SeekFrom::End(0))?;
        }
        bounds.push(total);

        Ok(SplitReader {
            parts,
            bounds,
            position: 0,
        })
    }

    /// Total length of all parts
    pub fn len(&self) -> u64 {
        self.bounds.last().copied().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn part_count(&self) -> usize {
        self.parts.len()
    }

    /// Index of the part holding `position`, skipping empty parts
    fn part_at(&self, position: u64) -> Option<usize> {
        if position >= self.len() {
            return None;
        }
        // the last bound is the total, which is never <= a valid position
        let index = self.bounds.partition_point(|start| *start <= position);
        Some(index - 1)
    }
}

impl SplitReader<File> {
    /// Open every `<base>.splitN` file next to `base`, ordered by `N`
    #[instrument(err)]
    pub fn open(base: &Path) -> Result<Self> {
        let paths = split_parts(base)?;
        debug!(parts = paths.len(), "opening split set");
        let files = paths
            .iter()
            .map(File::open)
            .collect::<io::Result<Vec<_>>>()?;
        SplitReader::new(files)
    }
}

/// Discover the parts of a split set by listing the directory of `base`
pub fn split_parts(base: &Path) -> Result<Vec<PathBuf>> {
    let directory = match base.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let stem = base
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| Error::SplitSetEmpty(base.to_path_buf()))?;
    let prefix = format!("{stem}{SPLIT_MARKER}");

    let mut parts = Vec::new();
    for entry in fs::read_dir(&directory)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        let Some(number) = name.strip_prefix(&prefix) else {
            continue;
        };
        if let Ok(number) = number.parse::<u32>() {
            parts.push((number, entry.path()));
        }
    }

    if parts.is_empty() {
        return Err(Error::SplitSetEmpty(base.to_path_buf()));
    }
    parts.sort_by_key(|(number, _)| *number);
    Ok(parts.into_iter().map(|(_, path)| path).collect())
}

impl<R: Read + Seek> Read for SplitReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let Some(index) = self.part_at(self.position) else {
            return Ok(0);
        };

        let local = self.position - self.bounds[index];
        let available = self.bounds[index + 1] - self.position;
        let wanted = buf.len().min(usize::try_from(available).unwrap_or(usize::MAX));

        let part = &mut self.parts[index];
        part.seek(SeekFrom::Start(local))?;
        let read = part.read(&mut buf[..wanted])?;
        self.position += read as u64;
        Ok(read)
    }
}

impl<R: Read + Seek> Seek for SplitReader<R> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(offset) => offset as i128,
            SeekFrom::Current(offset) => self.position as i128 + offset as i128,
            SeekFrom::End(offset) => self.len() as i128 + offset as i128,
        };
        if target < 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek before the start of a split set",
            ));
        }
        self.position = target as u64;
        Ok(self.position)
    }

    fn stream_position(&mut self) -> io::Result<u64> {
        Ok(self.position)
    }
}
