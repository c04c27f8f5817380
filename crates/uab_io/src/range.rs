//! Windows onto part of a larger stream
//!

use std::io::{self, Read, Seek, SeekFrom};

use crate::error::{Error, Result};

/// A `Read + Seek` view of `[start, start + length)` inside another stream
///
/// Positions reported by [`Seek`] are relative to `start`. Seeking outside the window is
/// an [`io::ErrorKind::InvalidInput`] error carrying [`Error::OutOfRange`]; it is never
/// clamped. Reads stop at the end of the window.
#[derive(Debug)]
pub struct RangeReader<R> {
    inner: R,
    start: u64,
    length: u64,
    position: u64,
}

impl<R: Read + Seek> RangeReader<R> {
    /// Create the window and move the inner stream to its start
    ///
    /// The inner stream may have been used before, so its position is reset here.
    pub fn new(mut inner: R, start: u64, length: u64) -> Result<Self> {
        inner.seek(SeekFrom::Start(start))?;
        Ok(RangeReader {
            inner,
            start,
            length,
            position: 0,
        })
    }

    pub fn start(&self) -> u64 {
        self.start
    }

    pub fn len(&self) -> u64 {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    pub fn into_inner(self) -> R {
        self.inner
    }

    fn out_of_range(&self, position: i128) -> io::Error {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            Error::OutOfRange {
                position: (self.start as i128 + position).max(0) as u64,
                start: self.start,
                end: self.start + self.length,
            },
        )
    }
}

impl<R: Read + Seek> Read for RangeReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let remaining = self.length.saturating_sub(self.position);
        if remaining == 0 || buf.is_empty() {
            return Ok(0);
        }
        let wanted = buf.len().min(usize::try_from(remaining).unwrap_or(usize::MAX));
        let read = self.inner.read(&mut buf[..wanted])?;
        self.position += read as u64;
        Ok(read)
    }
}

impl<R: Read + Seek> Seek for RangeReader<R> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(offset) => offset as i128,
            SeekFrom::Current(offset) => self.position as i128 + offset as i128,
            SeekFrom::End(offset) => self.length as i128 + offset as i128,
        };
        if target < 0 || target > self.length as i128 {
            return Err(self.out_of_range(target));
        }
        let target = target as u64;
        self.inner.seek(SeekFrom::Start(self.start + target))?;
        self.position = target;
        Ok(target)
    }

    fn stream_position(&mut self) -> io::Result<u64> {
        Ok(self.position)
    }
}

#[cfg(test)]
mod test {
    use std::io::{Cursor, Read, Seek, SeekFrom};

    use pretty_assertions::assert_eq;

    use super::RangeReader;
    use crate::error::Result;

    fn digits() -> Cursor<Vec<u8>> {
        Cursor::new((0u8..20).collect())
    }

    #[test]
    fn reads_are_clamped() -> Result<()> {
        let mut range = RangeReader::new(digits(), 5, 4)?;
        let mut buffer = Vec::new();
        range.read_to_end(&mut buffer)?;
        assert_eq!(buffer, vec![5, 6, 7, 8]);

        Ok(())
    }

    #[test]
    fn seeks_are_relative() -> Result<()> {
        let mut range = RangeReader::new(digits(), 10, 5)?;
        assert_eq!(range.seek(SeekFrom::End(-1))?, 4);
        let mut byte = [0u8; 1];
        range.read_exact(&mut byte)?;
        assert_eq!(byte, [14]);

        assert_eq!(range.seek(SeekFrom::Start(0))?, 0);
        range.read_exact(&mut byte)?;
        assert_eq!(byte, [10]);

        Ok(())
    }

    #[test]
    fn seeking_outside_fails() -> Result<()> {
        let mut range = RangeReader::new(digits(), 10, 5)?;
        assert!(range.seek(SeekFrom::Current(-1)).is_err());
        assert!(range.seek(SeekFrom::Start(6)).is_err());
        // the failed seeks did not move the window
        assert_eq!(range.stream_position()?, 0);

        Ok(())
    }

    #[test]
    fn recycled_inner_stream_is_reset() -> Result<()> {
        let mut inner = digits();
        inner.seek(SeekFrom::Start(17))?;
        let mut range = RangeReader::new(inner, 2, 2)?;
        let mut buffer = [0u8; 2];
        range.read_exact(&mut buffer)?;
        assert_eq!(buffer, [2, 3]);

        Ok(())
    }
}
