//! Turning tags into streams
//!

use bon::Builder;
use std::{
    fmt,
    fs::{File, OpenOptions},
    io::{Read, Seek, SeekFrom},
    sync::Arc,
};
use tracing::{debug, instrument};

use crate::{
    error::{Error, Result},
    range::RangeReader,
    split::SplitReader,
    tag::Tag,
};

/// Anything that can be read and seeked and moved between threads
pub trait Stream: Read + Seek + Send {}

impl<T: Read + Seek + Send> Stream for T {}

/// A source of named entries, such as an archive or a virtual file system
pub trait EntrySource: Send + Sync {
    /// Names of every entry, in storage order
    fn list(&self) -> Vec<String>;

    /// Open an independent stream over one entry
    fn open(&self, name: &str) -> Result<Box<dyn Stream>>;

    /// Length of an entry, if it exists
    fn entry_len(&self, name: &str) -> Option<u64>;
}

/// Recognises a container format and exposes its entries
pub trait ContainerOpener: Send + Sync {
    fn open_container(&self, stream: Box<dyn Stream>) -> Result<Box<dyn EntrySource>>;
}

/// Options for resolving tags
#[derive(Debug, Clone, Copy, Default, Builder)]
pub struct ResolverOptions {
    /// Create the backing file of a [`Tag::Path`] when it does not exist yet
    #[builder(default)]
    pub create_missing: bool,
}

/// Opens the stream behind a [`Tag`]
///
/// Every call to [`ResourceResolver::open`] returns an independent stream, so two
/// consumers of the same tag never share a cursor.
#[derive(Clone, Default)]
pub struct ResourceResolver {
    options: ResolverOptions,
    opener: Option<Arc<dyn ContainerOpener>>,
}

impl fmt::Debug for ResourceResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceResolver")
            .field("options", &self.options)
            .field("opener", &self.opener.is_some())
            .finish()
    }
}

impl ResourceResolver {
    pub fn new(options: ResolverOptions) -> Self {
        ResourceResolver {
            options,
            opener: None,
        }
    }

    /// Use `opener` to look inside containers addressed by [`Tag::NamedEntry`]
    pub fn with_opener(mut self, opener: Arc<dyn ContainerOpener>) -> Self {
        self.opener = Some(opener);
        self
    }

    pub fn options(&self) -> &ResolverOptions {
        &self.options
    }

    #[instrument(skip(self, tag), fields(tag = %tag), err)]
    pub fn open(&self, tag: &Tag) -> Result<Box<dyn Stream>> {
        match tag {
            Tag::Path(path) => {
                let file = if self.options.create_missing {
                    OpenOptions::new()
                        .read(true)
                        .write(true)
                        .create(true)
                        .truncate(false)
                        .open(path)?
                } else {
                    File::open(path)?
                };
                Ok(Box::new(file))
            }
            Tag::SplitSet(base) => Ok(Box::new(SplitReader::open(base)?)),
            Tag::ByteRange {
                parent,
                offset,
                length,
            } => {
                let mut stream = self.open(parent)?;
                let parent_len = stream.seek(SeekFrom::End(0))?;
                if *offset > parent_len {
                    return Err(Error::OutOfRange {
                        position: *offset,
                        start: 0,
                        end: parent_len,
                    });
                }
                let length = length.fix(parent_len - offset);
                if offset + length > parent_len {
                    return Err(Error::OutOfRange {
                        position: offset + length,
                        start: 0,
                        end: parent_len,
                    });
                }
                Ok(Box::new(RangeReader::new(stream, *offset, length)?))
            }
            Tag::NamedEntry {
                parent,
                name,
                length,
            } => {
                let opener = self
                    .opener
                    .as_ref()
                    .ok_or_else(|| Error::NoContainerOpener(tag.to_string()))?;
                let container = opener.open_container(self.open(parent)?)?;
                let entry_len = container
                    .entry_len(name)
                    .ok_or_else(|| Error::EntryNotFound(name.clone()))?;
                if !length.is_known() {
                    debug!(entry = name.as_str(), entry_len, "fixing entry length");
                }
                length.fix(entry_len);
                container.open(name)
            }
        }
    }

    /// Open a tag and read all of its bytes
    pub fn read_all(&self, tag: &Tag) -> Result<Vec<u8>> {
        let mut stream = self.open(tag)?;
        let mut buffer = Vec::new();
        stream.read_to_end(&mut buffer)?;
        Ok(buffer)
    }
}
