//! Bundles as sources of named entries
//!
//! Registering a [`BundleOpener`] with a [`uab_io::ResourceResolver`] lets a
//! [`uab_io::Tag::NamedEntry`] point inside a bundle, including a bundle that is itself
//! stored inside another container.

use std::{
    io::Cursor,
    sync::{Mutex, MutexGuard},
};
use uab_io::{error::Error as IoError, ContainerOpener, EntrySource, Stream};

use crate::read::{BundleFile, BundleOptions};

/// Opens bundles for the resolver
#[derive(Debug, Clone, Default)]
pub struct BundleOpener {
    pub options: BundleOptions,
}

impl ContainerOpener for BundleOpener {
    fn open_container(&self, stream: Box<dyn Stream>) -> uab_io::error::Result<Box<dyn EntrySource>> {
        let bundle = BundleFile::with_options(stream, self.options.clone())?;
        Ok(Box::new(BundleEntries::new(bundle)))
    }
}

/// A bundle shared behind a lock, handing out each entry as an in-memory stream
pub struct BundleEntries<R> {
    bundle: Mutex<BundleFile<R>>,
    entries: Vec<(String, u64)>,
}

impl<R> BundleEntries<R> {
    pub fn new(bundle: BundleFile<R>) -> Self {
        let entries = bundle
            .blocks()
            .iter()
            .map(|block| (block.path.clone(), block.size))
            .collect();
        BundleEntries {
            bundle: Mutex::new(bundle),
            entries,
        }
    }

    fn lock(&self) -> uab_io::error::Result<MutexGuard<'_, BundleFile<R>>> {
        self.bundle
            .lock()
            .map_err(|_| IoError::CustomError("bundle lock poisoned".to_string()))
    }
}

impl<R: std::io::Read + std::io::Seek + Send> EntrySource for BundleEntries<R> {
    fn list(&self) -> Vec<String> {
        self.entries.iter().map(|(name, _)| name.clone()).collect()
    }

    fn open(&self, name: &str) -> uab_io::error::Result<Box<dyn Stream>> {
        let mut bundle = self.lock()?;
        let bytes = bundle.by_name(name)?.into_bytes();
        Ok(Box::new(Cursor::new(bytes)))
    }

    fn entry_len(&self, name: &str) -> Option<u64> {
        self.entries
            .iter()
            .find(|(entry, _)| entry == name)
            .map(|(_, size)| *size)
    }
}

#[cfg(test)]
mod test {
    use std::{
        io::{Cursor, Write},
        sync::Arc,
    };

    use pretty_assertions::assert_eq;
    use uab_io::{ResourceResolver, Tag};

    use super::BundleOpener;
    use crate::error::Result;
    use crate::write::{BundleWriter, BundleWriterOptions};

    #[test]
    fn named_entry_inside_bundle() -> Result<()> {
        let mut writer = BundleWriter::new(Cursor::new(Vec::new()), BundleWriterOptions::default());
        writer.add_entry("CAB-one", 4, b"serialized bytes")?;
        writer.add_entry("CAB-one.resS", 0, &[9u8; 300])?;
        let bytes = writer.finish()?.into_inner();

        let mut file = tempfile::NamedTempFile::new()?;
        file.write_all(&bytes)?;

        let resolver = ResourceResolver::default().with_opener(Arc::new(BundleOpener::default()));
        let tag = Tag::path(file.path()).entry("CAB-one.resS");
        assert_eq!(resolver.read_all(&tag)?, vec![9u8; 300]);
        assert_eq!(tag.known_length(), Some(300));

        let missing = Tag::path(file.path()).entry("CAB-two");
        assert!(resolver.open(&missing).is_err());

        Ok(())
    }
}
