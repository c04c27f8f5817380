//! Addresses of byte ranges
//!

use std::{
    fmt,
    hash::{Hash, Hasher},
    path::{Path, PathBuf},
    sync::{Arc, OnceLock},
};

/// A length that may only become known once the parent has been opened
///
/// The declared value, if any, is fixed at construction. An unknown length can be
/// filled in exactly once by the resolver; every clone of the tag observes the fix.
#[derive(Debug, Clone, Default)]
pub struct LazyLength {
    declared: Option<u64>,
    fixed: Arc<OnceLock<u64>>,
}

impl LazyLength {
    pub fn known(length: u64) -> Self {
        LazyLength {
            declared: Some(length),
            fixed: Arc::new(OnceLock::new()),
        }
    }

    pub fn unknown() -> Self {
        LazyLength::default()
    }

    /// The declared length, or the one fixed after opening
    pub fn get(&self) -> Option<u64> {
        self.declared.or_else(|| self.fixed.get().copied())
    }

    /// Record the true length if it was not known yet, returning the effective length
    pub fn fix(&self, length: u64) -> u64 {
        match self.declared {
            Some(declared) => declared,
            None => *self.fixed.get_or_init(|| length),
        }
    }

    pub fn is_known(&self) -> bool {
        self.get().is_some()
    }
}

impl PartialEq for LazyLength {
    fn eq(&self, other: &Self) -> bool {
        self.declared == other.declared
    }
}

impl Eq for LazyLength {}

impl Hash for LazyLength {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.declared.hash(state);
    }
}

impl From<u64> for LazyLength {
    fn from(length: u64) -> Self {
        LazyLength::known(length)
    }
}

impl From<Option<u64>> for LazyLength {
    fn from(length: Option<u64>) -> Self {
        match length {
            Some(length) => LazyLength::known(length),
            None => LazyLength::unknown(),
        }
    }
}

/// Where a stream of bytes comes from
///
/// Tags nest: an entry inside a bundle that is itself a byte range of a split set is
/// `NamedEntry { parent: ByteRange { parent: SplitSet(..), .. }, .. }`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Tag {
    /// A file on disk
    Path(PathBuf),

    /// A named entry inside a container opened from `parent`
    NamedEntry {
        parent: Box<Tag>,
        name: String,
        length: LazyLength,
    },

    /// `length` bytes starting at `offset` inside `parent`
    ByteRange {
        parent: Box<Tag>,
        offset: u64,
        length: LazyLength,
    },

    /// `base.split0`, `base.split1`, ... read as one file
    SplitSet(PathBuf),
}

impl Tag {
    pub fn path(path: impl Into<PathBuf>) -> Self {
        Tag::Path(path.into())
    }

    pub fn split_set(base: impl Into<PathBuf>) -> Self {
        Tag::SplitSet(base.into())
    }

    /// Address an entry of the container this tag points at
    pub fn entry(&self, name: impl Into<String>) -> Self {
        Tag::NamedEntry {
            parent: Box::new(self.clone()),
            name: name.into(),
            length: LazyLength::unknown(),
        }
    }

    /// Address a sub range of this tag; `None` runs to the end of the parent
    pub fn range(&self, offset: u64, length: Option<u64>) -> Self {
        Tag::ByteRange {
            parent: Box::new(self.clone()),
            offset,
            length: length.into(),
        }
    }

    pub fn parent(&self) -> Option<&Tag> {
        match self {
            Tag::NamedEntry { parent, .. } | Tag::ByteRange { parent, .. } => Some(parent),
            Tag::Path(_) | Tag::SplitSet(_) => None,
        }
    }

    /// The length if it is declared or has been fixed by a resolver
    pub fn known_length(&self) -> Option<u64> {
        match self {
            Tag::NamedEntry { length, .. } | Tag::ByteRange { length, .. } => length.get(),
            Tag::Path(_) | Tag::SplitSet(_) => None,
        }
    }

    /// The file on disk this tag ultimately reads from
    pub fn root_path(&self) -> &Path {
        match self {
            Tag::Path(path) | Tag::SplitSet(path) => path,
            Tag::NamedEntry { parent, .. } | Tag::ByteRange { parent, .. } => parent.root_path(),
        }
    }

    /// A short name for the bytes behind this tag, used to match external references
    pub fn leaf_name(&self) -> String {
        match self {
            Tag::Path(path) | Tag::SplitSet(path) => path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default(),
            Tag::NamedEntry { name, .. } => name
                .rsplit(['/', '\\'])
                .next()
                .unwrap_or(name)
                .to_string(),
            Tag::ByteRange { parent, .. } => parent.leaf_name(),
        }
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tag::Path(path) => write!(f, "{}", path.display()),
            Tag::SplitSet(path) => write!(f, "{}.split*", path.display()),
            Tag::NamedEntry { parent, name, .. } => write!(f, "{parent}!{name}"),
            Tag::ByteRange {
                parent,
                offset,
                length,
            } => match length.get() {
                Some(length) => write!(f, "{parent}[{offset}+{length}]"),
                None => write!(f, "{parent}[{offset}..]"),
            },
        }
    }
}

impl From<PathBuf> for Tag {
    fn from(path: PathBuf) -> Self {
        Tag::Path(path)
    }
}

impl From<&Path> for Tag {
    fn from(path: &Path) -> Self {
        Tag::Path(path.to_path_buf())
    }
}
