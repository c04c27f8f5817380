//! Format and engine versions

use std::{fmt, str::FromStr};

use crate::error::{Error, Result};

/// Revision of the serialized file format, stored in every header
///
/// Every layout decision compares against one of the named thresholds below.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SerializedVersion(pub u32);

impl SerializedVersion {
    /// Oldest known revision
    pub const INITIAL: Self = Self(1);
    /// Legacy type tree nodes carry a variable count
    pub const LEGACY_VARIABLE_COUNT: Self = Self(2);
    /// Legacy type tree nodes have neither index nor meta flags
    pub const LEGACY_WITHOUT_INDEX: Self = Self(3);
    /// External references carry a GUID and type, metadata ends with user information
    pub const HAS_EXTERNAL_GUID: Self = Self(5);
    /// External references start with an unused string
    pub const HAS_EXTERNAL_TEMP_EMPTY: Self = Self(6);
    /// Metadata starts with the engine version, object ids may be 64-bit
    pub const HAS_UNITY_VERSION: Self = Self(7);
    pub const HAS_TARGET_PLATFORM: Self = Self(8);
    /// Byte order flag moves from the metadata into the header
    pub const HAS_HEADER_ENDIAN: Self = Self(9);
    /// One-off revision already using the blob type tree
    pub const BLOB_TYPE_TREE_PREVIEW: Self = Self(10);
    pub const HAS_SCRIPT_TYPE_INDEX: Self = Self(11);
    pub const HAS_BLOB_TYPE_TREE: Self = Self(12);
    pub const HAS_TYPE_TREE_HASHES: Self = Self(13);
    /// Object and script identifiers are always 64-bit and aligned
    pub const HAS_64BIT_PATH_ID: Self = Self(14);
    pub const SUPPORTS_STRIPPED_OBJECT: Self = Self(15);
    /// Objects store a type index instead of a class id
    pub const REFACTORED_CLASS_ID: Self = Self(16);
    pub const REFACTOR_TYPE_DATA: Self = Self(17);
    pub const REFACTOR_SHAREABLE_TYPE_TREE_DATA: Self = Self(18);
    pub const TYPE_TREE_NODE_WITH_TYPE_FLAGS: Self = Self(19);
    pub const SUPPORTS_REF_OBJECT: Self = Self(20);
    pub const STORES_TYPE_DEPENDENCIES: Self = Self(21);
    /// Header sizes and offsets become 64-bit
    pub const LARGE_FILES_SUPPORT: Self = Self(22);

    /// Newest revision this crate knows the layout of
    pub const LATEST: Self = Self::LARGE_FILES_SUPPORT;

    /// Versions outside this range are not serialized files at all
    pub fn is_plausible(self) -> bool {
        (1..=0x40).contains(&self.0)
    }

    /// Whether type trees use the flat node array with a string buffer
    pub fn uses_blob_type_tree(self) -> bool {
        self >= Self::HAS_BLOB_TYPE_TREE || self == Self::BLOB_TYPE_TREE_PREVIEW
    }

    /// Whether the metadata is stored at the end of the file
    pub fn has_metadata_at_end(self) -> bool {
        self < Self::HAS_HEADER_ENDIAN
    }

    /// Length of the fixed header before the metadata
    pub fn header_len(self) -> u64 {
        if self >= Self::LARGE_FILES_SUPPORT {
            48
        } else if self >= Self::HAS_HEADER_ENDIAN {
            20
        } else {
            16
        }
    }
}

impl fmt::Display for SerializedVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for SerializedVersion {
    fn from(value: u32) -> Self {
        SerializedVersion(value)
    }
}

/// Engine version string such as `2019.4.40f1`
///
/// ```
/// use uab_serialized::UnityVersion;
///
/// let version: UnityVersion = "2019.4.40f1".parse().unwrap();
/// assert_eq!((version.major, version.minor, version.patch), (2019, 4, 40));
/// assert_eq!(version.build_type, "f");
/// assert!(version >= UnityVersion::new(2017, 1, 0));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UnityVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
    /// Release letter: `a`, `b`, `f`, `p`, `x` or empty
    pub build_type: String,
    pub build: u32,
}

impl UnityVersion {
    pub fn new(major: u32, minor: u32, patch: u32) -> Self {
        UnityVersion {
            major,
            minor,
            patch,
            ..Default::default()
        }
    }

    /// Stripped players write `0.0.0`
    pub fn is_stripped(&self) -> bool {
        self.major == 0 && self.minor == 0 && self.patch == 0
    }
}

impl FromStr for UnityVersion {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        let invalid = || Error::InvalidUnityVersion(value.to_string());
        let mut parts = value.trim_end_matches('\n').splitn(3, '.');
        let major = parts.next().and_then(|part| part.parse().ok()).ok_or_else(invalid)?;
        let minor = parts.next().and_then(|part| part.parse().ok()).ok_or_else(invalid)?;

        let Some(rest) = parts.next() else {
            return Ok(UnityVersion::new(major, minor, 0));
        };
        let digits = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
        let patch = rest[..digits].parse().map_err(|_| invalid())?;

        let suffix = &rest[digits..];
        let letters = suffix
            .find(|c: char| !c.is_ascii_alphabetic())
            .unwrap_or(suffix.len());
        let build_digits = suffix[letters..]
            .find(|c: char| !c.is_ascii_digit())
            .map_or(&suffix[letters..], |end| &suffix[letters..letters + end]);

        Ok(UnityVersion {
            major,
            minor,
            patch,
            build_type: suffix[..letters].to_string(),
            build: build_digits.parse().unwrap_or(0),
        })
    }
}

impl fmt::Display for UnityVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if !self.build_type.is_empty() {
            write!(f, "{}{}", self.build_type, self.build)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::{SerializedVersion, UnityVersion};
    use crate::error::Result;

    #[test]
    fn parse_engine_versions() -> Result<()> {
        let full: UnityVersion = "2020.3.48f1".parse()?;
        assert_eq!(full.to_string(), "2020.3.48f1");
        assert_eq!(full.build, 1);

        let china: UnityVersion = "2018.4.36f1c1".parse()?;
        assert_eq!((china.patch, china.build_type.as_str(), china.build), (36, "f", 1));

        let short: UnityVersion = "5.6".parse()?;
        assert_eq!(short, UnityVersion::new(5, 6, 0));

        assert!("0.0.0".parse::<UnityVersion>()?.is_stripped());
        assert!("5.x.x".parse::<UnityVersion>().is_err());

        Ok(())
    }

    #[test]
    fn tree_encoding_by_version() {
        let blob: Vec<u32> = (1..=22)
            .filter(|v| SerializedVersion(*v).uses_blob_type_tree())
            .collect();
        assert_eq!(blob, vec![10, 12, 13, 14, 15, 16, 17, 18, 19, 20, 21, 22]);
    }
}
