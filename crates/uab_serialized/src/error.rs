//! Error types that can be emitted from this library

use miette::Diagnostic;
use thiserror::Error;

/// Error type for library
#[derive(Error, Diagnostic, Debug)]
pub enum Error {
    /// Transparent wrapper for [`std::io::Error`]
    #[error(transparent)]
    IOError(#[from] std::io::Error),

    /// Transparent wrapper for [`binrw::Error`]
    #[error(transparent)]
    BinRWError(#[from] binrw::Error),

    /// Transparent wrapper for cursor errors
    #[error(transparent)]
    #[diagnostic(transparent)]
    Stream(#[from] uab_io::error::Error),

    /// the header does not describe a serialized file
    #[error("invalid serialized file header: {0}")]
    InvalidHeader(String),

    /// an engine version string could not be parsed
    #[error("invalid engine version {0:?}")]
    InvalidUnityVersion(String),

    /// an object names a type that is not in the type table
    #[error("object {path_id} refers to unknown type {type_id}")]
    UnresolvedType {
        path_id: i64,
        /// Type index, or class id before types were indexed
        type_id: i32,
    },

    /// two objects share one identifier
    #[error("path id {0} is used by more than one object")]
    DuplicatePathId(i64),

    /// a layout that is recognised but cannot be handled
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// a lower level error raised while parsing a named section
    #[error("failed to parse {section} at {position}")]
    Section {
        /// Name of the section being parsed
        section: &'static str,
        /// Position the section started at
        position: u64,
        #[source]
        source: Box<Error>,
    },

    /// {0}
    #[error("{0}")]
    CustomError(String),
}

impl Error {
    /// The innermost error, skipping section context
    pub fn root(&self) -> &Error {
        match self {
            Error::Section { source, .. } => source.root(),
            other => other,
        }
    }
}

/// Generic result type with crate's Error as its error variant
pub type Result<T> = core::result::Result<T, Error>;
