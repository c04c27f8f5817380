//! Error types that can be emitted from this library

use miette::Diagnostic;
use thiserror::Error;

use crate::compression::CompressionKind;

/// Error type for library
#[derive(Error, Diagnostic, Debug)]
pub enum Error {
    /// Transparent wrapper for [`std::io::Error`]
    #[error(transparent)]
    IOError(#[from] std::io::Error),

    /// Transparent wrapper for [`binrw::Error`]
    #[error(transparent)]
    BinRWError(#[from] binrw::Error),

    /// Transparent wrapper for cursor and tag errors
    #[error(transparent)]
    #[diagnostic(transparent)]
    Stream(#[from] uab_io::error::Error),

    /// no known signature was found near the start of the stream
    #[error("no bundle signature found (read {0:?})")]
    InvalidSignature(String),

    /// the signature names a variant that cannot be read
    #[error("unsupported bundle variant {0}")]
    UnsupportedVariant(String),

    /// the headers disagree with each other or with the stream
    #[error("invalid bundle: {0}")]
    InvalidArchive(String),

    /// a chunk is flagged as encrypted
    #[error("chunk {index} is encrypted")]
    EncryptedBlock {
        /// Index of the chunk in the block info table
        index: usize,
    },

    /// a codec failed
    #[error("{kind:?} codec failed: {message}")]
    Compression {
        kind: CompressionKind,
        message: String,
    },

    /// a feature that is recognised but not implemented
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// unable to find requested entry
    #[error("unable to find requested entry")]
    FileNotFound(#[from] FileNotFoundError),

    /// {0}
    #[error("{0}")]
    CustomError(String),
}

/// Error type to provide further information when an entry has not been found
#[derive(Error, Diagnostic, Debug)]
#[error("unable to find requested entry")]
pub enum FileNotFoundError {
    /// at index {0}
    #[error("at index {0}")]
    Index(usize),

    /// by name {0}
    #[error("by name {0}")]
    Name(String),
}

impl From<Error> for uab_io::error::Error {
    fn from(error: Error) -> Self {
        match error {
            Error::Stream(inner) => inner,
            Error::FileNotFound(FileNotFoundError::Name(name)) => {
                uab_io::error::Error::EntryNotFound(name)
            }
            other => uab_io::error::Error::Container(Box::new(other)),
        }
    }
}

/// Generic result type with crate's Error as its error variant
pub type Result<T> = core::result::Result<T, Error>;
