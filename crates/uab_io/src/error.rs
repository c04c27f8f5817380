//! Error types that can be emitted from this library

use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

/// Error type for library
#[derive(Error, Diagnostic, Debug)]
pub enum Error {
    /// Transparent wrapper for [`std::io::Error`]
    #[error(transparent)]
    IOError(#[from] std::io::Error),

    /// A read asked for more bytes than the source holds
    #[error("read of {requested} bytes at {position} runs past the end ({available} available)")]
    Truncated {
        /// Position the read started at
        position: u64,
        /// Bytes requested
        requested: u64,
        /// Bytes left between `position` and the end
        available: u64,
    },

    /// A seek or read left the bounds of a byte range
    #[error("position {position} is outside of range [{start}, {end})")]
    OutOfRange {
        /// Absolute position requested
        position: u64,
        /// Inclusive start of the range
        start: u64,
        /// Exclusive end of the range
        end: u64,
    },

    /// The operation is recognised but intentionally not implemented
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// No split parts were found next to the base path
    #[error("no split parts found for {0}")]
    SplitSetEmpty(PathBuf),

    /// A named entry was requested from a container that does not hold it
    #[error("entry {0} not found")]
    EntryNotFound(String),

    /// A named entry was requested but no container opener is registered
    #[error("no container opener registered to resolve {0}")]
    NoContainerOpener(String),

    /// Failure raised by a container implementation behind [`crate::resolve::ContainerOpener`]
    #[error(transparent)]
    Container(Box<dyn std::error::Error + Send + Sync>),

    /// {0}
    #[error("{0}")]
    CustomError(String),
}

/// Generic result type with crate's Error as its error variant
pub type Result<T> = core::result::Result<T, Error>;
