//! Error types that can be emitted from this library

use std::sync::Arc;

use miette::Diagnostic;
use thiserror::Error;

use crate::class_id::ClassId;

/// Error type for library
#[derive(Error, Diagnostic, Debug)]
pub enum Error {
    /// Transparent wrapper for [`std::io::Error`]
    #[error(transparent)]
    IOError(#[from] std::io::Error),

    /// Transparent wrapper for stream and tag errors
    #[error(transparent)]
    #[diagnostic(transparent)]
    Stream(#[from] uab_io::error::Error),

    /// Transparent wrapper for bundle errors
    #[error(transparent)]
    #[diagnostic(transparent)]
    Bundle(#[from] uab_bundle::error::Error),

    /// Transparent wrapper for serialized file errors
    #[error(transparent)]
    #[diagnostic(transparent)]
    Serialized(#[from] uab_serialized::error::Error),

    /// Decoding one object failed; the failure stays on the handle until it is freed
    #[error("failed to decode object {path_id} ({class_id})")]
    Decode {
        path_id: i64,
        class_id: ClassId,
        #[source]
        source: Arc<DecodeError>,
    },

    /// The container owning a handle has been dropped
    #[error("object {0} outlived its container")]
    ContainerDropped(i64),

    /// The decoded payload is not of the requested type
    #[error("object {path_id} did not decode to a {expected}")]
    PayloadType {
        path_id: i64,
        expected: &'static str,
    },

    /// {0}
    #[error("{0}")]
    CustomError(String),
}

/// Failure of a single object decoder
#[derive(Error, Diagnostic, Debug)]
pub enum DecodeError {
    /// The object's bytes could not be read, or the decoder read past them
    #[error(transparent)]
    #[diagnostic(transparent)]
    Stream(#[from] uab_io::error::Error),

    /// Nothing is registered for the class and there is no fallback
    #[error("no decoder registered for {0}")]
    NoDecoder(ClassId),

    /// The generic decoder needs a type tree the file does not carry
    #[error("no type tree stored for {0}")]
    MissingTypeTree(ClassId),

    /// The bytes do not match what the decoder expects
    #[error("{0}")]
    Invalid(String),
}

/// Generic result type with crate's Error as its error variant
pub type Result<T> = core::result::Result<T, Error>;
