//! Error types that can be emitted from this library

use miette::Diagnostic;
use thiserror::Error;

/// Error type for library
#[derive(Error, Diagnostic, Debug)]
pub enum Error {
    /// Transparent warpper for [`std::io::Error`]
    #[error(transparent)]
    IOError(#[from] std::io::Error),

    /// Transparent warpper for [`binrw::Error`]
    #[error(transparent)]
    BinRWError(#[from] binrw::Error),

    /// Transparent warpper for [`unity_version::error::Error`]
    #[error(transparent)]
    VersionError(#[from] unity_version::error::Error),

    /// the data does not start with a known container signature
    #[error("unrecognized container signature {0:?}")]
    UnrecognizedFormat(String),

    /// the container format revision is not supported
    #[error("unsupported {signature} format version {version}")]
    UnsupportedVersion {
        /// Container signature
        signature: String,
        /// Declared format version
        version: u32,
    },

    /// the compression selector is unknown or not implemented
    #[error("unsupported compression {0}")]
    UnsupportedCompression(String),

    /// a table or size is inconsistent with the available bytes
    #[error("corrupt container: {0}")]
    CorruptStructure(String),

    /// a compressed block could not be decompressed
    #[error("failed to decompress {method} data: {reason}")]
    Decompression {
        /// Compression method that failed
        method: String,
        /// Failure reported by the decoder
        reason: String,
    },

    /// unable to find requested file
    #[error("unable to find requested file")]
    FileNotFound(#[from] FileNotFoundError),

    /// {0}
    #[error("{0}")]
    CustomError(String),
}

/// Error type to provide further information when a file has not been found
#[derive(Error, Diagnostic, Debug)]
#[error("unable to find requested file")]
pub enum FileNotFoundError {
    /// at index {0}
    #[error("at index {0}")]
    Index(usize),

    /// by name {0}
    #[error("by name {0}")]
    Name(String),
}

/// Generic result type with crate's Error as its error variant
pub type Result<T> = core::result::Result<T, Error>;
