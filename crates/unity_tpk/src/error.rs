//! Error types that can be emitted from this library

use miette::Diagnostic;
use thiserror::Error;
use unity_serialized::stream::Underrun;

/// Error type for library
#[derive(Error, Diagnostic, Debug)]
pub enum Error {
    /// Transparent warpper for [`std::io::Error`]
    #[error(transparent)]
    IOError(#[from] std::io::Error),

    /// Transparent warpper for [`binrw::Error`]
    #[error(transparent)]
    BinRWError(#[from] binrw::Error),

    /// Transparent warpper for [`unity_bundle::error::Error`], raised by the decompressors
    #[error(transparent)]
    BundleError(#[from] unity_bundle::error::Error),

    /// the data is not a TPK resource
    #[error("not a TPK resource: {0}")]
    UnrecognizedFormat(String),

    /// the resource format revision is not supported
    #[error("unsupported TPK format version {0}")]
    UnsupportedVersion(u8),

    /// the payload compression is unknown
    #[error("unsupported TPK compression {0}")]
    UnsupportedCompression(u8),

    /// the payload holds something other than type tree information
    #[error("unsupported TPK data type {0}")]
    UnsupportedDataType(u8),

    /// a table, count or reference is inconsistent
    #[error("corrupt TPK data: {0}")]
    CorruptStructure(String),

    /// the class has no entry at or before the version
    #[error("no schema for class {class_id} at version {version}")]
    #[diagnostic(help("the dictionary may predate the engine version, or the class was removed"))]
    UnknownClassForVersion {
        /// Class id looked up
        class_id: i32,
        /// Engine version looked up
        version: String,
    },

    /// a process wide dictionary was installed before
    #[error("a global schema dictionary is already installed")]
    AlreadyInstalled,
}

impl From<Underrun> for Error {
    fn from(value: Underrun) -> Self {
        Error::CorruptStructure(value.to_string())
    }
}

impl From<Error> for unity_serialized::error::Error {
    fn from(value: Error) -> Self {
        match value {
            Error::UnknownClassForVersion { class_id, version } => {
                unity_serialized::error::Error::UnknownClassForVersion { class_id, version }
            }
            other => unity_serialized::error::Error::CorruptStructure(other.to_string()),
        }
    }
}

/// Generic result type with crate's Error as its error variant
pub type Result<T> = core::result::Result<T, Error>;
