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

    /// the serialized file format revision is outside the supported range
    #[error("unsupported serialized file format version {0}")]
    UnsupportedVersion(u32),

    /// a table, count or size is inconsistent with the available bytes
    #[error("corrupt serialized data: {0}")]
    CorruptStructure(String),

    /// the stream ended before the schema was satisfied
    #[error("stream exhausted while decoding {path}: {needed} bytes needed at position {position}")]
    #[diagnostic(help("the schema does not match the object, check the engine version"))]
    DecodeUnderrun {
        /// Field path, `root/m_Field/...`
        path: String,
        /// Position relative to the start of the object
        position: u64,
        /// Bytes the read required
        needed: usize,
    },

    /// a value does not have the shape the schema asks for
    #[error("value does not match the schema at {path}: expected {expected}")]
    EncodeMismatch {
        /// Field path, `root/m_Field/...`
        path: String,
        /// Kind of value the schema expects
        expected: String,
    },

    /// the pointer has a zero path id
    #[error("null pointer")]
    NullPointer,

    /// the pointer names an external file that does not exist
    #[error("file index {file_index} is outside the {externals} external references")]
    CorruptReference {
        /// Index stored in the pointer
        file_index: i32,
        /// Number of external references of the owning file
        externals: usize,
    },

    /// the external file is not loaded
    #[error("referenced file {0} is not loaded")]
    UnresolvedReference(String),

    /// the target file has no object with the path id
    #[error("no object with path id {path_id} in {file}")]
    DanglingReference {
        /// File searched
        file: String,
        /// Missing path id
        path_id: i64,
    },

    /// the schema source has no entry for the class at this version
    #[error("no schema for class {class_id} at version {version}")]
    UnknownClassForVersion {
        /// Class id looked up
        class_id: i32,
        /// Engine version looked up
        version: String,
    },

    /// the file carries no TypeTree and no schema source was supplied
    #[error("no schema available for class {0}")]
    MissingSchema(i32),
}

/// Generic result type with crate's Error as its error variant
pub type Result<T> = core::result::Result<T, Error>;
