//! This library handles reading and writing *Unity* serialized files and decoding the objects in
//! them against their TypeTree schemas.
//!
//! # Serialized File Format Documentation
//!
//! The header is big endian:
//!
//! | Field          | Description                                                 |
//! |----------------|-------------------------------------------------------------|
//! | Metadata size  | 4 bytes                                                     |
//! | File size      | 4 bytes                                                     |
//! | Format version | 4 bytes: 2 to 23                                            |
//! | Data offset    | 4 bytes: start of the object data                           |
//! | Endian         | 1 byte, from format 9: 0 for little endian                  |
//! | Reserved       | 3 bytes, from format 9                                      |
//!
//! From format 22 the first three fields are unused and followed, after the reserved bytes, by a
//! 4 byte metadata size, 8 byte file size, 8 byte data offset and 8 reserved bytes. Before format
//! 9 the endian byte and the metadata sit at the end of the file, at file size minus metadata
//! size.
//!
//! ## Metadata
//!
//! Stored in the byte order of the endian byte:
//!
//! | Field             | Present                                               |
//! |-------------------|-------------------------------------------------------|
//! | Engine version    | format 7, null terminated                             |
//! | Target platform   | format 8, 4 bytes                                     |
//! | Has TypeTrees     | format 13, 1 byte                                     |
//! | Types             | 4 byte count then types                               |
//! | Big ids           | formats 7 to 13, 4 bytes                              |
//! | Objects           | 4 byte count then object records                      |
//! | Script types      | format 11, 4 byte count then `(i32 file, path id)`    |
//! | Externals         | 4 byte count then `(asset path, guid, kind, path)`    |
//! | Reference types   | format 20, 4 byte count then types                    |
//! | User information  | format 5, null terminated                             |
//!
//! A type is a class id, from format 16 a stripped flag, from 17 a script type index, from 13 the
//! script hash for script types and the type hash, then the TypeTree when the file carries them
//! (see [`typetree`]) and from 21 its dependencies or, for reference types, its class, namespace
//! and assembly names.
//!
//! An object record is the path id (4 bytes before format 14, 8 bytes aligned to 4 afterwards,
//! always 8 with big ids), the start relative to the data offset (8 bytes from format 22), the
//! size, the type id, then revision specific fields: a 2 byte class id before 16, a destroyed flag
//! before 11, a script type index from 11 to 16 and a stripped flag in 15 and 16.
//!
//! ## Objects
//!
//! Object data is laid out as its TypeTree describes: fixed width values in the file's byte order,
//! length prefixed strings and arrays, and alignment to 4 bytes after nodes flagged `0x4000`.
//! [`codec`] reads and writes such values as [`Value`] and [`ObjectDecoder`] applies it to the
//! objects of a file.
//!

pub mod codec;
pub mod decoder;
pub mod error;
pub mod pptr;
pub mod read;
pub mod stream;
pub mod typetree;
pub mod types;
pub mod value;
pub mod write;

pub use codec::{read_value, write_value, NodeCursor};
pub use decoder::{DecodePolicy, DecodedObject, ObjectDecoder, SchemaSource};
pub use pptr::{resolve, resolve_file, FileSet, Pointer, SiblingLookup};
pub use read::SerializedFile;
pub use stream::{EndianReader, EndianWriter};
pub use typetree::{CommonStrings, NodeKind, TypeTree, TypeTreeNode};
pub use types::{ExternalFileReference, ObjectInfo, ParseOptions, SerializedType};
pub use value::Value;
