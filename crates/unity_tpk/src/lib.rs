//! This library loads TPK type tree dictionaries and answers schema lookups for *Unity* classes
//! at a given engine version, for serialized files that were built without embedded TypeTrees.
//!
//! # TPK Format Documentation
//!
//! The header is little endian:
//!
//! | Field             | Description                                                |
//! |-------------------|------------------------------------------------------------|
//! | Magic             | `TPK*`                                                     |
//! | Version           | 1 byte: 1                                                  |
//! | Compression       | 1 byte: 0 none, 1 LZ4, 2 LZMA, 3 brotli                    |
//! | Data type         | 1 byte: 0 for type tree information                        |
//! | Reserved          | 1 byte then 4 bytes                                        |
//! | Compressed size   | 4 bytes: size of the stored payload                        |
//! | Uncompressed size | 4 bytes                                                    |
//!
//! ## Type tree payload
//!
//! | Field          | Description                                                         |
//! |----------------|---------------------------------------------------------------------|
//! | Creation time  | 8 bytes                                                             |
//! | Versions       | 4 byte count then packed 8 byte engine versions                     |
//! | Classes        | 4 byte count then `(i32 id, i32 count, count × (version, class))`   |
//! | Common strings | 4 byte count of `(version, u8 count)`, 4 byte count of `u16` index  |
//! | Nodes          | 4 byte count then node records                                      |
//! | Strings        | 4 byte count then 7 bit length prefixed UTF-8                       |
//!
//! A class entry is a packed version and a presence flag, followed when present by the name and
//! base name string indices, a flags byte and, as the flags announce, the editor and release
//! root node indices. A node record is type name and name string indices, a 4 byte size, a 2 byte
//! version, type flags, a 4 byte meta flag and a 2 byte counted list of child node indices.
//!
//! Nodes are shared between classes and versions; [`SchemaDictionary::schema`] walks them into a
//! [`unity_serialized::TypeTreeNode`] tree and keeps the result for the next lookup.

pub mod dictionary;
pub mod error;
pub mod read;
pub mod types;

pub use dictionary::{global, install, DictionaryOptions, RootKind, SchemaDictionary};
pub use types::{ClassHistory, TpkClass, TpkCompression, TpkHeader, TpkNode, TypeTreeBlob};
