//! Base types for structure of TPK resources.

use binrw::{BinRead, BinWrite};
use unity_version::EngineVersion;

use crate::error::{Error, Result};

/// Only supported resource format revision
pub const TPK_VERSION: u8 = 1;

/// Data type holding type tree information
pub const DATA_TYPE_TYPE_TREE: u8 = 0;

/// Resource header
///
/// All data is stored in little endian format
#[derive(BinRead, BinWrite, Debug, Copy, Clone, PartialEq, Eq)]
#[brw(little, magic = b"TPK*")]
pub struct TpkHeader {
    /// Format revision, see [`TPK_VERSION`]
    pub version: u8,

    /// Payload compression, see [`TpkCompression`]
    pub compression: u8,

    /// Payload kind, see [`DATA_TYPE_TYPE_TREE`]
    pub data_type: u8,

    /// Unused
    pub reserved_byte: u8,

    /// Unused
    pub reserved: u32,

    /// Stored payload size
    pub compressed_size: u32,

    /// Payload size once decompressed
    pub uncompressed_size: u32,
}

/// Payload compression of a resource
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
#[repr(u8)]
pub enum TpkCompression {
    /// Stored as it is
    #[default]
    None = 0,
    /// LZ4 block
    Lz4 = 1,
    /// Raw LZMA stream prefixed by its 5 property bytes
    Lzma = 2,
    /// Brotli stream
    Brotli = 3,
}

impl TryFrom<u8> for TpkCompression {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(TpkCompression::None),
            1 => Ok(TpkCompression::Lz4),
            2 => Ok(TpkCompression::Lzma),
            3 => Ok(TpkCompression::Brotli),
            other => Err(Error::UnsupportedCompression(other)),
        }
    }
}

/// Class flag: the class is abstract
pub const CLASS_ABSTRACT: u8 = 0x01;
/// Class flag: the class is sealed
pub const CLASS_SEALED: u8 = 0x02;
/// Class flag: the class only exists in the editor
pub const CLASS_EDITOR_ONLY: u8 = 0x04;
/// Class flag: the class only exists in players
pub const CLASS_RELEASE_ONLY: u8 = 0x08;
/// Class flag: the class was stripped
pub const CLASS_STRIPPED: u8 = 0x10;
/// Class flag: an editor root node follows
pub const CLASS_HAS_EDITOR_ROOT: u8 = 0x40;
/// Class flag: a release root node follows
pub const CLASS_HAS_RELEASE_ROOT: u8 = 0x80;

/// A class as of one engine version
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TpkClass {
    /// Index of the class name in the string buffer
    pub name: u16,

    /// Index of the base class name in the string buffer
    pub base: u16,

    /// See the `CLASS_*` constants
    pub flags: u8,

    /// Root of the editor schema in the node buffer
    pub editor_root: Option<u16>,

    /// Root of the player schema in the node buffer
    pub release_root: Option<u16>,
}

impl TpkClass {
    /// Whether the class is abstract
    pub fn is_abstract(&self) -> bool {
        self.flags & CLASS_ABSTRACT != 0
    }

    /// Whether the class was stripped
    pub fn is_stripped(&self) -> bool {
        self.flags & CLASS_STRIPPED != 0
    }
}

/// Every version entry of one class, ascending
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassHistory {
    /// Class id
    pub class_id: i32,

    /// `(version, class)` pairs, `None` where the class does not exist
    pub entries: Vec<(EngineVersion, Option<TpkClass>)>,
}

impl ClassHistory {
    /// The last entry at or before `version`
    pub fn at(&self, version: &EngineVersion) -> Option<&(EngineVersion, Option<TpkClass>)> {
        let index = self
            .entries
            .partition_point(|(entry, _)| entry <= version);
        index.checked_sub(1).map(|index| &self.entries[index])
    }
}

/// A schema node shared between classes and versions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TpkNode {
    /// Index of the type name in the string buffer
    pub type_name: u16,

    /// Index of the field name in the string buffer
    pub name: u16,

    /// Size of the value in bytes, -1 when variable
    pub byte_size: i32,

    /// Version of the type
    pub version: i16,

    /// Type flags
    pub type_flags: u8,

    /// Meta flags
    pub meta_flag: u32,

    /// Indices of the child nodes in the node buffer
    pub children: Vec<u16>,
}

/// The decompressed type tree payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeTreeBlob {
    /// Creation time in .NET ticks
    pub creation_time: i64,

    /// Every engine version the dictionary covers, ascending
    pub versions: Vec<EngineVersion>,

    /// Class histories in stored order
    pub classes: Vec<ClassHistory>,

    /// Number of common strings in effect from each version
    pub common_string_counts: Vec<(EngineVersion, u8)>,

    /// String buffer indices of the common strings, in table order
    pub common_string_indices: Vec<u16>,

    /// Node buffer
    pub nodes: Vec<TpkNode>,

    /// String buffer
    pub strings: Vec<String>,
}
