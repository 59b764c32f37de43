//! Base types for structure of serialized files.

use binrw::{BinRead, BinWrite, Endian};
use bon::Builder;

use crate::typetree::{CommonStrings, TypeTree};

/// Oldest format revision the parser accepts
pub const MIN_FORMAT_VERSION: u32 = 2;

/// Newest format revision the parser accepts
pub const MAX_FORMAT_VERSION: u32 = 23;

/// First revision storing the byte order in the header instead of before the metadata
pub const HEADER_ENDIAN_VERSION: u32 = 9;

/// First revision with 64 bit sizes and offsets in the header
pub const LARGE_FILES_VERSION: u32 = 22;

/// Class id of `MonoBehaviour`
pub const MONO_BEHAVIOUR_CLASS_ID: i32 = 114;

/// Header prefix shared by every revision
///
/// All data is stored in big endian format
#[derive(BinRead, BinWrite, Debug, Copy, Clone, PartialEq, Eq)]
#[brw(big)]
pub struct HeaderPrefix {
    /// Size of the metadata, zero from format 22
    pub metadata_size: u32,

    /// Size of the whole file, zero from format 22
    pub file_size: u32,

    /// Format revision
    pub format_version: u32,

    /// Offset of the object data, zero from format 22
    pub data_offset: u32,
}

/// Header fields following the endian byte from format 22
///
/// All data is stored in big endian format
#[derive(BinRead, BinWrite, Debug, Copy, Clone, PartialEq, Eq)]
#[brw(big)]
pub struct LargeHeader {
    /// Size of the metadata
    pub metadata_size: u32,

    /// Size of the whole file
    pub file_size: i64,

    /// Offset of the object data
    pub data_offset: i64,

    /// Unused
    pub reserved: [u8; 8],
}

/// Parsed serialized file header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerializedHeader {
    /// The prefix as stored
    pub prefix: HeaderPrefix,

    /// Format revision
    pub format_version: u32,

    /// Size of the metadata
    pub metadata_size: u64,

    /// Size of the whole file
    pub file_size: u64,

    /// Offset of the object data
    pub data_offset: u64,

    /// Byte order of the metadata and of every object
    pub endian: Endian,

    /// The three bytes after the endian byte, format 9 onwards
    pub reserved: [u8; 3],

    /// The 64 bit fields from format 22
    pub large: Option<LargeHeader>,
}

impl SerializedHeader {
    /// Bytes occupied by the header, up to the start of the metadata for format 9 onwards
    pub fn size(&self) -> usize {
        match self.format_version {
            v if v >= LARGE_FILES_VERSION => 48,
            v if v >= HEADER_ENDIAN_VERSION => 20,
            _ => 16,
        }
    }
}

/// Endian byte as stored, zero for little endian
pub(crate) fn endian_from_byte(value: u8) -> Endian {
    if value == 0 {
        Endian::Little
    } else {
        Endian::Big
    }
}

pub(crate) fn endian_to_byte(endian: Endian) -> u8 {
    match endian {
        Endian::Little => 0,
        Endian::Big => 1,
    }
}

/// A type described by the metadata, either a class or a managed reference type
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SerializedType {
    /// Engine class id, negative for scripts in old revisions
    pub class_id: i32,

    /// Whether the type was stripped from the build, format 16 onwards
    pub is_stripped: bool,

    /// Index into the script types, format 17 onwards
    pub script_type_index: i16,

    /// Hash of the script, stored for script types from format 13
    pub script_id: Option<[u8; 16]>,

    /// Hash of the type layout, format 13 onwards
    pub old_type_hash: Option<[u8; 16]>,

    /// Embedded schema when the file carries TypeTrees
    pub type_tree: Option<TypeTree>,

    /// Indices of the reference types this type uses, format 21 onwards
    pub type_dependencies: Vec<i32>,

    /// Reference types only: class name, namespace and assembly
    pub reference: Option<ReferenceTypeName>,
}

/// Names identifying a managed reference type
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ReferenceTypeName {
    /// Class name
    pub class_name: String,

    /// Namespace
    pub namespace: String,

    /// Assembly name
    pub assembly: String,
}

/// Directory entry of one object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectInfo {
    /// Identifier of the object within the file, never 0
    pub path_id: i64,

    /// Absolute offset of the object data in the file
    pub byte_start: u64,

    /// Size of the object data
    pub byte_size: u32,

    /// Type id as stored, a class id before format 16 and an index into the types afterwards
    pub type_id: i32,

    /// Engine class id
    pub class_id: i32,

    /// Index of the matching [`SerializedType`], if any
    pub type_index: Option<usize>,

    /// Destroyed flag, before format 11
    pub is_destroyed: Option<u16>,

    /// Script type index, formats 11 to 16
    pub script_type_index: Option<i16>,

    /// Stripped flag, formats 15 and 16
    pub stripped: Option<u8>,
}

/// Script type stored in the metadata from format 11
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ScriptIdentifier {
    /// File holding the script, 0 for the file itself
    pub file_index: i32,

    /// Path id of the script within that file
    pub path_id: i64,
}

/// A file referenced by pointers with a non zero file index
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ExternalFileReference {
    /// Asset path, format 6 onwards
    pub asset_path: String,

    /// GUID of the asset, format 5 onwards
    pub guid: [u8; 16],

    /// Reference kind, format 5 onwards
    pub kind: i32,

    /// Path of the referenced file
    pub path_name: String,
}

impl ExternalFileReference {
    /// Last component of the path, used to find the file among loaded siblings
    pub fn file_name(&self) -> &str {
        self.path_name
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or(&self.path_name)
    }
}

/// Options for [`crate::SerializedFile::parse_with`]
#[derive(Builder, Debug, Clone, Default)]
pub struct ParseOptions<'a> {
    /// Common string table for blob TypeTrees, the built in table when absent
    pub common_strings: Option<&'a CommonStrings>,

    /// Name of the file, used to find it as a sibling and in diagnostics
    #[builder(into)]
    pub name: Option<String>,
}

impl<'a> ParseOptions<'a> {
    pub(crate) fn common_strings(&self) -> &'a CommonStrings {
        match self.common_strings {
            Some(table) => table,
            None => CommonStrings::builtin(),
        }
    }
}
