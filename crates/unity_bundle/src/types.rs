//! Base types for structure of bundle files.

use binrw::{BinRead, BinWrite, NullString};
use unity_version::EngineVersion;

use crate::compression::{CompressionMethod, COMPRESSION_MASK};
use crate::error::Result;

/// Signature text of a block based bundle
pub const SIGNATURE_FS: &[u8] = b"UnityFS";

/// Signature text of a legacy bundle whose payload is LZMA compressed
pub const SIGNATURE_WEB: &[u8] = b"UnityWeb";

/// Signature text of a legacy bundle whose payload is stored in place
pub const SIGNATURE_RAW: &[u8] = b"UnityRaw";

/// Signature of legacy bundles written with an obfuscated marker, stored like `UnityRaw`
pub const SIGNATURE_HIDDEN: &[u8] = &[0xFA; 8];

/// The container family named by a bundle's signature
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Signature {
    /// `UnityFS`
    UnityFS,
    /// `UnityWeb`
    UnityWeb,
    /// `UnityRaw`
    UnityRaw,
    /// Eight `0xFA` bytes
    Hidden,
}

impl Signature {
    /// Identify a null terminated signature
    pub fn from_bytes(value: &[u8]) -> Option<Self> {
        match value {
            SIGNATURE_FS => Some(Signature::UnityFS),
            SIGNATURE_WEB => Some(Signature::UnityWeb),
            SIGNATURE_RAW => Some(Signature::UnityRaw),
            SIGNATURE_HIDDEN => Some(Signature::Hidden),
            _ => None,
        }
    }

    /// Whether the legacy payload is LZMA compressed rather than stored in place
    pub fn is_compressed_payload(&self) -> bool {
        matches!(self, Signature::UnityWeb)
    }

    /// Signature bytes as written in the file
    pub fn as_bytes(&self) -> &'static [u8] {
        match self {
            Signature::UnityFS => SIGNATURE_FS,
            Signature::UnityWeb => SIGNATURE_WEB,
            Signature::UnityRaw => SIGNATURE_RAW,
            Signature::Hidden => SIGNATURE_HIDDEN,
        }
    }
}

/// Header shared by every bundle
///
/// All data is stored in big endian format
#[derive(BinRead, BinWrite, Debug, Clone, PartialEq, Eq)]
#[brw(big)]
pub struct BundleHeader {
    /// Signature text, see [`Signature`]
    pub signature: NullString,

    /// Container format revision
    pub format_version: u32,

    /// Minimum player version, usually `5.x.x`
    pub player_version: NullString,

    /// Engine version that built the bundle
    pub engine_version: NullString,
}

/// Block based header fields following the [`BundleHeader`]
#[derive(BinRead, BinWrite, Debug, Copy, Clone, PartialEq, Eq, Default)]
#[brw(big)]
pub struct FsHeader {
    /// Size of the whole bundle in bytes
    pub size: i64,

    /// Size of the directory record as stored
    pub directory_compressed: u32,

    /// Size of the directory record once decompressed
    pub directory_uncompressed: u32,

    /// Archive flags, see [`ArchiveFlags`]
    pub flags: u32,
}

/// A (compressed, uncompressed) size pair of a legacy streaming level
#[derive(BinRead, BinWrite, Debug, Copy, Clone, PartialEq, Eq, Default)]
#[brw(big)]
pub struct LevelInfo {
    /// Size of the level as stored
    pub compressed: u32,

    /// Size of the level once decompressed
    pub uncompressed: u32,
}

/// Legacy header fields following the [`BundleHeader`] for format revisions below 6
#[derive(BinRead, Debug, Clone, PartialEq, Eq)]
#[br(big, import(format_version: u32))]
pub struct LegacyHeader {
    /// Hash of the payload, format 4 and later
    #[br(if(format_version >= 4))]
    pub hash: Option<[u8; 16]>,

    /// CRC of the payload, format 4 and later
    #[br(if(format_version >= 4))]
    pub crc: Option<u32>,

    /// Bytes required before streaming may start
    pub minimum_streamed_bytes: u32,

    /// Offset of the payload from the start of the file
    pub header_size: u32,

    /// Levels to download before streaming
    pub levels_before_streaming: u32,

    /// Number of level size pairs
    #[br(assert(level_count > 0 && level_count <= 0xFFFF, "invalid level count {}", level_count))]
    pub level_count: u32,

    /// Level size pairs, the last one describes the whole payload
    #[br(count = level_count)]
    pub levels: Vec<LevelInfo>,

    /// Size of the complete file, format 2 and later
    #[br(if(format_version >= 2))]
    pub complete_file_size: Option<u32>,

    /// Size of the file info header, format 3 and later
    #[br(if(format_version >= 3))]
    pub file_info_header_size: Option<u32>,
}

/// Describes one file stored in the payload of a legacy bundle
#[derive(BinRead, BinWrite, Debug, Clone, PartialEq, Eq)]
#[brw(big)]
pub struct LegacyNode {
    /// Name of the file
    pub path: NullString,

    /// Offset of the file from the start of the payload
    pub offset: u32,

    /// Size of the file
    pub size: u32,
}

/// Describes one independently compressed block of a block based bundle
#[derive(BinRead, BinWrite, Debug, Copy, Clone, PartialEq, Eq, Default)]
#[brw(big)]
pub struct BlockInfo {
    /// Size of the block once decompressed
    pub uncompressed_size: u32,

    /// Size of the block as stored
    pub compressed_size: u32,

    /// Block flags, the low 6 bits select the compression method
    pub flags: u16,
}

impl BlockInfo {
    /// Flag set on blocks that are streamed rather than stored in the bundle
    pub const STREAMED: u16 = 0x40;

    /// The compression method used for this block
    pub fn compression(&self) -> Result<CompressionMethod> {
        CompressionMethod::from_flags(self.flags as u32)
    }
}

/// Describes one file stored in a bundle
#[derive(BinRead, BinWrite, Debug, Clone, PartialEq, Eq)]
#[brw(big)]
pub struct DirectoryNode {
    /// Offset of the file in the concatenated block data
    pub offset: i64,

    /// Size of the file
    pub size: i64,

    /// Entry flags, see [`DirectoryNode::SERIALIZED_FILE`]
    pub flags: u32,

    /// Name of the file
    pub path: NullString,
}

impl DirectoryNode {
    /// Flag set on entries that hold a serialized file
    pub const SERIALIZED_FILE: u32 = 0x4;
}

/// Archive flags of a block based bundle
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct ArchiveFlags(pub u32);

impl ArchiveFlags {
    /// Directory and block data are stored together
    pub const BLOCKS_AND_DIRECTORY_COMBINED: u32 = 0x40;

    /// The directory record is stored at the end of the file
    pub const DIRECTORY_AT_END: u32 = 0x80;

    /// Written for the old web player plugin
    pub const OLD_WEB_PLUGIN_COMPATIBILITY: u32 = 0x100;

    /// Padding to 16 bytes precedes the block data (newer engine versions)
    pub const BLOCK_INFO_NEEDS_PADDING: u32 = 0x200;

    /// Encryption marker used by engine versions that know about block padding
    pub const ENCRYPTION: u32 = 0x400;

    /// Encryption marker used by engine versions older than block padding
    pub const ENCRYPTION_OLD: u32 = 0x200;

    /// Compression method of the directory record
    pub fn compression(&self) -> Result<CompressionMethod> {
        CompressionMethod::from_flags(self.0 & COMPRESSION_MASK)
    }

    /// Whether the directory record is stored at the end of the file
    pub fn directory_at_end(&self) -> bool {
        self.0 & Self::DIRECTORY_AT_END != 0
    }

    /// Whether directory and blocks are combined
    pub fn combined(&self) -> bool {
        self.0 & Self::BLOCKS_AND_DIRECTORY_COMBINED != 0
    }

    /// Whether the bundle requests padding before its block data
    pub fn needs_block_padding(&self, engine: &EngineVersion) -> bool {
        uses_block_alignment(engine) && self.0 & Self::BLOCK_INFO_NEEDS_PADDING != 0
    }

    /// Whether the bundle is marked as encrypted
    pub fn is_encrypted(&self, engine: &EngineVersion) -> bool {
        let flag = if uses_block_alignment(engine) {
            Self::ENCRYPTION
        } else {
            Self::ENCRYPTION_OLD
        };
        self.0 & flag != 0
    }
}

/// `0x200` changed meaning from an encryption marker to block padding in 2020.3.34, 2021.3.2 and
/// 2022.1.1.
fn uses_block_alignment(engine: &EngineVersion) -> bool {
    match engine.major {
        0..=2019 => false,
        2020 => *engine >= EngineVersion::new(2020, 3, 34),
        2021 => *engine >= EngineVersion::new(2021, 3, 2),
        2022 => *engine >= EngineVersion::new(2022, 1, 1),
        _ => true,
    }
}
