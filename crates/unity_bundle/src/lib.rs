//! This library handles reading from and creating the archive containers used by *Unity* to ship
//! serialized files and resources.
//!
//! # Container Format Documentation
//!
//! Three container families are understood. They are told apart by their signature.
//!
//! ## Block based bundles (`UnityFS`)
//!
//! All multi-byte integers are big endian.
//!
//! | Field                  | Description                                                       |
//! |------------------------|-------------------------------------------------------------------|
//! | Signature              | Null terminated `UnityFS`                                         |
//! | Format version         | 4 bytes: 6, 7 or 8                                                |
//! | Player version         | Null terminated, usually `5.x.x`                                  |
//! | Engine version         | Null terminated, for example `2019.4.0f1`                         |
//! | Size                   | 8 bytes: total size of the bundle                                 |
//! | Directory compressed   | 4 bytes: stored size of the directory record                      |
//! | Directory uncompressed | 4 bytes: size of the directory record once decompressed           |
//! | Flags                  | 4 bytes: see below                                                |
//!
//! From format 7 the header is padded to a multiple of 16 bytes.
//!
//! The low 6 bits of the flags select the compression of the directory record:
//!   - `0`: None
//!   - `1`: LZMA
//!   - `2`: LZ4
//!   - `3`: LZ4HC
//!   - `4`: LZHAM (not supported)
//!
//! Bit `0x40` marks the directory and blocks as combined, bit `0x80` stores the directory at the end
//! of the file and bit `0x100` marks old web plugin compatibility. Bit `0x200` requests padding to
//! 16 bytes before the block data from 2020.3.34, 2021.3.2 and 2022.1.1 on; before those versions
//! it marks an encrypted bundle, which `0x400` does afterwards.
//!
//! ### Directory record
//!
//! | Field        | Description                                                        |
//! |--------------|--------------------------------------------------------------------|
//! | Hash         | 16 bytes: hash of the uncompressed data                            |
//! | Block count  | 4 bytes                                                            |
//! | Blocks       | `(u32 uncompressed size, u32 compressed size, u16 flags)`          |
//! | Entry count  | 4 bytes                                                            |
//! | Entries      | `(i64 offset, i64 size, u32 flags, null terminated name)`          |
//!
//! Each block is compressed on its own with the method in the low 6 bits of its flags. The blocks
//! are decompressed and concatenated into a single buffer, entry offsets point into that buffer.
//!
//! ## Legacy bundles (`UnityWeb`, `UnityRaw`)
//!
//! Format versions below 6 follow the common header with a streaming header: hash and CRC (from
//! format 4), minimum streamed bytes, header size, levels before streaming, level count and level
//! size pairs, complete file size (from format 2) and file info header size (from format 3). The
//! payload starts at the header size; it is LZMA compressed for `UnityWeb`. It begins with an entry
//! count followed by `(null terminated name, u32 offset, u32 size)` records. Format 6 with a legacy
//! signature uses the block based layout.
//!
//! ## Web data containers
//!
//! Optionally gzip or brotli compressed. The payload starts with the null terminated signature
//! `UnityWebData1.0`, a 4 byte header length and `(i32 offset, i32 length, i32 name length, name)`
//! records until the header length is reached. All integers are little endian.
//!

pub mod compression;
pub mod error;
pub mod read;
pub mod types;
pub mod web;
pub mod write;

pub use compression::{CompressionMethod, Decompressor, DefaultDecompressor};
pub use read::{ArchiveFile, BundleArchive};
pub use web::WebArchive;
pub use write::BundleWriter;

use error::{Error, Result};

/// Any container understood by this library
#[derive(Debug)]
pub enum Container {
    /// A `UnityFS`, `UnityWeb` or `UnityRaw` bundle
    Bundle(BundleArchive),
    /// A web data container
    Web(WebArchive),
}

impl Container {
    /// Detect the container family and parse it
    pub fn from_bytes(bytes: &[u8]) -> Result<Container> {
        Self::from_bytes_with(bytes, &DefaultDecompressor)
    }

    /// Detect the container family and parse it with a custom [`Decompressor`]
    pub fn from_bytes_with(bytes: &[u8], decompressor: &dyn Decompressor) -> Result<Container> {
        if read::detect_signature(bytes).is_some() {
            return BundleArchive::from_bytes_with(bytes, decompressor).map(Container::Bundle);
        }

        match web::WebCompression::detect(bytes) {
            web::WebCompression::None if !web::is_web_data(bytes) => Err(
                Error::UnrecognizedFormat(String::from_utf8_lossy(&bytes[..bytes.len().min(16)]).into()),
            ),
            _ => WebArchive::from_bytes_with(bytes, decompressor).map(Container::Web),
        }
    }

    /// Number of entries in the container
    pub fn len(&self) -> usize {
        match self {
            Container::Bundle(bundle) => bundle.len(),
            Container::Web(web) => web.len(),
        }
    }

    /// Whether the container holds no entries
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns an iterator over all the file names in the container
    pub fn file_names(&self) -> Box<dyn Iterator<Item = &str> + '_> {
        match self {
            Container::Bundle(bundle) => Box::new(bundle.file_names()),
            Container::Web(web) => Box::new(web.file_names()),
        }
    }

    /// Get a contained file by index
    pub fn by_index(&self, index: usize) -> Result<ArchiveFile<'_>> {
        match self {
            Container::Bundle(bundle) => bundle.by_index(index),
            Container::Web(web) => web.by_index(index),
        }
    }

    /// Search for a contained file by name
    pub fn by_name(&self, name: &str) -> Result<ArchiveFile<'_>> {
        match self {
            Container::Bundle(bundle) => bundle.by_name(name),
            Container::Web(web) => web.by_name(name),
        }
    }
}
