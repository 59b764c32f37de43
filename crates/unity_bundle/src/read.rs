//! Types for reading bundle archives
//!

use binrw::BinRead;
use byteorder::{BigEndian, ReadBytesExt};
use indexmap::IndexMap;
use std::{
    fmt::{self, Debug},
    io::{Cursor, Read, Seek, SeekFrom},
};
use tracing::{debug, instrument, trace};
use unity_version::EngineVersion;

use crate::{
    compression::{decompress_block, Decompressor, DefaultDecompressor},
    error::{Error, FileNotFoundError, Result},
    types::{
        ArchiveFlags, BlockInfo, BundleHeader, DirectoryNode, FsHeader, LegacyHeader, LegacyNode,
        Signature,
    },
};

/// Smallest encoded [`BlockInfo`]
const BLOCK_INFO_SIZE: usize = 10;

/// Smallest encoded [`DirectoryNode`], with an empty name
const DIRECTORY_NODE_SIZE: usize = 21;

/// Smallest encoded [`LegacyNode`], with an empty name
const LEGACY_NODE_SIZE: usize = 9;

/// A struct for reading an entry from an archive
pub struct ArchiveFile<'a> {
    data: &'a ArchiveEntry,
    reader: Cursor<&'a [u8]>,
}

impl Debug for ArchiveFile<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "ArchiveFile({:#?})", self.get_metadata())
    }
}

/// Methods for retrieving information on archive entries
impl<'a> ArchiveFile<'a> {
    pub(crate) fn new(data: &'a ArchiveEntry, buffer: &'a [u8]) -> Self {
        Self {
            data,
            reader: Cursor::new(buffer),
        }
    }

    /// Get the name of the file
    ///
    /// # Warnings
    ///
    /// It is dangerous to use this name directly when extracting an archive.
    /// It may contain an absolute path (`/etc/shadow`), or break out of the
    /// current directory (`../runtime`). Carelessly writing to these paths
    /// allows an attacker to craft an archive that will overwrite critical
    /// files.
    ///
    pub fn name(&self) -> &str {
        &self.get_metadata().file_name
    }

    /// Get the name of the file, in the raw (internal) byte representation.
    pub fn name_raw(&self) -> &[u8] {
        &self.get_metadata().file_name_raw
    }

    /// Get the size of the file, in bytes
    pub fn size(&self) -> u64 {
        self.get_metadata().size
    }

    /// Get the offset of the file in the decompressed archive data
    pub fn offset(&self) -> u64 {
        self.get_metadata().offset
    }

    /// Get the entry flags
    pub fn flags(&self) -> u32 {
        self.get_metadata().flags
    }

    /// Whether the entry holds a serialized file
    pub fn is_serialized_file(&self) -> bool {
        self.flags() & DirectoryNode::SERIALIZED_FILE != 0
    }

    /// The full contents of the file
    pub fn data(&self) -> &'a [u8] {
        self.reader.get_ref()
    }

    fn get_metadata(&self) -> &ArchiveEntry {
        self.data
    }
}

impl Read for ArchiveFile<'_> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.reader.read(buf)
    }
}

/// Structure representing an archive entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArchiveEntry {
    /// Offset of the data in the decompressed archive data
    pub offset: u64,
    /// Size of the data
    pub size: u64,
    /// Entry flags
    pub flags: u32,
    /// Name of the file
    pub file_name: Box<str>,
    /// Raw file name. To be used when file_name was incorrectly decoded.
    pub file_name_raw: Box<[u8]>,
}

impl ArchiveEntry {
    pub(crate) fn new(name: Vec<u8>, offset: u64, size: u64, flags: u32) -> Self {
        Self {
            offset,
            size,
            flags,
            file_name: String::from_utf8_lossy(&name).into(),
            file_name_raw: name.into(),
        }
    }
}

/// Collect entries into a name index, checking that each one fits in the data and names are unique
pub(crate) fn index_entries(
    entries: Vec<ArchiveEntry>,
    data_len: usize,
) -> Result<IndexMap<Box<str>, ArchiveEntry>> {
    let mut index_map = IndexMap::with_capacity(entries.len());
    for entry in entries {
        let end = entry.offset.checked_add(entry.size);
        if end.map_or(true, |end| end > data_len as u64) {
            return Err(Error::CorruptStructure(format!(
                "entry {} ({}..+{}) exceeds {} bytes of data",
                entry.file_name, entry.offset, entry.size, data_len
            )));
        }
        trace!(name = %entry.file_name, offset = entry.offset, size = entry.size, "entry");
        if let Some(previous) = index_map.insert(entry.file_name.clone(), entry) {
            return Err(Error::CorruptStructure(format!(
                "entry {} is listed more than once",
                previous.file_name
            )));
        }
    }
    Ok(index_map)
}

pub(crate) fn corrupt(e: impl fmt::Display) -> Error {
    Error::CorruptStructure(e.to_string())
}

fn align(position: u64, alignment: u64) -> u64 {
    position.div_ceil(alignment) * alignment
}

/// Check an untrusted element count against the bytes that are left
fn checked_count(count: i32, element_size: usize, remaining: usize, what: &str) -> Result<usize> {
    let count = usize::try_from(count)
        .map_err(|_| Error::CorruptStructure(format!("negative {what} count {count}")))?;
    if count.saturating_mul(element_size) > remaining {
        return Err(Error::CorruptStructure(format!(
            "{count} {what} entries do not fit in {remaining} bytes"
        )));
    }
    Ok(count)
}

/// Asset bundle reader
///
/// Understands the block based `UnityFS` layout as well as the legacy `UnityWeb` and `UnityRaw`
/// layouts. The whole logical data of the bundle is decompressed when it is opened.
///
/// ```no_run
/// use std::io::prelude::*;
///
/// fn list_bundle_contents(reader: impl Read) -> unity_bundle::error::Result<()> {
///     let bundle = unity_bundle::BundleArchive::new(reader)?;
///
///     for i in 0..bundle.len() {
///         let mut file = bundle.by_index(i)?;
///         println!("Filename: {}", file.name());
///         std::io::copy(&mut file, &mut std::io::sink())?;
///     }
///
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct BundleArchive {
    signature: Signature,
    header: BundleHeader,
    engine: EngineVersion,
    flags: Option<ArchiveFlags>,
    blocks: Vec<BlockInfo>,
    files: IndexMap<Box<str>, ArchiveEntry>,
    data: Vec<u8>,
}

impl BundleArchive {
    /// Read a bundle collecting the files it contains.
    pub fn new(mut reader: impl Read) -> Result<BundleArchive> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        Self::from_bytes(&bytes)
    }

    /// Parse a bundle held in memory
    pub fn from_bytes(bytes: &[u8]) -> Result<BundleArchive> {
        Self::from_bytes_with(bytes, &DefaultDecompressor)
    }

    /// Parse a bundle held in memory with a custom [`Decompressor`]
    #[instrument(skip_all, fields(size = bytes.len()), err)]
    pub fn from_bytes_with(bytes: &[u8], decompressor: &dyn Decompressor) -> Result<BundleArchive> {
        let signature = detect_signature(bytes).ok_or_else(|| {
            Error::UnrecognizedFormat(String::from_utf8_lossy(&bytes[..bytes.len().min(16)]).into())
        })?;

        let mut reader = Cursor::new(bytes);
        let header = BundleHeader::read(&mut reader).map_err(corrupt)?;
        let engine_text = String::from_utf8_lossy(&header.engine_version.0).into_owned();
        let engine = EngineVersion::parse(&engine_text).unwrap_or_else(|_| {
            debug!(engine = %engine_text, "unparsable engine version, assuming stripped");
            EngineVersion::default()
        });

        debug!(
            ?signature,
            format_version = header.format_version,
            %engine,
            "read bundle header"
        );

        let (flags, blocks, entries, data) = match (signature, header.format_version) {
            (Signature::UnityFS, 6..=8) | (_, 6) => {
                let layout = read_blocks(&mut reader, signature, &header, &engine, decompressor)?;
                (Some(layout.0), layout.1, layout.2, layout.3)
            }
            (Signature::UnityFS, _) | (_, 0) | (_, 7..) => {
                return Err(Error::UnsupportedVersion {
                    signature: String::from_utf8_lossy(signature.as_bytes()).into(),
                    version: header.format_version,
                });
            }
            (_, _) => {
                let (entries, data) = read_legacy(&mut reader, signature, &header, decompressor)?;
                (None, Vec::new(), entries, data)
            }
        };

        let files = index_entries(entries, data.len())?;
        debug!(entries = files.len(), blocks = blocks.len(), size = data.len(), "read bundle");

        Ok(BundleArchive {
            signature,
            header,
            engine,
            flags,
            blocks,
            files,
            data,
        })
    }

    /// Number of entries contained in this bundle.
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Whether this bundle contains no entries
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns an iterator over all the file names in this bundle.
    pub fn file_names(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(|s| s.as_ref())
    }

    /// The signature the bundle was written with
    pub fn signature(&self) -> Signature {
        self.signature
    }

    /// The container format revision
    pub fn format_version(&self) -> u32 {
        self.header.format_version
    }

    /// The declared minimum player version
    pub fn player_version(&self) -> String {
        String::from_utf8_lossy(&self.header.player_version.0).into_owned()
    }

    /// The declared engine version text
    pub fn engine_version_text(&self) -> String {
        String::from_utf8_lossy(&self.header.engine_version.0).into_owned()
    }

    /// The parsed engine version, all zeros when the text could not be parsed
    pub fn engine_version(&self) -> EngineVersion {
        self.engine
    }

    /// Archive flags of a block based bundle
    pub fn flags(&self) -> Option<ArchiveFlags> {
        self.flags
    }

    /// Block table of a block based bundle
    pub fn blocks(&self) -> &[BlockInfo] {
        &self.blocks
    }

    /// The decompressed logical data all entries point into
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Get the index of a file entry by name, if it's present.
    #[inline(always)]
    pub fn index_for_name(&self, name: &str) -> Option<usize> {
        self.files.get_index_of(name)
    }

    /// Get the name of a file entry, if it's present.
    #[inline(always)]
    pub fn name_for_index(&self, index: usize) -> Option<&str> {
        self.files.get_index(index).map(|(name, _)| name.as_ref())
    }

    /// Search for a file entry by name
    pub fn by_name(&self, name: &str) -> Result<ArchiveFile<'_>> {
        let Some(index) = self.files.get_index_of(name) else {
            return Err(Error::FileNotFound(FileNotFoundError::Name(
                name.to_owned(),
            )));
        };
        self.by_index(index)
    }

    /// Get a contained file by index
    pub fn by_index(&self, file_number: usize) -> Result<ArchiveFile<'_>> {
        let (_, entry) = self
            .files
            .get_index(file_number)
            .ok_or(Error::FileNotFound(FileNotFoundError::Index(file_number)))?;

        let start = entry.offset as usize;
        let end = start + entry.size as usize;
        Ok(ArchiveFile::new(entry, &self.data[start..end]))
    }

    /// Iterate over every entry in directory order
    pub fn files(&self) -> impl Iterator<Item = ArchiveFile<'_>> {
        self.files.values().map(|entry| {
            let start = entry.offset as usize;
            let end = start + entry.size as usize;
            ArchiveFile::new(entry, &self.data[start..end])
        })
    }
}

/// Identify a bundle signature at the start of the data
pub fn detect_signature(bytes: &[u8]) -> Option<Signature> {
    let end = bytes.iter().take(16).position(|b| *b == 0)?;
    Signature::from_bytes(&bytes[..end])
}

type Layout = (ArchiveFlags, Vec<BlockInfo>, Vec<ArchiveEntry>, Vec<u8>);

fn read_blocks(
    reader: &mut Cursor<&[u8]>,
    signature: Signature,
    header: &BundleHeader,
    engine: &EngineVersion,
    decompressor: &dyn Decompressor,
) -> Result<Layout> {
    let bytes: &[u8] = *reader.get_ref();
    let fs = FsHeader::read(reader).map_err(corrupt)?;
    if signature != Signature::UnityFS {
        reader.seek(SeekFrom::Current(1))?;
    }
    if header.format_version >= 7 {
        let position = align(reader.position(), 16);
        reader.set_position(position);
    }

    let flags = ArchiveFlags(fs.flags);
    if flags.is_encrypted(engine) {
        return Err(Error::UnsupportedCompression("encrypted bundle".into()));
    }
    let directory_method = flags.compression()?;

    let directory_size = fs.directory_compressed as usize;
    let directory_bytes = if flags.directory_at_end() {
        let start = bytes.len().checked_sub(directory_size).ok_or_else(|| {
            Error::CorruptStructure(format!(
                "directory of {directory_size} bytes does not fit in {} bytes",
                bytes.len()
            ))
        })?;
        &bytes[start..]
    } else {
        let start = reader.position() as usize;
        let directory = bytes.get(start..start + directory_size).ok_or_else(|| {
            Error::CorruptStructure(format!(
                "directory of {directory_size} bytes at {start} exceeds {} bytes",
                bytes.len()
            ))
        })?;
        reader.set_position((start + directory_size) as u64);
        directory
    };

    debug!(
        method = ?directory_method,
        compressed = fs.directory_compressed,
        uncompressed = fs.directory_uncompressed,
        at_end = flags.directory_at_end(),
        "reading directory"
    );
    let directory = decompress_block(
        decompressor,
        directory_method,
        directory_bytes,
        fs.directory_uncompressed as usize,
    )?;
    let (blocks, nodes) = read_directory(&directory)?;

    if flags.needs_block_padding(engine) {
        let position = align(reader.position(), 16);
        reader.set_position(position);
    }

    let total = blocks
        .iter()
        .try_fold(0usize, |acc, block| acc.checked_add(block.uncompressed_size as usize))
        .ok_or_else(|| Error::CorruptStructure("block sizes overflow".into()))?;
    let mut data = Vec::with_capacity(total.min(bytes.len().saturating_mul(4)));

    let mut position = reader.position() as usize;
    for (index, block) in blocks.iter().enumerate() {
        let size = block.compressed_size as usize;
        let stored = bytes.get(position..position + size).ok_or_else(|| {
            Error::CorruptStructure(format!(
                "block {index} of {size} bytes at {position} exceeds {} bytes",
                bytes.len()
            ))
        })?;
        let method = block.compression()?;
        trace!(index, ?method, compressed = size, uncompressed = block.uncompressed_size, "block");
        data.extend(decompress_block(
            decompressor,
            method,
            stored,
            block.uncompressed_size as usize,
        )?);
        position += size;
    }

    let entries = nodes
        .into_iter()
        .map(|node| {
            let offset = u64::try_from(node.offset).map_err(corrupt)?;
            let size = u64::try_from(node.size).map_err(corrupt)?;
            Ok(ArchiveEntry::new(node.path.0, offset, size, node.flags))
        })
        .collect::<Result<Vec<_>>>()?;

    Ok((flags, blocks, entries, data))
}

/// Parse a decompressed directory record into its block and entry tables
pub fn read_directory(directory: &[u8]) -> Result<(Vec<BlockInfo>, Vec<DirectoryNode>)> {
    let mut reader = Cursor::new(directory);
    reader.seek(SeekFrom::Current(16))?;

    let remaining = |reader: &Cursor<&[u8]>| directory.len().saturating_sub(reader.position() as usize);

    let count = reader.read_i32::<BigEndian>().map_err(corrupt)?;
    let count = checked_count(count, BLOCK_INFO_SIZE, remaining(&reader), "block")?;
    let blocks = (0..count)
        .map(|_| BlockInfo::read(&mut reader).map_err(corrupt))
        .collect::<Result<Vec<_>>>()?;

    let count = reader.read_i32::<BigEndian>().map_err(corrupt)?;
    let count = checked_count(count, DIRECTORY_NODE_SIZE, remaining(&reader), "directory")?;
    let nodes = (0..count)
        .map(|_| DirectoryNode::read(&mut reader).map_err(corrupt))
        .collect::<Result<Vec<_>>>()?;

    Ok((blocks, nodes))
}

fn read_legacy(
    reader: &mut Cursor<&[u8]>,
    signature: Signature,
    header: &BundleHeader,
    decompressor: &dyn Decompressor,
) -> Result<(Vec<ArchiveEntry>, Vec<u8>)> {
    let bytes: &[u8] = *reader.get_ref();
    let legacy = LegacyHeader::read_args(reader, (header.format_version,)).map_err(corrupt)?;
    let level = legacy
        .levels
        .last()
        .ok_or_else(|| Error::CorruptStructure("no levels".into()))?;

    let start = legacy.header_size as usize;
    let stored = bytes
        .get(start..start + level.compressed as usize)
        .ok_or_else(|| {
            Error::CorruptStructure(format!(
                "payload of {} bytes at {start} exceeds {} bytes",
                level.compressed,
                bytes.len()
            ))
        })?;

    let data = if signature.is_compressed_payload() {
        debug!(compressed = stored.len(), "decompressing lzma payload");
        decompressor.lzma_alone(stored)?
    } else {
        stored.to_vec()
    };

    let mut payload = Cursor::new(data.as_slice());
    let count = payload.read_i32::<BigEndian>().map_err(corrupt)?;
    let count = checked_count(count, LEGACY_NODE_SIZE, data.len().saturating_sub(4), "file")?;
    let entries = (0..count)
        .map(|_| {
            let node = LegacyNode::read(&mut payload).map_err(corrupt)?;
            Ok(ArchiveEntry::new(
                node.path.0,
                node.offset as u64,
                node.size as u64,
                DirectoryNode::SERIALIZED_FILE,
            ))
        })
        .collect::<Result<Vec<_>>>()?;

    Ok((entries, data))
}
