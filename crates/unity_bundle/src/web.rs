//! Types for reading WebGL data containers
//!
//! A web container is an optionally gzip or brotli compressed flat file. It starts with a
//! signature, a header length and a table of `(offset, length, name)` records, all little endian.

use binrw::{BinRead, NullString};
use byteorder::{LittleEndian, ReadBytesExt};
use indexmap::IndexMap;
use std::io::{Cursor, Read};
use tracing::{debug, instrument, trace};

use crate::{
    compression::{Decompressor, DefaultDecompressor},
    error::{Error, FileNotFoundError, Result},
    read::{corrupt, index_entries, ArchiveEntry, ArchiveFile},
};

/// Signature of a Unity web container payload
pub const SIGNATURE_WEB_DATA: &[u8] = b"UnityWebData1.0";

/// Signature written by the Tuanjie engine fork
pub const SIGNATURE_TUANJIE_WEB_DATA: &[u8] = b"TuanjieWebData1.0";

/// Gzip member magic
pub const GZIP_MAGIC: [u8; 2] = [0x1F, 0x8B];

/// Offset of the brotli marker written into the comment of web payloads
pub const BROTLI_MAGIC_OFFSET: usize = 0x20;

/// Brotli marker found at [`BROTLI_MAGIC_OFFSET`]
pub const BROTLI_MAGIC: &[u8] = b"brotli";

/// Storage format of a web container
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum WebCompression {
    /// Stored as is
    None,
    /// Gzip stream
    Gzip,
    /// Brotli stream
    Brotli,
}

impl WebCompression {
    /// Detect the storage format from the leading bytes
    pub fn detect(bytes: &[u8]) -> Self {
        if bytes.starts_with(&GZIP_MAGIC) {
            WebCompression::Gzip
        } else if bytes
            .get(BROTLI_MAGIC_OFFSET..BROTLI_MAGIC_OFFSET + BROTLI_MAGIC.len())
            .is_some_and(|magic| magic == BROTLI_MAGIC)
        {
            WebCompression::Brotli
        } else {
            WebCompression::None
        }
    }
}

/// Whether the decompressed payload starts with a web data signature
pub fn is_web_data(payload: &[u8]) -> bool {
    payload.starts_with(SIGNATURE_WEB_DATA) || payload.starts_with(SIGNATURE_TUANJIE_WEB_DATA)
}

/// WebGL data container reader
#[derive(Debug)]
pub struct WebArchive {
    compression: WebCompression,
    signature: String,
    files: IndexMap<Box<str>, ArchiveEntry>,
    data: Vec<u8>,
}

impl WebArchive {
    /// Read a web container collecting the files it contains.
    pub fn new(mut reader: impl Read) -> Result<WebArchive> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        Self::from_bytes(&bytes)
    }

    /// Parse a web container held in memory
    pub fn from_bytes(bytes: &[u8]) -> Result<WebArchive> {
        Self::from_bytes_with(bytes, &DefaultDecompressor)
    }

    /// Parse a web container held in memory with a custom [`Decompressor`]
    #[instrument(skip_all, fields(size = bytes.len()), err)]
    pub fn from_bytes_with(bytes: &[u8], decompressor: &dyn Decompressor) -> Result<WebArchive> {
        let compression = WebCompression::detect(bytes);
        let data = match compression {
            WebCompression::Gzip => decompressor.gzip(bytes)?,
            WebCompression::Brotli => decompressor.brotli(bytes)?,
            WebCompression::None => bytes.to_vec(),
        };
        debug!(?compression, size = data.len(), "read web container payload");

        if !is_web_data(&data) {
            return Err(Error::UnrecognizedFormat(
                String::from_utf8_lossy(&data[..data.len().min(17)]).into(),
            ));
        }

        let mut reader = Cursor::new(data.as_slice());
        let signature = NullString::read_le(&mut reader).map_err(corrupt)?.to_string();
        let header_length = reader.read_i32::<LittleEndian>().map_err(corrupt)?;
        let header_length = usize::try_from(header_length)
            .ok()
            .filter(|length| *length <= data.len())
            .ok_or_else(|| {
                Error::CorruptStructure(format!(
                    "header length {header_length} exceeds {} bytes",
                    data.len()
                ))
            })?;

        let mut entries = Vec::new();
        while (reader.position() as usize) < header_length {
            let offset = reader.read_i32::<LittleEndian>().map_err(corrupt)?;
            let length = reader.read_i32::<LittleEndian>().map_err(corrupt)?;
            let path_length = reader.read_i32::<LittleEndian>().map_err(corrupt)?;

            let remaining = data.len().saturating_sub(reader.position() as usize);
            let path_length = usize::try_from(path_length)
                .ok()
                .filter(|length| *length <= remaining)
                .ok_or_else(|| {
                    Error::CorruptStructure(format!("path length {path_length} is invalid"))
                })?;
            let mut path = vec![0u8; path_length];
            reader.read_exact(&mut path)?;

            let offset = u64::try_from(offset).map_err(corrupt)?;
            let length = u64::try_from(length).map_err(corrupt)?;
            trace!(offset, length, "web record");
            entries.push(ArchiveEntry::new(path, offset, length, 0));
        }

        let files = index_entries(entries, data.len())?;
        debug!(entries = files.len(), "read web container");

        Ok(WebArchive {
            compression,
            signature,
            files,
            data,
        })
    }

    /// Storage format the container was read from
    pub fn compression(&self) -> WebCompression {
        self.compression
    }

    /// Payload signature text
    pub fn signature(&self) -> &str {
        &self.signature
    }

    /// Number of entries contained in this container.
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Whether this container holds no entries
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns an iterator over all the file names in this container.
    pub fn file_names(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(|s| s.as_ref())
    }

    /// Get the index of a file entry by name, if it's present.
    pub fn index_for_name(&self, name: &str) -> Option<usize> {
        self.files.get_index_of(name)
    }

    /// Search for a file entry by name
    pub fn by_name(&self, name: &str) -> Result<ArchiveFile<'_>> {
        let index = self
            .index_for_name(name)
            .ok_or_else(|| Error::FileNotFound(FileNotFoundError::Name(name.to_owned())))?;
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
}
