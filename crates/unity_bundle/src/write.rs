//! Types for writing UnityFS bundles
//!

use binrw::{BinWrite, NullString};
use bon::Builder;
use byteorder::{BigEndian, WriteBytesExt};
use std::fmt::Debug;
use std::io::{self, Cursor, Write};
use tracing::{debug, instrument, Level};

use crate::compression::{compress_block, CompressionMethod};
use crate::error::{Error, Result};
use crate::types::{BlockInfo, BundleHeader, DirectoryNode, FsHeader};

/// Default size of the uncompressed data held by one block
pub const DEFAULT_BLOCK_SIZE: usize = 128 * 1024;

/// Options for how the bundle should be written
#[derive(Debug, Clone, Builder)]
pub struct BundleWriterOptions {
    /// Container format revision, 6 or 7
    #[builder(default = 6)]
    pub format_version: u32,

    /// The compression method to use for the data blocks
    #[builder(default)]
    pub block_compression: CompressionMethod,

    /// The compression method to use for the directory record
    #[builder(default)]
    pub directory_compression: CompressionMethod,

    /// Uncompressed size of each data block
    #[builder(default = DEFAULT_BLOCK_SIZE)]
    pub block_size: usize,

    /// Minimum player version written to the header
    #[builder(default = String::from("5.x.x"), into)]
    pub player_version: String,

    /// Engine version written to the header
    #[builder(default = String::from("2019.4.0f1"), into)]
    pub engine_version: String,
}

impl Default for BundleWriterOptions {
    fn default() -> Self {
        Self::builder().build()
    }
}

struct PendingFile {
    name: String,
    flags: u32,
    offset: u64,
}

/// UnityFS bundle generator
///
/// ```
/// # fn doit() -> unity_bundle::error::Result<()>
/// # {
/// # use unity_bundle::BundleWriter;
/// use std::io::Write;
/// use unity_bundle::write::BundleWriterOptions;
///
/// let mut bundle = BundleWriter::new(Vec::new(), BundleWriterOptions::builder()
///            .block_compression(unity_bundle::CompressionMethod::Lz4)
///            .build());
///
/// bundle.start_file("CAB-hello", unity_bundle::types::DirectoryNode::SERIALIZED_FILE)?;
/// bundle.write_all(b"Hello, World!")?;
///
/// let bytes = bundle.finish()?;
/// assert!(bytes.starts_with(b"UnityFS\0"));
///
/// # Ok(())
/// # }
/// # doit().unwrap();
/// ```
pub struct BundleWriter<W: Write> {
    inner: W,
    options: BundleWriterOptions,
    data: Vec<u8>,
    current: Option<PendingFile>,
    nodes: Vec<DirectoryNode>,
}

impl<W: Write> BundleWriter<W> {
    /// Initializes the bundle.
    ///
    /// Before writing to this object, the [`BundleWriter::start_file`] function should be called.
    pub fn new(inner: W, options: BundleWriterOptions) -> BundleWriter<W> {
        BundleWriter {
            inner,
            options,
            data: Vec::new(),
            current: None,
            nodes: Vec::new(),
        }
    }

    /// Returns true if a file is currently open for writing.
    pub const fn is_writing_file(&self) -> bool {
        self.current.is_some()
    }

    /// Start a new entry with the given directory flags
    #[instrument(skip(self, name), err)]
    pub fn start_file(&mut self, name: impl ToString, flags: u32) -> Result<()> {
        self.finish_file();

        self.current = Some(PendingFile {
            name: name.to_string(),
            flags,
            offset: self.data.len() as u64,
        });

        Ok(())
    }

    fn finish_file(&mut self) {
        if let Some(file) = self.current.take() {
            let size = self.data.len() as u64 - file.offset;
            self.nodes.push(DirectoryNode {
                offset: file.offset as i64,
                size: size as i64,
                flags: file.flags,
                path: NullString::from(file.name),
            });
        }
    }

    /// Finish the last file and write the header, directory and blocks
    ///
    /// This will return the writer, but one should normally not append any data to the end of the file.
    #[instrument(skip(self), err)]
    pub fn finish(mut self) -> Result<W> {
        self.finish_file();

        let options = &self.options;
        if !(6..=7).contains(&options.format_version) {
            return Err(Error::UnsupportedVersion {
                signature: "UnityFS".into(),
                version: options.format_version,
            });
        }
        if options.block_size == 0 {
            return Err(Error::CustomError("block size must not be zero".into()));
        }

        let mut blocks = Vec::new();
        let mut block_data = Vec::new();
        for chunk in self.data.chunks(options.block_size) {
            let compressed = compress_block(options.block_compression, chunk)?;
            blocks.push(BlockInfo {
                uncompressed_size: chunk.len() as u32,
                compressed_size: compressed.len() as u32,
                flags: options.block_compression as u16,
            });
            block_data.extend(compressed);
        }

        let mut directory = Cursor::new(Vec::new());
        directory.write_all(&[0u8; 16])?;
        directory.write_i32::<BigEndian>(blocks.len() as i32)?;
        for block in &blocks {
            block.write(&mut directory)?;
        }
        directory.write_i32::<BigEndian>(self.nodes.len() as i32)?;
        for node in &self.nodes {
            node.write(&mut directory)?;
        }
        let directory = directory.into_inner();
        let stored_directory = compress_block(options.directory_compression, &directory)?;

        let header = BundleHeader {
            signature: NullString::from("UnityFS"),
            format_version: options.format_version,
            player_version: NullString::from(options.player_version.as_str()),
            engine_version: NullString::from(options.engine_version.as_str()),
        };

        let mut head = Cursor::new(Vec::new());
        header.write(&mut head)?;
        let fs_position = head.position();
        FsHeader::default().write(&mut head)?;
        if options.format_version >= 7 {
            let padding = head.position().next_multiple_of(16) - head.position();
            head.write_all(&vec![0u8; padding as usize])?;
        }

        let total = head.position() + stored_directory.len() as u64 + block_data.len() as u64;
        let fs = FsHeader {
            size: total as i64,
            directory_compressed: stored_directory.len() as u32,
            directory_uncompressed: directory.len() as u32,
            flags: options.directory_compression as u32,
        };
        head.set_position(fs_position);
        fs.write(&mut head)?;

        debug!(
            entries = self.nodes.len(),
            blocks = blocks.len(),
            size = total,
            "writing bundle"
        );

        self.inner.write_all(head.get_ref())?;
        self.inner.write_all(&stored_directory)?;
        self.inner.write_all(&block_data)?;

        Ok(self.inner)
    }
}

impl<W: Write> Write for BundleWriter<W> {
    #[instrument(skip_all, err, ret(level = Level::TRACE), fields(size=buf.len()) )]
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.current.is_none() {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                "No file has been started",
            ));
        }
        self.data.extend_from_slice(buf);
        Ok(buf.len())
    }

    #[instrument(skip(self), err)]
    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
