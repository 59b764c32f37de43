//! Block compression and decompression handling.

use std::io::{Cursor, Read};

use flate2::read::MultiGzDecoder;
use lzma_rs::decompress::{Options, UnpackedSize};
use tracing::instrument;

use crate::error::{Error, Result};

/// Mask selecting the compression id in archive and block flags
pub const COMPRESSION_MASK: u32 = 0x3F;

/// Identifies the storage format used to compress a block or the directory of a bundle
///
/// The value is stored in the low 6 bits of the archive flags (for the directory) and of each
/// block's flags.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
#[repr(u32)]
pub enum CompressionMethod {
    /// Stores the data as it is
    #[default]
    None = 0,

    /// Raw LZMA stream prefixed by its 5 property bytes
    Lzma = 1,

    /// LZ4 block
    Lz4 = 2,

    /// LZ4 block written by the high compression encoder, decoded like [`CompressionMethod::Lz4`]
    Lz4Hc = 3,

    /// LZHAM, recognized but not supported
    Lzham = 4,
}

impl CompressionMethod {
    /// Select the compression method from a flags field
    pub fn from_flags(flags: u32) -> Result<Self> {
        Self::try_from(flags & COMPRESSION_MASK)
    }
}

impl std::fmt::Display for CompressionMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            CompressionMethod::None => "none",
            CompressionMethod::Lzma => "lzma",
            CompressionMethod::Lz4 => "lz4",
            CompressionMethod::Lz4Hc => "lz4hc",
            CompressionMethod::Lzham => "lzham",
        };
        f.write_str(name)
    }
}

impl TryFrom<u32> for CompressionMethod {
    type Error = Error;

    fn try_from(value: u32) -> Result<Self> {
        match value {
            0 => Ok(CompressionMethod::None),
            1 => Ok(CompressionMethod::Lzma),
            2 => Ok(CompressionMethod::Lz4),
            3 => Ok(CompressionMethod::Lz4Hc),
            4 => Ok(CompressionMethod::Lzham),
            other => Err(Error::UnsupportedCompression(format!("id {other}"))),
        }
    }
}

/// Decompression routines used while unpacking containers
///
/// Every method has a default implementation backed by the crates this library depends on, so a
/// custom decompressor only has to override the codecs it wants to replace.
pub trait Decompressor {
    /// Raw LZMA stream: 5 property bytes followed by the compressed data, size known up front
    fn lzma(&self, input: &[u8], uncompressed_size: usize) -> Result<Vec<u8>> {
        decompress_lzma(input, Some(uncompressed_size))
    }

    /// LZMA "alone" stream: 5 property bytes, a little endian `u64` size, then the data
    fn lzma_alone(&self, input: &[u8]) -> Result<Vec<u8>> {
        decompress_lzma(input, None)
    }

    /// LZ4 block without a frame
    fn lz4(&self, input: &[u8], uncompressed_size: usize) -> Result<Vec<u8>> {
        lz4_flex::block::decompress(input, uncompressed_size).map_err(|e| {
            Error::Decompression {
                method: "lz4".into(),
                reason: e.to_string(),
            }
        })
    }

    /// Brotli stream
    fn brotli(&self, input: &[u8]) -> Result<Vec<u8>> {
        let mut output = Vec::new();
        brotli::Decompressor::new(input, 4096)
            .read_to_end(&mut output)
            .map_err(|e| Error::Decompression {
                method: "brotli".into(),
                reason: e.to_string(),
            })?;
        Ok(output)
    }

    /// Gzip stream, possibly made of several members
    fn gzip(&self, input: &[u8]) -> Result<Vec<u8>> {
        let mut output = Vec::new();
        MultiGzDecoder::new(input)
            .read_to_end(&mut output)
            .map_err(|e| Error::Decompression {
                method: "gzip".into(),
                reason: e.to_string(),
            })?;
        Ok(output)
    }
}

/// The decompressor used when none is supplied
#[derive(Debug, Default, Copy, Clone)]
pub struct DefaultDecompressor;

impl Decompressor for DefaultDecompressor {}

fn decompress_lzma(input: &[u8], uncompressed_size: Option<usize>) -> Result<Vec<u8>> {
    let options = Options {
        unpacked_size: match uncompressed_size {
            Some(size) => UnpackedSize::UseProvided(Some(size as u64)),
            None => UnpackedSize::ReadFromHeader,
        },
        ..Default::default()
    };

    let mut output = Vec::with_capacity(uncompressed_size.unwrap_or_default());
    lzma_rs::lzma_decompress_with_options(&mut Cursor::new(input), &mut output, &options).map_err(
        |e| Error::Decompression {
            method: "lzma".into(),
            reason: e.to_string(),
        },
    )?;
    Ok(output)
}

/// Decompress a directory or block with the method named in its flags
///
/// The output must be exactly `uncompressed_size` bytes long.
#[instrument(skip(decompressor, input), fields(input = input.len()), err)]
pub fn decompress_block(
    decompressor: &dyn Decompressor,
    method: CompressionMethod,
    input: &[u8],
    uncompressed_size: usize,
) -> Result<Vec<u8>> {
    let output = match method {
        CompressionMethod::None => input.to_vec(),
        CompressionMethod::Lzma => decompressor.lzma(input, uncompressed_size)?,
        CompressionMethod::Lz4 | CompressionMethod::Lz4Hc => {
            decompressor.lz4(input, uncompressed_size)?
        }
        CompressionMethod::Lzham => {
            return Err(Error::UnsupportedCompression("lzham".into()));
        }
    };

    if output.len() != uncompressed_size {
        return Err(Error::CorruptStructure(format!(
            "{method:?} block decompressed to {} bytes, expected {uncompressed_size}",
            output.len()
        )));
    }

    Ok(output)
}

/// Compress a block for writing
///
/// Only the methods the writer can produce are accepted.
#[instrument(skip(input), fields(input = input.len()), err)]
pub fn compress_block(method: CompressionMethod, input: &[u8]) -> Result<Vec<u8>> {
    match method {
        CompressionMethod::None => Ok(input.to_vec()),
        CompressionMethod::Lz4 | CompressionMethod::Lz4Hc => {
            Ok(lz4_flex::block::compress(input))
        }
        other => Err(Error::UnsupportedCompression(format!(
            "{other:?} is not supported for writing"
        ))),
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use crate::compression::{
        compress_block, decompress_block, CompressionMethod, DefaultDecompressor,
    };
    use crate::error::{Error, Result};

    #[test]
    fn method_from_flags_uses_low_bits() -> Result<()> {
        assert_eq!(CompressionMethod::from_flags(0x43)?, CompressionMethod::Lz4Hc);
        assert_eq!(CompressionMethod::from_flags(0x80)?, CompressionMethod::None);
        assert!(matches!(
            CompressionMethod::from_flags(0x05),
            Err(Error::UnsupportedCompression(_))
        ));
        Ok(())
    }

    #[test]
    fn lz4_round_trip() -> Result<()> {
        let input = b"Hello World Hello World Hello World".repeat(8);
        let compressed = compress_block(CompressionMethod::Lz4, &input)?;
        assert!(compressed.len() < input.len());

        let output = decompress_block(
            &DefaultDecompressor,
            CompressionMethod::Lz4,
            &compressed,
            input.len(),
        )?;
        assert_eq!(output, input);
        Ok(())
    }

    #[test]
    fn size_mismatch_is_corrupt() {
        let result = decompress_block(
            &DefaultDecompressor,
            CompressionMethod::None,
            b"abc",
            4,
        );
        assert!(matches!(result, Err(Error::CorruptStructure(_))));
    }

    #[test]
    fn lzham_is_unsupported() {
        let result = decompress_block(&DefaultDecompressor, CompressionMethod::Lzham, b"", 0);
        assert!(matches!(result, Err(Error::UnsupportedCompression(_))));
    }

    #[test]
    fn lzma_cannot_be_written() {
        assert!(compress_block(CompressionMethod::Lzma, b"data").is_err());
    }
}
