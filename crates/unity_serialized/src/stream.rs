//! Byte cursors with a byte order chosen at runtime
//!
//! Serialized files declare their byte order in the header, so the metadata and object data can
//! not be described with a fixed endian `binrw` derive. [`EndianReader`] and [`EndianWriter`] read
//! and write fixed width values in the selected order and align relative to an origin, which is
//! the start of the metadata or of the object being decoded.

use binrw::Endian;
use byteorder::{BigEndian, ByteOrder, LittleEndian};
use std::fmt;

use crate::error::Error;

/// A read ran past the end of the available bytes
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Underrun {
    /// Position relative to the origin
    pub position: u64,
    /// Bytes the read required
    pub needed: usize,
}

impl fmt::Display for Underrun {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unexpected end of data at {}, {} bytes needed",
            self.position, self.needed
        )
    }
}

impl From<Underrun> for Error {
    fn from(value: Underrun) -> Self {
        Error::CorruptStructure(value.to_string())
    }
}

/// Result of a cursor read
pub type ReadResult<T> = core::result::Result<T, Underrun>;

macro_rules! read_number {
    ($(#[$meta:meta])* $name:ident, $ty:ty, $read:ident) => {
        $(#[$meta])*
        pub fn $name(&mut self) -> ReadResult<$ty> {
            let bytes = self.read_bytes(std::mem::size_of::<$ty>())?;
            Ok(match self.endian {
                Endian::Big => BigEndian::$read(bytes),
                Endian::Little => LittleEndian::$read(bytes),
            })
        }
    };
}

macro_rules! write_number {
    ($(#[$meta:meta])* $name:ident, $ty:ty, $write:ident) => {
        $(#[$meta])*
        pub fn $name(&mut self, value: $ty) {
            let mut bytes = [0u8; std::mem::size_of::<$ty>()];
            match self.endian {
                Endian::Big => BigEndian::$write(&mut bytes, value),
                Endian::Little => LittleEndian::$write(&mut bytes, value),
            }
            self.buffer.extend_from_slice(&bytes);
        }
    };
}

/// Cursor over a byte slice
#[derive(Debug, Clone)]
pub struct EndianReader<'a> {
    data: &'a [u8],
    position: usize,
    origin: usize,
    endian: Endian,
}

impl<'a> EndianReader<'a> {
    /// Create a reader positioned at the start of `data`
    pub fn new(data: &'a [u8], endian: Endian) -> Self {
        Self {
            data,
            position: 0,
            origin: 0,
            endian,
        }
    }

    /// Byte order used for multi-byte values
    pub fn endian(&self) -> Endian {
        self.endian
    }

    /// Switch the byte order for the following reads
    pub fn set_endian(&mut self, endian: Endian) {
        self.endian = endian;
    }

    /// Absolute position in the underlying slice
    pub fn position(&self) -> usize {
        self.position
    }

    /// Move to an absolute position
    pub fn set_position(&mut self, position: usize) {
        self.position = position;
    }

    /// Position relative to the alignment origin
    pub fn relative_position(&self) -> u64 {
        self.position.saturating_sub(self.origin) as u64
    }

    /// Make the current position the origin for [`EndianReader::align`]
    pub fn set_origin_here(&mut self) {
        self.origin = self.position;
    }

    /// Bytes left after the current position
    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.position)
    }

    /// The slice the reader walks over
    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    /// Skip forward to the next multiple of `alignment` counted from the origin
    pub fn align(&mut self, alignment: usize) {
        let relative = self.position - self.origin.min(self.position);
        self.position = self.origin + relative.next_multiple_of(alignment);
    }

    /// Take the next `length` bytes
    pub fn read_bytes(&mut self, length: usize) -> ReadResult<&'a [u8]> {
        let end = self.position.checked_add(length);
        match end.and_then(|end| self.data.get(self.position..end)) {
            Some(bytes) => {
                self.position += length;
                Ok(bytes)
            }
            None => Err(Underrun {
                position: self.relative_position(),
                needed: length,
            }),
        }
    }

    /// Take a fixed size array
    pub fn read_array<const N: usize>(&mut self) -> ReadResult<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_bytes(N)?);
        Ok(out)
    }

    /// Read a single byte
    pub fn read_u8(&mut self) -> ReadResult<u8> {
        Ok(self.read_bytes(1)?[0])
    }

    /// Read a single signed byte
    pub fn read_i8(&mut self) -> ReadResult<i8> {
        Ok(self.read_u8()? as i8)
    }

    /// Read a byte as a boolean, any non zero value is true
    pub fn read_bool(&mut self) -> ReadResult<bool> {
        Ok(self.read_u8()? != 0)
    }

    read_number!(read_u16, u16, read_u16);
    read_number!(read_i16, i16, read_i16);
    read_number!(read_u32, u32, read_u32);
    read_number!(read_i32, i32, read_i32);
    read_number!(read_u64, u64, read_u64);
    read_number!(read_i64, i64, read_i64);
    read_number!(read_f32, f32, read_f32);
    read_number!(read_f64, f64, read_f64);

    /// Read bytes up to a null terminator, the terminator is consumed
    pub fn read_cstring(&mut self) -> ReadResult<&'a [u8]> {
        let rest = self.data.get(self.position..).unwrap_or_default();
        match rest.iter().position(|b| *b == 0) {
            Some(length) => {
                self.position += length + 1;
                Ok(&rest[..length])
            }
            None => Err(Underrun {
                position: self.relative_position(),
                needed: rest.len() + 1,
            }),
        }
    }

    /// Read a null terminated string, replacing invalid UTF-8
    pub fn read_cstring_lossy(&mut self) -> ReadResult<String> {
        Ok(String::from_utf8_lossy(self.read_cstring()?).into_owned())
    }

    /// Read a `u32` length prefixed string followed by alignment to 4 bytes
    pub fn read_aligned_string(&mut self) -> ReadResult<String> {
        let length = self.read_u32()? as usize;
        let bytes = self.read_bytes(length)?;
        self.align(4);
        Ok(String::from_utf8_lossy(bytes).into_owned())
    }
}

/// Growable output buffer
#[derive(Debug, Clone)]
pub struct EndianWriter {
    buffer: Vec<u8>,
    origin: usize,
    endian: Endian,
}

impl EndianWriter {
    /// Create an empty writer
    pub fn new(endian: Endian) -> Self {
        Self {
            buffer: Vec::new(),
            origin: 0,
            endian,
        }
    }

    /// Byte order used for multi-byte values
    pub fn endian(&self) -> Endian {
        self.endian
    }

    /// Switch the byte order for the following writes
    pub fn set_endian(&mut self, endian: Endian) {
        self.endian = endian;
    }

    /// Number of bytes written so far
    pub fn position(&self) -> usize {
        self.buffer.len()
    }

    /// Make the current position the origin for [`EndianWriter::align`]
    pub fn set_origin_here(&mut self) {
        self.origin = self.buffer.len();
    }

    /// Pad with zeros to the next multiple of `alignment` counted from the origin
    pub fn align(&mut self, alignment: usize) {
        let relative = self.buffer.len() - self.origin;
        self.buffer
            .resize(self.origin + relative.next_multiple_of(alignment), 0);
    }

    /// Written bytes
    pub fn as_slice(&self) -> &[u8] {
        &self.buffer
    }

    /// Mutable access to the written bytes, for patching sizes
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.buffer
    }

    /// Consume the writer returning the written bytes
    pub fn into_inner(self) -> Vec<u8> {
        self.buffer
    }

    /// Append raw bytes
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Write a single byte
    pub fn write_u8(&mut self, value: u8) {
        self.buffer.push(value);
    }

    /// Write a single signed byte
    pub fn write_i8(&mut self, value: i8) {
        self.buffer.push(value as u8);
    }

    /// Write a boolean as one byte
    pub fn write_bool(&mut self, value: bool) {
        self.buffer.push(value as u8);
    }

    write_number!(write_u16, u16, write_u16);
    write_number!(write_i16, i16, write_i16);
    write_number!(write_u32, u32, write_u32);
    write_number!(write_i32, i32, write_i32);
    write_number!(write_u64, u64, write_u64);
    write_number!(write_i64, i64, write_i64);
    write_number!(write_f32, f32, write_f32);
    write_number!(write_f64, f64, write_f64);

    /// Write bytes followed by a null terminator
    pub fn write_cstring(&mut self, value: &[u8]) {
        self.buffer.extend_from_slice(value);
        self.buffer.push(0);
    }

    /// Write a `u32` length prefixed string followed by alignment to 4 bytes
    pub fn write_aligned_string(&mut self, value: &str) {
        self.write_u32(value.len() as u32);
        self.write_bytes(value.as_bytes());
        self.align(4);
    }
}
