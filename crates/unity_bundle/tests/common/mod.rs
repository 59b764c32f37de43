#![allow(dead_code)]

use byteorder::{BigEndian, WriteBytesExt};
use std::io::Write;

/// A stored block: payload as written, uncompressed size and block flags
pub struct TestBlock {
    pub stored: Vec<u8>,
    pub uncompressed_size: u32,
    pub flags: u16,
}

impl TestBlock {
    pub fn plain(data: &[u8]) -> Self {
        Self {
            stored: data.to_vec(),
            uncompressed_size: data.len() as u32,
            flags: 0,
        }
    }

    pub fn lz4(data: &[u8]) -> Self {
        Self {
            stored: lz4_flex::block::compress(data),
            uncompressed_size: data.len() as u32,
            flags: 2,
        }
    }
}

pub fn header(signature: &[u8], format_version: u32, engine: &str) -> Vec<u8> {
    let mut out = Vec::new();
    out.write_all(signature).unwrap();
    out.write_u8(0).unwrap();
    out.write_u32::<BigEndian>(format_version).unwrap();
    out.write_all(b"5.x.x\0").unwrap();
    out.write_all(engine.as_bytes()).unwrap();
    out.write_u8(0).unwrap();
    out
}

pub fn directory(blocks: &[TestBlock], entries: &[(i64, i64, u32, &str)]) -> Vec<u8> {
    let mut out = vec![0u8; 16];
    out.write_i32::<BigEndian>(blocks.len() as i32).unwrap();
    for block in blocks {
        out.write_u32::<BigEndian>(block.uncompressed_size).unwrap();
        out.write_u32::<BigEndian>(block.stored.len() as u32).unwrap();
        out.write_u16::<BigEndian>(block.flags).unwrap();
    }
    out.write_i32::<BigEndian>(entries.len() as i32).unwrap();
    for (offset, size, flags, name) in entries {
        out.write_i64::<BigEndian>(*offset).unwrap();
        out.write_i64::<BigEndian>(*size).unwrap();
        out.write_u32::<BigEndian>(*flags).unwrap();
        out.write_all(name.as_bytes()).unwrap();
        out.write_u8(0).unwrap();
    }
    out
}

/// Assemble a format 6 `UnityFS` bundle
///
/// `flags` supplies the archive flags, the directory is LZ4 compressed when its low bits say so.
pub fn unity_fs(flags: u32, blocks: &[TestBlock], entries: &[(i64, i64, u32, &str)]) -> Vec<u8> {
    let directory = directory(blocks, entries);
    let stored_directory = match flags & 0x3F {
        2 | 3 => lz4_flex::block::compress(&directory),
        _ => directory.clone(),
    };

    let mut out = header(b"UnityFS", 6, "2019.4.0f1");
    let block_bytes: Vec<u8> = blocks.iter().flat_map(|b| b.stored.clone()).collect();
    let total = out.len() + 20 + stored_directory.len() + block_bytes.len();
    out.write_i64::<BigEndian>(total as i64).unwrap();
    out.write_u32::<BigEndian>(stored_directory.len() as u32).unwrap();
    out.write_u32::<BigEndian>(directory.len() as u32).unwrap();
    out.write_u32::<BigEndian>(flags).unwrap();

    if flags & 0x80 != 0 {
        out.extend(block_bytes);
        out.extend(stored_directory);
    } else {
        out.extend(stored_directory);
        out.extend(block_bytes);
    }
    out
}

/// Assemble a format 3 `UnityRaw` bundle holding the given files
pub fn unity_raw(files: &[(&str, &[u8])]) -> Vec<u8> {
    let mut table = Vec::new();
    table.write_i32::<BigEndian>(files.len() as i32).unwrap();
    let table_size: usize = 4 + files.iter().map(|(name, _)| name.len() + 9).sum::<usize>();

    let mut data = Vec::new();
    for (name, bytes) in files {
        table.write_all(name.as_bytes()).unwrap();
        table.write_u8(0).unwrap();
        table.write_u32::<BigEndian>((table_size + data.len()) as u32).unwrap();
        table.write_u32::<BigEndian>(bytes.len() as u32).unwrap();
        data.extend_from_slice(bytes);
    }
    let payload = [table, data].concat();

    let mut out = header(b"UnityRaw", 3, "3.5.7f6");
    // minimum streamed bytes, header size, levels before streaming, level count, one level,
    // complete file size, file info header size
    let header_size = out.len() + 4 * 8;
    out.write_u32::<BigEndian>(payload.len() as u32).unwrap();
    out.write_u32::<BigEndian>(header_size as u32).unwrap();
    out.write_u32::<BigEndian>(1).unwrap();
    out.write_u32::<BigEndian>(1).unwrap();
    out.write_u32::<BigEndian>(payload.len() as u32).unwrap();
    out.write_u32::<BigEndian>(payload.len() as u32).unwrap();
    out.write_u32::<BigEndian>((header_size + payload.len()) as u32).unwrap();
    out.write_u32::<BigEndian>(0).unwrap();
    out.extend(payload);
    out
}
