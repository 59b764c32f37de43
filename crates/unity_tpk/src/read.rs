use binrw::{BinRead, Endian};
use std::io::Cursor;
use tracing::{debug, instrument, trace};
use unity_bundle::compression::Decompressor;
use unity_serialized::stream::EndianReader;
use unity_version::EngineVersion;

use crate::error::{Error, Result};
use crate::types::{
    ClassHistory, TpkClass, TpkCompression, TpkHeader, TpkNode, TypeTreeBlob,
    CLASS_HAS_EDITOR_ROOT, CLASS_HAS_RELEASE_ROOT, DATA_TYPE_TYPE_TREE, TPK_VERSION,
};

/// Size of [`TpkHeader`] as stored
pub const HEADER_SIZE: usize = 20;

fn checked_count(reader: &mut EndianReader, element_size: usize, what: &str) -> Result<usize> {
    let count = reader.read_i32()?;
    usize::try_from(count)
        .ok()
        .filter(|count| count.saturating_mul(element_size) <= reader.remaining())
        .ok_or_else(|| {
            Error::CorruptStructure(format!(
                "{what} count {count} does not fit in {} bytes",
                reader.remaining()
            ))
        })
}

/// Read a string prefixed by its length in 7 bit groups, low group first
fn read_prefixed_string(reader: &mut EndianReader) -> Result<String> {
    let mut length = 0usize;
    for shift in (0..35).step_by(7) {
        let byte = reader.read_u8()?;
        length |= ((byte & 0x7F) as usize) << shift;
        if byte & 0x80 == 0 {
            let bytes = reader.read_bytes(length)?;
            return String::from_utf8(bytes.to_vec())
                .map_err(|e| Error::CorruptStructure(e.to_string()));
        }
    }
    Err(Error::CorruptStructure("string length prefix is too long".into()))
}

fn read_class(reader: &mut EndianReader) -> Result<TpkClass> {
    let name = reader.read_u16()?;
    let base = reader.read_u16()?;
    let flags = reader.read_u8()?;
    let editor_root = if flags & CLASS_HAS_EDITOR_ROOT != 0 {
        Some(reader.read_u16()?)
    } else {
        None
    };
    let release_root = if flags & CLASS_HAS_RELEASE_ROOT != 0 {
        Some(reader.read_u16()?)
    } else {
        None
    };
    Ok(TpkClass {
        name,
        base,
        flags,
        editor_root,
        release_root,
    })
}

fn read_node(reader: &mut EndianReader) -> Result<TpkNode> {
    let type_name = reader.read_u16()?;
    let name = reader.read_u16()?;
    let byte_size = reader.read_i32()?;
    let version = reader.read_i16()?;
    let type_flags = reader.read_u8()?;
    let meta_flag = reader.read_u32()?;
    let count = reader.read_u16()? as usize;
    let children = (0..count)
        .map(|_| reader.read_u16())
        .collect::<core::result::Result<_, _>>()?;
    Ok(TpkNode {
        type_name,
        name,
        byte_size,
        version,
        type_flags,
        meta_flag,
        children,
    })
}

fn ascending<T>(entries: &[(EngineVersion, T)]) -> bool {
    entries.windows(2).all(|pair| pair[0].0 <= pair[1].0)
}

/// Parse a decompressed type tree payload
pub fn read_blob(data: &[u8]) -> Result<TypeTreeBlob> {
    let mut reader = EndianReader::new(data, Endian::Little);
    let creation_time = reader.read_i64()?;

    let count = checked_count(&mut reader, 8, "version")?;
    let versions = (0..count)
        .map(|_| reader.read_u64().map(EngineVersion::from_packed))
        .collect::<core::result::Result<Vec<_>, _>>()?;

    let count = checked_count(&mut reader, 8, "class")?;
    let mut classes = Vec::with_capacity(count);
    for _ in 0..count {
        let class_id = reader.read_i32()?;
        let entry_count = checked_count(&mut reader, 9, "class version")?;
        let mut entries = Vec::with_capacity(entry_count);
        for _ in 0..entry_count {
            let version = EngineVersion::from_packed(reader.read_u64()?);
            let class = if reader.read_bool()? {
                Some(read_class(&mut reader)?)
            } else {
                None
            };
            entries.push((version, class));
        }
        if !ascending(&entries) {
            return Err(Error::CorruptStructure(format!(
                "versions of class {class_id} are not ascending"
            )));
        }
        trace!(class_id, entries = entries.len(), "class");
        classes.push(ClassHistory { class_id, entries });
    }

    let count = checked_count(&mut reader, 9, "common string version")?;
    let mut common_string_counts = Vec::with_capacity(count);
    for _ in 0..count {
        let version = EngineVersion::from_packed(reader.read_u64()?);
        common_string_counts.push((version, reader.read_u8()?));
    }
    if !ascending(&common_string_counts) {
        return Err(Error::CorruptStructure(
            "common string versions are not ascending".into(),
        ));
    }
    let count = checked_count(&mut reader, 2, "common string")?;
    let common_string_indices = (0..count)
        .map(|_| reader.read_u16())
        .collect::<core::result::Result<Vec<_>, _>>()?;

    let count = checked_count(&mut reader, 17, "node")?;
    let nodes = (0..count)
        .map(|_| read_node(&mut reader))
        .collect::<Result<Vec<_>>>()?;

    let count = checked_count(&mut reader, 1, "string")?;
    let strings = (0..count)
        .map(|_| read_prefixed_string(&mut reader))
        .collect::<Result<Vec<_>>>()?;

    Ok(TypeTreeBlob {
        creation_time,
        versions,
        classes,
        common_string_counts,
        common_string_indices,
        nodes,
        strings,
    })
}

/// Check the header and decompress the payload
#[instrument(skip_all, fields(size = data.len()), err)]
pub fn read_payload(data: &[u8], decompressor: &dyn Decompressor) -> Result<Vec<u8>> {
    let header = TpkHeader::read(&mut Cursor::new(data)).map_err(|e| match e {
        binrw::Error::BadMagic { .. } => Error::UnrecognizedFormat(format!(
            "{:02x?}",
            &data[..data.len().min(4)]
        )),
        _ => Error::CorruptStructure(format!("{} bytes are too short for a header", data.len())),
    })?;

    if header.version != TPK_VERSION {
        return Err(Error::UnsupportedVersion(header.version));
    }
    if header.data_type != DATA_TYPE_TYPE_TREE {
        return Err(Error::UnsupportedDataType(header.data_type));
    }
    let compression = TpkCompression::try_from(header.compression)?;

    let stored = data
        .get(HEADER_SIZE..HEADER_SIZE + header.compressed_size as usize)
        .ok_or_else(|| {
            Error::CorruptStructure(format!(
                "payload of {} bytes exceeds {} bytes",
                header.compressed_size,
                data.len().saturating_sub(HEADER_SIZE)
            ))
        })?;
    let size = header.uncompressed_size as usize;
    debug!(?compression, stored = stored.len(), size, "read TPK header");

    let payload = match compression {
        TpkCompression::None => stored.to_vec(),
        TpkCompression::Lz4 => decompressor.lz4(stored, size)?,
        TpkCompression::Lzma => decompressor.lzma(stored, size)?,
        TpkCompression::Brotli => decompressor.brotli(stored)?,
    };
    if payload.len() != size {
        return Err(Error::CorruptStructure(format!(
            "payload decompressed to {} bytes, expected {size}",
            payload.len()
        )));
    }
    Ok(payload)
}
