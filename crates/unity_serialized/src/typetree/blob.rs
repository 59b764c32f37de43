//! Blob TypeTree encoding
//!
//! | Field              | Size                      |
//! |--------------------|---------------------------|
//! | node count         | 4 bytes                   |
//! | string buffer size | 4 bytes                   |
//! | nodes              | 24 bytes each, 32 from format 19 |
//! | string buffer      | string buffer size bytes  |
//!
//! Node records hold `(u16 version, u8 level, u8 type flags, u32 type name, u32 name,
//! i32 byte size, i32 index, i32 meta flag[, u64 ref type hash])`. Names are string references:
//! with the high bit clear they are a byte offset into the local string buffer, with the high bit
//! set the low 31 bits are a byte offset into the [`CommonStrings`] table.

use std::collections::HashMap;
use tracing::trace;

use crate::error::{Error, Result};
use crate::stream::{EndianReader, EndianWriter};
use crate::typetree::common_strings::{CommonStrings, COMMON_STRING_FLAG};
use crate::typetree::{TypeTree, TypeTreeNode};

/// First format version storing the reference type hash in every record
pub const REF_TYPE_HASH_VERSION: u32 = 19;

/// String buffer and references of a parsed blob, kept for byte exact rewrites
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BlobLayout {
    /// The local string buffer as stored
    pub string_buffer: Vec<u8>,
    /// `(type name, name)` references of every node in pre-order
    pub references: Vec<(u32, u32)>,
}

fn record_size(format_version: u32) -> usize {
    if format_version >= REF_TYPE_HASH_VERSION {
        32
    } else {
        24
    }
}

fn resolve(reference: u32, local: &[u8], common: &CommonStrings) -> Result<String> {
    if reference & COMMON_STRING_FLAG != 0 {
        return common
            .get(reference & !COMMON_STRING_FLAG)
            .map(str::to_owned);
    }

    let rest = local.get(reference as usize..).ok_or_else(|| {
        Error::CorruptStructure(format!(
            "string offset {reference} exceeds {} bytes",
            local.len()
        ))
    })?;
    let end = rest.iter().position(|b| *b == 0).unwrap_or(rest.len());
    Ok(String::from_utf8_lossy(&rest[..end]).into_owned())
}

fn checked_size(value: i32, element: usize, remaining: usize, what: &str) -> Result<usize> {
    usize::try_from(value)
        .ok()
        .filter(|count| count.saturating_mul(element) <= remaining)
        .ok_or_else(|| {
            Error::CorruptStructure(format!(
                "{what} {value} does not fit in {remaining} bytes"
            ))
        })
}

/// Read a blob and rebuild the tree from the node levels
pub fn read(
    reader: &mut EndianReader,
    format_version: u32,
    common: &CommonStrings,
) -> Result<TypeTree> {
    let node_count = reader.read_i32()?;
    let string_size = reader.read_i32()?;
    let node_count = checked_size(
        node_count,
        record_size(format_version),
        reader.remaining(),
        "node count",
    )?;
    let records = reader.read_bytes(node_count * record_size(format_version))?;
    let string_size = checked_size(string_size, 1, reader.remaining(), "string buffer size")?;
    let string_buffer = reader.read_bytes(string_size)?;

    let mut records = EndianReader::new(records, reader.endian());
    let mut nodes = Vec::with_capacity(node_count);
    let mut references = Vec::with_capacity(node_count);
    for _ in 0..node_count {
        let version = records.read_u16()?;
        let level = records.read_u8()?;
        let type_flags = records.read_u8()?;
        let type_ref = records.read_u32()?;
        let name_ref = records.read_u32()?;
        let mut node = TypeTreeNode {
            level,
            version: version as i32,
            type_flags: type_flags as i32,
            type_name: resolve(type_ref, string_buffer, common)?,
            name: resolve(name_ref, string_buffer, common)?,
            byte_size: records.read_i32()?,
            index: records.read_i32()?,
            meta_flag: records.read_i32()?,
            ..Default::default()
        };
        if format_version >= REF_TYPE_HASH_VERSION {
            node.ref_type_hash = records.read_u64()?;
        }
        references.push((type_ref, name_ref));
        nodes.push(node);
    }

    let root = TypeTreeNode::from_flat(nodes)?;
    trace!(name = %root.type_name, nodes = node_count, "read blob type tree");

    Ok(TypeTree {
        root,
        layout: Some(BlobLayout {
            string_buffer: string_buffer.to_vec(),
            references,
        }),
    })
}

/// Whether a recorded layout still names every node of the tree
fn layout_matches(
    layout: &BlobLayout,
    nodes: &[&TypeTreeNode],
    common: &CommonStrings,
) -> bool {
    layout.references.len() == nodes.len()
        && layout
            .references
            .iter()
            .zip(nodes)
            .all(|((type_ref, name_ref), node)| {
                resolve(*type_ref, &layout.string_buffer, common).is_ok_and(|t| t == node.type_name)
                    && resolve(*name_ref, &layout.string_buffer, common)
                        .is_ok_and(|n| n == node.name)
            })
}

/// Lay out a fresh string buffer, sharing names through the common table where possible
fn build_layout(nodes: &[&TypeTreeNode], common: &CommonStrings) -> BlobLayout {
    let mut layout = BlobLayout::default();
    let mut local: HashMap<&str, u32> = HashMap::new();

    for node in nodes {
        let mut refs = [0u32; 2];
        for (slot, value) in refs.iter_mut().zip([node.type_name.as_str(), node.name.as_str()]) {
            *slot = match (common.offset_of(value), local.get(value)) {
                (Some(offset), _) => offset | COMMON_STRING_FLAG,
                (None, Some(offset)) => *offset,
                (None, None) => {
                    let offset = layout.string_buffer.len() as u32;
                    layout.string_buffer.extend_from_slice(value.as_bytes());
                    layout.string_buffer.push(0);
                    local.insert(value, offset);
                    offset
                }
            };
        }
        layout.references.push((refs[0], refs[1]));
    }

    layout
}

/// Write the tree, the dual of [`read`]
///
/// A layout recorded by [`read`] is reused as long as it still names the nodes, so an unchanged
/// tree is reproduced byte for byte.
pub fn write(
    writer: &mut EndianWriter,
    tree: &TypeTree,
    format_version: u32,
    common: &CommonStrings,
) {
    let nodes = tree.root.flatten();
    let fresh;
    let layout = match &tree.layout {
        Some(layout) if layout_matches(layout, &nodes, common) => layout,
        _ => {
            fresh = build_layout(&nodes, common);
            &fresh
        }
    };

    writer.write_i32(nodes.len() as i32);
    writer.write_i32(layout.string_buffer.len() as i32);
    for (node, (type_ref, name_ref)) in nodes.iter().zip(&layout.references) {
        writer.write_u16(node.version as u16);
        writer.write_u8(node.level);
        writer.write_u8(node.type_flags as u8);
        writer.write_u32(*type_ref);
        writer.write_u32(*name_ref);
        writer.write_i32(node.byte_size);
        writer.write_i32(node.index);
        writer.write_i32(node.meta_flag);
        if format_version >= REF_TYPE_HASH_VERSION {
            writer.write_u64(node.ref_type_hash);
        }
    }
    writer.write_bytes(&layout.string_buffer);
}
