//! Sequential TypeTree encoding
//!
//! | Field          | Present              |
//! |----------------|----------------------|
//! | type name      | always, null terminated |
//! | name           | always, null terminated |
//! | byte size      | always               |
//! | variable count | format 2             |
//! | index          | format other than 3  |
//! | type flags     | always               |
//! | version        | always               |
//! | meta flag      | format other than 3  |
//! | child count    | always               |
//!
//! Children follow their parent in pre-order.

use tracing::trace;

use crate::error::{Error, Result};
use crate::stream::{EndianReader, EndianWriter};
use crate::typetree::{TypeTreeNode, MAX_DEPTH};

/// Smallest possible record, two empty names and the five fields every revision stores
const MIN_RECORD_SIZE: usize = 2 + 4 * 4;

fn read_record(
    reader: &mut EndianReader,
    format_version: u32,
    level: u8,
) -> Result<(TypeTreeNode, usize)> {
    let mut node = TypeTreeNode {
        level,
        type_name: reader.read_cstring_lossy()?,
        name: reader.read_cstring_lossy()?,
        byte_size: reader.read_i32()?,
        ..Default::default()
    };
    if format_version == 2 {
        node.variable_count = reader.read_i32()?;
    }
    if format_version != 3 {
        node.index = reader.read_i32()?;
    }
    node.type_flags = reader.read_i32()?;
    node.version = reader.read_i32()?;
    if format_version != 3 {
        node.meta_flag = reader.read_i32()?;
    }

    let count = reader.read_i32()?;
    let count = usize::try_from(count)
        .ok()
        .filter(|count| count.saturating_mul(MIN_RECORD_SIZE) <= reader.remaining())
        .ok_or_else(|| {
            Error::CorruptStructure(format!(
                "{} has an invalid child count {count}",
                node.name
            ))
        })?;

    Ok((node, count))
}

/// Read a tree with an explicit stack of open nodes
pub fn read(reader: &mut EndianReader, format_version: u32) -> Result<TypeTreeNode> {
    let (root, count) = read_record(reader, format_version, 0)?;
    let mut stack = vec![(root, count)];

    loop {
        let Some((_, remaining)) = stack.last_mut() else {
            return Err(Error::CorruptStructure("empty type tree".into()));
        };

        if *remaining == 0 {
            let Some((node, _)) = stack.pop() else {
                return Err(Error::CorruptStructure("empty type tree".into()));
            };
            match stack.last_mut() {
                Some((parent, _)) => parent.children.push(node),
                None => {
                    trace!(name = %node.name, "read sequential type tree");
                    return Ok(node);
                }
            }
            continue;
        }

        *remaining -= 1;
        if stack.len() > MAX_DEPTH {
            return Err(Error::CorruptStructure(format!(
                "type tree deeper than {MAX_DEPTH} levels"
            )));
        }
        let child = read_record(reader, format_version, stack.len() as u8)?;
        stack.push(child);
    }
}

/// Write a tree in pre-order, the dual of [`read`]
pub fn write(writer: &mut EndianWriter, root: &TypeTreeNode, format_version: u32) {
    for node in root.flatten() {
        writer.write_cstring(node.type_name.as_bytes());
        writer.write_cstring(node.name.as_bytes());
        writer.write_i32(node.byte_size);
        if format_version == 2 {
            writer.write_i32(node.variable_count);
        }
        if format_version != 3 {
            writer.write_i32(node.index);
        }
        writer.write_i32(node.type_flags);
        writer.write_i32(node.version);
        if format_version != 3 {
            writer.write_i32(node.meta_flag);
        }
        writer.write_i32(node.children.len() as i32);
    }
}
