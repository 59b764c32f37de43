//! Schema driven value codec
//!
//! Both directions walk the pre-order node list of a [`TypeTreeNode`] with a shared
//! [`NodeCursor`]. Every node leaves the cursor just past its own subtree, so the next sibling
//! always lines up.

use indexmap::IndexMap;

use crate::error::{Error, Result};
use crate::stream::{EndianReader, EndianWriter, Underrun};
use crate::typetree::{NodeKind, TypeTreeNode};
use crate::value::Value;

/// Position in the flattened node list of a schema
#[derive(Debug, Clone)]
pub struct NodeCursor<'a> {
    nodes: Vec<&'a TypeTreeNode>,
    ends: Vec<usize>,
    index: usize,
}

impl<'a> NodeCursor<'a> {
    /// Flatten a schema and point at its root
    pub fn new(root: &'a TypeTreeNode) -> Self {
        let nodes = root.flatten();

        // Pre-order: the children of node i start at i + 1 and follow each other subtree by
        // subtree, so subtree sizes can be summed back to front.
        let mut sizes = vec![1usize; nodes.len()];
        for i in (0..nodes.len()).rev() {
            let mut child = i + 1;
            for _ in 0..nodes[i].children.len() {
                sizes[i] += sizes[child];
                child += sizes[child];
            }
        }
        let ends = sizes.iter().enumerate().map(|(i, size)| i + size).collect();

        Self {
            nodes,
            ends,
            index: 0,
        }
    }

    /// Index of the current node
    pub fn index(&self) -> usize {
        self.index
    }

    /// The current node
    pub fn node(&self) -> Option<&'a TypeTreeNode> {
        self.nodes.get(self.index).copied()
    }

    /// The flattened schema
    pub fn nodes(&self) -> &[&'a TypeTreeNode] {
        &self.nodes
    }

    fn at(&self, index: usize, path: &[&str]) -> Result<&'a TypeTreeNode> {
        self.nodes.get(index).copied().ok_or_else(|| {
            Error::CorruptStructure(format!("schema ends early at {}", path.join("/")))
        })
    }

    fn skip_subtree(&mut self, index: usize) {
        self.index = self.ends[index];
    }
}

/// Where the element schema of a repeated node lives
fn element_index(node: &TypeTreeNode, index: usize) -> usize {
    match node.kind() {
        // The marker itself: Array, size, data
        NodeKind::Array => index + 2,
        // Node, Array, size, data
        _ => index + 3,
    }
}

/// Whether a repeated node or its `Array` marker asks for alignment afterwards
fn aligns_after(node: &TypeTreeNode) -> bool {
    node.is_aligned()
        || (matches!(node.kind(), NodeKind::String | NodeKind::Map) || node.is_array())
            && node.children.first().is_some_and(TypeTreeNode::is_aligned)
}

/// Most elements accepted for an array whose elements occupy no bytes
pub const MAX_EMPTY_ELEMENTS: usize = 1 << 20;

/// Unaligned `UInt8` elements, read and written as one byte run
fn is_byte_element(node: &TypeTreeNode) -> bool {
    node.kind() == NodeKind::UInt8 && node.children.is_empty() && !node.is_aligned()
}

struct Decoder<'a, 'r, 'd> {
    cursor: NodeCursor<'a>,
    reader: &'d mut EndianReader<'r>,
    path: Vec<&'a str>,
}

impl<'a> Decoder<'a, '_, '_> {
    fn underrun(&self, underrun: Underrun) -> Error {
        Error::DecodeUnderrun {
            path: self.path.join("/"),
            position: underrun.position,
            needed: underrun.needed,
        }
    }

    fn count(&mut self, element: &TypeTreeNode) -> Result<usize> {
        let count = self.reader.read_i32().map_err(|e| self.underrun(e))?;
        let count = usize::try_from(count).map_err(|_| {
            Error::CorruptStructure(format!(
                "negative length {count} at {}",
                self.path.join("/")
            ))
        })?;
        if element.byte_size == 0 {
            if count > MAX_EMPTY_ELEMENTS {
                return Err(Error::CorruptStructure(format!(
                    "{count} empty elements at {}",
                    self.path.join("/")
                )));
            }
        } else if count > self.reader.remaining() {
            return Err(Error::DecodeUnderrun {
                path: self.path.join("/"),
                position: self.reader.relative_position(),
                needed: count,
            });
        }
        Ok(count)
    }

    fn bytes(&mut self, length: usize) -> Result<Vec<u8>> {
        let bytes = self.reader.read_bytes(length).map_err(|e| self.underrun(e))?;
        Ok(bytes.to_vec())
    }

    fn read_node(&mut self) -> Result<Value> {
        let index = self.cursor.index;
        let node = self.cursor.at(index, &self.path)?;
        self.path.push(&node.name);

        let value = match node.kind() {
            NodeKind::Bool => Value::Bool(self.reader.read_bool().map_err(|e| self.underrun(e))?),
            NodeKind::SInt8 => Value::I8(self.reader.read_i8().map_err(|e| self.underrun(e))?),
            NodeKind::UInt8 => Value::U8(self.reader.read_u8().map_err(|e| self.underrun(e))?),
            NodeKind::SInt16 => Value::I16(self.reader.read_i16().map_err(|e| self.underrun(e))?),
            NodeKind::UInt16 => Value::U16(self.reader.read_u16().map_err(|e| self.underrun(e))?),
            NodeKind::SInt32 => Value::I32(self.reader.read_i32().map_err(|e| self.underrun(e))?),
            NodeKind::UInt32 => Value::U32(self.reader.read_u32().map_err(|e| self.underrun(e))?),
            NodeKind::SInt64 => Value::I64(self.reader.read_i64().map_err(|e| self.underrun(e))?),
            NodeKind::UInt64 => Value::U64(self.reader.read_u64().map_err(|e| self.underrun(e))?),
            NodeKind::Float => Value::F32(self.reader.read_f32().map_err(|e| self.underrun(e))?),
            NodeKind::Double => Value::F64(self.reader.read_f64().map_err(|e| self.underrun(e))?),
            NodeKind::String => {
                let length = self.count(node)?;
                let bytes = self.bytes(length)?;
                self.reader.align(4);
                match String::from_utf8(bytes) {
                    Ok(text) => Value::String(text),
                    Err(e) => Value::Bytes(e.into_bytes()),
                }
            }
            NodeKind::TypelessData => {
                let length = self.count(node)?;
                Value::Bytes(self.bytes(length)?)
            }
            NodeKind::Map => {
                let pair = self.cursor.at(index + 3, &self.path)?;
                let count = self.count(pair)?;
                let mut entries = Vec::with_capacity(count.min(self.reader.remaining()));
                for _ in 0..count {
                    self.cursor.index = index + 4;
                    let key = self.read_node()?;
                    let value = self.read_node()?;
                    entries.push((key, value));
                }
                Value::Map(entries)
            }
            NodeKind::Array => self.read_array(node, index)?,
            _ if node.is_array() => self.read_array(node, index)?,
            NodeKind::Composite(_) => {
                let mut fields = IndexMap::with_capacity(node.children.len());
                self.cursor.index = index + 1;
                for child in &node.children {
                    fields.insert(child.name.clone(), self.read_node()?);
                }
                Value::Object(fields)
            }
        };

        self.cursor.skip_subtree(index);
        if aligns_after(node) {
            self.reader.align(4);
        }
        self.path.pop();
        Ok(value)
    }

    fn read_array(&mut self, node: &'a TypeTreeNode, index: usize) -> Result<Value> {
        let element_index = element_index(node, index);
        let element = self.cursor.at(element_index, &self.path)?;
        let count = self.count(element)?;

        if is_byte_element(element) {
            return Ok(Value::Bytes(self.bytes(count)?));
        }

        let mut items = Vec::with_capacity(count.min(self.reader.remaining()));
        for _ in 0..count {
            self.cursor.index = element_index;
            items.push(self.read_node()?);
        }
        Ok(Value::Array(items))
    }
}

/// Decode one value described by `tree` from the reader
///
/// Alignment is relative to the reader origin, which should be the start of the object.
pub fn read_value(tree: &TypeTreeNode, reader: &mut EndianReader) -> Result<Value> {
    let mut decoder = Decoder {
        cursor: NodeCursor::new(tree),
        reader,
        path: Vec::new(),
    };
    decoder.read_node()
}

struct Encoder<'a, 'w> {
    cursor: NodeCursor<'a>,
    writer: &'w mut EndianWriter,
    path: Vec<&'a str>,
}

impl<'a> Encoder<'a, '_> {
    fn mismatch(&self, expected: &str, value: &Value) -> Error {
        Error::EncodeMismatch {
            path: self.path.join("/"),
            expected: format!("{expected}, found {}", value.kind_name()),
        }
    }

    fn write_length(&mut self, length: usize) -> Result<()> {
        let length = i32::try_from(length).map_err(|_| Error::EncodeMismatch {
            path: self.path.join("/"),
            expected: format!("at most {} elements, found {length}", i32::MAX),
        })?;
        self.writer.write_i32(length);
        Ok(())
    }

    fn write_node(&mut self, value: &Value) -> Result<()> {
        let index = self.cursor.index;
        let node = self.cursor.at(index, &self.path)?;
        self.path.push(&node.name);

        match (node.kind(), value) {
            (NodeKind::Bool, Value::Bool(v)) => self.writer.write_bool(*v),
            (NodeKind::SInt8, Value::I8(v)) => self.writer.write_i8(*v),
            (NodeKind::UInt8, Value::U8(v)) => self.writer.write_u8(*v),
            (NodeKind::SInt16, Value::I16(v)) => self.writer.write_i16(*v),
            (NodeKind::UInt16, Value::U16(v)) => self.writer.write_u16(*v),
            (NodeKind::SInt32, Value::I32(v)) => self.writer.write_i32(*v),
            (NodeKind::UInt32, Value::U32(v)) => self.writer.write_u32(*v),
            (NodeKind::SInt64, Value::I64(v)) => self.writer.write_i64(*v),
            (NodeKind::UInt64, Value::U64(v)) => self.writer.write_u64(*v),
            (NodeKind::Float, Value::F32(v)) => self.writer.write_f32(*v),
            (NodeKind::Double, Value::F64(v)) => self.writer.write_f64(*v),
            (NodeKind::String, Value::String(text)) => {
                self.write_length(text.len())?;
                self.writer.write_bytes(text.as_bytes());
                self.writer.align(4);
            }
            (NodeKind::String, Value::Bytes(bytes)) => {
                self.write_length(bytes.len())?;
                self.writer.write_bytes(bytes);
                self.writer.align(4);
            }
            (NodeKind::TypelessData, Value::Bytes(bytes)) => {
                self.write_length(bytes.len())?;
                self.writer.write_bytes(bytes);
            }
            (NodeKind::Map, Value::Map(entries)) => {
                self.cursor.at(index + 3, &self.path)?;
                self.write_length(entries.len())?;
                for (key, value) in entries {
                    self.cursor.index = index + 4;
                    self.write_node(key)?;
                    self.write_node(value)?;
                }
            }
            (NodeKind::Array, _) => self.write_array(node, index, value)?,
            (_, _) if node.is_array() => self.write_array(node, index, value)?,
            (NodeKind::Composite(_), Value::Object(fields)) => {
                self.cursor.index = index + 1;
                for child in &node.children {
                    let Some(field) = fields.get(&child.name) else {
                        self.path.push(&child.name);
                        return Err(Error::EncodeMismatch {
                            path: self.path.join("/"),
                            expected: "a value, found a missing field".into(),
                        });
                    };
                    self.write_node(field)?;
                }
            }
            (kind, value) => {
                let expected = match kind {
                    NodeKind::Composite(name) => name,
                    _ => node.type_name.as_str(),
                };
                return Err(self.mismatch(expected, value));
            }
        }

        self.cursor.skip_subtree(index);
        if aligns_after(node) {
            self.writer.align(4);
        }
        self.path.pop();
        Ok(())
    }

    fn write_array(&mut self, node: &'a TypeTreeNode, index: usize, value: &Value) -> Result<()> {
        let element_index = element_index(node, index);
        let element = self.cursor.at(element_index, &self.path)?;

        match value {
            Value::Bytes(bytes) if is_byte_element(element) => {
                self.write_length(bytes.len())?;
                self.writer.write_bytes(bytes);
            }
            Value::Array(items) => {
                self.write_length(items.len())?;
                for item in items {
                    self.cursor.index = element_index;
                    self.write_node(item)?;
                }
            }
            other => return Err(self.mismatch("array", other)),
        }
        Ok(())
    }
}

/// Encode a value described by `tree`, the dual of [`read_value`]
pub fn write_value(value: &Value, tree: &TypeTreeNode, writer: &mut EndianWriter) -> Result<()> {
    let mut encoder = Encoder {
        cursor: NodeCursor::new(tree),
        writer,
        path: Vec::new(),
    };
    encoder.write_node(value)
}
