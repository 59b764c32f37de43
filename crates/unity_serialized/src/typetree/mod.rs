//! TypeTree schema model
//!
//! A [`TypeTree`] describes the binary layout of one object. It is stored in serialized files in
//! one of two encodings:
//!
//! - the sequential encoding ([`legacy`]) used by format versions below 12 except 10, where every
//!   node inlines its names and an explicit child count;
//! - the blob encoding ([`blob`]) used by format 10 and 12 onwards, a flat list of fixed width
//!   records carrying a nesting level plus a string buffer, with frequent names shared through
//!   the [`CommonStrings`] table.

pub mod blob;
pub mod common_strings;
pub mod legacy;

use std::fmt;

pub use blob::BlobLayout;
pub use common_strings::CommonStrings;

use crate::error::{Error, Result};

/// Meta flag bit requesting alignment to 4 bytes after the value
pub const ALIGN_BYTES: i32 = 0x4000;

/// Deepest nesting accepted while building trees
pub const MAX_DEPTH: usize = 255;

/// One field of a schema
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TypeTreeNode {
    /// Nesting depth, 0 for the root
    pub level: u8,
    /// Type name, `int`, `string`, `PPtr<GameObject>`, ...
    pub type_name: String,
    /// Field name
    pub name: String,
    /// Size of the value in bytes, -1 when it is variable
    pub byte_size: i32,
    /// Position in the flattened tree
    pub index: i32,
    /// Type flags, bit 0 marks arrays
    pub type_flags: i32,
    /// Version of the type
    pub version: i32,
    /// Meta flags, see [`ALIGN_BYTES`]
    pub meta_flag: i32,
    /// Only stored by format version 2
    pub variable_count: i32,
    /// Hash of the referenced type, blob format 19 and later
    pub ref_type_hash: u64,
    /// Fields in binary layout order
    pub children: Vec<TypeTreeNode>,
}

/// The closed set of node kinds the codec treats specially
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind<'a> {
    Bool,
    SInt8,
    UInt8,
    SInt16,
    UInt16,
    SInt32,
    UInt32,
    SInt64,
    UInt64,
    Float,
    Double,
    String,
    TypelessData,
    Map,
    /// The `Array` marker below a repeated field
    Array,
    /// Anything else, a structure whose fields are its children
    Composite(&'a str),
}

impl<'a> NodeKind<'a> {
    /// Kind named by a type name
    pub fn from_type_name(type_name: &'a str) -> Self {
        match type_name {
            "bool" => NodeKind::Bool,
            "SInt8" => NodeKind::SInt8,
            "UInt8" | "char" => NodeKind::UInt8,
            "SInt16" | "short" => NodeKind::SInt16,
            "UInt16" | "unsigned short" => NodeKind::UInt16,
            "SInt32" | "int" => NodeKind::SInt32,
            "UInt32" | "unsigned int" | "Type*" => NodeKind::UInt32,
            "SInt64" | "long long" => NodeKind::SInt64,
            "UInt64" | "unsigned long long" | "FileSize" => NodeKind::UInt64,
            "float" => NodeKind::Float,
            "double" => NodeKind::Double,
            "string" => NodeKind::String,
            "TypelessData" => NodeKind::TypelessData,
            "map" => NodeKind::Map,
            "Array" => NodeKind::Array,
            other => NodeKind::Composite(other),
        }
    }
}

impl TypeTreeNode {
    /// Create a childless node
    pub fn new(level: u8, type_name: impl Into<String>, name: impl Into<String>, byte_size: i32) -> Self {
        Self {
            level,
            type_name: type_name.into(),
            name: name.into(),
            byte_size,
            ..Default::default()
        }
    }

    /// Builder style helper setting the meta flag
    pub fn with_meta_flag(mut self, meta_flag: i32) -> Self {
        self.meta_flag = meta_flag;
        self
    }

    /// Builder style helper appending a child
    pub fn with_child(mut self, child: TypeTreeNode) -> Self {
        self.children.push(child);
        self
    }

    /// Kind of the node
    pub fn kind(&self) -> NodeKind<'_> {
        NodeKind::from_type_name(&self.type_name)
    }

    /// Whether the cursor aligns to 4 bytes after this value
    pub fn is_aligned(&self) -> bool {
        self.meta_flag & ALIGN_BYTES != 0
    }

    /// Whether this node repeats the element described below its `Array` child
    pub fn is_array(&self) -> bool {
        self.children
            .first()
            .is_some_and(|child| child.type_name == "Array")
    }

    /// Pre-order list of the node and all of its descendants
    pub fn flatten(&self) -> Vec<&TypeTreeNode> {
        let mut out = Vec::new();
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            out.push(node);
            stack.extend(node.children.iter().rev());
        }
        out
    }

    /// Number of nodes in the subtree, the node included
    pub fn node_count(&self) -> usize {
        let mut count = 0;
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            count += 1;
            stack.extend(node.children.iter());
        }
        count
    }

    /// Rebuild a tree from a pre-order node list using the level of every node
    ///
    /// Children of the supplied nodes are ignored. The first node must be the shallowest, every
    /// following node must be deeper than it and at most one level deeper than its predecessor.
    pub fn from_flat(nodes: impl IntoIterator<Item = TypeTreeNode>) -> Result<TypeTreeNode> {
        let mut nodes = nodes.into_iter();
        let mut root = nodes
            .next()
            .ok_or_else(|| Error::CorruptStructure("empty type tree".into()))?;
        root.children.clear();
        let base = root.level;

        let mut stack = vec![root];
        for (position, mut node) in nodes.enumerate() {
            node.children.clear();
            if node.level <= base {
                return Err(Error::CorruptStructure(format!(
                    "node {} at level {} is not below the root level {base}",
                    position + 1,
                    node.level
                )));
            }

            let depth = (node.level - base) as usize;
            if depth > stack.len() {
                return Err(Error::CorruptStructure(format!(
                    "node {} jumps from level {} to {}",
                    position + 1,
                    base as usize + stack.len() - 1,
                    node.level
                )));
            }

            while stack.len() > depth {
                attach_top(&mut stack);
            }
            stack.push(node);
        }

        while stack.len() > 1 {
            attach_top(&mut stack);
        }
        stack
            .pop()
            .ok_or_else(|| Error::CorruptStructure("empty type tree".into()))
    }

    /// Set the level of every descendant from its depth below this node
    pub fn assign_levels(&mut self) {
        let mut stack: Vec<&mut TypeTreeNode> = vec![self];
        while let Some(node) = stack.pop() {
            let level = node.level;
            for child in node.children.iter_mut() {
                child.level = level.saturating_add(1);
                stack.push(child);
            }
        }
    }

    /// Number every node in pre-order, starting at 0 for this node
    pub fn assign_indices(&mut self) {
        let mut index = 0;
        let mut stack: Vec<&mut TypeTreeNode> = vec![self];
        while let Some(node) = stack.pop() {
            node.index = index;
            index += 1;
            stack.extend(node.children.iter_mut().rev());
        }
    }

    /// Find a descendant by a `/` separated path of field names
    pub fn find(&self, path: &str) -> Option<&TypeTreeNode> {
        path.split('/')
            .filter(|segment| !segment.is_empty())
            .try_fold(self, |node, segment| {
                node.children.iter().find(|child| child.name == segment)
            })
    }

    /// Find a direct child by field name
    pub fn child(&self, name: &str) -> Option<&TypeTreeNode> {
        self.children.iter().find(|child| child.name == name)
    }
}

fn attach_top(stack: &mut Vec<TypeTreeNode>) {
    if let Some(child) = stack.pop() {
        if let Some(parent) = stack.last_mut() {
            parent.children.push(child);
        }
    }
}

impl fmt::Display for TypeTreeNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let base = self.level;
        for node in self.flatten() {
            for _ in base..node.level {
                f.write_str("\t")?;
            }
            writeln!(
                f,
                "{} {} // ByteSize{{{:x}}}, Index{{{:x}}}, Version{{{:x}}}, IsArray{{{}}}, MetaFlag{{{:x}}}",
                node.type_name,
                node.name,
                node.byte_size,
                node.index,
                node.version,
                node.type_flags & 1,
                node.meta_flag
            )?;
        }
        Ok(())
    }
}

/// A schema tree together with the blob layout it was read from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeTree {
    /// Root node, usually named `Base`
    pub root: TypeTreeNode,
    pub(crate) layout: Option<BlobLayout>,
}

impl TypeTree {
    /// Wrap a tree that has no recorded layout
    pub fn new(root: TypeTreeNode) -> Self {
        Self { root, layout: None }
    }

    /// The blob layout recorded while parsing, if any
    pub fn layout(&self) -> Option<&BlobLayout> {
        self.layout.as_ref()
    }

    /// Forget the recorded layout so the next blob write builds a fresh string buffer
    pub fn clear_layout(&mut self) {
        self.layout = None;
    }
}

impl From<TypeTreeNode> for TypeTree {
    fn from(root: TypeTreeNode) -> Self {
        Self::new(root)
    }
}

impl fmt::Display for TypeTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.root.fmt(f)
    }
}
