//! Schema lookups against a loaded dictionary

use bon::Builder;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::io::Read;
use std::sync::{Arc, OnceLock};
use tracing::{debug, instrument, trace};
use unity_bundle::compression::{Decompressor, DefaultDecompressor};
use unity_serialized::decoder::SchemaSource;
use unity_serialized::typetree::{CommonStrings, TypeTreeNode, MAX_DEPTH};
use unity_version::EngineVersion;

use crate::error::{Error, Result};
use crate::read::{read_blob, read_payload};
use crate::types::{ClassHistory, TpkClass, TypeTreeBlob};

/// Most nodes a single materialized schema may hold
pub const MAX_NODES: usize = 1 << 20;

/// Which of the two stored schemas a lookup returns
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub enum RootKind {
    /// Schema of player builds
    #[default]
    Release,
    /// Schema of the editor
    Editor,
}

/// Options for how a dictionary answers lookups
#[derive(Builder, Debug, Clone, Default)]
pub struct DictionaryOptions {
    /// Which schema to materialize
    #[builder(default)]
    pub root: RootKind,
}

/// A loaded TPK type tree dictionary
///
/// ```no_run
/// use unity_tpk::SchemaDictionary;
/// use unity_version::EngineVersion;
///
/// let dictionary = SchemaDictionary::new(std::fs::File::open("uncompressed.tpk")?)?;
/// let version = EngineVersion::parse("2019.4.0f1")?;
/// let schema = dictionary.schema(28, &version)?;
/// println!("{}", dictionary.class_name(28, &version)?);
/// println!("{schema}");
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug)]
pub struct SchemaDictionary {
    blob: TypeTreeBlob,
    classes: HashMap<i32, usize>,
    options: DictionaryOptions,
    memo: RwLock<HashMap<(i32, EngineVersion), Arc<TypeTreeNode>>>,
}

enum Frame {
    Enter { node: u16, level: usize },
    Exit { node: u16 },
}

impl SchemaDictionary {
    /// Load a dictionary from a reader, with default options
    pub fn new<R: Read>(mut reader: R) -> Result<Self> {
        let mut data = Vec::new();
        reader.read_to_end(&mut data)?;
        Self::from_bytes(&data)
    }

    /// Load a dictionary from bytes, with default options
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        Self::from_bytes_with(data, DictionaryOptions::default(), &DefaultDecompressor)
    }

    /// Load a dictionary from bytes
    #[instrument(skip_all, err)]
    pub fn from_bytes_with(
        data: &[u8],
        options: DictionaryOptions,
        decompressor: &dyn Decompressor,
    ) -> Result<Self> {
        let payload = read_payload(data, decompressor)?;
        let blob = read_blob(&payload)?;
        Ok(Self::from_blob(blob, options))
    }

    /// Wrap an already parsed payload
    pub fn from_blob(blob: TypeTreeBlob, options: DictionaryOptions) -> Self {
        let classes = blob
            .classes
            .iter()
            .enumerate()
            .map(|(position, history)| (history.class_id, position))
            .collect();
        debug!(
            classes = blob.classes.len(),
            nodes = blob.nodes.len(),
            strings = blob.strings.len(),
            "loaded schema dictionary"
        );
        Self {
            blob,
            classes,
            options,
            memo: RwLock::new(HashMap::new()),
        }
    }

    /// The parsed payload
    pub fn blob(&self) -> &TypeTreeBlob {
        &self.blob
    }

    /// Every engine version covered, ascending
    pub fn versions(&self) -> &[EngineVersion] {
        &self.blob.versions
    }

    /// Version history of a class
    pub fn history(&self, class_id: i32) -> Option<&ClassHistory> {
        self.classes
            .get(&class_id)
            .map(|position| &self.blob.classes[*position])
    }

    /// The class as of the last entry at or before `version`
    pub fn class(&self, class_id: i32, version: &EngineVersion) -> Result<&TpkClass> {
        self.history(class_id)
            .and_then(|history| history.at(version))
            .and_then(|(_, class)| class.as_ref())
            .ok_or_else(|| Error::UnknownClassForVersion {
                class_id,
                version: version.to_string(),
            })
    }

    /// Name of a class as of a version
    pub fn class_name(&self, class_id: i32, version: &EngineVersion) -> Result<&str> {
        let class = self.class(class_id, version)?;
        self.string(class.name)
    }

    fn string(&self, index: u16) -> Result<&str> {
        self.blob
            .strings
            .get(index as usize)
            .map(String::as_str)
            .ok_or_else(|| {
                Error::CorruptStructure(format!(
                    "string {index} exceeds {} strings",
                    self.blob.strings.len()
                ))
            })
    }

    /// Schema of a class as of a version, memoized per exact version
    #[instrument(skip(self), fields(%version), err)]
    pub fn schema(&self, class_id: i32, version: &EngineVersion) -> Result<Arc<TypeTreeNode>> {
        let key = (class_id, *version);
        if let Some(schema) = self.memo.read().get(&key) {
            return Ok(Arc::clone(schema));
        }

        let class = self.class(class_id, version)?;
        let root = match self.options.root {
            RootKind::Release => class.release_root,
            RootKind::Editor => class.editor_root,
        }
        .ok_or_else(|| Error::UnknownClassForVersion {
            class_id,
            version: version.to_string(),
        })?;
        let schema = Arc::new(self.materialize(root)?);
        debug!(nodes = schema.node_count(), "materialized schema");

        let mut memo = self.memo.write();
        Ok(Arc::clone(memo.entry(key).or_insert(schema)))
    }

    /// Build the tree below a node buffer entry
    fn materialize(&self, root: u16) -> Result<TypeTreeNode> {
        let mut flat = Vec::new();
        let mut on_path = vec![false; self.blob.nodes.len()];
        let mut stack = vec![Frame::Enter {
            node: root,
            level: 0,
        }];

        while let Some(frame) = stack.pop() {
            let (index, level) = match frame {
                Frame::Exit { node } => {
                    on_path[node as usize] = false;
                    continue;
                }
                Frame::Enter { node, level } => (node, level),
            };

            let node = self.blob.nodes.get(index as usize).ok_or_else(|| {
                Error::CorruptStructure(format!(
                    "node {index} exceeds {} nodes",
                    self.blob.nodes.len()
                ))
            })?;
            if on_path[index as usize] {
                return Err(Error::CorruptStructure(format!(
                    "node {index} contains itself"
                )));
            }
            if level > MAX_DEPTH {
                return Err(Error::CorruptStructure(format!(
                    "schema nests deeper than {MAX_DEPTH} levels"
                )));
            }
            if flat.len() >= MAX_NODES {
                return Err(Error::CorruptStructure(format!(
                    "schema has more than {MAX_NODES} nodes"
                )));
            }

            let mut out = TypeTreeNode::new(
                level as u8,
                self.string(node.type_name)?,
                self.string(node.name)?,
                node.byte_size,
            );
            out.version = node.version as i32;
            out.type_flags = node.type_flags as i32;
            out.meta_flag = node.meta_flag as i32;
            trace!(level, type_name = %out.type_name, name = %out.name, "node");
            flat.push(out);

            on_path[index as usize] = true;
            stack.push(Frame::Exit { node: index });
            stack.extend(node.children.iter().rev().map(|child| Frame::Enter {
                node: *child,
                level: level + 1,
            }));
        }

        let mut tree = TypeTreeNode::from_flat(flat)
            .map_err(|e| Error::CorruptStructure(e.to_string()))?;
        tree.assign_indices();
        Ok(tree)
    }

    /// The common string table in effect at a version
    pub fn common_strings(&self, version: &EngineVersion) -> Result<CommonStrings> {
        let counts = &self.blob.common_string_counts;
        let position = counts.partition_point(|(entry, _)| entry <= version);
        let count = match position.checked_sub(1) {
            Some(position) => counts[position].1 as usize,
            None => 0,
        };
        let indices = self
            .blob
            .common_string_indices
            .get(..count)
            .ok_or_else(|| {
                Error::CorruptStructure(format!(
                    "{count} common strings requested, {} stored",
                    self.blob.common_string_indices.len()
                ))
            })?;
        let strings = indices
            .iter()
            .map(|index| self.string(*index))
            .collect::<Result<Vec<_>>>()?;
        Ok(CommonStrings::new(strings))
    }
}

impl SchemaSource for SchemaDictionary {
    fn schema(
        &self,
        class_id: i32,
        version: &EngineVersion,
    ) -> unity_serialized::error::Result<Arc<TypeTreeNode>> {
        Ok(SchemaDictionary::schema(self, class_id, version)?)
    }
}

static GLOBAL: OnceLock<SchemaDictionary> = OnceLock::new();

/// Make a dictionary available process wide, once
pub fn install(dictionary: SchemaDictionary) -> Result<&'static SchemaDictionary> {
    let mut installed = false;
    let global = GLOBAL.get_or_init(|| {
        installed = true;
        dictionary
    });
    if installed {
        Ok(global)
    } else {
        Err(Error::AlreadyInstalled)
    }
}

/// The process wide dictionary, if one was installed
pub fn global() -> Option<&'static SchemaDictionary> {
    GLOBAL.get()
}
