//! Pointers between objects
//!
//! A [`Pointer`] is a plain key: a file index into the owning file's externals (0 for the file
//! itself) and a path id. It never owns its target; resolution goes through a [`SiblingLookup`]
//! over files that are already loaded.

use derive_more::Display;
use indexmap::IndexMap;
use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::read::SerializedFile;
use crate::types::ObjectInfo;
use crate::value::Value;

/// Reference to an object, `PPtr<T>` in the engine
#[derive(Display, Debug, Copy, Clone, Default, PartialEq, Eq, Hash)]
#[display("PPtr({file_index}, {path_id})")]
pub struct Pointer {
    /// 0 for the owning file, otherwise 1 + the index into its externals
    pub file_index: i32,
    /// Path id of the target, 0 for a null pointer
    pub path_id: i64,
}

impl Pointer {
    /// Create a pointer
    pub const fn new(file_index: i32, path_id: i64) -> Self {
        Self {
            file_index,
            path_id,
        }
    }

    /// Whether the pointer points nowhere
    pub fn is_null(&self) -> bool {
        self.path_id == 0
    }

    /// Read a decoded `PPtr<...>` composite
    ///
    /// Returns `None` for values without integer `m_FileID` and `m_PathID` fields.
    pub fn from_value(value: &Value) -> Option<Self> {
        let file_index = value.get("m_FileID")?.as_i64()?;
        let path_id = value.get("m_PathID")?.as_i64()?;
        Some(Self {
            file_index: i32::try_from(file_index).ok()?,
            path_id,
        })
    }

    /// Whether a type name describes a pointer
    pub fn is_pointer_type(type_name: &str) -> bool {
        type_name.starts_with("PPtr<") && type_name.ends_with('>')
    }
}

/// Access to loaded files by name
pub trait SiblingLookup {
    /// The file an external reference names, by the last component of its path
    fn sibling(&self, file_name: &str) -> Option<&SerializedFile>;
}

impl<S: std::hash::BuildHasher> SiblingLookup for HashMap<String, SerializedFile, S> {
    fn sibling(&self, file_name: &str) -> Option<&SerializedFile> {
        self.get(file_name)
    }
}

/// Loaded files keyed by file name, matched without regard to case
#[derive(Debug, Clone, Default)]
pub struct FileSet {
    files: IndexMap<String, SerializedFile>,
}

fn file_key(name: &str) -> String {
    name.rsplit(['/', '\\'])
        .next()
        .unwrap_or(name)
        .to_lowercase()
}

impl FileSet {
    /// Create an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a file under the last component of `name`, replacing a file of the same name
    pub fn insert(&mut self, name: &str, file: SerializedFile) -> Option<SerializedFile> {
        self.files.insert(file_key(name), file)
    }

    /// Look up a file by name
    pub fn get(&self, name: &str) -> Option<&SerializedFile> {
        self.files.get(&file_key(name))
    }

    /// Number of files
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Whether the set is empty
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Files in insertion order with their keys
    pub fn iter(&self) -> impl Iterator<Item = (&str, &SerializedFile)> {
        self.files.iter().map(|(name, file)| (name.as_str(), file))
    }
}

impl SiblingLookup for FileSet {
    fn sibling(&self, file_name: &str) -> Option<&SerializedFile> {
        self.get(file_name)
    }
}

/// The file a pointer targets
pub fn resolve_file<'a>(
    pointer: Pointer,
    owner: &'a SerializedFile,
    siblings: &'a impl SiblingLookup,
) -> Result<&'a SerializedFile> {
    if pointer.file_index == 0 {
        return Ok(owner);
    }
    let external = owner.external(pointer.file_index)?;
    siblings
        .sibling(external.file_name())
        .ok_or_else(|| Error::UnresolvedReference(external.path_name.clone()))
}

/// The object a pointer targets
pub fn resolve<'a>(
    pointer: Pointer,
    owner: &'a SerializedFile,
    siblings: &'a impl SiblingLookup,
) -> Result<&'a ObjectInfo> {
    if pointer.is_null() {
        return Err(Error::NullPointer);
    }
    let file = resolve_file(pointer, owner, siblings)?;
    file.object(pointer.path_id)
        .ok_or_else(|| Error::DanglingReference {
            file: file.name().to_owned(),
            path_id: pointer.path_id,
        })
}
