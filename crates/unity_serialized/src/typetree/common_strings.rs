//! The engine's shared string table
//!
//! Blob encoded type trees refer to frequent type and field names through a byte offset into a
//! buffer of null terminated strings shipped with the engine instead of storing them locally.

use std::collections::HashMap;
use std::sync::OnceLock;

use crate::error::{Error, Result};

/// Strings in the order the engine lays them out
#[rustfmt::skip]
const BUILTIN: &[&str] = &[
    "AABB", "AnimationClip", "AnimationCurve", "AnimationState", "Array", "Base", "BitField",
    "bitset", "bool", "char", "ColorRGBA", "Component", "data", "deque", "double",
    "dynamic_array", "FastPropertyName", "first", "float", "Font", "GameObject", "Generic Mono",
    "GradientNEW", "GUID", "GUIStyle", "int", "list", "long long", "map", "Matrix4x4f", "MdFour",
    "MonoBehaviour", "MonoScript", "m_ByteSize", "m_Curve", "m_EditorClassIdentifier",
    "m_EditorHideFlags", "m_Enabled", "m_ExtensionPtr", "m_GameObject", "m_Index", "m_IsArray",
    "m_IsStatic", "m_MetaFlag", "m_Name", "m_ObjectHideFlags", "m_PrefabInternal",
    "m_PrefabParentObject", "m_Script", "m_StaticEditorFlags", "m_Type", "m_Version", "Object",
    "pair", "PPtr<Component>", "PPtr<GameObject>", "PPtr<Material>", "PPtr<MonoBehaviour>",
    "PPtr<MonoScript>", "PPtr<Object>", "PPtr<Prefab>", "PPtr<Sprite>", "PPtr<TextAsset>",
    "PPtr<Texture>", "PPtr<Texture2D>", "PPtr<Transform>", "Prefab", "Quaternionf", "Rectf",
    "RectInt", "RectOffset", "second", "set", "short", "size", "SInt16", "SInt32", "SInt64",
    "SInt8", "staticvector", "string", "TextAsset", "TextMesh", "Texture", "Texture2D",
    "Transform", "TypelessData", "UInt16", "UInt32", "UInt64", "UInt8", "unsigned int",
    "unsigned long long", "unsigned short", "vector", "Vector2f", "Vector3f", "Vector4f",
    "m_ScriptingClassIdentifier", "Gradient", "Type*", "int2_storage", "int3_storage",
    "BoundsInt", "m_CorrespondingSourceObject", "m_PrefabInstance", "m_PrefabAsset", "FileSize",
    "Hash128",
];

/// Flag marking a string reference as an offset into the common table
pub const COMMON_STRING_FLAG: u32 = 0x8000_0000;

/// A buffer of null terminated strings addressed by byte offset
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommonStrings {
    buffer: Vec<u8>,
    offsets: HashMap<String, u32>,
}

impl CommonStrings {
    /// Lay out the strings back to back, each followed by a null terminator
    pub fn new<S: AsRef<str>>(strings: impl IntoIterator<Item = S>) -> Self {
        let mut buffer = Vec::new();
        let mut offsets = HashMap::new();
        for string in strings {
            let string = string.as_ref();
            offsets.entry(string.to_owned()).or_insert(buffer.len() as u32);
            buffer.extend_from_slice(string.as_bytes());
            buffer.push(0);
        }
        Self { buffer, offsets }
    }

    /// The table compiled into the library
    pub fn builtin() -> &'static CommonStrings {
        static BUILTIN_TABLE: OnceLock<CommonStrings> = OnceLock::new();
        BUILTIN_TABLE.get_or_init(|| CommonStrings::new(BUILTIN.iter().copied()))
    }

    /// The string starting at a byte offset
    pub fn get(&self, offset: u32) -> Result<&str> {
        let rest = self.buffer.get(offset as usize..).ok_or_else(|| {
            Error::CorruptStructure(format!(
                "common string offset {offset} exceeds {} bytes",
                self.buffer.len()
            ))
        })?;
        let end = rest.iter().position(|b| *b == 0).unwrap_or(rest.len());
        std::str::from_utf8(&rest[..end]).map_err(|e| Error::CorruptStructure(e.to_string()))
    }

    /// Byte offset of a string, if the table holds it
    pub fn offset_of(&self, value: &str) -> Option<u32> {
        self.offsets.get(value).copied()
    }

    /// Raw buffer
    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    /// Number of strings
    pub fn len(&self) -> usize {
        self.buffer.iter().filter(|b| **b == 0).count()
    }

    /// Whether the table holds no strings
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}
