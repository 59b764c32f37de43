#![allow(dead_code)]

use binrw::Endian;
use indexmap::IndexMap;
use unity_serialized::stream::EndianWriter;
use unity_serialized::typetree::{blob, legacy, CommonStrings, TypeTree, TypeTreeNode, ALIGN_BYTES};
use unity_serialized::Value;

pub const TEXT_ASSET: i32 = 49;
pub const COMPONENT: i32 = 2;

pub fn string_node(level: u8, name: &str) -> TypeTreeNode {
    TypeTreeNode::new(level, "string", name, -1).with_child(
        TypeTreeNode::new(level + 1, "Array", "Array", -1)
            .with_meta_flag(ALIGN_BYTES)
            .with_child(TypeTreeNode::new(level + 2, "int", "size", 4))
            .with_child(TypeTreeNode::new(level + 2, "char", "data", 1)),
    )
}

/// `TextAsset { m_Name: string, m_Script: string }`
pub fn text_asset_tree() -> TypeTreeNode {
    let mut root = TypeTreeNode::new(0, "TextAsset", "Base", -1)
        .with_child(string_node(1, "m_Name"))
        .with_child(string_node(1, "m_Script"));
    root.assign_indices();
    root
}

/// `Component { m_GameObject: PPtr<GameObject>, m_Value: int }`
pub fn component_tree() -> TypeTreeNode {
    let mut root = TypeTreeNode::new(0, "Component", "Base", -1)
        .with_child(
            TypeTreeNode::new(1, "PPtr<GameObject>", "m_GameObject", 12)
                .with_child(TypeTreeNode::new(2, "int", "m_FileID", 4))
                .with_child(TypeTreeNode::new(2, "SInt64", "m_PathID", 8)),
        )
        .with_child(TypeTreeNode::new(1, "int", "m_Value", 4));
    root.assign_indices();
    root
}

pub fn text_asset(name: &str, script: &str) -> Value {
    let mut fields = IndexMap::new();
    fields.insert("m_Name".to_owned(), Value::String(name.into()));
    fields.insert("m_Script".to_owned(), Value::String(script.into()));
    Value::Object(fields)
}

pub fn component(file_id: i32, path_id: i64, value: i32) -> Value {
    let mut pointer = IndexMap::new();
    pointer.insert("m_FileID".to_owned(), Value::I32(file_id));
    pointer.insert("m_PathID".to_owned(), Value::I64(path_id));
    let mut fields = IndexMap::new();
    fields.insert("m_GameObject".to_owned(), Value::Object(pointer));
    fields.insert("m_Value".to_owned(), Value::I32(value));
    Value::Object(fields)
}

pub struct TestType {
    pub class_id: i32,
    pub tree: TypeTreeNode,
}

pub struct TestObject {
    pub path_id: i64,
    pub type_index: usize,
    pub data: Vec<u8>,
}

pub struct TestFile {
    pub format_version: u32,
    pub endian: Endian,
    pub has_type_trees: bool,
    pub types: Vec<TestType>,
    pub objects: Vec<TestObject>,
    pub externals: Vec<String>,
}

impl TestFile {
    pub fn new(format_version: u32, endian: Endian) -> Self {
        Self {
            format_version,
            endian,
            has_type_trees: true,
            types: vec![
                TestType {
                    class_id: TEXT_ASSET,
                    tree: text_asset_tree(),
                },
                TestType {
                    class_id: COMPONENT,
                    tree: component_tree(),
                },
            ],
            objects: Vec::new(),
            externals: Vec::new(),
        }
    }

    /// Encode a value with the tree of a type and add it as an object
    pub fn object(mut self, path_id: i64, type_index: usize, value: &Value) -> Self {
        let mut writer = EndianWriter::new(self.endian);
        unity_serialized::write_value(value, &self.types[type_index].tree, &mut writer).unwrap();
        self.objects.push(TestObject {
            path_id,
            type_index,
            data: writer.into_inner(),
        });
        self
    }

    pub fn raw_object(mut self, path_id: i64, type_index: usize, data: Vec<u8>) -> Self {
        self.objects.push(TestObject {
            path_id,
            type_index,
            data,
        });
        self
    }

    pub fn external(mut self, path: &str) -> Self {
        self.externals.push(path.to_owned());
        self
    }

    pub fn without_type_trees(mut self) -> Self {
        self.has_type_trees = false;
        self
    }

    fn type_id(&self, object: &TestObject) -> i32 {
        if self.format_version >= 16 {
            object.type_index as i32
        } else {
            self.types[object.type_index].class_id
        }
    }

    fn metadata(&self, starts: &[u64]) -> Vec<u8> {
        let v = self.format_version;
        let mut w = EndianWriter::new(self.endian);
        if v >= 7 {
            w.write_cstring(b"2019.4.0f1");
        }
        if v >= 8 {
            w.write_i32(19);
        }
        if v >= 13 {
            w.write_bool(self.has_type_trees);
        }

        w.write_i32(self.types.len() as i32);
        for ty in &self.types {
            w.write_i32(ty.class_id);
            if v >= 16 {
                w.write_bool(false);
            }
            if v >= 17 {
                w.write_i16(-1);
            }
            if v >= 13 {
                w.write_bytes(&[0xAB; 16]);
            }
            if self.has_type_trees {
                if v >= 12 || v == 10 {
                    let tree = TypeTree::new(ty.tree.clone());
                    blob::write(&mut w, &tree, v, CommonStrings::builtin());
                } else {
                    legacy::write(&mut w, &ty.tree, v);
                }
                if v >= 21 {
                    w.write_i32(0);
                }
            }
        }

        if (7..14).contains(&v) {
            w.write_i32(0);
        }

        w.write_i32(self.objects.len() as i32);
        for (object, start) in self.objects.iter().zip(starts) {
            if v < 14 {
                w.write_i32(object.path_id as i32);
            } else {
                w.align(4);
                w.write_i64(object.path_id);
            }
            if v >= 22 {
                w.write_i64(*start as i64);
            } else {
                w.write_u32(*start as u32);
            }
            w.write_u32(object.data.len() as u32);
            w.write_i32(self.type_id(object));
            if v < 16 {
                w.write_u16(self.types[object.type_index].class_id as u16);
            }
            if v < 11 {
                w.write_u16(0);
            }
            if (11..17).contains(&v) {
                w.write_i16(-1);
            }
            if v == 15 || v == 16 {
                w.write_u8(0);
            }
        }

        if v >= 11 {
            w.write_i32(0);
        }

        w.write_i32(self.externals.len() as i32);
        for path in &self.externals {
            if v >= 6 {
                w.write_cstring(b"");
            }
            if v >= 5 {
                w.write_bytes(&[0x11; 16]);
                w.write_i32(0);
            }
            w.write_cstring(path.as_bytes());
        }

        if v >= 20 {
            w.write_i32(0);
        }
        if v >= 5 {
            w.write_cstring(b"");
        }
        w.into_inner()
    }

    fn data_section(&self) -> (Vec<u8>, Vec<u64>) {
        let mut data = Vec::new();
        let mut starts = Vec::new();
        for object in &self.objects {
            data.resize(data.len().next_multiple_of(8), 0);
            starts.push(data.len() as u64);
            data.extend_from_slice(&object.data);
        }
        (data, starts)
    }

    pub fn build(&self) -> Vec<u8> {
        let (data, starts) = self.data_section();
        let metadata = self.metadata(&starts);
        let v = self.format_version;
        let endian_byte = match self.endian {
            Endian::Little => 0u8,
            Endian::Big => 1u8,
        };

        let mut out = Vec::new();
        if v < 9 {
            // Data first, then the endian byte and metadata at the end
            let data_offset = 16usize;
            let metadata_size = metadata.len() + 1;
            let file_size = data_offset + data.len() + metadata_size;
            out.extend_from_slice(&(metadata_size as u32).to_be_bytes());
            out.extend_from_slice(&(file_size as u32).to_be_bytes());
            out.extend_from_slice(&v.to_be_bytes());
            out.extend_from_slice(&(data_offset as u32).to_be_bytes());
            out.extend_from_slice(&data);
            out.push(endian_byte);
            out.extend_from_slice(&metadata);
            return out;
        }

        let header_size = if v >= 22 { 48 } else { 20 };
        let data_offset = (header_size + metadata.len()).next_multiple_of(16);
        let file_size = data_offset + data.len();
        if v >= 22 {
            out.extend_from_slice(&[0u8; 8]);
            out.extend_from_slice(&v.to_be_bytes());
            out.extend_from_slice(&[0u8; 4]);
            out.extend_from_slice(&[endian_byte, 0, 0, 0]);
            out.extend_from_slice(&(metadata.len() as u32).to_be_bytes());
            out.extend_from_slice(&(file_size as i64).to_be_bytes());
            out.extend_from_slice(&(data_offset as i64).to_be_bytes());
            out.extend_from_slice(&[0u8; 8]);
        } else {
            out.extend_from_slice(&(metadata.len() as u32).to_be_bytes());
            out.extend_from_slice(&(file_size as u32).to_be_bytes());
            out.extend_from_slice(&v.to_be_bytes());
            out.extend_from_slice(&(data_offset as u32).to_be_bytes());
            out.extend_from_slice(&[endian_byte, 0, 0, 0]);
        }
        out.extend_from_slice(&metadata);
        out.resize(data_offset, 0);
        out.extend_from_slice(&data);
        out
    }
}
