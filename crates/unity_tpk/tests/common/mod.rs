#![allow(dead_code)]

use binrw::Endian;
use byteorder::{LittleEndian, WriteBytesExt};
use indexmap::IndexMap;
use std::io::Write;
use unity_serialized::stream::EndianWriter;
use unity_serialized::Value;
use unity_version::EngineVersion;

pub const TEXT_ASSET: i32 = 49;
pub const ALIGN_BYTES: u32 = 0x4000;

pub fn version(text: &str) -> EngineVersion {
    EngineVersion::parse(text).unwrap()
}

pub struct TestNode {
    pub type_name: u16,
    pub name: u16,
    pub byte_size: i32,
    pub meta_flag: u32,
    pub type_flags: u8,
    pub children: Vec<u16>,
}

pub struct TestClass {
    pub name: u16,
    pub base: u16,
    pub flags: u8,
    pub editor_root: Option<u16>,
    pub release_root: Option<u16>,
}

/// Builds the payload and header of a TPK resource
#[derive(Default)]
pub struct TestTpk {
    pub versions: Vec<EngineVersion>,
    pub classes: Vec<(i32, Vec<(EngineVersion, Option<TestClass>)>)>,
    pub common_counts: Vec<(EngineVersion, u8)>,
    pub common_indices: Vec<u16>,
    pub nodes: Vec<TestNode>,
    pub strings: Vec<String>,
}

impl TestTpk {
    pub fn string(&mut self, value: &str) -> u16 {
        match self.strings.iter().position(|s| s == value) {
            Some(position) => position as u16,
            None => {
                self.strings.push(value.to_owned());
                (self.strings.len() - 1) as u16
            }
        }
    }

    pub fn node(&mut self, type_name: &str, name: &str, byte_size: i32, children: Vec<u16>) -> u16 {
        let type_name = self.string(type_name);
        let name = self.string(name);
        self.nodes.push(TestNode {
            type_name,
            name,
            byte_size,
            meta_flag: 0,
            type_flags: 0,
            children,
        });
        (self.nodes.len() - 1) as u16
    }

    pub fn string_node(&mut self, name: &str) -> u16 {
        let size = self.node("int", "size", 4, vec![]);
        let data = self.node("char", "data", 1, vec![]);
        let array = self.node("Array", "Array", -1, vec![size, data]);
        self.nodes[array as usize].meta_flag = ALIGN_BYTES;
        self.nodes[array as usize].type_flags = 1;
        self.node("string", name, -1, vec![array])
    }

    /// `TextAsset` with the named string fields
    pub fn text_asset_node(&mut self, fields: &[&str]) -> u16 {
        let children = fields.iter().map(|field| self.string_node(field)).collect();
        self.node("TextAsset", "Base", -1, children)
    }

    pub fn class(&mut self, class_id: i32, version: &str, release_root: Option<u16>) {
        let name = self.string("TextAsset");
        let base = self.string("NamedObject");
        let entry = release_root.map(|root| TestClass {
            name,
            base,
            flags: 0x80,
            editor_root: None,
            release_root: Some(root),
        });
        let version = self::version(version);
        if !self.versions.contains(&version) {
            self.versions.push(version);
        }
        match self.classes.iter_mut().find(|(id, _)| *id == class_id) {
            Some((_, entries)) => entries.push((version, entry)),
            None => self.classes.push((class_id, vec![(version, entry)])),
        }
    }

    pub fn payload(&self) -> Vec<u8> {
        let mut w = Vec::new();
        w.write_i64::<LittleEndian>(638_000_000_000_000_000).unwrap();

        w.write_i32::<LittleEndian>(self.versions.len() as i32).unwrap();
        for version in &self.versions {
            w.write_u64::<LittleEndian>(version.to_packed()).unwrap();
        }

        w.write_i32::<LittleEndian>(self.classes.len() as i32).unwrap();
        for (class_id, entries) in &self.classes {
            w.write_i32::<LittleEndian>(*class_id).unwrap();
            w.write_i32::<LittleEndian>(entries.len() as i32).unwrap();
            for (version, class) in entries {
                w.write_u64::<LittleEndian>(version.to_packed()).unwrap();
                w.write_u8(class.is_some() as u8).unwrap();
                if let Some(class) = class {
                    w.write_u16::<LittleEndian>(class.name).unwrap();
                    w.write_u16::<LittleEndian>(class.base).unwrap();
                    w.write_u8(class.flags).unwrap();
                    if let Some(root) = class.editor_root {
                        w.write_u16::<LittleEndian>(root).unwrap();
                    }
                    if let Some(root) = class.release_root {
                        w.write_u16::<LittleEndian>(root).unwrap();
                    }
                }
            }
        }

        w.write_i32::<LittleEndian>(self.common_counts.len() as i32).unwrap();
        for (version, count) in &self.common_counts {
            w.write_u64::<LittleEndian>(version.to_packed()).unwrap();
            w.write_u8(*count).unwrap();
        }
        w.write_i32::<LittleEndian>(self.common_indices.len() as i32).unwrap();
        for index in &self.common_indices {
            w.write_u16::<LittleEndian>(*index).unwrap();
        }

        w.write_i32::<LittleEndian>(self.nodes.len() as i32).unwrap();
        for node in &self.nodes {
            w.write_u16::<LittleEndian>(node.type_name).unwrap();
            w.write_u16::<LittleEndian>(node.name).unwrap();
            w.write_i32::<LittleEndian>(node.byte_size).unwrap();
            w.write_i16::<LittleEndian>(1).unwrap();
            w.write_u8(node.type_flags).unwrap();
            w.write_u32::<LittleEndian>(node.meta_flag).unwrap();
            w.write_u16::<LittleEndian>(node.children.len() as u16).unwrap();
            for child in &node.children {
                w.write_u16::<LittleEndian>(*child).unwrap();
            }
        }

        w.write_i32::<LittleEndian>(self.strings.len() as i32).unwrap();
        for string in &self.strings {
            // Test strings stay below 128 bytes
            w.write_u8(string.len() as u8).unwrap();
            w.write_all(string.as_bytes()).unwrap();
        }
        w
    }

    /// Header plus payload, stored with the given compression
    pub fn build(&self, compression: u8) -> Vec<u8> {
        let payload = self.payload();
        let stored = match compression {
            0 => payload.clone(),
            1 => lz4_flex::block::compress(&payload),
            other => panic!("no test encoder for compression {other}"),
        };
        let mut out = b"TPK*".to_vec();
        out.extend_from_slice(&[1, compression, 0, 0]);
        out.extend_from_slice(&0u32.to_le_bytes());
        out.extend_from_slice(&(stored.len() as u32).to_le_bytes());
        out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        out.extend_from_slice(&stored);
        out
    }
}

/// `TextAsset` at 1.0 with a name, 2.0 adding the script, 3.0 adding the path, removed in 4.0
pub fn text_asset_history() -> TestTpk {
    let mut tpk = TestTpk::default();
    let first = tpk.text_asset_node(&["m_Name"]);
    tpk.class(TEXT_ASSET, "1.0.0f1", Some(first));
    let second = tpk.text_asset_node(&["m_Name", "m_Script"]);
    tpk.class(TEXT_ASSET, "2.0.0f1", Some(second));
    let third = tpk.text_asset_node(&["m_Name", "m_Script", "m_PathName"]);
    tpk.class(TEXT_ASSET, "3.0.0f1", Some(third));
    tpk.class(TEXT_ASSET, "4.0.0f1", None);
    tpk
}

pub fn text_asset(name: &str, script: &str) -> Value {
    let mut fields = IndexMap::new();
    fields.insert("m_Name".to_owned(), Value::String(name.into()));
    fields.insert("m_Script".to_owned(), Value::String(script.into()));
    Value::Object(fields)
}

/// A little endian format 17 serialized file without TypeTrees holding `TextAsset` objects
pub fn stripped_file(engine_version: &str, objects: &[(i64, Vec<u8>)]) -> Vec<u8> {
    let mut data = Vec::new();
    let mut starts = Vec::new();
    for (_, bytes) in objects {
        data.resize(data.len().next_multiple_of(8), 0);
        starts.push(data.len() as u32);
        data.extend_from_slice(bytes);
    }

    let header_size = 20;
    let mut w = EndianWriter::new(Endian::Little);
    w.write_cstring(engine_version.as_bytes());
    w.write_i32(19);
    w.write_bool(false);
    w.write_i32(1);
    w.write_i32(TEXT_ASSET);
    w.write_bool(false);
    w.write_i16(-1);
    w.write_bytes(&[0xAB; 16]);
    w.write_i32(objects.len() as i32);
    for ((path_id, bytes), start) in objects.iter().zip(&starts) {
        // Alignment counts from the start of the file
        while (header_size + w.position()) % 4 != 0 {
            w.write_u8(0);
        }
        w.write_i64(*path_id);
        w.write_u32(*start);
        w.write_u32(bytes.len() as u32);
        w.write_i32(0);
    }
    w.write_i32(0);
    w.write_i32(0);
    w.write_cstring(b"");
    let metadata = w.into_inner();

    let data_offset = (header_size + metadata.len()).next_multiple_of(16);
    let mut out = Vec::new();
    out.extend_from_slice(&(metadata.len() as u32).to_be_bytes());
    out.extend_from_slice(&((data_offset + data.len()) as u32).to_be_bytes());
    out.extend_from_slice(&17u32.to_be_bytes());
    out.extend_from_slice(&(data_offset as u32).to_be_bytes());
    out.extend_from_slice(&[0, 0, 0, 0]);
    out.extend_from_slice(&metadata);
    out.resize(data_offset, 0);
    out.extend_from_slice(&data);
    out
}
