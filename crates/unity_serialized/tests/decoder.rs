mod common;

use binrw::Endian;
use common::{component, component_tree, text_asset, TestFile, COMPONENT};
use pretty_assertions::assert_eq;
use std::sync::Arc;
use tracing_test::traced_test;
use unity_serialized::error::{Error, Result};
use unity_serialized::{
    DecodePolicy, DecodedObject, ObjectDecoder, SchemaSource, SerializedFile, TypeTreeNode,
};
use unity_version::EngineVersion;

/// A file whose second object is cut short
fn damaged() -> SerializedFile {
    let bytes = TestFile::new(17, Endian::Little)
        .object(1, 0, &text_asset("fine", "data"))
        .raw_object(2, 0, vec![0x10, 0x00, 0x00, 0x00, b'a'])
        .object(3, 0, &text_asset("also fine", ""))
        .build();
    SerializedFile::from_bytes(bytes).unwrap()
}

#[test]
fn strict_policy_keeps_decoding() {
    let file = damaged();
    let mut decoder = ObjectDecoder::new(&file);

    assert!(decoder.decode_path_id(1).unwrap().value().is_some());
    match decoder.decode_path_id(2) {
        Err(Error::DecodeUnderrun { path, .. }) => assert_eq!(path, "Base/m_Name"),
        other => panic!("expected an underrun, got {other:?}"),
    }
    assert!(!decoder.is_disabled());
    assert_eq!(
        decoder.decode_path_id(3).unwrap().value(),
        Some(&text_asset("also fine", ""))
    );
}

#[traced_test]
#[test]
fn disable_on_underrun_returns_raw_bytes() {
    let file = damaged();
    let mut decoder = ObjectDecoder::new(&file).with_policy(DecodePolicy::DisableOnUnderrun);

    assert!(decoder.decode_path_id(1).unwrap().value().is_some());
    assert!(matches!(
        decoder.decode_path_id(2),
        Err(Error::DecodeUnderrun { .. })
    ));
    assert!(decoder.is_disabled());
    assert!(logs_contain("returning raw bytes"));

    let info = file.object(3).unwrap();
    assert_eq!(
        decoder.decode(info).unwrap(),
        DecodedObject::Raw(file.object_data(info).unwrap().to_vec())
    );
}

struct Schemas;

impl SchemaSource for Schemas {
    fn schema(&self, class_id: i32, version: &EngineVersion) -> Result<Arc<TypeTreeNode>> {
        match class_id {
            COMPONENT => Ok(Arc::new(component_tree())),
            _ => Err(Error::UnknownClassForVersion {
                class_id,
                version: version.to_string(),
            }),
        }
    }
}

#[test]
fn schema_source_for_stripped_files() {
    let bytes = TestFile::new(17, Endian::Little)
        .object(1, 1, &component(0, 0, 77))
        .object(2, 0, &text_asset("no schema", ""))
        .without_type_trees()
        .build();
    let file = SerializedFile::from_bytes(bytes).unwrap();
    assert!(!file.has_type_trees());

    let mut decoder = ObjectDecoder::new(&file);
    assert!(matches!(
        decoder.decode_path_id(1),
        Err(Error::MissingSchema(COMPONENT))
    ));

    let mut decoder = ObjectDecoder::new(&file).with_source(&Schemas);
    assert_eq!(
        decoder.decode_path_id(1).unwrap().value(),
        Some(&component(0, 0, 77))
    );
    assert!(matches!(
        decoder.decode_path_id(2),
        Err(Error::UnknownClassForVersion { class_id: 49, .. })
    ));
}
