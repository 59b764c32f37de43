mod common;

use binrw::Endian;
use common::{stripped_file, text_asset, text_asset_history, version, TestTpk, TEXT_ASSET};
use pretty_assertions::assert_eq;
use std::sync::Arc;
use tracing_test::traced_test;
use unity_bundle::compression::DefaultDecompressor;
use unity_serialized::stream::EndianWriter;
use unity_serialized::{ObjectDecoder, SchemaSource, SerializedFile};
use unity_tpk::error::Error;
use unity_tpk::{DictionaryOptions, RootKind, SchemaDictionary};

fn field_names(dictionary: &SchemaDictionary, at: &str) -> Vec<String> {
    dictionary
        .schema(TEXT_ASSET, &version(at))
        .unwrap()
        .children
        .iter()
        .map(|child| child.name.clone())
        .collect()
}

#[test]
fn version_floor_lookup() {
    let dictionary = SchemaDictionary::from_bytes(&text_asset_history().build(0)).unwrap();
    assert_eq!(dictionary.versions().len(), 4);

    assert_eq!(field_names(&dictionary, "1.0.0f1"), ["m_Name"]);
    assert_eq!(field_names(&dictionary, "2.5.1f1"), ["m_Name", "m_Script"]);
    assert_eq!(
        field_names(&dictionary, "3.0.0f1"),
        ["m_Name", "m_Script", "m_PathName"]
    );
    assert_eq!(
        dictionary.class_name(TEXT_ASSET, &version("3.9.0f1")).unwrap(),
        "TextAsset"
    );

    assert!(matches!(
        dictionary.schema(TEXT_ASSET, &version("0.5.0f1")),
        Err(Error::UnknownClassForVersion { class_id: 49, .. })
    ));
    assert!(matches!(
        dictionary.schema(1, &version("2.0.0f1")),
        Err(Error::UnknownClassForVersion { class_id: 1, .. })
    ));
}

#[test]
fn removed_class_is_unknown() {
    let dictionary = SchemaDictionary::from_bytes(&text_asset_history().build(0)).unwrap();
    assert!(matches!(
        dictionary.schema(TEXT_ASSET, &version("4.0.0f1")),
        Err(Error::UnknownClassForVersion { .. })
    ));
    assert!(dictionary.class(TEXT_ASSET, &version("2020.1.0f1")).is_err());
}

#[test]
fn materialized_tree_shape() {
    let dictionary = SchemaDictionary::from_bytes(&text_asset_history().build(0)).unwrap();
    let schema = dictionary.schema(TEXT_ASSET, &version("1.0.0f1")).unwrap();

    let flat = schema.flatten();
    let shape = flat
        .iter()
        .map(|node| (node.level, node.index, node.type_name.as_str(), node.name.as_str()))
        .collect::<Vec<_>>();
    #[rustfmt::skip]
    assert_eq!(shape, [
        (0, 0, "TextAsset", "Base"),
        (1, 1, "string", "m_Name"),
        (2, 2, "Array", "Array"),
        (3, 3, "int", "size"),
        (3, 4, "char", "data"),
    ]);
    assert!(flat[2].is_aligned());
    assert_eq!(flat[2].type_flags, 1);
}

#[test]
fn lookups_are_memoized() {
    let dictionary = SchemaDictionary::from_bytes(&text_asset_history().build(0)).unwrap();
    let first = dictionary.schema(TEXT_ASSET, &version("2.1.0f1")).unwrap();
    let again = dictionary.schema(TEXT_ASSET, &version("2.1.0f1")).unwrap();
    assert!(Arc::ptr_eq(&first, &again));

    // Memoized per exact version, equal content for the same entry
    let other = dictionary.schema(TEXT_ASSET, &version("2.2.0f1")).unwrap();
    assert!(!Arc::ptr_eq(&first, &other));
    assert_eq!(first, other);
}

#[traced_test]
#[test]
fn lz4_payload() {
    let tpk = text_asset_history();
    let dictionary = SchemaDictionary::from_bytes(&tpk.build(1)).unwrap();
    assert!(logs_contain("compression=Lz4"));
    assert_eq!(dictionary.blob().strings, tpk.strings);
    assert_eq!(field_names(&dictionary, "2.0.0f1"), ["m_Name", "m_Script"]);
}

#[test]
fn editor_root_on_request() {
    let dictionary = SchemaDictionary::from_bytes_with(
        &text_asset_history().build(0),
        DictionaryOptions::builder().root(RootKind::Editor).build(),
        &DefaultDecompressor,
    )
    .unwrap();
    // Only release schemas are stored
    assert!(dictionary.class(TEXT_ASSET, &version("2.0.0f1")).is_ok());
    assert!(matches!(
        dictionary.schema(TEXT_ASSET, &version("2.0.0f1")),
        Err(Error::UnknownClassForVersion { .. })
    ));
}

#[test]
fn bad_header() {
    let mut data = text_asset_history().build(0);
    data[0] = b'X';
    assert!(matches!(
        SchemaDictionary::from_bytes(&data),
        Err(Error::UnrecognizedFormat(_))
    ));

    let mut data = text_asset_history().build(0);
    data[4] = 2;
    assert!(matches!(
        SchemaDictionary::from_bytes(&data),
        Err(Error::UnsupportedVersion(2))
    ));

    let mut data = text_asset_history().build(0);
    data[5] = 9;
    assert!(matches!(
        SchemaDictionary::from_bytes(&data),
        Err(Error::UnsupportedCompression(9))
    ));

    let mut data = text_asset_history().build(0);
    data[6] = 1;
    assert!(matches!(
        SchemaDictionary::from_bytes(&data),
        Err(Error::UnsupportedDataType(1))
    ));

    let data = text_asset_history().build(0);
    assert!(matches!(
        SchemaDictionary::from_bytes(&data[..data.len() - 1]),
        Err(Error::CorruptStructure(_))
    ));
}

#[test]
fn cyclic_nodes_are_corrupt() {
    let mut tpk = TestTpk::default();
    let leaf = tpk.node("int", "m_Value", 4, vec![]);
    let root = tpk.node("Loop", "Base", -1, vec![leaf]);
    // Point the leaf back at the root
    tpk.nodes[leaf as usize].children.push(root);
    tpk.class(TEXT_ASSET, "1.0.0f1", Some(root));

    let dictionary = SchemaDictionary::from_bytes(&tpk.build(0)).unwrap();
    match dictionary.schema(TEXT_ASSET, &version("1.0.0f1")) {
        Err(Error::CorruptStructure(message)) => assert!(message.contains("contains itself")),
        other => panic!("expected a corrupt structure, got {other:?}"),
    }
}

#[test]
fn shared_nodes_are_not_cycles() {
    let mut tpk = TestTpk::default();
    let leaf = tpk.node("float", "x", 4, vec![]);
    let root = tpk.node("Pair", "Base", -1, vec![leaf, leaf]);
    tpk.class(TEXT_ASSET, "1.0.0f1", Some(root));

    let dictionary = SchemaDictionary::from_bytes(&tpk.build(0)).unwrap();
    let schema = dictionary.schema(TEXT_ASSET, &version("1.0.0f1")).unwrap();
    assert_eq!(schema.children.len(), 2);
    assert_eq!(schema.children[1].index, 2);
}

#[test]
fn dangling_node_index_is_corrupt() {
    let mut tpk = TestTpk::default();
    let root = tpk.node("Broken", "Base", -1, vec![40]);
    tpk.class(TEXT_ASSET, "1.0.0f1", Some(root));

    let dictionary = SchemaDictionary::from_bytes(&tpk.build(0)).unwrap();
    assert!(matches!(
        dictionary.schema(TEXT_ASSET, &version("1.0.0f1")),
        Err(Error::CorruptStructure(_))
    ));
}

#[test]
fn descending_class_versions_are_corrupt() {
    let mut tpk = TestTpk::default();
    let root = tpk.text_asset_node(&["m_Name"]);
    tpk.class(TEXT_ASSET, "2.0.0f1", Some(root));
    tpk.class(TEXT_ASSET, "1.0.0f1", Some(root));
    assert!(matches!(
        SchemaDictionary::from_bytes(&tpk.build(0)),
        Err(Error::CorruptStructure(_))
    ));
}

#[test]
fn common_strings_per_version() {
    let mut tpk = TestTpk::default();
    let strings = ["AABB", "Array", "Base"].map(|s| tpk.string(s));
    tpk.common_indices = strings.to_vec();
    tpk.common_counts = vec![(version("5.0.0f1"), 2), (version("2019.1.0f1"), 3)];

    let dictionary = SchemaDictionary::from_bytes(&tpk.build(0)).unwrap();
    assert!(dictionary.common_strings(&version("4.0.0f1")).unwrap().is_empty());

    let table = dictionary.common_strings(&version("2018.4.0f1")).unwrap();
    assert_eq!(table.get(0).unwrap(), "AABB");
    assert_eq!(table.get(5).unwrap(), "Array");
    assert_eq!(table.offset_of("Base"), None);

    let table = dictionary.common_strings(&version("2019.4.0f1")).unwrap();
    assert_eq!(table.offset_of("Base"), Some(11));
}

#[test]
fn decodes_stripped_files() {
    let dictionary = SchemaDictionary::from_bytes(&text_asset_history().build(0)).unwrap();
    let schema = dictionary.schema(TEXT_ASSET, &version("2.5.0f1")).unwrap();

    let value = text_asset("notes", "hello");
    let mut writer = EndianWriter::new(Endian::Little);
    unity_serialized::write_value(&value, &schema, &mut writer).unwrap();

    let bytes = stripped_file("2.5.0f1", &[(1, writer.into_inner())]);
    let file = SerializedFile::from_bytes(bytes).unwrap();
    assert!(!file.has_type_trees());

    let mut decoder = ObjectDecoder::new(&file).with_source(&dictionary);
    assert_eq!(decoder.decode_path_id(1).unwrap().value(), Some(&value));

    // The trait lookup shares the memoized schema
    let shared = SchemaSource::schema(&dictionary, TEXT_ASSET, &version("2.5.0f1")).unwrap();
    assert!(Arc::ptr_eq(&schema, &shared));
    assert!(matches!(
        SchemaSource::schema(&dictionary, TEXT_ASSET, &version("0.1.0f1")),
        Err(unity_serialized::error::Error::UnknownClassForVersion { class_id: 49, .. })
    ));
}
