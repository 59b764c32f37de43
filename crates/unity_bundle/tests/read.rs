mod common;

use common::{unity_fs, unity_raw, TestBlock};
use pretty_assertions::assert_eq;
use std::io::Read;
use tracing_test::traced_test;
use unity_bundle::{error::Error, BundleArchive, Container};

fn sequence(len: usize, start: u8) -> Vec<u8> {
    (0..len).map(|i| start.wrapping_add(i as u8)).collect()
}

#[traced_test]
#[test]
fn blocks_are_concatenated_before_slicing() -> Result<(), Error> {
    let first = sequence(10, 0);
    let second = sequence(20, 10);
    let third = sequence(5, 30);

    let bytes = unity_fs(
        0,
        &[
            TestBlock::plain(&first),
            TestBlock::plain(&second),
            TestBlock::plain(&third),
        ],
        &[(0, 15, 4, "CAB-first"), (15, 20, 0, "CAB-first.resS")],
    );

    let bundle = BundleArchive::from_bytes(&bytes)?;
    assert_eq!(bundle.len(), 2);
    assert_eq!(bundle.blocks().len(), 3);
    assert_eq!(
        bundle.file_names().collect::<Vec<_>>(),
        vec!["CAB-first", "CAB-first.resS"]
    );

    let entry = bundle.by_index(0)?;
    assert_eq!(entry.data(), sequence(15, 0).as_slice());
    assert!(entry.is_serialized_file());

    let mut resource = bundle.by_name("CAB-first.resS")?;
    assert!(!resource.is_serialized_file());
    let mut actual = Vec::new();
    resource.read_to_end(&mut actual)?;
    assert_eq!(actual, sequence(20, 15));

    Ok(())
}

#[traced_test]
#[test]
fn lz4_directory_and_blocks() -> Result<(), Error> {
    let payload = b"Hello World Hello World Hello World Hello World".repeat(4);
    let bytes = unity_fs(
        0x43,
        &[TestBlock::lz4(&payload)],
        &[(0, payload.len() as i64, 4, "CAB-lz4")],
    );

    let bundle = BundleArchive::from_bytes(&bytes)?;
    assert_eq!(bundle.format_version(), 6);
    assert_eq!(bundle.engine_version_text(), "2019.4.0f1");
    assert_eq!(bundle.by_name("CAB-lz4")?.data(), payload.as_slice());

    Ok(())
}

#[traced_test]
#[test]
fn directory_at_end_of_file() -> Result<(), Error> {
    let payload = sequence(32, 7);
    let bytes = unity_fs(
        0x80,
        &[TestBlock::plain(&payload)],
        &[(0, 32, 4, "CAB-end")],
    );

    let bundle = BundleArchive::from_bytes(&bytes)?;
    assert!(bundle.flags().is_some_and(|flags| flags.directory_at_end()));
    assert_eq!(bundle.by_index(0)?.data(), payload.as_slice());

    Ok(())
}

#[test]
fn unknown_block_compression_is_rejected() {
    let mut block = TestBlock::plain(b"data");
    block.flags = 0x05;
    let bytes = unity_fs(0, &[block], &[(0, 4, 0, "file")]);

    assert!(matches!(
        BundleArchive::from_bytes(&bytes),
        Err(Error::UnsupportedCompression(_))
    ));
}

#[test]
fn entry_past_data_is_corrupt() {
    let bytes = unity_fs(0, &[TestBlock::plain(b"data")], &[(2, 10, 0, "file")]);

    assert!(matches!(
        BundleArchive::from_bytes(&bytes),
        Err(Error::CorruptStructure(_))
    ));
}

#[test]
fn duplicate_entry_name_is_corrupt() {
    let bytes = unity_fs(
        0,
        &[TestBlock::plain(&sequence(8, 0))],
        &[(0, 4, 4, "CAB-dup"), (4, 4, 4, "CAB-dup")],
    );

    match BundleArchive::from_bytes(&bytes) {
        Err(Error::CorruptStructure(message)) => assert!(message.contains("CAB-dup")),
        other => panic!("expected a corrupt structure, got {other:?}"),
    }
}

#[test]
fn truncated_block_data_is_corrupt() {
    let mut bytes = unity_fs(0, &[TestBlock::plain(&sequence(64, 0))], &[(0, 64, 0, "file")]);
    bytes.truncate(bytes.len() - 10);

    assert!(matches!(
        BundleArchive::from_bytes(&bytes),
        Err(Error::CorruptStructure(_))
    ));
}

#[test]
fn absurd_block_count_is_corrupt() {
    let mut bytes = unity_fs(0, &[], &[]);
    // The block count follows the 16 byte hash at the start of the directory
    let directory_start = bytes.len() - 24;
    bytes[directory_start + 16..directory_start + 20].copy_from_slice(&0x7FFF_FFFFi32.to_be_bytes());

    assert!(matches!(
        BundleArchive::from_bytes(&bytes),
        Err(Error::CorruptStructure(_))
    ));
}

#[test]
fn unrecognized_signature() {
    assert!(matches!(
        BundleArchive::from_bytes(b"NotABundle\0\0\0\0\0\0"),
        Err(Error::UnrecognizedFormat(_))
    ));
    assert!(matches!(
        Container::from_bytes(b"PK\x03\x04 definitely a zip"),
        Err(Error::UnrecognizedFormat(_))
    ));
}

#[traced_test]
#[test]
fn legacy_raw_bundle() -> Result<(), Error> {
    let bytes = unity_raw(&[("CAB-one", b"first file"), ("CAB-two", b"second")]);

    let bundle = BundleArchive::from_bytes(&bytes)?;
    assert_eq!(bundle.format_version(), 3);
    assert!(bundle.flags().is_none());
    assert_eq!(bundle.by_name("CAB-one")?.data(), b"first file");
    assert_eq!(bundle.by_name("CAB-two")?.data(), b"second");

    let container = Container::from_bytes(&bytes)?;
    assert_eq!(container.len(), 2);

    Ok(())
}

#[test]
fn missing_file() -> Result<(), Error> {
    let bytes = unity_fs(0, &[], &[]);
    let bundle = BundleArchive::from_bytes(&bytes)?;
    assert!(bundle.is_empty());
    assert!(matches!(bundle.by_index(0), Err(Error::FileNotFound(_))));
    assert!(matches!(bundle.by_name("CAB-x"), Err(Error::FileNotFound(_))));
    Ok(())
}
