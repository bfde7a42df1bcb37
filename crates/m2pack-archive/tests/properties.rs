use m2pack_archive::codec;
use m2pack_archive::{FileList, PackArchive, PackVersion, PackWriter, KEY_COUNT};
use proptest::prelude::*;
use proptest::test_runner::TestCaseError;

fn pack_version() -> impl Strategy<Value = PackVersion> {
    prop_oneof![
        Just(PackVersion::Ms2f),
        Just(PackVersion::Ns2f),
        Just(PackVersion::Os2f),
        Just(PackVersion::Ps2f),
    ]
}

/// Mix of incompressible and highly compressible payloads.
fn payload() -> impl Strategy<Value = Vec<u8>> {
    prop_oneof![
        prop::collection::vec(any::<u8>(), 0..2048),
        (any::<u8>(), 0usize..4096).prop_map(|(byte, len)| vec![byte; len]),
    ]
}

/// Relative paths the file list can carry.
fn archive_path() -> impl Strategy<Value = String> {
    prop::collection::vec("[A-Za-z0-9_ .-]{1,12}", 1..4).prop_map(|parts| parts.join("/"))
}

proptest! {
    /// Any payload decodes back to itself.
    #[test]
    fn codec_round_trip(data in payload(), version in pack_version(), compress in any::<bool>()) {
        let encoded = codec::encode(version, &data, compress).map_err(|e| TestCaseError::fail(e.to_string()))?;
        prop_assert!(encoded.compressed_size <= encoded.size);
        prop_assert_eq!(encoded.encoded_size, encoded.data.len() as u64);

        let decoded = codec::decode(version, &encoded.data, encoded.compressed_size, encoded.size)
            .map_err(|e| TestCaseError::fail(e.to_string()))?;
        prop_assert_eq!(decoded, data);
    }

    /// Encoding the same input twice gives the same bytes.
    #[test]
    fn encoding_is_deterministic(data in payload(), version in pack_version()) {
        let first = codec::encode(version, &data, true).map_err(|e| TestCaseError::fail(e.to_string()))?;
        let second = codec::encode(version, &data, true).map_err(|e| TestCaseError::fail(e.to_string()))?;
        prop_assert_eq!(first, second);
    }

    /// Sizes congruent modulo the table length select the same pair.
    #[test]
    fn key_selection_wraps(size in 0u64..1_000_000, version in pack_version()) {
        let wrapped = size + KEY_COUNT as u64;
        prop_assert_eq!(version.key_pair(size), version.key_pair(wrapped));
    }

    /// File list text parses back to the same mapping.
    #[test]
    fn file_list_round_trip(paths in prop::collection::vec(archive_path(), 0..32)) {
        let mut list = FileList::new();
        for (i, path) in paths.iter().enumerate() {
            list.insert(i as u64 + 1, path.clone()).map_err(|e| TestCaseError::fail(e.to_string()))?;
        }

        let parsed = FileList::parse(list.to_text().as_bytes()).map_err(|e| TestCaseError::fail(e.to_string()))?;
        prop_assert!(parsed.is_dense(paths.len() as u64));
        prop_assert_eq!(parsed, list);
    }

    /// Whole archives built by the writer open and decode every file.
    #[test]
    fn archive_round_trip(
        files in prop::collection::vec((archive_path(), payload()), 0..12),
        version in pack_version()
    ) {
        let mut writer = PackWriter::new(version, Vec::new());
        for (path, data) in &files {
            writer.add_file(path, data).map_err(|e| TestCaseError::fail(e.to_string()))?;
        }
        let (header, data) = writer.finish().map_err(|e| TestCaseError::fail(e.to_string()))?;

        let archive = PackArchive::from_bytes(&header, data).map_err(|e| TestCaseError::fail(e.to_string()))?;
        prop_assert_eq!(archive.entry_count(), files.len());

        for (entry, (path, expected)) in archive.iter().zip(&files) {
            prop_assert_eq!(&entry.name, path);
            let decoded = archive.read(entry).map_err(|e| TestCaseError::fail(e.to_string()))?;
            prop_assert_eq!(&decoded, expected);
        }
    }

    /// Any magic other than the four known ones is rejected.
    #[test]
    fn unknown_magic_rejected(
        magic in prop::array::uniform4(any::<u8>())
            .prop_filter("known magic", |m| PackVersion::from_magic(*m).is_err())
    ) {
        let mut header = magic.to_vec();
        header.extend_from_slice(&[0u8; 64]);
        let rejected = matches!(
            PackArchive::from_bytes(&header, Vec::new()),
            Err(m2pack_archive::Error::UnknownFormat(_))
        );
        prop_assert!(rejected);
    }
}
