use std::path::PathBuf;

use exom::{
    builder::Builder,
    dom::{DocumentRef, Node},
    serializer::{LineSeparator, Serializer},
};

const ENCODINGS: &[&str] = &[
    "UTF-8",
    "UTF-16",
    "UTF-16LE",
    "UTF-16BE",
    "ISO-10646-UCS-4",
    "ISO-10646-UCS-2",
    "US-ASCII",
    "ISO-8859-1",
    "ISO-8859-2",
    "ISO-8859-5",
    "ISO-8859-7",
    "IBM037",
    "windows-1252",
    "KOI8-R",
    "Shift_JIS",
    "EUC-JP",
    "ISO-2022-JP",
    "Big5",
    "GB18030",
];

fn resources() -> Vec<PathBuf> {
    let pattern = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/resources/*.xml");
    let files = glob::glob(pattern)
        .unwrap()
        .collect::<Result<Vec<_>, _>>()
        .unwrap();
    assert!(!files.is_empty(), "no test documents under {pattern}");
    files
}

fn serialize(
    doc: &DocumentRef,
    encoding: &str,
    configure: impl FnOnce(&mut Serializer<Vec<u8>>),
) -> Vec<u8> {
    let mut serializer = Serializer::with_encoding(vec![], encoding).unwrap();
    configure(&mut serializer);
    serializer.write_document(doc).unwrap();
    serializer.into_inner().unwrap()
}

#[test]
fn documents_survive_every_encoding() {
    for path in resources() {
        let original = Builder::new().build_file(&path).unwrap();
        let expected = original.to_xml();
        for &encoding in ENCODINGS {
            let bytes = serialize(&original, encoding, |_| {});
            let reread = Builder::new()
                .build_bytes(&bytes)
                .unwrap_or_else(|err| panic!("{} in {encoding}: {err}", path.display()));
            assert_eq!(reread.to_xml(), expected, "{} in {encoding}", path.display());
        }
    }
}

#[test]
fn line_separators_are_read_back_as_line_feeds() {
    for path in resources() {
        let original = Builder::new().build_file(&path).unwrap();
        for separator in [LineSeparator::Cr, LineSeparator::CrLf] {
            let bytes = serialize(&original, "UTF-8", |s| s.set_line_separator(Some(separator)));
            let reread = Builder::new().build_bytes(&bytes).unwrap();
            assert_eq!(reread.to_xml(), original.to_xml(), "{}", path.display());
        }
    }
}

#[test]
fn indentation_only_adds_white_space() {
    let squeeze = |text: String| text.split_whitespace().collect::<String>();
    for path in resources() {
        let original = Builder::new().build_file(&path).unwrap();
        let pretty = serialize(&original, "UTF-8", |s| s.set_indent(2));
        let reread = Builder::new().build_bytes(&pretty).unwrap();
        assert_eq!(
            squeeze(reread.value()),
            squeeze(original.value()),
            "{}",
            path.display()
        );
        assert_eq!(reread.child_count(), original.child_count());
    }
}

#[test]
fn copies_serialize_like_their_originals() {
    for path in resources() {
        let original = Builder::new().build_file(&path).unwrap();
        let copy = original.copy();
        assert_eq!(
            serialize(&copy, "UTF-8", |_| {}),
            serialize(&original, "UTF-8", |_| {})
        );
        assert_eq!(copy.value(), original.value());
    }
}
