use std::collections::BTreeMap;
use std::fs;
use std::io::Cursor;
use vntl_core::read::opened::Opened;
use vntl_core::{PackParams, Version, pack, unpack, unpack_with_key};

fn source() -> tempfile::TempDir {
    let tmp = tempfile::tempdir().unwrap();
    fs::create_dir_all(tmp.path().join("images/bg")).unwrap();
    fs::write(tmp.path().join("script.rpy"), "label start:\n    \"Hello.\"\n").unwrap();
    fs::write(tmp.path().join("images/bg/room.png"), [0x89u8, b'P', b'N', b'G', 0, 1, 2]).unwrap();
    fs::write(tmp.path().join("empty.txt"), "").unwrap();
    tmp
}

fn on_disk(root: &std::path::Path) -> BTreeMap<String, Vec<u8>> {
    walkdir::WalkDir::new(root)
        .into_iter()
        .map(|e| e.unwrap())
        .filter(|e| e.file_type().is_file())
        .map(|e| {
            let rel = e.path().strip_prefix(root).unwrap();
            let name = rel
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect::<Vec<_>>()
                .join("/");
            (name, fs::read(e.path()).unwrap())
        })
        .collect()
}

#[test]
fn round_trip_v2_and_v3_without_key() {
    let src = source();
    let expected = on_disk(src.path());
    for version in [2u8, 3] {
        let params = PackParams::new(version, "out.rpa", None, 0).unwrap();
        let bytes = pack(src.path(), &params).unwrap();
        let got: BTreeMap<_, _> = unpack(&bytes).unwrap().into_iter().collect();
        assert_eq!(got, expected, "version {version}");

        let arc = Opened::open(Cursor::new(&bytes)).unwrap();
        assert_eq!(arc.version.number(), version);
    }
}

#[test]
fn keyed_round_trip_and_wrong_key() {
    let src = source();
    let expected = on_disk(src.path());
    let params = PackParams::new(3, "out.rpa", Some("0xDEADBEEF"), 16).unwrap();
    let bytes = pack(src.path(), &params).unwrap();

    assert!(bytes.starts_with(b"RPA-3.0 "));
    assert_eq!(&bytes[25..33], b"deadbeef");
    let got: BTreeMap<_, _> = unpack(&bytes).unwrap().into_iter().collect();
    assert_eq!(got, expected);

    match unpack_with_key(&bytes, 0x1234_5678) {
        Err(e) => assert_eq!(e.code(), "corrupt_archive"),
        Ok(wrong) => {
            let wrong: BTreeMap<_, _> = wrong.into_iter().collect();
            assert_ne!(wrong, expected);
        }
    }
}

#[test]
fn version_two_ignores_the_key() {
    let src = source();
    let keyed = pack(src.path(), &PackParams::new(2, "a.rpa", Some("ff"), 0).unwrap()).unwrap();
    let plain = pack(src.path(), &PackParams::new(2, "a.rpa", None, 0).unwrap()).unwrap();
    assert_eq!(keyed, plain);
    assert!(keyed.starts_with(b"RPA-2.0 "));
    assert_eq!(keyed[24], b'\n');
}

#[test]
fn empty_source_and_bad_params() {
    let tmp = tempfile::tempdir().unwrap();
    fs::create_dir_all(tmp.path().join("only/dirs")).unwrap();
    let err = pack(tmp.path(), &PackParams::new(3, "x.rpa", None, 0).unwrap()).unwrap_err();
    assert_eq!(err.code(), "empty_source");

    for bad in [
        PackParams::new(4, "x.rpa", None, 0),
        PackParams::new(3, "x.rpa", Some("xyz"), 0),
        PackParams::new(3, "x.rpa", Some("0x1FFFFFFFF"), 0),
        PackParams::new(3, "x.rpa", None, 1_000_001),
    ] {
        assert_eq!(bad.unwrap_err().code(), "invalid_params");
    }
}

#[test]
fn garbage_is_corrupt() {
    for bad in [&b""[..], b"PK\x03\x04", b"RPA-3.0 zzzz\n", b"RPA-2.0 0000000000000019\n"] {
        assert_eq!(unpack(bad).unwrap_err().code(), "corrupt_archive", "{bad:?}");
    }
    assert_eq!(Version::V3.header_len(), 34);
}

#[test]
fn extract_to_writes_tree() {
    let src = source();
    let bytes = pack(src.path(), &PackParams::new(3, "g.rpa", Some("7"), 3).unwrap()).unwrap();
    let out = tempfile::tempdir().unwrap();
    let mut arc = Opened::open(Cursor::new(bytes)).unwrap();
    let written = arc.extract_to(out.path()).unwrap();
    assert_eq!(written.len(), 3);
    assert_eq!(on_disk(out.path()), on_disk(src.path()));
}
