use crate::container::header::{Header, Version};
use crate::container::index::{Index, IndexEntry, encode_index};
use crate::error::{Result, VntlError};
use crate::pack::walker::{SourceFile, collect_files};
use crate::util::hex::parse_key_hex;
use std::fs::File;
use std::io::{Cursor, Read, Seek, SeekFrom, Write};
use std::path::Path;

pub const MAX_PADDING: u64 = 1_000_000;
pub const FILLER: u8 = 0;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PackParams {
    pub version: Version,
    /// File name the caller will store the archive under.
    pub output_name: String,
    /// 0 disables obfuscation. Ignored by version 2.
    pub key: u64,
    /// Filler bytes between the header and the first data block.
    pub padding: u64,
}

impl PackParams {
    /// Validate raw request values.
    pub fn new(
        version: u8,
        output_name: impl Into<String>,
        key_hex: Option<&str>,
        padding: u64,
    ) -> Result<Self> {
        let version = Version::packable(version)?;
        let key = match key_hex {
            Some(h) => u64::from(parse_key_hex(h)?),
            None => 0,
        };
        if padding > MAX_PADDING {
            return Err(VntlError::invalid(format!(
                "padding {padding} exceeds {MAX_PADDING}"
            )));
        }
        let output_name = output_name.into();
        if output_name.trim().is_empty() {
            return Err(VntlError::invalid("archive name is empty"));
        }
        Ok(Self {
            version,
            output_name,
            key,
            padding,
        })
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PackSummary {
    pub entries: usize,
    pub payload_bytes: u64,
    pub index_off: u64,
    pub total_bytes: u64,
}

/// Pack every regular file below `source` into an in-memory archive.
pub fn pack(source: &Path, params: &PackParams) -> Result<Vec<u8>> {
    let files = collect_files(source)?;
    let mut out = Cursor::new(Vec::new());
    pack_into(&mut out, &files, params)?;
    Ok(out.into_inner())
}

/// Write an archive of `files` to `out`.
///
/// Layout: header, `padding` filler bytes, file data in the given order,
/// compressed index. The header is written twice: a placeholder first, then
/// the final one once the index offset is known.
pub fn pack_into<W: Write + Seek>(
    out: &mut W,
    files: &[SourceFile],
    params: &PackParams,
) -> Result<PackSummary> {
    if files.is_empty() {
        return Err(VntlError::EmptySource(
            "source directory contains no regular files".into(),
        ));
    }
    let base = out.stream_position()?;

    Header::new(params.version, 0, 0).write_to(&mut *out)?;
    let mut cursor = params.version.header_len();

    write_filler(out, params.padding)?;
    cursor += params.padding;

    let mut index = Index::new();
    let mut payload = 0u64;
    for src in files {
        if index.contains_key(&src.name) {
            return Err(VntlError::invalid(format!("duplicate entry {}", src.name)));
        }
        let mut f = File::open(&src.path)?;
        let n = std::io::copy(&mut f, out)?;
        index.insert(src.name.clone(), IndexEntry::single(cursor, n));
        cursor += n;
        payload += n;
    }

    let index_off = cursor;
    let key = if params.version.uses_key() {
        params.key
    } else {
        0
    };
    let index_bytes = encode_index(&index, key)?;
    out.write_all(&index_bytes)?;
    let total_bytes = index_off + index_bytes.len() as u64;

    // finalize header
    out.seek(SeekFrom::Start(base))?;
    Header::new(params.version, index_off, key).write_to(&mut *out)?;
    out.seek(SeekFrom::Start(base + total_bytes))?;
    out.flush()?;

    Ok(PackSummary {
        entries: index.len(),
        payload_bytes: payload,
        index_off,
        total_bytes,
    })
}

fn write_filler<W: Write>(out: &mut W, n: u64) -> std::io::Result<()> {
    let mut filler = std::io::repeat(FILLER).take(n);
    std::io::copy(&mut filler, out)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::header::HEADER_LEN_V3;
    use std::fs;

    #[test]
    fn params_are_validated() {
        assert!(PackParams::new(3, "a.rpa", Some("0xDEADBEEF"), 0).is_ok());
        for (v, key, pad) in [
            (4u8, None, 0u64),
            (1, None, 0),
            (3, Some("nothex"), 0),
            (3, None, MAX_PADDING + 1),
        ] {
            let err = PackParams::new(v, "a.rpa", key, pad).unwrap_err();
            assert_eq!(err.code(), "invalid_params");
        }
        let err = PackParams::new(3, "  ", None, 0).unwrap_err();
        assert_eq!(err.code(), "invalid_params");
    }

    #[test]
    fn padding_sits_between_header_and_data() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("f.bin"), b"DATA").unwrap();
        let params = PackParams::new(3, "p.rpa", None, 16).unwrap();
        let bytes = pack(tmp.path(), &params).unwrap();

        let start = HEADER_LEN_V3 as usize;
        assert!(bytes[start..start + 16].iter().all(|b| *b == FILLER));
        assert_eq!(&bytes[start + 16..start + 20], b"DATA");
    }

    #[test]
    fn empty_directory_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        fs::create_dir_all(tmp.path().join("only/dirs")).unwrap();
        let params = PackParams::new(2, "p.rpa", None, 0).unwrap();
        let err = pack(tmp.path(), &params).unwrap_err();
        assert_eq!(err.code(), "empty_source");
    }

    #[test]
    fn output_is_stable_for_a_snapshot() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("b.txt"), b"bb").unwrap();
        fs::write(tmp.path().join("a.txt"), b"a").unwrap();
        let params = PackParams::new(3, "p.rpa", Some("0x1234"), 3).unwrap();
        assert_eq!(
            pack(tmp.path(), &params).unwrap(),
            pack(tmp.path(), &params).unwrap()
        );
    }
}
