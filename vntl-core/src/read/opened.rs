use crate::container::header::{Header, Version};
use crate::container::index::{Index, decode_index, read_index_v1};
use crate::error::{Result, VntlError};
use crate::read::stream::EntryReader;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

/// An archive whose header and index have been read and bounds-checked.
pub struct Opened<R> {
    src: R,
    pub version: Version,
    /// Key the index was decoded with.
    pub key: u64,
    pub index: Index,
    /// Data section is `[payload_start, payload_end)`.
    pub payload_start: u64,
    pub payload_end: u64,
}

impl Opened<File> {
    pub fn open_path(path: &Path) -> Result<Self> {
        Self::open(File::open(path)?)
    }

    /// Open a version 1 pair: `.rpi` index plus its headerless data file.
    pub fn open_v1_paths(rpi: &Path, data: &Path) -> Result<Self> {
        let index_bytes = read_capped(File::open(rpi)?, MAX_COMPRESSED_INDEX_BYTES)?;
        Self::open_v1(&index_bytes, File::open(data)?)
    }
}

impl<R: Read + Seek> Opened<R> {
    pub fn open(src: R) -> Result<Self> {
        Self::open_with_key(src, None)
    }

    /// Like `open`, but decode the index with `key` instead of the header's key.
    /// Has no effect on version 2 archives.
    pub fn open_with_key(mut src: R, key: Option<u64>) -> Result<Self> {
        let file_len = src.seek(SeekFrom::End(0))?;
        src.seek(SeekFrom::Start(0))?;

        let header = Header::read_from(&mut src)?;
        if header.index_off < header.len || header.index_off > file_len {
            return Err(VntlError::corrupt(format!(
                "index offset {} outside archive of {} bytes",
                header.index_off, file_len
            )));
        }

        src.seek(SeekFrom::Start(header.index_off))?;
        let index_bytes = read_capped(&mut src, MAX_COMPRESSED_INDEX_BYTES)?;

        let key = if header.version.uses_key() {
            key.unwrap_or(header.key)
        } else {
            0
        };
        let index = decode_index(&index_bytes, key)?;
        check_bounds(&index, header.len, header.index_off)?;

        Ok(Self {
            src,
            version: header.version,
            key,
            index,
            payload_start: header.len,
            payload_end: header.index_off,
        })
    }

    pub fn open_v1(index_bytes: &[u8], mut data: R) -> Result<Self> {
        let data_len = data.seek(SeekFrom::End(0))?;
        let index = read_index_v1(index_bytes)?;
        check_bounds(&index, 0, data_len)?;
        Ok(Self {
            src: data,
            version: Version::V1,
            key: 0,
            index,
            payload_start: 0,
            payload_end: data_len,
        })
    }

    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.index.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Stream one entry without buffering it.
    pub fn entry_reader(&mut self, name: &str) -> Result<EntryReader<&mut R>> {
        let entry = self.index.get(name).ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("no such entry: {name}"),
            )
        })?;
        Ok(EntryReader::new(&mut self.src, entry.segments.clone()))
    }

    pub fn read_entry(&mut self, name: &str) -> Result<Vec<u8>> {
        let size = self.index.get(name).map(|e| e.size()).unwrap_or(0);
        let mut out = Vec::with_capacity(size as usize);
        self.entry_reader(name)?.read_to_end(&mut out)?;
        Ok(out)
    }
}

/// Every range must lie in `[start, end)` and no two ranges may overlap.
/// Largest compressed index accepted. Everything from the header's index
/// offset to the end of the file is read, so this also bounds a forged offset.
const MAX_COMPRESSED_INDEX_BYTES: u64 = 64 * 1024 * 1024;

fn read_capped<R: Read>(src: R, limit: u64) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    src.take(limit.saturating_add(1)).read_to_end(&mut buf)?;
    if buf.len() as u64 > limit {
        return Err(VntlError::corrupt(format!(
            "index region is larger than {limit} bytes"
        )));
    }
    Ok(buf)
}

fn check_bounds(index: &Index, start: u64, end: u64) -> Result<()> {
    let mut ranges = Vec::new();
    for (name, entry) in index {
        for seg in &entry.segments {
            let seg_end = seg
                .offset
                .checked_add(seg.length)
                .ok_or_else(|| VntlError::corrupt(format!("entry {name:?}: range overflows")))?;
            if seg.offset < start || seg_end > end {
                return Err(VntlError::corrupt(format!(
                    "entry {name:?}: range {}..{} outside payload {}..{}",
                    seg.offset, seg_end, start, end
                )));
            }
            if seg.length > 0 {
                ranges.push((seg.offset, seg_end, name.as_str()));
            }
        }
    }
    ranges.sort_unstable();
    for w in ranges.windows(2) {
        if w[1].0 < w[0].1 {
            return Err(VntlError::corrupt(format!(
                "entries {:?} and {:?} overlap",
                w[0].2, w[1].2
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::header::HEADER_LEN_V2;
    use crate::container::index::{IndexEntry, encode_index};
    use std::io::Cursor;

    fn archive_v2(index: &Index, data: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        let index_off = HEADER_LEN_V2 + data.len() as u64;
        Header::new(Version::V2, index_off, 0)
            .write_to(&mut out)
            .unwrap();
        out.extend_from_slice(data);
        out.extend_from_slice(&encode_index(index, 0).unwrap());
        out
    }

    #[test]
    fn oversized_index_region_is_corrupt() {
        let region = vec![7u8; 10];
        assert_eq!(read_capped(Cursor::new(&region), 10).unwrap(), region);
        let err = read_capped(Cursor::new(&region), 4).unwrap_err();
        assert_eq!(err.code(), "corrupt_archive");
    }

    #[test]
    fn reads_entries_by_name() {
        let mut index = Index::new();
        index.insert("x".into(), IndexEntry::single(HEADER_LEN_V2, 2));
        index.insert("y".into(), IndexEntry::single(HEADER_LEN_V2 + 2, 3));
        let bytes = archive_v2(&index, b"AABBB");
        let mut arc = Opened::open(Cursor::new(bytes)).unwrap();
        assert_eq!(arc.version, Version::V2);
        assert_eq!(arc.read_entry("y").unwrap(), b"BBB");
        assert_eq!(arc.read_entry("x").unwrap(), b"AA");
        assert!(arc.read_entry("z").is_err());
    }

    #[test]
    fn out_of_range_entry_is_corrupt() {
        let mut index = Index::new();
        index.insert("x".into(), IndexEntry::single(HEADER_LEN_V2, 99));
        let bytes = archive_v2(&index, b"AA");
        let err = Opened::open(Cursor::new(bytes)).err().unwrap();
        assert_eq!(err.code(), "corrupt_archive");
    }

    #[test]
    fn overlapping_entries_are_corrupt() {
        let mut index = Index::new();
        index.insert("x".into(), IndexEntry::single(HEADER_LEN_V2, 3));
        index.insert("y".into(), IndexEntry::single(HEADER_LEN_V2 + 1, 3));
        let bytes = archive_v2(&index, b"AAAAAA");
        let err = Opened::open(Cursor::new(bytes)).err().unwrap();
        assert_eq!(err.code(), "corrupt_archive");
    }

    #[test]
    fn version_one_reads_headerless_data() {
        let mut index = Index::new();
        index.insert("script.rpy".into(), IndexEntry::single(0, 5));
        let rpi = encode_index(&index, 0).unwrap();
        let mut arc = Opened::open_v1(&rpi, Cursor::new(b"hello".to_vec())).unwrap();
        assert_eq!(arc.version, Version::V1);
        assert_eq!(arc.read_entry("script.rpy").unwrap(), b"hello");
    }
}
