use crate::error::{Result, VntlError};
use flate2::Compression;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use serde_pickle::{DeOptions, HashableValue, SerOptions, Value};
use std::collections::BTreeMap;
use std::io::{Read, Write};

// Upper bound on the inflated index; real indexes are a few MiB at most.
const MAX_INDEX_BYTES: u64 = 256 * 1024 * 1024;

/// One stored range of an entry. Ren'Py may keep the first bytes of a file
/// inside the index itself (`prefix`), ahead of the range in the data section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub offset: u64,
    pub length: u64,
    pub prefix: Vec<u8>,
}

impl Segment {
    pub fn end(&self) -> u64 {
        self.offset.saturating_add(self.length)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct IndexEntry {
    pub segments: Vec<Segment>,
}

impl IndexEntry {
    pub fn single(offset: u64, length: u64) -> Self {
        Self {
            segments: vec![Segment {
                offset,
                length,
                prefix: Vec::new(),
            }],
        }
    }

    /// Decoded size of the entry (prefixes included).
    pub fn size(&self) -> u64 {
        self.segments
            .iter()
            .map(|s| s.length + s.prefix.len() as u64)
            .sum()
    }
}

/// Entry name -> stored ranges. Names use forward slashes.
pub type Index = BTreeMap<String, IndexEntry>;

/// Pickle and zlib-compress `index`, XOR-ing offsets and lengths with `key`.
pub fn encode_index(index: &Index, key: u64) -> Result<Vec<u8>> {
    let mut dict = BTreeMap::new();
    for (name, entry) in index {
        let mut tuples = Vec::with_capacity(entry.segments.len());
        for seg in &entry.segments {
            let mut fields = vec![
                Value::I64(obfuscate(seg.offset, key)?),
                Value::I64(obfuscate(seg.length, key)?),
            ];
            if !seg.prefix.is_empty() {
                fields.push(Value::Bytes(seg.prefix.clone()));
            }
            tuples.push(Value::Tuple(fields));
        }
        dict.insert(HashableValue::String(name.clone()), Value::List(tuples));
    }

    let pickled = serde_pickle::value_to_vec(&Value::Dict(dict), SerOptions::new())
        .map_err(|e| std::io::Error::other(format!("index pickle: {e}")))?;

    let mut enc = ZlibEncoder::new(Vec::new(), Compression::default());
    enc.write_all(&pickled)?;
    Ok(enc.finish()?)
}

/// Inflate and unpickle an index, undoing the XOR with `key`.
pub fn decode_index(compressed: &[u8], key: u64) -> Result<Index> {
    let mut pickled = Vec::new();
    ZlibDecoder::new(compressed)
        .take(MAX_INDEX_BYTES)
        .read_to_end(&mut pickled)
        .map_err(|e| VntlError::corrupt(format!("index inflate: {e}")))?;

    let value = serde_pickle::value_from_slice(&pickled, DeOptions::new())
        .map_err(|e| VntlError::corrupt(format!("index unpickle: {e}")))?;

    let Value::Dict(dict) = value else {
        return Err(VntlError::corrupt("index is not a dict"));
    };

    let mut index = Index::new();
    for (k, v) in dict {
        let name = entry_name(k)?;
        let items = match v {
            Value::List(items) | Value::Tuple(items) => items,
            _ => return Err(VntlError::corrupt(format!("entry {name:?} has no ranges"))),
        };
        let mut segments = Vec::with_capacity(items.len());
        for item in items {
            segments.push(segment(&name, item, key)?);
        }
        index.insert(name, IndexEntry { segments });
    }
    Ok(index)
}

/// Version 1 `.rpi` index: same encoding, never obfuscated.
pub fn read_index_v1(rpi: &[u8]) -> Result<Index> {
    decode_index(rpi, 0)
}

fn obfuscate(value: u64, key: u64) -> Result<i64> {
    let v = i64::try_from(value ^ key)
        .map_err(|_| VntlError::invalid(format!("offset {value} too large for index")))?;
    Ok(v)
}

fn entry_name(k: HashableValue) -> Result<String> {
    match k {
        HashableValue::String(s) => Ok(s),
        HashableValue::Bytes(b) => {
            String::from_utf8(b).map_err(|_| VntlError::corrupt("entry name is not UTF-8"))
        }
        other => Err(VntlError::corrupt(format!(
            "entry name is not a string: {other:?}"
        ))),
    }
}

fn segment(name: &str, item: Value, key: u64) -> Result<Segment> {
    let fields = match item {
        Value::Tuple(f) | Value::List(f) => f,
        _ => return Err(VntlError::corrupt(format!("entry {name:?}: malformed range"))),
    };
    if fields.len() != 2 && fields.len() != 3 {
        return Err(VntlError::corrupt(format!(
            "entry {name:?}: range has {} fields",
            fields.len()
        )));
    }
    let mut it = fields.into_iter();
    let offset = deobfuscate(name, it.next(), key)?;
    let length = deobfuscate(name, it.next(), key)?;
    let prefix = match it.next() {
        None | Some(Value::None) => Vec::new(),
        Some(Value::Bytes(b)) => b,
        // Python 3 pickles may carry the prefix as a latin-1 str.
        Some(Value::String(s)) => s
            .chars()
            .map(|c| u8::try_from(u32::from(c)))
            .collect::<std::result::Result<Vec<u8>, _>>()
            .map_err(|_| VntlError::corrupt(format!("entry {name:?}: prefix is not latin-1")))?,
        Some(_) => return Err(VntlError::corrupt(format!("entry {name:?}: bad prefix"))),
    };
    Ok(Segment {
        offset,
        length,
        prefix,
    })
}

fn deobfuscate(name: &str, field: Option<Value>, key: u64) -> Result<u64> {
    match field {
        Some(Value::I64(v)) => {
            let plain = (v as u64) ^ key;
            if v < 0 || plain > i64::MAX as u64 {
                return Err(VntlError::corrupt(format!(
                    "entry {name:?}: negative offset or length"
                )));
            }
            Ok(plain)
        }
        _ => Err(VntlError::corrupt(format!(
            "entry {name:?}: offset/length is not an integer"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Index {
        let mut idx = Index::new();
        idx.insert("a.txt".into(), IndexEntry::single(34, 5));
        idx.insert("dir/b.png".into(), IndexEntry::single(39, 1024));
        idx
    }

    #[test]
    fn key_changes_stored_bytes_but_not_decoded_index() {
        let plain = encode_index(&sample(), 0).unwrap();
        let keyed = encode_index(&sample(), 0xDEADBEEF).unwrap();
        assert_ne!(plain, keyed);
        assert_eq!(decode_index(&keyed, 0xDEADBEEF).unwrap(), sample());
        assert_eq!(decode_index(&plain, 0).unwrap(), sample());
    }

    #[test]
    fn prefix_segments_survive() {
        let mut idx = Index::new();
        idx.insert(
            "p.bin".into(),
            IndexEntry {
                segments: vec![Segment {
                    offset: 100,
                    length: 3,
                    prefix: b"hd".to_vec(),
                }],
            },
        );
        let enc = encode_index(&idx, 7).unwrap();
        let dec = decode_index(&enc, 7).unwrap();
        assert_eq!(dec["p.bin"].size(), 5);
        assert_eq!(dec, idx);
    }

    #[test]
    fn garbage_is_corrupt() {
        let err = decode_index(b"not zlib at all", 0).unwrap_err();
        assert_eq!(err.code(), "corrupt_archive");

        // valid zlib, but the pickle is a list rather than a dict
        let pickled = serde_pickle::value_to_vec(&Value::List(vec![]), SerOptions::new()).unwrap();
        let mut enc = ZlibEncoder::new(Vec::new(), Compression::default());
        enc.write_all(&pickled).unwrap();
        let err = decode_index(&enc.finish().unwrap(), 0).unwrap_err();
        assert_eq!(err.code(), "corrupt_archive");
    }
}
