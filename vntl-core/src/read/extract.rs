use crate::error::Result;
use crate::read::opened::Opened;
use crate::sandbox;
use std::fs::{self, File};
use std::io::{Cursor, Read, Seek};
use std::path::{Path, PathBuf};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Extracted {
    pub name: String,
    pub path: PathBuf,
    pub bytes: u64,
}

/// Decode a whole archive held in memory into `(name, bytes)` pairs.
pub fn unpack(archive: &[u8]) -> Result<Vec<(String, Vec<u8>)>> {
    read_all(Opened::open(Cursor::new(archive))?)
}

/// Decode with an explicit key instead of the one in the header. A wrong key
/// either trips the bounds checks or yields different bytes.
pub fn unpack_with_key(archive: &[u8], key: u64) -> Result<Vec<(String, Vec<u8>)>> {
    read_all(Opened::open_with_key(Cursor::new(archive), Some(key))?)
}

fn read_all<R: Read + Seek>(mut arc: Opened<R>) -> Result<Vec<(String, Vec<u8>)>> {
    let names: Vec<String> = arc.names().map(str::to_owned).collect();
    let mut out = Vec::with_capacity(names.len());
    for name in names {
        let bytes = arc.read_entry(&name)?;
        out.push((name, bytes));
    }
    Ok(out)
}

/// Write every entry below `dest`, one result per entry. Entry names that
/// would leave `dest` fail individually without stopping the others.
pub fn extract_each<R: Read + Seek>(
    arc: &mut Opened<R>,
    dest: &Path,
) -> Vec<(String, Result<Extracted>)> {
    let names: Vec<String> = arc.names().map(str::to_owned).collect();
    names
        .into_iter()
        .map(|name| {
            let res = extract_one(arc, dest, &name);
            (name, res)
        })
        .collect()
}

fn extract_one<R: Read + Seek>(arc: &mut Opened<R>, dest: &Path, name: &str) -> Result<Extracted> {
    let outp = sandbox::resolve(dest, name)?;
    if let Some(parent) = outp.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut reader = arc.entry_reader(name)?;
    let mut out = File::create(&outp)?;
    let bytes = std::io::copy(&mut reader, &mut out)?;
    Ok(Extracted {
        name: name.to_string(),
        path: outp,
        bytes,
    })
}

impl<R: Read + Seek> Opened<R> {
    /// Extract every entry below `dest`, stopping at the first failure.
    pub fn extract_to(&mut self, dest: &Path) -> Result<Vec<Extracted>> {
        extract_each(self, dest).into_iter().map(|(_, r)| r).collect()
    }
}
