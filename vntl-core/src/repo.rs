// vntl_core/src/repo.rs
use crate::domain::EntryRow;
use crate::error::Result;
use std::io::Read;
use std::path::PathBuf;

#[derive(Clone, Debug, Default)]
pub struct OpenParams {
    pub archive_path: PathBuf,
    /// Decode a version 3 index with this key instead of the header's.
    pub key_override: Option<u64>,
    /// Data file for a version 1 `.rpi` index; `archive_path` is then the index.
    pub data_path: Option<PathBuf>,
}

/// Read access to one archive's entries by name.
pub trait ArchiveRepo: Send + Sync {
    fn list_entries(&self) -> Result<Vec<EntryRow>>;

    fn open_reader(&self, name: &str) -> Result<Box<dyn Read + Send + '_>>;

    fn open_range(&self, name: &str, start: u64, len: u64) -> Result<Box<dyn Read + Send + '_>>;
}

/// Open the archive described by `p` on the local filesystem.
pub fn open(p: OpenParams) -> Result<Box<dyn ArchiveRepo>> {
    Ok(Box::new(crate::repo_fs::FsArchiveRepo::new(p)?))
}
