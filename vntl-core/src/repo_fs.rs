use std::fs::File;
use std::io::Read;
use std::path::PathBuf;

use crate::container::index::Index;
use crate::domain::EntryRow;
use crate::error::Result;
use crate::read::opened::Opened;
use crate::read::stream::EntryReader;
use crate::repo::{ArchiveRepo, OpenParams};

/// Archive on the local filesystem. The index is read once; every reader
/// opens its own file handle so readers never contend.
pub struct FsArchiveRepo {
    data_path: PathBuf,
    index: Index,
    rows: Vec<EntryRow>,
}

impl FsArchiveRepo {
    pub fn new(params: OpenParams) -> Result<Self> {
        let (opened, data_path) = match params.data_path {
            Some(data) => (Opened::open_v1_paths(&params.archive_path, &data)?, data),
            None => {
                let f = File::open(&params.archive_path)?;
                (
                    Opened::open_with_key(f, params.key_override)?,
                    params.archive_path,
                )
            }
        };
        let rows = crate::list::rows(&opened);
        Ok(Self {
            data_path,
            index: opened.index,
            rows,
        })
    }

    fn reader(&self, name: &str) -> Result<EntryReader<File>> {
        let entry = self.index.get(name).ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("no such entry: {name}"),
            )
        })?;
        Ok(EntryReader::new(
            File::open(&self.data_path)?,
            entry.segments.clone(),
        ))
    }
}

impl ArchiveRepo for FsArchiveRepo {
    fn list_entries(&self) -> Result<Vec<EntryRow>> {
        Ok(self.rows.clone())
    }

    fn open_reader(&self, name: &str) -> Result<Box<dyn Read + Send + '_>> {
        Ok(Box::new(self.reader(name)?))
    }

    fn open_range(&self, name: &str, start: u64, len: u64) -> Result<Box<dyn Read + Send + '_>> {
        let mut r = self.reader(name)?;
        // entries may start with an inline prefix, so skip by reading
        std::io::copy(&mut (&mut r).take(start), &mut std::io::sink())?;
        Ok(Box::new(r.take(len)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pack::writer::{PackParams, pack};
    use std::fs;

    #[test]
    fn reads_entries_and_ranges() {
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("src");
        fs::create_dir_all(&src).unwrap();
        fs::write(src.join("a.txt"), b"0123456789").unwrap();
        let archive = tmp.path().join("a.rpa");
        let bytes = pack(&src, &PackParams::new(3, "a.rpa", Some("abc"), 0).unwrap()).unwrap();
        fs::write(&archive, bytes).unwrap();

        let repo = FsArchiveRepo::new(OpenParams {
            archive_path: archive,
            ..Default::default()
        })
        .unwrap();
        let rows = repo.list_entries().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].size, 10);

        let mut s = String::new();
        repo.open_range("a.txt", 3, 4)
            .unwrap()
            .read_to_string(&mut s)
            .unwrap();
        assert_eq!(s, "3456");
        assert!(repo.open_reader("missing").is_err());
    }
}
