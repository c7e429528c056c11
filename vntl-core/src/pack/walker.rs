use crate::error::{Result, VntlError};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// A regular file selected for packing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceFile {
    /// Archive entry name, relative to the walk root, forward slashes.
    pub name: String,
    pub path: PathBuf,
}

/// Collect every regular file below `root`, sorted by path. Symlinks are skipped.
pub fn collect_files(root: &Path) -> Result<Vec<SourceFile>> {
    let mut files = Vec::new();
    for e in WalkDir::new(root).follow_links(false).sort_by_file_name() {
        let e = e.map_err(|e| std::io::Error::other(e.to_string()))?;
        if !e.file_type().is_file() {
            continue;
        }
        let rel = e
            .path()
            .strip_prefix(root)
            .map_err(|_| VntlError::invalid(format!("{} is outside {}", e.path().display(), root.display())))?;
        files.push(SourceFile {
            name: entry_name(rel)?,
            path: e.path().to_path_buf(),
        });
    }
    Ok(files)
}

/// Render a relative path as an archive entry name.
pub fn entry_name(rel: &Path) -> Result<String> {
    let mut parts = Vec::new();
    for c in rel.components() {
        let s = c
            .as_os_str()
            .to_str()
            .ok_or_else(|| VntlError::invalid(format!("non UTF-8 file name: {}", rel.display())))?;
        parts.push(s);
    }
    Ok(parts.join("/"))
}
