//! Resolution of client-supplied relative paths inside a job directory.
//!
//! Two layers: [`resolve`] is pure path arithmetic and rejects `..`,
//! absolute paths and drive prefixes outright. [`Sandbox::resolve`] adds a
//! filesystem check so that a symlink planted inside the root cannot lead
//! outside of it.

use crate::error::{Result, VntlError};
use std::path::{Component, Path, PathBuf};

/// Join `requested` onto `root` after normalizing it. The empty path
/// (or one made only of `.` segments) resolves to `root`.
pub fn resolve(root: &Path, requested: &str) -> Result<PathBuf> {
    let escape = || VntlError::PathEscape(requested.to_string());

    if requested.contains('\0') {
        return Err(escape());
    }
    let unified = requested.replace('\\', "/");
    if unified.starts_with('/') {
        return Err(escape());
    }

    let mut out = root.to_path_buf();
    for seg in unified.split('/') {
        if seg.is_empty() || seg == "." {
            continue;
        }
        if seg == ".." {
            return Err(escape());
        }
        // catches `C:` and friends on Windows
        let mut comps = Path::new(seg).components();
        match (comps.next(), comps.next()) {
            (Some(Component::Normal(_)), None) => out.push(seg),
            _ => return Err(escape()),
        }
    }

    if !out.starts_with(root) {
        return Err(escape());
    }
    Ok(out)
}

/// Root-relative display form of `path`, forward slashes, `""` for the root.
pub fn relative_display(root: &Path, path: &Path) -> String {
    match path.strip_prefix(root) {
        Ok(rel) => rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/"),
        Err(_) => path.to_string_lossy().replace('\\', "/"),
    }
}

/// A root directory plus its canonical form, for symlink-aware checks.
#[derive(Clone, Debug)]
pub struct Sandbox {
    root: PathBuf,
    canonical: PathBuf,
}

impl Sandbox {
    pub fn new(root: &Path) -> Result<Self> {
        let canonical = root.canonicalize()?;
        Ok(Self {
            root: root.to_path_buf(),
            canonical,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Lexical resolution, then the deepest existing ancestor of the result is
    /// canonicalized and must still lie under the canonical root.
    pub fn resolve(&self, requested: &str) -> Result<PathBuf> {
        let lexical = resolve(&self.root, requested)?;

        let mut nearest = lexical.as_path();
        loop {
            if nearest.symlink_metadata().is_ok() {
                break;
            }
            match nearest.parent() {
                Some(p) => nearest = p,
                None => return Ok(lexical),
            }
        }
        // a dangling symlink fails to canonicalize and is treated as an escape
        let inside = nearest
            .canonicalize()
            .map(|real| real.starts_with(&self.canonical))
            .unwrap_or(false);
        if !inside {
            return Err(VntlError::PathEscape(requested.to_string()));
        }
        Ok(lexical)
    }
}
