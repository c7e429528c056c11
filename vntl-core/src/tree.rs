use crate::domain::{EntryKind, PathEntry};
use crate::error::Result;
use crate::sandbox::relative_display;
use std::fs;
use std::path::Path;

/// Recursive listing of `root`. Directories come first, then files, each
/// group ordered by case-insensitive name. Symlinks are left out.
pub fn list(root: &Path) -> Result<PathEntry> {
    let mut node = dir_node(root, root)?;
    node.name = "/".to_string();
    Ok(node)
}

fn dir_node(root: &Path, dir: &Path) -> Result<PathEntry> {
    let mut children = Vec::new();
    for e in fs::read_dir(dir)? {
        let e = e?;
        let ft = e.file_type()?;
        let path = e.path();
        if ft.is_dir() {
            children.push(dir_node(root, &path)?);
        } else if ft.is_file() {
            children.push(PathEntry {
                kind: EntryKind::File,
                name: e.file_name().to_string_lossy().into_owned(),
                path: relative_display(root, &path),
                size: Some(e.metadata()?.len()),
                children: None,
            });
        }
    }
    children.sort_by(|a, b| {
        let rank = |k: EntryKind| matches!(k, EntryKind::File);
        rank(a.kind)
            .cmp(&rank(b.kind))
            .then_with(|| a.name.to_lowercase().cmp(&b.name.to_lowercase()))
            .then_with(|| a.name.cmp(&b.name))
    });

    Ok(PathEntry {
        kind: EntryKind::Dir,
        name: dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
        path: relative_display(root, dir),
        size: None,
        children: Some(children),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lists_dirs_first_with_sizes() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        fs::write(root.join("b.txt"), "hello").unwrap();
        fs::write(root.join("A.txt"), "").unwrap();
        fs::create_dir_all(root.join("zdir/inner")).unwrap();
        fs::write(root.join("zdir/inner/c.bin"), [1u8, 2, 3]).unwrap();

        let tree = list(root).unwrap();
        assert_eq!(tree.name, "/");
        assert_eq!(tree.path, "");
        let kids = tree.children.as_ref().unwrap();
        let names: Vec<&str> = kids.iter().map(|k| k.name.as_str()).collect();
        assert_eq!(names, vec!["zdir", "A.txt", "b.txt"]);
        assert_eq!(kids[2].size, Some(5));

        let inner = &kids[0].children.as_ref().unwrap()[0];
        assert_eq!(inner.path, "zdir/inner");
        let c = &inner.children.as_ref().unwrap()[0];
        assert_eq!(c.path, "zdir/inner/c.bin");
        assert_eq!(c.size, Some(3));
    }

    #[test]
    fn listing_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        fs::create_dir_all(tmp.path().join("d")).unwrap();
        fs::write(tmp.path().join("d/x"), "x").unwrap();
        assert_eq!(list(tmp.path()).unwrap(), list(tmp.path()).unwrap());
    }
}
