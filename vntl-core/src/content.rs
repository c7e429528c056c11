//! File content inside one workspace area: text editing, raw byte access,
//! zip bundles and the small file-manager operations.
//!
//! Every function takes the area root plus a client-supplied relative path
//! and resolves it through [`Sandbox`] before touching the filesystem.

use crate::error::{Result, VntlError};
use crate::pack::walker::entry_name;
use crate::sandbox::{self, Sandbox};
use std::fs::{self, File};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// An open file ready to be streamed. When produced by [`open_range`] the
/// handle is positioned at the range start and `len` is the range length.
#[derive(Debug)]
pub struct RawFile {
    pub file: File,
    pub len: u64,
    pub name: String,
}

impl RawFile {
    /// Reader limited to `len` bytes from the current position.
    pub fn into_reader(self) -> std::io::Take<File> {
        self.file.take(self.len)
    }
}

/// Inclusive byte range of a file of `total` bytes.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
    pub total: u64,
}

impl ByteRange {
    /// Never zero: `end` is inclusive.
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }
}

/// Parse a single `bytes=` range header value. Multi-range requests and
/// ranges that cannot be satisfied give `None`.
pub fn parse_range(header: &str, total: u64) -> Option<ByteRange> {
    let spec = header.trim().strip_prefix("bytes=")?;
    if spec.contains(',') || total == 0 {
        return None;
    }
    let (a, b) = spec.split_once('-')?;
    let (a, b) = (a.trim(), b.trim());
    let (start, end) = if a.is_empty() {
        let suffix: u64 = b.parse().ok()?;
        if suffix == 0 {
            return None;
        }
        (total.saturating_sub(suffix), total - 1)
    } else {
        let start: u64 = a.parse().ok()?;
        let end = if b.is_empty() {
            total - 1
        } else {
            b.parse::<u64>().ok()?.min(total - 1)
        };
        (start, end)
    };
    if start > end || start >= total {
        return None;
    }
    Some(ByteRange { start, end, total })
}

fn existing_file(sb: &Sandbox, path: &str) -> Result<(PathBuf, u64)> {
    let full = sb.resolve(path)?;
    match fs::metadata(&full) {
        Ok(m) if m.is_file() => Ok((full, m.len())),
        Ok(_) => Err(VntlError::NotAFile(path.to_string())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(VntlError::NotAFile(path.to_string()))
        }
        Err(e) => Err(e.into()),
    }
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

pub fn read_text(root: &Path, path: &str, max_bytes: u64) -> Result<String> {
    let sb = Sandbox::new(root)?;
    let (full, size) = existing_file(&sb, path)?;
    if size > max_bytes {
        return Err(VntlError::TooLarge {
            path: path.to_string(),
            size,
            limit: max_bytes,
        });
    }
    let bytes = fs::read(&full)?;
    String::from_utf8(bytes).map_err(|_| VntlError::NotUtf8Decodable(path.to_string()))
}

/// Overwrite (or create) a text file, creating parent directories.
pub fn write_text(root: &Path, path: &str, text: &str, max_bytes: u64) -> Result<u64> {
    let sb = Sandbox::new(root)?;
    let full = sb.resolve(path)?;
    if full == sb.root() || full.is_dir() {
        return Err(VntlError::NotAFile(path.to_string()));
    }
    let size = text.len() as u64;
    if size > max_bytes {
        return Err(VntlError::TooLarge {
            path: path.to_string(),
            size,
            limit: max_bytes,
        });
    }
    if let Some(parent) = full.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(&full, text.as_bytes())?;
    Ok(size)
}

pub fn open_raw(root: &Path, path: &str) -> Result<RawFile> {
    let sb = Sandbox::new(root)?;
    let (full, len) = existing_file(&sb, path)?;
    Ok(RawFile {
        file: File::open(&full)?,
        len,
        name: file_name_of(&full),
    })
}

/// Open `path` positioned at `range.start`; `len` of the result is the range length.
pub fn open_range(root: &Path, path: &str, range: ByteRange) -> Result<RawFile> {
    let mut raw = open_raw(root, path)?;
    if range.end >= raw.len || range.start > range.end {
        return Err(VntlError::invalid(format!(
            "range {}-{} outside file of {} bytes",
            range.start, range.end, raw.len
        )));
    }
    raw.file.seek(SeekFrom::Start(range.start))?;
    raw.len = range.len();
    Ok(raw)
}

/// Single file download; directories are rejected.
pub fn download_single(root: &Path, path: &str) -> Result<(RawFile, String)> {
    let raw = open_raw(root, path)?;
    let filename = raw.name.clone();
    Ok((raw, filename))
}

/// Name of the zip bundle for `path` inside the area called `area_name`.
pub fn bundle_name(area_name: &str, path: &str) -> String {
    let last = path
        .replace('\\', "/")
        .split('/')
        .rfind(|s| !s.is_empty() && *s != ".")
        .map(str::to_owned);
    match last {
        Some(n) => format!("{n}.zip"),
        None => format!("{area_name}.zip"),
    }
}

/// Stream a zip of `path` (the whole area when empty, a directory, or one file)
/// into `sink`. Entry names are relative to the zipped directory. Returns the
/// number of file entries written.
pub fn write_zip<W: Write>(root: &Path, path: &str, sink: W) -> Result<usize> {
    let sb = Sandbox::new(root)?;
    let base = sb.resolve(path)?;
    let meta = fs::symlink_metadata(&base)
        .map_err(|_| VntlError::SourceNotFound(path.to_string()))?;

    let opts = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .large_file(true);
    let mut zip = ZipWriter::new_stream(sink);
    let mut files = 0usize;

    if meta.is_file() {
        zip.start_file(file_name_of(&base), opts)?;
        std::io::copy(&mut File::open(&base)?, &mut zip)?;
        files += 1;
    } else if meta.is_dir() {
        for e in WalkDir::new(&base).follow_links(false).sort_by_file_name() {
            let e = e.map_err(|e| std::io::Error::other(e.to_string()))?;
            let rel = match e.path().strip_prefix(&base) {
                Ok(r) if !r.as_os_str().is_empty() => r,
                _ => continue,
            };
            let name = entry_name(rel)?;
            if e.file_type().is_dir() {
                zip.add_directory(format!("{name}/"), opts)?;
            } else if e.file_type().is_file() {
                zip.start_file(name, opts)?;
                std::io::copy(&mut File::open(e.path())?, &mut zip)?;
                files += 1;
            }
        }
    } else {
        return Err(VntlError::NotAFile(path.to_string()));
    }

    zip.finish()?;
    Ok(files)
}

pub fn make_dir(root: &Path, path: &str) -> Result<()> {
    let sb = Sandbox::new(root)?;
    let full = sb.resolve(path)?;
    if full.is_file() {
        return Err(VntlError::AlreadyExists(path.to_string()));
    }
    fs::create_dir_all(&full)?;
    Ok(())
}

/// Remove a file or a whole directory. The area root itself cannot be removed.
pub fn remove_path(root: &Path, path: &str) -> Result<()> {
    let sb = Sandbox::new(root)?;
    let full = sb.resolve(path)?;
    if full == sb.root() {
        return Err(VntlError::invalid("refusing to remove the workspace root"));
    }
    let meta = match fs::symlink_metadata(&full) {
        Ok(m) => m,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(VntlError::SourceNotFound(path.to_string()));
        }
        Err(e) => return Err(e.into()),
    };
    if meta.is_dir() {
        fs::remove_dir_all(&full)?;
    } else {
        fs::remove_file(&full)?;
    }
    Ok(())
}

/// Rename `src` to `dst` inside the area.
pub fn move_path(root: &Path, src: &str, dst: &str, overwrite: bool) -> Result<()> {
    let sb = Sandbox::new(root)?;
    let from = sb.resolve(src)?;
    let to = sb.resolve(dst)?;
    if from == sb.root() || to == sb.root() {
        return Err(VntlError::invalid("cannot move the workspace root"));
    }
    let meta = fs::symlink_metadata(&from)
        .map_err(|_| VntlError::SourceNotFound(src.to_string()))?;
    if from == to {
        return Ok(());
    }
    if meta.is_dir() && to.starts_with(&from) {
        return Err(VntlError::invalid(format!(
            "cannot move {src} into itself"
        )));
    }
    if fs::symlink_metadata(&to).is_ok() {
        if !overwrite {
            return Err(VntlError::AlreadyExists(dst.to_string()));
        }
        if to.is_dir() {
            fs::remove_dir_all(&to)?;
        } else {
            fs::remove_file(&to)?;
        }
    }
    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::rename(&from, &to)?;
    Ok(())
}

/// Expand an uploaded zip bundle into `dest` and delete the bundle.
/// Entries whose names would leave `dest` are rejected with `PathEscape`.
/// Returns the number of files written.
pub fn expand_zip(zip_path: &Path, dest: &Path, max_total: u64) -> Result<usize> {
    let mut archive = ZipArchive::new(File::open(zip_path)?)?;
    let mut files = 0usize;
    let mut total = 0u64;

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        let raw_name = entry.name().to_string();
        let enclosed = entry
            .enclosed_name()
            .ok_or_else(|| VntlError::PathEscape(raw_name.clone()))?;
        let out = sandbox::resolve(dest, &enclosed.to_string_lossy())?;

        if entry.is_dir() {
            fs::create_dir_all(&out)?;
            continue;
        }
        // declared sizes can lie, so the cap is applied to what is actually written
        let too_large = |size| VntlError::TooLarge {
            path: raw_name.clone(),
            size,
            limit: max_total,
        };
        if total.saturating_add(entry.size()) > max_total {
            return Err(too_large(total.saturating_add(entry.size())));
        }
        if let Some(parent) = out.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut f = File::create(&out)?;
        let room = max_total - total;
        let written = std::io::copy(&mut (&mut entry).take(room.saturating_add(1)), &mut f)?;
        total += written;
        if written > room {
            drop(f);
            let _ = fs::remove_file(&out);
            return Err(too_large(total));
        }
        files += 1;
    }

    drop(archive);
    fs::remove_file(zip_path)?;
    tracing::debug!(bundle = %zip_path.display(), files, "expanded zip upload");
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn area() -> tempfile::TempDir {
        let tmp = tempfile::tempdir().unwrap();
        fs::create_dir_all(tmp.path().join("dir/sub")).unwrap();
        fs::write(tmp.path().join("dir/sub/a.txt"), "alpha").unwrap();
        fs::write(tmp.path().join("top.txt"), "top").unwrap();
        fs::write(tmp.path().join("bin.dat"), [0xffu8, 0xfe, 0x00]).unwrap();
        tmp
    }

    #[test]
    fn text_read_write_and_errors() {
        let tmp = area();
        let root = tmp.path();
        assert_eq!(read_text(root, "dir/sub/a.txt", 1024).unwrap(), "alpha");
        assert_eq!(
            read_text(root, "bin.dat", 1024).unwrap_err().code(),
            "not_utf8_decodable"
        );
        assert_eq!(read_text(root, "dir", 1024).unwrap_err().code(), "not_a_file");
        assert_eq!(read_text(root, "missing", 1024).unwrap_err().code(), "not_a_file");
        assert_eq!(read_text(root, "top.txt", 2).unwrap_err().code(), "too_large");
        assert_eq!(
            read_text(root, "../etc/passwd", 1024).unwrap_err().code(),
            "path_escape"
        );

        write_text(root, "new/deep/n.rpy", "label start:\n", 1024).unwrap();
        assert_eq!(
            fs::read_to_string(root.join("new/deep/n.rpy")).unwrap(),
            "label start:\n"
        );
        write_text(root, "top.txt", "changed", 1024).unwrap();
        assert_eq!(read_text(root, "top.txt", 1024).unwrap(), "changed");
        assert_eq!(write_text(root, "dir", "x", 1024).unwrap_err().code(), "not_a_file");
    }

    #[test]
    fn ranges() {
        assert_eq!(
            parse_range("bytes=0-1", 5),
            Some(ByteRange { start: 0, end: 1, total: 5 })
        );
        assert_eq!(parse_range("bytes=3-", 5).unwrap().len(), 2);
        assert_eq!(parse_range("bytes=-2", 5).unwrap().start, 3);
        assert_eq!(parse_range("bytes=2-99", 5).unwrap().end, 4);
        assert_eq!(parse_range("bytes=9-", 5), None);
        assert_eq!(parse_range("bytes=0-1,3-4", 5), None);
        assert_eq!(parse_range("items=0-1", 5), None);

        let tmp = area();
        let r = parse_range("bytes=1-3", 5).unwrap();
        let mut out = String::new();
        open_range(tmp.path(), "dir/sub/a.txt", r)
            .unwrap()
            .into_reader()
            .read_to_string(&mut out)
            .unwrap();
        assert_eq!(out, "lph");
    }

    #[test]
    fn zip_of_directory_and_single_file() {
        let tmp = area();
        let mut buf = Vec::new();
        let n = write_zip(tmp.path(), "dir", &mut buf).unwrap();
        assert_eq!(n, 1);
        let mut z = ZipArchive::new(Cursor::new(buf)).unwrap();
        let mut s = String::new();
        z.by_name("sub/a.txt").unwrap().read_to_string(&mut s).unwrap();
        assert_eq!(s, "alpha");

        let mut buf = Vec::new();
        assert_eq!(write_zip(tmp.path(), "", &mut buf).unwrap(), 3);

        let mut buf = Vec::new();
        write_zip(tmp.path(), "top.txt", &mut buf).unwrap();
        let z = ZipArchive::new(Cursor::new(buf)).unwrap();
        assert_eq!(z.file_names().collect::<Vec<_>>(), vec!["top.txt"]);

        assert_eq!(bundle_name("output", ""), "output.zip");
        assert_eq!(bundle_name("output", "game/images/"), "images.zip");
    }

    #[test]
    fn file_manager_ops() {
        let tmp = area();
        let root = tmp.path();
        make_dir(root, "made/here").unwrap();
        assert!(root.join("made/here").is_dir());

        move_path(root, "top.txt", "made/here/top.txt", false).unwrap();
        assert!(root.join("made/here/top.txt").is_file());
        fs::write(root.join("other.txt"), "o").unwrap();
        assert_eq!(
            move_path(root, "other.txt", "made/here/top.txt", false)
                .unwrap_err()
                .code(),
            "already_exists"
        );
        move_path(root, "other.txt", "made/here/top.txt", true).unwrap();
        assert_eq!(fs::read_to_string(root.join("made/here/top.txt")).unwrap(), "o");
        assert_eq!(
            move_path(root, "made", "made/here/inner", false).unwrap_err().code(),
            "invalid_params"
        );

        remove_path(root, "made").unwrap();
        assert!(!root.join("made").exists());
        assert_eq!(remove_path(root, "").unwrap_err().code(), "invalid_params");
        assert_eq!(remove_path(root, "gone").unwrap_err().code(), "source_not_found");
    }

    #[test]
    fn expand_zip_rejects_slip_entries() {
        let tmp = tempfile::tempdir().unwrap();
        let dest = tmp.path().join("input");
        fs::create_dir_all(&dest).unwrap();

        let good = tmp.path().join("good.zip");
        {
            let mut w = ZipWriter::new(File::create(&good).unwrap());
            w.start_file("game/script.rpyc", SimpleFileOptions::default()).unwrap();
            w.write_all(b"RENPY RPC2").unwrap();
            w.finish().unwrap();
        }
        assert_eq!(expand_zip(&good, &dest, 1 << 20).unwrap(), 1);
        assert!(dest.join("game/script.rpyc").is_file());
        assert!(!good.exists());

        let bad = tmp.path().join("bad.zip");
        {
            let mut w = ZipWriter::new(File::create(&bad).unwrap());
            w.start_file("../escape.txt", SimpleFileOptions::default()).unwrap();
            w.write_all(b"x").unwrap();
            w.finish().unwrap();
        }
        assert_eq!(expand_zip(&bad, &dest, 1 << 20).unwrap_err().code(), "path_escape");
        assert!(!tmp.path().join("escape.txt").exists());
    }

    fn deflated_zip(name: &str, data: &[u8]) -> Vec<u8> {
        let opts = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        let mut w = ZipWriter::new(Cursor::new(Vec::new()));
        w.start_file(name, opts).unwrap();
        w.write_all(data).unwrap();
        w.finish().unwrap().into_inner()
    }

    #[test]
    fn expand_zip_enforces_the_size_cap() {
        let tmp = tempfile::tempdir().unwrap();
        let dest = tmp.path().join("input");
        fs::create_dir_all(&dest).unwrap();

        let honest = tmp.path().join("honest.zip");
        fs::write(&honest, deflated_zip("big.bin", &[0u8; 1000])).unwrap();
        let err = expand_zip(&honest, &dest, 100).unwrap_err();
        assert_eq!(err.code(), "too_large");
        assert!(!dest.join("big.bin").exists());
    }

    #[test]
    fn expand_zip_counts_bytes_written_not_declared() {
        let tmp = tempfile::tempdir().unwrap();
        let dest = tmp.path().join("input");
        fs::create_dir_all(&dest).unwrap();

        let mut bytes = deflated_zip("big.bin", &vec![0u8; 1_000_000]);
        // understate the uncompressed size in the local and central headers
        let fake = 10u32.to_le_bytes();
        assert_eq!(&bytes[..4], b"PK\x03\x04");
        bytes[22..26].copy_from_slice(&fake);
        let central = bytes
            .windows(4)
            .position(|w| w == b"PK\x01\x02")
            .unwrap();
        bytes[central + 24..central + 28].copy_from_slice(&fake);

        let lying = tmp.path().join("lying.zip");
        fs::write(&lying, bytes).unwrap();
        let err = expand_zip(&lying, &dest, 100).unwrap_err();
        assert_eq!(err.code(), "too_large");
        let left = fs::metadata(dest.join("big.bin")).map(|m| m.len()).unwrap_or(0);
        assert!(left <= 101, "wrote {left} bytes");
    }
}
