use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use vntl_core::container::header::Header;
use vntl_core::error::{Result, VntlError};
use vntl_core::pack::walker::collect_files;
use vntl_core::pack::writer::{PackParams, pack_into};
use vntl_core::read::extract::extract_each;
use vntl_core::read::opened::Opened;
use vntl_core::repo::{self, ArchiveRepo, OpenParams};
use vntl_core::util::hex::parse_key_hex;

fn repo_from_args(
    archive: PathBuf,
    data: Option<PathBuf>,
    key_hex: Option<String>,
) -> Result<Box<dyn ArchiveRepo>> {
    let key_override = key_hex
        .map(|h| parse_key_hex(&h))
        .transpose()?
        .map(u64::from);
    let params = OpenParams {
        archive_path: archive,
        key_override,
        data_path: data,
    };
    repo::open(params)
}

fn open_archive(archive: &Path, data: Option<&Path>, key_hex: Option<&str>) -> Result<Opened<File>> {
    match data {
        Some(d) => Opened::open_v1_paths(archive, d),
        None => {
            let key = key_hex.map(parse_key_hex).transpose()?.map(u64::from);
            Opened::open_with_key(File::open(archive)?, key)
        }
    }
}

pub fn handle_pack(
    out: PathBuf,
    source: PathBuf,
    rpa_version: u8,
    key_hex: Option<String>,
    padding: u64,
) -> Result<()> {
    let name = out
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "archive.rpa".to_string());
    let params = PackParams::new(rpa_version, name, key_hex.as_deref(), padding)?;
    let files = collect_files(&source)?
        .into_iter()
        .filter(|f| f.path != out)
        .collect::<Vec<_>>();

    let mut f = File::create(&out)?;
    let summary = pack_into(&mut f, &files, &params)?;
    eprintln!(
        "pack: {} entries, {} payload bytes, index at {}, {} bytes total -> {}",
        summary.entries,
        summary.payload_bytes,
        summary.index_off,
        summary.total_bytes,
        out.display()
    );
    Ok(())
}

pub fn handle_list(archive: PathBuf, data: Option<PathBuf>, key_hex: Option<String>) -> Result<()> {
    let repo = repo_from_args(archive, data, key_hex)?;
    for row in repo.list_entries()? {
        let extra = if row.segments > 1 {
            format!("  segments={}", row.segments)
        } else {
            String::new()
        };
        println!("{}  {} bytes  off={}{}", row.name, row.size, row.offset, extra);
    }
    Ok(())
}

pub fn handle_extract(
    archive: PathBuf,
    dest: PathBuf,
    data: Option<PathBuf>,
    key_hex: Option<String>,
) -> Result<()> {
    let mut arc = open_archive(&archive, data.as_deref(), key_hex.as_deref())?;
    std::fs::create_dir_all(&dest)?;
    let mut failed = 0usize;
    let mut written = 0usize;
    for (name, res) in extract_each(&mut arc, &dest) {
        match res {
            Ok(_) => written += 1,
            Err(e) => {
                failed += 1;
                eprintln!("extract: {name}: {e}");
            }
        }
    }
    eprintln!("extract: {written} written, {failed} failed -> {}", dest.display());
    if failed > 0 {
        return Err(VntlError::TransformationFailed(format!(
            "{failed} of {} entries could not be extracted",
            written + failed
        )));
    }
    Ok(())
}

pub fn handle_cat(
    archive: PathBuf,
    name: String,
    start: u64,
    len: Option<u64>,
    data: Option<PathBuf>,
    key_hex: Option<String>,
) -> Result<()> {
    let repo = repo_from_args(archive, data, key_hex)?;
    let mut reader = match len {
        Some(l) => repo.open_range(&name, start, l)?,
        None if start > 0 => repo.open_range(&name, start, u64::MAX)?,
        None => repo.open_reader(&name)?,
    };
    let mut out = std::io::stdout().lock();
    std::io::copy(&mut reader, &mut out)?;
    out.flush()?;
    Ok(())
}

pub fn handle_get(
    archive: PathBuf,
    name: String,
    out: PathBuf,
    data: Option<PathBuf>,
    key_hex: Option<String>,
) -> Result<()> {
    let repo = repo_from_args(archive, data, key_hex)?;
    let mut reader = repo.open_reader(&name)?;
    if let Some(parent) = out.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = File::create(&out)?;
    let n = std::io::copy(&mut reader, &mut file)?;
    eprintln!("get: {name} ({n} bytes) -> {}", out.display());
    Ok(())
}

pub fn handle_header(archive: PathBuf) -> Result<()> {
    let h = Header::read_from(File::open(&archive)?)?;
    println!(
        "version={} index_off={} key={:#010x} header_len={}",
        h.version.number(),
        h.index_off,
        h.key,
        h.len
    );
    Ok(())
}
