use super::decompile::{DecompileOptions, Decompiler, decompiled_name};
use super::{FileClass, PackRequest, ProcessRequest, classify};
use crate::domain::{Area, FileOutcome};
use crate::error::{Result, VntlError};
use crate::pack::walker::{SourceFile, collect_files};
use crate::pack::writer::pack_into;
use crate::read::extract::extract_each;
use crate::read::opened::Opened;
use crate::sandbox::{self, Sandbox, relative_display};
use rayon::prelude::*;
use std::fs::{self, File};
use std::io::{Read, Seek};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Routes a [`ProcessRequest`] to the work it names and collects one outcome
/// per file. Per-file failures become `error` outcomes; only structural
/// problems (no input, bad source, unwritable output) fail the run.
#[derive(Clone)]
pub struct Dispatcher {
    decompiler: Arc<dyn Decompiler>,
}

impl Dispatcher {
    pub fn new(decompiler: Arc<dyn Decompiler>) -> Self {
        Self { decompiler }
    }

    pub fn run(&self, input: &Path, output: &Path, req: &ProcessRequest) -> Result<Vec<FileOutcome>> {
        let try_harder = match req {
            ProcessRequest::PackRpa(p) => return self.pack(input, output, p),
            ProcessRequest::Auto { try_harder } | ProcessRequest::Decompile { try_harder } => {
                *try_harder
            }
            ProcessRequest::ExtractRpa | ProcessRequest::ExtractRpi => false,
        };

        let files = collect_files(input)?;
        if files.is_empty() {
            return Err(VntlError::EmptySource("input has no files".into()));
        }
        reset_dir(output)?;

        let opts = DecompileOptions { try_harder };
        let outcomes: Vec<Vec<FileOutcome>> = files
            .par_iter()
            .map(|f| self.handle(req, f, output, opts))
            .collect();
        Ok(outcomes.into_iter().flatten().collect())
    }

    fn handle(
        &self,
        req: &ProcessRequest,
        file: &SourceFile,
        output: &Path,
        opts: DecompileOptions,
    ) -> Vec<FileOutcome> {
        let class = classify(&file.path);
        debug!(file = %file.name, ?class, mode = %req.mode(), "dispatching");

        match (req, class) {
            (
                ProcessRequest::Auto { .. } | ProcessRequest::Decompile { .. },
                FileClass::Bytecode,
            ) => vec![self.decompile_one(file, output, opts)],
            (ProcessRequest::Auto { .. } | ProcessRequest::ExtractRpa, FileClass::Archive(_)) => {
                extract_archive(file, output, Opened::open_path(&file.path))
            }
            (ProcessRequest::Auto { .. }, FileClass::Index) => extract_index(file, output, true),
            (ProcessRequest::ExtractRpi, FileClass::Index) => extract_index(file, output, false),
            (_, FileClass::DataFile) => vec![FileOutcome::skipped(
                &file.name,
                "data file of a sibling .rpi index",
            )],
            (ProcessRequest::Auto { .. }, _) => {
                vec![FileOutcome::skipped(&file.name, "not a Ren'Py script or archive")]
            }
            (ProcessRequest::Decompile { .. }, _) => {
                vec![FileOutcome::skipped(&file.name, "not compiled bytecode")]
            }
            (ProcessRequest::ExtractRpa, _) => {
                vec![FileOutcome::skipped(&file.name, "not an RPA-2.0/3.0 archive")]
            }
            (ProcessRequest::ExtractRpi, _) => {
                vec![FileOutcome::skipped(&file.name, "not an .rpi index")]
            }
            (ProcessRequest::PackRpa(_), _) => Vec::new(),
        }
    }

    fn decompile_one(&self, file: &SourceFile, output: &Path, opts: DecompileOptions) -> FileOutcome {
        let rel = decompiled_name(Path::new(&file.name));
        let rel = rel.to_string_lossy().replace('\\', "/");
        let res = sandbox::resolve(output, &rel).and_then(|dest| {
            let text = self.decompiler.decompile(&file.path, opts)?;
            if let Some(parent) = dest.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&dest, text)?;
            Ok(())
        });
        match res {
            Ok(()) => FileOutcome::ok(rel),
            Err(e) => {
                warn!(file = %file.name, error = %e, "decompile failed");
                FileOutcome::error(&file.name, &e)
            }
        }
    }

    fn pack(&self, input: &Path, output: &Path, req: &PackRequest) -> Result<Vec<FileOutcome>> {
        let area_root = match req.source_where {
            Area::Input => input,
            Area::Output => output,
        };
        let source = Sandbox::new(area_root)?.resolve(&req.source_path)?;
        if !source.is_dir() {
            return Err(VntlError::SourceNotFound(format!(
                "{}/{}",
                req.source_where, req.source_path
            )));
        }

        fs::create_dir_all(output)?;
        let out_sb = Sandbox::new(output)?;
        let dest = out_sb.resolve(&req.params.output_name)?;
        if dest == out_sb.root() || dest.is_dir() {
            return Err(VntlError::invalid(format!(
                "archive name {:?} is a directory",
                req.params.output_name
            )));
        }

        let files: Vec<SourceFile> = collect_files(&source)?
            .into_iter()
            .filter(|f| f.path != dest)
            .collect();
        if files.is_empty() {
            return Err(VntlError::EmptySource(format!(
                "{}/{} has no files",
                req.source_where, req.source_path
            )));
        }

        let parent = dest.parent().unwrap_or(output);
        fs::create_dir_all(parent)?;
        let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
        let summary = pack_into(tmp.as_file_mut(), &files, &req.params)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&dest).map_err(|e| e.error)?;

        let rel = relative_display(output, &dest);
        info!(
            archive = %rel,
            entries = summary.entries,
            bytes = summary.total_bytes,
            version = req.params.version.number(),
            "packed archive"
        );
        Ok(vec![FileOutcome::ok(rel)])
    }
}

/// Clear `dir` of everything it holds, keeping the directory itself.
fn reset_dir(dir: &Path) -> Result<()> {
    if dir.exists() {
        fs::remove_dir_all(dir)?;
    }
    fs::create_dir_all(dir)?;
    Ok(())
}

/// Extract into the output directory that mirrors the archive's own location.
fn extract_archive<R: Read + Seek>(
    file: &SourceFile,
    output: &Path,
    opened: Result<Opened<R>>,
) -> Vec<FileOutcome> {
    let mut arc = match opened {
        Ok(a) => a,
        Err(e) => {
            warn!(file = %file.name, error = %e, "cannot open archive");
            return vec![FileOutcome::error(&file.name, &e)];
        }
    };
    if arc.is_empty() {
        return vec![FileOutcome::skipped(&file.name, "archive has no entries")];
    }

    let parent_rel = match file.name.rsplit_once('/') {
        Some((dir, _)) => dir,
        None => "",
    };
    let dest = match sandbox::resolve(output, parent_rel).and_then(|d| {
        fs::create_dir_all(&d)?;
        Ok(d)
    }) {
        Ok(d) => d,
        Err(e) => return vec![FileOutcome::error(&file.name, &e)],
    };

    let results = extract_each(&mut arc, &dest);
    let mut written = 0usize;
    let outcomes: Vec<FileOutcome> = results
        .into_iter()
        .map(|(name, res)| {
            let shown = if parent_rel.is_empty() {
                name.clone()
            } else {
                format!("{parent_rel}/{name}")
            };
            match res {
                Ok(x) => {
                    written += 1;
                    FileOutcome::ok(relative_display(output, &x.path))
                }
                Err(e) => {
                    warn!(archive = %file.name, entry = %name, error = %e, "entry not extracted");
                    FileOutcome::error(shown, &e)
                }
            }
        })
        .collect();
    info!(archive = %file.name, version = arc.version.number(), written, "extracted archive");
    outcomes
}

/// Version 1 index plus its data file; when the index cannot be used, try the
/// sibling `.rpa` as a regular archive.
/// `archives_in_run` is set when the same run also extracts every archive it
/// meets, in which case a signed sibling `.rpa` is left to that pass.
fn extract_index(file: &SourceFile, output: &Path, archives_in_run: bool) -> Vec<FileOutcome> {
    let data = file.path.with_extension("rpa");
    if !data.is_file() {
        let e = VntlError::SourceNotFound(format!("data file for {}", file.name));
        return vec![FileOutcome::error(&file.name, &e)];
    }
    match Opened::<File>::open_v1_paths(&file.path, &data) {
        Ok(arc) => extract_archive(file, output, Ok(arc)),
        Err(_) if archives_in_run && matches!(classify(&data), FileClass::Archive(_)) => {
            vec![FileOutcome::skipped(
                &file.name,
                "index unreadable; sibling archive is extracted on its own",
            )]
        }
        Err(e) => {
            debug!(file = %file.name, error = %e, "index unreadable, trying data file as archive");
            extract_archive(file, output, Opened::open_path(&data))
        }
    }
}
