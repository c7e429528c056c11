use super::job::{Job, JobSnapshot};
use super::store::JobStore;
use crate::content::{self, ByteRange, RawFile};
use crate::dispatch::{Dispatcher, ProcessRequest};
use crate::domain::{Area, OutcomeKind, PathEntry};
use crate::error::{Result, VntlError};
use crate::policy::Limits;
use crate::sandbox;
use crate::tree;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

/// Ties the job registry, the dispatcher and the content operations together.
/// Every operation takes a job id and refreshes that job's idle timer.
#[derive(Clone)]
pub struct JobManager {
    store: Arc<JobStore>,
    dispatcher: Dispatcher,
    limits: Limits,
}

impl JobManager {
    pub fn new(store: Arc<JobStore>, dispatcher: Dispatcher, limits: Limits) -> Self {
        Self {
            store,
            dispatcher,
            limits,
        }
    }

    pub fn store(&self) -> &Arc<JobStore> {
        &self.store
    }

    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    pub fn create_job(&self) -> Result<Arc<Job>> {
        self.store.create()
    }

    pub fn job(&self, id: &str) -> Result<Arc<Job>> {
        self.store.get(id)
    }

    pub fn snapshot(&self, id: &str) -> Result<JobSnapshot> {
        Ok(self.store.get(id)?.snapshot())
    }

    pub fn delete_job(&self, id: &str) -> Result<bool> {
        self.store.delete(id)
    }

    /// Run one processing request to completion on the calling thread.
    pub fn process(&self, id: &str, req: &ProcessRequest) -> Result<JobSnapshot> {
        let job = self.store.get(id)?;
        let guard = job.begin(req.mode())?;
        let result = self.dispatcher.run(job.input(), job.output(), req);
        if let Ok(outcomes) = &result {
            let count = |k| outcomes.iter().filter(|o| o.kind == k).count();
            info!(
                job = %id,
                mode = %req.mode(),
                ok = count(OutcomeKind::Ok),
                skipped = count(OutcomeKind::Skipped),
                errors = count(OutcomeKind::Error),
                "run finished"
            );
        }
        guard.finish(result)
    }

    pub fn tree(&self, id: &str, area: Area) -> Result<PathEntry> {
        let job = self.store.get(id)?;
        tree::list(job.area(area))
    }

    pub fn read_text(&self, id: &str, area: Area, path: &str) -> Result<String> {
        let job = self.store.get(id)?;
        content::read_text(job.area(area), path, self.limits.max_text_bytes)
    }

    pub fn write_text(&self, id: &str, area: Area, path: &str, text: &str) -> Result<u64> {
        let job = self.store.get(id)?;
        content::write_text(job.area(area), path, text, self.limits.max_text_bytes)
    }

    pub fn open_raw(&self, id: &str, area: Area, path: &str) -> Result<RawFile> {
        let job = self.store.get(id)?;
        content::open_raw(job.area(area), path)
    }

    pub fn open_range(&self, id: &str, area: Area, path: &str, range: ByteRange) -> Result<RawFile> {
        let job = self.store.get(id)?;
        content::open_range(job.area(area), path, range)
    }

    pub fn download_single(&self, id: &str, area: Area, path: &str) -> Result<(RawFile, String)> {
        let job = self.store.get(id)?;
        content::download_single(job.area(area), path)
    }

    pub fn write_zip<W: Write>(&self, id: &str, area: Area, path: &str, sink: W) -> Result<usize> {
        let job = self.store.get(id)?;
        content::write_zip(job.area(area), path, sink)
    }

    pub fn make_dir(&self, id: &str, area: Area, path: &str) -> Result<()> {
        let job = self.store.get(id)?;
        content::make_dir(job.area(area), path)
    }

    pub fn remove_path(&self, id: &str, area: Area, path: &str) -> Result<()> {
        let job = self.store.get(id)?;
        content::remove_path(job.area(area), path)
    }

    pub fn move_path(&self, id: &str, area: Area, src: &str, dst: &str, overwrite: bool) -> Result<()> {
        let job = self.store.get(id)?;
        content::move_path(job.area(area), src, dst, overwrite)
    }

    /// Where an uploaded file named `file_name` is stored in the job's input.
    /// Parent directories are created.
    pub fn upload_target(&self, job: &Job, file_name: &str) -> Result<PathBuf> {
        let name = file_name.replace('\\', "/");
        let name = name.trim_start_matches('/');
        let name = if name.trim().is_empty() { "upload.bin" } else { name };
        let dest = sandbox::resolve(job.input(), name)?;
        if dest == job.input() {
            return Err(VntlError::invalid(format!("bad upload name {file_name:?}")));
        }
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(dest)
    }

    /// Post-process a stored upload: zip bundles are expanded into the input
    /// root and removed. Returns the number of files the upload contributed.
    pub fn ingest_upload(&self, job: &Job, stored: &Path) -> Result<usize> {
        let is_zip = stored
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.eq_ignore_ascii_case("zip"))
            .unwrap_or(false);
        if !is_zip {
            return Ok(1);
        }
        content::expand_zip(stored, job.input(), self.limits.max_expanded_bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::{DecompileOptions, Decompiler};
    use crate::workspace::job::JobStatus;
    use std::fs;

    struct Echo;
    impl Decompiler for Echo {
        fn decompile(&self, _: &Path, _: DecompileOptions) -> Result<String> {
            Ok("label start:\n".into())
        }
    }

    fn manager() -> (tempfile::TempDir, JobManager) {
        let tmp = tempfile::tempdir().unwrap();
        let store = Arc::new(JobStore::open(tmp.path()).unwrap());
        let m = JobManager::new(store, Dispatcher::new(Arc::new(Echo)), Limits::default());
        (tmp, m)
    }

    #[test]
    fn process_updates_status() {
        let (_tmp, m) = manager();
        let job = m.create_job().unwrap();
        let err = m
            .process(job.id(), &ProcessRequest::Auto { try_harder: false })
            .unwrap_err();
        assert_eq!(err.code(), "empty_source");
        assert_eq!(job.status(), JobStatus::Failed);

        fs::write(job.input().join("script.rpyc"), b"RENPY RPC2").unwrap();
        let snap = m
            .process(job.id(), &ProcessRequest::Auto { try_harder: false })
            .unwrap();
        assert_eq!(snap.status, JobStatus::Done);
        assert_eq!(snap.error, None);
        assert_eq!(
            m.read_text(job.id(), Area::Output, "script.rpy").unwrap(),
            "label start:\n"
        );
    }

    #[test]
    fn upload_targets_stay_in_input() {
        let (_tmp, m) = manager();
        let job = m.create_job().unwrap();
        let t = m.upload_target(&job, "\\game\\x.rpa").unwrap();
        assert_eq!(t, job.input().join("game").join("x.rpa"));
        assert_eq!(m.upload_target(&job, "").unwrap(), job.input().join("upload.bin"));
        assert_eq!(
            m.upload_target(&job, "../x").unwrap_err().code(),
            "path_escape"
        );
    }
}
