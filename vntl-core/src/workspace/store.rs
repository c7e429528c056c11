use super::job::{Job, JobSnapshot, JobStatus};
use crate::error::{Result, VntlError};
use dashmap::DashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tracing::{info, warn};
use uuid::Uuid;

/// Registry of live jobs plus the directory that holds their workspaces.
#[derive(Debug)]
pub struct JobStore {
    root: PathBuf,
    jobs: DashMap<String, Arc<Job>>,
}

/// Ids are 32 lowercase hex digits; anything else never reaches the filesystem.
pub fn is_valid_id(id: &str) -> bool {
    id.len() == 32 && id.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

impl JobStore {
    pub fn open(root: &Path) -> Result<Self> {
        fs::create_dir_all(root)?;
        Ok(Self {
            root: root.to_path_buf(),
            jobs: DashMap::new(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn create(&self) -> Result<Arc<Job>> {
        loop {
            let id = Uuid::new_v4().simple().to_string();
            let dir = self.root.join(&id);
            // create_dir (not _all) so an existing root is never reused
            match fs::create_dir(&dir) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(e.into()),
            }
            let job = Arc::new(Job::new(id.clone(), dir));
            fs::create_dir(job.input())?;
            fs::create_dir(job.output())?;
            self.jobs.insert(id.clone(), Arc::clone(&job));
            info!(job = %id, "job created");
            return Ok(job);
        }
    }

    /// Look a job up and refresh its idle timer.
    pub fn get(&self, id: &str) -> Result<Arc<Job>> {
        if !is_valid_id(id) {
            return Err(VntlError::JobNotFound(id.to_string()));
        }
        let job = self
            .jobs
            .get(id)
            .map(|j| Arc::clone(j.value()))
            .ok_or_else(|| VntlError::JobNotFound(id.to_string()))?;
        job.touch();
        Ok(job)
    }

    /// Remove the job and its directory. Unknown ids are a no-op; returns
    /// whether anything was removed.
    pub fn delete(&self, id: &str) -> Result<bool> {
        if !is_valid_id(id) {
            return Ok(false);
        }
        let registered = self.jobs.remove(id).is_some();
        let dir = self.root.join(id);
        let removed_dir = match fs::remove_dir_all(&dir) {
            Ok(()) => true,
            Err(e) if e.kind() == ErrorKind::NotFound => false,
            Err(e) => return Err(e.into()),
        };
        if registered || removed_dir {
            info!(job = %id, "job deleted");
        }
        Ok(registered || removed_dir)
    }

    /// Snapshots of every registered job, oldest first.
    pub fn list(&self) -> Vec<JobSnapshot> {
        let mut out: Vec<JobSnapshot> = self.jobs.iter().map(|j| j.value().snapshot()).collect();
        out.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        out
    }

    /// Delete jobs idle for longer than `ttl`, and leftover job directories
    /// nobody has registered (from an earlier process) older than `ttl`.
    /// Jobs with a run in progress are left alone. Returns how many went away.
    pub fn sweep_expired(&self, ttl: Duration) -> usize {
        let expired: Vec<String> = self
            .jobs
            .iter()
            .filter(|j| j.value().idle_for() > ttl && j.value().status() != JobStatus::Processing)
            .map(|j| j.key().clone())
            .collect();

        let mut removed = 0;
        for id in expired {
            match self.delete(&id) {
                Ok(true) => removed += 1,
                Ok(false) => {}
                Err(e) => warn!(job = %id, error = %e, "sweeper could not delete job"),
            }
        }

        let entries = match fs::read_dir(&self.root) {
            Ok(rd) => rd,
            Err(e) => {
                warn!(root = %self.root.display(), error = %e, "sweeper cannot read job root");
                return removed;
            }
        };
        let now = SystemTime::now();
        for entry in entries.flatten() {
            let name = entry.file_name().to_string_lossy().into_owned();
            if !is_valid_id(&name) || self.jobs.contains_key(&name) {
                continue;
            }
            let stale = entry
                .metadata()
                .and_then(|m| m.modified())
                .ok()
                .and_then(|t| now.duration_since(t).ok())
                .map(|age| age > ttl)
                .unwrap_or(false);
            if !stale {
                continue;
            }
            match fs::remove_dir_all(entry.path()) {
                Ok(()) => removed += 1,
                Err(e) => warn!(dir = %entry.path().display(), error = %e, "sweeper could not remove directory"),
            }
        }
        if removed > 0 {
            info!(removed, "swept expired jobs");
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::ModeKind;

    #[test]
    fn create_get_delete() {
        let tmp = tempfile::tempdir().unwrap();
        let store = JobStore::open(tmp.path()).unwrap();
        let a = store.create().unwrap();
        let b = store.create().unwrap();
        assert_ne!(a.id(), b.id());
        assert!(is_valid_id(a.id()));
        assert!(a.input().is_dir() && a.output().is_dir());
        assert!(Arc::ptr_eq(&store.get(a.id()).unwrap(), &a));
        assert_eq!(store.list().len(), 2);

        assert!(store.delete(a.id()).unwrap());
        assert!(!a.root().exists());
        assert_eq!(store.get(a.id()).unwrap_err().code(), "job_not_found");
        assert!(!store.delete(a.id()).unwrap());
        assert!(!store.delete("../../etc").unwrap());
        assert_eq!(store.get("../x").unwrap_err().code(), "job_not_found");
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn sweep_removes_idle_jobs_and_orphans() {
        let tmp = tempfile::tempdir().unwrap();
        let store = JobStore::open(tmp.path()).unwrap();
        let idle = store.create().unwrap();
        let busy = store.create().unwrap();
        let _guard = busy.begin(ModeKind::Auto).unwrap();
        let orphan = tmp.path().join("0123456789abcdef0123456789abcdef");
        fs::create_dir_all(orphan.join("input")).unwrap();
        let unrelated = tmp.path().join("keep-me");
        fs::create_dir_all(&unrelated).unwrap();

        assert_eq!(store.sweep_expired(Duration::from_secs(3600)), 0);
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(store.sweep_expired(Duration::ZERO), 2);

        assert!(!idle.root().exists());
        assert!(!orphan.exists());
        assert!(busy.root().exists());
        assert!(unrelated.exists());
    }
}
