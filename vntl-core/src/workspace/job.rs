use crate::dispatch::ModeKind;
use crate::domain::{Area, FileOutcome};
use crate::error::{Result, VntlError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Created,
    Processing,
    Done,
    Failed,
}

#[derive(Clone, Debug)]
pub struct JobState {
    pub status: JobStatus,
    pub mode: Option<ModeKind>,
    pub results: Vec<FileOutcome>,
    pub error: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Point-in-time copy of a job, as returned to clients.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct JobSnapshot {
    pub id: String,
    pub status: JobStatus,
    pub mode: Option<ModeKind>,
    pub results: Vec<FileOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

pub(crate) fn now_unix() -> i64 {
    time::OffsetDateTime::now_utc().unix_timestamp()
}

/// One workspace: `<root>/input` and `<root>/output` plus run state.
#[derive(Debug)]
pub struct Job {
    id: String,
    root: PathBuf,
    input: PathBuf,
    output: PathBuf,
    state: Mutex<JobState>,
    touched: Mutex<Instant>,
}

impl Job {
    pub(crate) fn new(id: String, root: PathBuf) -> Self {
        let now = now_unix();
        Self {
            input: root.join(Area::Input.dir_name()),
            output: root.join(Area::Output.dir_name()),
            id,
            root,
            state: Mutex::new(JobState {
                status: JobStatus::Created,
                mode: None,
                results: Vec::new(),
                error: None,
                created_at: now,
                updated_at: now,
            }),
            touched: Mutex::new(Instant::now()),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn input(&self) -> &Path {
        &self.input
    }

    pub fn output(&self) -> &Path {
        &self.output
    }

    pub fn area(&self, area: Area) -> &Path {
        match area {
            Area::Input => &self.input,
            Area::Output => &self.output,
        }
    }

    // a panicking run must not wedge the job, so poisoning is ignored
    fn state(&self) -> MutexGuard<'_, JobState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn status(&self) -> JobStatus {
        self.state().status
    }

    pub fn snapshot(&self) -> JobSnapshot {
        let st = self.state();
        JobSnapshot {
            id: self.id.clone(),
            status: st.status,
            mode: st.mode,
            results: st.results.clone(),
            error: st.error.clone(),
            created_at: st.created_at,
            updated_at: st.updated_at,
        }
    }

    pub fn touch(&self) {
        *self.touched.lock().unwrap_or_else(PoisonError::into_inner) = Instant::now();
    }

    pub fn idle_for(&self) -> Duration {
        self.touched
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .elapsed()
    }

    /// Move to `processing`. Fails with `JobBusy` while another run holds the job.
    pub fn begin(self: &Arc<Self>, mode: ModeKind) -> Result<RunGuard> {
        let mut st = self.state();
        if st.status == JobStatus::Processing {
            return Err(VntlError::JobBusy(self.id.clone()));
        }
        st.status = JobStatus::Processing;
        st.mode = Some(mode);
        st.results.clear();
        st.error = None;
        st.updated_at = now_unix();
        drop(st);
        self.touch();
        Ok(RunGuard {
            job: Arc::clone(self),
            finished: false,
        })
    }
}

/// Exclusive right to run against a job. Dropping it unfinished marks the
/// job `failed`.
#[derive(Debug)]
pub struct RunGuard {
    job: Arc<Job>,
    finished: bool,
}

impl RunGuard {
    pub fn job(&self) -> &Arc<Job> {
        &self.job
    }

    /// Record the run's outcome. A run that executed is `done` even when some
    /// files failed; a structural error makes it `failed` and is passed back.
    pub fn finish(mut self, result: Result<Vec<FileOutcome>>) -> Result<JobSnapshot> {
        self.finished = true;
        {
            let mut st = self.job.state();
            st.updated_at = now_unix();
            match &result {
                Ok(outcomes) => {
                    st.status = JobStatus::Done;
                    st.results = outcomes.clone();
                }
                Err(e) => {
                    st.status = JobStatus::Failed;
                    st.error = Some(e.to_string());
                }
            }
        }
        self.job.touch();
        result.map(|_| self.job.snapshot())
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        let mut st = self.job.state();
        st.status = JobStatus::Failed;
        st.error = Some("run aborted".into());
        st.updated_at = now_unix();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::OutcomeKind;

    fn job() -> Arc<Job> {
        Arc::new(Job::new("abc".into(), PathBuf::from("/jobs/abc")))
    }

    #[test]
    fn second_begin_is_rejected_until_finished() {
        let j = job();
        let g = j.begin(ModeKind::Auto).unwrap();
        assert_eq!(j.status(), JobStatus::Processing);
        assert_eq!(j.begin(ModeKind::Auto).unwrap_err().code(), "job_busy");

        let snap = g.finish(Ok(vec![FileOutcome::ok("a")])).unwrap();
        assert_eq!(snap.status, JobStatus::Done);
        assert_eq!(snap.mode, Some(ModeKind::Auto));
        assert_eq!(snap.results[0].kind, OutcomeKind::Ok);
        assert!(j.begin(ModeKind::Decompile).is_ok());
    }

    #[test]
    fn structural_error_fails_the_job() {
        let j = job();
        let g = j.begin(ModeKind::PackRpa).unwrap();
        let err = g
            .finish(Err(VntlError::EmptySource("nothing".into())))
            .unwrap_err();
        assert_eq!(err.code(), "empty_source");
        let snap = j.snapshot();
        assert_eq!(snap.status, JobStatus::Failed);
        assert!(snap.error.unwrap().contains("nothing"));
    }

    #[test]
    fn dropped_guard_marks_failure() {
        let j = job();
        drop(j.begin(ModeKind::ExtractRpa).unwrap());
        assert_eq!(j.status(), JobStatus::Failed);
        assert_eq!(j.snapshot().error.as_deref(), Some("run aborted"));
    }

    #[test]
    fn snapshot_serializes_lowercase() {
        let j = job();
        let v = serde_json::to_value(j.snapshot()).unwrap();
        assert_eq!(v["status"], "created");
        assert!(v["mode"].is_null());
        assert!(v.get("error").is_none());
    }
}
