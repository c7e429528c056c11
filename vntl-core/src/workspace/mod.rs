//! Job workspaces: per-job state, the registry, and the manager that runs
//! operations against them.

pub mod job;
pub mod manager;
pub mod store;

pub use job::{Job, JobSnapshot, JobState, JobStatus, RunGuard};
pub use manager::JobManager;
pub use store::{JobStore, is_valid_id};
