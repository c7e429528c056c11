#![forbid(unsafe_code)]

pub mod error;
pub mod policy;

pub mod util {
    pub mod hex;
}

pub mod container {
    pub mod header;
    pub mod index;
}

pub mod pack {
    pub mod walker;
    pub mod writer;
}

pub mod read {
    pub mod extract;
    pub mod opened;
    pub mod stream;
}

pub mod content;
pub mod dispatch;
pub mod domain;
pub mod list;
pub mod repo;
pub mod repo_fs;
pub mod sandbox;
pub mod tree;
pub mod workspace;

// Re-exports: stable API surface
pub use container::header::Version;
pub use dispatch::{
    DecompileOptions, Decompiler, Dispatcher, ExternalDecompiler, ModeKind, PackRequest,
    ProcessRequest,
};
pub use domain::{Area, EntryKind, FileOutcome, OutcomeKind, PathEntry};
pub use error::{Result, VntlError};
pub use pack::writer::{PackParams, pack};
pub use policy::Limits;
pub use read::extract::{unpack, unpack_with_key};
pub use read::opened::Opened;
pub use workspace::{Job, JobManager, JobSnapshot, JobStatus, JobStore};
