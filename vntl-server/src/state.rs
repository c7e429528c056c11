use std::sync::Arc;

use vntl_core::dispatch::{Decompiler, Dispatcher, ExternalDecompiler};
use vntl_core::policy::Limits;
use vntl_core::workspace::{JobManager, JobStore};

use crate::config::ServerArgs;

/// Shared state handed to every handler.
pub struct AppState {
    pub manager: JobManager,
}

impl AppState {
    pub fn new(manager: JobManager) -> Arc<Self> {
        Arc::new(Self { manager })
    }

    /// Open the job root and wire the external decompiler from `args`.
    pub fn from_args(args: &ServerArgs) -> vntl_core::Result<Arc<Self>> {
        let store = Arc::new(JobStore::open(&args.job_root())?);
        let decompiler: Arc<dyn Decompiler> = Arc::new(
            ExternalDecompiler::new(args.decompiler.clone()).with_timeout(args.decompile_timeout()),
        );
        let manager = JobManager::new(store, Dispatcher::new(decompiler), args.limits());
        Ok(Self::new(manager))
    }

    pub fn limits(&self) -> &Limits {
        self.manager.limits()
    }
}
