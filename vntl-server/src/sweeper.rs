use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};
use vntl_core::workspace::JobStore;

/// Periodically delete jobs idle for longer than `ttl`.
pub fn spawn(store: Arc<JobStore>, ttl: Duration, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(every);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tick.tick().await;
            let store = Arc::clone(&store);
            match tokio::task::spawn_blocking(move || store.sweep_expired(ttl)).await {
                Ok(removed) => debug!(removed, "sweep pass done"),
                Err(e) => warn!(error = %e, "sweep pass panicked"),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn expired_jobs_are_swept() {
        let tmp = tempfile::tempdir().unwrap();
        let store = Arc::new(JobStore::open(tmp.path()).unwrap());
        let job = store.create().unwrap();
        let handle = spawn(Arc::clone(&store), Duration::ZERO, Duration::from_millis(10));

        for _ in 0..200 {
            if !job.root().exists() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        handle.abort();
        assert!(!job.root().exists());
        assert!(store.is_empty());
    }
}
