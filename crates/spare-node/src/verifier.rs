use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use tokio::{sync::Semaphore, task, time::timeout};
use tracing::warn;

use crate::NodeError;

/// Runs CPU-bound verification on the blocking thread pool, at most a fixed number of
/// jobs at a time, so proof checks never stall the task that mutates chain state.
#[derive(Debug, Clone)]
pub struct VerifierPool {
    permits: Arc<Semaphore>,
}

impl VerifierPool {
    pub fn new(threads: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(threads.max(1))),
        }
    }

    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    pub async fn run<F, T>(&self, limit: Duration, job: F) -> Result<T, NodeError>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        self.run_cancellable(limit, Arc::new(AtomicBool::new(false)), move |_| job())
            .await
    }

    /// Like [`run`](Self::run), for jobs that poll `cancel` and give up once it is set.
    ///
    /// The flag is set when `limit` elapses, so the job stops holding a worker soon after
    /// the caller has stopped waiting for it. Waiting for a free worker counts towards
    /// the limit.
    pub async fn run_cancellable<F, T>(
        &self,
        limit: Duration,
        cancel: Arc<AtomicBool>,
        job: F,
    ) -> Result<T, NodeError>
    where
        F: FnOnce(&AtomicBool) -> T + Send + 'static,
        T: Send + 'static,
    {
        let permits = self.permits.clone();
        let flag = cancel.clone();

        let work = async move {
            let permit = permits
                .acquire_owned()
                .await
                .map_err(|_| NodeError::Shutdown)?;

            let output = task::spawn_blocking(move || {
                let _permit = permit;
                job(&flag)
            })
            .await?;

            Ok(output)
        };

        match timeout(limit, work).await {
            Ok(result) => result,
            Err(_) => {
                cancel.store(true, Ordering::Relaxed);
                warn!("Verification exceeded timeout of {limit:?}");
                Err(NodeError::Timeout(limit))
            }
        }
    }
}
