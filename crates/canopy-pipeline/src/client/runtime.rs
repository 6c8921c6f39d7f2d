//! Tokio execution: tasks run eagerly on a runtime's blocking pool

use super::{ExecutionClient, Task, TaskHandle};
use crate::error::PipelineError;
use futures::future::try_join_all;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::Semaphore;

/// Runs tasks on a tokio runtime, at most `workers` transitions at a time
///
/// Each task is spawned at submission. It waits for its dependencies, then
/// for a worker permit, then runs on the blocking pool. Cancelling a handle
/// stops tasks still waiting; a transition already running finishes but its
/// result is discarded.
#[derive(Debug, Clone)]
pub struct TokioClient {
    runtime: Handle,
    workers: Arc<Semaphore>,
    size: usize,
}

impl TokioClient {
    /// Client on `runtime` with `workers` permits (at least one)
    pub fn new(runtime: Handle, workers: usize) -> Self {
        let size = workers.max(1);
        Self {
            runtime,
            workers: Arc::new(Semaphore::new(size)),
            size,
        }
    }

    /// Client on the runtime of the calling context
    ///
    /// # Errors
    /// - `PipelineError::Client` if called outside a tokio runtime
    pub fn current(workers: usize) -> Result<Self, PipelineError> {
        let runtime = Handle::try_current()
            .map_err(|e| PipelineError::Client(format!("no tokio runtime: {e}")))?;
        Ok(Self::new(runtime, workers))
    }

    /// Number of workers
    #[inline]
    #[must_use]
    pub fn workers(&self) -> usize {
        self.size
    }
}

impl ExecutionClient for TokioClient {
    fn submit(&self, task: Task, dependencies: Vec<TaskHandle>) -> TaskHandle {
        let id = task.id();
        let place = task.place().to_string();
        let inputs = dependencies.iter().map(TaskHandle::output).collect::<Vec<_>>();
        let workers = Arc::clone(&self.workers);
        let runtime = self.runtime.clone();
        let worker_place = place.clone();

        let handle = TaskHandle::new(id, place, async move {
            let inputs = try_join_all(inputs).await?;
            let _permit = workers
                .acquire_owned()
                .await
                .map_err(|_| PipelineError::Client("worker pool closed".into()))?;

            runtime
                .spawn_blocking(move || task.run(inputs))
                .await
                .map_err(|e| PipelineError::Client(format!("worker for '{worker_place}' failed: {e}")))?
        });

        tracing::debug!(task = %id, place = handle.place(), "submitted task");
        drop(self.runtime.spawn(handle.output()));
        handle
    }
}
