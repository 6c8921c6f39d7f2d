//! Execution clients
//!
//! `future` turns every place of a walk into a [`Task`] and submits it to an
//! [`ExecutionClient`] together with the handles of the tasks producing its
//! inputs. The client decides where and when tasks run; the engine only
//! wires the dependency edges.
//!
//! - [`InlineClient`]: runs a task on whichever thread polls its handle
//! - [`TokioClient`]: runs tasks eagerly on a tokio runtime's blocking pool,
//!   bounded by a fixed number of workers
//!
//! Handles are shared futures: every dependant polls the same task, so a
//! place runs at most once per call however many paths lead to it, and a
//! failure is observed identically by all of them.

pub mod inline;
pub mod runtime;

pub use inline::InlineClient;
pub use runtime::TokioClient;

use crate::error::PipelineError;
use crate::eval::Step;
use crate::feed::Feed;
use crate::persist::PersistStore;
use crate::progress::ProgressObserver;
use crate::report::{Evaluation, RunReport};
use crate::transition::Transition;
use canopy_table::Value;
use futures::future::{AbortHandle, Abortable, BoxFuture, Shared};
use futures::FutureExt;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use uuid::Uuid;

/// Value and report of a finished task
#[derive(Debug)]
pub struct TaskOutcome {
    /// Produced value
    pub value: Arc<Value>,
    /// Report covering this task and everything upstream of it
    pub report: RunReport,
}

/// Result every dependant of a task observes
pub type TaskResult = Result<Arc<TaskOutcome>, PipelineError>;

/// Shared, cloneable task output
pub type TaskFuture = Shared<BoxFuture<'static, TaskResult>>;

/// Submits tasks for execution
pub trait ExecutionClient: Send + Sync + fmt::Debug {
    /// Schedule `task` to run once every dependency has resolved
    ///
    /// Dependencies are given in the task's input order. Must not block.
    fn submit(&self, task: Task, dependencies: Vec<TaskHandle>) -> TaskHandle;
}

/// Work carried by a task
#[derive(Debug, Clone)]
pub enum Work {
    /// Apply a transition to the dependency values
    Transition(Arc<dyn Transition>),
    /// Produce a fixed value; takes no dependencies
    Literal(Arc<Value>),
    /// Pass through the value of a single external handle
    Forward,
}

/// One place's share of a walk
///
/// Self-contained: holds everything needed to run away from the pipeline.
pub struct Task {
    id: Uuid,
    pipeline: String,
    place: String,
    work: Work,
    feed: Feed,
    persist: Option<PersistStore>,
    progress: Option<Arc<dyn ProgressObserver>>,
}

impl Task {
    pub(crate) fn new(
        pipeline: impl Into<String>,
        place: impl Into<String>,
        work: Work,
        feed: Feed,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            pipeline: pipeline.into(),
            place: place.into(),
            work,
            feed,
            persist: None,
            progress: None,
        }
    }

    pub(crate) fn with_persist(mut self, store: Option<PersistStore>) -> Self {
        self.persist = store;
        self
    }

    pub(crate) fn with_progress(mut self, progress: Option<Arc<dyn ProgressObserver>>) -> Self {
        self.progress = progress;
        self
    }

    /// Unique task id
    #[inline]
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Owning pipeline name
    #[inline]
    #[must_use]
    pub fn pipeline(&self) -> &str {
        &self.pipeline
    }

    /// Place this task resolves
    #[inline]
    #[must_use]
    pub fn place(&self) -> &str {
        &self.place
    }

    /// Work to perform
    #[inline]
    #[must_use]
    pub fn work(&self) -> &Work {
        &self.work
    }

    /// Run the task on the current thread
    ///
    /// `inputs` are the outcomes of the dependencies, in submission order.
    ///
    /// # Errors
    /// Returns the transition failure, or the persist failure when the
    /// value cannot be written.
    pub fn run(self, inputs: Vec<Arc<TaskOutcome>>) -> TaskResult {
        let step = Step {
            pipeline: &self.pipeline,
            place: &self.place,
            persist: self.persist.as_ref(),
            progress: self.progress.as_deref(),
        };
        step.start();

        let mut report = RunReport::new();
        let (value, failures) = match &self.work {
            Work::Literal(value) => (Arc::clone(value), Vec::new()),
            Work::Forward => {
                let upstream = inputs.first().ok_or_else(|| {
                    PipelineError::Client(format!("no handle to forward for '{}'", self.place))
                })?;
                (Arc::clone(&upstream.value), Vec::new())
            }
            Work::Transition(transition) => {
                for input in &inputs {
                    report.merge(&input.report);
                }
                let values = inputs.iter().map(|input| input.value.as_ref().clone()).collect();
                let output = step.apply(transition.as_ref(), values, &self.feed)?;
                (Arc::new(output.value), output.row_failures)
            }
        };

        step.finish(&value, failures, &mut report)?;
        Ok(Arc::new(TaskOutcome { value, report }))
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("pipeline", &self.pipeline)
            .field("place", &self.place)
            .field("work", &self.work)
            .field("persist", &self.persist.is_some())
            .finish_non_exhaustive()
    }
}

/// Handle to a submitted task
#[derive(Clone)]
pub struct TaskHandle {
    id: Uuid,
    place: String,
    output: TaskFuture,
    abort: AbortHandle,
}

impl TaskHandle {
    /// Wrap the future computing a task
    ///
    /// The returned handle is cancellable: once cancelled, the future is no
    /// longer polled and every waiter sees [`PipelineError::Cancelled`].
    pub fn new<F>(id: Uuid, place: impl Into<String>, work: F) -> Self
    where
        F: Future<Output = TaskResult> + Send + 'static,
    {
        let place = place.into();
        let (abort, registration) = AbortHandle::new_pair();
        let cancelled = place.clone();
        let output = Abortable::new(work, registration)
            .map(move |result| result.unwrap_or_else(|_| Err(PipelineError::Cancelled(cancelled))))
            .boxed()
            .shared();
        Self {
            id,
            place,
            output,
            abort,
        }
    }

    /// Task id
    #[inline]
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Place the task resolves
    #[inline]
    #[must_use]
    pub fn place(&self) -> &str {
        &self.place
    }

    /// Shared output future
    #[must_use]
    pub fn output(&self) -> TaskFuture {
        self.output.clone()
    }

    /// Stop the task if it has not finished
    pub fn cancel(&self) {
        self.abort.abort();
    }

    /// Whether the output is available without waiting
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.output.peek().is_some()
    }
}

impl fmt::Debug for TaskHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskHandle")
            .field("id", &self.id)
            .field("place", &self.place)
            .field("finished", &self.is_finished())
            .finish()
    }
}

/// Pending result of a `future` walk
///
/// Resolves to the same [`Evaluation`] `compute` would produce. Cloning
/// shares the underlying tasks.
#[derive(Clone)]
pub struct PlaceFuture {
    place: String,
    root: TaskHandle,
    tasks: Vec<TaskHandle>,
}

impl PlaceFuture {
    pub(crate) fn new(place: impl Into<String>, root: TaskHandle, tasks: Vec<TaskHandle>) -> Self {
        Self {
            place: place.into(),
            root,
            tasks,
        }
    }

    /// Place being resolved
    #[inline]
    #[must_use]
    pub fn place(&self) -> &str {
        &self.place
    }

    /// Every task of the walk, upstream before downstream
    #[inline]
    #[must_use]
    pub fn tasks(&self) -> &[TaskHandle] {
        &self.tasks
    }

    pub(crate) fn root(&self) -> &TaskHandle {
        &self.root
    }

    /// Cancel every task of the walk that has not finished
    pub fn cancel(&self) {
        tracing::info!(place = %self.place, tasks = self.tasks.len(), "cancelling walk");
        for task in &self.tasks {
            task.cancel();
        }
        self.root.cancel();
    }

    /// Whether the result is available without waiting
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.root.is_finished()
    }
}

impl Future for PlaceFuture {
    type Output = Result<Evaluation, PipelineError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.root.output.poll_unpin(cx).map(|result| {
            result.map(|outcome| Evaluation {
                value: outcome.value.as_ref().clone(),
                report: outcome.report.clone(),
            })
        })
    }
}

impl fmt::Debug for PlaceFuture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlaceFuture")
            .field("place", &self.place)
            .field("tasks", &self.tasks.len())
            .field("ready", &self.is_ready())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transition::ConcatBag;
    use canopy_table::{row, Bag, Table};

    fn literal(place: &str, value: Value) -> Task {
        Task::new("p", place, Work::Literal(Arc::new(value)), Feed::new())
    }

    #[test]
    fn literal_task_runs_without_inputs() {
        let outcome = literal("n", Value::scalar(3)).run(Vec::new()).unwrap();
        assert_eq!(*outcome.value, Value::scalar(3));
        assert!(outcome.report.was_evaluated("n"));
    }

    #[test]
    fn transition_task_merges_upstream_reports() {
        let table: Table = (0..4).map(|i| row([("id", i)])).collect();
        let bag = literal("bag", Value::Bag(Bag::partition(&table, 2).unwrap()))
            .run(Vec::new())
            .unwrap();

        let task = Task::new("p", "table", Work::Transition(ConcatBag::shared()), Feed::new());
        let outcome = task.run(vec![bag]).unwrap();

        assert_eq!(*outcome.value, Value::Table(table));
        assert_eq!(outcome.report.evaluated(), &["bag".to_string(), "table".to_string()]);
    }

    #[test]
    fn forward_without_handle_fails() {
        let task = Task::new("p", "x", Work::Forward, Feed::new());
        assert!(matches!(task.run(Vec::new()), Err(PipelineError::Client(_))));
    }

    #[test]
    fn cancelled_handle_reports_cancellation() {
        let handle = TaskHandle::new(Uuid::new_v4(), "slow", futures::future::pending());
        handle.cancel();

        let err = futures::executor::block_on(handle.output()).unwrap_err();
        assert!(err.is_cancelled());
        assert!(handle.is_finished());
    }
}
