//! Inline execution: tasks run on the polling thread

use super::{ExecutionClient, Task, TaskHandle};
use futures::future::try_join_all;

/// Runs each task lazily, when its handle is first polled
///
/// Nothing happens until the composed handle is awaited or blocked on;
/// then dependencies run first, each exactly once.
#[derive(Debug, Clone, Copy, Default)]
pub struct InlineClient;

impl InlineClient {
    /// Create a client
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl ExecutionClient for InlineClient {
    fn submit(&self, task: Task, dependencies: Vec<TaskHandle>) -> TaskHandle {
        let id = task.id();
        let place = task.place().to_string();
        let inputs = dependencies.iter().map(TaskHandle::output).collect::<Vec<_>>();

        TaskHandle::new(id, place, async move {
            let inputs = try_join_all(inputs).await?;
            task.run(inputs)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::Work;
    use crate::feed::Feed;
    use crate::transition::FnTransition;
    use crate::PlaceKind;
    use canopy_table::Value;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn shared_dependency_runs_once() {
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&runs);
        let source = FnTransition::new("source", PlaceKind::Scalar, move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Value::scalar(1))
        })
        .shared();
        let sum = FnTransition::new("sum", PlaceKind::Scalar, |inputs, _| {
            let total: usize = inputs.iter().map(Value::as_usize).sum::<Result<_, _>>()?;
            Ok(Value::scalar(total))
        })
        .shared();

        let client = InlineClient::new();
        let top = client.submit(
            Task::new("p", "source", Work::Transition(source), Feed::new()),
            Vec::new(),
        );
        let left = client.submit(
            Task::new("p", "left", Work::Transition(Arc::clone(&sum)), Feed::new()),
            vec![top.clone()],
        );
        let right = client.submit(
            Task::new("p", "right", Work::Transition(Arc::clone(&sum)), Feed::new()),
            vec![top.clone()],
        );
        let join = client.submit(
            Task::new("p", "join", Work::Transition(sum), Feed::new()),
            vec![left, right],
        );

        assert_eq!(runs.load(Ordering::SeqCst), 0);
        let outcome = futures::executor::block_on(join.output()).unwrap();
        assert_eq!(*outcome.value, Value::scalar(2));
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(
            outcome.report.evaluated(),
            &["source".to_string(), "left".to_string(), "right".to_string(), "join".to_string()]
        );
    }
}
